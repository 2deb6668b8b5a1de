//! Multiparty-output plumbing for the swap sub-transactions: the lock
//! output whose blinding is the sum of both peers' shares, and the
//! withdrawal builders spending it.

use anyhow::Result;

use crate::chain::crypto::{Point, Scalar};
use crate::chain::{Amount, Height, Input};
use crate::wallet::base::TxContext;
use crate::wallet::builder::TxBuilder;
use crate::wallet::keychain::shared_commitment;
use crate::wallet::params::ParamId;
use crate::wallet::{CoinId, KeyType, SubTxId};

/// This side's secret share of the shared blinding factor, created once and
/// pinned, plus the peer's public share once it arrived.
pub(crate) fn load_shares(ctx: &mut TxContext<'_>) -> Result<(Scalar, Option<Point>)> {
    let own = match ctx.get_param::<Scalar>(ParamId::SharedBlindingFactor, SubTxId::NativeLock)? {
        Some(share) => share,
        None => {
            let share = Scalar::random();
            ctx.set_param(ParamId::SharedBlindingFactor, &share, false, SubTxId::NativeLock)?;
            share
        }
    };
    let peer = ctx.get_param(
        ParamId::PeerPublicSharedBlindingFactor,
        SubTxId::NativeLock,
    )?;
    Ok((own, peer))
}

/// Folds this side's half of the shared output into the lock builder. The
/// shared output itself is reconstructed from parameters on every update
/// rather than persisted, so both peers always agree on its commitment.
pub(crate) fn apply_lock_terms(
    builder: &mut TxBuilder,
    ctx: &mut TxContext<'_>,
    amount: Amount,
    own_share: &Scalar,
    peer_share: &Point,
    is_owner: bool,
) {
    builder.offset = builder.offset.sub(*own_share);
    if is_owner {
        builder
            .outputs
            .push(ctx.keychain.shared_output(amount, own_share, peer_share));
    }
}

/// Min-height of a withdrawal: redeem spends at the lock's height, refund
/// only after the native lock-time elapsed.
pub(crate) fn ensure_withdraw_min_height(ctx: &mut TxContext<'_>, sub: SubTxId) -> Result<()> {
    if ctx.get_param::<Height>(ParamId::MinHeight, sub)?.is_some() {
        return Ok(());
    }
    let lock_min: Height = ctx.need_param(ParamId::MinHeight, SubTxId::NativeLock)?;
    let min = if sub == SubTxId::NativeRefund {
        lock_min + ctx.config.native_lock_time
    } else {
        lock_min
    };
    ctx.set_param(ParamId::MinHeight, &min, false, sub)?;
    Ok(())
}

/// The coin a successful withdrawal creates. Only an index reservation until
/// the kernel confirms; the wallet row appears at completion.
pub(crate) fn withdraw_coin(
    ctx: &mut TxContext<'_>,
    sub: SubTxId,
    amount: Amount,
) -> Result<CoinId> {
    if let Some(id) = ctx.get_param(ParamId::SharedCoinId, sub)? {
        return Ok(id);
    }
    let id = CoinId {
        idx: ctx.store.allocate_coin_index()?,
        value: amount,
        key_type: KeyType::Shared,
    };
    ctx.set_param(ParamId::SharedCoinId, &id, false, sub)?;
    Ok(id)
}

/// Rebuilds the withdrawal builder's input (the shared UTXO) and, for the
/// owner, its output coin. Nothing here is persisted beyond the coin id;
/// the terms are deterministic from the parameter set.
pub(crate) fn apply_withdraw_terms(
    builder: &mut TxBuilder,
    ctx: &mut TxContext<'_>,
    sub: SubTxId,
    lock_amount: Amount,
    own_share: &Scalar,
    peer_share: &Point,
    is_owner: bool,
) -> Result<()> {
    builder.inputs = vec![Input {
        commitment: shared_commitment(lock_amount, own_share, peer_share),
    }];
    builder.offset = builder.offset.add(*own_share);

    if is_owner {
        let coin = withdraw_coin(ctx, sub, builder.amount())?;
        let blinding = ctx.keychain.coin_blinding(&coin);
        builder.offset = builder.offset.sub(blinding);
        builder.outputs = vec![ctx.keychain.output(&coin)];
    }
    Ok(())
}

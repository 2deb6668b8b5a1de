//! Atomic-swap driver: trades the native confidential asset against an
//! external Bitcoin-style coin. One logical transaction composed of
//! sub-protocols sharing the parameter set: the native lock building a
//! multiparty output, pre-signed redeem and refund spends of it, and the
//! hash-locked contract on the external chain.
//!
//! Role mapping is fixed at start: the native-coin owner funds the shared
//! output; the external-coin owner holds the contract secret and reveals it
//! in the native redeem kernel; the native owner extracts it from the
//! confirmed kernel and claims the external lock with it.

pub mod second_side;
pub(crate) mod shared;

use anyhow::Result;
use tracing::{info, warn};

use crate::chain::crypto::{Point, Scalar, Secret};
use crate::chain::{Amount, Height, KernelId, Transaction};
use crate::wallet::base::TxContext;
use crate::wallet::builder::TxBuilder;
use crate::wallet::params::{ParamId, ParamValue};
use crate::wallet::{Coin, CoinId, CoinStatus, FailureReason, SubTxId, SwapCoin, TxFailure, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum SwapState {
    Initial = 0,
    Invitation = 1,
    BuildingLock = 2,
    BuildingRefund = 3,
    BuildingRedeem = 4,
    HandlingExternalLock = 5,
    SendingNativeLock = 6,
    SendingNativeRedeem = 7,
    SendingExternalRedeem = 8,
    SendingNativeRefund = 9,
    SendingExternalRefund = 10,
}

impl ParamValue for SwapState {
    fn encode_to(&self, out: &mut Vec<u8>) {
        (*self as u32).encode_to(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<SwapState> {
        use SwapState::*;
        match u32::decode_from(input)? {
            0 => Ok(Initial),
            1 => Ok(Invitation),
            2 => Ok(BuildingLock),
            3 => Ok(BuildingRefund),
            4 => Ok(BuildingRedeem),
            5 => Ok(HandlingExternalLock),
            6 => Ok(SendingNativeLock),
            7 => Ok(SendingNativeRedeem),
            8 => Ok(SendingExternalRedeem),
            9 => Ok(SendingNativeRefund),
            10 => Ok(SendingExternalRefund),
            other => Err(anyhow::anyhow!("invalid swap state {other}")),
        }
    }
}

/// Per-sub-transaction negotiation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum SubTxState {
    Initial = 0,
    Invitation = 1,
    Constructed = 2,
}

impl ParamValue for SubTxState {
    fn encode_to(&self, out: &mut Vec<u8>) {
        (*self as u32).encode_to(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<SubTxState> {
        match u32::decode_from(input)? {
            0 => Ok(SubTxState::Initial),
            1 => Ok(SubTxState::Invitation),
            2 => Ok(SubTxState::Constructed),
            other => Err(anyhow::anyhow!("invalid sub-tx state {other}")),
        }
    }
}

fn get_state(ctx: &TxContext<'_>) -> Result<SwapState> {
    Ok(ctx
        .get_param(ParamId::State, SubTxId::Main)?
        .unwrap_or(SwapState::Initial))
}

fn set_state(ctx: &mut TxContext<'_>, state: SwapState) -> Result<()> {
    ctx.set_param(ParamId::State, &state, true, SubTxId::Main)?;
    Ok(())
}

fn sub_state(ctx: &TxContext<'_>, sub: SubTxId) -> Result<SubTxState> {
    Ok(ctx
        .get_param(ParamId::State, sub)?
        .unwrap_or(SubTxState::Initial))
}

fn set_sub_state(ctx: &mut TxContext<'_>, sub: SubTxId, state: SubTxState) -> Result<()> {
    ctx.set_param(ParamId::State, &state, true, sub)?;
    Ok(())
}

pub(crate) fn update(ctx: &mut TxContext<'_>) -> Result<()> {
    let Some(side) = ctx.node.borrow().get_second_side(ctx.tx_id) else {
        warn!(tx = %ctx.tx_id, "no second side configured for swap");
        return Err(TxFailure::new(FailureReason::SwapSecondChainFailure, false));
    };

    let is_native_owner = ctx.is_sender();
    let mut state = get_state(ctx)?;

    // a peer-reported failure is only honoured while nothing is committed
    // on either chain; afterwards the refund deadlines decide
    if matches!(
        state,
        SwapState::Initial
            | SwapState::Invitation
            | SwapState::BuildingLock
            | SwapState::BuildingRefund
            | SwapState::BuildingRedeem
    ) {
        ctx.check_external_failure()?;
    }

    loop {
        match state {
            SwapState::Initial => {
                // the external-coin owner will reveal the secret; only it
                // ever stores the cleartext
                if !is_native_owner
                    && ctx
                        .get_param::<[u8; 32]>(ParamId::SwapSecretPrivate, SubTxId::Main)?
                        .is_none()
                {
                    let secret = Secret::random();
                    ctx.set_param(ParamId::SwapSecretPrivate, secret.as_bytes(), false, SubTxId::Main)?;
                    ctx.set_param(ParamId::SwapSecretPublic, &secret.hash(), false, SubTxId::Main)?;
                }

                if !side.borrow_mut().init(&mut ctx.params())? {
                    ctx.update_on_next_tip();
                    return Ok(());
                }
                set_state(ctx, SwapState::Invitation)?;
                state = SwapState::Invitation;
            }

            SwapState::Invitation => {
                if ctx.is_initiator() {
                    side.borrow_mut().init_lock_time(&mut ctx.params())?;
                    send_invitation(ctx)?;
                }
                ctx.update_status(TxStatus::InProgress)?;
                set_state(ctx, SwapState::BuildingLock)?;
                state = SwapState::BuildingLock;
            }

            SwapState::BuildingLock => {
                let (sub, _) = build_lock(ctx, is_native_owner)?;
                if sub != SubTxState::Constructed {
                    return Ok(());
                }
                set_state(ctx, SwapState::BuildingRefund)?;
                state = SwapState::BuildingRefund;
            }

            SwapState::BuildingRefund => {
                let (sub, _) = build_withdraw(ctx, SubTxId::NativeRefund, is_native_owner)?;
                if sub != SubTxState::Constructed {
                    return Ok(());
                }
                set_state(ctx, SwapState::BuildingRedeem)?;
                state = SwapState::BuildingRedeem;
            }

            SwapState::BuildingRedeem => {
                let (sub, _) = build_withdraw(ctx, SubTxId::NativeRedeem, is_native_owner)?;
                if sub != SubTxState::Constructed {
                    return Ok(());
                }
                set_state(ctx, SwapState::HandlingExternalLock)?;
                state = SwapState::HandlingExternalLock;
            }

            SwapState::HandlingExternalLock => {
                if !is_native_owner {
                    if !side.borrow_mut().build_lock_tx(&mut ctx.params())?
                        || !side.borrow_mut().publish_lock_tx(&mut ctx.params())?
                    {
                        ctx.update_on_next_tip();
                        return Ok(());
                    }
                } else if !side.borrow_mut().confirm_lock_tx(&mut ctx.params())? {
                    if side.borrow_mut().lock_time_expired(&mut ctx.params())? {
                        return Err(TxFailure::new(FailureReason::SwapSecondChainFailure, true));
                    }
                    ctx.update_on_next_tip();
                    return Ok(());
                }
                info!(tx = %ctx.tx_id, "external lock in place");
                set_state(ctx, SwapState::SendingNativeLock)?;
                state = SwapState::SendingNativeLock;
            }

            SwapState::SendingNativeLock => {
                // the external owner funded the contract; if the native lock
                // never lands it recovers through the external refund
                if !is_native_owner
                    && ctx
                        .get_param::<Height>(ParamId::KernelProofHeight, SubTxId::NativeLock)?
                        .is_none()
                    && side.borrow_mut().lock_time_expired(&mut ctx.params())?
                {
                    set_state(ctx, SwapState::SendingExternalRefund)?;
                    state = SwapState::SendingExternalRefund;
                    continue;
                }

                if is_native_owner {
                    let registered = register_subtx(ctx, SubTxId::NativeLock, |ctx| {
                        let (_, tx) = build_lock(ctx, true)?;
                        tx.ok_or_else(|| anyhow::anyhow!("lock is not constructed"))
                    })?;
                    if !registered {
                        return Ok(());
                    }
                }

                if !complete_subtx(ctx, SubTxId::NativeLock, false)? {
                    return Ok(());
                }
                info!(tx = %ctx.tx_id, "native lock confirmed");
                set_state(ctx, SwapState::SendingNativeRedeem)?;
                state = SwapState::SendingNativeRedeem;
            }

            SwapState::SendingNativeRedeem => {
                if is_native_owner {
                    if native_lock_time_expired(ctx)? {
                        info!(tx = %ctx.tx_id, "native lock-time expired, refunding");
                        set_state(ctx, SwapState::SendingNativeRefund)?;
                        state = SwapState::SendingNativeRefund;
                        continue;
                    }
                    // the secret normally arrives with the peer's redeem
                    // kernel, but a redeem observed on the external chain
                    // reveals it just as well
                    if ctx
                        .get_param::<[u8; 32]>(ParamId::SwapSecretPrivate, SubTxId::Main)?
                        .is_none()
                    {
                        if let Some(secret) =
                            side.borrow_mut().extract_secret_from_redeem(&mut ctx.params())?
                        {
                            ctx.set_param(
                                ParamId::SwapSecretPrivate,
                                secret.as_bytes(),
                                false,
                                SubTxId::Main,
                            )?;
                        } else {
                            let kernel_id: KernelId =
                                ctx.need_param(ParamId::KernelId, SubTxId::NativeRedeem)?;
                            ctx.get_kernel(SubTxId::NativeRedeem, kernel_id);
                            ctx.update_on_next_tip();
                            return Ok(());
                        }
                    }
                    set_state(ctx, SwapState::SendingExternalRedeem)?;
                    state = SwapState::SendingExternalRedeem;
                } else {
                    let registered = register_subtx(ctx, SubTxId::NativeRedeem, |ctx| {
                        let (_, tx) = build_withdraw(ctx, SubTxId::NativeRedeem, is_native_owner)?;
                        let mut tx = tx.ok_or_else(|| anyhow::anyhow!("redeem is not constructed"))?;
                        tx.preimage =
                            Some(ctx.need_param(ParamId::SwapSecretPrivate, SubTxId::Main)?);
                        Ok(tx)
                    })?;
                    if !registered {
                        return Ok(());
                    }
                    if !complete_subtx(ctx, SubTxId::NativeRedeem, true)? {
                        return Ok(());
                    }
                    info!(tx = %ctx.tx_id, "native redeem confirmed, swap complete");
                    return ctx.complete();
                }
            }

            SwapState::SendingExternalRedeem => {
                let secret = Secret::from_bytes(
                    ctx.need_param(ParamId::SwapSecretPrivate, SubTxId::Main)?,
                );
                let mut facade = side.borrow_mut();
                if !facade.build_redeem_tx(&mut ctx.params(), &secret)?
                    || !facade.publish_withdraw_tx(&mut ctx.params())?
                    || !facade.confirm_withdraw_tx(&mut ctx.params())?
                {
                    drop(facade);
                    ctx.update_on_next_tip();
                    return Ok(());
                }
                drop(facade);
                info!(tx = %ctx.tx_id, "external redeem confirmed, swap complete");
                return ctx.complete();
            }

            SwapState::SendingNativeRefund => {
                let registered = register_subtx(ctx, SubTxId::NativeRefund, |ctx| {
                    let (_, tx) = build_withdraw(ctx, SubTxId::NativeRefund, is_native_owner)?;
                    tx.ok_or_else(|| anyhow::anyhow!("refund is not constructed"))
                })?;
                if !registered {
                    return Ok(());
                }
                if !complete_subtx(ctx, SubTxId::NativeRefund, true)? {
                    return Ok(());
                }
                info!(tx = %ctx.tx_id, "native refund confirmed");
                return ctx.complete();
            }

            SwapState::SendingExternalRefund => {
                let mut facade = side.borrow_mut();
                if !facade.build_refund_tx(&mut ctx.params())?
                    || !facade.publish_withdraw_tx(&mut ctx.params())?
                    || !facade.confirm_withdraw_tx(&mut ctx.params())?
                {
                    drop(facade);
                    ctx.update_on_next_tip();
                    return Ok(());
                }
                drop(facade);
                info!(tx = %ctx.tx_id, "external refund confirmed");
                return ctx.complete();
            }
        }
    }
}

fn native_lock_time_expired(ctx: &TxContext<'_>) -> Result<bool> {
    let lock_min: Height = ctx.need_param(ParamId::MinHeight, SubTxId::NativeLock)?;
    Ok(ctx
        .tip
        .is_some_and(|tip| tip.height > lock_min + ctx.config.native_lock_time))
}

fn send_invitation(ctx: &mut TxContext<'_>) -> Result<()> {
    let amount: Amount = ctx.need_param(ParamId::Amount, SubTxId::Main)?;
    let fee: Amount = ctx.need_param(ParamId::Fee, SubTxId::Main)?;
    let swap_coin: SwapCoin = ctx.need_param(ParamId::SwapCoin, SubTxId::Main)?;
    let swap_amount: Amount = ctx.need_param(ParamId::SwapAmount, SubTxId::Main)?;
    let fee_rate: u64 = ctx.need_param(ParamId::SwapFeeRate, SubTxId::Main)?;
    let lock_time: Height = ctx.need_param(ParamId::SwapLockTime, SubTxId::Main)?;
    let min_height: Height = ctx.need_param(ParamId::MinHeight, SubTxId::Main)?;

    let msg = ctx
        .new_message(SubTxId::Main)
        .add(ParamId::TransactionType, &ctx.record.tx_type)
        .add(ParamId::Amount, &amount)
        .add(ParamId::Fee, &fee)
        .add(ParamId::MinHeight, &min_height)
        .add(ParamId::IsSender, &!ctx.is_sender())
        .add(ParamId::SwapCoin, &swap_coin)
        .add(ParamId::SwapAmount, &swap_amount)
        .add(ParamId::SwapFeeRate, &fee_rate)
        .add(ParamId::SwapLockTime, &lock_time);
    ctx.send(msg)
}

/// Negotiates the native lock whose output is the shared UTXO. Returns the
/// assembled transaction for the owner once both signatures are in.
fn build_lock(
    ctx: &mut TxContext<'_>,
    is_owner: bool,
) -> Result<(SubTxState, Option<Transaction>)> {
    let sub = SubTxId::NativeLock;
    let mut state = sub_state(ctx, sub)?;

    let amount: Amount = ctx.need_param(ParamId::Amount, SubTxId::Main)?;
    let fee: Amount = ctx.need_param(ParamId::Fee, SubTxId::Main)?;

    // the owner dictates the lock's height terms; wait for its invitation
    // rather than deriving them from the local tip
    if !is_owner && ctx.get_param::<Height>(ParamId::MinHeight, sub)?.is_none() {
        return Ok((state, None));
    }

    let (own_share, peer_share) = shared::load_shares(ctx)?;
    let mut builder = TxBuilder::load(ctx, sub, vec![amount], fee)?;

    if !builder.is_initialized() && state == SubTxState::Initial {
        if is_owner {
            builder.select_inputs(ctx)?;
            builder.add_change_output(ctx)?;
        }
        builder.finalize_outputs(ctx)?;
        ctx.update_status(TxStatus::InProgress)?;
    }

    builder.prepare_signing(ctx)?;
    builder.max_height = builder.min_height + builder.lifetime;

    if !builder.get_peer_public(ctx)? {
        if state == SubTxState::Initial && is_owner {
            send_lock_invitation(ctx, &builder, &own_share)?;
            set_sub_state(ctx, sub, SubTxState::Invitation)?;
            state = SubTxState::Invitation;
        }
        ctx.update_on_next_tip();
        return Ok((state, None));
    }

    let Some(peer_share) = peer_share else {
        return Ok((state, None));
    };

    shared::apply_lock_terms(&mut builder, ctx, amount, &own_share, &peer_share, is_owner);
    builder.create_kernel(ctx)?;
    builder.sign_partial(ctx)?;

    if !builder.get_peer_signature(ctx)? {
        if !is_owner && state != SubTxState::Constructed {
            confirm_lock_invitation(ctx, &builder, &own_share)?;
            set_sub_state(ctx, sub, SubTxState::Constructed)?;
            return Ok((SubTxState::Constructed, None));
        }
        return Ok((state, None));
    }

    if !builder.is_peer_signature_valid() {
        return Err(TxFailure::new(FailureReason::InvalidPeerSignature, true));
    }
    builder.finalize_signature();

    if state != SubTxState::Constructed {
        set_sub_state(ctx, sub, SubTxState::Constructed)?;
    }

    let tx = if is_owner {
        let tx = builder.create_transaction(ctx)?;
        tx.validate()
            .map_err(|e| {
                warn!(tx = %ctx.tx_id, "lock does not validate: {e:#}");
                TxFailure::new(FailureReason::Unknown, true)
            })?;
        Some(tx)
    } else {
        None
    };
    Ok((SubTxState::Constructed, tx))
}

fn send_lock_invitation(
    ctx: &mut TxContext<'_>,
    builder: &TxBuilder,
    own_share: &Scalar,
) -> Result<()> {
    let msg = ctx
        .new_message(SubTxId::NativeLock)
        .add(ParamId::MinHeight, &builder.min_height)
        .add(ParamId::Lifetime, &builder.lifetime)
        .add(ParamId::PeerPublicExcess, &builder.public_excess())
        .add(ParamId::PeerPublicNonce, &builder.public_nonce())
        .add(
            ParamId::PeerPublicSharedBlindingFactor,
            &Point::generator(own_share),
        );
    ctx.send(msg)
}

fn confirm_lock_invitation(
    ctx: &mut TxContext<'_>,
    builder: &TxBuilder,
    own_share: &Scalar,
) -> Result<()> {
    let msg = ctx
        .new_message(SubTxId::NativeLock)
        .add(ParamId::PeerPublicExcess, &builder.public_excess())
        .add(ParamId::PeerPublicNonce, &builder.public_nonce())
        .add(ParamId::PeerSignature, &builder.partial_signature())
        .add(ParamId::PeerOffset, &builder.current_offset())
        .add(
            ParamId::PeerPublicSharedBlindingFactor,
            &Point::generator(own_share),
        );
    ctx.send(msg)
}

/// Negotiates a spend of the shared UTXO: redeem to the external owner
/// (hash-locked) or refund to the native owner (height-delayed). The owner
/// of the sub-transaction is the side that will register and keep the coin.
fn build_withdraw(
    ctx: &mut TxContext<'_>,
    sub: SubTxId,
    is_native_owner: bool,
) -> Result<(SubTxState, Option<Transaction>)> {
    let is_owner = match sub {
        SubTxId::NativeRefund => is_native_owner,
        SubTxId::NativeRedeem => !is_native_owner,
        _ => unreachable!("not a withdrawal sub-tx"),
    };
    let mut state = sub_state(ctx, sub)?;

    let lock_amount: Amount = ctx.need_param(ParamId::Amount, SubTxId::Main)?;
    let (own_share, Some(peer_share)) = shared::load_shares(ctx)? else {
        return Ok((state, None));
    };

    let amount: Amount = match ctx.get_param(ParamId::Amount, sub)? {
        Some(amount) => amount,
        None => {
            // withdrawal fee is carried by the shared output itself
            ctx.set_param(ParamId::Amount, &lock_amount, false, sub)?;
            ctx.set_param(ParamId::Fee, &0u64, false, sub)?;
            lock_amount
        }
    };
    let fee: Amount = ctx.get_param(ParamId::Fee, sub)?.unwrap_or(0);

    shared::ensure_withdraw_min_height(ctx, sub)?;

    let mut builder = TxBuilder::load(ctx, sub, vec![amount - fee], fee)?;
    shared::apply_withdraw_terms(
        &mut builder,
        ctx,
        sub,
        lock_amount,
        &own_share,
        &peer_share,
        is_owner,
    )?;
    builder.prepare_signing(ctx)?;

    if sub == SubTxId::NativeRedeem {
        let hash_lock = match ctx.get_param(ParamId::SwapSecretPublic, sub)? {
            Some(hash) => Some(hash),
            None => ctx.get_param(ParamId::SwapSecretPublic, SubTxId::Main)?,
        };
        let Some(hash_lock) = hash_lock else {
            // lock image not known yet
            return Ok((state, None));
        };
        builder.hash_lock = Some(hash_lock);
    }

    if !builder.get_peer_public(ctx)? {
        if state == SubTxState::Initial && is_owner {
            send_withdraw_invitation(ctx, sub, &builder)?;
            set_sub_state(ctx, sub, SubTxState::Invitation)?;
            state = SubTxState::Invitation;
        }
        return Ok((state, None));
    }

    builder.create_kernel(ctx)?;
    builder.sign_partial(ctx)?;

    if !builder.get_peer_signature(ctx)? {
        if !is_owner && state != SubTxState::Constructed {
            confirm_withdraw_invitation(ctx, sub, &builder)?;
            set_sub_state(ctx, sub, SubTxState::Constructed)?;
            return Ok((SubTxState::Constructed, None));
        }
        return Ok((state, None));
    }

    if !builder.is_peer_signature_valid() {
        return Err(TxFailure::new(FailureReason::InvalidPeerSignature, true));
    }
    builder.finalize_signature();

    if state != SubTxState::Constructed {
        set_sub_state(ctx, sub, SubTxState::Constructed)?;
    }

    let tx = if is_owner {
        Some(builder.create_transaction(ctx)?)
    } else {
        None
    };
    Ok((SubTxState::Constructed, tx))
}

fn send_withdraw_invitation(
    ctx: &mut TxContext<'_>,
    sub: SubTxId,
    builder: &TxBuilder,
) -> Result<()> {
    let mut msg = ctx
        .new_message(sub)
        .add(ParamId::Amount, &builder.amount())
        .add(ParamId::Fee, &builder.fee)
        .add(ParamId::MinHeight, &builder.min_height)
        .add(ParamId::PeerPublicExcess, &builder.public_excess())
        .add(ParamId::PeerPublicNonce, &builder.public_nonce());
    if sub == SubTxId::NativeRedeem {
        let lock_image: [u8; 32] = ctx.need_param(ParamId::SwapSecretPublic, SubTxId::Main)?;
        msg = msg.add(ParamId::SwapSecretPublic, &lock_image);
    }
    ctx.send(msg)
}

fn confirm_withdraw_invitation(
    ctx: &mut TxContext<'_>,
    sub: SubTxId,
    builder: &TxBuilder,
) -> Result<()> {
    let msg = ctx
        .new_message(sub)
        .add(ParamId::PeerPublicExcess, &builder.public_excess())
        .add(ParamId::PeerPublicNonce, &builder.public_nonce())
        .add(ParamId::PeerSignature, &builder.partial_signature())
        .add(ParamId::PeerOffset, &builder.current_offset());
    ctx.send(msg)
}

/// Hands a sub-transaction to the node once; resolves to true when the node
/// reported acceptance.
fn register_subtx(
    ctx: &mut TxContext<'_>,
    sub: SubTxId,
    build: impl Fn(&mut TxContext<'_>) -> Result<Transaction>,
) -> Result<bool> {
    match ctx.get_param::<bool>(ParamId::TransactionRegistered, sub)? {
        Some(true) => Ok(true),
        Some(false) => Err(TxFailure::new(FailureReason::FailedToRegister, true)),
        None => {
            let tx = build(ctx)?;
            ctx.update_status(TxStatus::Registering)?;
            ctx.register(sub, tx);
            ctx.update_on_next_tip();
            Ok(false)
        }
    }
}

/// Tracks a registered sub-transaction to confirmation, then settles the
/// wallet coins it touches.
fn complete_subtx(ctx: &mut TxContext<'_>, sub: SubTxId, stores_coin: bool) -> Result<bool> {
    let Some(proof_height) = ctx.get_param::<Height>(ParamId::KernelProofHeight, sub)? else {
        let kernel_id: KernelId = ctx.need_param(ParamId::KernelId, sub)?;
        ctx.confirm_kernel(sub, kernel_id);
        return Ok(false);
    };

    if stores_coin {
        let id: CoinId = ctx.need_param(ParamId::SharedCoinId, sub)?;
        if ctx.store.coin(id.idx)?.is_none() {
            ctx.store.insert_coin(&Coin {
                id,
                status: CoinStatus::Available,
                create_tx_id: Some(ctx.tx_id),
                spent_tx_id: None,
                maturity: Some(proof_height),
            })?;
        }
    }

    ctx.store.complete_tx_coins(ctx.tx_id, proof_height)?;
    Ok(true)
}

//! Driver for the plain transfer protocols: two-party send/receive, split
//! and self-pay. One `update()` reads the parameter set, performs whichever
//! step has its preconditions met, persists and returns.

use anyhow::Result;
use tracing::info;

use crate::chain::{Amount, Height, KernelId};
use crate::wallet::base::TxContext;
use crate::wallet::builder::TxBuilder;
use crate::wallet::params::{ParamId, ParamValue};
use crate::wallet::{FailureReason, KeyType, SubTxId, TxFailure, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum SimpleState {
    Initial = 0,
    Invitation = 1,
    Registration = 2,
    KernelConfirmation = 3,
}

impl ParamValue for SimpleState {
    fn encode_to(&self, out: &mut Vec<u8>) {
        (*self as u32).encode_to(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<SimpleState> {
        match u32::decode_from(input)? {
            0 => Ok(SimpleState::Initial),
            1 => Ok(SimpleState::Invitation),
            2 => Ok(SimpleState::Registration),
            3 => Ok(SimpleState::KernelConfirmation),
            other => Err(anyhow::anyhow!("invalid simple tx state {other}")),
        }
    }
}

fn get_state(ctx: &TxContext<'_>) -> Result<SimpleState> {
    Ok(ctx
        .get_param(ParamId::State, SubTxId::Main)?
        .unwrap_or(SimpleState::Initial))
}

fn set_state(ctx: &mut TxContext<'_>, state: SimpleState) -> Result<()> {
    ctx.set_param(ParamId::State, &state, true, SubTxId::Main)?;
    Ok(())
}

pub(crate) fn update(ctx: &mut TxContext<'_>) -> Result<()> {
    let is_sender = ctx.is_sender();
    let is_self = ctx.record.peer_id == ctx.record.my_id
        || ctx.store.is_own_address(&ctx.record.peer_id)?;
    let state = get_state(ctx)?;

    let amounts: Vec<Amount> = match ctx.get_param(ParamId::AmountList, SubTxId::Main)? {
        Some(list) => list,
        None => vec![ctx.need_param(ParamId::Amount, SubTxId::Main)?],
    };
    let fee: Amount = ctx.need_param(ParamId::Fee, SubTxId::Main)?;

    // Once registration was requested the parameters carry everything the
    // rest of the lifecycle needs; nothing is rebuilt.
    if let Some(registered) = ctx.get_param::<bool>(ParamId::TransactionRegistered, SubTxId::Main)? {
        if !registered {
            return Err(TxFailure::new(FailureReason::FailedToRegister, true));
        }
        return confirm_and_complete(ctx);
    }

    let mut builder = TxBuilder::load(ctx, SubTxId::Main, amounts.clone(), fee)?;

    if !builder.is_initialized() && state == SimpleState::Initial {
        info!(
            tx = %ctx.tx_id,
            amount = builder.amount(),
            fee,
            "{}",
            if is_sender { "sending" } else { "receiving" }
        );

        if is_sender {
            builder.select_inputs(ctx)?;
            builder.add_change_output(ctx)?;
        }
        if is_self || !is_sender {
            for amount in &amounts {
                builder.add_output(ctx, *amount, KeyType::Regular)?;
            }
        }
        builder.finalize_outputs(ctx)?;
        ctx.update_status(TxStatus::InProgress)?;
    }

    builder.prepare_signing(ctx)?;

    if !is_self && !builder.get_peer_public(ctx)? {
        if state == SimpleState::Initial && ctx.is_initiator() {
            send_invitation(ctx, &builder, is_sender)?;
            set_state(ctx, SimpleState::Invitation)?;
        }
        ctx.update_on_next_tip();
        return Ok(());
    }

    if !builder.update_max_height(ctx)? {
        info!(tx = %ctx.tx_id, "peer max height is not acceptable");
        return Err(TxFailure::new(FailureReason::Unknown, true));
    }

    builder.create_kernel(ctx)?;
    builder.sign_partial(ctx)?;

    if !is_self && !builder.get_peer_signature(ctx)? {
        if state == SimpleState::Initial {
            // invited participant: answer with our half and track the
            // kernel on chain, trusting the initiator to register
            ctx.update_status(TxStatus::Registering)?;
            confirm_invitation(ctx, &builder)?;
            ctx.set_param(ParamId::TransactionRegistered, &true, false, SubTxId::Main)?;
            set_state(ctx, SimpleState::KernelConfirmation)?;
            let kernel_id = builder.kernel_id();
            ctx.confirm_kernel(SubTxId::Main, kernel_id);
            return Ok(());
        }
        ctx.update_on_next_tip();
        return Ok(());
    }

    if !is_self && !builder.is_peer_signature_valid() {
        return Err(TxFailure::new(FailureReason::InvalidPeerSignature, true));
    }

    builder.finalize_signature();

    ctx.check_expired()?;

    let tx = builder.create_transaction(ctx)?;
    if let Err(e) = tx.validate() {
        info!(tx = %ctx.tx_id, "assembled transaction is invalid: {e:#}");
        return Err(TxFailure::new(FailureReason::Unknown, true));
    }

    ctx.update_status(TxStatus::Registering)?;
    ctx.register(SubTxId::Main, tx);
    set_state(ctx, SimpleState::Registration)?;
    Ok(())
}

fn confirm_and_complete(ctx: &mut TxContext<'_>) -> Result<()> {
    let kernel_id: KernelId = ctx.need_param(ParamId::KernelId, SubTxId::Main)?;

    let Some(proof_height) = ctx.get_param::<Height>(ParamId::KernelProofHeight, SubTxId::Main)?
    else {
        ctx.update_status(TxStatus::Registering)?;
        set_state(ctx, SimpleState::KernelConfirmation)?;
        ctx.confirm_kernel(SubTxId::Main, kernel_id);
        return Ok(());
    };

    if ctx.config.confirmation_depth > 1 {
        let settled = proof_height + ctx.config.confirmation_depth - 1;
        if ctx.tip.is_none_or(|tip| tip.height < settled) {
            ctx.update_on_next_tip();
            return Ok(());
        }
    }

    ctx.store.complete_tx_coins(ctx.tx_id, proof_height)?;
    ctx.confirm_outputs()?;
    ctx.complete()
}

fn send_invitation(ctx: &mut TxContext<'_>, builder: &TxBuilder, is_sender: bool) -> Result<()> {
    let msg = ctx
        .new_message(SubTxId::Main)
        .add(ParamId::TransactionType, &ctx.record.tx_type)
        .add(ParamId::Amount, &builder.amount())
        .add(ParamId::Fee, &builder.fee)
        .add(ParamId::MinHeight, &builder.min_height)
        .add(ParamId::Lifetime, &builder.lifetime)
        .add(ParamId::PeerMaxHeight, &builder.max_height_hint())
        .add(ParamId::IsSender, &!is_sender)
        .add(ParamId::PeerPublicExcess, &builder.public_excess())
        .add(ParamId::PeerPublicNonce, &builder.public_nonce());
    ctx.send(msg)
}

fn confirm_invitation(ctx: &mut TxContext<'_>, builder: &TxBuilder) -> Result<()> {
    info!(tx = %ctx.tx_id, kernel = %builder.kernel_id(), "transaction accepted");
    let msg = ctx
        .new_message(SubTxId::Main)
        .add(ParamId::PeerPublicExcess, &builder.public_excess())
        .add(ParamId::PeerPublicNonce, &builder.public_nonce())
        .add(ParamId::PeerSignature, &builder.partial_signature())
        .add(ParamId::PeerMaxHeight, &builder.max_height)
        .add(ParamId::PeerOutputs, &builder.outputs)
        .add(ParamId::PeerOffset, &builder.current_offset());
    ctx.send(msg)
}

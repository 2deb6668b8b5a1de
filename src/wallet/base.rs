//! Shared driver machinery: the per-update transaction context, parameter
//! access, expiry, failure and completion handling.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use tracing::{error, info};

use crate::chain::{ChainState, Height, KernelId, Transaction};
use crate::wallet::gateway::{MessageEndpoint, NodeGateway};
use crate::wallet::keychain::Keychain;
use crate::wallet::params::{ParamId, ParamValue};
use crate::wallet::store::WalletStore;
use crate::wallet::{
    FailureReason, SetTxParameter, SubTxId, TxFailure, TxId, TxRecord, TxStatus, WalletConfig,
};

/// Everything one `update()` step of a transaction works against. The
/// parameter set is the real state; this is a window onto it.
pub(crate) struct TxContext<'a> {
    pub store: &'a mut WalletStore,
    pub keychain: &'a Keychain,
    pub config: &'a WalletConfig,
    pub node: Rc<RefCell<dyn NodeGateway>>,
    pub endpoint: Rc<RefCell<dyn MessageEndpoint>>,
    pub tx_id: TxId,
    pub record: TxRecord,
    pub tip: Option<ChainState>,
}

/// Public window onto one transaction's parameter set, handed to external
/// facades such as the second-side implementation.
pub struct TxParams<'a> {
    store: &'a mut WalletStore,
    tx_id: TxId,
}

impl TxParams<'_> {
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    pub fn get<T: ParamValue>(&self, id: ParamId, sub: SubTxId) -> Result<Option<T>> {
        match self.store.get_param(self.tx_id, sub, id)? {
            Some(bytes) => Ok(Some(T::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: ParamValue>(
        &mut self,
        id: ParamId,
        value: &T,
        modifiable: bool,
        sub: SubTxId,
    ) -> Result<bool> {
        self.store
            .set_param(self.tx_id, sub, id, &value.encode(), modifiable)
    }
}

impl TxContext<'_> {
    pub fn params(&mut self) -> TxParams<'_> {
        TxParams {
            store: &mut *self.store,
            tx_id: self.tx_id,
        }
    }

    pub fn get_param<T: ParamValue>(&self, id: ParamId, sub: SubTxId) -> Result<Option<T>> {
        match self.store.get_param(self.tx_id, sub, id)? {
            Some(bytes) => Ok(Some(T::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Absence of a mandatory parameter is a protocol bug, not a peer
    /// condition; the transaction fails with the catch-all reason.
    pub fn need_param<T: ParamValue>(&self, id: ParamId, sub: SubTxId) -> Result<T> {
        match self.store.get_mandatory_param(self.tx_id, sub, id) {
            Ok(bytes) => T::decode(&bytes),
            Err(e) => {
                error!(tx = %self.tx_id, "{e:#}");
                Err(TxFailure::new(FailureReason::Unknown, false))
            }
        }
    }

    pub fn set_param<T: ParamValue>(
        &mut self,
        id: ParamId,
        value: &T,
        modifiable: bool,
        sub: SubTxId,
    ) -> Result<bool> {
        self.store
            .set_param(self.tx_id, sub, id, &value.encode(), modifiable)
    }

    pub fn is_sender(&self) -> bool {
        self.record.is_sender
    }

    pub fn is_initiator(&self) -> bool {
        self.record.is_initiator
    }

    pub fn update_status(&mut self, status: TxStatus) -> Result<()> {
        if self.record.status != status {
            self.store.update_tx_status(self.tx_id, status, None)?;
            self.record.status = status;
        }
        Ok(())
    }

    pub fn new_message(&self, sub: SubTxId) -> SetTxParameter {
        SetTxParameter {
            tx_id: self.tx_id,
            sub_tx_id: sub,
            tx_type: self.record.tx_type,
            from: self.record.my_id.clone(),
            to: self.record.peer_id.clone(),
            params: Vec::new(),
        }
    }

    pub fn send(&mut self, msg: SetTxParameter) -> Result<()> {
        if let Err(e) = self.endpoint.borrow_mut().send(msg) {
            error!(tx = %self.tx_id, "failed to send parameters: {e:#}");
            return Err(TxFailure::new(FailureReason::Unknown, false));
        }
        Ok(())
    }

    pub fn register(&mut self, sub: SubTxId, tx: Transaction) {
        self.node.borrow_mut().register_tx(self.tx_id, sub, tx);
    }

    pub fn confirm_kernel(&mut self, sub: SubTxId, kernel_id: KernelId) {
        self.node.borrow_mut().confirm_kernel(self.tx_id, sub, kernel_id);
    }

    pub fn get_kernel(&mut self, sub: SubTxId, kernel_id: KernelId) {
        self.node.borrow_mut().get_kernel(self.tx_id, sub, kernel_id);
    }

    pub fn update_on_next_tip(&mut self) {
        self.node.borrow_mut().update_on_next_tip(self.tx_id);
    }

    pub fn confirm_outputs(&mut self) -> Result<()> {
        let coins: Vec<_> = self
            .store
            .coins_by_tx(self.tx_id)?
            .into_iter()
            .filter(|coin| coin.create_tx_id == Some(self.tx_id))
            .map(|coin| coin.id)
            .collect();
        if !coins.is_empty() {
            self.node.borrow_mut().confirm_outputs(coins);
        }
        Ok(())
    }

    /// Height-based expiry. Both peers derive the decision from the shared
    /// max-height parameter, so the failure is symmetric. A transaction that
    /// already has its kernel under confirmation expires only when the node
    /// keeps reporting it unconfirmed at or past max-height.
    pub fn check_expired(&self) -> Result<()> {
        if self.record.status.is_terminal() {
            return Ok(());
        }
        // before the peer answered there is no negotiated max-height; the
        // advertised one (min-height + lifetime) bounds the wait instead
        let max_height = match self.get_param::<Height>(ParamId::MaxHeight, SubTxId::Main)? {
            Some(max_height) => max_height,
            None => {
                let Some(min_height) =
                    self.get_param::<Height>(ParamId::MinHeight, SubTxId::Main)?
                else {
                    return Ok(());
                };
                let lifetime = self
                    .get_param::<Height>(ParamId::Lifetime, SubTxId::Main)?
                    .unwrap_or(self.config.lifetime);
                min_height + lifetime
            }
        };

        let registered: Option<bool> =
            self.get_param(ParamId::TransactionRegistered, SubTxId::Main)?;
        let kernel_id: Option<KernelId> = self.get_param(ParamId::KernelId, SubTxId::Main)?;

        if registered.is_none() || kernel_id.is_none() {
            if let Some(tip) = self.tip
                && tip.height > max_height
            {
                info!(
                    tx = %self.tx_id,
                    height = tip.height,
                    max_height,
                    "transaction expired before registration"
                );
                return Err(TxFailure::new(FailureReason::TransactionExpired, false));
            }
        } else if let Some(unconfirmed) =
            self.get_param::<Height>(ParamId::KernelUnconfirmedHeight, SubTxId::Main)?
            && unconfirmed >= max_height
        {
            info!(
                tx = %self.tx_id,
                unconfirmed,
                max_height,
                "transaction expired awaiting kernel confirmation"
            );
            return Err(TxFailure::new(FailureReason::TransactionExpired, false));
        }
        Ok(())
    }

    /// Peer-reported failure: adopt the reason while the tx can still be
    /// abandoned safely.
    pub fn check_external_failure(&self) -> Result<()> {
        if let Some(reason) = self.get_param::<FailureReason>(ParamId::FailureReason, SubTxId::Main)?
            && matches!(self.record.status, TxStatus::Pending | TxStatus::InProgress)
        {
            return Err(TxFailure::new(reason, false));
        }
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        info!(tx = %self.tx_id, "transaction completed");
        self.update_status(TxStatus::Completed)
    }
}

/// Terminal failure handling: record the reason, notify the peer if asked
/// and still useful, revert coin reservations.
pub(crate) fn on_failed(ctx: &mut TxContext<'_>, reason: FailureReason, notify: bool) -> Result<()> {
    error!(tx = %ctx.tx_id, %reason, "transaction failed");

    if notify {
        notify_failure(ctx, reason)?;
    }

    let _ = ctx.set_param(ParamId::FailureReason, &reason, false, SubTxId::Main)?;

    let status = if reason == FailureReason::Cancelled {
        TxStatus::Cancelled
    } else {
        TxStatus::Failed
    };
    ctx.store.update_tx_status(ctx.tx_id, status, Some(reason))?;
    ctx.record.status = status;

    info!(tx = %ctx.tx_id, "rolling back coin reservations");
    ctx.store.rollback_tx(ctx.tx_id)
}

/// Best-effort peer notification; only meaningful while the peer could still
/// consider the tx alive.
pub(crate) fn notify_failure(ctx: &mut TxContext<'_>, reason: FailureReason) -> Result<()> {
    if !matches!(ctx.record.status, TxStatus::Pending | TxStatus::InProgress) {
        return Ok(());
    }
    let msg = ctx
        .new_message(SubTxId::Main)
        .add(ParamId::FailureReason, &reason);
    // failure of the notification itself must not mask the original reason
    if let Err(e) = ctx.endpoint.borrow_mut().send(msg) {
        error!(tx = %ctx.tx_id, "failed to notify peer about failure: {e:#}");
    }
    Ok(())
}

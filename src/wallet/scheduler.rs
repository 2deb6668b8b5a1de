//! The wallet event loop: ingests peer messages, chain events and user
//! operations, routes them to the owning transaction and drives one
//! `update()` step under the per-tx lock.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::chain::{Amount, ChainState, Height, KernelId};
use crate::wallet::base::{self, TxContext};
use crate::wallet::gateway::{MessageEndpoint, NodeGateway, WalletEvent};
use crate::wallet::keychain::Keychain;
use crate::wallet::params::{ParamId, ParamValue};
use crate::wallet::store::WalletStore;
use crate::wallet::{
    CoinId, CoinStatus, FailureReason, SetTxParameter, SubTxId, SwapCoin, TxFailure, TxId,
    TxRecord, TxStatus, TxType, WalletConfig, WalletId, now_millis, simple, swap,
};

#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    pub preselected_coins: Vec<CoinId>,
    pub lifetime: Option<Height>,
}

#[derive(Debug, Clone)]
pub struct SwapParams {
    pub amount: Amount,
    pub fee: Amount,
    pub swap_coin: SwapCoin,
    pub swap_amount: Amount,
    pub swap_fee_rate: u64,
    /// True when this wallet pays the native asset and receives the
    /// external one.
    pub is_sender: bool,
}

pub struct Wallet {
    store: WalletStore,
    keychain: Keychain,
    config: WalletConfig,
    node: Rc<RefCell<dyn NodeGateway>>,
    endpoint: Rc<RefCell<dyn MessageEndpoint>>,
    events: VecDeque<WalletEvent>,
    draining: bool,
    updating: HashSet<TxId>,
    recheck: HashSet<TxId>,
}

impl Wallet {
    pub fn new(
        store: WalletStore,
        keychain: Keychain,
        config: WalletConfig,
        node: Rc<RefCell<dyn NodeGateway>>,
        endpoint: Rc<RefCell<dyn MessageEndpoint>>,
    ) -> Wallet {
        Wallet {
            store,
            keychain,
            config,
            node,
            endpoint,
            events: VecDeque::new(),
            draining: false,
            updating: HashSet::new(),
            recheck: HashSet::new(),
        }
    }

    pub fn store(&self) -> &WalletStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut WalletStore {
        &mut self.store
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    //
    // user operations
    //

    pub fn transfer(
        &mut self,
        my_id: WalletId,
        peer_id: WalletId,
        amount: Amount,
        fee: Amount,
    ) -> Result<TxId> {
        self.transfer_with(my_id, peer_id, amount, fee, TransferOptions::default())
    }

    pub fn transfer_with(
        &mut self,
        my_id: WalletId,
        peer_id: WalletId,
        amount: Amount,
        fee: Amount,
        options: TransferOptions,
    ) -> Result<TxId> {
        let tx_id = self.create_tx(TxType::Simple, my_id, peer_id, amount, fee)?;
        if let Some(lifetime) = options.lifetime {
            self.store
                .set_param(tx_id, SubTxId::Main, ParamId::Lifetime, &lifetime.encode(), false)?;
        }
        if !options.preselected_coins.is_empty() {
            self.store.set_param(
                tx_id,
                SubTxId::Main,
                ParamId::PreselectedCoins,
                &options.preselected_coins.encode(),
                false,
            )?;
        }
        self.handle_event(WalletEvent::TipUpdate(tx_id))?;
        Ok(tx_id)
    }

    /// Splits own funds into the given output values; a single-party
    /// transaction without peer messaging.
    pub fn split(&mut self, my_id: WalletId, amounts: &[Amount], fee: Amount) -> Result<TxId> {
        let total: Amount = amounts.iter().sum();
        let tx_id = self.create_tx(TxType::Split, my_id.clone(), my_id, total, fee)?;
        self.store.set_param(
            tx_id,
            SubTxId::Main,
            ParamId::AmountList,
            &amounts.to_vec().encode(),
            false,
        )?;
        self.handle_event(WalletEvent::TipUpdate(tx_id))?;
        Ok(tx_id)
    }

    pub fn swap(
        &mut self,
        my_id: WalletId,
        peer_id: WalletId,
        params: SwapParams,
    ) -> Result<TxId> {
        let tx_id = TxId::generate();
        self.insert_record(
            tx_id,
            TxType::AtomicSwap,
            my_id,
            peer_id,
            params.amount,
            params.fee,
            params.is_sender,
            true,
            None,
        )?;
        self.set_initial_param(tx_id, ParamId::SwapCoin, &params.swap_coin)?;
        self.set_initial_param(tx_id, ParamId::SwapAmount, &params.swap_amount)?;
        self.set_initial_param(tx_id, ParamId::SwapFeeRate, &params.swap_fee_rate)?;
        self.handle_event(WalletEvent::TipUpdate(tx_id))?;
        Ok(tx_id)
    }

    pub fn cancel(&mut self, tx_id: TxId) -> Result<()> {
        self.handle_event(WalletEvent::Cancel(tx_id))
    }

    //
    // event ingestion; results from the gateway come back through these
    //

    pub fn on_message(&mut self, msg: SetTxParameter) -> Result<()> {
        self.handle_event(WalletEvent::Message(msg))
    }

    pub fn on_tip(&mut self, state: ChainState) -> Result<()> {
        self.handle_event(WalletEvent::Tip(state))
    }

    pub fn on_tip_update(&mut self, tx_id: TxId) -> Result<()> {
        self.handle_event(WalletEvent::TipUpdate(tx_id))
    }

    pub fn on_registered(&mut self, tx_id: TxId, sub_tx_id: SubTxId, accepted: bool) -> Result<()> {
        self.handle_event(WalletEvent::Registered { tx_id, sub_tx_id, accepted })
    }

    pub fn on_kernel_proof(
        &mut self,
        tx_id: TxId,
        sub_tx_id: SubTxId,
        kernel_id: KernelId,
        height: Option<Height>,
        tip: Height,
    ) -> Result<()> {
        self.handle_event(WalletEvent::KernelProof { tx_id, sub_tx_id, kernel_id, height, tip })
    }

    pub fn on_kernel_data(
        &mut self,
        tx_id: TxId,
        sub_tx_id: SubTxId,
        preimage: Option<[u8; 32]>,
    ) -> Result<()> {
        self.handle_event(WalletEvent::KernelData { tx_id, sub_tx_id, preimage })
    }

    pub fn on_output_confirmed(&mut self, idx: u64, height: Height) -> Result<()> {
        self.handle_event(WalletEvent::OutputConfirmed { idx, height })
    }

    pub fn handle_event(&mut self, event: WalletEvent) -> Result<()> {
        self.events.push_back(event);
        self.drain()
    }

    fn drain(&mut self) -> Result<()> {
        if self.draining {
            return Ok(());
        }
        self.draining = true;
        let result = loop {
            let Some(event) = self.events.pop_front() else {
                break Ok(());
            };
            if let Err(e) = self.process(event) {
                break Err(e);
            }
        };
        self.draining = false;
        result
    }

    fn process(&mut self, event: WalletEvent) -> Result<()> {
        match event {
            WalletEvent::Message(msg) => {
                let Some(tx_id) = self.ensure_tx_for_message(&msg)? else {
                    return Ok(());
                };
                for (id, bytes) in &msg.params {
                    // inbound values never overwrite pinned local state
                    let _ = self.store.set_param(tx_id, msg.sub_tx_id, *id, bytes, false)?;
                }
                self.drive(tx_id)
            }
            WalletEvent::Tip(_) => {
                let active: Vec<TxId> = self
                    .store
                    .tx_history()?
                    .into_iter()
                    .filter(|record| !record.status.is_terminal())
                    .map(|record| record.tx_id)
                    .collect();
                for tx_id in active {
                    self.drive(tx_id)?;
                }
                Ok(())
            }
            WalletEvent::TipUpdate(tx_id) => self.drive(tx_id),
            WalletEvent::Registered { tx_id, sub_tx_id, accepted } => {
                let _ = self.store.set_param(
                    tx_id,
                    sub_tx_id,
                    ParamId::TransactionRegistered,
                    &accepted.encode(),
                    false,
                )?;
                self.drive(tx_id)
            }
            WalletEvent::KernelProof { tx_id, sub_tx_id, kernel_id, height, tip } => {
                match height {
                    Some(height) => {
                        let expected: Option<KernelId> = self
                            .store
                            .get_param(tx_id, sub_tx_id, ParamId::KernelId)?
                            .map(|bytes| KernelId::decode(&bytes))
                            .transpose()?;
                        if expected.is_some_and(|expected| expected != kernel_id) {
                            warn!(tx = %tx_id, kernel = %kernel_id, "unexpected kernel id in proof");
                            return self.fail_tx(tx_id, FailureReason::InvalidKernelProof, true);
                        }
                        let _ = self.store.set_param(
                            tx_id,
                            sub_tx_id,
                            ParamId::KernelProofHeight,
                            &height.encode(),
                            false,
                        )?;
                    }
                    None => {
                        let _ = self.store.set_param(
                            tx_id,
                            sub_tx_id,
                            ParamId::KernelUnconfirmedHeight,
                            &tip.encode(),
                            true,
                        )?;
                    }
                }
                self.drive(tx_id)
            }
            WalletEvent::KernelData { tx_id, sub_tx_id: _, preimage } => {
                if let Some(preimage) = preimage {
                    let _ = self.store.set_param(
                        tx_id,
                        SubTxId::Main,
                        ParamId::SwapSecretPrivate,
                        &preimage.encode(),
                        false,
                    )?;
                }
                self.drive(tx_id)
            }
            WalletEvent::OutputConfirmed { idx, height } => {
                if let Some(mut coin) = self.store.coin(idx)?
                    && coin.status == CoinStatus::Maturing
                {
                    coin.status = CoinStatus::Available;
                    coin.maturity = Some(height);
                    self.store.save_coin(&coin)?;
                }
                Ok(())
            }
            WalletEvent::Cancel(tx_id) => self.cancel_tx(tx_id),
        }
    }

    /// One driver step under the logical per-tx lock; a re-entrant request
    /// is coalesced into a re-check once the running step finishes.
    fn drive(&mut self, tx_id: TxId) -> Result<()> {
        if self.updating.contains(&tx_id) {
            self.recheck.insert(tx_id);
            return Ok(());
        }
        self.updating.insert(tx_id);
        let result = self.update_once(tx_id);
        self.updating.remove(&tx_id);
        if self.recheck.remove(&tx_id) && result.is_ok() {
            return self.drive(tx_id);
        }
        result
    }

    fn update_once(&mut self, tx_id: TxId) -> Result<()> {
        let Some(record) = self.store.get_tx(tx_id)? else {
            return Ok(());
        };
        if record.status.is_terminal() {
            return Ok(());
        }

        let tip = self.node.borrow().get_tip();
        let mut ctx = TxContext {
            store: &mut self.store,
            keychain: &self.keychain,
            config: &self.config,
            node: self.node.clone(),
            endpoint: self.endpoint.clone(),
            tx_id,
            record,
            tip,
        };

        let result = (|| -> Result<()> {
            match ctx.record.tx_type {
                TxType::Simple | TxType::Split => {
                    ctx.check_external_failure()?;
                    simple::update(&mut ctx)?;
                    ctx.check_expired()
                }
                // swaps have refund paths instead of height expiry and stop
                // honouring peer failures once funds are committed
                TxType::AtomicSwap => swap::update(&mut ctx),
            }
        })();

        match result {
            Ok(()) => Ok(()),
            Err(e) => match e.downcast::<TxFailure>() {
                Ok(failure) => base::on_failed(&mut ctx, failure.reason, failure.notify),
                Err(e) => {
                    // transient; the next event retries the step
                    error!(tx = %tx_id, "update error: {e:#}");
                    Ok(())
                }
            },
        }
    }

    fn cancel_tx(&mut self, tx_id: TxId) -> Result<()> {
        let Some(record) = self.store.get_tx(tx_id)? else {
            warn!(tx = %tx_id, "cancel for unknown transaction");
            return Ok(());
        };
        match record.status {
            TxStatus::Pending | TxStatus::InProgress => {
                let notify = record.status == TxStatus::InProgress;
                self.fail_tx_inner(record, FailureReason::Cancelled, notify)
            }
            status => {
                info!(tx = %tx_id, ?status, "cannot cancel transaction in this state");
                Ok(())
            }
        }
    }

    fn fail_tx(&mut self, tx_id: TxId, reason: FailureReason, notify: bool) -> Result<()> {
        let Some(record) = self.store.get_tx(tx_id)? else {
            return Ok(());
        };
        if record.status.is_terminal() {
            return Ok(());
        }
        self.fail_tx_inner(record, reason, notify)
    }

    fn fail_tx_inner(
        &mut self,
        record: TxRecord,
        reason: FailureReason,
        notify: bool,
    ) -> Result<()> {
        let tip = self.node.borrow().get_tip();
        let tx_id = record.tx_id;
        let mut ctx = TxContext {
            store: &mut self.store,
            keychain: &self.keychain,
            config: &self.config,
            node: self.node.clone(),
            endpoint: self.endpoint.clone(),
            tx_id,
            record,
            tip,
        };
        base::on_failed(&mut ctx, reason, notify)
    }

    //
    // record creation
    //

    fn create_tx(
        &mut self,
        tx_type: TxType,
        my_id: WalletId,
        peer_id: WalletId,
        amount: Amount,
        fee: Amount,
    ) -> Result<TxId> {
        let tx_id = TxId::generate();
        self.insert_record(tx_id, tx_type, my_id, peer_id, amount, fee, true, true, None)?;
        Ok(tx_id)
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_record(
        &mut self,
        tx_id: TxId,
        tx_type: TxType,
        my_id: WalletId,
        peer_id: WalletId,
        amount: Amount,
        fee: Amount,
        is_sender: bool,
        is_initiator: bool,
        min_height: Option<Height>,
    ) -> Result<()> {
        let min_height = match min_height {
            Some(height) => height,
            None => self.node.borrow().get_tip().map(|t| t.height).unwrap_or(0),
        };
        let now = now_millis();
        let record = TxRecord {
            tx_id,
            tx_type,
            status: TxStatus::Pending,
            amount,
            fee,
            change: 0,
            min_height,
            my_id: my_id.clone(),
            peer_id: peer_id.clone(),
            is_sender,
            is_initiator,
            create_time: now,
            modify_time: now,
            failure_reason: None,
        };
        self.store.insert_tx(&record)?;

        self.set_initial_param(tx_id, ParamId::TransactionType, &tx_type)?;
        self.set_initial_param(tx_id, ParamId::Amount, &amount)?;
        self.set_initial_param(tx_id, ParamId::Fee, &fee)?;
        self.set_initial_param(tx_id, ParamId::MinHeight, &min_height)?;
        self.set_initial_param(tx_id, ParamId::IsSender, &is_sender)?;
        self.set_initial_param(tx_id, ParamId::IsInitiator, &is_initiator)?;
        self.set_initial_param(tx_id, ParamId::MyId, &my_id)?;
        self.set_initial_param(tx_id, ParamId::PeerId, &peer_id)?;

        info!(tx = %tx_id, ?tx_type, amount, fee, "transaction created");
        Ok(())
    }

    fn set_initial_param<T: ParamValue>(
        &mut self,
        tx_id: TxId,
        id: ParamId,
        value: &T,
    ) -> Result<()> {
        self.store
            .set_param(tx_id, SubTxId::Main, id, &value.encode(), false)?;
        Ok(())
    }

    /// An inbound message referencing an unknown id creates the receiving
    /// side of the transaction, but only if it is an initial invitation
    /// carrying the transaction type.
    fn ensure_tx_for_message(&mut self, msg: &SetTxParameter) -> Result<Option<TxId>> {
        if self.store.get_tx(msg.tx_id)?.is_some() {
            return Ok(Some(msg.tx_id));
        }

        let Some(tx_type) = msg_param::<TxType>(msg, ParamId::TransactionType)? else {
            warn!(tx = %msg.tx_id, "message for unknown transaction without type, dropped");
            return Ok(None);
        };
        let Some(amount) = msg_param::<Amount>(msg, ParamId::Amount)? else {
            warn!(tx = %msg.tx_id, "invitation without amount, dropped");
            return Ok(None);
        };
        let fee = msg_param::<Amount>(msg, ParamId::Fee)?.unwrap_or(0);
        let is_sender = msg_param::<bool>(msg, ParamId::IsSender)?.unwrap_or(false);
        // the invitation's min-height binds both sides
        let min_height = msg_param::<Height>(msg, ParamId::MinHeight)?;

        self.insert_record(
            msg.tx_id,
            tx_type,
            msg.to.clone(),
            msg.from.clone(),
            amount,
            fee,
            is_sender,
            false,
            Some(min_height.unwrap_or(0)),
        )?;
        Ok(Some(msg.tx_id))
    }
}

fn msg_param<T: ParamValue>(msg: &SetTxParameter, id: ParamId) -> Result<Option<T>> {
    msg.params
        .iter()
        .find(|(param_id, _)| *param_id == id)
        .map(|(_, bytes)| T::decode(bytes))
        .transpose()
}

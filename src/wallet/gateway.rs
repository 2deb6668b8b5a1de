//! Facades the negotiation engine consumes: the node gateway, the peer
//! message endpoint, and the events they deliver back into the scheduler.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use crate::chain::{ChainState, Height, KernelId, Transaction};
use crate::wallet::swap::second_side::SecondSide;
use crate::wallet::{CoinId, SetTxParameter, SubTxId, TxId};

/// Interface to the on-chain node. All chain interaction is asynchronous:
/// requests return immediately and results come back as [`WalletEvent`]s.
pub trait NodeGateway {
    fn register_tx(&mut self, tx_id: TxId, sub_tx_id: SubTxId, tx: Transaction);
    fn confirm_kernel(&mut self, tx_id: TxId, sub_tx_id: SubTxId, kernel_id: KernelId);
    fn confirm_outputs(&mut self, coins: Vec<CoinId>);
    /// Requests the full kernel body, including any hash-lock preimage it
    /// was registered with.
    fn get_kernel(&mut self, tx_id: TxId, sub_tx_id: SubTxId, kernel_id: KernelId);
    fn get_tip(&self) -> Option<ChainState>;
    /// One-shot: the transaction is poked once when the next block arrives.
    fn update_on_next_tip(&mut self, tx_id: TxId);
    /// External-chain facade for an atomic swap, if one is configured.
    fn get_second_side(&self, tx_id: TxId) -> Option<Rc<RefCell<dyn SecondSide>>>;
}

/// Peer messaging transport.
pub trait MessageEndpoint {
    fn send(&mut self, msg: SetTxParameter) -> Result<()>;
}

/// Inbound work for the scheduler, processed in arrival order per tx.
#[derive(Debug, Clone)]
pub enum WalletEvent {
    Message(SetTxParameter),
    Tip(ChainState),
    /// One-shot tip subscription fired.
    TipUpdate(TxId),
    Registered {
        tx_id: TxId,
        sub_tx_id: SubTxId,
        accepted: bool,
    },
    KernelProof {
        tx_id: TxId,
        sub_tx_id: SubTxId,
        kernel_id: KernelId,
        /// Confirmation height, or absent if the kernel is not on chain.
        height: Option<Height>,
        tip: Height,
    },
    KernelData {
        tx_id: TxId,
        sub_tx_id: SubTxId,
        preimage: Option<[u8; 32]>,
    },
    OutputConfirmed {
        idx: u64,
        height: Height,
    },
    Cancel(TxId),
}

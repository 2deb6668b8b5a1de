//! Wallet-side data model: transaction identities, statuses, coins and the
//! outbound peer message.

pub mod base;
pub mod builder;
pub mod gateway;
pub mod keychain;
pub mod params;
pub mod scheduler;
pub mod simple;
pub mod store;
pub mod swap;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::{Amount, Height};
use params::ParamId;

/// 16-byte random transaction id shared by both peers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(pub [u8; 16]);

impl TxId {
    pub fn generate() -> TxId {
        TxId(*Uuid::new_v4().as_bytes())
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> anyhow::Result<TxId> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("tx id must be 16 bytes"))?;
        Ok(TxId(bytes))
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", hex::encode(&self.0[..4]))
    }
}

/// Public address of a wallet endpoint.
pub type WalletId = String;

/// Scope for parameters of the sub-protocols a swap is composed of. Simple
/// transactions use [`SubTxId::Main`] throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SubTxId {
    Main = 1,
    NativeLock = 2,
    NativeRefund = 3,
    NativeRedeem = 4,
    ExternalLock = 5,
    ExternalRedeem = 6,
    ExternalRefund = 7,
}

impl SubTxId {
    pub fn from_u32(value: u32) -> Option<SubTxId> {
        match value {
            1 => Some(SubTxId::Main),
            2 => Some(SubTxId::NativeLock),
            3 => Some(SubTxId::NativeRefund),
            4 => Some(SubTxId::NativeRedeem),
            5 => Some(SubTxId::ExternalLock),
            6 => Some(SubTxId::ExternalRedeem),
            7 => Some(SubTxId::ExternalRefund),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    Simple,
    Split,
    AtomicSwap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    InProgress,
    Registering,
    Completed,
    Failed,
    Cancelled,
}

impl TxStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TxStatus::Completed | TxStatus::Failed | TxStatus::Cancelled
        )
    }
}

/// Exactly one reason is recorded for every failed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NoInputs,
    TransactionExpired,
    InvalidPeerSignature,
    FailedToRegister,
    InvalidKernelProof,
    Cancelled,
    SwapSecondChainFailure,
    Unknown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            FailureReason::NoInputs => "not enough spendable inputs",
            FailureReason::TransactionExpired => "transaction expired",
            FailureReason::InvalidPeerSignature => "peer signature is not valid",
            FailureReason::FailedToRegister => "node rejected the transaction",
            FailureReason::InvalidKernelProof => "kernel appeared with an unexpected id",
            FailureReason::Cancelled => "cancelled",
            FailureReason::SwapSecondChainFailure => "second chain failed past the deadline",
            FailureReason::Unknown => "unexpected reason",
        };
        f.write_str(message)
    }
}

/// Raised inside a driver step to terminate the transaction with a recorded
/// reason; `notify` requests a best-effort failure message to the peer.
#[derive(Debug, thiserror::Error)]
#[error("transaction failed: {reason}")]
pub struct TxFailure {
    pub reason: FailureReason,
    pub notify: bool,
}

impl TxFailure {
    pub fn new(reason: FailureReason, notify: bool) -> anyhow::Error {
        anyhow::Error::new(TxFailure { reason, notify })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Regular,
    Change,
    Coinbase,
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinStatus {
    Available,
    Maturing,
    Outgoing,
    Spent,
}

/// Key material identity of a coin: the derivation index plus the data the
/// commitment is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinId {
    pub idx: u64,
    pub value: Amount,
    pub key_type: KeyType,
}

#[derive(Debug, Clone)]
pub struct Coin {
    pub id: CoinId,
    pub status: CoinStatus,
    pub create_tx_id: Option<TxId>,
    pub spent_tx_id: Option<TxId>,
    pub maturity: Option<Height>,
}

/// Transaction history row.
#[derive(Debug, Clone)]
pub struct TxRecord {
    pub tx_id: TxId,
    pub tx_type: TxType,
    pub status: TxStatus,
    pub amount: Amount,
    pub fee: Amount,
    pub change: Amount,
    pub min_height: Height,
    pub my_id: WalletId,
    pub peer_id: WalletId,
    pub is_sender: bool,
    pub is_initiator: bool,
    pub create_time: u64,
    pub modify_time: u64,
    pub failure_reason: Option<FailureReason>,
}

/// External coin kind on the second chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapCoin {
    Bitcoin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Blocks a negotiated transaction stays valid for: max-height is
    /// min-height plus this.
    pub lifetime: Height,
    /// Depth the kernel has to reach under the tip before completion.
    pub confirmation_depth: Height,
    /// Native-chain delay before the swap refund becomes spendable.
    pub native_lock_time: Height,
    /// External-chain lock time; must stay strictly greater than the native
    /// one.
    pub external_lock_time: Height,
}

impl Default for WalletConfig {
    fn default() -> WalletConfig {
        WalletConfig {
            lifetime: 240,
            confirmation_depth: 1,
            native_lock_time: 24 * 6,
            external_lock_time: 2 * 24 * 6,
        }
    }
}

/// Outbound parameter-set message, the only thing peers exchange.
#[derive(Debug, Clone)]
pub struct SetTxParameter {
    pub tx_id: TxId,
    pub sub_tx_id: SubTxId,
    pub tx_type: TxType,
    pub from: WalletId,
    pub to: WalletId,
    pub params: Vec<(ParamId, Vec<u8>)>,
}

impl SetTxParameter {
    pub fn add<T: params::ParamValue>(mut self, id: ParamId, value: &T) -> SetTxParameter {
        self.params.push((id, value.encode()));
        self
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Confidential-transaction wallet engine for a Mimblewimble-style chain:
//! interactive negotiation of blinded transactions between two peers, and
//! cross-chain atomic swaps against a Bitcoin-compatible second chain.
//!
//! The engine is a set of resumable state machines whose only state is a
//! persistent, parameter-addressed blackboard; every external event simply
//! re-enters `update()` on the owning transaction. Chain access, peer
//! transport and the external chain are consumed behind trait facades.

pub mod chain;
pub mod wallet;

pub use chain::crypto::Secret;
pub use chain::{Amount, ChainState, Height, Input, Kernel, KernelId, Output, Transaction};
pub use wallet::base::TxParams;
pub use wallet::gateway::{MessageEndpoint, NodeGateway, WalletEvent};
pub use wallet::keychain::Keychain;
pub use wallet::scheduler::{SwapParams, TransferOptions, Wallet};
pub use wallet::store::WalletStore;
pub use wallet::swap::second_side::SecondSide;
pub use wallet::{
    Coin, CoinId, CoinStatus, FailureReason, KeyType, SetTxParameter, SubTxId, SwapCoin, TxId,
    TxRecord, TxStatus, TxType, WalletConfig, WalletId,
};

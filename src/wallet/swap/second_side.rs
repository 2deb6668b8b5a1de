//! Facade over the external (Bitcoin-compatible) chain taking part in an
//! atomic swap. The engine only drives this interface; concrete bindings
//! talk to an RPC node, tests substitute an in-memory chain.
//!
//! All methods are polled from `update()`: a `false` return means "not yet,
//! ask again on the next event". Implementations keep their durable state in
//! the transaction's parameter set so a restart resumes cleanly.

use anyhow::Result;

use crate::chain::crypto::Secret;
use crate::wallet::base::TxParams;

pub trait SecondSide {
    /// Prepares external-chain addressing and keys; true once ready.
    fn init(&mut self, params: &mut TxParams<'_>) -> Result<bool>;

    /// Called on the initiator before the invitation goes out; settles the
    /// external lock-time parameter.
    fn init_lock_time(&mut self, params: &mut TxParams<'_>) -> Result<()>;

    fn build_lock_tx(&mut self, params: &mut TxParams<'_>) -> Result<bool>;
    fn publish_lock_tx(&mut self, params: &mut TxParams<'_>) -> Result<bool>;

    /// Whether the external lock is confirmed deep enough and carries the
    /// negotiated terms (amount, lock image, lock-time).
    fn confirm_lock_tx(&mut self, params: &mut TxParams<'_>) -> Result<bool>;

    /// Builds the claim of the external lock using the revealed secret.
    fn build_redeem_tx(&mut self, params: &mut TxParams<'_>, secret: &Secret) -> Result<bool>;

    /// Builds the refund spend, valid only past the external lock-time.
    fn build_refund_tx(&mut self, params: &mut TxParams<'_>) -> Result<bool>;

    /// Publishes whichever withdraw transaction was built last.
    fn publish_withdraw_tx(&mut self, params: &mut TxParams<'_>) -> Result<bool>;
    fn confirm_withdraw_tx(&mut self, params: &mut TxParams<'_>) -> Result<bool>;

    /// Observes the counterparty's external redeem and recovers the
    /// contract secret from it, if it is on chain.
    fn extract_secret_from_redeem(&mut self, params: &mut TxParams<'_>) -> Result<Option<Secret>>;

    /// Whether the external chain advanced past the negotiated lock-time.
    fn lock_time_expired(&mut self, params: &mut TxParams<'_>) -> Result<bool>;
}

//! Fake external (Bitcoin-style) chain and the [`SecondSide`] binding the
//! swap tests run against. Hash-locked contracts are tracked by their lock
//! image; redeems reveal the secret on chain exactly like a real HTLC spend
//! would.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::Result;

use mw_wallet::wallet::params::ParamId;
use mw_wallet::{Amount, Height, Secret, SecondSide, SubTxId, TxParams, WalletId};

use super::hub::TestHub;

#[derive(Debug, Clone)]
pub struct Htlc {
    pub amount: Amount,
    pub lock_time: Height,
    pub funder: WalletId,
    pub height: Height,
}

pub struct ExternalChain {
    pub height: Height,
    htlcs: HashMap<[u8; 32], Htlc>,
    redeems: HashMap<[u8; 32], ([u8; 32], Height)>,
    refunds: HashMap<[u8; 32], Height>,
    claimed: HashMap<WalletId, Amount>,
}

impl ExternalChain {
    pub fn new() -> ExternalChain {
        ExternalChain {
            height: 1,
            htlcs: HashMap::new(),
            redeems: HashMap::new(),
            refunds: HashMap::new(),
            claimed: HashMap::new(),
        }
    }

    pub fn htlc(&self, image: &[u8; 32]) -> Option<&Htlc> {
        self.htlcs.get(image)
    }

    pub fn redeem_secret(&self, image: &[u8; 32]) -> Option<[u8; 32]> {
        self.redeems.get(image).map(|(secret, _)| *secret)
    }

    pub fn is_refunded(&self, image: &[u8; 32]) -> bool {
        self.refunds.contains_key(image)
    }

    /// External units a wallet ended up with through redeems or refunds.
    pub fn claimed(&self, wallet_id: &WalletId) -> Amount {
        self.claimed.get(wallet_id).copied().unwrap_or(0)
    }
}

enum Staged {
    Redeem { image: [u8; 32], secret: [u8; 32] },
    Refund { image: [u8; 32] },
}

/// Second-side facade over the shared fake chain, one instance per wallet.
pub struct FakeSecondSide {
    hub: Rc<RefCell<TestHub>>,
    wallet_id: WalletId,
    /// Blocks between now and the external refund lock-time when this side
    /// initiates.
    pub lock_delta: Height,
    /// Test knob: pretend the external lock never confirms.
    pub confirm_lock_enabled: bool,
    staged: Option<Staged>,
}

impl FakeSecondSide {
    pub fn new(hub: Rc<RefCell<TestHub>>, wallet_id: WalletId, lock_delta: Height) -> FakeSecondSide {
        FakeSecondSide {
            hub,
            wallet_id,
            lock_delta,
            confirm_lock_enabled: true,
            staged: None,
        }
    }

    /// The contract lock image, wherever this side currently knows it from:
    /// its own secret (external owner) or the redeem negotiation.
    fn lock_image(&self, params: &TxParams<'_>) -> Result<Option<[u8; 32]>> {
        if let Some(image) = params.get(ParamId::SwapSecretPublic, SubTxId::Main)? {
            return Ok(Some(image));
        }
        params.get(ParamId::SwapSecretPublic, SubTxId::NativeRedeem)
    }
}

impl SecondSide for FakeSecondSide {
    fn init(&mut self, _params: &mut TxParams<'_>) -> Result<bool> {
        Ok(true)
    }

    fn init_lock_time(&mut self, params: &mut TxParams<'_>) -> Result<()> {
        if params
            .get::<Height>(ParamId::SwapLockTime, SubTxId::Main)?
            .is_none()
        {
            let lock_time = self.hub.borrow().external.height + self.lock_delta;
            params.set(ParamId::SwapLockTime, &lock_time, false, SubTxId::Main)?;
        }
        Ok(())
    }

    fn build_lock_tx(&mut self, params: &mut TxParams<'_>) -> Result<bool> {
        Ok(self.lock_image(params)?.is_some())
    }

    fn publish_lock_tx(&mut self, params: &mut TxParams<'_>) -> Result<bool> {
        let Some(image) = self.lock_image(params)? else {
            return Ok(false);
        };
        let amount: Amount = params
            .get(ParamId::SwapAmount, SubTxId::Main)?
            .ok_or_else(|| anyhow::anyhow!("swap amount not negotiated"))?;
        let lock_time: Height = params
            .get(ParamId::SwapLockTime, SubTxId::Main)?
            .ok_or_else(|| anyhow::anyhow!("swap lock-time not negotiated"))?;

        let mut hub = self.hub.borrow_mut();
        let height = hub.external.height;
        hub.external.htlcs.entry(image).or_insert(Htlc {
            amount,
            lock_time,
            funder: self.wallet_id.clone(),
            height,
        });
        Ok(true)
    }

    fn confirm_lock_tx(&mut self, params: &mut TxParams<'_>) -> Result<bool> {
        if !self.confirm_lock_enabled {
            return Ok(false);
        }
        let Some(image) = self.lock_image(params)? else {
            return Ok(false);
        };
        let amount: Option<Amount> = params.get(ParamId::SwapAmount, SubTxId::Main)?;
        let lock_time: Option<Height> = params.get(ParamId::SwapLockTime, SubTxId::Main)?;

        let hub = self.hub.borrow();
        let Some(htlc) = hub.external.htlc(&image) else {
            return Ok(false);
        };
        Ok(Some(htlc.amount) == amount
            && Some(htlc.lock_time) == lock_time
            && htlc.height <= hub.external.height)
    }

    fn build_redeem_tx(&mut self, params: &mut TxParams<'_>, secret: &Secret) -> Result<bool> {
        let image = secret.hash();
        if self.lock_image(params)?.is_some_and(|known| known != image) {
            anyhow::bail!("secret does not match the negotiated lock image");
        }
        if self.hub.borrow().external.htlc(&image).is_none() {
            return Ok(false);
        }
        self.staged = Some(Staged::Redeem { image, secret: *secret.as_bytes() });
        Ok(true)
    }

    fn build_refund_tx(&mut self, params: &mut TxParams<'_>) -> Result<bool> {
        let Some(image) = self.lock_image(params)? else {
            return Ok(false);
        };
        let hub = self.hub.borrow();
        let Some(htlc) = hub.external.htlc(&image) else {
            return Ok(false);
        };
        if hub.external.height <= htlc.lock_time {
            return Ok(false);
        }
        drop(hub);
        self.staged = Some(Staged::Refund { image });
        Ok(true)
    }

    fn publish_withdraw_tx(&mut self, _params: &mut TxParams<'_>) -> Result<bool> {
        let Some(staged) = &self.staged else {
            return Ok(false);
        };
        let mut hub = self.hub.borrow_mut();
        let height = hub.external.height;
        match staged {
            Staged::Redeem { image, secret } => {
                if hub.external.is_refunded(image) {
                    anyhow::bail!("contract already refunded");
                }
                if hub.external.redeems.contains_key(image) {
                    return Ok(true);
                }
                let amount = hub
                    .external
                    .htlc(image)
                    .map(|htlc| htlc.amount)
                    .ok_or_else(|| anyhow::anyhow!("no contract to redeem"))?;
                hub.external.redeems.insert(*image, (*secret, height));
                *hub.external.claimed.entry(self.wallet_id.clone()).or_default() += amount;
                Ok(true)
            }
            Staged::Refund { image } => {
                if hub.external.redeems.contains_key(image) {
                    anyhow::bail!("contract already redeemed");
                }
                if hub.external.is_refunded(image) {
                    return Ok(true);
                }
                let htlc = hub
                    .external
                    .htlc(image)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no contract to refund"))?;
                if height <= htlc.lock_time {
                    return Ok(false);
                }
                hub.external.refunds.insert(*image, height);
                *hub.external.claimed.entry(htlc.funder).or_default() += htlc.amount;
                Ok(true)
            }
        }
    }

    fn confirm_withdraw_tx(&mut self, _params: &mut TxParams<'_>) -> Result<bool> {
        let Some(staged) = &self.staged else {
            return Ok(false);
        };
        let hub = self.hub.borrow();
        Ok(match staged {
            Staged::Redeem { image, .. } => hub.external.redeems.contains_key(image),
            Staged::Refund { image } => hub.external.is_refunded(image),
        })
    }

    fn extract_secret_from_redeem(&mut self, params: &mut TxParams<'_>) -> Result<Option<Secret>> {
        let Some(image) = self.lock_image(params)? else {
            return Ok(None);
        };
        Ok(self
            .hub
            .borrow()
            .external
            .redeem_secret(&image)
            .map(Secret::from_bytes))
    }

    fn lock_time_expired(&mut self, params: &mut TxParams<'_>) -> Result<bool> {
        let Some(lock_time) = params.get::<Height>(ParamId::SwapLockTime, SubTxId::Main)? else {
            return Ok(false);
        };
        Ok(self.hub.borrow().external.height > lock_time)
    }
}

//! Assembles confidential transactions: input selection, change synthesis,
//! kernel construction and the two-party partial signing rounds.
//!
//! Every mutation is persisted through the parameter store, so a builder
//! reconstructed after a restart continues exactly where the previous one
//! stopped.

use anyhow::Result;
use tracing::{debug, info};

use crate::chain::crypto::{Point, Scalar, challenge, sign_partial, verify_partial};
use crate::chain::{
    Amount, Height, Input, Kernel, KernelId, KernelSignature, MAX_HEIGHT, Output, Transaction,
};
use crate::wallet::base::TxContext;
use crate::wallet::params::ParamId;
use crate::wallet::{CoinId, CoinStatus, FailureReason, KeyType, SubTxId, TxFailure};

pub(crate) struct TxBuilder {
    pub sub_tx: SubTxId,
    pub amounts: Vec<Amount>,
    pub fee: Amount,
    pub change: Amount,
    pub lifetime: Height,
    pub min_height: Height,
    pub max_height: Height,
    pub peer_max_height: Option<Height>,

    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    /// Σ input blindings − Σ output blindings, as persisted. The working
    /// offset gains the kernel blinding once the kernel exists.
    pub offset: Scalar,
    /// Negated kernel blinding; the secret this side signs with.
    pub excess: Scalar,
    pub nonce: Scalar,

    pub peer_public_excess: Option<Point>,
    pub peer_public_nonce: Option<Point>,
    pub peer_signature: Option<Scalar>,
    pub peer_outputs: Vec<Output>,
    pub peer_offset: Scalar,

    pub kernel: Option<Kernel>,
    pub hash_lock: Option<[u8; 32]>,
    pub partial_signature: Option<Scalar>,
    challenge: Option<Scalar>,

    initialized: bool,
}

impl TxBuilder {
    /// Loads whatever the parameter set already holds for this sub-tx.
    pub fn load(
        ctx: &mut TxContext<'_>,
        sub_tx: SubTxId,
        amounts: Vec<Amount>,
        fee: Amount,
    ) -> Result<TxBuilder> {
        let inputs = ctx.get_param(ParamId::Inputs, sub_tx)?.unwrap_or_default();
        let outputs: Vec<Output> = ctx.get_param(ParamId::Outputs, sub_tx)?.unwrap_or_default();
        let offset: Option<Scalar> = ctx.get_param(ParamId::Offset, sub_tx)?;

        let min_height = match ctx.get_param(ParamId::MinHeight, sub_tx)? {
            Some(height) => height,
            None => {
                // allows building while the node is still syncing
                let height = ctx.tip.map(|t| t.height).unwrap_or(0);
                ctx.set_param(ParamId::MinHeight, &height, false, sub_tx)?;
                height
            }
        };
        let lifetime = ctx
            .get_param(ParamId::Lifetime, sub_tx)?
            .unwrap_or(ctx.config.lifetime);
        let max_height = ctx
            .get_param(ParamId::MaxHeight, sub_tx)?
            .unwrap_or(MAX_HEIGHT);
        let peer_max_height = ctx.get_param(ParamId::PeerMaxHeight, sub_tx)?;

        let peer_outputs = ctx
            .get_param(ParamId::PeerOutputs, sub_tx)?
            .unwrap_or_default();

        Ok(TxBuilder {
            sub_tx,
            amounts,
            fee,
            change: ctx.get_param(ParamId::Change, sub_tx)?.unwrap_or(0),
            lifetime,
            min_height,
            max_height,
            peer_max_height,
            inputs,
            outputs,
            offset: offset.unwrap_or(Scalar::ZERO),
            excess: Scalar::ZERO,
            nonce: Scalar::ZERO,
            peer_public_excess: ctx.get_param(ParamId::PeerPublicExcess, sub_tx)?,
            peer_public_nonce: ctx.get_param(ParamId::PeerPublicNonce, sub_tx)?,
            peer_signature: ctx.get_param(ParamId::PeerSignature, sub_tx)?,
            peer_outputs,
            peer_offset: ctx
                .get_param(ParamId::PeerOffset, sub_tx)?
                .unwrap_or(Scalar::ZERO),
            kernel: None,
            hash_lock: None,
            partial_signature: None,
            challenge: None,
            initialized: offset.is_some(),
        })
    }

    /// Whether inputs/outputs/offset were already committed to the store in
    /// an earlier update.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn amount(&self) -> Amount {
        self.amounts.iter().sum()
    }

    /// Picks inputs for amount + fee and reserves them. Preselected coins
    /// override selection and must cover the target on their own.
    pub fn select_inputs(&mut self, ctx: &mut TxContext<'_>) -> Result<()> {
        let target = self.amount() + self.fee;

        let preselected: Option<Vec<CoinId>> = ctx.get_param(ParamId::PreselectedCoins, self.sub_tx)?;
        let coins = match preselected {
            Some(ids) if !ids.is_empty() => {
                let coins = ctx.store.coins_by_id(&ids)?;
                let total: Amount = coins.iter().map(|c| c.id.value).sum();
                if total < target {
                    return Err(TxFailure::new(FailureReason::NoInputs, !ctx.is_initiator()));
                }
                coins
            }
            _ => ctx.store.select_coins(target)?,
        };

        if coins.is_empty() {
            info!(
                tx = %ctx.tx_id,
                available = ctx.store.available_total()?,
                target,
                "not enough spendable coins"
            );
            return Err(TxFailure::new(FailureReason::NoInputs, !ctx.is_initiator()));
        }

        let mut total = 0;
        for mut coin in coins {
            coin.status = CoinStatus::Outgoing;
            coin.spent_tx_id = Some(ctx.tx_id);
            ctx.store.save_coin(&coin)?;

            let blinding = ctx.keychain.coin_blinding(&coin.id);
            self.offset = self.offset.add(blinding);
            self.inputs.push(ctx.keychain.input(&coin.id));
            total += coin.id.value;
        }

        self.change = total - target;
        ctx.set_param(ParamId::Change, &self.change, false, self.sub_tx)?;
        ctx.store.set_tx_change(ctx.tx_id, self.change)?;
        ctx.set_param(ParamId::Inputs, &self.inputs, false, self.sub_tx)?;
        ctx.set_param(ParamId::Offset, &self.offset, true, self.sub_tx)?;
        Ok(())
    }

    pub fn add_change_output(&mut self, ctx: &mut TxContext<'_>) -> Result<()> {
        if self.change == 0 {
            return Ok(());
        }
        let change = self.change;
        self.add_output(ctx, change, KeyType::Change)
    }

    /// Creates a new wallet coin and the confidential output for it. The
    /// coin stays `maturing` until the kernel confirms.
    pub fn add_output(
        &mut self,
        ctx: &mut TxContext<'_>,
        amount: Amount,
        key_type: KeyType,
    ) -> Result<()> {
        let id = ctx
            .store
            .store_coin(amount, key_type, CoinStatus::Maturing, Some(ctx.tx_id))?;

        let blinding = ctx.keychain.coin_blinding(&id);
        self.offset = self.offset.sub(blinding);
        self.outputs.push(ctx.keychain.output(&id));
        Ok(())
    }

    /// Persists outputs and the accumulated offset after output creation.
    pub fn finalize_outputs(&mut self, ctx: &mut TxContext<'_>) -> Result<()> {
        ctx.set_param(ParamId::Outputs, &self.outputs, false, self.sub_tx)?;
        ctx.set_param(ParamId::Offset, &self.offset, true, self.sub_tx)?;
        self.initialized = true;
        Ok(())
    }

    pub fn get_peer_public(&mut self, ctx: &TxContext<'_>) -> Result<bool> {
        self.peer_public_excess = ctx.get_param(ParamId::PeerPublicExcess, self.sub_tx)?;
        self.peer_public_nonce = ctx.get_param(ParamId::PeerPublicNonce, self.sub_tx)?;
        Ok(self.peer_public_excess.is_some() && self.peer_public_nonce.is_some())
    }

    pub fn get_peer_signature(&mut self, ctx: &TxContext<'_>) -> Result<bool> {
        self.peer_signature = ctx.get_param(ParamId::PeerSignature, self.sub_tx)?;
        Ok(self.peer_signature.is_some())
    }

    /// Settles max-height between the peers: the non-initiator derives it
    /// from its own tip and the advertised lifetime; the initiator adopts
    /// the peer's value after a sanity bound.
    pub fn update_max_height(&mut self, ctx: &TxContext<'_>) -> Result<bool> {
        if self.max_height != MAX_HEIGHT {
            return Ok(true);
        }
        let has_peer_max = self.peer_max_height.is_some_and(|h| h < MAX_HEIGHT);

        if !ctx.is_initiator() {
            if let Some(tip) = ctx.tip {
                self.max_height = tip.height + self.lifetime;
            } else if let Some(peer_max) = self.peer_max_height.filter(|h| *h < MAX_HEIGHT) {
                self.max_height = peer_max;
            }
        } else if has_peer_max {
            let peer_max = self.peer_max_height.unwrap_or(MAX_HEIGHT);
            if peer_max > self.min_height.saturating_add(self.lifetime.saturating_mul(2)) {
                return Ok(false);
            }
            self.max_height = peer_max;
        }
        Ok(true)
    }

    /// Derives this side's signing secrets. The kernel blinding and the raw
    /// nonce entropy are persisted, never the derived nonce itself; a
    /// restart re-derives the same nonce instead of signing with a second
    /// one. Call exactly once per update.
    pub fn prepare_signing(&mut self, ctx: &mut TxContext<'_>) -> Result<()> {
        let blinding = match ctx.get_param::<Scalar>(ParamId::BlindingExcess, self.sub_tx)? {
            Some(blinding) => blinding,
            None => {
                let blinding = Scalar::random();
                ctx.set_param(ParamId::BlindingExcess, &blinding, false, self.sub_tx)?;
                blinding
            }
        };
        self.offset = self.offset.add(blinding);
        self.excess = blinding.neg();

        let entropy = match ctx.get_param::<[u8; 32]>(ParamId::Nonce, self.sub_tx)? {
            Some(entropy) => entropy,
            None => {
                let entropy: [u8; 32] = rand::random();
                ctx.set_param(ParamId::Nonce, &entropy, false, self.sub_tx)?;
                entropy
            }
        };
        self.nonce = ctx.keychain.nonce(&entropy);
        Ok(())
    }

    /// Max-height to advertise before negotiation settles it.
    pub fn max_height_hint(&self) -> Height {
        if self.max_height == MAX_HEIGHT {
            self.min_height + self.lifetime
        } else {
            self.max_height
        }
    }

    /// Builds the kernel skeleton once the height bounds are final.
    pub fn create_kernel(&mut self, ctx: &mut TxContext<'_>) -> Result<()> {
        let mut kernel = Kernel::new(self.fee, self.min_height, self.max_height);
        kernel.hash_lock = self.hash_lock;
        self.kernel = Some(kernel);

        if self.sub_tx == SubTxId::Main {
            ctx.set_param(ParamId::MaxHeight, &self.max_height, false, SubTxId::Main)?;
        }
        Ok(())
    }

    pub fn public_excess(&self) -> Point {
        Point::generator(&self.excess)
    }

    pub fn public_nonce(&self) -> Point {
        Point::generator(&self.nonce)
    }

    fn total_public_excess(&self) -> Point {
        let mut total = self.public_excess();
        if let Some(peer) = self.peer_public_excess {
            total = total.add(peer);
        }
        total
    }

    fn total_public_nonce(&self) -> Point {
        let mut total = self.public_nonce();
        if let Some(peer) = self.peer_public_nonce {
            total = total.add(peer);
        }
        total
    }

    /// Commits the kernel to the aggregate excess and produces this side's
    /// partial signature; also pins the kernel id.
    pub fn sign_partial(&mut self, ctx: &mut TxContext<'_>) -> Result<()> {
        let total_excess = self.total_public_excess();
        let total_nonce = self.total_public_nonce();
        let kernel = self.kernel.as_mut().expect("create_kernel runs first");
        kernel.excess = total_excess;

        let message = kernel.message();
        let e = challenge(&total_nonce, &kernel.excess, &message);

        self.partial_signature = Some(sign_partial(&self.nonce, &self.excess, &e));
        self.challenge = Some(e);

        let kernel_id = kernel.id();
        debug!(tx = %ctx.tx_id, kernel = %kernel_id, "kernel signed partially");
        ctx.set_param(ParamId::KernelId, &kernel_id, true, self.sub_tx)?;
        Ok(())
    }

    pub fn is_peer_signature_valid(&self) -> bool {
        let (Some(peer_sig), Some(peer_nonce), Some(peer_excess), Some(e)) = (
            self.peer_signature.as_ref(),
            self.peer_public_nonce.as_ref(),
            self.peer_public_excess.as_ref(),
            self.challenge.as_ref(),
        ) else {
            return false;
        };
        verify_partial(peer_sig, peer_nonce, peer_excess, e)
    }

    pub fn partial_signature(&self) -> Scalar {
        self.partial_signature
            .expect("sign_partial runs before the signature is read")
    }

    /// Working offset: persisted coin terms plus the kernel blinding.
    pub fn current_offset(&self) -> Scalar {
        self.offset
    }

    pub fn kernel_id(&self) -> KernelId {
        self.kernel.as_ref().expect("kernel exists").id()
    }

    pub fn finalize_signature(&mut self) {
        let total = match self.peer_signature {
            Some(peer) => self.partial_signature().add(peer),
            None => self.partial_signature(),
        };
        let total_nonce = self.total_public_nonce();
        let kernel = self.kernel.as_mut().expect("kernel exists");
        kernel.signature = Some(KernelSignature {
            public_nonce: total_nonce,
            s: total,
        });
    }

    /// Assembles the final transaction from both sides' contributions.
    pub fn create_transaction(&mut self, ctx: &TxContext<'_>) -> Result<Transaction> {
        let kernel = self.kernel.clone().expect("kernel exists");
        info!(
            tx = %ctx.tx_id,
            kernel = %kernel.id(),
            min_height = kernel.min_height,
            max_height = kernel.max_height,
            "transaction assembled"
        );

        let mut outputs = self.outputs.clone();
        outputs.extend(self.peer_outputs.iter().copied());

        let mut tx = Transaction {
            inputs: self.inputs.clone(),
            outputs,
            kernel,
            offset: self.offset.add(self.peer_offset),
            preimage: None,
        };
        tx.normalize();
        Ok(tx)
    }
}

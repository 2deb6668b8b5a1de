//! Chain-level primitives shared by the wallet and the node gateway: inputs,
//! outputs, kernels, full transactions and their validation rules.

pub mod crypto;

use std::fmt;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crypto::{Point, RangeProof, Scalar, challenge, sha256, verify_partial};

pub type Amount = u64;
pub type Height = u64;

pub const MAX_HEIGHT: Height = u64::MAX;

/// Spent confidential output, referenced by its commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    pub commitment: Point,
}

/// Confidential output: commitment plus range proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    pub commitment: Point,
    pub proof: RangeProof,
}

/// Hash identifying a kernel on chain, used for confirmation lookups.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub [u8; 32]);

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KernelId({})", hex::encode(&self.0[..6]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSignature {
    pub public_nonce: Point,
    pub s: Scalar,
}

/// Non-confidential transaction authenticator: a Schnorr signature over the
/// aggregate excess committing to fee and height bounds, optionally guarded
/// by a hash lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernel {
    pub excess: Point,
    pub fee: Amount,
    pub min_height: Height,
    pub max_height: Height,
    pub hash_lock: Option<[u8; 32]>,
    pub signature: Option<KernelSignature>,
}

impl Kernel {
    pub fn new(fee: Amount, min_height: Height, max_height: Height) -> Kernel {
        Kernel {
            excess: Point::IDENTITY,
            fee,
            min_height,
            max_height,
            hash_lock: None,
            signature: None,
        }
    }

    /// Message the multisig signs. Commits to the aggregate excess, fee,
    /// height bounds and hash lock; doubles as the kernel id so both sides
    /// agree on the id before any signature exists.
    pub fn message(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"mw-wallet/kernel");
        hasher.update(self.excess.serialize());
        hasher.update(self.fee.to_be_bytes());
        hasher.update(self.min_height.to_be_bytes());
        hasher.update(self.max_height.to_be_bytes());
        match &self.hash_lock {
            Some(lock) => {
                hasher.update([1u8]);
                hasher.update(lock);
            }
            None => hasher.update([0u8]),
        }
        hasher.finalize().into()
    }

    pub fn id(&self) -> KernelId {
        KernelId(self.message())
    }

    pub fn verify_signature(&self) -> Result<()> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("kernel is not signed"))?;
        let e = challenge(&signature.public_nonce, &self.excess, &self.message());
        anyhow::ensure!(
            verify_partial(&signature.s, &signature.public_nonce, &self.excess, &e),
            "kernel signature does not verify"
        );
        Ok(())
    }
}

/// Full transaction as handed to the node gateway. Exactly one kernel per
/// transaction; the optional preimage satisfies the kernel's hash lock.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub kernel: Kernel,
    pub offset: Scalar,
    pub preimage: Option<[u8; 32]>,
}

impl Transaction {
    /// Canonical ordering of inputs and outputs by commitment bytes.
    pub fn normalize(&mut self) {
        self.inputs
            .sort_by_key(|input| input.commitment.serialize());
        self.outputs
            .sort_by_key(|output| output.commitment.serialize());
    }

    /// Consensus-level validity: range proofs, the aggregate commitment
    /// equation `Σinputs − Σoutputs − fee·H = excess + offset·G`, the kernel
    /// signature and the hash-lock witness.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.inputs.is_empty(), "transaction has no inputs");

        for output in &self.outputs {
            anyhow::ensure!(
                output.proof.verify(&output.commitment),
                "output range proof is invalid"
            );
        }

        let mut balance = Point::IDENTITY;
        for input in &self.inputs {
            balance = balance.add(input.commitment);
        }
        for output in &self.outputs {
            balance = balance.sub(output.commitment);
        }
        balance = balance.sub(Point::value(self.kernel.fee));

        let expected = self.kernel.excess.add(Point::generator(&self.offset));
        anyhow::ensure!(balance == expected, "transaction does not balance");

        self.kernel.verify_signature()?;

        if let Some(lock) = &self.kernel.hash_lock {
            let preimage = self
                .preimage
                .ok_or_else(|| anyhow::anyhow!("hash-locked kernel without preimage"))?;
            anyhow::ensure!(sha256(&preimage) == *lock, "hash-lock preimage mismatch");
        }

        Ok(())
    }
}

/// Tip of the chain as reported by the node gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainState {
    pub height: Height,
}

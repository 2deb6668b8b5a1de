//! Curve arithmetic used by the negotiation engine: scalars and points over
//! secp256k1, Pedersen commitments against a NUMS second generator, and the
//! two-party Schnorr signing primitives.

use std::fmt;
use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

static SECP: LazyLock<Secp256k1<All>> = LazyLock::new(Secp256k1::new);

/// Value generator `H`. Nothing-up-my-sleeve: the first valid curve point
/// whose compressed encoding is `02 || SHA256(tag || counter)`.
static GEN_H: LazyLock<PublicKey> = LazyLock::new(|| {
    let mut counter = 0u32;
    loop {
        let mut hasher = Sha256::new();
        hasher.update(b"mw-wallet/value-generator");
        hasher.update(counter.to_be_bytes());
        let digest = hasher.finalize();

        let mut candidate = [0u8; 33];
        candidate[0] = 0x02;
        candidate[1..].copy_from_slice(&digest);
        if let Ok(point) = PublicKey::from_slice(&candidate) {
            return point;
        }
        counter += 1;
    }
});

fn tweak_of(key: &SecretKey) -> secp256k1::Scalar {
    secp256k1::Scalar::from_be_bytes(key.secret_bytes())
        .expect("secret key bytes are a valid scalar")
}

/// Scalar mod the secp256k1 group order. Zero is representable so the type
/// can act as an accumulator for blinding sums.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Scalar(Option<SecretKey>);

impl Scalar {
    pub const ZERO: Scalar = Scalar(None);

    pub fn random() -> Scalar {
        loop {
            let bytes: [u8; 32] = rand::random();
            if let Ok(key) = SecretKey::from_slice(&bytes) {
                return Scalar(Some(key));
            }
        }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Scalar> {
        if bytes == [0u8; 32] {
            return Ok(Scalar::ZERO);
        }
        let key = SecretKey::from_slice(&bytes)
            .map_err(|e| anyhow!("scalar out of range: {e}"))?;
        Ok(Scalar(Some(key)))
    }

    pub fn from_u64(value: u64) -> Scalar {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Scalar::from_bytes(bytes).expect("u64 is below the group order")
    }

    pub fn to_bytes(self) -> [u8; 32] {
        match self.0 {
            Some(key) => key.secret_bytes(),
            None => [0u8; 32],
        }
    }

    pub fn is_zero(self) -> bool {
        self.0.is_none()
    }

    pub fn add(self, rhs: Scalar) -> Scalar {
        match (self.0, rhs.0) {
            (None, _) => rhs,
            (_, None) => self,
            // add_tweak only fails when the sum is zero
            (Some(a), Some(b)) => match a.add_tweak(&tweak_of(&b)) {
                Ok(sum) => Scalar(Some(sum)),
                Err(_) => Scalar::ZERO,
            },
        }
    }

    pub fn neg(self) -> Scalar {
        Scalar(self.0.map(SecretKey::negate))
    }

    pub fn sub(self, rhs: Scalar) -> Scalar {
        self.add(rhs.neg())
    }

    pub fn mul(self, rhs: Scalar) -> Scalar {
        match (self.0, rhs.0) {
            (None, _) | (_, None) => Scalar::ZERO,
            (Some(a), Some(b)) => {
                let product = a
                    .mul_tweak(&tweak_of(&b))
                    .expect("product of nonzero scalars is nonzero");
                Scalar(Some(product))
            }
        }
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scalar({})", hex::encode(&self.to_bytes()[..4]))
    }
}

/// Curve point, with the identity representable for the same accumulator
/// reasons as [`Scalar::ZERO`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Point(Option<PublicKey>);

impl Point {
    pub const IDENTITY: Point = Point(None);

    /// `s·G`
    pub fn generator(scalar: &Scalar) -> Point {
        match scalar.0 {
            None => Point::IDENTITY,
            Some(key) => Point(Some(PublicKey::from_secret_key(&SECP, &key))),
        }
    }

    /// `v·H`
    pub fn value(amount: u64) -> Point {
        Point(Some(*GEN_H)).mul(&Scalar::from_u64(amount))
    }

    pub fn add(self, rhs: Point) -> Point {
        match (self.0, rhs.0) {
            (None, _) => rhs,
            (_, None) => self,
            // combine only fails when the sum is the point at infinity
            (Some(a), Some(b)) => match a.combine(&b) {
                Ok(sum) => Point(Some(sum)),
                Err(_) => Point::IDENTITY,
            },
        }
    }

    pub fn neg(self) -> Point {
        Point(self.0.map(|p| p.negate(&SECP)))
    }

    pub fn sub(self, rhs: Point) -> Point {
        self.add(rhs.neg())
    }

    pub fn mul(self, scalar: &Scalar) -> Point {
        match (self.0, scalar.0) {
            (None, _) | (_, None) => Point::IDENTITY,
            (Some(p), Some(s)) => match p.mul_tweak(&SECP, &tweak_of(&s)) {
                Ok(product) => Point(Some(product)),
                Err(_) => Point::IDENTITY,
            },
        }
    }

    pub fn serialize(self) -> [u8; 33] {
        match self.0 {
            Some(p) => p.serialize(),
            None => [0u8; 33],
        }
    }

    pub fn from_bytes(bytes: &[u8; 33]) -> Result<Point> {
        if bytes == &[0u8; 33] {
            return Ok(Point::IDENTITY);
        }
        let point =
            PublicKey::from_slice(bytes).map_err(|e| anyhow!("invalid curve point: {e}"))?;
        Ok(Point(Some(point)))
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({})", hex::encode(&self.serialize()[..5]))
    }
}

/// Pedersen commitment `v·H + r·G`.
pub fn commit(value: u64, blinding: &Scalar) -> Point {
    Point::value(value).add(Point::generator(blinding))
}

/// Schnorr challenge `e = H(R || X || message)`.
pub fn challenge(total_nonce: &Point, total_excess: &Point, message: &[u8; 32]) -> Scalar {
    let mut counter = 0u32;
    loop {
        let mut hasher = Sha256::new();
        hasher.update(b"mw-wallet/challenge");
        hasher.update(total_nonce.serialize());
        hasher.update(total_excess.serialize());
        hasher.update(message);
        hasher.update(counter.to_be_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        if let Ok(e) = Scalar::from_bytes(digest)
            && !e.is_zero()
        {
            return e;
        }
        counter += 1;
    }
}

/// Partial signature `s = k + e·x`.
pub fn sign_partial(nonce: &Scalar, excess: &Scalar, challenge: &Scalar) -> Scalar {
    nonce.add(challenge.mul(*excess))
}

/// Checks `s·G == R + e·X` for one party's share.
pub fn verify_partial(
    signature: &Scalar,
    public_nonce: &Point,
    public_excess: &Point,
    challenge: &Scalar,
) -> bool {
    Point::generator(signature) == public_nonce.add(public_excess.mul(challenge))
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Contract secret for hash-locked spends. Zeroed on drop; only ever stored
/// in cleartext on the side that will reveal it.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; 32]);

impl Secret {
    pub fn random() -> Secret {
        Secret(rand::random())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Secret {
        Secret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The public lock image `H(secret)`.
    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.0)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Opaque range proof attached to every confidential output. The proof
/// system itself lives behind the keychain facade; this carrier binds the
/// commitment so a proof transplanted onto another output is rejected.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RangeProof([u8; 32]);

impl RangeProof {
    pub fn create(commitment: &Point) -> RangeProof {
        let mut hasher = Sha256::new();
        hasher.update(b"mw-wallet/range-proof");
        hasher.update(commitment.serialize());
        RangeProof(hasher.finalize().into())
    }

    pub fn verify(&self, commitment: &Point) -> bool {
        *self == RangeProof::create(commitment)
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn from_bytes(bytes: [u8; 32]) -> RangeProof {
        RangeProof(bytes)
    }
}

impl fmt::Debug for RangeProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RangeProof({})", hex::encode(&self.0[..4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_arithmetic_round_trips() {
        let a = Scalar::random();
        let b = Scalar::random();

        assert_eq!(a.add(b), b.add(a));
        assert_eq!(a.add(b).sub(b), a);
        assert_eq!(a.add(a.neg()), Scalar::ZERO);
        assert_eq!(Scalar::ZERO.add(a), a);
        assert_eq!(a.mul(Scalar::ZERO), Scalar::ZERO);

        let restored = Scalar::from_bytes(a.to_bytes()).unwrap();
        assert_eq!(restored, a);
    }

    #[test]
    fn point_mirrors_scalar_arithmetic() {
        let a = Scalar::random();
        let b = Scalar::random();

        let sum = Point::generator(&a).add(Point::generator(&b));
        assert_eq!(sum, Point::generator(&a.add(b)));

        let doubled = Point::generator(&a).mul(&Scalar::from_u64(2));
        assert_eq!(doubled, Point::generator(&a.add(a)));

        assert_eq!(
            Point::generator(&a).add(Point::generator(&a.neg())),
            Point::IDENTITY
        );

        let restored = Point::from_bytes(&Point::generator(&a).serialize()).unwrap();
        assert_eq!(restored, Point::generator(&a));
    }

    #[test]
    fn commitments_are_additively_homomorphic() {
        let r1 = Scalar::random();
        let r2 = Scalar::random();

        let lhs = commit(3, &r1).add(commit(4, &r2));
        let rhs = commit(7, &r1.add(r2));
        assert_eq!(lhs, rhs);

        // v·H alone differs from (v·H + r·G)
        assert_ne!(commit(7, &Scalar::ZERO), rhs);
    }

    #[test]
    fn two_party_schnorr_verifies() {
        let x_s = Scalar::random();
        let x_r = Scalar::random();
        let k_s = Scalar::random();
        let k_r = Scalar::random();

        let total_excess = Point::generator(&x_s).add(Point::generator(&x_r));
        let total_nonce = Point::generator(&k_s).add(Point::generator(&k_r));
        let message = sha256(b"kernel message");
        let e = challenge(&total_nonce, &total_excess, &message);

        let s_s = sign_partial(&k_s, &x_s, &e);
        let s_r = sign_partial(&k_r, &x_r, &e);

        assert!(verify_partial(&s_s, &Point::generator(&k_s), &Point::generator(&x_s), &e));
        assert!(verify_partial(&s_r, &Point::generator(&k_r), &Point::generator(&x_r), &e));

        let total = s_s.add(s_r);
        assert!(verify_partial(&total, &total_nonce, &total_excess, &e));

        // a tampered partial must not verify
        let bad = s_r.add(Scalar::from_u64(1));
        assert!(!verify_partial(&bad, &Point::generator(&k_r), &Point::generator(&x_r), &e));
    }

    #[test]
    fn range_proof_binds_commitment() {
        let blinding = Scalar::random();
        let commitment = commit(42, &blinding);
        let proof = RangeProof::create(&commitment);

        assert!(proof.verify(&commitment));

        let other = commit(43, &blinding);
        assert!(!proof.verify(&other));
    }
}

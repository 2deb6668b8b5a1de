//! The typed parameter blackboard: a closed id enumeration and the canonical
//! byte codec every value crosses the store and the wire with.
//!
//! Encoding rules: integers big-endian, curve points compressed (33 bytes),
//! scalars fixed 32 bytes, lists length-prefixed with a big-endian u32 count.

use anyhow::{Result, anyhow};

use crate::chain::crypto::{Point, RangeProof, Scalar};
use crate::chain::{Input, KernelId, Output};
use crate::wallet::{CoinId, FailureReason, KeyType, SwapCoin, TxId, TxType};

/// Closed enumeration of every parameter the protocol persists or sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ParamId {
    TransactionType = 0,
    Amount = 1,
    Fee = 2,
    MinHeight = 3,
    MaxHeight = 4,
    Lifetime = 5,
    PeerMaxHeight = 6,
    IsSender = 7,
    IsInitiator = 8,
    AmountList = 9,
    PreselectedCoins = 10,
    Change = 11,
    MyId = 12,
    PeerId = 13,
    State = 14,

    PeerOutputs = 21,
    Inputs = 22,
    Outputs = 23,
    Offset = 24,
    PeerOffset = 25,
    BlindingExcess = 26,
    Nonce = 27,
    PeerPublicExcess = 28,
    PeerPublicNonce = 29,
    PartialSignature = 30,
    PeerSignature = 31,
    KernelId = 32,
    TransactionRegistered = 33,
    KernelProofHeight = 34,
    KernelUnconfirmedHeight = 35,
    FailureReason = 36,

    SharedBlindingFactor = 40,
    PeerPublicSharedBlindingFactor = 41,
    SharedCoinId = 42,

    SwapCoin = 50,
    SwapAmount = 51,
    SwapFeeRate = 52,
    SwapLockTime = 53,
    SwapSecretPrivate = 54,
    SwapSecretPublic = 55,
    SwapPeerPublic = 56,
}

impl ParamId {
    pub fn from_u32(value: u32) -> Option<ParamId> {
        use ParamId::*;
        let id = match value {
            0 => TransactionType,
            1 => Amount,
            2 => Fee,
            3 => MinHeight,
            4 => MaxHeight,
            5 => Lifetime,
            6 => PeerMaxHeight,
            7 => IsSender,
            8 => IsInitiator,
            9 => AmountList,
            10 => PreselectedCoins,
            11 => Change,
            12 => MyId,
            13 => PeerId,
            14 => State,
            21 => PeerOutputs,
            22 => Inputs,
            23 => Outputs,
            24 => Offset,
            25 => PeerOffset,
            26 => BlindingExcess,
            27 => Nonce,
            28 => PeerPublicExcess,
            29 => PeerPublicNonce,
            30 => PartialSignature,
            31 => PeerSignature,
            32 => KernelId,
            33 => TransactionRegistered,
            34 => KernelProofHeight,
            35 => KernelUnconfirmedHeight,
            36 => FailureReason,
            40 => SharedBlindingFactor,
            41 => PeerPublicSharedBlindingFactor,
            42 => SharedCoinId,
            50 => SwapCoin,
            51 => SwapAmount,
            52 => SwapFeeRate,
            53 => SwapLockTime,
            54 => SwapSecretPrivate,
            55 => SwapSecretPublic,
            56 => SwapPeerPublic,
            _ => return None,
        };
        Some(id)
    }
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if input.len() < n {
        return Err(anyhow!("parameter value truncated"));
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

/// Canonical encoding of one parameter value.
pub trait ParamValue: Sized {
    fn encode_to(&self, out: &mut Vec<u8>);
    fn decode_from(input: &mut &[u8]) -> Result<Self>;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_to(&mut out);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut input = bytes;
        let value = Self::decode_from(&mut input)?;
        anyhow::ensure!(input.is_empty(), "trailing bytes in parameter value");
        Ok(value)
    }
}

impl ParamValue for u32 {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode_from(input: &mut &[u8]) -> Result<u32> {
        let bytes = take(input, 4)?;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }
}

impl ParamValue for u64 {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode_from(input: &mut &[u8]) -> Result<u64> {
        let bytes = take(input, 8)?;
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }
}

impl ParamValue for bool {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }

    fn decode_from(input: &mut &[u8]) -> Result<bool> {
        match take(input, 1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(anyhow!("invalid bool byte {other}")),
        }
    }
}

impl ParamValue for [u8; 32] {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }

    fn decode_from(input: &mut &[u8]) -> Result<[u8; 32]> {
        Ok(take(input, 32)?.try_into().unwrap())
    }
}

impl ParamValue for String {
    fn encode_to(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode_to(out);
        out.extend_from_slice(self.as_bytes());
    }

    fn decode_from(input: &mut &[u8]) -> Result<String> {
        let len = u32::decode_from(input)? as usize;
        let bytes = take(input, len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

impl ParamValue for Scalar {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bytes());
    }

    fn decode_from(input: &mut &[u8]) -> Result<Scalar> {
        let bytes: [u8; 32] = take(input, 32)?.try_into().unwrap();
        Scalar::from_bytes(bytes)
    }
}

impl ParamValue for Point {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.serialize());
    }

    fn decode_from(input: &mut &[u8]) -> Result<Point> {
        let bytes: [u8; 33] = take(input, 33)?.try_into().unwrap();
        Point::from_bytes(&bytes)
    }
}

impl ParamValue for TxId {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }

    fn decode_from(input: &mut &[u8]) -> Result<TxId> {
        Ok(TxId(take(input, 16)?.try_into().unwrap()))
    }
}

impl ParamValue for KernelId {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }

    fn decode_from(input: &mut &[u8]) -> Result<KernelId> {
        Ok(KernelId(take(input, 32)?.try_into().unwrap()))
    }
}

impl ParamValue for KeyType {
    fn encode_to(&self, out: &mut Vec<u8>) {
        let tag: u32 = match self {
            KeyType::Regular => 0,
            KeyType::Change => 1,
            KeyType::Coinbase => 2,
            KeyType::Shared => 3,
        };
        tag.encode_to(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<KeyType> {
        match u32::decode_from(input)? {
            0 => Ok(KeyType::Regular),
            1 => Ok(KeyType::Change),
            2 => Ok(KeyType::Coinbase),
            3 => Ok(KeyType::Shared),
            other => Err(anyhow!("invalid key type {other}")),
        }
    }
}

impl ParamValue for CoinId {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.idx.encode_to(out);
        self.value.encode_to(out);
        self.key_type.encode_to(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<CoinId> {
        Ok(CoinId {
            idx: u64::decode_from(input)?,
            value: u64::decode_from(input)?,
            key_type: KeyType::decode_from(input)?,
        })
    }
}

impl ParamValue for Input {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.commitment.encode_to(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<Input> {
        Ok(Input {
            commitment: Point::decode_from(input)?,
        })
    }
}

impl ParamValue for Output {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.commitment.encode_to(out);
        out.extend_from_slice(&self.proof.to_bytes());
    }

    fn decode_from(input: &mut &[u8]) -> Result<Output> {
        let commitment = Point::decode_from(input)?;
        let proof: [u8; 32] = take(input, 32)?.try_into().unwrap();
        Ok(Output {
            commitment,
            proof: RangeProof::from_bytes(proof),
        })
    }
}

impl<T: ParamValue> ParamValue for Vec<T> {
    fn encode_to(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode_to(out);
        for item in self {
            item.encode_to(out);
        }
    }

    fn decode_from(input: &mut &[u8]) -> Result<Vec<T>> {
        let count = u32::decode_from(input)? as usize;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(T::decode_from(input)?);
        }
        Ok(items)
    }
}

impl ParamValue for TxType {
    fn encode_to(&self, out: &mut Vec<u8>) {
        let tag: u32 = match self {
            TxType::Simple => 0,
            TxType::Split => 1,
            TxType::AtomicSwap => 2,
        };
        tag.encode_to(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<TxType> {
        match u32::decode_from(input)? {
            0 => Ok(TxType::Simple),
            1 => Ok(TxType::Split),
            2 => Ok(TxType::AtomicSwap),
            other => Err(anyhow!("invalid transaction type {other}")),
        }
    }
}

impl ParamValue for FailureReason {
    fn encode_to(&self, out: &mut Vec<u8>) {
        let tag: u32 = match self {
            FailureReason::NoInputs => 0,
            FailureReason::TransactionExpired => 1,
            FailureReason::InvalidPeerSignature => 2,
            FailureReason::FailedToRegister => 3,
            FailureReason::InvalidKernelProof => 4,
            FailureReason::Cancelled => 5,
            FailureReason::SwapSecondChainFailure => 6,
            FailureReason::Unknown => 7,
        };
        tag.encode_to(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<FailureReason> {
        match u32::decode_from(input)? {
            0 => Ok(FailureReason::NoInputs),
            1 => Ok(FailureReason::TransactionExpired),
            2 => Ok(FailureReason::InvalidPeerSignature),
            3 => Ok(FailureReason::FailedToRegister),
            4 => Ok(FailureReason::InvalidKernelProof),
            5 => Ok(FailureReason::Cancelled),
            6 => Ok(FailureReason::SwapSecondChainFailure),
            7 => Ok(FailureReason::Unknown),
            other => Err(anyhow!("invalid failure reason {other}")),
        }
    }
}

impl ParamValue for SwapCoin {
    fn encode_to(&self, out: &mut Vec<u8>) {
        0u32.encode_to(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<SwapCoin> {
        match u32::decode_from(input)? {
            0 => Ok(SwapCoin::Bitcoin),
            other => Err(anyhow!("invalid swap coin {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: ParamValue + PartialEq + std::fmt::Debug>(value: T) {
        let bytes = value.encode();
        assert_eq!(T::decode(&bytes).unwrap(), value);
    }

    #[test]
    fn codec_round_trips() {
        round_trip(42u64);
        round_trip(7u32);
        round_trip(true);
        round_trip([9u8; 32]);
        round_trip("wallet-a".to_string());
        round_trip(Scalar::random());
        round_trip(Point::generator(&Scalar::random()));
        round_trip(TxId::generate());
        round_trip(TxType::AtomicSwap);
        round_trip(FailureReason::NoInputs);
        round_trip(CoinId {
            idx: 3,
            value: 11,
            key_type: KeyType::Change,
        });
        round_trip(vec![1u64, 2, 3]);
    }

    #[test]
    fn integers_are_big_endian() {
        assert_eq!(1u64.encode(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(0x0102u32.encode(), vec![0, 0, 1, 2]);
    }

    #[test]
    fn truncated_values_are_rejected() {
        assert!(u64::decode(&[0, 0, 0]).is_err());
        assert!(<[u8; 32]>::decode(&[0u8; 16]).is_err());
        // trailing bytes are an error too
        assert!(u32::decode(&[0, 0, 0, 1, 9]).is_err());
    }

    #[test]
    fn every_id_survives_the_u32_round_trip() {
        use ParamId::*;
        let ids = [
            TransactionType, Amount, Fee, MinHeight, MaxHeight, Lifetime, PeerMaxHeight,
            IsSender, IsInitiator, AmountList, PreselectedCoins, Change, MyId, PeerId, State,
            PeerOutputs, Inputs, Outputs, Offset, PeerOffset, BlindingExcess,
            Nonce, PeerPublicExcess, PeerPublicNonce, PartialSignature, PeerSignature,
            KernelId, TransactionRegistered, KernelProofHeight, KernelUnconfirmedHeight,
            FailureReason, SharedBlindingFactor, PeerPublicSharedBlindingFactor, SharedCoinId,
            SwapCoin, SwapAmount, SwapFeeRate, SwapLockTime, SwapSecretPrivate,
            SwapSecretPublic, SwapPeerPublic,
        ];
        for id in ids {
            assert_eq!(ParamId::from_u32(id as u32), Some(id));
        }
    }
}

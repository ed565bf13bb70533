use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Record kind discriminators. Every stored record starts with the 8-byte
/// little-endian value of its kind so storage stays self-describing; values
/// are stable and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u64)]
pub enum RecordKind {
    // Registry
    Network = 0x01,
    Operator = 0x02,
    Vault = 0x03,
    VaultRegistry = 0x04,
    Ticket = 0x05,

    // Epoch snapshot
    WeightTable = 0x10,

    // Distribution
    DistributionRoot = 0x40,
}

impl RecordKind {
    pub const fn discriminator(self) -> u64 {
        self as u64
    }

    pub fn from_discriminator(value: u64) -> Option<Self> {
        match value {
            0x01 => Some(Self::Network),
            0x02 => Some(Self::Operator),
            0x03 => Some(Self::Vault),
            0x04 => Some(Self::VaultRegistry),
            0x05 => Some(Self::Ticket),
            0x10 => Some(Self::WeightTable),
            0x40 => Some(Self::DistributionRoot),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record shorter than its discriminator header")]
    Truncated,

    #[error("record discriminator mismatch: expected {expected:?}, found 0x{found:02x}")]
    DiscriminatorMismatch { expected: RecordKind, found: u64 },

    #[error("record codec error: {0}")]
    Codec(String),
}

/// A typed ledger record with a fixed serialized layout: the 8-byte kind
/// discriminator followed by the fields in declared order. Reading a record
/// under the wrong kind is a consistency fault, surfaced as
/// [`RecordError::DiscriminatorMismatch`] and never auto-corrected.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: RecordKind;

    fn encode(&self) -> Result<Vec<u8>, RecordError> {
        let mut buf = Self::KIND.discriminator().to_le_bytes().to_vec();
        let body =
            bincode::serialize(self).map_err(|e| RecordError::Codec(e.to_string()))?;
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let found = peek_kind_raw(bytes)?;
        if found != Self::KIND.discriminator() {
            return Err(RecordError::DiscriminatorMismatch {
                expected: Self::KIND,
                found,
            });
        }
        bincode::deserialize(&bytes[8..]).map_err(|e| RecordError::Codec(e.to_string()))
    }
}

/// Kind of an encoded record, if the discriminator is known.
pub fn peek_kind(bytes: &[u8]) -> Result<Option<RecordKind>, RecordError> {
    Ok(RecordKind::from_discriminator(peek_kind_raw(bytes)?))
}

fn peek_kind_raw(bytes: &[u8]) -> Result<u64, RecordError> {
    if bytes.len() < 8 {
        return Err(RecordError::Truncated);
    }
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&bytes[..8]);
    Ok(u64::from_le_bytes(disc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Dummy {
        a: u64,
        b: [u8; 4],
    }

    impl Record for Dummy {
        const KIND: RecordKind = RecordKind::Network;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Other(u8);

    impl Record for Other {
        const KIND: RecordKind = RecordKind::Vault;
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let rec = Dummy { a: 7, b: [1, 2, 3, 4] };
        let bytes = rec.encode().unwrap();
        assert_eq!(&bytes[..8], &0x01u64.to_le_bytes());
        assert_eq!(Dummy::decode(&bytes).unwrap(), rec);
        assert_eq!(peek_kind(&bytes).unwrap(), Some(RecordKind::Network));
    }

    #[test]
    fn test_wrong_kind_is_a_fault() {
        let bytes = Dummy { a: 1, b: [0; 4] }.encode().unwrap();
        let err = Other::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            RecordError::DiscriminatorMismatch {
                expected: RecordKind::Vault,
                found: 0x01
            }
        ));
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            Dummy::decode(&[1, 2, 3]),
            Err(RecordError::Truncated)
        ));
    }
}

//! Versioned envelopes for persisted state.
//!
//! Every payload written to a [`KeyValueStore`](crate::store::KeyValueStore)
//! is wrapped in a [`Checkpoint`] carrying a format version, a unique id and
//! the save time, then encoded with a [`Codec`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable envelope around a persisted payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint<T> {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When the checkpoint was written
    pub saved_at: DateTime<Utc>,

    pub payload: T,
}

impl<T> Checkpoint<T> {
    pub fn new(payload: T, saved_at: DateTime<Utc>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            saved_at,
            payload,
        }
    }
}

/// On-disk encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// Human-readable JSON
    #[default]
    Json,
    /// Compact bincode
    Binary,
}

impl Codec {
    pub fn encode<T: Serialize>(
        &self,
        checkpoint: &Checkpoint<T>,
    ) -> Result<Vec<u8>, CheckpointError> {
        match self {
            Self::Json => serde_json::to_vec(checkpoint)
                .map_err(|e| CheckpointError::Encode(e.to_string())),
            Self::Binary => bincode::serialize(checkpoint)
                .map_err(|e| CheckpointError::Encode(e.to_string())),
        }
    }

    /// Decode and check the format version.
    pub fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<Checkpoint<T>, CheckpointError> {
        let checkpoint: Checkpoint<T> = match self {
            Self::Json => serde_json::from_slice(bytes)
                .map_err(|e| CheckpointError::Decode(e.to_string()))?,
            Self::Binary => bincode::deserialize(bytes)
                .map_err(|e| CheckpointError::Decode(e.to_string()))?,
        };

        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: checkpoint.version,
                supported: CHECKPOINT_VERSION,
            });
        }

        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn saved_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn binary_codec_keeps_map_payloads() {
        let mut payload = BTreeMap::new();
        payload.insert("bulk".to_string(), 3600u64);

        let checkpoint = Checkpoint::new(payload.clone(), saved_at());
        let bytes = Codec::Binary.encode(&checkpoint).unwrap();
        let back: Checkpoint<BTreeMap<String, u64>> = Codec::Binary.decode(&bytes).unwrap();

        assert_eq!(back.payload, payload);
        assert_eq!(back.id, checkpoint.id);
        assert_eq!(back.saved_at, saved_at());
    }

    #[test]
    fn decode_rejects_other_versions() {
        let mut checkpoint = Checkpoint::new(1u8, saved_at());
        checkpoint.version = CHECKPOINT_VERSION + 1;
        let bytes = Codec::Json.encode(&checkpoint).unwrap();

        let result = Codec::Json.decode::<u8>(&bytes);
        assert!(matches!(
            result,
            Err(CheckpointError::UnsupportedVersion { found, .. }) if found == CHECKPOINT_VERSION + 1
        ));
    }

    #[test]
    fn decode_reports_garbage() {
        let result = Codec::Json.decode::<u8>(b"{not json");
        assert!(matches!(result, Err(CheckpointError::Decode(_))));

        let result = Codec::Binary.decode::<String>(&[0xff]);
        assert!(matches!(result, Err(CheckpointError::Decode(_))));
    }

    #[test]
    fn checkpoint_ids_are_unique() {
        let a = Checkpoint::new((), saved_at());
        let b = Checkpoint::new((), saved_at());
        assert_ne!(a.id, b.id);
    }
}

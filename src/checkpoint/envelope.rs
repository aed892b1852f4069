//! Schema-versioned serialization envelope for checkpoint payloads.
//!
//! The checkpoint layer never compile-time-depends on the shape of the state
//! it persists: callers hand it any `Serialize` value, which is wrapped in a
//! versioned envelope before hitting a backend. Restoring a payload written
//! under a different envelope version is a hard error rather than a silent
//! misparse.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CheckpointError;

/// Current envelope schema version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Versioned wrapper around an opaque state payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateEnvelope {
    pub version: u32,
    pub state: Value,
}

impl StateEnvelope {
    /// Wrap a state value under the current schema version.
    pub fn wrap<T: Serialize>(state: &T) -> Result<Self, CheckpointError> {
        Ok(Self {
            version: ENVELOPE_VERSION,
            state: serde_json::to_value(state).map_err(CheckpointError::Serialize)?,
        })
    }

    /// Serialize the envelope for storage.
    pub fn encode(&self) -> Result<String, CheckpointError> {
        serde_json::to_string(self).map_err(CheckpointError::Serialize)
    }

    /// Parse a stored envelope, rejecting unknown versions.
    pub fn decode(raw: &str) -> Result<Self, CheckpointError> {
        let envelope: Self = serde_json::from_str(raw).map_err(CheckpointError::Deserialize)?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(CheckpointError::EnvelopeVersion {
                found: envelope.version,
                expected: ENVELOPE_VERSION,
            });
        }
        Ok(envelope)
    }

    /// Extract the typed state from the envelope.
    pub fn into_state<T: DeserializeOwned>(self) -> Result<T, CheckpointError> {
        serde_json::from_value(self.state).map_err(CheckpointError::Deserialize)
    }
}

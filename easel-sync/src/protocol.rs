//! Transport envelope for replicated updates.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┬──────────┐
//! │ kind     │ peer_id   │ doc_id   │ clock    │ payload  │
//! │ 1 byte   │ 16 bytes  │ 16 bytes │ varint   │ variable │
//! └──────────┴───────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! The payload is an opaque Yrs v1 update. The envelope only adds routing
//! (who sent it, for which document) and a Lamport clock for diagnostics.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EnvelopeKind {
    /// Incremental update from one local transaction.
    Update = 1,
    /// The sender's whole document, for a peer that just joined.
    FullState = 2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEnvelope {
    pub kind: EnvelopeKind,
    pub peer_id: Uuid,
    pub doc_id: Uuid,
    /// Lamport clock of the sender.
    pub clock: u64,
    pub payload: Vec<u8>,
}

impl UpdateEnvelope {
    pub fn update(peer_id: Uuid, doc_id: Uuid, clock: u64, yrs_update: Vec<u8>) -> Self {
        Self {
            kind: EnvelopeKind::Update,
            peer_id,
            doc_id,
            clock,
            payload: yrs_update,
        }
    }

    pub fn full_state(peer_id: Uuid, doc_id: Uuid, clock: u64, state: Vec<u8>) -> Self {
        Self {
            kind: EnvelopeKind::FullState,
            peer_id,
            doc_id,
            clock,
            payload: state,
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    /// The outbound channel's receiver is gone.
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_roundtrip() {
        let peer = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let payload = vec![1, 2, 3, 4, 5];

        let msg = UpdateEnvelope::update(peer, doc, 42, payload.clone());
        let decoded = UpdateEnvelope::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.kind, EnvelopeKind::Update);
        assert_eq!(decoded.peer_id, peer);
        assert_eq!(decoded.doc_id, doc);
        assert_eq!(decoded.clock, 42);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn test_full_state_kind_survives() {
        let msg = UpdateEnvelope::full_state(Uuid::new_v4(), Uuid::nil(), 0, vec![9; 8]);
        let decoded = UpdateEnvelope::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let msg = UpdateEnvelope::update(Uuid::new_v4(), Uuid::new_v4(), 7, vec![0u8; 32]);
        let bytes = msg.encode().unwrap();
        assert!(matches!(
            UpdateEnvelope::decode(&bytes[..10]),
            Err(ProtocolError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_envelope_overhead_is_small() {
        let msg = UpdateEnvelope::update(Uuid::new_v4(), Uuid::new_v4(), 1, vec![0u8; 50]);
        let encoded = msg.encode().unwrap();
        // kind + two uuids + clock + length prefix, then the payload.
        assert!(encoded.len() < 50 + 48, "envelope too large: {} bytes", encoded.len());
    }
}

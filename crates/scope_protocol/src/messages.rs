//! # Wire Messages
//!
//! Notices exchanged between a replication server and a client mirror. State flows
//! server to client only; the client's sole message is [`ClientMessage::LocalError`].
//!
//! Messages travel as JSON. Object payloads are opaque bytes carried as base64 strings;
//! [`max_payload_for`](crate::max_payload_for) accounts for both when bounding them.

use crate::error::ProtocolError;
use crate::types::{ObjectId, PrefabId, ScopeId};
use serde::{Deserialize, Serialize};

/// Server to client notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeMessage {
    /// The connection has just been placed in Limbo.
    Welcome,

    /// The connection now belongs to `scope_index`.
    ///
    /// `prefab_index` is [`DEFAULT_PREFAB`](crate::DEFAULT_PREFAB) when the scope id itself
    /// indexes the default list, one of the virtual markers for Limbo/Maintenance, or an
    /// index into the extra prefab table.
    MovedToScope {
        prefab_index: PrefabId,
        scope_index: ScopeId,
    },

    /// Full state of an object entering the connection's view.
    ObjectSpawned {
        scope_index: ScopeId,
        object_prefab_index: PrefabId,
        object_index: ObjectId,
        #[serde(with = "payload_base64")]
        payload: Vec<u8>,
    },

    /// Refresh data for an object already spawned on the client.
    ObjectRefreshed {
        scope_index: ScopeId,
        object_index: ObjectId,
        #[serde(with = "payload_base64")]
        payload: Vec<u8>,
    },

    /// The object left the connection's view.
    ObjectDespawned {
        scope_index: ScopeId,
        object_index: ObjectId,
    },
}

impl ScopeMessage {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ScopeMessage::Welcome => "welcome",
            ScopeMessage::MovedToScope { .. } => "moved_to_scope",
            ScopeMessage::ObjectSpawned { .. } => "object_spawned",
            ScopeMessage::ObjectRefreshed { .. } => "object_refreshed",
            ScopeMessage::ObjectDespawned { .. } => "object_despawned",
        }
    }

    /// Size of the carried object payload, zero for notices without one.
    pub fn payload_len(&self) -> usize {
        match self {
            ScopeMessage::ObjectSpawned { payload, .. }
            | ScopeMessage::ObjectRefreshed { payload, .. } => payload.len(),
            _ => 0,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Serialization)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| {
            tracing::debug!("🔴 Failed to decode scope message ({} bytes): {}", data.len(), e);
            ProtocolError::Deserialization(e)
        })
    }
}

/// Client to server signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The client detected a desynchronization or a local fault; the server closes the
    /// connection on receipt.
    LocalError,
}

impl ClientMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Serialization)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Deserialization)
    }
}

mod payload_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        max_payload_for, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PREFAB, FRAME_OVERHEAD, LIMBO, LIMBO_PREFAB, MIN_MESSAGE_SIZE,
    };

    fn widest_spawn(payload_len: usize) -> ScopeMessage {
        ScopeMessage::ObjectSpawned {
            scope_index: u32::MAX,
            object_prefab_index: u32::MAX,
            object_index: u32::MAX,
            payload: vec![0xAB; payload_len],
        }
    }

    #[test]
    fn spawn_notice_carries_payload_as_base64() {
        let message = ScopeMessage::ObjectSpawned {
            scope_index: 1,
            object_prefab_index: 0,
            object_index: 3,
            payload: vec![0, 255, 7],
        };
        let encoded = message.encode().unwrap();
        let text = String::from_utf8(encoded.clone()).unwrap();
        assert!(text.contains("\"kind\":\"object_spawned\""));
        assert!(text.contains("\"payload\":\"AP8H\""));
        assert_eq!(ScopeMessage::decode(&encoded).unwrap(), message);
        assert_eq!(message.payload_len(), 3);
    }

    #[test]
    fn sentinels_survive_the_wire() {
        let moved = ScopeMessage::MovedToScope {
            prefab_index: LIMBO_PREFAB,
            scope_index: LIMBO,
        };
        let decoded = ScopeMessage::decode(&moved.encode().unwrap()).unwrap();
        assert_eq!(decoded, moved);

        let default = ScopeMessage::MovedToScope {
            prefab_index: DEFAULT_PREFAB,
            scope_index: 2,
        };
        assert_eq!(ScopeMessage::decode(&default.encode().unwrap()).unwrap(), default);
    }

    #[test]
    fn local_error_has_no_payload() {
        let encoded = ClientMessage::LocalError.encode().unwrap();
        assert_eq!(encoded, br#"{"kind":"local_error"}"#.to_vec());
        assert_eq!(ClientMessage::decode(&encoded).unwrap(), ClientMessage::LocalError);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            ScopeMessage::decode(b"{\"kind\":\"teleport\"}"),
            Err(ProtocolError::Deserialization(_))
        ));
        assert!(ScopeMessage::decode(br#"{"kind":"object_refreshed","scope_index":1,"object_index":1,"payload":"!!"}"#).is_err());
    }

    #[test]
    fn framing_overhead_matches_the_widest_empty_spawn() {
        assert_eq!(widest_spawn(0).encode().unwrap().len(), FRAME_OVERHEAD);

        let refresh = ScopeMessage::ObjectRefreshed {
            scope_index: u32::MAX,
            object_index: u32::MAX,
            payload: Vec::new(),
        };
        assert!(refresh.encode().unwrap().len() < FRAME_OVERHEAD);
    }

    #[test]
    fn largest_allowed_payload_fits_the_message_size() {
        for message_size in [MIN_MESSAGE_SIZE, DEFAULT_MAX_MESSAGE_SIZE, 1029, 1030, 1031, 4096] {
            let max = max_payload_for(message_size);
            let fitting = widest_spawn(max).encode().unwrap().len();
            assert!(fitting <= message_size, "{fitting} > {message_size}");

            let over = widest_spawn(max + 1).encode().unwrap().len();
            assert!(over > message_size, "{over} <= {message_size}");
        }
        assert_eq!(max_payload_for(DEFAULT_MAX_MESSAGE_SIZE), 678);
        assert_eq!(max_payload_for(FRAME_OVERHEAD), 0);
    }
}

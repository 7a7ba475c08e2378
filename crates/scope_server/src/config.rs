//! Server configuration types and defaults.

use scope_protocol::{max_payload_for, DEFAULT_MAX_MESSAGE_SIZE, MIN_MESSAGE_SIZE};
use serde::{Deserialize, Serialize};

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

/// Configuration for a [`ScopeServer`](crate::ScopeServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Largest message the transport delivers in one piece, in bytes.
    ///
    /// Values below 512 are raised to 512.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Transport message size after applying the lower clamp.
    pub fn effective_message_size(&self) -> usize {
        self.max_message_size.max(MIN_MESSAGE_SIZE)
    }

    /// Largest object payload that fits in one encoded spawn or refresh message.
    pub fn max_payload_size(&self) -> usize {
        max_payload_for(self.effective_message_size())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_bound_leaves_room_for_the_framing() {
        assert_eq!(ServerConfig::default().max_payload_size(), 678);

        let tiny = ServerConfig { max_message_size: 16 };
        assert_eq!(tiny.effective_message_size(), 512);
        assert_eq!(tiny.max_payload_size(), 291);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
    }
}

//! Payload encoding for replicated object state.
//!
//! Spawn and refresh payloads are independent schemas: an object kind picks one
//! [`Model`] type for its full state and another for its refreshes, and the client
//! side decodes each with the matching type.

use crate::error::ProtocolError;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// A value that can be carried as an object payload.
///
/// Implemented automatically for every `Serialize + DeserializeOwned` type:
///
/// ```rust
/// use scope_protocol::Model;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Beacon {
///     color: [u8; 4],
/// }
///
/// let bytes = Beacon { color: [1, 2, 3, 4] }.to_payload()?;
/// assert_eq!(Beacon::from_payload(&bytes)?, Beacon { color: [1, 2, 3, 4] });
/// # Ok::<(), scope_protocol::ProtocolError>(())
/// ```
pub trait Model: Sized + Send + Sync + Debug + 'static {
    fn to_payload(&self) -> Result<Vec<u8>, ProtocolError>;

    fn from_payload(data: &[u8]) -> Result<Self, ProtocolError>;
}

impl<T> Model for T
where
    T: Serialize + DeserializeOwned + Send + Sync + Debug + 'static,
{
    fn to_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| {
            tracing::error!(
                "🔴 Payload serialization failed for '{}': {}",
                std::any::type_name::<T>(),
                e
            );
            ProtocolError::Serialization(e)
        })
    }

    fn from_payload(data: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| {
            let preview = if data.len() > 64 {
                format!("{}... ({} bytes)", String::from_utf8_lossy(&data[..64]), data.len())
            } else {
                String::from_utf8_lossy(data).to_string()
            };
            tracing::error!(
                "🔴 Payload deserialization failed for '{}': {} (payload: '{}')",
                std::any::type_name::<T>(),
                e,
                preview
            );
            ProtocolError::Deserialization(e)
        })
    }
}

//! # Scope Protocol
//!
//! Vocabulary shared by the replication server and its client mirrors.
//!
//! ## Contents
//!
//! - [`types`] - identifier aliases, the reserved sentinel band and [`LoadStatus`]
//! - [`IdPool`] - dense, reusable identifier allocation
//! - [`messages`] - the wire notices exchanged between server and client
//! - [`Model`] - payload encoding for application object state
//!
//! Both sides of a deployment must agree on the sentinel values defined here; they are
//! not negotiated at runtime.

pub mod error;
pub mod id_pool;
pub mod messages;
pub mod model;
pub mod types;

pub use error::ProtocolError;
pub use id_pool::IdPool;
pub use messages::{ClientMessage, ScopeMessage};
pub use model::Model;
pub use types::*;

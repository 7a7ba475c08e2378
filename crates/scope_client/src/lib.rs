//! # Scope Client
//!
//! Client-side counterpart of `scope_server`. A [`ClientMirror`] materializes the one
//! scope the server has placed the connection in and mirrors the objects spawned there;
//! a [`MirrorSession`] applies the connection's notices to it in arrival order.
//!
//! ## Components
//!
//! * [`ClientCatalog`] - scope views and object mirror factories, aligned with the server catalog
//! * [`ObjectMirror`] / [`ScopeView`] - application-defined local representations
//! * [`InstanceManager`] - optional pooling of object mirrors ([`PooledInstances`])
//! * [`MirrorSession`] - single-task update queue with upstream error reporting

pub use catalog::{ClientCatalog, ClientCatalogBuilder, EmptyView, MirrorFactory, ScopeView, ScopeViewFactory};
pub use error::{ErrorContext, LocalError, MirrorError};
pub use instances::{InstanceManager, ObjectMirror, PooledInstances};
pub use mirror::{ClientMirror, MirrorEvent};
pub use session::{MirrorListener, MirrorSession, SilentListener, Uplink};

pub mod catalog;
pub mod error;
pub mod instances;
pub mod mirror;
pub mod session;

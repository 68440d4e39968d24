// src/core/mod.rs

//! The central module: session construction, the shared-session lifecycle and
//! the keyed cache on top of it.

pub mod cache;
pub mod codec;
pub mod driver;
pub mod errors;
pub mod factory;
pub mod holder;
pub mod lease;
pub mod metrics;
pub mod policy;
pub mod properties;
pub mod session;

pub use cache::{Lookup, SessionCache};
pub use errors::ClusterLinkError;
pub use factory::SessionFactory;
pub use holder::{DRAINED, Release, SessionRegistry, SharedSession};
pub use lease::SessionLease;
pub use properties::{ConnectionProperties, SessionKey};
pub use session::Session;

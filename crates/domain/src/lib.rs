//! Shared domain types for ChatGate.
//!
//! Everything the gateway and protocol crates agree on lives here: the
//! configuration tree, the shared error type, the event-kind enumeration
//! that drives webhook subscriptions, and the per-tenant user records.

pub mod config;
pub mod error;
pub mod events;
pub mod user;

pub use error::{Error, Result};
pub use events::EventKind;
pub use user::{UserContext, UserRecord};

//! ChatGate gateway: HTTP surface, auth cache, session lifecycle, and the
//! event-dispatch bridge between protocol sessions and tenant webhooks.

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
pub mod store;

//! Credential models produced by the device flow and the session token exchange.

pub mod primary;
pub mod secret;
pub mod session;

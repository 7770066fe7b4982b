//! Provider-facing configuration: endpoint descriptors and protocol quirks.
//!
//! `descriptor` exposes validated metadata ([`ProviderDescriptor`]) covering HTTPS-only
//! endpoints for the device flow, the session token exchange, and chat completions, plus the
//! [`ProviderQuirks`] that shape identity headers and device-flow pacing.

pub mod descriptor;

pub use descriptor::*;

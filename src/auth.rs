//! Auth-domain models: device authorizations, scope sets, and the credentials minted from them.

pub mod device;
pub mod scope;
pub mod token;

pub use device::*;
pub use scope::*;
pub use token::{primary::*, secret::*, session::*};

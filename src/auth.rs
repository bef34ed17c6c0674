//! Auth-domain identifiers, scope sets, and cached token models.

pub mod id;
pub mod scope;
pub mod token;

pub use id::*;
pub use scope::*;
pub use token::{cached::*, secret::*};

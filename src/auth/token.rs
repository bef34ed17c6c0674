//! Cached access tokens and the secret wrapper that keeps them out of logs.

pub mod cached;
pub mod secret;

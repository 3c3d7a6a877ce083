//! Shared utilities.

pub mod hash;

pub use hash::{sha256_bytes, sha256_str};

//! Foundational low-level utilities shared across Courier crates.
//!
//! Provides time utilities used by cache expiry calculations and the
//! canonical JSON serialization + digest helpers behind cache keys.

pub mod canonical;
pub mod time_utils;

pub use canonical::{canonical_json_string, sha256_hex};
pub use time_utils::{current_unix_timestamp_ms, is_expired_unix_ms};

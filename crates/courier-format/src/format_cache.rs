//! Content-addressed TTL cache for formatted messages.
//!
//! Keys are digests over the canonical serialization of (kind, data,
//! options) plus everything else the rendering depends on — the resolved
//! effective config and the channel style — so semantically-equal inputs
//! with different key order hit the same entry while differently-configured
//! requests never share one. Expiry is lazy (purged on lookup, no background
//! sweep) and the collection is bounded: above the cap the soonest-expiry
//! tenth is evicted in one pass. `now` is always passed by the caller so
//! expiry is deterministic under test.

use std::collections::HashMap;

use courier_core::{canonical_json_string, is_expired_unix_ms, sha256_hex};
use serde_json::Value;

use crate::format_config::{ChannelStyle, EffectiveConfig, FormatOptions};
use crate::format_contract::{FormattedMessage, MessageKind};

pub const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1_000;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1_000;

/// Derives the deterministic cache key for one format request.
///
/// The resolved config and channel style are part of the key: the stored
/// message already carries branding overlays and style post-processing, so
/// two requests that resolve differently must never share an entry.
pub fn compute_cache_key(
    kind: &MessageKind,
    data: &Value,
    options: Option<&FormatOptions>,
    config: &EffectiveConfig,
    style: ChannelStyle,
) -> String {
    let options_value = options
        .and_then(|options| serde_json::to_value(options).ok())
        .unwrap_or(Value::Null);
    let payload = format!(
        "{}\n{}\n{}\n{:016x}\n{}",
        kind.as_str(),
        canonical_json_string(data),
        canonical_json_string(&options_value),
        config.structural_hash(),
        style.as_str()
    );
    sha256_hex(&payload)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    message: FormattedMessage,
    expires_unix_ms: u64,
}

#[derive(Debug)]
/// Public struct `MessageCache` used across Courier components.
pub struct MessageCache {
    entries: HashMap<String, CacheEntry>,
    ttl_ms: u64,
    max_entries: usize,
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL_MS, DEFAULT_CACHE_MAX_ENTRIES)
    }
}

impl MessageCache {
    pub fn new(ttl_ms: u64, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
            max_entries: max_entries.max(1),
        }
    }

    /// Returns the cached message, purging the entry first when expired.
    pub fn get(&mut self, key: &str, now_unix_ms: u64) -> Option<FormattedMessage> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => is_expired_unix_ms(Some(entry.expires_unix_ms), now_unix_ms),
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.message.clone())
    }

    /// Stores `message` under `key` with the configured TTL, then enforces
    /// the size bound by evicting the soonest-expiry tenth when above cap.
    pub fn put(&mut self, key: String, message: FormattedMessage, now_unix_ms: u64) {
        self.entries.insert(
            key,
            CacheEntry {
                message,
                expires_unix_ms: now_unix_ms.saturating_add(self.ttl_ms),
            },
        );
        if self.entries.len() > self.max_entries {
            self.evict_soonest_expiring();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_soonest_expiring(&mut self) {
        let evict_count = (self.entries.len() / 10).max(1);
        let mut order = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.expires_unix_ms, key.clone()))
            .collect::<Vec<_>>();
        order.sort();
        for (_, key) in order.into_iter().take(evict_count) {
            self.entries.remove(&key);
        }
    }
}

//! Quote cache - TTL keyed cache owned by a session

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

pub const DEFAULT_QUOTE_TTL_MS: i64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteCacheConfig {
    /// Entries older than this are treated as missing
    pub ttl_ms: i64,
}

impl Default for QuoteCacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_QUOTE_TTL_MS,
        }
    }
}

/// Market data snapshot for an instrument from an external feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub symbol: String,
    pub price: Decimal,
    pub change_24h_pct: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub volume_24h: Decimal,
    pub market_cap: Decimal,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: i64,
}

/// Keyed cache where entries expire `ttl_ms` after insertion.
///
/// Time is passed in explicitly by the `_at` variants; the plain ones use
/// the wall clock.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    ttl_ms: i64,
    entries: HashMap<K, Entry<V>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(config: QuoteCacheConfig) -> Self {
        Self {
            ttl_ms: config.ttl_ms,
            entries: HashMap::new(),
        }
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Utc::now().timestamp_millis())
    }

    pub fn get_at(&self, key: &K, now: i64) -> Option<V> {
        self.entries
            .get(key)
            .filter(|e| now - e.inserted_at <= self.ttl_ms)
            .map(|e| e.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Utc::now().timestamp_millis());
    }

    pub fn insert_at(&mut self, key: K, value: V, now: i64) {
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
            },
        );
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl_ms;
        self.entries.retain(|_, e| now - e.inserted_at <= ttl);
        before - self.entries.len()
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
}

impl<K: Eq + Hash, V: Clone> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new(QuoteCacheConfig::default())
    }
}

pub type QuoteCache = TtlCache<String, MarketQuote>;

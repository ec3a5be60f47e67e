//! Caching for expensive per-page reads.
//!
//! This module provides a generic bounded LRU cache and a page-text wrapper
//! that keeps the rendering collaborator from re-reading the same page.

pub mod bounded;
pub mod page_text;

use serde::{Deserialize, Serialize};

pub use bounded::BoundedCache;
pub use page_text::CachedPageText;

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Entries currently held.
    pub size: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit (0.0 when there were none).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

//! Page-text reads through a bounded cache.

use std::sync::Arc;
use tracing::debug;

use super::{BoundedCache, CacheStats};
use crate::source::{PageSource, SourceError};
use crate::types::PageText;

/// Wraps a [`PageSource`] so each page's text is read at most once while it
/// stays in the cache.
///
/// The cache lock is never held across the collaborator call: a miss reads the
/// page, then inserts the result. Two concurrent misses on the same page may
/// both read it; the second insert simply refreshes the entry.
pub struct CachedPageText {
    source: Arc<dyn PageSource>,
    cache: BoundedCache<u32, Arc<PageText>>,
}

impl CachedPageText {
    /// Creates a wrapper holding at most `max_cache_size` pages.
    #[must_use]
    pub fn new(source: Arc<dyn PageSource>, max_cache_size: usize) -> Self {
        Self { source, cache: BoundedCache::new(max_cache_size) }
    }

    /// Returns the page's text, reading it from the source on a miss.
    ///
    /// # Errors
    /// Propagates the source's error; failures are not cached.
    pub async fn page_text(&self, page_number: u32) -> Result<Arc<PageText>, SourceError> {
        if let Some(text) = self.cache.get(&page_number) {
            debug!(page_number, "Page text cache hit");
            return Ok(text);
        }

        debug!(page_number, "Page text cache miss, reading from source");
        let text = Arc::new(self.source.page_text(page_number).await?);
        self.cache.put(page_number, Arc::clone(&text));
        Ok(text)
    }

    /// Cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The underlying source, for reads that bypass the text cache.
    pub fn source(&self) -> &Arc<dyn PageSource> {
        &self.source
    }
}

impl std::fmt::Debug for CachedPageText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedPageText").field("cache", &self.cache).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PageDrawing;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        reads: AtomicUsize,
    }

    #[async_trait]
    impl PageSource for CountingSource {
        async fn page_text(&self, page_number: u32) -> Result<PageText, SourceError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if page_number == 0 {
                return Err(SourceError::PageNotFound(0));
            }
            Ok(PageText { full_text: format!("page {}", page_number), items: Vec::new() })
        }

        async fn drawing_operations(&self, page_number: u32) -> Result<PageDrawing, SourceError> {
            Err(SourceError::PageNotFound(page_number))
        }
    }

    #[tokio::test]
    async fn test_second_read_hits_cache() {
        let source = Arc::new(CountingSource { reads: AtomicUsize::new(0) });
        let cached = CachedPageText::new(source.clone(), 50);

        let first = cached.page_text(3).await.unwrap();
        let second = cached.page_text(3).await.unwrap();

        assert_eq!(first.full_text, "page 3");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert_eq!(cached.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_eviction_forces_reread() {
        let source = Arc::new(CountingSource { reads: AtomicUsize::new(0) });
        let cached = CachedPageText::new(source.clone(), 2);

        cached.page_text(1).await.unwrap();
        cached.page_text(2).await.unwrap();
        cached.page_text(3).await.unwrap();
        cached.page_text(1).await.unwrap();

        assert_eq!(source.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let source = Arc::new(CountingSource { reads: AtomicUsize::new(0) });
        let cached = CachedPageText::new(source.clone(), 2);

        assert!(cached.page_text(0).await.is_err());
        assert!(cached.page_text(0).await.is_err());
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }
}

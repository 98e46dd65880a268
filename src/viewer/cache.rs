//! LRU cache of fully rendered documents

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::types::Surface;

/// Cache key for a rendered document
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Source reference of the document
    pub reference: String,
    /// Scale factor (stored as millionths for stable hashing)
    pub scale_millionths: u32,
}

impl CacheKey {
    #[must_use]
    pub fn new(reference: &str, scale: f32) -> Self {
        Self {
            reference: reference.to_string(),
            scale_millionths: (scale * 1_000_000.0) as u32,
        }
    }
}

/// All pages of one document, in page order
pub type RenderedPages = Arc<[Arc<Surface>]>;

/// LRU cache for completed document renders.
///
/// Only completed renders are inserted, so an entry always holds every page.
pub struct RenderCache {
    cache: LruCache<CacheKey, RenderedPages>,
}

impl RenderCache {
    /// Create a new cache holding up to `capacity` documents
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get cached pages, promoting them in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<RenderedPages> {
        self.cache.get(key).cloned()
    }

    /// Check if a key is in the cache without promoting it
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    pub fn insert(&mut self, key: CacheKey, pages: Vec<Arc<Surface>>) -> RenderedPages {
        let pages: RenderedPages = pages.into();
        self.cache.put(key, pages.clone());
        pages
    }

    /// Number of cached documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

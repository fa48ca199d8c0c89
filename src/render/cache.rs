//! LRU cache of decoded page rasters

use std::num::NonZeroUsize;
use std::sync::Arc;

use image::RgbaImage;
use lru::LruCache;

/// Cache key for decoded pages
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Page number
    pub page: usize,
    /// Raster scale (stored as millionths for stable hashing)
    pub scale_millionths: u32,
}

impl CacheKey {
    #[must_use]
    pub fn new(page: usize, scale: f32) -> Self {
        Self {
            page,
            scale_millionths: (scale * 1_000_000.0) as u32,
        }
    }
}

/// LRU cache for decoded pages
pub struct PageCache {
    cache: LruCache<CacheKey, Arc<RgbaImage>>,
}

impl PageCache {
    /// Create a new cache with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached page, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<RgbaImage>> {
        self.cache.get(key).cloned()
    }

    /// Check if a key is in the cache without promoting it
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a page into the cache, returning an Arc to the raster
    pub fn insert(&mut self, key: CacheKey, image: RgbaImage) -> Arc<RgbaImage> {
        let arc = Arc::new(image);
        self.cache.put(key, arc.clone());
        arc
    }

    /// Clear all cached pages
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    /// Number of cached pages
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_insert_and_get() {
        let mut cache = PageCache::new(10);
        let key = CacheKey::new(0, 1.5);
        cache.insert(key.clone(), RgbaImage::new(4, 4));

        assert!(cache.contains(&key));
        assert!(cache.get(&key).is_some());
        assert!(!cache.contains(&CacheKey::new(0, 2.0)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_lru_eviction() {
        let mut cache = PageCache::new(2);
        for i in 0..3 {
            cache.insert(CacheKey::new(i, 1.0), RgbaImage::new(1, 1));
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&CacheKey::new(0, 1.0)));
        assert!(cache.contains(&CacheKey::new(1, 1.0)));
        assert!(cache.contains(&CacheKey::new(2, 1.0)));
    }

    #[test]
    fn cache_invalidate_all() {
        let mut cache = PageCache::new(10);
        for i in 0..5 {
            cache.insert(CacheKey::new(i, 1.0), RgbaImage::new(1, 1));
        }
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}

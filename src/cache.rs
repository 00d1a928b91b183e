//! Byte-bounded LRU cache for rendered page images

use std::sync::Arc;

use lru::LruCache;

use crate::source::RasterImage;

/// Cache usage counters
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// LRU cache of rendered pages, bounded by total pixel bytes.
///
/// Holds at most one entry per page. A lookup hits only when the stored
/// image matches the requested dimensions exactly; a stale-resolution entry
/// is left in place to be replaced by the next insert or evicted under
/// pressure. The budget is a soft target: an entry larger than the whole
/// budget is still admitted after eviction empties everything else.
pub struct PageCache {
    entries: LruCache<usize, Arc<RasterImage>>,
    budget_bytes: usize,
    used_bytes: usize,
    stats: CacheStats,
}

impl PageCache {
    /// Create a cache with the given byte budget
    #[must_use]
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            budget_bytes,
            used_bytes: 0,
            stats: CacheStats::default(),
        }
    }

    /// Get the cached image for a page, promoting it in LRU order.
    ///
    /// Returns `None` when the page is absent or its stored dimensions do
    /// not equal `(width, height)`. A dimension mismatch is a plain miss
    /// and does not promote the stale entry.
    pub fn get(&mut self, page: usize, width: u32, height: u32) -> Option<Arc<RasterImage>> {
        let matches = self
            .entries
            .peek(&page)
            .is_some_and(|img| img.width() == width && img.height() == height);

        if matches {
            self.stats.hits += 1;
            self.entries.get(&page).cloned()
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Check for a matching entry without promoting it
    #[must_use]
    pub fn contains(&self, page: usize, width: u32, height: u32) -> bool {
        self.entries
            .peek(&page)
            .is_some_and(|img| img.width() == width && img.height() == height)
    }

    /// Insert a rendered page, replacing any previous entry for the page
    /// and evicting least-recently-used entries until the new one fits.
    pub fn put(&mut self, page: usize, image: RasterImage) -> Arc<RasterImage> {
        let size = image.size_bytes();
        debug_assert!(size > 0, "zero-size entries are rejected upstream");

        if let Some(old) = self.entries.pop(&page) {
            self.used_bytes -= old.size_bytes();
        }

        while self.used_bytes + size > self.budget_bytes && !self.entries.is_empty() {
            if let Some((_, evicted)) = self.entries.pop_lru() {
                self.used_bytes -= evicted.size_bytes();
                self.stats.evictions += 1;
            }
        }

        let arc = Arc::new(image);
        self.entries.put(page, Arc::clone(&arc));
        self.used_bytes += size;
        arc
    }

    /// Drop the entry for a page, if any
    pub fn invalidate(&mut self, page: usize) {
        if let Some(old) = self.entries.pop(&page) {
            self.used_bytes -= old.size_bytes();
        }
    }

    /// Release all entries
    pub fn clear(&mut self) {
        self.entries.clear();
        self.used_bytes = 0;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    #[must_use]
    pub const fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(width: u32, height: u32) -> RasterImage {
        RasterImage::blank(width, height)
    }

    #[test]
    fn insert_and_get() {
        let mut cache = PageCache::new(1 << 20);
        cache.put(1, image(100, 50));

        assert!(cache.get(1, 100, 50).is_some());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_bytes(), 100 * 50 * 4);
    }

    #[test]
    fn dimension_mismatch_is_a_miss() {
        let mut cache = PageCache::new(1 << 20);
        cache.put(1, image(100, 50));

        assert!(cache.get(1, 200, 100).is_none());
        assert!(cache.get(1, 100, 50).is_some());
    }

    #[test]
    fn put_replaces_previous_entry_for_page() {
        let mut cache = PageCache::new(1 << 20);
        cache.put(1, image(100, 50));
        cache.put(1, image(200, 100));

        assert_eq!(cache.len(), 1);
        assert!(cache.get(1, 100, 50).is_none());
        assert!(cache.get(1, 200, 100).is_some());
        assert_eq!(cache.used_bytes(), 200 * 100 * 4);
    }

    #[test]
    fn budget_is_respected_after_every_insert() {
        // Each 100x100 page is 40_000 bytes; budget fits two.
        let mut cache = PageCache::new(80_000);
        for page in 1..=5 {
            cache.put(page, image(100, 100));
            assert!(cache.used_bytes() <= cache.budget_bytes());
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn eviction_follows_use_order_not_insert_order() {
        // Three 100x100 entries fill the budget exactly.
        let mut cache = PageCache::new(120_000);
        cache.put(1, image(100, 100));
        cache.put(2, image(100, 100));
        cache.put(3, image(100, 100));

        // Touch page 1 so page 2 becomes the LRU.
        assert!(cache.get(1, 100, 100).is_some());

        cache.put(4, image(100, 100));
        assert!(cache.get(2, 100, 100).is_none());
        assert!(cache.get(1, 100, 100).is_some());
        assert!(cache.get(3, 100, 100).is_some());
        assert!(cache.get(4, 100, 100).is_some());
    }

    #[test]
    fn oversized_entry_is_still_admitted() {
        let mut cache = PageCache::new(10_000);
        cache.put(1, image(20, 20));
        cache.put(2, image(200, 200)); // 160_000 bytes, over the whole budget

        assert_eq!(cache.len(), 1);
        assert!(cache.get(2, 200, 200).is_some());
        assert!(cache.used_bytes() > cache.budget_bytes());

        // The next regular insert pushes the oversized entry out again.
        cache.put(3, image(20, 20));
        assert!(cache.get(2, 200, 200).is_none());
        assert!(cache.used_bytes() <= cache.budget_bytes());
    }

    #[test]
    fn lru_scenario_with_mixed_sizes() {
        // Budget 4_000_000: A, B, C at 1_000_000 each, then D at 2_000_000.
        // A and B are the least recently used and must go; C and D stay.
        let mut cache = PageCache::new(4_000_000);
        cache.put(1, image(500, 500)); // A
        assert!(cache.get(1, 500, 500).is_some());
        cache.put(2, image(500, 500)); // B
        assert!(cache.get(2, 500, 500).is_some());
        cache.put(3, image(500, 500)); // C
        assert!(cache.get(3, 500, 500).is_some());

        cache.put(4, image(500, 1000)); // D

        assert!(cache.contains(3, 500, 500));
        assert!(cache.contains(4, 500, 1000));
        assert!(!cache.contains(1, 500, 500));
        assert!(!cache.contains(2, 500, 500));
        assert_eq!(cache.used_bytes(), 3_000_000);
    }

    #[test]
    fn invalidate_single_page() {
        let mut cache = PageCache::new(1 << 20);
        cache.put(1, image(100, 50));
        cache.put(2, image(100, 50));

        cache.invalidate(1);
        assert!(cache.get(1, 100, 50).is_none());
        assert!(cache.get(2, 100, 50).is_some());
        assert_eq!(cache.used_bytes(), 100 * 50 * 4);
    }

    #[test]
    fn clear_releases_everything() {
        let mut cache = PageCache::new(1 << 20);
        for page in 1..=4 {
            cache.put(page, image(100, 50));
        }
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.used_bytes(), 0);
    }
}

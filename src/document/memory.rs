//! Pixmap memory accounting
//!
//! Every pixmap stored on a page is tracked here in production order so the
//! oldest ones can be unloaded once the configured budget is exceeded.

use lru::LruCache;

use super::request::ObserverId;

pub type PixmapKey = (ObserverId, usize);

pub struct PixmapMemory {
    allocated: LruCache<PixmapKey, usize>,
    total_bytes: usize,
    budget_bytes: usize,
}

impl PixmapMemory {
    #[must_use]
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            allocated: LruCache::unbounded(),
            total_bytes: 0,
            budget_bytes,
        }
    }

    pub fn set_budget(&mut self, budget_bytes: usize) {
        self.budget_bytes = budget_bytes;
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget_bytes
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }

    /// Record a newly stored pixmap, replacing any previous one for the key
    pub fn track(&mut self, key: PixmapKey, bytes: usize) {
        if let Some(old) = self.allocated.put(key, bytes) {
            self.total_bytes -= old;
        }
        self.total_bytes += bytes;
    }

    pub fn forget(&mut self, key: &PixmapKey) {
        if let Some(bytes) = self.allocated.pop(key) {
            self.total_bytes -= bytes;
        }
    }

    pub fn forget_observer(&mut self, observer: ObserverId) {
        let keys: Vec<PixmapKey> = self
            .allocated
            .iter()
            .filter(|((o, _), _)| *o == observer)
            .map(|(k, _)| *k)
            .collect();
        for key in keys {
            self.forget(&key);
        }
    }

    pub fn clear(&mut self) {
        self.allocated.clear();
        self.total_bytes = 0;
    }

    /// Pick pixmaps to unload, oldest first, until the total fits the budget.
    /// `can_unload` vetoes individual candidates; vetoed ones stay tracked.
    pub fn evict(&mut self, mut can_unload: impl FnMut(&PixmapKey) -> bool) -> Vec<PixmapKey> {
        if self.total_bytes <= self.budget_bytes {
            return Vec::new();
        }

        // LruCache iterates most recent first
        let candidates: Vec<PixmapKey> = self.allocated.iter().rev().map(|(k, _)| *k).collect();
        let mut evicted = Vec::new();
        for key in candidates {
            if self.total_bytes <= self.budget_bytes {
                break;
            }
            if can_unload(&key) {
                self.forget(&key);
                evicted.push(key);
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(observer: u32, page: usize) -> PixmapKey {
        (ObserverId::new(observer), page)
    }

    #[test]
    fn tracks_and_replaces() {
        let mut memory = PixmapMemory::new(1000);
        memory.track(key(1, 0), 100);
        memory.track(key(1, 0), 300);
        memory.track(key(2, 0), 50);
        assert_eq!(memory.total_bytes(), 350);
        assert_eq!(memory.len(), 2);

        memory.forget(&key(1, 0));
        memory.forget(&key(2, 0));
        assert!(memory.is_empty());
        assert_eq!(memory.total_bytes(), 0);
    }

    #[test]
    fn evicts_oldest_until_within_budget() {
        let mut memory = PixmapMemory::new(250);
        memory.track(key(1, 0), 100);
        memory.track(key(1, 1), 100);
        memory.track(key(1, 2), 100);

        let evicted = memory.evict(|_| true);
        assert_eq!(evicted, vec![key(1, 0)]);
        assert_eq!(memory.total_bytes(), 200);
    }

    #[test]
    fn vetoed_pixmaps_are_kept() {
        let mut memory = PixmapMemory::new(100);
        memory.track(key(1, 0), 100);
        memory.track(key(1, 1), 100);

        let evicted = memory.evict(|k| k.1 != 0);
        assert_eq!(evicted, vec![key(1, 1)]);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn nothing_evicted_under_budget() {
        let mut memory = PixmapMemory::new(1000);
        memory.track(key(1, 0), 100);
        assert!(memory.evict(|_| true).is_empty());
    }

    #[test]
    fn forget_observer_drops_only_its_pixmaps() {
        let mut memory = PixmapMemory::new(1000);
        memory.track(key(1, 0), 10);
        memory.track(key(2, 0), 20);
        memory.forget_observer(ObserverId::new(1));
        assert_eq!(memory.total_bytes(), 20);
    }
}

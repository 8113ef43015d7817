use std::collections::VecDeque;

use super::viewport::Viewport;

/// Viewport navigation history (like a browser's back/forward list)
#[derive(Debug)]
pub struct ViewportHistory {
    /// Visited viewports, oldest first
    entries: VecDeque<Viewport>,
    /// Index of the entry matching the current viewport
    cursor: usize,
    /// Maximum number of entries to keep
    max_size: usize,
}

impl ViewportHistory {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: VecDeque::with_capacity(max_size.min(64)),
            cursor: 0,
            max_size,
        }
    }

    /// Start over with a single entry
    pub fn reset(&mut self, start: Viewport) {
        self.entries.clear();
        self.entries.push_back(start);
        self.cursor = 0;
    }

    /// Record a new navigation. Forward entries past the cursor are dropped.
    /// Returns false when `viewport` equals the current entry.
    pub fn push(&mut self, viewport: Viewport) -> bool {
        if self.current() == Some(&viewport) {
            return false;
        }

        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(viewport);
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
        true
    }

    /// Replace the current entry in place (scrolling within a page)
    pub fn replace_current(&mut self, viewport: Viewport) {
        match self.entries.get_mut(self.cursor) {
            Some(entry) => *entry = viewport,
            None => self.reset(viewport),
        }
    }

    pub fn back(&mut self) -> Option<Viewport> {
        if self.at_begin() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).copied()
    }

    pub fn forward(&mut self) -> Option<Viewport> {
        if self.at_end() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor).copied()
    }

    #[must_use]
    pub fn current(&self) -> Option<&Viewport> {
        self.entries.get(self.cursor)
    }

    #[must_use]
    pub fn at_begin(&self) -> bool {
        self.cursor == 0
    }

    #[must_use]
    pub fn at_end(&self) -> bool {
        self.cursor + 1 >= self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(page: i32) -> Viewport {
        Viewport::new(page)
    }

    #[test]
    fn back_twice_returns_to_start() {
        let mut history = ViewportHistory::new(10);
        history.reset(vp(0));
        history.push(vp(1));
        history.push(vp(2));

        assert!(history.at_end());
        assert_eq!(history.back(), Some(vp(1)));
        assert_eq!(history.back(), Some(vp(0)));
        assert!(history.at_begin());
        assert_eq!(history.back(), None);
    }

    #[test]
    fn forward_after_back() {
        let mut history = ViewportHistory::new(10);
        history.reset(vp(0));
        history.push(vp(1));
        history.back();

        assert_eq!(history.forward(), Some(vp(1)));
        assert!(history.at_end());
        assert_eq!(history.forward(), None);
    }

    #[test]
    fn new_navigation_truncates_forward_entries() {
        let mut history = ViewportHistory::new(10);
        history.reset(vp(0));
        history.push(vp(1));
        history.push(vp(2));
        history.back();
        history.back();

        assert!(history.push(vp(5)));
        assert_eq!(history.len(), 2);
        assert!(history.at_end());
        assert_eq!(history.back(), Some(vp(0)));
    }

    #[test]
    fn duplicate_of_current_is_not_pushed() {
        let mut history = ViewportHistory::new(10);
        history.reset(vp(3));
        assert!(!history.push(vp(3)));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn bounded_size_drops_oldest() {
        let mut history = ViewportHistory::new(3);
        history.reset(vp(0));
        for i in 1..5 {
            history.push(vp(i));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.current(), Some(&vp(4)));
        history.back();
        assert_eq!(history.back(), Some(vp(2)));
        assert!(history.at_begin());
    }

    #[test]
    fn empty_history_is_at_both_ends() {
        let history = ViewportHistory::new(5);
        assert!(history.at_begin());
        assert!(history.at_end());
        assert!(history.is_empty());
    }
}

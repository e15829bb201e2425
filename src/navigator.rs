//! Cursor over the ordered image sequence of a directory.
//!
//! Two indices are tracked. The visual index follows input immediately so
//! the slider and filename label stay responsive. The committed index trails
//! it by a debounce delay and is the only one that triggers lookups and
//! preloads. Both are clamped to the sequence; stepping past either end is a
//! no-op, not an error.

use std::collections::BTreeSet;
use std::time::Duration;

use web_time::Instant;

use crate::constants::{COMMIT_DEBOUNCE, JUMP_PREFETCH_OFFSETS, NEIGHBOR_PREFETCH_OFFSETS};
use crate::timer::DebounceTimer;

/// Debounced cursor over an image sequence.
#[derive(Debug, Clone)]
pub struct ImageNavigator {
    images: Vec<String>,
    visual_index: usize,
    committed_index: usize,
    timer: DebounceTimer,
}

impl ImageNavigator {
    /// Create a navigator with the default commit delay.
    pub fn new(images: Vec<String>) -> Self {
        Self::with_debounce(images, COMMIT_DEBOUNCE)
    }

    pub fn with_debounce(images: Vec<String>, delay: Duration) -> Self {
        Self {
            images,
            visual_index: 0,
            committed_index: 0,
            timer: DebounceTimer::new(delay),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn visual_index(&self) -> usize {
        self.visual_index
    }

    pub fn committed_index(&self) -> usize {
        self.committed_index
    }

    /// Image under the visual cursor.
    pub fn visual_image(&self) -> Option<&str> {
        self.images.get(self.visual_index).map(String::as_str)
    }

    /// Image under the committed cursor.
    pub fn committed_image(&self) -> Option<&str> {
        self.images.get(self.committed_index).map(String::as_str)
    }

    pub fn image_at(&self, index: usize) -> Option<&str> {
        self.images.get(index).map(String::as_str)
    }

    pub fn index_of(&self, image: &str) -> Option<usize> {
        self.images.iter().position(|i| i == image)
    }

    /// Whether a commit is scheduled but not yet applied.
    pub fn is_settling(&self) -> bool {
        self.timer.is_pending()
    }

    /// Clamp any index into `[0, len - 1]` (0 for an empty sequence).
    pub fn clamp(&self, index: isize) -> usize {
        if self.images.is_empty() || index < 0 {
            0
        } else {
            (index as usize).min(self.images.len() - 1)
        }
    }

    /// Move the visual cursor and schedule a commit.
    pub fn set_visual_index(&mut self, index: isize, now: Instant) {
        let clamped = self.clamp(index);
        if clamped == self.visual_index && !self.timer.is_pending() {
            return;
        }
        self.visual_index = clamped;
        self.timer.schedule(now);
    }

    pub fn prev_image(&mut self, now: Instant) {
        if self.visual_index > 0 {
            self.set_visual_index(self.visual_index as isize - 1, now);
        }
    }

    pub fn next_image(&mut self, now: Instant) {
        if self.visual_index + 1 < self.images.len() {
            self.set_visual_index(self.visual_index as isize + 1, now);
        }
    }

    /// Move by `delta` images, stopping at the ends.
    pub fn jump(&mut self, delta: isize, now: Instant) {
        self.set_visual_index(self.visual_index as isize + delta, now);
    }

    /// Move the cursor to a named image. Returns `false` if it is not in the sequence.
    pub fn seek_to_image(&mut self, image: &str, now: Instant) -> bool {
        match self.index_of(image) {
            Some(index) => {
                self.set_visual_index(index as isize, now);
                true
            }
            None => false,
        }
    }

    /// Apply a due commit. Returns the new committed index when it changed.
    pub fn poll(&mut self, now: Instant) -> Option<usize> {
        if self.timer.fire_if_due(now) {
            self.apply_commit()
        } else {
            None
        }
    }

    /// Commit the visual index immediately, cancelling the pending timer.
    pub fn commit_now(&mut self) -> Option<usize> {
        self.timer.cancel();
        self.apply_commit()
    }

    fn apply_commit(&mut self) -> Option<usize> {
        if self.committed_index == self.visual_index {
            return None;
        }
        log::debug!(
            "Navigator: committed {} -> {}",
            self.committed_index,
            self.visual_index
        );
        self.committed_index = self.visual_index;
        Some(self.committed_index)
    }

    /// Indices whose image bytes should be preloaded around the committed index.
    ///
    /// Near neighbours come first, then jump targets; out-of-range offsets are
    /// dropped and duplicates removed.
    pub fn prefetch_targets(&self) -> Vec<usize> {
        let mut seen = BTreeSet::new();
        NEIGHBOR_PREFETCH_OFFSETS
            .iter()
            .chain(JUMP_PREFETCH_OFFSETS)
            .filter_map(|&offset| self.offset_index(offset))
            .filter(|&index| seen.insert(index))
            .collect()
    }

    /// Indices within `radius` of the committed index, nearest first.
    pub fn metadata_window(&self, radius: usize) -> Vec<usize> {
        (1..=radius as isize)
            .flat_map(|d| [d, -d])
            .filter_map(|offset| self.offset_index(offset))
            .collect()
    }

    fn offset_index(&self, offset: isize) -> Option<usize> {
        let target = self.committed_index as isize + offset;
        (target >= 0 && (target as usize) < self.images.len() && offset != 0)
            .then_some(target as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("img_{:03}.jpg", i)).collect()
    }

    fn settle(nav: &mut ImageNavigator, now: Instant) -> Option<usize> {
        nav.poll(now + Duration::from_secs(1))
    }

    #[test]
    fn test_clamp_bounds() {
        let nav = ImageNavigator::new(images(10));
        assert_eq!(nav.clamp(-5), 0);
        assert_eq!(nav.clamp(0), 0);
        assert_eq!(nav.clamp(9), 9);
        assert_eq!(nav.clamp(100), 9);

        let empty = ImageNavigator::new(Vec::new());
        assert_eq!(empty.clamp(3), 0);
    }

    #[test]
    fn test_prev_next_stay_in_bounds() {
        let now = Instant::now();
        let mut nav = ImageNavigator::new(images(3));

        nav.prev_image(now);
        assert_eq!(nav.visual_index(), 0);
        assert!(!nav.is_settling());

        for _ in 0..5 {
            nav.next_image(now);
        }
        assert_eq!(nav.visual_index(), 2);
        nav.next_image(now);
        assert_eq!(nav.visual_index(), 2);
    }

    #[test]
    fn test_commit_is_debounced() {
        let now = Instant::now();
        let mut nav = ImageNavigator::new(images(50));

        nav.next_image(now);
        nav.next_image(now + Duration::from_millis(20));
        nav.next_image(now + Duration::from_millis(40));
        assert_eq!(nav.visual_index(), 3);
        assert_eq!(nav.committed_index(), 0);

        // Only 30ms since the last input
        assert_eq!(nav.poll(now + Duration::from_millis(70)), None);
        assert_eq!(nav.poll(now + Duration::from_millis(90)), Some(3));
        assert_eq!(nav.committed_index(), 3);
    }

    #[test]
    fn test_jump_clamps() {
        let now = Instant::now();
        let mut nav = ImageNavigator::new(images(15));
        nav.jump(10, now);
        nav.jump(10, now);
        assert_eq!(nav.visual_index(), 14);
        nav.jump(-100, now);
        assert_eq!(nav.visual_index(), 0);
    }

    #[test]
    fn test_returning_to_committed_index_commits_nothing() {
        let now = Instant::now();
        let mut nav = ImageNavigator::new(images(5));
        nav.next_image(now);
        nav.prev_image(now);
        assert_eq!(settle(&mut nav, now), None);
    }

    #[test]
    fn test_seek_to_image() {
        let now = Instant::now();
        let mut nav = ImageNavigator::new(images(20));
        assert!(nav.seek_to_image("img_012.jpg", now));
        assert!(!nav.seek_to_image("missing.jpg", now));
        assert_eq!(nav.commit_now(), Some(12));
        assert_eq!(nav.committed_image(), Some("img_012.jpg"));
    }

    #[test]
    fn test_prefetch_targets_clip_and_order() {
        let now = Instant::now();
        let mut nav = ImageNavigator::new(images(25));
        nav.set_visual_index(2, now);
        nav.commit_now();

        let targets = nav.prefetch_targets();
        assert_eq!(targets, vec![0, 1, 3, 4, 5, 12, 22]);
        assert!(!targets.contains(&2));
    }

    #[test]
    fn test_metadata_window() {
        let now = Instant::now();
        let mut nav = ImageNavigator::new(images(10));
        nav.set_visual_index(1, now);
        nav.commit_now();
        assert_eq!(nav.metadata_window(2), vec![2, 0, 3]);
    }
}

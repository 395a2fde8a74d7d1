//! Fragment registry
//!
//! Every block obtained from the system allocator is recorded as a fragment
//! `[low, high]` of slot addresses. Fragments are kept sorted by address and
//! adjacent ones are coalesced, so the registry answers "is this address
//! arena-owned" with a watermark test followed by a binary search.
//!
//! ```text
//! insert [26..=50] into [1..=25] [80..=99]
//!   -> [1..=50] [80..=99]          (coalesced with predecessor)
//! insert [51..=79]
//!   -> [1..=99]                    (bridges both neighbours)
//! ```

use crate::error::{Error, Result};
use serde::Serialize;
use tracing::debug;

/// One contiguous block of slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fragment {
    /// First slot address
    pub low: u32,
    /// Last slot address (inclusive)
    pub high: u32,
}

impl Fragment {
    pub fn new(low: u32, slots: u32) -> Self {
        debug_assert!(slots > 0);
        Self {
            low,
            high: low + slots - 1,
        }
    }

    pub fn slots(&self) -> usize {
        (self.high - self.low) as usize + 1
    }

    pub fn contains(&self, address: u32) -> bool {
        self.low <= address && address <= self.high
    }
}

/// Address-sorted, coalesced set of fragments
#[derive(Debug, Default)]
pub struct FragmentRegistry {
    fragments: Vec<Fragment>,
    low_watermark: Option<u32>,
    high_watermark: Option<u32>,
}

impl FragmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment, keeping address order and merging neighbours
    pub fn insert(&mut self, fragment: Fragment) -> Result<()> {
        // Position of the first fragment starting after the new one
        let pos = self.fragments.partition_point(|f| f.low < fragment.low);

        let overlaps_prev = pos > 0 && self.fragments[pos - 1].high >= fragment.low;
        let overlaps_next = pos < self.fragments.len() && fragment.high >= self.fragments[pos].low;
        if overlaps_prev || overlaps_next {
            return Err(Error::StructuralCorruption(format!(
                "fragment [{}..={}] overlaps a registered fragment",
                fragment.low, fragment.high
            )));
        }

        let joins_prev = pos > 0 && self.fragments[pos - 1].high + 1 == fragment.low;
        let joins_next =
            pos < self.fragments.len() && fragment.high + 1 == self.fragments[pos].low;

        match (joins_prev, joins_next) {
            (true, true) => {
                let next = self.fragments.remove(pos);
                self.fragments[pos - 1].high = next.high;
            }
            (true, false) => self.fragments[pos - 1].high = fragment.high,
            (false, true) => self.fragments[pos].low = fragment.low,
            (false, false) => self.fragments.insert(pos, fragment),
        }

        self.low_watermark = Some(self.low_watermark.map_or(fragment.low, |l| l.min(fragment.low)));
        self.high_watermark =
            Some(self.high_watermark.map_or(fragment.high, |h| h.max(fragment.high)));

        debug!(
            low = fragment.low,
            high = fragment.high,
            coalesced = joins_prev || joins_next,
            fragments = self.fragments.len(),
            "Registered fragment"
        );
        Ok(())
    }

    /// True iff `address` is within the watermarks and inside a fragment
    pub fn contains(&self, address: u32) -> bool {
        match (self.low_watermark, self.high_watermark) {
            (Some(low), Some(high)) if low <= address && address <= high => {}
            _ => return false,
        }
        let pos = self.fragments.partition_point(|f| f.high < address);
        self.fragments
            .get(pos)
            .map_or(false, |f| f.contains(address))
    }

    pub fn watermarks(&self) -> Option<(u32, u32)> {
        self.low_watermark.zip(self.high_watermark)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn total_slots(&self) -> usize {
        self.fragments.iter().map(Fragment::slots).sum()
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
        self.low_watermark = None;
        self.high_watermark = None;
    }
}

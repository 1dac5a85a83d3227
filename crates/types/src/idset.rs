/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

/// A set of 64-bit ids kept as sorted, merged ranges, as tracked by an
/// incremental-change-sync client.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdSet {
    ranges: Vec<(u64, u64)>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, id: u64) {
        self.append_range(id, id);
    }

    pub fn append_range(&mut self, low: u64, high: u64) {
        debug_assert!(low <= high);
        let mut low = low;
        let mut high = high;
        let mut merged = Vec::with_capacity(self.ranges.len() + 1);
        for &(a, b) in &self.ranges {
            let disjoint_below = b < low && low - b > 1;
            let disjoint_above = a > high && a - high > 1;
            if disjoint_below || disjoint_above {
                merged.push((a, b));
            } else {
                low = low.min(a);
                high = high.max(b);
            }
        }
        merged.push((low, high));
        merged.sort_unstable();
        self.ranges = merged;
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ranges.iter().any(|&(a, b)| a <= id && id <= b)
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[(u64, u64)] {
        &self.ranges
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.ranges.iter().flat_map(|&(a, b)| a..=b)
    }
}

/// The ICS synchronization state a client holds against a folder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IcsState {
    pub given: IdSet,
    pub seen: IdSet,
    pub seen_fai: IdSet,
}

impl IcsState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_merges_adjacent() {
        let mut set = IdSet::new();
        set.append(5);
        set.append(7);
        set.append(6);
        assert_eq!(set.ranges(), &[(5, 7)]);
        assert!(set.contains(6));
        assert!(!set.contains(8));
    }

    #[test]
    fn append_keeps_disjoint_ranges() {
        let mut set = IdSet::new();
        set.append_range(1, 3);
        set.append_range(10, 12);
        set.append(5);
        assert_eq!(set.ranges(), &[(1, 3), (5, 5), (10, 12)]);
        assert_eq!(set.iter_ids().count(), 7);
    }

    #[test]
    fn overlapping_ranges_are_absorbed() {
        let mut set = IdSet::new();
        set.append_range(1, 5);
        set.append_range(4, 9);
        assert_eq!(set.ranges(), &[(1, 9)]);
    }
}

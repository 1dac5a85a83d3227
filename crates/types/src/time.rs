/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between 1601-01-01 and 1970-01-01.
const EPOCH_DIFF: u64 = 11_644_473_600;

/// FILETIME ticks (100 ns) per second.
const TICKS_PER_SECOND: u64 = 10_000_000;

pub fn unix_to_nttime(unix: i64) -> u64 {
    (unix as u64).wrapping_add(EPOCH_DIFF) * TICKS_PER_SECOND
}

pub fn nttime_to_unix(nttime: u64) -> i64 {
    (nttime / TICKS_PER_SECOND) as i64 - EPOCH_DIFF as i64
}

pub fn current_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn current_nttime() -> u64 {
    unix_to_nttime(current_unix())
}

/// Minutes since 1601-01-01, the unit used by recurrence start/end dates.
pub fn nttime_to_recur_minutes(nttime: u64) -> u32 {
    (nttime / 600_000_000) as u32
}

pub fn recur_minutes_to_nttime(minutes: u32) -> u64 {
    minutes as u64 * 600_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nttime_roundtrip() {
        let unix = 1_713_168_000i64; // 2024-04-15T08:00:00Z
        assert_eq!(nttime_to_unix(unix_to_nttime(unix)), unix);
    }

    #[test]
    fn epoch_base() {
        assert_eq!(unix_to_nttime(0), 116_444_736_000_000_000);
    }
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The fixed binary timezone descriptor pair and its VTIMEZONE mapping.
//! A rule is either absolute (`year == 1`, fixed month/day) or floating
//! (`year == 0`, nth-weekday-of-month with day 5 meaning "last").

use crate::ext::{Reader, Writer};
use chrono::{DateTime, Datelike, Timelike};

/// A SYSTEMTIME-shaped transition rule.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTime {
    pub year: u16,
    pub month: u16,
    pub dayofweek: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub milliseconds: u16,
}

impl TransitionTime {
    pub fn is_unset(&self) -> bool {
        self.month == 0
    }

    fn serialize(&self, writer: &mut Writer) {
        writer.put_u16(self.year);
        writer.put_u16(self.month);
        writer.put_u16(self.dayofweek);
        writer.put_u16(self.day);
        writer.put_u16(self.hour);
        writer.put_u16(self.minute);
        writer.put_u16(self.second);
        writer.put_u16(self.milliseconds);
    }

    fn deserialize(reader: &mut Reader) -> Option<Self> {
        Some(TransitionTime {
            year: reader.get_u16()?,
            month: reader.get_u16()?,
            dayofweek: reader.get_u16()?,
            day: reader.get_u16()?,
            hour: reader.get_u16()?,
            minute: reader.get_u16()?,
            second: reader.get_u16()?,
            milliseconds: reader.get_u16()?,
        })
    }
}

/// Outlook's timezone property: offsets in minutes east of UTC, the
/// daylight bias relative to standard.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TzStruct {
    pub bias: i32,
    pub standard_bias: i32,
    pub daylight_bias: i32,
    pub standard_year: u16,
    pub standard_date: TransitionTime,
    pub daylight_year: u16,
    pub daylight_date: TransitionTime,
}

impl TzStruct {
    pub fn serialize(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.put_i32(self.bias);
        writer.put_i32(self.standard_bias);
        writer.put_i32(self.daylight_bias);
        writer.put_u16(self.standard_year);
        self.standard_date.serialize(&mut writer);
        writer.put_u16(self.daylight_year);
        self.daylight_date.serialize(&mut writer);
        writer.finish()
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut reader = Reader::new(bytes);
        Some(TzStruct {
            bias: reader.get_i32()?,
            standard_bias: reader.get_i32()?,
            daylight_bias: reader.get_i32()?,
            standard_year: reader.get_u16()?,
            standard_date: TransitionTime::deserialize(&mut reader)?,
            daylight_year: reader.get_u16()?,
            daylight_date: TransitionTime::deserialize(&mut reader)?,
        })
    }

    pub fn has_daylight(&self) -> bool {
        !self.daylight_date.is_unset()
    }
}

/// One effective year of a VTIMEZONE definition while sub-components are
/// being collected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TzRule {
    pub year: i16,
    pub bias: i32,
    pub daylight_bias: i32,
    pub standard_date: TransitionTime,
    pub daylight_date: TransitionTime,
}

/// Collapse per-year rules into the effective descriptor: inherit missing
/// halves from earlier rules, discard definitions that never leave
/// standard time, store the daylight bias relative to standard, and take
/// the latest rule.
pub fn collapse_rules(rules: &mut Vec<TzRule>) -> Option<TzStruct> {
    if rules.is_empty() {
        return None;
    }
    rules.sort_by_key(|rule| rule.year);
    let mut last_standard: Option<(TransitionTime, i32)> = None;
    let mut last_daylight: Option<(TransitionTime, i32)> = None;
    for rule in rules.iter_mut() {
        if !rule.standard_date.is_unset() {
            last_standard = Some((rule.standard_date, rule.bias));
        } else if let Some((date, bias)) = last_standard {
            rule.standard_date = date;
            rule.bias = bias;
        }
        if !rule.daylight_date.is_unset() {
            last_daylight = Some((rule.daylight_date, rule.daylight_bias));
        } else if let Some((date, bias)) = last_daylight {
            rule.daylight_date = date;
            rule.daylight_bias = bias;
        }
        if rule.daylight_date.is_unset() || rule.daylight_date == rule.standard_date {
            rule.daylight_date = TransitionTime::default();
        }
        rule.daylight_bias -= rule.bias;
    }
    if rules.len() > 1
        && (rules[0].standard_date.is_unset() || rules[0].daylight_date.is_unset())
        && !rules[1].standard_date.is_unset()
        && !rules[1].daylight_date.is_unset()
    {
        rules.remove(0);
    }
    rules[0].year = 1;
    let last = rules.last().copied()?;
    Some(TzStruct {
        bias: last.bias,
        standard_bias: 0,
        daylight_bias: last.daylight_bias,
        standard_year: last.standard_date.year,
        standard_date: last.standard_date,
        daylight_year: last.daylight_date.year,
        daylight_date: last.daylight_date,
    })
}

pub fn parse_utc_offset(text: &str) -> Option<i32> {
    let (sign, digits) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => (1, text),
    };
    if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

pub fn format_utc_offset(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let minutes = minutes.abs();
    format!("{sign}{:02}{:02}", minutes / 60, minutes % 60)
}

/// The weekday (0 = Sunday) and nth-of-month order of a civil date, used
/// when a DTSTART without an RRULE fixes a floating transition.
pub fn weekday_and_order(timestamp: i64) -> (u16, u16) {
    let civil = DateTime::from_timestamp(timestamp, 0).unwrap_or_default();
    let dayofweek = civil.weekday().num_days_from_sunday() as u16;
    let order = ((civil.day() - 1) / 7 + 1) as u16;
    (dayofweek, order)
}

/// Civil fields of a floating (timezone-less) timestamp.
pub fn civil_fields(timestamp: i64) -> (u16, u16, u16, u16, u16, u16) {
    let civil = DateTime::from_timestamp(timestamp, 0).unwrap_or_default();
    (
        civil.year() as u16,
        civil.month() as u16,
        civil.day() as u16,
        civil.hour() as u16,
        civil.minute() as u16,
        civil.second() as u16,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floating(month: u16, dayofweek: u16, order: u16, hour: u16) -> TransitionTime {
        TransitionTime {
            year: 0,
            month,
            dayofweek,
            day: order,
            hour,
            ..TransitionTime::default()
        }
    }

    #[test]
    fn binary_roundtrip() {
        let tz = TzStruct {
            bias: 60,
            standard_bias: 0,
            daylight_bias: 60,
            standard_year: 0,
            standard_date: floating(10, 0, 5, 3),
            daylight_year: 0,
            daylight_date: floating(3, 0, 5, 2),
        };
        let bytes = tz.serialize();
        assert_eq!(bytes.len(), 4 + 4 + 4 + 2 + 16 + 2 + 16);
        assert_eq!(TzStruct::deserialize(&bytes), Some(tz));
    }

    #[test]
    fn collapse_keeps_latest_effective_rule() {
        let mut rules = vec![
            TzRule {
                year: 1970,
                bias: 60,
                daylight_bias: 120,
                standard_date: floating(10, 0, 5, 3),
                daylight_date: floating(3, 0, 5, 2),
            },
            TzRule {
                year: 1996,
                bias: 60,
                daylight_bias: 120,
                standard_date: floating(10, 0, 4, 3),
                daylight_date: floating(3, 0, 5, 2),
            },
        ];
        let tz = collapse_rules(&mut rules).unwrap();
        assert_eq!(tz.standard_date.day, 4);
        assert_eq!(tz.daylight_bias, 60);
        assert!(tz.has_daylight());
    }

    #[test]
    fn standard_only_definition_zeroes_daylight() {
        let mut rules = vec![TzRule {
            year: 1601,
            bias: 480,
            daylight_bias: 0,
            standard_date: floating(1, 0, 1, 0),
            daylight_date: TransitionTime::default(),
        }];
        let tz = collapse_rules(&mut rules).unwrap();
        assert!(!tz.has_daylight());
        assert_eq!(tz.daylight_bias, -480);
    }

    #[test]
    fn offset_codec() {
        assert_eq!(parse_utc_offset("+0100"), Some(60));
        assert_eq!(parse_utc_offset("-0930"), Some(-570));
        assert_eq!(format_utc_offset(60), "+0100");
        assert_eq!(format_utc_offset(-570), "-0930");
        assert_eq!(parse_utc_offset("xx"), None);
    }
}

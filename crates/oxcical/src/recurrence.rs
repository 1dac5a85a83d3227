/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The binary recurrence serialization of the appointment property set,
//! and the bounded civil-date iterator used to derive end dates and
//! occurrence counts from imported rules.

use crate::ext::{Reader, Writer};
use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

pub const RECURFREQUENCY_DAILY: u16 = 0x200a;
pub const RECURFREQUENCY_WEEKLY: u16 = 0x200b;
pub const RECURFREQUENCY_MONTHLY: u16 = 0x200c;
pub const RECURFREQUENCY_YEARLY: u16 = 0x200d;

pub const PATTERNTYPE_DAY: u16 = 0x0;
pub const PATTERNTYPE_WEEK: u16 = 0x1;
pub const PATTERNTYPE_MONTH: u16 = 0x2;
pub const PATTERNTYPE_MONTHNTH: u16 = 0x3;
pub const PATTERNTYPE_MONTHEND: u16 = 0x4;
pub const PATTERNTYPE_HJMONTH: u16 = 0xa;
pub const PATTERNTYPE_HJMONTHNTH: u16 = 0xb;

pub const CAL_DEFAULT: u16 = 0x0;
pub const CAL_GREGORIAN: u16 = 0x1;
pub const CAL_HIJRI: u16 = 0x6;

pub const ENDTYPE_AFTER_DATE: u32 = 0x2021;
pub const ENDTYPE_AFTER_N_OCCURRENCES: u32 = 0x2022;
pub const ENDTYPE_NEVER_END: u32 = 0x2023;
pub const ENDDATE_MISSING: u32 = 0x5ae9_80df;

pub const WEEKRECUR_SU: u32 = 0x01;
pub const WEEKRECUR_MO: u32 = 0x02;
pub const WEEKRECUR_TU: u32 = 0x04;
pub const WEEKRECUR_WE: u32 = 0x08;
pub const WEEKRECUR_TH: u32 = 0x10;
pub const WEEKRECUR_FR: u32 = 0x20;
pub const WEEKRECUR_SA: u32 = 0x40;

pub const OVERRIDEFLAG_SUBJECT: u16 = 0x0001;
pub const OVERRIDEFLAG_MEETINGTYPE: u16 = 0x0002;
pub const OVERRIDEFLAG_REMINDERDELTA: u16 = 0x0004;
pub const OVERRIDEFLAG_REMINDER: u16 = 0x0008;
pub const OVERRIDEFLAG_LOCATION: u16 = 0x0010;
pub const OVERRIDEFLAG_BUSYSTATUS: u16 = 0x0020;
pub const OVERRIDEFLAG_ATTACHMENT: u16 = 0x0040;
pub const OVERRIDEFLAG_SUBTYPE: u16 = 0x0080;
pub const OVERRIDEFLAG_APPTCOLOR: u16 = 0x0100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTypeSpecific {
    Day,
    Week { week_recurrence: u32 },
    Month { day_of_month: u32 },
    MonthNth { week_recurrence: u32, recurrence_num: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrencePattern {
    pub reader_version: u16,
    pub writer_version: u16,
    pub recur_frequency: u16,
    pub pattern_type: u16,
    pub calendar_type: u16,
    /// Minutes since 1601 of the first pattern slot, modulo the period.
    pub first_datetime: u32,
    /// Period in the pattern unit (minutes for DAY, weeks/months else).
    pub period: u32,
    pub sliding_flag: u32,
    pub pattern_specific: PatternTypeSpecific,
    pub end_type: u32,
    pub occurrence_count: u32,
    pub first_dow: u32,
    /// Midnight minutes since 1601, ascending.
    pub deleted_instance_dates: Vec<u32>,
    pub modified_instance_dates: Vec<u32>,
    pub start_date: u32,
    pub end_date: u32,
}

impl Default for RecurrencePattern {
    fn default() -> Self {
        RecurrencePattern {
            reader_version: 0x3004,
            writer_version: 0x3004,
            recur_frequency: RECURFREQUENCY_DAILY,
            pattern_type: PATTERNTYPE_DAY,
            calendar_type: CAL_DEFAULT,
            first_datetime: 0,
            period: 1440,
            sliding_flag: 0,
            pattern_specific: PatternTypeSpecific::Day,
            end_type: ENDTYPE_NEVER_END,
            occurrence_count: 0x0a,
            first_dow: 0,
            deleted_instance_dates: Vec::new(),
            modified_instance_dates: Vec::new(),
            start_date: 0,
            end_date: ENDDATE_MISSING,
        }
    }
}

impl RecurrencePattern {
    pub fn serialize(&self, writer: &mut Writer) {
        writer.put_u16(self.reader_version);
        writer.put_u16(self.writer_version);
        writer.put_u16(self.recur_frequency);
        writer.put_u16(self.pattern_type);
        writer.put_u16(self.calendar_type);
        writer.put_u32(self.first_datetime);
        writer.put_u32(self.period);
        writer.put_u32(self.sliding_flag);
        match self.pattern_specific {
            PatternTypeSpecific::Day => {}
            PatternTypeSpecific::Week { week_recurrence } => writer.put_u32(week_recurrence),
            PatternTypeSpecific::Month { day_of_month } => writer.put_u32(day_of_month),
            PatternTypeSpecific::MonthNth {
                week_recurrence,
                recurrence_num,
            } => {
                writer.put_u32(week_recurrence);
                writer.put_u32(recurrence_num);
            }
        }
        writer.put_u32(self.end_type);
        writer.put_u32(self.occurrence_count);
        writer.put_u32(self.first_dow);
        writer.put_u32(self.deleted_instance_dates.len() as u32);
        for &date in &self.deleted_instance_dates {
            writer.put_u32(date);
        }
        writer.put_u32(self.modified_instance_dates.len() as u32);
        for &date in &self.modified_instance_dates {
            writer.put_u32(date);
        }
        writer.put_u32(self.start_date);
        writer.put_u32(self.end_date);
    }

    pub fn deserialize(reader: &mut Reader) -> Option<Self> {
        let reader_version = reader.get_u16()?;
        let writer_version = reader.get_u16()?;
        let recur_frequency = reader.get_u16()?;
        let pattern_type = reader.get_u16()?;
        let calendar_type = reader.get_u16()?;
        let first_datetime = reader.get_u32()?;
        let period = reader.get_u32()?;
        let sliding_flag = reader.get_u32()?;
        let pattern_specific = match pattern_type {
            PATTERNTYPE_DAY => PatternTypeSpecific::Day,
            PATTERNTYPE_WEEK => PatternTypeSpecific::Week {
                week_recurrence: reader.get_u32()?,
            },
            PATTERNTYPE_MONTH | PATTERNTYPE_MONTHEND | PATTERNTYPE_HJMONTH => {
                PatternTypeSpecific::Month {
                    day_of_month: reader.get_u32()?,
                }
            }
            PATTERNTYPE_MONTHNTH | PATTERNTYPE_HJMONTHNTH => PatternTypeSpecific::MonthNth {
                week_recurrence: reader.get_u32()?,
                recurrence_num: reader.get_u32()?,
            },
            _ => return None,
        };
        let end_type = reader.get_u32()?;
        let occurrence_count = reader.get_u32()?;
        let first_dow = reader.get_u32()?;
        let deleted_count = reader.get_u32()? as usize;
        let mut deleted_instance_dates = Vec::with_capacity(deleted_count.min(4096));
        for _ in 0..deleted_count {
            deleted_instance_dates.push(reader.get_u32()?);
        }
        let modified_count = reader.get_u32()? as usize;
        let mut modified_instance_dates = Vec::with_capacity(modified_count.min(4096));
        for _ in 0..modified_count {
            modified_instance_dates.push(reader.get_u32()?);
        }
        Some(RecurrencePattern {
            reader_version,
            writer_version,
            recur_frequency,
            pattern_type,
            calendar_type,
            first_datetime,
            period,
            sliding_flag,
            pattern_specific,
            end_type,
            occurrence_count,
            first_dow,
            deleted_instance_dates,
            modified_instance_dates,
            start_date: reader.get_u32()?,
            end_date: reader.get_u32()?,
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub start_datetime: u32,
    pub end_datetime: u32,
    pub original_start_date: u32,
    pub override_flags: u16,
    pub subject: Option<String>,
    pub meeting_type: Option<u32>,
    pub reminder_delta: Option<u32>,
    pub reminder_set: Option<u32>,
    pub location: Option<String>,
    pub busy_status: Option<u32>,
    pub attachment: Option<u32>,
    pub sub_type: Option<u32>,
    pub appointment_color: Option<u32>,
}

fn put_ansi_field(writer: &mut Writer, text: &str) {
    let bytes = text.as_bytes();
    writer.put_u16(bytes.len() as u16 + 1);
    writer.put_u16(bytes.len() as u16);
    writer.put_bytes(bytes);
}

fn get_ansi_field(reader: &mut Reader) -> Option<String> {
    let _reserved = reader.get_u16()?;
    let len = reader.get_u16()? as usize;
    let bytes = reader.get_bytes(len)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}

impl ExceptionInfo {
    fn serialize(&self, writer: &mut Writer) {
        writer.put_u32(self.start_datetime);
        writer.put_u32(self.end_datetime);
        writer.put_u32(self.original_start_date);
        writer.put_u16(self.override_flags);
        if self.override_flags & OVERRIDEFLAG_SUBJECT != 0 {
            put_ansi_field(writer, self.subject.as_deref().unwrap_or_default());
        }
        if self.override_flags & OVERRIDEFLAG_MEETINGTYPE != 0 {
            writer.put_u32(self.meeting_type.unwrap_or_default());
        }
        if self.override_flags & OVERRIDEFLAG_REMINDERDELTA != 0 {
            writer.put_u32(self.reminder_delta.unwrap_or_default());
        }
        if self.override_flags & OVERRIDEFLAG_REMINDER != 0 {
            writer.put_u32(self.reminder_set.unwrap_or_default());
        }
        if self.override_flags & OVERRIDEFLAG_LOCATION != 0 {
            put_ansi_field(writer, self.location.as_deref().unwrap_or_default());
        }
        if self.override_flags & OVERRIDEFLAG_BUSYSTATUS != 0 {
            writer.put_u32(self.busy_status.unwrap_or_default());
        }
        if self.override_flags & OVERRIDEFLAG_ATTACHMENT != 0 {
            writer.put_u32(self.attachment.unwrap_or_default());
        }
        if self.override_flags & OVERRIDEFLAG_SUBTYPE != 0 {
            writer.put_u32(self.sub_type.unwrap_or_default());
        }
        if self.override_flags & OVERRIDEFLAG_APPTCOLOR != 0 {
            writer.put_u32(self.appointment_color.unwrap_or_default());
        }
    }

    fn deserialize(reader: &mut Reader) -> Option<Self> {
        let mut info = ExceptionInfo {
            start_datetime: reader.get_u32()?,
            end_datetime: reader.get_u32()?,
            original_start_date: reader.get_u32()?,
            override_flags: reader.get_u16()?,
            ..ExceptionInfo::default()
        };
        if info.override_flags & OVERRIDEFLAG_SUBJECT != 0 {
            info.subject = Some(get_ansi_field(reader)?);
        }
        if info.override_flags & OVERRIDEFLAG_MEETINGTYPE != 0 {
            info.meeting_type = Some(reader.get_u32()?);
        }
        if info.override_flags & OVERRIDEFLAG_REMINDERDELTA != 0 {
            info.reminder_delta = Some(reader.get_u32()?);
        }
        if info.override_flags & OVERRIDEFLAG_REMINDER != 0 {
            info.reminder_set = Some(reader.get_u32()?);
        }
        if info.override_flags & OVERRIDEFLAG_LOCATION != 0 {
            info.location = Some(get_ansi_field(reader)?);
        }
        if info.override_flags & OVERRIDEFLAG_BUSYSTATUS != 0 {
            info.busy_status = Some(reader.get_u32()?);
        }
        if info.override_flags & OVERRIDEFLAG_ATTACHMENT != 0 {
            info.attachment = Some(reader.get_u32()?);
        }
        if info.override_flags & OVERRIDEFLAG_SUBTYPE != 0 {
            info.sub_type = Some(reader.get_u32()?);
        }
        if info.override_flags & OVERRIDEFLAG_APPTCOLOR != 0 {
            info.appointment_color = Some(reader.get_u32()?);
        }
        Some(info)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtendedException {
    pub change_highlight: u32,
    pub start_datetime: u32,
    pub end_datetime: u32,
    pub original_start_date: u32,
    pub subject: Option<String>,
    pub location: Option<String>,
}

impl ExtendedException {
    fn serialize(&self, writer: &mut Writer, writer_version2: u32, flags: u16) {
        if writer_version2 >= 0x3009 {
            writer.put_u32(4);
            writer.put_u32(self.change_highlight);
        }
        writer.put_u32(0); // ReservedBlockEE1
        if flags & (OVERRIDEFLAG_SUBJECT | OVERRIDEFLAG_LOCATION) != 0 {
            writer.put_u32(self.start_datetime);
            writer.put_u32(self.end_datetime);
            writer.put_u32(self.original_start_date);
            if flags & OVERRIDEFLAG_SUBJECT != 0 {
                let units: Vec<u16> = self
                    .subject
                    .as_deref()
                    .unwrap_or_default()
                    .encode_utf16()
                    .collect();
                writer.put_u16(units.len() as u16);
                for unit in units {
                    writer.put_u16(unit);
                }
            }
            if flags & OVERRIDEFLAG_LOCATION != 0 {
                let units: Vec<u16> = self
                    .location
                    .as_deref()
                    .unwrap_or_default()
                    .encode_utf16()
                    .collect();
                writer.put_u16(units.len() as u16);
                for unit in units {
                    writer.put_u16(unit);
                }
            }
            writer.put_u32(0); // ReservedBlockEE2
        }
    }

    fn deserialize(reader: &mut Reader, writer_version2: u32, flags: u16) -> Option<Self> {
        let mut exception = ExtendedException::default();
        if writer_version2 >= 0x3009 {
            let size = reader.get_u32()? as usize;
            if size >= 4 {
                exception.change_highlight = reader.get_u32()?;
                reader.get_bytes(size - 4)?;
            }
        }
        let reserved = reader.get_u32()? as usize;
        reader.get_bytes(reserved)?;
        if flags & (OVERRIDEFLAG_SUBJECT | OVERRIDEFLAG_LOCATION) != 0 {
            exception.start_datetime = reader.get_u32()?;
            exception.end_datetime = reader.get_u32()?;
            exception.original_start_date = reader.get_u32()?;
            if flags & OVERRIDEFLAG_SUBJECT != 0 {
                let len = reader.get_u16()? as usize;
                let mut units = Vec::with_capacity(len);
                for _ in 0..len {
                    units.push(reader.get_u16()?);
                }
                exception.subject = Some(String::from_utf16_lossy(&units));
            }
            if flags & OVERRIDEFLAG_LOCATION != 0 {
                let len = reader.get_u16()? as usize;
                let mut units = Vec::with_capacity(len);
                for _ in 0..len {
                    units.push(reader.get_u16()?);
                }
                exception.location = Some(String::from_utf16_lossy(&units));
            }
            let reserved2 = reader.get_u32()? as usize;
            reader.get_bytes(reserved2)?;
        }
        Some(exception)
    }
}

/// The full appointment recurrence property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentRecurrencePattern {
    pub pattern: RecurrencePattern,
    pub reader_version2: u32,
    pub writer_version2: u32,
    /// Minutes past the occurrence's midnight.
    pub start_time_offset: u32,
    pub end_time_offset: u32,
    pub exceptions: Vec<ExceptionInfo>,
    pub extended_exceptions: Vec<ExtendedException>,
}

impl Default for AppointmentRecurrencePattern {
    fn default() -> Self {
        AppointmentRecurrencePattern {
            pattern: RecurrencePattern::default(),
            reader_version2: 0x3006,
            writer_version2: 0x3009,
            start_time_offset: 0,
            end_time_offset: 0,
            exceptions: Vec::new(),
            extended_exceptions: Vec::new(),
        }
    }
}

impl AppointmentRecurrencePattern {
    /// Keep the date arrays ascending and the exception pairs ordered by
    /// start date, as the writer requires.
    pub fn normalize(&mut self) {
        self.pattern.deleted_instance_dates.sort_unstable();
        self.pattern.modified_instance_dates.sort_unstable();
        let mut order: Vec<usize> = (0..self.exceptions.len()).collect();
        order.sort_by_key(|&i| self.exceptions[i].start_datetime);
        self.exceptions = order.iter().map(|&i| self.exceptions[i].clone()).collect();
        self.extended_exceptions = order
            .iter()
            .filter_map(|&i| self.extended_exceptions.get(i).cloned())
            .collect();
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.pattern.serialize(&mut writer);
        writer.put_u32(self.reader_version2);
        writer.put_u32(self.writer_version2);
        writer.put_u32(self.start_time_offset);
        writer.put_u32(self.end_time_offset);
        writer.put_u16(self.exceptions.len() as u16);
        for exception in &self.exceptions {
            exception.serialize(&mut writer);
        }
        writer.put_u32(0); // ReservedBlock1
        for (exception, extended) in self.exceptions.iter().zip(&self.extended_exceptions) {
            extended.serialize(&mut writer, self.writer_version2, exception.override_flags);
        }
        writer.put_u32(0); // ReservedBlock2
        writer.finish()
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut reader = Reader::new(bytes);
        let pattern = RecurrencePattern::deserialize(&mut reader)?;
        let reader_version2 = reader.get_u32()?;
        let writer_version2 = reader.get_u32()?;
        let start_time_offset = reader.get_u32()?;
        let end_time_offset = reader.get_u32()?;
        let exception_count = reader.get_u16()? as usize;
        let mut exceptions = Vec::with_capacity(exception_count.min(1024));
        for _ in 0..exception_count {
            exceptions.push(ExceptionInfo::deserialize(&mut reader)?);
        }
        let reserved1 = reader.get_u32()? as usize;
        reader.get_bytes(reserved1)?;
        let mut extended_exceptions = Vec::with_capacity(exception_count.min(1024));
        for exception in &exceptions {
            extended_exceptions.push(ExtendedException::deserialize(
                &mut reader,
                writer_version2,
                exception.override_flags,
            )?);
        }
        Some(AppointmentRecurrencePattern {
            pattern,
            reader_version2,
            writer_version2,
            start_time_offset,
            end_time_offset,
            exceptions,
            extended_exceptions,
        })
    }
}

const BASE_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1601, 1, 1) {
    Some(date) => date,
    None => panic!(),
};

/// Minutes since 1601-01-01 of a civil datetime.
pub fn datetime_to_minutes(datetime: NaiveDateTime) -> u32 {
    let days = datetime.date().signed_duration_since(BASE_DATE).num_days();
    (days * 1440
        + datetime.time().signed_duration_since(NaiveTime::MIN).num_minutes()) as u32
}

pub fn date_to_minutes(date: NaiveDate) -> u32 {
    (date.signed_duration_since(BASE_DATE).num_days() * 1440) as u32
}

pub fn minutes_to_datetime(minutes: u32) -> Option<NaiveDateTime> {
    BASE_DATE
        .checked_add_days(Days::new(minutes as u64 / 1440))
        .map(|date| {
            date.and_time(
                NaiveTime::from_num_seconds_from_midnight_opt((minutes % 1440) * 60, 0)
                    .unwrap_or(NaiveTime::MIN),
            )
        })
}

pub fn weekday_bit(weekday: Weekday) -> u32 {
    match weekday {
        Weekday::Sun => WEEKRECUR_SU,
        Weekday::Mon => WEEKRECUR_MO,
        Weekday::Tue => WEEKRECUR_TU,
        Weekday::Wed => WEEKRECUR_WE,
        Weekday::Thu => WEEKRECUR_TH,
        Weekday::Fri => WEEKRECUR_FR,
        Weekday::Sat => WEEKRECUR_SA,
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// The nth (1..4, 5 = last) weekday-set day of a month.
fn nth_matching_day(year: i32, month: u32, week_bits: u32, nth: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month);
    if nth == 5 {
        (1..=last)
            .rev()
            .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
            .find(|date| weekday_bit(date.weekday()) & week_bits != 0)
    } else {
        (1..=last)
            .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
            .filter(|date| weekday_bit(date.weekday()) & week_bits != 0)
            .nth(nth as usize - 1)
    }
}

/// The recurrence shape the iterator understands; a direct mirror of the
/// pattern-type encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurShape {
    Daily { interval_days: u32 },
    Weekly { interval: u32, week_bits: u32 },
    MonthlyDay { interval_months: u32, day: u32 },
    MonthlyNth { interval_months: u32, week_bits: u32, nth: u32 },
}

/// Enumerate occurrence dates from a first occurrence, bounded by either
/// a count or an inclusive end date. Hard-capped to keep runaway rules
/// from spinning.
pub fn occurrences(
    first: NaiveDate,
    shape: RecurShape,
    count: Option<u32>,
    until: Option<NaiveDate>,
    cap: usize,
) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let push = |out: &mut Vec<NaiveDate>, date: NaiveDate| -> bool {
        if let Some(until) = until {
            if date > until {
                return false;
            }
        }
        out.push(date);
        if let Some(count) = count {
            if out.len() >= count as usize {
                return false;
            }
        }
        out.len() < cap
    };
    match shape {
        RecurShape::Daily { interval_days } => {
            let step = interval_days.max(1) as u64;
            let mut date = first;
            loop {
                if !push(&mut out, date) {
                    break;
                }
                date = match date.checked_add_days(Days::new(step)) {
                    Some(next) => next,
                    None => break,
                };
            }
        }
        RecurShape::Weekly { interval, week_bits } => {
            let interval = interval.max(1) as i64;
            // Weeks are anchored on the week (starting Sunday) holding
            // the first occurrence.
            let anchor = first
                .checked_sub_days(Days::new(
                    first.weekday().num_days_from_sunday() as u64
                ))
                .unwrap_or(first);
            let mut date = first;
            loop {
                let week_index = date.signed_duration_since(anchor).num_days() / 7;
                let on_week = week_index % interval == 0;
                if on_week && weekday_bit(date.weekday()) & week_bits != 0 {
                    if !push(&mut out, date) {
                        break;
                    }
                }
                date = match date.succ_opt() {
                    Some(next) => next,
                    None => break,
                };
                if out.is_empty()
                    && date.signed_duration_since(first).num_days() > 7 * interval + 7
                {
                    break;
                }
                if date.signed_duration_since(first).num_days() > 7 * cap as i64 * interval {
                    break;
                }
            }
        }
        RecurShape::MonthlyDay { interval_months, day } => {
            let step = interval_months.max(1);
            let mut cursor = first;
            loop {
                let last = days_in_month(cursor.year(), cursor.month());
                let day_of_month = if day >= 31 { last } else { day.min(last) };
                if let Some(date) =
                    NaiveDate::from_ymd_opt(cursor.year(), cursor.month(), day_of_month)
                {
                    if date >= first && !push(&mut out, date) {
                        break;
                    }
                }
                cursor = match cursor
                    .with_day(1)
                    .and_then(|d| d.checked_add_months(Months::new(step)))
                {
                    Some(next) => next,
                    None => break,
                };
            }
        }
        RecurShape::MonthlyNth {
            interval_months,
            week_bits,
            nth,
        } => {
            let step = interval_months.max(1);
            let mut cursor = first;
            loop {
                if let Some(date) =
                    nth_matching_day(cursor.year(), cursor.month(), week_bits, nth)
                {
                    if date >= first && !push(&mut out, date) {
                        break;
                    }
                }
                cursor = match cursor
                    .with_day(1)
                    .and_then(|d| d.checked_add_months(Months::new(step)))
                {
                    Some(next) => next,
                    None => break,
                };
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn minutes_codec() {
        let datetime = date(2024, 4, 15).and_hms_opt(9, 0, 0).unwrap();
        let minutes = datetime_to_minutes(datetime);
        assert_eq!(minutes_to_datetime(minutes), Some(datetime));
        assert_eq!(minutes % 1440, 9 * 60);
    }

    #[test]
    fn weekly_occurrences() {
        // FREQ=WEEKLY;BYDAY=MO,WE,FR;INTERVAL=2 from Mon 2024-04-15
        let dates = occurrences(
            date(2024, 4, 15),
            RecurShape::Weekly {
                interval: 2,
                week_bits: WEEKRECUR_MO | WEEKRECUR_WE | WEEKRECUR_FR,
            },
            Some(5),
            None,
            1000,
        );
        assert_eq!(
            dates,
            vec![
                date(2024, 4, 15),
                date(2024, 4, 17),
                date(2024, 4, 19),
                date(2024, 4, 29),
                date(2024, 5, 1),
            ]
        );
    }

    #[test]
    fn monthly_last_day() {
        let dates = occurrences(
            date(2024, 1, 31),
            RecurShape::MonthlyDay {
                interval_months: 1,
                day: 31,
            },
            Some(3),
            None,
            100,
        );
        assert_eq!(dates, vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 31)]);
    }

    #[test]
    fn monthly_nth_weekday() {
        // last Sunday of each month
        let dates = occurrences(
            date(2024, 3, 31),
            RecurShape::MonthlyNth {
                interval_months: 1,
                week_bits: WEEKRECUR_SU,
                nth: 5,
            },
            Some(2),
            None,
            100,
        );
        assert_eq!(dates, vec![date(2024, 3, 31), date(2024, 4, 28)]);
    }

    #[test]
    fn until_bound() {
        let dates = occurrences(
            date(2024, 4, 15),
            RecurShape::Daily { interval_days: 1 },
            None,
            Some(date(2024, 4, 18)),
            100,
        );
        assert_eq!(dates.len(), 4);
    }

    #[test]
    fn pattern_binary_roundtrip() {
        let mut recur = AppointmentRecurrencePattern {
            pattern: RecurrencePattern {
                recur_frequency: RECURFREQUENCY_WEEKLY,
                pattern_type: PATTERNTYPE_WEEK,
                period: 2,
                pattern_specific: PatternTypeSpecific::Week {
                    week_recurrence: WEEKRECUR_MO | WEEKRECUR_WE | WEEKRECUR_FR,
                },
                end_type: ENDTYPE_AFTER_N_OCCURRENCES,
                occurrence_count: 10,
                deleted_instance_dates: vec![500, 100],
                modified_instance_dates: vec![700],
                start_date: 100,
                end_date: 9000,
                ..RecurrencePattern::default()
            },
            start_time_offset: 540,
            end_time_offset: 600,
            exceptions: vec![ExceptionInfo {
                start_datetime: 1000,
                end_datetime: 1060,
                original_start_date: 940,
                override_flags: OVERRIDEFLAG_SUBJECT | OVERRIDEFLAG_BUSYSTATUS,
                subject: Some("Moved".into()),
                busy_status: Some(2),
                ..ExceptionInfo::default()
            }],
            extended_exceptions: vec![ExtendedException {
                start_datetime: 1000,
                end_datetime: 1060,
                original_start_date: 940,
                subject: Some("Moved".into()),
                ..ExtendedException::default()
            }],
            ..AppointmentRecurrencePattern::default()
        };
        recur.normalize();
        assert_eq!(recur.pattern.deleted_instance_dates, vec![100, 500]);
        let bytes = recur.serialize();
        let parsed = AppointmentRecurrencePattern::deserialize(&bytes).unwrap();
        assert_eq!(parsed, recur);
    }
}

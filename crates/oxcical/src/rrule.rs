/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! RRULE to appointment-recurrence mapping. Only the shapes Outlook can
//! represent are accepted; everything else is rejected up front so the
//! caller can fall back to storing the event unexpanded.

use crate::{
    CalendarError,
    recurrence::{
        AppointmentRecurrencePattern, CAL_DEFAULT, CAL_HIJRI, ENDTYPE_AFTER_DATE,
        ENDTYPE_AFTER_N_OCCURRENCES, ENDTYPE_NEVER_END, ENDDATE_MISSING, PATTERNTYPE_DAY,
        PATTERNTYPE_HJMONTH, PATTERNTYPE_HJMONTHNTH, PATTERNTYPE_MONTH, PATTERNTYPE_MONTHNTH,
        PATTERNTYPE_WEEK, PatternTypeSpecific, RECURFREQUENCY_DAILY, RECURFREQUENCY_MONTHLY,
        RECURFREQUENCY_WEEKLY, RECURFREQUENCY_YEARLY, RecurShape, RecurrencePattern, RecurShape::*,
        date_to_minutes, minutes_to_datetime, occurrences, weekday_bit,
    },
};
use calcard::icalendar::{
    ICalendarDay, ICalendarFrequency, ICalendarRecurrenceRule, ICalendarWeekday,
};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Timelike, Weekday};

const OCCURRENCE_CAP: usize = 100_000;

fn weekday_from_ical(weekday: &ICalendarWeekday) -> Weekday {
    match weekday {
        ICalendarWeekday::Sunday => Weekday::Sun,
        ICalendarWeekday::Monday => Weekday::Mon,
        ICalendarWeekday::Tuesday => Weekday::Tue,
        ICalendarWeekday::Wednesday => Weekday::Wed,
        ICalendarWeekday::Thursday => Weekday::Thu,
        ICalendarWeekday::Friday => Weekday::Fri,
        ICalendarWeekday::Saturday => Weekday::Sat,
    }
}

fn weekday_to_ical(weekday: Weekday) -> ICalendarWeekday {
    match weekday {
        Weekday::Sun => ICalendarWeekday::Sunday,
        Weekday::Mon => ICalendarWeekday::Monday,
        Weekday::Tue => ICalendarWeekday::Tuesday,
        Weekday::Wed => ICalendarWeekday::Wednesday,
        Weekday::Thu => ICalendarWeekday::Thursday,
        Weekday::Fri => ICalendarWeekday::Friday,
        Weekday::Sat => ICalendarWeekday::Saturday,
    }
}

fn byday_bits(days: &[ICalendarDay]) -> u32 {
    days.iter()
        .fold(0, |bits, day| bits | weekday_bit(weekday_from_ical(&day.weekday)))
}

/// The nth-of-month selector: BYSETPOS when present, else a uniform
/// ordinal on every BYDAY entry; -1 maps to 5 ("last").
fn nth_selector(rule: &ICalendarRecurrenceRule) -> Result<Option<u32>, CalendarError> {
    if let Some(&setpos) = rule.bysetpos.first() {
        if rule.bysetpos.len() > 1 {
            return Err(CalendarError::UnsupportedRecurrence("multiple BYSETPOS"));
        }
        return match setpos {
            -1 => Ok(Some(5)),
            1..=4 => Ok(Some(setpos as u32)),
            _ => Err(CalendarError::UnsupportedRecurrence("BYSETPOS out of range")),
        };
    }
    let mut selector = None;
    for day in &rule.byday {
        match day.ordwk {
            None => return Ok(None),
            Some(ord) => {
                let nth = match ord {
                    -1 => 5u32,
                    1..=4 => ord as u32,
                    _ => {
                        return Err(CalendarError::UnsupportedRecurrence(
                            "BYDAY ordinal out of range",
                        ));
                    }
                };
                if selector.is_some_and(|existing: u32| existing != nth) {
                    return Err(CalendarError::UnsupportedRecurrence("mixed BYDAY ordinals"));
                }
                selector = Some(nth);
            }
        }
    }
    Ok(selector)
}

fn month_slot_minutes(total_months: u32, interval: u32) -> u32 {
    let slot = total_months % interval.max(1);
    let year = 1601 + slot / 12;
    let month = slot % 12 + 1;
    NaiveDate::from_ymd_opt(year as i32, month, 1)
        .map(date_to_minutes)
        .unwrap_or(0)
}

/// Convert an imported RRULE into the binary recurrence pattern.
/// `start` is the first occurrence in the event's local civil time and
/// `duration_minutes` the occurrence length.
pub fn rrule_to_pattern(
    rule: &ICalendarRecurrenceRule,
    start: NaiveDateTime,
    duration_minutes: u32,
    hijri: bool,
) -> Result<AppointmentRecurrencePattern, CalendarError> {
    if !rule.byyearday.is_empty() || !rule.byweekno.is_empty() {
        return Err(CalendarError::UnsupportedRecurrence("BYYEARDAY/BYWEEKNO"));
    }
    if rule.bymonthday.len() > 1 {
        return Err(CalendarError::UnsupportedRecurrence("multiple BYMONTHDAY"));
    }
    if !rule.bysecond.is_empty() || !rule.byminute.is_empty() || !rule.byhour.is_empty() {
        return Err(CalendarError::UnsupportedRecurrence("sub-daily BY parts"));
    }
    let interval = rule.interval.unwrap_or(1) as u32;
    let start_date = start.date();
    let start_minutes = date_to_minutes(start_date);

    let mut pattern = RecurrencePattern {
        first_dow: rule
            .wkst
            .as_ref()
            .map(|w| weekday_from_ical(w).num_days_from_sunday())
            .unwrap_or(0),
        start_date: start_minutes,
        ..RecurrencePattern::default()
    };
    let shape;
    match rule.freq {
        ICalendarFrequency::Secondly
        | ICalendarFrequency::Minutely
        | ICalendarFrequency::Hourly => {
            return Err(CalendarError::UnsupportedRecurrence("sub-daily FREQ"));
        }
        ICalendarFrequency::Daily => {
            if !rule.byday.is_empty() || !rule.bymonth.is_empty() || !rule.bysetpos.is_empty() {
                return Err(CalendarError::UnsupportedRecurrence("BY parts on DAILY"));
            }
            if interval > 999 {
                return Err(CalendarError::UnsupportedRecurrence("DAILY interval > 999"));
            }
            pattern.recur_frequency = RECURFREQUENCY_DAILY;
            pattern.pattern_type = PATTERNTYPE_DAY;
            pattern.period = interval * 1440;
            pattern.first_datetime = start_minutes % pattern.period;
            pattern.pattern_specific = PatternTypeSpecific::Day;
            shape = Daily {
                interval_days: interval,
            };
        }
        ICalendarFrequency::Weekly => {
            if !rule.bymonth.is_empty() || !rule.bysetpos.is_empty() {
                return Err(CalendarError::UnsupportedRecurrence("BY parts on WEEKLY"));
            }
            if interval > 99 {
                return Err(CalendarError::UnsupportedRecurrence("WEEKLY interval > 99"));
            }
            let week_bits = if rule.byday.is_empty() {
                weekday_bit(start_date.weekday())
            } else {
                byday_bits(&rule.byday)
            };
            pattern.recur_frequency = RECURFREQUENCY_WEEKLY;
            pattern.pattern_type = PATTERNTYPE_WEEK;
            pattern.period = interval;
            let anchor = start_date
                .checked_sub_days(Days::new(start_date.weekday().num_days_from_sunday() as u64))
                .unwrap_or(start_date);
            pattern.first_datetime = date_to_minutes(anchor) % (10080 * interval);
            pattern.pattern_specific = PatternTypeSpecific::Week {
                week_recurrence: week_bits,
            };
            shape = Weekly {
                interval,
                week_bits,
            };
        }
        ICalendarFrequency::Monthly | ICalendarFrequency::Yearly => {
            let yearly = rule.freq == ICalendarFrequency::Yearly;
            if yearly {
                if interval > 8 {
                    return Err(CalendarError::UnsupportedRecurrence("YEARLY interval > 8"));
                }
            } else {
                if interval > 99 {
                    return Err(CalendarError::UnsupportedRecurrence("MONTHLY interval > 99"));
                }
                if !rule.bymonth.is_empty() {
                    return Err(CalendarError::UnsupportedRecurrence("BYMONTH on MONTHLY"));
                }
            }
            let interval_months = if yearly { interval * 12 } else { interval };
            pattern.recur_frequency = if yearly {
                RECURFREQUENCY_YEARLY
            } else {
                RECURFREQUENCY_MONTHLY
            };
            pattern.period = interval_months;
            let total_months =
                (start_date.year() as u32 - 1601) * 12 + start_date.month() - 1;
            pattern.first_datetime = month_slot_minutes(
                if yearly {
                    start_date.month() - 1
                } else {
                    total_months
                },
                interval_months,
            );
            let nth = nth_selector(rule)?;
            match nth {
                Some(nth) if !rule.byday.is_empty() => {
                    if !rule.bymonthday.is_empty() {
                        return Err(CalendarError::UnsupportedRecurrence(
                            "BYDAY with BYMONTHDAY",
                        ));
                    }
                    let week_bits = byday_bits(&rule.byday);
                    pattern.pattern_type = if hijri {
                        PATTERNTYPE_HJMONTHNTH
                    } else {
                        PATTERNTYPE_MONTHNTH
                    };
                    pattern.pattern_specific = PatternTypeSpecific::MonthNth {
                        week_recurrence: week_bits,
                        recurrence_num: nth,
                    };
                    shape = MonthlyNth {
                        interval_months,
                        week_bits,
                        nth,
                    };
                }
                _ => {
                    if !rule.byday.is_empty() || !rule.bysetpos.is_empty() {
                        return Err(CalendarError::UnsupportedRecurrence(
                            "BYDAY without BYSETPOS",
                        ));
                    }
                    let day = match rule.bymonthday.first() {
                        Some(&-1) => 31,
                        Some(&d) if d >= 1 => d as u32,
                        Some(_) => {
                            return Err(CalendarError::UnsupportedRecurrence(
                                "negative BYMONTHDAY",
                            ));
                        }
                        None => start_date.day(),
                    };
                    pattern.pattern_type = if hijri {
                        PATTERNTYPE_HJMONTH
                    } else {
                        PATTERNTYPE_MONTH
                    };
                    pattern.pattern_specific = PatternTypeSpecific::Month { day_of_month: day };
                    shape = MonthlyDay {
                        interval_months,
                        day,
                    };
                }
            }
            pattern.calendar_type = if hijri { CAL_DEFAULT } else { pattern.calendar_type };
        }
    }
    if hijri
        && !matches!(
            pattern.pattern_type,
            PATTERNTYPE_HJMONTH | PATTERNTYPE_HJMONTHNTH
        )
    {
        pattern.calendar_type = CAL_HIJRI;
    }

    // End condition: COUNT maps directly, UNTIL counts the generated
    // occurrences, neither leaves the series open-ended.
    let until_date = rule
        .until
        .as_ref()
        .and_then(|dt| dt.to_timestamp())
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.date_naive());
    if let Some(count) = rule.count {
        pattern.end_type = ENDTYPE_AFTER_N_OCCURRENCES;
        pattern.occurrence_count = count;
        let dates = occurrences(start_date, shape, Some(count), None, OCCURRENCE_CAP);
        pattern.end_date = dates.last().map(|&d| date_to_minutes(d)).unwrap_or(start_minutes);
    } else if let Some(until) = until_date {
        let dates = occurrences(start_date, shape, None, Some(until), OCCURRENCE_CAP);
        pattern.end_type = ENDTYPE_AFTER_DATE;
        pattern.occurrence_count = dates.len() as u32;
        pattern.end_date = dates.last().map(|&d| date_to_minutes(d)).unwrap_or(start_minutes);
    } else {
        pattern.end_type = ENDTYPE_NEVER_END;
        pattern.occurrence_count = 0x0a;
        pattern.end_date = ENDDATE_MISSING;
    }

    let start_offset = start.hour() * 60 + start.minute();
    Ok(AppointmentRecurrencePattern {
        pattern,
        start_time_offset: start_offset,
        end_time_offset: start_offset + duration_minutes,
        ..AppointmentRecurrencePattern::default()
    })
}

fn bits_to_days(bits: u32, ordwk: Option<i16>) -> Vec<ICalendarDay> {
    [
        Weekday::Sun,
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
    ]
    .into_iter()
    .filter(|&weekday| bits & weekday_bit(weekday) != 0)
    .map(|weekday| ICalendarDay {
        weekday: weekday_to_ical(weekday),
        ordwk,
    })
    .collect()
}

/// Render the pattern back into an RRULE value. End conditions are
/// normalized to COUNT; the occurrence set is preserved exactly.
pub fn pattern_to_rrule(
    recur: &AppointmentRecurrencePattern,
) -> Result<ICalendarRecurrenceRule, CalendarError> {
    let pattern = &recur.pattern;
    let mut rule = ICalendarRecurrenceRule::default();
    match pattern.pattern_type {
        PATTERNTYPE_DAY => {
            rule.freq = ICalendarFrequency::Daily;
            let interval = (pattern.period / 1440).max(1);
            if interval > 1 {
                rule.interval = Some(interval as u16);
            }
        }
        PATTERNTYPE_WEEK => {
            rule.freq = ICalendarFrequency::Weekly;
            if pattern.period > 1 {
                rule.interval = Some(pattern.period as u16);
            }
            if let PatternTypeSpecific::Week { week_recurrence } = pattern.pattern_specific {
                rule.byday = bits_to_days(week_recurrence, None);
            }
        }
        PATTERNTYPE_MONTH | PATTERNTYPE_HJMONTH | PATTERNTYPE_MONTHNTH
        | PATTERNTYPE_HJMONTHNTH => {
            let yearly = pattern.recur_frequency == RECURFREQUENCY_YEARLY;
            let interval = if yearly {
                (pattern.period / 12).max(1)
            } else {
                pattern.period.max(1)
            };
            rule.freq = if yearly {
                ICalendarFrequency::Yearly
            } else {
                ICalendarFrequency::Monthly
            };
            if interval > 1 {
                rule.interval = Some(interval as u16);
            }
            match pattern.pattern_specific {
                PatternTypeSpecific::Month { day_of_month } => {
                    rule.bymonthday = vec![if day_of_month >= 31 {
                        -1
                    } else {
                        day_of_month as i8
                    }];
                }
                PatternTypeSpecific::MonthNth {
                    week_recurrence,
                    recurrence_num,
                } => {
                    rule.byday = bits_to_days(week_recurrence, None);
                    rule.bysetpos = vec![if recurrence_num == 5 {
                        -1
                    } else {
                        recurrence_num as i32
                    }];
                }
                _ => return Err(CalendarError::InvalidComponent("pattern specific")),
            }
            if yearly {
                let month = minutes_to_datetime(pattern.start_date)
                    .map(|dt| dt.month() as u8)
                    .unwrap_or(1);
                rule.bymonth = vec![calcard::icalendar::ICalendarMonth::new(month, false)];
            }
        }
        _ => return Err(CalendarError::UnsupportedRecurrence("pattern type")),
    }
    match pattern.end_type {
        ENDTYPE_NEVER_END => {}
        _ => {
            rule.count = Some(pattern.occurrence_count);
        }
    }
    Ok(rule)
}

/// The iterator shape of a stored pattern, used when deleted/modified
/// instance dates have to be validated against the series.
pub fn pattern_shape(pattern: &RecurrencePattern) -> Option<RecurShape> {
    Some(match pattern.pattern_specific {
        PatternTypeSpecific::Day => Daily {
            interval_days: (pattern.period / 1440).max(1),
        },
        PatternTypeSpecific::Week { week_recurrence } => Weekly {
            interval: pattern.period.max(1),
            week_bits: week_recurrence,
        },
        PatternTypeSpecific::Month { day_of_month } => MonthlyDay {
            interval_months: pattern.period.max(1),
            day: day_of_month,
        },
        PatternTypeSpecific::MonthNth {
            week_recurrence,
            recurrence_num,
        } => MonthlyNth {
            interval_months: pattern.period.max(1),
            week_bits: week_recurrence,
            nth: recurrence_num,
        },
    })
}

/// Midnight minutes of the start date plus time offset, the layout of
/// exception start times.
pub fn occurrence_start_minutes(recur: &AppointmentRecurrencePattern, date: NaiveDate) -> u32 {
    date_to_minutes(date) + recur.start_time_offset
}

pub fn occurrence_datetime(date_minutes: u32) -> Option<NaiveDateTime> {
    minutes_to_datetime(date_minutes)
}

pub use crate::recurrence::datetime_to_minutes as civil_to_minutes;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::{WEEKRECUR_FR, WEEKRECUR_MO, WEEKRECUR_WE};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn weekly_rule() -> ICalendarRecurrenceRule {
        ICalendarRecurrenceRule {
            freq: ICalendarFrequency::Weekly,
            interval: Some(2),
            byday: vec![
                ICalendarDay {
                    weekday: ICalendarWeekday::Monday,
                    ordwk: None,
                },
                ICalendarDay {
                    weekday: ICalendarWeekday::Wednesday,
                    ordwk: None,
                },
                ICalendarDay {
                    weekday: ICalendarWeekday::Friday,
                    ordwk: None,
                },
            ],
            ..ICalendarRecurrenceRule::default()
        }
    }

    #[test]
    fn weekly_import_export_roundtrip() {
        let recur = rrule_to_pattern(&weekly_rule(), start(), 60, false).unwrap();
        assert_eq!(recur.pattern.pattern_type, PATTERNTYPE_WEEK);
        assert_eq!(recur.pattern.period, 2);
        assert_eq!(
            recur.pattern.pattern_specific,
            PatternTypeSpecific::Week {
                week_recurrence: WEEKRECUR_MO | WEEKRECUR_WE | WEEKRECUR_FR
            }
        );
        assert_eq!(recur.pattern.end_type, ENDTYPE_NEVER_END);
        assert_eq!(recur.pattern.occurrence_count, 0x0a);
        assert_eq!(recur.start_time_offset, 540);
        assert_eq!(recur.end_time_offset, 600);

        let exported = pattern_to_rrule(&recur).unwrap();
        assert_eq!(exported.freq, ICalendarFrequency::Weekly);
        assert_eq!(exported.interval, Some(2));
        let days: Vec<_> = exported.byday.iter().map(|d| d.weekday.clone()).collect();
        assert_eq!(
            days,
            vec![
                ICalendarWeekday::Monday,
                ICalendarWeekday::Wednesday,
                ICalendarWeekday::Friday
            ]
        );
    }

    #[test]
    fn count_sets_end_after_n() {
        let mut rule = weekly_rule();
        rule.interval = None;
        rule.byday.truncate(1);
        rule.count = Some(10);
        let recur = rrule_to_pattern(&rule, start(), 30, false).unwrap();
        assert_eq!(recur.pattern.end_type, ENDTYPE_AFTER_N_OCCURRENCES);
        assert_eq!(recur.pattern.occurrence_count, 10);
        // ten Mondays from 2024-04-15 end on 2024-06-17
        let end = minutes_to_datetime(recur.pattern.end_date).unwrap();
        assert_eq!(end.date(), NaiveDate::from_ymd_opt(2024, 6, 17).unwrap());
    }

    #[test]
    fn daily_bounds() {
        let rule = ICalendarRecurrenceRule {
            freq: ICalendarFrequency::Daily,
            interval: Some(1000),
            ..ICalendarRecurrenceRule::default()
        };
        assert!(matches!(
            rrule_to_pattern(&rule, start(), 30, false),
            Err(CalendarError::UnsupportedRecurrence(_))
        ));
    }

    #[test]
    fn monthly_nth_with_setpos() {
        let rule = ICalendarRecurrenceRule {
            freq: ICalendarFrequency::Monthly,
            byday: vec![ICalendarDay {
                weekday: ICalendarWeekday::Sunday,
                ordwk: None,
            }],
            bysetpos: vec![-1],
            ..ICalendarRecurrenceRule::default()
        };
        let recur = rrule_to_pattern(&rule, start(), 30, false).unwrap();
        assert_eq!(
            recur.pattern.pattern_specific,
            PatternTypeSpecific::MonthNth {
                week_recurrence: crate::recurrence::WEEKRECUR_SU,
                recurrence_num: 5
            }
        );
    }

    #[test]
    fn hijri_upgrades_month_patterns() {
        let rule = ICalendarRecurrenceRule {
            freq: ICalendarFrequency::Monthly,
            bymonthday: vec![15],
            ..ICalendarRecurrenceRule::default()
        };
        let recur = rrule_to_pattern(&rule, start(), 30, true).unwrap();
        assert_eq!(recur.pattern.pattern_type, PATTERNTYPE_HJMONTH);
        assert_eq!(recur.pattern.calendar_type, CAL_DEFAULT);
    }

    #[test]
    fn rejects_unsupported_clauses() {
        let mut rule = ICalendarRecurrenceRule {
            freq: ICalendarFrequency::Hourly,
            ..ICalendarRecurrenceRule::default()
        };
        assert!(rrule_to_pattern(&rule, start(), 30, false).is_err());
        rule.freq = ICalendarFrequency::Daily;
        rule.byweekno = vec![10];
        assert!(rrule_to_pattern(&rule, start(), 30, false).is_err());
    }
}

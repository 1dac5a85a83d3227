/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! VTIMEZONE components to and from the binary timezone descriptor.

use crate::{
    CalendarError,
    tzstruct::{
        TransitionTime, TzRule, TzStruct, civil_fields, collapse_rules, format_utc_offset,
        parse_utc_offset, weekday_and_order,
    },
};
use calcard::icalendar::{
    ICalendar, ICalendarComponent, ICalendarComponentType, ICalendarDay, ICalendarEntry,
    ICalendarFrequency, ICalendarProperty, ICalendarRecurrenceRule, ICalendarValue,
    ICalendarWeekday,
};

fn entry_text<'a>(component: &'a ICalendarComponent, name: &ICalendarProperty) -> Option<&'a str> {
    component
        .entries
        .iter()
        .find(|entry| entry.name == *name)
        .and_then(|entry| entry.values.first())
        .and_then(|value| value.as_text())
}

/// Basic-format date-time (`YYYYMMDDTHHMMSS`, optional `Z`) as naive
/// seconds.
fn parse_basic_datetime(text: &str) -> Option<i64> {
    let text = text.strip_suffix(['Z', 'z']).unwrap_or(text);
    if text.len() != 15 || text.as_bytes()[8] != b'T' {
        return None;
    }
    let date = chrono::NaiveDate::from_ymd_opt(
        text[0..4].parse().ok()?,
        text[4..6].parse().ok()?,
        text[6..8].parse().ok()?,
    )?;
    let time = chrono::NaiveTime::from_hms_opt(
        text[9..11].parse().ok()?,
        text[11..13].parse().ok()?,
        text[13..15].parse().ok()?,
    )?;
    Some(date.and_time(time).and_utc().timestamp())
}

fn entry_timestamp(component: &ICalendarComponent, name: &ICalendarProperty) -> Option<i64> {
    component
        .entries
        .iter()
        .find(|entry| entry.name == *name)
        .and_then(|entry| entry.values.first())
        .and_then(|value| match value {
            ICalendarValue::PartialDateTime(dt) => dt.to_timestamp(),
            ICalendarValue::Text(text) => parse_basic_datetime(text),
            _ => None,
        })
}

fn entry_rrule<'a>(
    component: &'a ICalendarComponent,
) -> Option<&'a ICalendarRecurrenceRule> {
    component
        .entries
        .iter()
        .find(|entry| entry.name == ICalendarProperty::Rrule)
        .and_then(|entry| entry.values.first())
        .and_then(|value| match value {
            ICalendarValue::RecurrenceRule(rule) => Some(rule.as_ref()),
            _ => None,
        })
}

fn sub_components<'a>(
    ical: &'a ICalendar,
    component: &ICalendarComponent,
) -> Vec<&'a ICalendarComponent> {
    component
        .component_ids
        .iter()
        .filter_map(|&id| ical.components.get(id as usize))
        .collect()
}

fn ical_weekday_index(weekday: &ICalendarWeekday) -> u16 {
    match weekday {
        ICalendarWeekday::Sunday => 0,
        ICalendarWeekday::Monday => 1,
        ICalendarWeekday::Tuesday => 2,
        ICalendarWeekday::Wednesday => 3,
        ICalendarWeekday::Thursday => 4,
        ICalendarWeekday::Friday => 5,
        ICalendarWeekday::Saturday => 6,
    }
}

/// Digest one STANDARD or DAYLIGHT sub-component into a bias and a
/// transition rule, returning the rule year the DTSTART pins.
fn parse_transition(
    component: &ICalendarComponent,
) -> Result<(i32, i16, TransitionTime), CalendarError> {
    let offset_to = entry_text(component, &ICalendarProperty::Tzoffsetto)
        .and_then(parse_utc_offset)
        .ok_or(CalendarError::MissingProperty("TZOFFSETTO"))?;
    let dtstart = entry_timestamp(component, &ICalendarProperty::Dtstart)
        .ok_or(CalendarError::MissingProperty("DTSTART"))?;
    let (year, start_month, _day, hour, minute, second) = civil_fields(dtstart);
    let mut date = TransitionTime {
        hour,
        minute,
        second,
        ..TransitionTime::default()
    };
    match entry_rrule(component) {
        Some(rule) => {
            if rule.freq != ICalendarFrequency::Yearly {
                return Err(CalendarError::UnsupportedRecurrence(
                    "timezone rule must be YEARLY",
                ));
            }
            let byday = rule.byday.first();
            let bymonthday = rule.bymonthday.first();
            if byday.is_some() == bymonthday.is_some() {
                return Err(CalendarError::UnsupportedRecurrence(
                    "timezone rule needs BYDAY or BYMONTHDAY",
                ));
            }
            date.month = rule
                .bymonth
                .first()
                .map(|month| month.month() as u16)
                .unwrap_or(start_month);
            if !(1..=12).contains(&date.month) {
                return Err(CalendarError::InvalidComponent("BYMONTH"));
            }
            if let Some(day) = byday {
                let order = match day.ordwk {
                    Some(-1) => 5,
                    Some(n @ 1..=5) => n as u16,
                    Some(_) => {
                        return Err(CalendarError::InvalidComponent("BYDAY order"));
                    }
                    None => {
                        return Err(CalendarError::InvalidComponent("BYDAY needs an ordinal"));
                    }
                };
                date.year = 0;
                date.dayofweek = ical_weekday_index(&day.weekday);
                date.day = order;
            } else if let Some(&day) = bymonthday {
                if day < 1 || day > 31 {
                    return Err(CalendarError::InvalidComponent("BYMONTHDAY"));
                }
                date.year = 1;
                date.dayofweek = 0;
                date.day = day as u16;
            }
        }
        None => {
            let (dayofweek, order) = weekday_and_order(dtstart);
            date.year = 0;
            date.month = start_month;
            date.dayofweek = dayofweek;
            date.day = order;
        }
    }
    Ok((offset_to, year as i16, date))
}

/// Collect the per-year rules of a VTIMEZONE and collapse them into the
/// effective descriptor.
pub fn vtimezone_to_tzstruct(
    ical: &ICalendar,
    vtimezone: &ICalendarComponent,
) -> Result<(String, TzStruct), CalendarError> {
    if vtimezone.component_type != ICalendarComponentType::VTimezone {
        return Err(CalendarError::InvalidComponent("not a VTIMEZONE"));
    }
    let tzid = entry_text(vtimezone, &ICalendarProperty::Tzid)
        .ok_or(CalendarError::MissingProperty("TZID"))?
        .to_string();
    let mut rules: Vec<TzRule> = Vec::new();
    for sub in sub_components(ical, vtimezone) {
        let daylight = match sub.component_type {
            ICalendarComponentType::Standard => false,
            ICalendarComponentType::Daylight => true,
            _ => continue,
        };
        let (bias, year, date) = parse_transition(sub)?;
        let rule = match rules.iter_mut().find(|rule| rule.year == year) {
            Some(rule) => rule,
            None => {
                rules.push(TzRule {
                    year,
                    ..TzRule::default()
                });
                rules.last_mut().ok_or(CalendarError::InvalidComponent("rules"))?
            }
        };
        if daylight {
            rule.daylight_bias = bias;
            rule.daylight_date = date;
        } else {
            rule.bias = bias;
            rule.standard_date = date;
        }
    }
    let tz = collapse_rules(&mut rules)
        .ok_or(CalendarError::InvalidComponent("no usable transition rules"))?;
    Ok((tzid, tz))
}

fn transition_component(
    kind: ICalendarComponentType,
    offset_from: i32,
    offset_to: i32,
    date: &TransitionTime,
) -> ICalendarComponent {
    let mut entries = vec![
        ICalendarEntry {
            name: ICalendarProperty::Dtstart,
            params: vec![],
            values: vec![ICalendarValue::Text(format!(
                "16010101T{:02}{:02}{:02}",
                date.hour, date.minute, date.second
            ))],
        },
        ICalendarEntry {
            name: ICalendarProperty::Tzoffsetfrom,
            params: vec![],
            values: vec![ICalendarValue::Text(format_utc_offset(offset_from))],
        },
        ICalendarEntry {
            name: ICalendarProperty::Tzoffsetto,
            params: vec![],
            values: vec![ICalendarValue::Text(format_utc_offset(offset_to))],
        },
    ];
    if !date.is_unset() {
        let mut rule = ICalendarRecurrenceRule {
            freq: ICalendarFrequency::Yearly,
            ..ICalendarRecurrenceRule::default()
        };
        if date.year == 0 {
            let weekday = match date.dayofweek {
                0 => ICalendarWeekday::Sunday,
                1 => ICalendarWeekday::Monday,
                2 => ICalendarWeekday::Tuesday,
                3 => ICalendarWeekday::Wednesday,
                4 => ICalendarWeekday::Thursday,
                5 => ICalendarWeekday::Friday,
                _ => ICalendarWeekday::Saturday,
            };
            rule.byday = vec![ICalendarDay {
                weekday,
                ordwk: Some(if date.day >= 5 { -1 } else { date.day as i16 }),
            }];
        } else {
            rule.bymonthday = vec![date.day as i8];
        }
        rule.bymonth = vec![calcard::icalendar::ICalendarMonth::new(date.month as u8, false)];
        entries.push(ICalendarEntry {
            name: ICalendarProperty::Rrule,
            params: vec![],
            values: vec![ICalendarValue::RecurrenceRule(Box::new(rule))],
        });
    }
    ICalendarComponent {
        component_type: kind,
        entries,
        component_ids: Default::default(),
    }
}

/// Append a VTIMEZONE (with STANDARD and, when defined, DAYLIGHT
/// sub-components) to a calendar under construction; returns the index
/// of the VTIMEZONE component.
pub fn tzstruct_to_vtimezone(ical: &mut ICalendar, tzid: &str, tz: &TzStruct) -> u16 {
    let vtimezone = ICalendarComponent {
        component_type: ICalendarComponentType::VTimezone,
        entries: vec![ICalendarEntry {
            name: ICalendarProperty::Tzid,
            params: vec![],
            values: vec![ICalendarValue::Text(tzid.to_string())],
        }],
        component_ids: Default::default(),
    };
    let standard_bias = tz.bias;
    let daylight_bias = tz.bias + tz.daylight_bias;
    let mut children = Vec::new();
    if tz.has_daylight() {
        children.push(transition_component(
            ICalendarComponentType::Standard,
            daylight_bias,
            standard_bias,
            &tz.standard_date,
        ));
        children.push(transition_component(
            ICalendarComponentType::Daylight,
            standard_bias,
            daylight_bias,
            &tz.daylight_date,
        ));
    } else {
        children.push(transition_component(
            ICalendarComponentType::Standard,
            standard_bias,
            standard_bias,
            &TransitionTime::default(),
        ));
    }
    let vtz_index = ical.components.len() as u16;
    ical.components.push(vtimezone);
    for child in children {
        let child_index = ical.components.len() as u16;
        ical.components.push(child);
        ical.components[vtz_index as usize]
            .component_ids
            .push(child_index.into());
    }
    // attach to the root VCALENDAR when present
    if let Some(root) = ical
        .components
        .iter_mut()
        .find(|c| c.component_type == ICalendarComponentType::VCalendar)
    {
        root.component_ids.push(vtz_index.into());
    }
    vtz_index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tzstruct::TzStruct;

    fn sample_tz() -> TzStruct {
        TzStruct {
            bias: 60,
            standard_bias: 0,
            daylight_bias: 60,
            standard_year: 0,
            standard_date: TransitionTime {
                year: 0,
                month: 10,
                dayofweek: 0,
                day: 5,
                hour: 3,
                ..TransitionTime::default()
            },
            daylight_year: 0,
            daylight_date: TransitionTime {
                year: 0,
                month: 3,
                dayofweek: 0,
                day: 5,
                hour: 2,
                ..TransitionTime::default()
            },
        }
    }

    #[test]
    fn floating_rule_roundtrip() {
        let mut ical = ICalendar { components: Vec::new() };
        ical.components.push(ICalendarComponent {
            component_type: ICalendarComponentType::VCalendar,
            entries: vec![],
            component_ids: Default::default(),
        });
        let tz = sample_tz();
        let index = tzstruct_to_vtimezone(&mut ical, "Europe/Berlin", &tz);
        let vtz = ical.components[index as usize].clone();
        let (tzid, parsed) = vtimezone_to_tzstruct(&ical, &vtz).unwrap();
        assert_eq!(tzid, "Europe/Berlin");
        assert_eq!(parsed.bias, tz.bias);
        assert_eq!(parsed.daylight_bias, tz.daylight_bias);
        assert_eq!(parsed.standard_date, tz.standard_date);
        assert_eq!(parsed.daylight_date, tz.daylight_date);
    }

    #[test]
    fn no_dst_emits_single_standard() {
        let mut ical = ICalendar { components: Vec::new() };
        let tz = TzStruct {
            bias: 480,
            ..TzStruct::default()
        };
        let index = tzstruct_to_vtimezone(&mut ical, "Asia/Shanghai", &tz);
        let vtz = &ical.components[index as usize];
        assert_eq!(vtz.component_ids.len(), 1);
        let standard = &ical.components[vtz.component_ids[0] as usize];
        assert_eq!(standard.component_type, ICalendarComponentType::Standard);
        assert_eq!(
            standard
                .entries
                .iter()
                .find(|e| e.name == ICalendarProperty::Dtstart)
                .and_then(|e| e.values.first())
                .and_then(|v| v.as_text()),
            Some("16010101T000000")
        );
    }
}

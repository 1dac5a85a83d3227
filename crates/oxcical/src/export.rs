/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Export a stored appointment back to an iCalendar object, the dual of
//! the importer over the same named-property map.

use crate::{
    CalendarError, LID_APPOINTMENT_END_WHOLE, LID_APPOINTMENT_RECUR, LID_APPOINTMENT_SEQUENCE,
    LID_APPOINTMENT_START_WHOLE, LID_BUSY_STATUS, LID_GLOBAL_OBJECT_ID, LID_LOCATION,
    LID_TIMEZONE_DESCRIPTION, LID_TIMEZONE_STRUCT, PSETID_APPOINTMENT, PSETID_MEETING,
    format_busy_status,
    goid::GlobalObjectId,
    recurrence::{AppointmentRecurrencePattern, minutes_to_datetime},
    rrule::pattern_to_rrule,
    tzstruct::TzStruct,
    vtimezone::tzstruct_to_vtimezone,
};
use calcard::icalendar::{
    ICalendar, ICalendarComponent, ICalendarComponentType, ICalendarEntry, ICalendarProperty,
    ICalendarValue,
};
use chrono::NaiveDateTime;
use types::{
    Guid, PropValue, PropertyNameKind,
    content::MessageContent,
    proptag::{
        PR_BODY, PR_SENT_REPRESENTING_SMTP_ADDRESS, PR_SMTP_ADDRESS, PR_SUBJECT, PT_BINARY,
        PT_LONG, PT_SYSTIME, PT_UNICODE, prop_tag,
    },
    time::nttime_to_unix,
    value::NameMap,
};

const PROD_ID: &str = "-//gwdelivery//calendar//EN";

fn find_propid(namemap: &NameMap, guid: Guid, lid: u32) -> Option<u16> {
    namemap.iter().find_map(|(&propid, name)| {
        (name.guid == guid && name.kind == PropertyNameKind::Id(lid)).then_some(propid)
    })
}

fn named_value<'a>(
    message: &'a MessageContent,
    namemap: &NameMap,
    guid: Guid,
    lid: u32,
    proptype: u16,
) -> Option<&'a PropValue> {
    let propid = find_propid(namemap, guid, lid)?;
    message.proplist.get(prop_tag(propid, proptype))
}

fn format_utc(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y%m%dT%H%M%SZ").to_string())
        .unwrap_or_default()
}

fn format_local(dt: NaiveDateTime) -> String {
    dt.format("%Y%m%dT%H%M%S").to_string()
}

fn text_entry(name: ICalendarProperty, value: impl Into<String>) -> ICalendarEntry {
    ICalendarEntry {
        name,
        params: vec![],
        values: vec![ICalendarValue::Text(value.into())],
    }
}

fn push_component(ical: &mut ICalendar, parent: u16, component: ICalendarComponent) -> u16 {
    let index = ical.components.len() as u16;
    ical.components.push(component);
    ical.components[parent as usize].component_ids.push(index.into());
    index
}

/// Render an appointment message into a calendar with the given METHOD.
/// Exceptions come back as sibling VEVENTs with RECURRENCE-ID.
pub fn export_calendar(
    message: &MessageContent,
    namemap: &NameMap,
    method: &str,
) -> Result<ICalendar, CalendarError> {
    let mut ical = ICalendar {
        components: Vec::with_capacity(4),
    };
    ical.components.push(ICalendarComponent {
        component_type: ICalendarComponentType::VCalendar,
        entries: vec![
            text_entry(ICalendarProperty::Version, "2.0"),
            text_entry(ICalendarProperty::Prodid, PROD_ID),
            text_entry(ICalendarProperty::Method, method.to_ascii_uppercase()),
        ],
        component_ids: Default::default(),
    });

    let tz = named_value(message, namemap, PSETID_APPOINTMENT, LID_TIMEZONE_STRUCT, PT_BINARY)
        .and_then(PropValue::as_bytes)
        .and_then(TzStruct::deserialize);
    let tzid = named_value(
        message,
        namemap,
        PSETID_APPOINTMENT,
        LID_TIMEZONE_DESCRIPTION,
        PT_UNICODE,
    )
    .and_then(PropValue::as_str)
    .unwrap_or("UTC")
    .to_string();
    if let Some(tz) = tz.as_ref() {
        tzstruct_to_vtimezone(&mut ical, &tzid, tz);
    }

    let uid = named_value(message, namemap, PSETID_MEETING, LID_GLOBAL_OBJECT_ID, PT_BINARY)
        .and_then(PropValue::as_bytes)
        .and_then(GlobalObjectId::deserialize)
        .map(|goid| goid.to_uid())
        .ok_or(CalendarError::MissingProperty("GlobalObjectId"))?;

    let start = named_value(
        message,
        namemap,
        PSETID_APPOINTMENT,
        LID_APPOINTMENT_START_WHOLE,
        PT_SYSTIME,
    )
    .and_then(PropValue::as_u64)
    .map(nttime_to_unix)
    .ok_or(CalendarError::MissingProperty("AppointmentStartWhole"))?;
    let end = named_value(
        message,
        namemap,
        PSETID_APPOINTMENT,
        LID_APPOINTMENT_END_WHOLE,
        PT_SYSTIME,
    )
    .and_then(PropValue::as_u64)
    .map(nttime_to_unix)
    .unwrap_or(start);

    let mut event = ICalendarComponent {
        component_type: ICalendarComponentType::VEvent,
        entries: vec![
            text_entry(ICalendarProperty::Uid, uid.clone()),
            text_entry(ICalendarProperty::Dtstart, format_utc(start)),
            text_entry(ICalendarProperty::Dtend, format_utc(end)),
            text_entry(ICalendarProperty::Dtstamp, format_utc(start)),
        ],
        component_ids: Default::default(),
    };

    if let Some(subject) = message.proplist.get_str(PR_SUBJECT) {
        event
            .entries
            .push(text_entry(ICalendarProperty::Summary, subject));
    }
    if let Some(body) = message.proplist.get_str(PR_BODY) {
        event
            .entries
            .push(text_entry(ICalendarProperty::Description, body));
    }
    if let Some(location) =
        named_value(message, namemap, PSETID_APPOINTMENT, LID_LOCATION, PT_UNICODE)
            .and_then(PropValue::as_str)
    {
        event
            .entries
            .push(text_entry(ICalendarProperty::Location, location));
    }
    if let Some(busy) =
        named_value(message, namemap, PSETID_APPOINTMENT, LID_BUSY_STATUS, PT_LONG)
            .and_then(PropValue::as_u32)
    {
        event.entries.push(text_entry(
            ICalendarProperty::Other("X-MICROSOFT-CDO-BUSYSTATUS".to_string()),
            format_busy_status(busy),
        ));
    }
    if let Some(sequence) = named_value(
        message,
        namemap,
        PSETID_APPOINTMENT,
        LID_APPOINTMENT_SEQUENCE,
        PT_LONG,
    )
    .and_then(PropValue::as_u32)
    {
        event.entries.push(ICalendarEntry {
            name: ICalendarProperty::Sequence,
            params: vec![],
            values: vec![ICalendarValue::Integer(sequence as i64)],
        });
    }
    if let Some(organizer) = message.proplist.get_str(PR_SENT_REPRESENTING_SMTP_ADDRESS) {
        event.entries.push(text_entry(
            ICalendarProperty::Organizer,
            format!("mailto:{organizer}"),
        ));
    }
    for row in &message.recipients {
        if let Some(address) = row.get_str(PR_SMTP_ADDRESS) {
            event.entries.push(text_entry(
                ICalendarProperty::Attendee,
                format!("mailto:{address}"),
            ));
        }
    }

    let recur = named_value(
        message,
        namemap,
        PSETID_APPOINTMENT,
        LID_APPOINTMENT_RECUR,
        PT_BINARY,
    )
    .and_then(PropValue::as_bytes)
    .and_then(AppointmentRecurrencePattern::deserialize);
    if let Some(recur) = recur.as_ref() {
        let rule = pattern_to_rrule(recur)?;
        event.entries.push(ICalendarEntry {
            name: ICalendarProperty::Rrule,
            params: vec![],
            values: vec![ICalendarValue::RecurrenceRule(Box::new(rule))],
        });
        // Deleted instances that are not exception moves are true EXDATEs.
        let moved: Vec<u32> = recur
            .exceptions
            .iter()
            .map(|exception| exception.original_start_date / 1440 * 1440)
            .collect();
        for &date in &recur.pattern.deleted_instance_dates {
            if moved.contains(&date) {
                continue;
            }
            if let Some(local) = minutes_to_datetime(date + recur.start_time_offset) {
                event
                    .entries
                    .push(text_entry(ICalendarProperty::Exdate, format_local(local)));
            }
        }
    }

    push_component(&mut ical, 0, event);

    if let Some(recur) = recur.as_ref() {
        for (exception, extended) in recur.exceptions.iter().zip(&recur.extended_exceptions) {
            let original = minutes_to_datetime(exception.original_start_date)
                .ok_or(CalendarError::InvalidComponent("exception date"))?;
            let start = minutes_to_datetime(exception.start_datetime)
                .ok_or(CalendarError::InvalidComponent("exception start"))?;
            let end = minutes_to_datetime(exception.end_datetime).unwrap_or(start);
            let mut entries = vec![
                text_entry(ICalendarProperty::Uid, uid.clone()),
                text_entry(ICalendarProperty::RecurrenceId, format_local(original)),
                text_entry(ICalendarProperty::Dtstart, format_local(start)),
                text_entry(ICalendarProperty::Dtend, format_local(end)),
            ];
            if let Some(subject) = extended.subject.as_deref().or(exception.subject.as_deref()) {
                entries.push(text_entry(ICalendarProperty::Summary, subject));
            }
            if let Some(location) =
                extended.location.as_deref().or(exception.location.as_deref())
            {
                entries.push(text_entry(ICalendarProperty::Location, location));
            }
            if let Some(busy) = exception.busy_status {
                entries.push(text_entry(
                    ICalendarProperty::Other("X-MICROSOFT-CDO-BUSYSTATUS".to_string()),
                    format_busy_status(busy),
                ));
            }
            push_component(
                &mut ical,
                0,
                ICalendarComponent {
                    component_type: ICalendarComponentType::VEvent,
                    entries,
                    component_ids: Default::default(),
                },
            );
        }
    }

    Ok(ical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::import_calendar;

    #[test]
    fn weekly_event_roundtrips_through_export() {
        let ics = concat!(
            "BEGIN:VCALENDAR\r\n",
            "VERSION:2.0\r\n",
            "PRODID:-//test//EN\r\n",
            "METHOD:PUBLISH\r\n",
            "BEGIN:VEVENT\r\n",
            "UID:weekly-standup@example.org\r\n",
            "DTSTAMP:20240401T080000Z\r\n",
            "DTSTART:20240415T090000Z\r\n",
            "DTEND:20240415T100000Z\r\n",
            "SUMMARY:Standup\r\n",
            "RRULE:FREQ=WEEKLY;BYDAY=MO,WE,FR;INTERVAL=2\r\n",
            "END:VEVENT\r\n",
            "END:VCALENDAR\r\n",
        );
        let ical = ICalendar::parse(ics).expect("parse");
        let imported = import_calendar(&ical).expect("import");
        let exported =
            export_calendar(&imported.message, &imported.namemap, "PUBLISH").expect("export");
        let text = exported.to_string();
        assert!(text.contains("UID:weekly-standup@example.org"));
        assert!(text.contains("FREQ=WEEKLY"));
        assert!(text.contains("INTERVAL=2"));
        assert!(text.contains("MO"));
        assert!(text.contains("FR"));

        // and the exported text parses back to the same pattern
        let again = ICalendar::parse(&text).expect("reparse");
        let reimported = import_calendar(&again).expect("reimport");
        let recur_a = named_value(
            &imported.message,
            &imported.namemap,
            PSETID_APPOINTMENT,
            LID_APPOINTMENT_RECUR,
            PT_BINARY,
        )
        .and_then(PropValue::as_bytes)
        .and_then(AppointmentRecurrencePattern::deserialize)
        .expect("first pattern");
        let recur_b = named_value(
            &reimported.message,
            &reimported.namemap,
            PSETID_APPOINTMENT,
            LID_APPOINTMENT_RECUR,
            PT_BINARY,
        )
        .and_then(PropValue::as_bytes)
        .and_then(AppointmentRecurrencePattern::deserialize)
        .expect("second pattern");
        assert_eq!(recur_a.pattern.pattern_specific, recur_b.pattern.pattern_specific);
        assert_eq!(recur_a.pattern.period, recur_b.pattern.period);
        assert_eq!(recur_a.pattern.recur_frequency, recur_b.pattern.recur_frequency);
    }

    #[test]
    fn export_requires_identity() {
        let message = MessageContent::new();
        assert!(matches!(
            export_calendar(&message, &NameMap::default(), "PUBLISH"),
            Err(CalendarError::MissingProperty(_))
        ));
    }
}

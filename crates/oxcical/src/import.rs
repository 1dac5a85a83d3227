/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Import an iCalendar object into a message, fanning exception events
//! out into hidden embedded attachments and the recurrence blob.

use crate::{
    CalendarError, LID_APPOINTMENT_COUNTER_PROPOSAL, LID_APPOINTMENT_DURATION,
    LID_APPOINTMENT_END_WHOLE, LID_APPOINTMENT_PROPOSED_END_WHOLE,
    LID_APPOINTMENT_PROPOSED_START_WHOLE, LID_APPOINTMENT_RECUR, LID_APPOINTMENT_SEQUENCE,
    LID_APPOINTMENT_START_WHOLE, LID_APPOINTMENT_SUBTYPE, LID_BUSY_STATUS,
    LID_CLEAN_GLOBAL_OBJECT_ID, LID_EXCEPTION_REPLACE_TIME, LID_GLOBAL_OBJECT_ID, LID_IS_RECURRING,
    LID_LOCATION, LID_RECURRING, LID_REMINDER_DELTA, LID_REMINDER_SET, LID_TIMEZONE_DESCRIPTION,
    LID_TIMEZONE_STRUCT, NamedPropStager, OL_BUSY, OL_FREE, PSETID_APPOINTMENT, PSETID_COMMON,
    PSETID_MEETING, goid::GlobalObjectId, message_class, parse_busy_status,
    recurrence::{datetime_to_minutes, date_to_minutes},
    rrule::rrule_to_pattern,
    vtimezone::vtimezone_to_tzstruct,
};
use calcard::{
    common::IanaString,
    icalendar::{
        ICalendar, ICalendarComponent, ICalendarComponentType, ICalendarEntry,
        ICalendarParameterName, ICalendarProperty, ICalendarValue,
    },
};
use chrono::NaiveDateTime;
use types::{
    PropValue, TaggedPropval, TpropvalArray,
    constants::RECIPIENT_TYPE_TO,
    content::{AttachmentContent, MessageContent},
    proptag::{
        ATTACH_METHOD_EMBEDDED, PR_ADDRTYPE, PR_ATTACH_METHOD, PR_ATTACHMENT_HIDDEN, PR_BODY,
        PR_DISPLAY_NAME, PR_EMAIL_ADDRESS, PR_EXCEPTION_ENDTIME, PR_EXCEPTION_STARTTIME,
        PR_MESSAGE_CLASS, PR_RECIPIENT_TYPE, PR_RENDERING_POSITION, PR_SENT_REPRESENTING_ADDRTYPE,
        PR_SENT_REPRESENTING_EMAIL_ADDRESS, PR_SENT_REPRESENTING_NAME,
        PR_SENT_REPRESENTING_SMTP_ADDRESS, PR_SMTP_ADDRESS, PR_SUBJECT, PT_BINARY, PT_BOOLEAN,
        PT_LONG, PT_SYSTIME, PT_UNICODE, prop_tag,
    },
    time::unix_to_nttime,
    value::NameMap,
};

use crate::recurrence::{
    ExceptionInfo, ExtendedException, OVERRIDEFLAG_BUSYSTATUS, OVERRIDEFLAG_LOCATION,
    OVERRIDEFLAG_SUBJECT,
};

pub struct ImportedCalendar {
    pub message: MessageContent,
    pub namemap: NameMap,
}

struct EventTimes {
    utc: i64,
    local: NaiveDateTime,
}

fn entry<'a>(
    component: &'a ICalendarComponent,
    name: &ICalendarProperty,
) -> Option<&'a ICalendarEntry> {
    component.entries.iter().find(|entry| entry.name == *name)
}

fn entry_text<'a>(component: &'a ICalendarComponent, name: &ICalendarProperty) -> Option<&'a str> {
    entry(component, name)
        .and_then(|entry| entry.values.first())
        .and_then(|value| value.as_text())
}

fn other_text<'a>(component: &'a ICalendarComponent, name: &str) -> Option<&'a str> {
    component
        .entries
        .iter()
        .find(|entry| match &entry.name {
            ICalendarProperty::Other(other) => other.eq_ignore_ascii_case(name),
            _ => false,
        })
        .and_then(|entry| entry.values.first())
        .and_then(|value| value.as_text())
}

fn entry_integer(component: &ICalendarComponent, name: &ICalendarProperty) -> Option<i64> {
    entry(component, name)
        .and_then(|entry| entry.values.first())
        .and_then(|value| match value {
            ICalendarValue::Integer(value) => Some(*value),
            ICalendarValue::Text(text) => text.parse().ok(),
            _ => None,
        })
}

/// Resolve a date-time entry to UTC seconds and the event-local civil
/// time, honoring a TZID parameter when the calendar defines it.
fn entry_times(
    ical: &ICalendar,
    component: &ICalendarComponent,
    name: &ICalendarProperty,
) -> Option<EventTimes> {
    let entry = entry(component, name)?;
    let tz_id = entry.tz_id();
    let date = entry.values.first().and_then(|value| match value {
        ICalendarValue::PartialDateTime(date) => Some(date),
        _ => None,
    })?;
    let tz = ical.build_tz_resolver().resolve_or_default(tz_id);
    let (utc, local) = match date.to_date_time_with_tz(tz) {
        Some(zoned) => (zoned.timestamp(), zoned.naive_local()),
        None => {
            let ts = date.to_timestamp()?;
            let naive = chrono::DateTime::from_timestamp(ts, 0)?.naive_utc();
            (ts, naive)
        }
    };
    Some(EventTimes { utc, local })
}

fn attendee_address(value: &ICalendarValue) -> Option<String> {
    let raw = match value {
        ICalendarValue::Uri(uri) => uri.as_str()?.to_string(),
        ICalendarValue::Text(text) => text.clone(),
        _ => return None,
    };
    let address = raw
        .strip_prefix("mailto:")
        .or_else(|| raw.strip_prefix("MAILTO:"))
        .unwrap_or(&raw);
    (!address.is_empty()).then(|| address.to_string())
}

fn param_text(entry: &ICalendarEntry, name: &ICalendarParameterName) -> Option<String> {
    entry.params.iter().find_map(|param| {
        if param.name == *name {
            param.value.as_text().map(|text| text.to_string())
        } else {
            None
        }
    })
}

fn first_partstat(component: &ICalendarComponent) -> Option<String> {
    component
        .entries
        .iter()
        .filter(|entry| entry.name == ICalendarProperty::Attendee)
        .find_map(|entry| {
            entry.params.iter().find_map(|param| {
                if param.name == ICalendarParameterName::Partstat {
                    param.value.as_text().map(|text| text.to_string())
                } else {
                    None
                }
            })
        })
}

fn component_busy_status(component: &ICalendarComponent, default: u32) -> u32 {
    if let Some(status) =
        other_text(component, "X-MICROSOFT-CDO-BUSYSTATUS").and_then(parse_busy_status)
    {
        return status;
    }
    match entry_text(component, &ICalendarProperty::Transp) {
        Some(transp) if transp.eq_ignore_ascii_case("TRANSPARENT") => OL_FREE,
        Some(_) => OL_BUSY,
        None => default,
    }
}

fn reminder_minutes(ical: &ICalendar, component: &ICalendarComponent) -> Option<u32> {
    for &child in component.component_ids.iter() {
        let alarm = ical.components.get(child as usize)?;
        if alarm.component_type != ICalendarComponentType::VAlarm {
            continue;
        }
        if let Some(trigger) = entry(alarm, &ICalendarProperty::Trigger) {
            if let Some(ICalendarValue::Duration(duration)) = trigger.values.first() {
                let seconds = duration.as_seconds();
                return Some((seconds.unsigned_abs() / 60) as u32);
            }
        }
    }
    None
}

fn set_named(
    props: &mut TpropvalArray,
    stager: &mut NamedPropStager,
    guid: types::Guid,
    lid: u32,
    proptype: u16,
    value: PropValue,
) {
    let propid = stager.stage_lid(guid, lid);
    props.set(prop_tag(propid, proptype), value);
}

fn attendee_rows(component: &ICalendarComponent) -> Vec<TpropvalArray> {
    component
        .entries
        .iter()
        .filter(|entry| entry.name == ICalendarProperty::Attendee)
        .filter_map(|entry| {
            let address = entry.values.first().and_then(attendee_address)?;
            let display = param_text(entry, &ICalendarParameterName::Cn)
                .unwrap_or_else(|| address.clone());
            Some(
                [
                    TaggedPropval::new(PR_DISPLAY_NAME, PropValue::Unicode(display)),
                    TaggedPropval::new(PR_ADDRTYPE, PropValue::Unicode("SMTP".into())),
                    TaggedPropval::new(PR_EMAIL_ADDRESS, PropValue::Unicode(address.clone())),
                    TaggedPropval::new(PR_SMTP_ADDRESS, PropValue::Unicode(address)),
                    TaggedPropval::new(PR_RECIPIENT_TYPE, PropValue::Long(RECIPIENT_TYPE_TO)),
                ]
                .into_iter()
                .collect(),
            )
        })
        .collect()
}

fn exception_message(component: &ICalendarComponent, class: &str) -> MessageContent {
    let mut message = MessageContent::new();
    message
        .proplist
        .set(PR_MESSAGE_CLASS, PropValue::Unicode(class.to_string()));
    if let Some(summary) = entry_text(component, &ICalendarProperty::Summary) {
        message
            .proplist
            .set(PR_SUBJECT, PropValue::Unicode(summary.to_string()));
    }
    if let Some(description) = entry_text(component, &ICalendarProperty::Description) {
        message
            .proplist
            .set(PR_BODY, PropValue::Unicode(description.to_string()));
    }
    for row in attendee_rows(component) {
        message.add_recipient(row);
    }
    message
}

/// Import the first UID group of the calendar into a message. Named
/// properties are staged from 0x8000; the returned map lets the store
/// re-assign them.
pub fn import_calendar(ical: &ICalendar) -> Result<ImportedCalendar, CalendarError> {
    let root = ical
        .components
        .iter()
        .find(|c| c.component_type == ICalendarComponentType::VCalendar);
    let method = root
        .and_then(|root| entry(root, &ICalendarProperty::Method))
        .and_then(|entry| entry.values.first())
        .and_then(|value| match value {
            ICalendarValue::Method(method) => Some(method.as_str().to_string()),
            ICalendarValue::Text(text) => Some(text.clone()),
            _ => None,
        });
    let hijri = root
        .and_then(|root| {
            other_text(root, "X-MICROSOFT-CALSCALE")
                .or_else(|| entry_text(root, &ICalendarProperty::Calscale))
        })
        .is_some_and(|scale| scale.eq_ignore_ascii_case("Hijri"));

    let events: Vec<&ICalendarComponent> = ical
        .components
        .iter()
        .filter(|c| c.component_type == ICalendarComponentType::VEvent)
        .collect();
    let main = events
        .iter()
        .find(|event| entry(event, &ICalendarProperty::RecurrenceId).is_none())
        .copied()
        .ok_or(CalendarError::MissingProperty("VEVENT"))?;
    let uid = main.uid();
    let exceptions: Vec<&ICalendarComponent> = events
        .iter()
        .filter(|event| {
            entry(event, &ICalendarProperty::RecurrenceId).is_some() && event.uid() == uid
        })
        .copied()
        .collect();

    let mut stager = NamedPropStager::new();
    let mut message = MessageContent::new();

    let partstat = first_partstat(main);
    let (class, counter) = message_class(method.as_deref(), partstat.as_deref());
    message.proplist.set(PR_MESSAGE_CLASS, PropValue::Unicode(class.to_string()));

    let start = entry_times(ical, main, &ICalendarProperty::Dtstart)
        .ok_or(CalendarError::MissingProperty("DTSTART"))?;
    let end = entry_times(ical, main, &ICalendarProperty::Dtend);
    let duration_minutes = end
        .as_ref()
        .map(|end| ((end.utc - start.utc).max(0) / 60) as u32)
        .unwrap_or(0);
    let end_utc = end.as_ref().map(|end| end.utc).unwrap_or(start.utc);

    set_named(
        &mut message.proplist,
        &mut stager,
        PSETID_APPOINTMENT,
        LID_APPOINTMENT_START_WHOLE,
        PT_SYSTIME,
        PropValue::NtTime(unix_to_nttime(start.utc)),
    );
    set_named(
        &mut message.proplist,
        &mut stager,
        PSETID_APPOINTMENT,
        LID_APPOINTMENT_END_WHOLE,
        PT_SYSTIME,
        PropValue::NtTime(unix_to_nttime(end_utc)),
    );
    set_named(
        &mut message.proplist,
        &mut stager,
        PSETID_APPOINTMENT,
        LID_APPOINTMENT_DURATION,
        PT_LONG,
        PropValue::Long(duration_minutes),
    );
    if counter {
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_APPOINTMENT,
            LID_APPOINTMENT_COUNTER_PROPOSAL,
            PT_BOOLEAN,
            PropValue::Bool(true),
        );
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_APPOINTMENT,
            LID_APPOINTMENT_PROPOSED_START_WHOLE,
            PT_SYSTIME,
            PropValue::NtTime(unix_to_nttime(start.utc)),
        );
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_APPOINTMENT,
            LID_APPOINTMENT_PROPOSED_END_WHOLE,
            PT_SYSTIME,
            PropValue::NtTime(unix_to_nttime(end_utc)),
        );
    }

    if let Some(summary) = entry_text(main, &ICalendarProperty::Summary) {
        message.proplist.set(PR_SUBJECT, PropValue::Unicode(summary.to_string()));
    }
    if let Some(description) = entry_text(main, &ICalendarProperty::Description) {
        message.proplist.set(PR_BODY, PropValue::Unicode(description.to_string()));
    }
    if let Some(location) = entry_text(main, &ICalendarProperty::Location) {
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_APPOINTMENT,
            LID_LOCATION,
            PT_UNICODE,
            PropValue::Unicode(location.to_string()),
        );
    }
    let busy_status = component_busy_status(main, OL_BUSY);
    set_named(
        &mut message.proplist,
        &mut stager,
        PSETID_APPOINTMENT,
        LID_BUSY_STATUS,
        PT_LONG,
        PropValue::Long(busy_status),
    );
    if let Some(sequence) = entry_integer(main, &ICalendarProperty::Sequence) {
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_APPOINTMENT,
            LID_APPOINTMENT_SEQUENCE,
            PT_LONG,
            PropValue::Long(sequence.max(0) as u32),
        );
    }
    if let Some(minutes) = reminder_minutes(ical, main) {
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_COMMON,
            LID_REMINDER_SET,
            PT_BOOLEAN,
            PropValue::Bool(true),
        );
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_COMMON,
            LID_REMINDER_DELTA,
            PT_LONG,
            PropValue::Long(minutes),
        );
    }

    if let Some(uid) = uid {
        let goid = GlobalObjectId::from_uid(uid);
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_MEETING,
            LID_GLOBAL_OBJECT_ID,
            PT_BINARY,
            PropValue::Binary(goid.serialize()),
        );
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_MEETING,
            LID_CLEAN_GLOBAL_OBJECT_ID,
            PT_BINARY,
            PropValue::Binary(goid.to_clean().serialize()),
        );
    }

    // Timezone context for the recurrence, when the calendar carries one.
    if let Some((tzid, tz)) = ical
        .components
        .iter()
        .filter(|c| c.component_type == ICalendarComponentType::VTimezone)
        .find_map(|vtz| vtimezone_to_tzstruct(ical, vtz).ok())
    {
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_APPOINTMENT,
            LID_TIMEZONE_STRUCT,
            PT_BINARY,
            PropValue::Binary(tz.serialize()),
        );
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_APPOINTMENT,
            LID_TIMEZONE_DESCRIPTION,
            PT_UNICODE,
            PropValue::Unicode(tzid),
        );
    }

    // Attendees count for everything except plain publications.
    let publish = method
        .as_deref()
        .is_none_or(|m| m.eq_ignore_ascii_case("PUBLISH"));
    if !publish {
        for row in attendee_rows(main) {
            message.add_recipient(row);
        }
    }
    if let Some(organizer) = entry(main, &ICalendarProperty::Organizer) {
        if let Some(address) = organizer.values.first().and_then(attendee_address) {
            let display = param_text(organizer, &ICalendarParameterName::Cn)
                .unwrap_or_else(|| address.clone());
            message.proplist.set(PR_SENT_REPRESENTING_NAME, PropValue::Unicode(display));
            message.proplist.set(
                PR_SENT_REPRESENTING_ADDRTYPE,
                PropValue::Unicode("SMTP".into()),
            );
            message.proplist.set(
                PR_SENT_REPRESENTING_EMAIL_ADDRESS,
                PropValue::Unicode(address.clone()),
            );
            message.proplist.set(
                PR_SENT_REPRESENTING_SMTP_ADDRESS,
                PropValue::Unicode(address),
            );
        }
    }

    // Recurrence, overrides, and the exception fan-out.
    let rule = entry(main, &ICalendarProperty::Rrule)
        .and_then(|entry| entry.values.first())
        .and_then(|value| match value {
            ICalendarValue::RecurrenceRule(rule) => Some(rule.as_ref()),
            _ => None,
        });
    if let Some(rule) = rule {
        let mut recur = rrule_to_pattern(rule, start.local, duration_minutes, hijri)?;

        for exdate_entry in main.entries.iter().filter(|entry| {
            entry.name == ICalendarProperty::Exdate
                || matches!(&entry.name, ICalendarProperty::Other(name)
                    if name.eq_ignore_ascii_case("X-MICROSOFT-EXDATE"))
        }) {
            for value in &exdate_entry.values {
                if let ICalendarValue::PartialDateTime(date) = value {
                    if let Some(ts) = date.to_timestamp() {
                        if let Some(civil) = chrono::DateTime::from_timestamp(ts, 0) {
                            recur
                                .pattern
                                .deleted_instance_dates
                                .push(date_to_minutes(civil.date_naive()));
                        }
                    }
                }
            }
        }
        for rdate_entry in main
            .entries
            .iter()
            .filter(|entry| entry.name == ICalendarProperty::Rdate)
        {
            for value in &rdate_entry.values {
                if let ICalendarValue::PartialDateTime(date) = value {
                    if let Some(ts) = date.to_timestamp() {
                        if let Some(civil) = chrono::DateTime::from_timestamp(ts, 0) {
                            recur
                                .pattern
                                .modified_instance_dates
                                .push(date_to_minutes(civil.date_naive()));
                        }
                    }
                }
            }
        }

        for exception in &exceptions {
            let original = entry_times(ical, exception, &ICalendarProperty::RecurrenceId)
                .ok_or(CalendarError::MissingProperty("RECURRENCE-ID"))?;
            let new_start = entry_times(ical, exception, &ICalendarProperty::Dtstart)
                .unwrap_or(EventTimes {
                    utc: original.utc,
                    local: original.local,
                });
            let new_end = entry_times(ical, exception, &ICalendarProperty::Dtend);
            let new_end_utc = new_end.as_ref().map(|end| end.utc).unwrap_or(
                new_start.utc + duration_minutes as i64 * 60,
            );
            let new_end_local = new_end
                .as_ref()
                .map(|end| end.local)
                .unwrap_or(new_start.local + chrono::Duration::minutes(duration_minutes as i64));

            let mut override_flags = 0u16;
            let subject = entry_text(exception, &ICalendarProperty::Summary).map(str::to_string);
            if subject.is_some() {
                override_flags |= OVERRIDEFLAG_SUBJECT;
            }
            let location = entry_text(exception, &ICalendarProperty::Location).map(str::to_string);
            if location.is_some() {
                override_flags |= OVERRIDEFLAG_LOCATION;
            }
            let exception_busy =
                other_text(exception, "X-MICROSOFT-CDO-BUSYSTATUS").and_then(parse_busy_status);
            if exception_busy.is_some() {
                override_flags |= OVERRIDEFLAG_BUSYSTATUS;
            }

            recur
                .pattern
                .deleted_instance_dates
                .push(date_to_minutes(original.local.date()));
            recur
                .pattern
                .modified_instance_dates
                .push(date_to_minutes(new_start.local.date()));
            recur.exceptions.push(ExceptionInfo {
                start_datetime: datetime_to_minutes(new_start.local),
                end_datetime: datetime_to_minutes(new_end_local),
                original_start_date: datetime_to_minutes(original.local),
                override_flags,
                subject: subject.clone(),
                location: location.clone(),
                busy_status: exception_busy,
                ..ExceptionInfo::default()
            });
            recur.extended_exceptions.push(ExtendedException {
                start_datetime: datetime_to_minutes(new_start.local),
                end_datetime: datetime_to_minutes(new_end_local),
                original_start_date: datetime_to_minutes(original.local),
                subject,
                location,
                ..ExtendedException::default()
            });

            let mut attachment = AttachmentContent::with_embedded(exception_message(
                exception,
                "IPM.Appointment",
            ));
            attachment
                .proplist
                .set(PR_ATTACH_METHOD, PropValue::Long(ATTACH_METHOD_EMBEDDED));
            attachment
                .proplist
                .set(PR_ATTACHMENT_HIDDEN, PropValue::Bool(true));
            attachment
                .proplist
                .set(PR_RENDERING_POSITION, PropValue::Long(0xffff_ffff));
            attachment.proplist.set(
                PR_EXCEPTION_STARTTIME,
                PropValue::NtTime(unix_to_nttime(new_start.utc)),
            );
            attachment.proplist.set(
                PR_EXCEPTION_ENDTIME,
                PropValue::NtTime(unix_to_nttime(new_end_utc)),
            );
            if let Some(embedded) = attachment.embedded.as_deref_mut() {
                let propid = stager.stage_lid(PSETID_APPOINTMENT, LID_EXCEPTION_REPLACE_TIME);
                embedded.proplist.set(
                    prop_tag(propid, PT_SYSTIME),
                    PropValue::NtTime(unix_to_nttime(original.utc)),
                );
            }
            message.add_attachment(attachment);
        }

        recur.normalize();
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_APPOINTMENT,
            LID_APPOINTMENT_RECUR,
            PT_BINARY,
            PropValue::Binary(recur.serialize()),
        );
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_APPOINTMENT,
            LID_RECURRING,
            PT_BOOLEAN,
            PropValue::Bool(true),
        );
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_MEETING,
            LID_IS_RECURRING,
            PT_BOOLEAN,
            PropValue::Bool(true),
        );
    } else {
        set_named(
            &mut message.proplist,
            &mut stager,
            PSETID_APPOINTMENT,
            LID_APPOINTMENT_SUBTYPE,
            PT_BOOLEAN,
            PropValue::Bool(false),
        );
    }

    Ok(ImportedCalendar {
        message,
        namemap: stager.into_namemap(),
    })
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use calcard::icalendar::ICalendar;
use oxcical::{
    LID_APPOINTMENT_RECUR, LID_GLOBAL_OBJECT_ID, PSETID_APPOINTMENT, PSETID_MEETING,
    goid::GlobalObjectId,
    import::import_calendar,
    recurrence::{
        AppointmentRecurrencePattern, ENDTYPE_AFTER_N_OCCURRENCES, OVERRIDEFLAG_SUBJECT,
        date_to_minutes,
    },
};
use types::{
    PropertyNameKind,
    proptag::{
        PR_ATTACHMENT_HIDDEN, PR_EXCEPTION_STARTTIME, PR_SUBJECT, PT_BINARY, prop_tag,
    },
    time::nttime_to_unix,
};

const CALENDAR: &str = concat!(
    "BEGIN:VCALENDAR\r\n",
    "VERSION:2.0\r\n",
    "PRODID:-//test//EN\r\n",
    "METHOD:PUBLISH\r\n",
    "BEGIN:VEVENT\r\n",
    "UID:X\r\n",
    "DTSTAMP:20240401T080000Z\r\n",
    "DTSTART:20240408T090000Z\r\n",
    "DTEND:20240408T093000Z\r\n",
    "SUMMARY:Weekly sync\r\n",
    "RRULE:FREQ=WEEKLY;BYDAY=MO;COUNT=10\r\n",
    "END:VEVENT\r\n",
    "BEGIN:VEVENT\r\n",
    "UID:X\r\n",
    "DTSTAMP:20240401T080000Z\r\n",
    "RECURRENCE-ID:20240415T090000Z\r\n",
    "DTSTART:20240415T140000Z\r\n",
    "DTEND:20240415T143000Z\r\n",
    "SUMMARY:Weekly sync (moved)\r\n",
    "END:VEVENT\r\n",
    "END:VCALENDAR\r\n",
);

fn named_bytes<'a>(
    imported: &'a oxcical::import::ImportedCalendar,
    guid: types::Guid,
    lid: u32,
) -> Option<&'a [u8]> {
    let propid = imported.namemap.iter().find_map(|(&propid, name)| {
        (name.guid == guid && name.kind == PropertyNameKind::Id(lid)).then_some(propid)
    })?;
    imported
        .message
        .proplist
        .get(prop_tag(propid, PT_BINARY))
        .and_then(types::PropValue::as_bytes)
}

#[test]
fn recurring_event_with_override() {
    let ical = ICalendar::parse(CALENDAR).expect("parse");
    let imported = import_calendar(&ical).expect("import");

    // One hidden embedded attachment for the moved instance.
    assert_eq!(imported.message.attachments.len(), 1);
    let attachment = &imported.message.attachments[0];
    assert_eq!(attachment.proplist.get_bool(PR_ATTACHMENT_HIDDEN), Some(true));
    let exception_start = attachment
        .proplist
        .get_u64(PR_EXCEPTION_STARTTIME)
        .expect("exception start");
    assert_eq!(nttime_to_unix(exception_start), 1713189600); // 2024-04-15T14:00Z
    assert!(attachment.embedded.is_some());

    // The recurrence blob carries the override and the deleted slot.
    let recur_bytes =
        named_bytes(&imported, PSETID_APPOINTMENT, LID_APPOINTMENT_RECUR).expect("recur");
    let recur = AppointmentRecurrencePattern::deserialize(recur_bytes).expect("recur decode");
    assert_eq!(recur.pattern.end_type, ENDTYPE_AFTER_N_OCCURRENCES);
    assert_eq!(recur.pattern.occurrence_count, 10);
    let original_midnight = date_to_minutes(
        chrono::NaiveDate::from_ymd_opt(2024, 4, 15).expect("date"),
    );
    assert!(recur
        .pattern
        .deleted_instance_dates
        .contains(&original_midnight));
    assert!(recur
        .pattern
        .modified_instance_dates
        .contains(&original_midnight));
    assert_eq!(recur.exceptions.len(), 1);
    let exception = &recur.exceptions[0];
    assert_ne!(exception.override_flags & OVERRIDEFLAG_SUBJECT, 0);
    assert_eq!(exception.subject.as_deref(), Some("Weekly sync (moved)"));
    assert!(recur
        .pattern
        .deleted_instance_dates
        .windows(2)
        .all(|pair| pair[0] <= pair[1]));

    // The UID wraps as a third-party GlobalObjectId.
    let goid_bytes = named_bytes(&imported, PSETID_MEETING, LID_GLOBAL_OBJECT_ID).expect("goid");
    let goid = GlobalObjectId::deserialize(goid_bytes).expect("goid decode");
    assert_eq!(goid.foreign_uid(), Some("X"));

    // Main event keeps its own subject.
    assert_eq!(
        imported.message.proplist.get_str(PR_SUBJECT),
        Some("Weekly sync")
    );
}

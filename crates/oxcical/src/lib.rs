/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod export;
pub mod ext;
pub mod goid;
pub mod import;
pub mod recurrence;
pub mod rrule;
pub mod tzstruct;
pub mod vtimezone;

use types::{Guid, PropertyName, value::NameMap};

/// PSETID_Appointment.
pub const PSETID_APPOINTMENT: Guid = Guid {
    time_low: 0x0006_2002,
    time_mid: 0x0000,
    time_hi_and_version: 0x0000,
    clock_seq: [0xc0, 0x00],
    node: [0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
};

/// PSETID_Meeting.
pub const PSETID_MEETING: Guid = Guid {
    time_low: 0x6ed8_da90,
    time_mid: 0x450b,
    time_hi_and_version: 0x101b,
    clock_seq: [0x98, 0xda],
    node: [0x00, 0xaa, 0x00, 0x3f, 0x13, 0x05],
};

/// PSETID_Common.
pub const PSETID_COMMON: Guid = Guid {
    time_low: 0x0006_2008,
    time_mid: 0x0000,
    time_hi_and_version: 0x0000,
    clock_seq: [0xc0, 0x00],
    node: [0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
};

// PSETID_Appointment lids.
pub const LID_APPOINTMENT_SEQUENCE: u32 = 0x8201;
pub const LID_BUSY_STATUS: u32 = 0x8205;
pub const LID_LOCATION: u32 = 0x8208;
pub const LID_APPOINTMENT_START_WHOLE: u32 = 0x820d;
pub const LID_APPOINTMENT_END_WHOLE: u32 = 0x820e;
pub const LID_APPOINTMENT_DURATION: u32 = 0x8213;
pub const LID_APPOINTMENT_SUBTYPE: u32 = 0x8215;
pub const LID_APPOINTMENT_RECUR: u32 = 0x8216;
pub const LID_APPOINTMENT_STATE_FLAGS: u32 = 0x8217;
pub const LID_RESPONSE_STATUS: u32 = 0x8218;
pub const LID_RECURRING: u32 = 0x8223;
pub const LID_EXCEPTION_REPLACE_TIME: u32 = 0x8228;
pub const LID_TIMEZONE_STRUCT: u32 = 0x8233;
pub const LID_TIMEZONE_DESCRIPTION: u32 = 0x8234;
pub const LID_APPOINTMENT_PROPOSED_START_WHOLE: u32 = 0x8250;
pub const LID_APPOINTMENT_PROPOSED_END_WHOLE: u32 = 0x8251;
pub const LID_APPOINTMENT_COUNTER_PROPOSAL: u32 = 0x8257;
pub const LID_APPOINTMENT_TZDEF_START_DISPLAY: u32 = 0x825e;
pub const LID_APPOINTMENT_TZDEF_END_DISPLAY: u32 = 0x825f;
pub const LID_APPOINTMENT_TZDEF_RECUR: u32 = 0x8260;

// PSETID_Meeting lids.
pub const LID_GLOBAL_OBJECT_ID: u32 = 0x0003;
pub const LID_IS_RECURRING: u32 = 0x0005;
pub const LID_IS_EXCEPTION: u32 = 0x000a;
pub const LID_CLEAN_GLOBAL_OBJECT_ID: u32 = 0x0023;
pub const LID_MEETING_TYPE: u32 = 0x0026;

// PSETID_Common lids.
pub const LID_REMINDER_DELTA: u32 = 0x8501;
pub const LID_REMINDER_TIME: u32 = 0x8502;
pub const LID_REMINDER_SET: u32 = 0x8503;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("unsupported recurrence: {0}")]
    UnsupportedRecurrence(&'static str),
    #[error("malformed component: {0}")]
    InvalidComponent(&'static str),
    #[error("missing {0}")]
    MissingProperty(&'static str),
}

/// Allocates the provisional named-property ids (from 0x8000) a produced
/// message carries until the owning store re-maps them.
#[derive(Debug, Default)]
pub struct NamedPropStager {
    names: Vec<PropertyName>,
}

impl NamedPropStager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, name: PropertyName) -> u16 {
        if let Some(index) = self.names.iter().position(|n| *n == name) {
            0x8000 + index as u16
        } else {
            self.names.push(name);
            0x8000 + self.names.len() as u16 - 1
        }
    }

    pub fn stage_lid(&mut self, guid: Guid, lid: u32) -> u16 {
        self.stage(PropertyName::by_id(guid, lid))
    }

    pub fn into_namemap(self) -> NameMap {
        self.names
            .into_iter()
            .enumerate()
            .map(|(index, name)| (0x8000 + index as u16, name))
            .collect()
    }
}

/// Outlook's busy levels as carried by X-MICROSOFT-CDO-BUSYSTATUS.
pub const OL_FREE: u32 = 0;
pub const OL_TENTATIVE: u32 = 1;
pub const OL_BUSY: u32 = 2;
pub const OL_OOF: u32 = 3;
pub const OL_WORKING_ELSEWHERE: u32 = 4;

pub fn parse_busy_status(text: &str) -> Option<u32> {
    Some(match text.to_ascii_uppercase().as_str() {
        "FREE" => OL_FREE,
        "TENTATIVE" => OL_TENTATIVE,
        "BUSY" => OL_BUSY,
        "OOF" => OL_OOF,
        "WORKINGELSEWHERE" => OL_WORKING_ELSEWHERE,
        _ => return None,
    })
}

pub fn format_busy_status(status: u32) -> &'static str {
    match status {
        OL_FREE => "FREE",
        OL_TENTATIVE => "TENTATIVE",
        OL_OOF => "OOF",
        OL_WORKING_ELSEWHERE => "WORKINGELSEWHERE",
        _ => "BUSY",
    }
}

/// The METHOD/PARTSTAT table deciding the produced message class.
pub fn message_class(method: Option<&str>, partstat: Option<&str>) -> (&'static str, bool) {
    let method = method.map(|m| m.to_ascii_uppercase());
    let partstat = partstat.map(|p| p.to_ascii_uppercase());
    match method.as_deref() {
        None | Some("PUBLISH") => ("IPM.Appointment", false),
        Some("REQUEST") => ("IPM.Schedule.Meeting.Request", false),
        Some("REPLY") => match partstat.as_deref() {
            Some("ACCEPTED") => ("IPM.Schedule.Meeting.Resp.Pos", false),
            Some("TENTATIVE") => ("IPM.Schedule.Meeting.Resp.Tent", false),
            Some("DECLINED") => ("IPM.Schedule.Meeting.Resp.Neg", false),
            _ => ("IPM.Schedule.Meeting.Resp.Pos", false),
        },
        Some("COUNTER") => ("IPM.Schedule.Meeting.Resp.Tent", true),
        Some("CANCEL") => ("IPM.Schedule.Meeting.Canceled", false),
        _ => ("IPM.Appointment", false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stager_is_idempotent() {
        let mut stager = NamedPropStager::new();
        let a = stager.stage_lid(PSETID_APPOINTMENT, LID_APPOINTMENT_RECUR);
        let b = stager.stage_lid(PSETID_MEETING, LID_GLOBAL_OBJECT_ID);
        let c = stager.stage_lid(PSETID_APPOINTMENT, LID_APPOINTMENT_RECUR);
        assert_eq!(a, 0x8000);
        assert_eq!(b, 0x8001);
        assert_eq!(a, c);
        let map = stager.into_namemap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&0x8001], PropertyName::by_id(PSETID_MEETING, LID_GLOBAL_OBJECT_ID));
    }

    #[test]
    fn method_table() {
        assert_eq!(message_class(None, None).0, "IPM.Appointment");
        assert_eq!(
            message_class(Some("REQUEST"), Some("NEEDS-ACTION")).0,
            "IPM.Schedule.Meeting.Request"
        );
        assert_eq!(
            message_class(Some("reply"), Some("declined")).0,
            "IPM.Schedule.Meeting.Resp.Neg"
        );
        let (class, counter) = message_class(Some("COUNTER"), Some("TENTATIVE"));
        assert_eq!(class, "IPM.Schedule.Meeting.Resp.Tent");
        assert!(counter);
        assert_eq!(message_class(Some("CANCEL"), None).0, "IPM.Schedule.Meeting.Canceled");
    }

    #[test]
    fn busy_status_names() {
        assert_eq!(parse_busy_status("WorkingElsewhere"), Some(OL_WORKING_ELSEWHERE));
        assert_eq!(parse_busy_status("nope"), None);
        assert_eq!(format_busy_status(OL_FREE), "FREE");
    }
}

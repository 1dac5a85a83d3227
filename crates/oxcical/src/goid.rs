/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The GlobalObjectId that binds every message of a meeting series to its
//! UID. Outlook-born UIDs are the hex rendering of the whole structure;
//! foreign UIDs ride in the data payload behind a `vCal-Uid` marker.

use crate::ext::{Reader, Writer};
use utils::hex::{decode_hex_bytes, encode_hex_bytes};

/// The fixed Outlook array id every GlobalObjectId starts with.
pub const ENCODED_GLOBAL_ID: [u8; 16] = [
    0x04, 0x00, 0x00, 0x00, 0x82, 0x00, 0xe0, 0x00, 0x74, 0xc5, 0xb7, 0x10, 0x1a, 0x82, 0xe0, 0x08,
];

/// `"vCal-Uid\x01\x00\x00\x00"`, the marker prefix for third-party UIDs.
pub const THIRD_PARTY_MARKER: [u8; 12] = [
    0x76, 0x43, 0x61, 0x6c, 0x2d, 0x55, 0x69, 0x64, 0x01, 0x00, 0x00, 0x00,
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GlobalObjectId {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub creation_time: u64,
    pub data: Vec<u8>,
}

impl GlobalObjectId {
    /// Wrap a foreign UID behind the third-party marker.
    pub fn from_foreign_uid(uid: &str) -> Self {
        let mut data = Vec::with_capacity(THIRD_PARTY_MARKER.len() + uid.len() + 1);
        data.extend_from_slice(&THIRD_PARTY_MARKER);
        data.extend_from_slice(uid.as_bytes());
        data.push(0);
        GlobalObjectId {
            data,
            ..GlobalObjectId::default()
        }
    }

    /// The wrapped UID, when this id carries a third-party one.
    pub fn foreign_uid(&self) -> Option<&str> {
        let payload = self.data.strip_prefix(&THIRD_PARTY_MARKER[..])?;
        let payload = payload.strip_suffix(&[0]).unwrap_or(payload);
        std::str::from_utf8(payload).ok()
    }

    /// Zero the instance date, producing the series-stable clean id.
    pub fn to_clean(&self) -> Self {
        GlobalObjectId {
            year: 0,
            month: 0,
            day: 0,
            creation_time: self.creation_time,
            data: self.data.clone(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.put_bytes(&ENCODED_GLOBAL_ID);
        writer.put_u8((self.year >> 8) as u8);
        writer.put_u8(self.year as u8);
        writer.put_u8(self.month);
        writer.put_u8(self.day);
        writer.put_u64(self.creation_time);
        writer.put_bytes(&[0u8; 8]);
        writer.put_u32(self.data.len() as u32);
        writer.put_bytes(&self.data);
        writer.finish()
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut reader = Reader::new(bytes);
        if reader.get_bytes(16)? != ENCODED_GLOBAL_ID {
            return None;
        }
        let year_hi = reader.get_u8()?;
        let year_lo = reader.get_u8()?;
        let month = reader.get_u8()?;
        let day = reader.get_u8()?;
        let creation_time = reader.get_u64()?;
        reader.get_bytes(8)?;
        let size = reader.get_u32()? as usize;
        let data = reader.get_bytes(size)?.to_vec();
        Some(GlobalObjectId {
            year: ((year_hi as u16) << 8) | year_lo as u16,
            month,
            day,
            creation_time,
            data,
        })
    }

    /// Decode a calendar UID: Outlook UIDs are the hex image of a full
    /// GlobalObjectId, anything else wraps as third-party data.
    pub fn from_uid(uid: &str) -> Self {
        if uid.len() >= 32 && uid[..32].eq_ignore_ascii_case(&encode_hex_bytes(&ENCODED_GLOBAL_ID))
        {
            if let Some(goid) = decode_hex_bytes(uid).and_then(|bytes| Self::deserialize(&bytes)) {
                return goid;
            }
        }
        Self::from_foreign_uid(uid)
    }

    /// Render the UID this id exports as.
    pub fn to_uid(&self) -> String {
        match self.foreign_uid() {
            Some(uid) => uid.to_string(),
            None => encode_hex_bytes(&self.serialize()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_uid_roundtrip() {
        let goid = GlobalObjectId::from_uid("1e9133b9-4a4e-4bd7@example.org");
        assert!(goid.data.starts_with(&THIRD_PARTY_MARKER));
        assert_eq!(goid.foreign_uid(), Some("1e9133b9-4a4e-4bd7@example.org"));
        assert_eq!(goid.to_uid(), "1e9133b9-4a4e-4bd7@example.org");
        let bytes = goid.serialize();
        assert_eq!(GlobalObjectId::deserialize(&bytes), Some(goid));
    }

    #[test]
    fn outlook_uid_roundtrip() {
        let original = GlobalObjectId {
            year: 2024,
            month: 4,
            day: 15,
            creation_time: 0x01da_8f00_0000_0000,
            data: vec![1, 2, 3, 4],
        };
        let uid = encode_hex_bytes(&original.serialize());
        let parsed = GlobalObjectId::from_uid(&uid);
        assert_eq!(parsed, original);
        assert_eq!(parsed.to_uid(), uid);
    }

    #[test]
    fn clean_id_zeroes_instance_date() {
        let goid = GlobalObjectId {
            year: 2024,
            month: 4,
            day: 15,
            creation_time: 7,
            data: vec![9],
        };
        let clean = goid.to_clean();
        assert_eq!((clean.year, clean.month, clean.day), (0, 0, 0));
        assert_eq!(clean.data, vec![9]);
    }
}

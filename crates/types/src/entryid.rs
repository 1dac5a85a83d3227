/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::{
    guid::Guid,
    xid::{gc_array, gc_value},
};
use utils::hex::{decode_hex_int, encode_hex_int};

// Provider UIDs (MS-OXCDATA well-known values).
pub const PROVIDER_UID_ADDRESS_BOOK: [u8; 16] = [
    0xdc, 0xa7, 0x40, 0xc8, 0xc0, 0x42, 0x10, 0x1a, 0xb4, 0xb9, 0x08, 0x00, 0x2b, 0x2f, 0xe1, 0x82,
];
pub const PROVIDER_UID_ONE_OFF: [u8; 16] = [
    0x81, 0x2b, 0x1f, 0xa4, 0xbe, 0xa3, 0x10, 0x19, 0x9d, 0x6e, 0x00, 0xdd, 0x01, 0x0f, 0x54, 0x02,
];
pub const PROVIDER_UID_STORE_WRAP: [u8; 16] = [
    0x38, 0xa1, 0xbb, 0x10, 0x05, 0xe5, 0x10, 0x1a, 0xa1, 0xbb, 0x08, 0x00, 0x2b, 0x2a, 0x56, 0xc2,
];
pub const PROVIDER_UID_PUBLIC: [u8; 16] = [
    0x1c, 0x83, 0x02, 0x10, 0xaa, 0x66, 0x11, 0xcd, 0x9b, 0xc8, 0x00, 0xaa, 0x00, 0x2f, 0xc4, 0x5a,
];

// PR_MDB_PROVIDER class uids.
pub const STORE_UID_PRIVATE_OWNER: [u8; 16] = [
    0x54, 0x94, 0xa1, 0xc0, 0x29, 0x7f, 0x10, 0x1b, 0xa5, 0x87, 0x08, 0x00, 0x2b, 0x2a, 0x25, 0x34,
];
pub const STORE_UID_PRIVATE_DELEGATE: [u8; 16] = [
    0x9e, 0xb4, 0x77, 0x00, 0x74, 0xe4, 0x11, 0xce, 0x8c, 0x5e, 0x00, 0xaa, 0x00, 0x42, 0x54, 0xe2,
];
pub const STORE_UID_PUBLIC: [u8; 16] = [
    0x78, 0xb2, 0xfa, 0x70, 0xaf, 0xf7, 0x11, 0xcd, 0x9b, 0xc8, 0x00, 0xaa, 0x00, 0x2f, 0xc4, 0x5a,
];

const DN_PREFIX_TEMPLATE: &str = "/o={}/ou=Exchange Administrative Group (FYDIBOHF23SPDLT)";

/// Database GUID templates: the mailbox-owning account id is folded into
/// `time_low`, which keeps the reverse mapping a field extraction.
const USER_GUID_TEMPLATE: Guid = Guid {
    time_low: 0,
    time_mid: 0x0afb,
    time_hi_and_version: 0x7df6,
    clock_seq: [0x91, 0x92],
    node: [0x49, 0x88, 0x6a, 0xa7, 0x38, 0xce],
};
const DOMAIN_GUID_TEMPLATE: Guid = Guid {
    time_low: 0,
    time_mid: 0x0afb,
    time_hi_and_version: 0x7df6,
    clock_seq: [0x91, 0x92],
    node: [0x49, 0x88, 0x6a, 0xa7, 0x38, 0xcf],
};

pub fn make_user_guid(user_id: u32) -> Guid {
    Guid {
        time_low: user_id,
        ..USER_GUID_TEMPLATE
    }
}

pub fn make_domain_guid(domain_id: u32) -> Guid {
    Guid {
        time_low: domain_id,
        ..DOMAIN_GUID_TEMPLATE
    }
}

pub fn user_id_from_guid(guid: Guid) -> Option<u32> {
    let template = Guid {
        time_low: 0,
        ..guid
    };
    (template == USER_GUID_TEMPLATE).then_some(guid.time_low)
}

pub fn domain_id_from_guid(guid: Guid) -> Option<u32> {
    let template = Guid {
        time_low: 0,
        ..guid
    };
    (template == DOMAIN_GUID_TEMPLATE).then_some(guid.time_low)
}

/// Compose a 64-bit eid: replica id in the low 16 bits, global counter in
/// the upper 48.
pub fn make_eid(replid: u16, gc: [u8; 6]) -> u64 {
    (gc_value(gc) << 16) | replid as u64
}

pub fn make_eid_ex(replid: u16, value: u64) -> u64 {
    make_eid(replid, gc_array(value))
}

pub fn eid_gc_value(eid: u64) -> u64 {
    eid >> 16
}

pub fn eid_replid(eid: u64) -> u16 {
    (eid & 0xffff) as u16
}

/// Build the fixed Exchange administrative-group DN prefix.
pub fn essdn_prefix(org_name: &str) -> String {
    DN_PREFIX_TEMPLATE.replacen("{}", org_name, 1)
}

/// `/o=<org>/ou=…/cn=Recipients/cn=<domhex><userhex>-<local>` upper-cased.
pub fn username_to_essdn(
    org_name: &str,
    username: &str,
    user_id: u32,
    domain_id: u32,
) -> Option<String> {
    let local = username.split('@').next()?;
    Some(
        format!(
            "{}/cn=Recipients/cn={}{}-{}",
            essdn_prefix(org_name),
            encode_hex_int(domain_id),
            encode_hex_int(user_id),
            local,
        )
        .to_uppercase(),
    )
}

/// Pull the `(domain_id, user_id, local_part)` triple out of a recipient
/// essdn, validating the fixed prefix case-insensitively.
pub fn essdn_to_ids<'a>(org_name: &str, essdn: &'a str) -> Option<(u32, u32, &'a str)> {
    let prefix = format!("{}/cn=Recipients/cn=", essdn_prefix(org_name));
    if essdn.len() < prefix.len() + 17
        || !essdn[..prefix.len()].eq_ignore_ascii_case(&prefix)
    {
        return None;
    }
    let rest = &essdn[prefix.len()..];
    if rest.as_bytes().get(16) != Some(&b'-') {
        return None;
    }
    let domain_id = decode_hex_int(&rest[..8])?;
    let user_id = decode_hex_int(&rest[8..16])?;
    Some((domain_id, user_id, &rest[17..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AbEntryidType {
    LocalUser = 0x0,
    DistList = 0x1,
}

/// The MS-OXCDATA AddressBookEntryID: flags, provider uid, version 1,
/// object type and an ASCII X.500 DN.
pub fn serialize_ab_entryid(kind: AbEntryidType, x500dn: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(28 + x500dn.len() + 1);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&PROVIDER_UID_ADDRESS_BOOK);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(kind as u32).to_le_bytes());
    out.extend_from_slice(x500dn.as_bytes());
    out.push(0);
    out
}

pub fn parse_ab_entryid(bytes: &[u8]) -> Option<(AbEntryidType, String)> {
    if bytes.len() < 29 || bytes[4..20] != PROVIDER_UID_ADDRESS_BOOK {
        return None;
    }
    if u32::from_le_bytes(bytes[20..24].try_into().ok()?) != 1 {
        return None;
    }
    let kind = match u32::from_le_bytes(bytes[24..28].try_into().ok()?) {
        0x0 => AbEntryidType::LocalUser,
        0x1 => AbEntryidType::DistList,
        _ => return None,
    };
    let dn = &bytes[28..];
    let end = dn.iter().position(|&b| b == 0)?;
    Some((kind, String::from_utf8(dn[..end].to_vec()).ok()?))
}

const ONE_OFF_NO_RICH: u16 = 0x0001;
const ONE_OFF_UNICODE: u16 = 0x8000;

fn push_utf16z(out: &mut Vec<u8>, text: &str) {
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
}

fn read_utf16z(bytes: &[u8], offset: &mut usize) -> Option<String> {
    let mut units = Vec::new();
    loop {
        let chunk = bytes.get(*offset..*offset + 2)?;
        *offset += 2;
        let unit = u16::from_le_bytes([chunk[0], chunk[1]]);
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    String::from_utf16(&units).ok()
}

/// One-off entryid carrying a literal `(display, addrtype, address)`.
pub fn serialize_oneoff_entryid(display_name: &str, addrtype: &str, address: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(24 + (display_name.len() + addrtype.len() + address.len()) * 2);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&PROVIDER_UID_ONE_OFF);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(ONE_OFF_NO_RICH | ONE_OFF_UNICODE).to_le_bytes());
    push_utf16z(&mut out, display_name);
    push_utf16z(&mut out, addrtype);
    push_utf16z(&mut out, address);
    out
}

pub fn parse_oneoff_entryid(bytes: &[u8]) -> Option<(String, String, String)> {
    if bytes.len() < 24 || bytes[4..20] != PROVIDER_UID_ONE_OFF {
        return None;
    }
    let ctrl = u16::from_le_bytes(bytes[22..24].try_into().ok()?);
    if ctrl & ONE_OFF_UNICODE == 0 {
        return None;
    }
    let mut offset = 24;
    let display = read_utf16z(bytes, &mut offset)?;
    let addrtype = read_utf16z(bytes, &mut offset)?;
    let address = read_utf16z(bytes, &mut offset)?;
    Some((display, addrtype, address))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EidType {
    PrivateFolder = 0x0001,
    PublicFolder = 0x0003,
    PrivateMessage = 0x0007,
    PublicMessage = 0x0009,
}

impl EidType {
    fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0x0001 => EidType::PrivateFolder,
            0x0003 => EidType::PublicFolder,
            0x0007 => EidType::PrivateMessage,
            0x0009 => EidType::PublicMessage,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderEntryid {
    pub folder_type: EidType,
    pub database_guid: Guid,
    pub global_counter: [u8; 6],
}

impl FolderEntryid {
    pub fn new(b_private: bool, database_guid: Guid, folder_id: u64) -> Self {
        FolderEntryid {
            folder_type: if b_private {
                EidType::PrivateFolder
            } else {
                EidType::PublicFolder
            },
            database_guid,
            global_counter: gc_array(eid_gc_value(folder_id)),
        }
    }

    pub fn folder_id(&self) -> u64 {
        make_eid(1, self.global_counter)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(46);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&PROVIDER_UID_PUBLIC);
        out.extend_from_slice(&(self.folder_type as u16).to_le_bytes());
        out.extend_from_slice(&self.database_guid.to_bytes());
        out.extend_from_slice(&self.global_counter);
        out.extend_from_slice(&[0, 0]);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 46 {
            return None;
        }
        Some(FolderEntryid {
            folder_type: EidType::from_u16(u16::from_le_bytes(bytes[20..22].try_into().ok()?))?,
            database_guid: Guid::from_bytes(&bytes[22..38])?,
            global_counter: bytes[38..44].try_into().ok()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageEntryid {
    pub message_type: EidType,
    pub folder_database_guid: Guid,
    pub folder_global_counter: [u8; 6],
    pub message_database_guid: Guid,
    pub message_global_counter: [u8; 6],
}

impl MessageEntryid {
    pub fn new(b_private: bool, database_guid: Guid, folder_id: u64, message_id: u64) -> Self {
        MessageEntryid {
            message_type: if b_private {
                EidType::PrivateMessage
            } else {
                EidType::PublicMessage
            },
            folder_database_guid: database_guid,
            folder_global_counter: gc_array(eid_gc_value(folder_id)),
            message_database_guid: database_guid,
            message_global_counter: gc_array(eid_gc_value(message_id)),
        }
    }

    pub fn folder_id(&self) -> u64 {
        make_eid(1, self.folder_global_counter)
    }

    pub fn message_id(&self) -> u64 {
        make_eid(1, self.message_global_counter)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(70);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&PROVIDER_UID_PUBLIC);
        out.extend_from_slice(&(self.message_type as u16).to_le_bytes());
        out.extend_from_slice(&self.folder_database_guid.to_bytes());
        out.extend_from_slice(&self.folder_global_counter);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.message_database_guid.to_bytes());
        out.extend_from_slice(&self.message_global_counter);
        out.extend_from_slice(&[0, 0]);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 70 {
            return None;
        }
        let entryid = MessageEntryid {
            message_type: EidType::from_u16(u16::from_le_bytes(bytes[20..22].try_into().ok()?))?,
            folder_database_guid: Guid::from_bytes(&bytes[22..38])?,
            folder_global_counter: bytes[38..44].try_into().ok()?,
            message_database_guid: Guid::from_bytes(&bytes[46..62])?,
            message_global_counter: bytes[62..68].try_into().ok()?,
        };
        (entryid.folder_database_guid == entryid.message_database_guid).then_some(entryid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn essdn_roundtrip() {
        let essdn = username_to_essdn("first", "alice@example.org", 42, 17).unwrap();
        assert_eq!(
            essdn,
            "/O=FIRST/OU=EXCHANGE ADMINISTRATIVE GROUP \
             (FYDIBOHF23SPDLT)/CN=RECIPIENTS/CN=000000110000002A-ALICE"
        );
        let (domain_id, user_id, local) = essdn_to_ids("first", &essdn).unwrap();
        assert_eq!((domain_id, user_id, local), (17, 42, "ALICE"));
    }

    #[test]
    fn ab_entryid_roundtrip() {
        let bytes = serialize_ab_entryid(AbEntryidType::LocalUser, "/o=x/cn=Recipients/cn=Y");
        let (kind, dn) = parse_ab_entryid(&bytes).unwrap();
        assert_eq!(kind, AbEntryidType::LocalUser);
        assert_eq!(dn, "/o=x/cn=Recipients/cn=Y");
    }

    #[test]
    fn oneoff_roundtrip() {
        let bytes = serialize_oneoff_entryid("Alice", "SMTP", "alice@example.org");
        let (display, addrtype, address) = parse_oneoff_entryid(&bytes).unwrap();
        assert_eq!(display, "Alice");
        assert_eq!(addrtype, "SMTP");
        assert_eq!(address, "alice@example.org");
    }

    #[test]
    fn folder_entryid_roundtrip() {
        let guid = make_user_guid(5);
        let fid = make_eid_ex(1, 0x0d);
        let entryid = FolderEntryid::new(true, guid, fid);
        let parsed = FolderEntryid::deserialize(&entryid.serialize()).unwrap();
        assert_eq!(parsed, entryid);
        assert_eq!(parsed.folder_id(), fid);
        assert_eq!(user_id_from_guid(parsed.database_guid), Some(5));
    }

    #[test]
    fn message_entryid_roundtrip() {
        let guid = make_domain_guid(17);
        let entryid = MessageEntryid::new(false, guid, make_eid_ex(1, 9), make_eid_ex(1, 0x1234));
        let parsed = MessageEntryid::deserialize(&entryid.serialize()).unwrap();
        assert_eq!(parsed, entryid);
        assert_eq!(domain_id_from_guid(parsed.message_database_guid), Some(17));
    }

    #[test]
    fn eid_fold() {
        let eid = make_eid_ex(1, 0x2a);
        assert_eq!(eid_replid(eid), 1);
        assert_eq!(eid_gc_value(eid), 0x2a);
    }
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use rand::Rng;
use std::fmt::{self, Display};

/// A GUID in Microsoft field order. The wire form (`to_bytes`) is the
/// little-endian FLATUID layout used inside entryids, XIDs and the
/// appointment property set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid {
    pub time_low: u32,
    pub time_mid: u16,
    pub time_hi_and_version: u16,
    pub clock_seq: [u8; 2],
    pub node: [u8; 6],
}

impl Guid {
    pub const SIZE: usize = 16;

    pub fn random() -> Self {
        let mut rng = rand::rng();
        let mut guid = Guid {
            time_low: rng.random(),
            time_mid: rng.random(),
            time_hi_and_version: rng.random(),
            clock_seq: rng.random(),
            node: [0; 6],
        };
        rng.fill(&mut guid.node[..]);
        guid.clock_seq[0] = (guid.clock_seq[0] & 0x3f) | 0x80;
        guid.time_hi_and_version = (guid.time_hi_and_version & 0x0fff) | 0x4000;
        guid
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.time_low.to_le_bytes());
        out[4..6].copy_from_slice(&self.time_mid.to_le_bytes());
        out[6..8].copy_from_slice(&self.time_hi_and_version.to_le_bytes());
        out[8..10].copy_from_slice(&self.clock_seq);
        out[10..16].copy_from_slice(&self.node);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 16 {
            return None;
        }
        Some(Guid {
            time_low: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            time_mid: u16::from_le_bytes(bytes[4..6].try_into().ok()?),
            time_hi_and_version: u16::from_le_bytes(bytes[6..8].try_into().ok()?),
            clock_seq: bytes[8..10].try_into().ok()?,
            node: bytes[10..16].try_into().ok()?,
        })
    }

    pub fn from_str(text: &str) -> Option<Self> {
        let text = text.trim_start_matches('{').trim_end_matches('}');
        let mut parts = text.split('-');
        let time_low = u32::from_str_radix(parts.next()?, 16).ok()?;
        let time_mid = u16::from_str_radix(parts.next()?, 16).ok()?;
        let time_hi = u16::from_str_radix(parts.next()?, 16).ok()?;
        let clock = parts.next()?;
        let node = parts.next()?;
        if parts.next().is_some() || clock.len() != 4 || node.len() != 12 {
            return None;
        }
        let clock_bytes = utils::hex::decode_hex_bytes(clock)?;
        let node_bytes = utils::hex::decode_hex_bytes(node)?;
        Some(Guid {
            time_low,
            time_mid,
            time_hi_and_version: time_hi,
            clock_seq: [clock_bytes[0], clock_bytes[1]],
            node: node_bytes.try_into().ok()?,
        })
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.time_low,
            self.time_mid,
            self.time_hi_and_version,
            self.clock_seq[0],
            self.clock_seq[1],
            self.node[0],
            self.node[1],
            self.node[2],
            self.node[3],
            self.node[4],
            self.node[5],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip() {
        let guid = Guid::random();
        assert_eq!(Guid::from_bytes(&guid.to_bytes()), Some(guid));
    }

    #[test]
    fn text_roundtrip() {
        let guid = Guid::from_str("00062002-0000-0000-c000-000000000046").unwrap();
        assert_eq!(guid.time_low, 0x00062002);
        assert_eq!(guid.node, [0, 0, 0, 0, 0, 0x46]);
        assert_eq!(guid.to_string(), "00062002-0000-0000-c000-000000000046");
    }

    #[test]
    fn random_guids_differ() {
        assert_ne!(Guid::random(), Guid::random());
    }
}

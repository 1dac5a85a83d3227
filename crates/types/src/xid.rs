/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::guid::Guid;

/// Replica id plus 6-byte global counter: the unit of identity in change
/// keys and predecessor change lists. Always serialized as 22 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xid {
    pub guid: Guid,
    pub local_id: [u8; 6],
}

impl Xid {
    pub const SIZE: usize = 22;

    pub fn new(guid: Guid, change_num: u64) -> Self {
        Xid {
            guid,
            local_id: gc_array(change_num),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.guid.to_bytes());
        out.extend_from_slice(&self.local_id);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Xid {
            guid: Guid::from_bytes(&bytes[..16])?,
            local_id: bytes[16..22].try_into().ok()?,
        })
    }

    pub fn change_number(&self) -> u64 {
        gc_value(self.local_id)
    }
}

/// Fold the low 48 bits of a change number into a big-endian counter array.
pub fn gc_array(value: u64) -> [u8; 6] {
    let bytes = value.to_be_bytes();
    bytes[2..8].try_into().unwrap_or([0; 6])
}

pub fn gc_value(gc: [u8; 6]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[2..8].copy_from_slice(&gc);
    u64::from_be_bytes(bytes)
}

/// A predecessor change list: an unordered set of XIDs, one per replica,
/// serialized as length-prefixed XID records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Pcl {
    xids: Vec<Xid>,
}

impl Pcl {
    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut xids = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let size = *bytes.get(offset)? as usize;
            offset += 1;
            if size != Xid::SIZE || offset + size > bytes.len() {
                return None;
            }
            xids.push(Xid::deserialize(&bytes[offset..offset + size])?);
            offset += size;
        }
        Some(Pcl { xids })
    }

    /// Replace the entry sharing the replica GUID (keeping whichever
    /// counter is higher), or add a new entry.
    pub fn append(&mut self, xid: Xid) {
        if let Some(existing) = self.xids.iter_mut().find(|x| x.guid == xid.guid) {
            if gc_value(existing.local_id) < gc_value(xid.local_id) {
                existing.local_id = xid.local_id;
            }
        } else {
            self.xids.push(xid);
        }
    }

    pub fn contains(&self, xid: &Xid) -> bool {
        self.xids
            .iter()
            .any(|x| x.guid == xid.guid && gc_value(x.local_id) >= gc_value(xid.local_id))
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.xids.len() * (Xid::SIZE + 1));
        for xid in &self.xids {
            out.push(Xid::SIZE as u8);
            out.extend_from_slice(&xid.serialize());
        }
        out
    }

    pub fn xids(&self) -> &[Xid] {
        &self.xids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_codec() {
        assert_eq!(gc_array(0x0000_0102_0304_0506), [1, 2, 3, 4, 5, 6]);
        assert_eq!(gc_value([1, 2, 3, 4, 5, 6]), 0x0000_0102_0304_0506);
    }

    #[test]
    fn xid_roundtrip() {
        let xid = Xid::new(Guid::random(), 77);
        assert_eq!(Xid::deserialize(&xid.serialize()), Some(xid));
        assert_eq!(xid.change_number(), 77);
    }

    #[test]
    fn pcl_append_replaces_replica_entry() {
        let replica = Guid::random();
        let other = Guid::random();
        let mut pcl = Pcl::default();
        pcl.append(Xid::new(replica, 5));
        pcl.append(Xid::new(other, 9));
        pcl.append(Xid::new(replica, 12));
        assert_eq!(pcl.xids().len(), 2);
        let entry = pcl.xids().iter().find(|x| x.guid == replica).unwrap();
        assert_eq!(entry.change_number(), 12);

        let bytes = pcl.serialize();
        assert_eq!(Pcl::deserialize(&bytes), Some(pcl));
    }

    #[test]
    fn pcl_keeps_higher_counter() {
        let replica = Guid::random();
        let mut pcl = Pcl::default();
        pcl.append(Xid::new(replica, 30));
        pcl.append(Xid::new(replica, 20));
        assert_eq!(pcl.xids()[0].change_number(), 30);
    }
}

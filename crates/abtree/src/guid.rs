/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::{
    base::BaseContent,
    node::NodeId,
};
use types::Guid;

/// The slash-joined `{letter}{id}` sequence from leaf to root that seeds
/// the GUID digest.
pub fn node_path(content: &BaseContent, mut id: NodeId) -> Option<String> {
    let mut segments = Vec::new();
    loop {
        let node = content.node(id);
        let letter = node.kind.path_letter()?;
        segments.push(format!("{letter}{}", node.id));
        match node.parent {
            Some(parent) => id = parent,
            None => break,
        }
    }
    Some(segments.join("/"))
}

/// Fold the even-indexed digest bytes into a little-endian 64-bit value.
fn md5_path_digest(path: &str) -> u64 {
    let digest = md5::compute(path.as_bytes());
    let mut value = 0u64;
    for (index, byte) in digest.0.iter().step_by(2).enumerate() {
        value |= (*byte as u64) << (8 * index);
    }
    value
}

fn fill_digest(guid: &mut Guid, digest: u64) {
    let bytes = digest.to_le_bytes();
    guid.node.copy_from_slice(&bytes[..6]);
    guid.clock_seq.copy_from_slice(&bytes[6..8]);
}

/// The deterministic per-node GUID: node type and root domain in
/// `time_low`, the directory id split over `time_hi`/`time_mid`, and the
/// path digest in the trailing eight bytes.
pub fn node_guid(content: &BaseContent, id: NodeId) -> Option<Guid> {
    let node = content.node(id);
    let root_domain = content.root_domain_id(id);
    let mut guid = Guid {
        time_low: ((node.kind.as_byte() as u32) << 24) | root_domain,
        time_mid: (node.id & 0xffff) as u16,
        time_hi_and_version: (node.id >> 16) as u16,
        clock_seq: [0; 2],
        node: [0; 6],
    };
    fill_digest(&mut guid, md5_path_digest(&node_path(content, id)?));
    Some(guid)
}

/// The GUID of a remote stub: type byte zero, the owning domain id in
/// `time_low`, the source minid value in the version fields, and the
/// digest of the path resolved inside the owning base.
pub fn remote_guid(domain_id: u32, minid_value: u32, source_path: &str) -> Guid {
    let mut guid = Guid {
        time_low: domain_id,
        time_mid: (minid_value & 0xffff) as u16,
        time_hi_and_version: (minid_value >> 16) as u16,
        clock_seq: [0; 2],
        node: [0; 6],
    };
    fill_digest(&mut guid, md5_path_digest(source_path));
    guid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::AbBase;
    use directory::{DirectoryUser, DomainInfo, memory::{Container, InMemoryDirectory}};
    use types::Minid;

    fn content() -> crate::base::BaseContent {
        let dir = InMemoryDirectory::new();
        dir.add_domain(DomainInfo {
            id: 17,
            name: "example.org".into(),
            title: "Example".into(),
            address: String::new(),
            homedir: String::new(),
        });
        dir.add_user(17, Container::Domain, DirectoryUser::new(42, "alice@example.org"));
        AbBase::new(-17).build(&dir).unwrap()
    }

    #[test]
    fn path_runs_leaf_to_root() {
        let content = content();
        let alice = content.minid_to_node(Minid::address(42)).unwrap();
        assert_eq!(node_path(&content, alice).unwrap(), "p42/d17");
    }

    #[test]
    fn guid_layout() {
        let content = content();
        let alice = content.minid_to_node(Minid::address(42)).unwrap();
        let guid = node_guid(&content, alice).unwrap();
        assert_eq!(guid.time_low, (0x01 << 24) | 17);
        assert_eq!(guid.time_mid, 42);
        assert_eq!(guid.time_hi_and_version, 0);
        // digest must be stable across rebuilds of identical trees
        assert_eq!(node_guid(&content, alice), Some(guid));
    }
}

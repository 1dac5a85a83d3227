/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::node::{AbNode, NodeId, NodeKind, NodePayload, sort_by_display_name};
use ahash::AHashMap;
use directory::{Directory, DirectoryUser, DomainInfo};
use parking_lot::{Mutex, RwLock};
use std::sync::{
    Arc,
    atomic::{AtomicI32, AtomicI64, AtomicU8, Ordering},
};
use types::{Guid, Minid, codepage::casefold_cmp};

pub const BASE_STATUS_CONSTRUCTING: u8 = 0;
pub const BASE_STATUS_LIVING: u8 = 1;
pub const BASE_STATUS_DESTRUCTING: u8 = 2;

/// Sort codepage for display names; the GAL order is defined against
/// Western European case folding.
pub const SORT_CODEPAGE: u32 = 1252;

/// A lazily materialized stand-in for a node owned by another base,
/// created during cross-base DN resolution. It records where the real
/// node lives and carries a copy of the owning domain's record.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStub {
    pub minid: Minid,
    /// The domain whose base (`-domain_id`) owns the real node.
    pub domain_id: u32,
    pub kind: NodeKind,
    pub domain: DomainInfo,
}

#[derive(Debug, Default)]
pub struct DomainTree {
    pub domain_id: u32,
    pub root: NodeId,
}

/// The immutable product of one build pass. Rebuilds swap the whole
/// snapshot; readers keep iterating over the arc they already hold.
#[derive(Default)]
pub struct BaseContent {
    pub arena: Vec<AbNode>,
    pub domains: Vec<DomainTree>,
    pub gal: Vec<NodeId>,
    minids: AHashMap<u32, NodeId>,
}

impl BaseContent {
    pub fn node(&self, id: NodeId) -> &AbNode {
        &self.arena[id.0 as usize]
    }

    pub fn minid_to_node(&self, minid: Minid) -> Option<NodeId> {
        self.minids.get(&minid.0).copied()
    }

    pub fn root_domain_id(&self, mut id: NodeId) -> u32 {
        while let Some(parent) = self.node(id).parent {
            id = parent;
        }
        self.node(id).id
    }

    fn register(&mut self, node: AbNode) -> NodeId {
        let id = NodeId(self.arena.len() as u32);
        let mut node = node;
        if self.minids.contains_key(&node.minid.0) {
            node.alias = true;
        } else {
            self.minids.insert(node.minid.0, id);
        }
        self.arena.push(node);
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.arena[child.0 as usize].parent = Some(parent);
        self.arena[parent.0 as usize].children.push(child);
    }
}

/// A living snapshot of one address book scope: an organization
/// (`base_id > 0`) or a single domain (`base_id == -domain_id`).
pub struct AbBase {
    pub base_id: i32,
    pub guid: Guid,
    status: AtomicU8,
    reference: AtomicI32,
    load_time: AtomicI64,
    content: RwLock<Arc<BaseContent>>,
    remote: Mutex<Vec<RemoteStub>>,
}

impl AbBase {
    pub fn new(base_id: i32) -> Self {
        let mut guid = Guid::random();
        // Reverse mapping from GUID to base id is a field extraction.
        guid.node[2..6].copy_from_slice(&base_id.to_le_bytes());
        AbBase {
            base_id,
            guid,
            status: AtomicU8::new(BASE_STATUS_CONSTRUCTING),
            reference: AtomicI32::new(0),
            load_time: AtomicI64::new(0),
            content: RwLock::new(Arc::new(BaseContent::default())),
            remote: Mutex::new(Vec::new()),
        }
    }

    pub fn guid_to_base_id(guid: Guid) -> i32 {
        i32::from_le_bytes([guid.node[2], guid.node[3], guid.node[4], guid.node[5]])
    }

    pub fn status(&self) -> u8 {
        self.status.load(Ordering::Acquire)
    }

    pub fn set_status(&self, status: u8) {
        self.status.store(status, Ordering::Release);
    }

    pub fn reference(&self) -> i32 {
        self.reference.load(Ordering::Acquire)
    }

    pub fn acquire(&self) {
        self.reference.fetch_add(1, Ordering::AcqRel);
    }

    pub fn release(&self) {
        self.reference.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn load_time(&self) -> i64 {
        self.load_time.load(Ordering::Acquire)
    }

    pub fn set_load_time(&self, time: i64) {
        self.load_time.store(time, Ordering::Release);
    }

    pub fn snapshot(&self) -> Arc<BaseContent> {
        self.content.read().clone()
    }

    pub fn install(&self, content: BaseContent) {
        *self.content.write() = Arc::new(content);
    }

    pub fn clear(&self) {
        *self.content.write() = Arc::new(BaseContent::default());
        self.remote.lock().clear();
    }

    pub fn find_remote(&self, minid: Minid) -> Option<RemoteStub> {
        self.remote.lock().iter().find(|stub| stub.minid == minid).cloned()
    }

    pub fn add_remote(&self, stub: RemoteStub) {
        self.remote.lock().push(stub);
    }

    pub fn has_domain(&self, domain_id: u32) -> bool {
        self.snapshot().domains.iter().any(|d| d.domain_id == domain_id)
    }

    /// Build (or rebuild) the content of this base from the directory.
    /// Any provider error aborts the build; the partially assembled
    /// snapshot is dropped on the floor.
    pub fn build(&self, directory: &dyn Directory) -> Result<BaseContent, directory::DirectoryError> {
        let mut content = BaseContent::default();
        let domain_ids = if self.base_id > 0 {
            directory.get_org_domains(self.base_id as u32)?
        } else {
            vec![(-self.base_id) as u32]
        };
        for domain_id in domain_ids {
            let root = load_domain_tree(directory, domain_id, &mut content)?;
            content.domains.push(DomainTree { domain_id, root });
        }
        build_gal(&mut content);
        Ok(content)
    }
}

fn load_user_node(content: &mut BaseContent, user: DirectoryUser) -> (NodeId, String) {
    let kind = NodeKind::from_user(user.dtypx);
    let node = AbNode {
        kind,
        id: user.id,
        minid: Minid::address(user.id),
        payload: NodePayload::User(user),
        parent: None,
        children: Vec::new(),
        alias: false,
    };
    let display = node.display_name(SORT_CODEPAGE);
    (content.register(node), display)
}

fn attach_sorted_users(
    content: &mut BaseContent,
    parent: NodeId,
    users: Vec<DirectoryUser>,
) {
    let mut leaves: Vec<(NodeId, String)> = users
        .into_iter()
        .map(|user| load_user_node(content, user))
        .collect();
    sort_by_display_name(&mut leaves);
    for (id, _) in leaves {
        content.attach(parent, id);
    }
}

fn load_class(
    directory: &dyn Directory,
    class_id: u32,
    parent: NodeId,
    content: &mut BaseContent,
) -> Result<(), directory::DirectoryError> {
    for sub in directory.get_sub_classes(class_id)? {
        let node = AbNode {
            kind: NodeKind::Class,
            id: sub.child_id,
            minid: AbNode::minid_for(NodeKind::Class, sub.child_id),
            payload: NodePayload::Class(sub.clone()),
            parent: None,
            children: Vec::new(),
            alias: false,
        };
        let child = content.register(node);
        content.attach(parent, child);
        load_class(directory, sub.child_id, child, content)?;
    }
    attach_sorted_users(content, parent, directory.get_class_users(class_id)?);
    Ok(())
}

fn load_domain_tree(
    directory: &dyn Directory,
    domain_id: u32,
    content: &mut BaseContent,
) -> Result<NodeId, directory::DirectoryError> {
    let info = directory.get_domain_info(domain_id)?;
    let root = content.register(AbNode {
        kind: NodeKind::Domain,
        id: domain_id,
        minid: AbNode::minid_for(NodeKind::Domain, domain_id),
        payload: NodePayload::Domain(info),
        parent: None,
        children: Vec::new(),
        alias: false,
    });
    for group in directory.get_domain_groups(domain_id)? {
        let group_id = group.id;
        let group_node = content.register(AbNode {
            kind: NodeKind::Group,
            id: group_id,
            minid: AbNode::minid_for(NodeKind::Group, group_id),
            payload: NodePayload::Group(group),
            parent: None,
            children: Vec::new(),
            alias: false,
        });
        content.attach(root, group_node);
        for class in directory.get_group_classes(group_id)? {
            let class_node = content.register(AbNode {
                kind: NodeKind::Class,
                id: class.child_id,
                minid: AbNode::minid_for(NodeKind::Class, class.child_id),
                payload: NodePayload::Class(class.clone()),
                parent: None,
                children: Vec::new(),
                alias: false,
            });
            content.attach(group_node, class_node);
            load_class(directory, class.child_id, class_node, content)?;
        }
        attach_sorted_users(content, group_node, directory.get_group_users(group_id)?);
    }
    attach_sorted_users(content, root, directory.get_domain_users(domain_id)?);
    Ok(root)
}

/// Collect every owned leaf (skipping minid aliases) into the flat GAL,
/// ordered by case-folded display name.
fn build_gal(content: &mut BaseContent) {
    let mut leaves: Vec<(NodeId, String)> = content
        .arena
        .iter()
        .enumerate()
        .filter(|(_, node)| !node.kind.is_container() && !node.alias)
        .map(|(index, node)| (NodeId(index as u32), node.display_name(SORT_CODEPAGE)))
        .collect();
    leaves.sort_by(|a, b| casefold_cmp(&a.1, &b.1));
    content.gal = leaves.into_iter().map(|(id, _)| id).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use directory::memory::{Container, InMemoryDirectory};
    use types::proptag::PR_DISPLAY_NAME;

    fn directory() -> InMemoryDirectory {
        let dir = InMemoryDirectory::new();
        dir.add_org(1, &[17]);
        dir.add_domain(DomainInfo {
            id: 17,
            name: "example.org".into(),
            title: "Example".into(),
            address: String::new(),
            homedir: String::new(),
        });
        for (id, name, display) in [
            (42u32, "alice@example.org", "Alice"),
            (43, "bob@example.org", "bob"),
            (44, "carol@example.org", "Carol"),
        ] {
            let mut user = DirectoryUser::new(id, name);
            user.propvals.insert(PR_DISPLAY_NAME, display.to_string());
            dir.add_user(17, Container::Domain, user);
        }
        dir
    }

    #[test]
    fn build_populates_gal_in_case_folded_order() {
        let base = AbBase::new(1);
        let content = base.build(&directory()).unwrap();
        let names: Vec<String> = content
            .gal
            .iter()
            .map(|&id| content.node(id).display_name(SORT_CODEPAGE))
            .collect();
        assert_eq!(names, ["Alice", "bob", "Carol"]);
    }

    #[test]
    fn minid_lookup_is_total_over_owned_nodes() {
        let base = AbBase::new(-17);
        let content = base.build(&directory()).unwrap();
        for node in &content.arena {
            if !node.alias {
                let found = content.minid_to_node(node.minid).unwrap();
                assert_eq!(content.node(found).minid, node.minid);
            }
        }
        assert_eq!(
            content.minid_to_node(Minid::address(42)).map(|id| content.node(id).id),
            Some(42)
        );
        assert!(content.minid_to_node(Minid::address(999)).is_none());
    }

    #[test]
    fn guid_encodes_base_id() {
        let base = AbBase::new(-17);
        assert_eq!(AbBase::guid_to_base_id(base.guid), -17);
        let org = AbBase::new(3);
        assert_eq!(AbBase::guid_to_base_id(org.guid), 3);
    }
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use abtree::{AbTree, AbTreeConfig, ResolvedNode, base::SORT_CODEPAGE, node::NodeKind};
use directory::{
    DirectoryUser, DomainInfo, GroupInfo,
    memory::{Container, InMemoryDirectory},
};
use std::sync::Arc;
use types::{Minid, codepage::casefold_cmp, proptag::PR_DISPLAY_NAME};

fn build_directory() -> Arc<InMemoryDirectory> {
    let dir = Arc::new(InMemoryDirectory::new());
    dir.add_org(1, &[17]);
    dir.add_domain(DomainInfo {
        id: 17,
        name: "example.org".into(),
        title: "Example Org".into(),
        address: "1 Example Way".into(),
        homedir: "/var/pub/example.org".into(),
    });
    dir.add_group(
        17,
        GroupInfo {
            id: 5,
            name: "eng".into(),
            title: "Engineering".into(),
        },
    );
    let mut alice = DirectoryUser::new(42, "alice@example.org");
    alice.propvals.insert(PR_DISPLAY_NAME, "Alice".into());
    dir.add_user(17, Container::Domain, alice);
    let mut zeke = DirectoryUser::new(43, "zeke@example.org");
    zeke.propvals.insert(PR_DISPLAY_NAME, "zeke".into());
    dir.add_user(17, Container::Group(5), zeke);
    let mut bob = DirectoryUser::new(44, "bob@example.org");
    bob.propvals.insert(PR_DISPLAY_NAME, "Bob".into());
    dir.add_user(17, Container::Group(5), bob);
    dir
}

fn tree() -> Arc<AbTree> {
    AbTree::new(
        build_directory(),
        AbTreeConfig {
            org_name: "first".into(),
            ..AbTreeConfig::default()
        },
    )
}

#[test]
fn org_lookup_scenario() {
    let tree = tree();
    let base = tree.get_base(1).unwrap();

    // minid(alice) = (ADDRESS << 29) | 42 = 42
    let alice = tree.minid_to_node(&base, Minid::address(42)).unwrap();
    assert_eq!(u32::from(alice.minid()), 42);
    assert_eq!(alice.kind(), NodeKind::Person);

    let dn = tree.node_to_dn(&base, &alice).unwrap();
    assert_eq!(
        dn,
        "/O=FIRST/OU=EXCHANGE ADMINISTRATIVE GROUP \
         (FYDIBOHF23SPDLT)/CN=RECIPIENTS/CN=000000110000002A-ALICE"
    );
    let resolved = tree.dn_to_node(&base, &dn).unwrap();
    assert_eq!(resolved.minid(), alice.minid());
}

#[test]
fn gal_order_is_case_folded_by_display_name() {
    let tree = tree();
    let base = tree.get_base(1).unwrap();
    let content = base.snapshot();
    let names: Vec<String> = content
        .gal
        .iter()
        .map(|&id| content.node(id).display_name(SORT_CODEPAGE))
        .collect();
    assert_eq!(names, ["Alice", "Bob", "zeke"]);
    for pair in names.windows(2) {
        assert_ne!(casefold_cmp(&pair[0], &pair[1]), std::cmp::Ordering::Greater);
    }
}

#[test]
fn minids_are_unique_and_guids_deterministic() {
    let tree = tree();
    let base = tree.get_base(1).unwrap();
    let content = base.snapshot();
    let mut seen = std::collections::HashSet::new();
    for node in content.arena.iter().filter(|node| !node.alias) {
        assert!(seen.insert(node.minid), "duplicate minid {:?}", node.minid);
    }
    let bob = tree.minid_to_node(&base, Minid::address(44)).unwrap();
    let guid_a = tree.node_to_guid(&base, &bob).unwrap();
    let guid_b = tree.node_to_guid(&base, &bob).unwrap();
    assert_eq!(guid_a, guid_b);
    if let ResolvedNode::Local { content, id } = &bob {
        assert_eq!(content.node(*id).id, 44);
    } else {
        panic!("bob should be local");
    }
}

#[test]
fn group_members_sit_under_their_group() {
    let tree = tree();
    let base = tree.get_base(-17).unwrap();
    let content = base.snapshot();
    let group = content
        .minid_to_node(Minid::new(types::minid::MinidType::Group, 5))
        .unwrap();
    let group_node = content.node(group);
    assert_eq!(group_node.kind, NodeKind::Group);
    let child_names: Vec<String> = group_node
        .children
        .iter()
        .map(|&child| content.node(child).display_name(SORT_CODEPAGE))
        .collect();
    // sorted within the sibling group
    assert_eq!(child_names, ["Bob", "zeke"]);
}

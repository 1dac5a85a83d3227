/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! X.500 distinguished-name synthesis and resolution, including the
//! cross-base stub materialization performed when a DN points at a node
//! owned by a sibling base.

use crate::{
    AbTree, ResolvedNode,
    base::{AbBase, RemoteStub},
    node::{NodeKind, NodePayload},
};
use types::{Minid, entryid};
use utils::hex::{decode_hex_int, encode_hex_int};

const SERVERS_INFIX: &str = "/cn=Configuration/cn=Servers/cn=";
const RECIPIENTS_INFIX: &str = "/cn=Recipients/cn=";
/// Offset of the hex-encoded object id inside the Servers CN: the twelve
/// `%02x` username bytes plus four dashes.
const SERVER_ID_OFFSET: usize = 28;

impl AbTree {
    /// Resolve an essdn inside `base`. Local nodes resolve through the
    /// minid map; recipients of foreign domains are materialized as
    /// remote stubs on this base's remote list.
    pub fn dn_to_node(&self, base: &AbBase, dn: &str) -> Option<ResolvedNode> {
        let prefix = entryid::essdn_prefix(self.org_name());
        if dn.len() < prefix.len() || !dn[..prefix.len()].eq_ignore_ascii_case(&prefix) {
            return None;
        }
        let rest = &dn[prefix.len()..];

        if rest.len() >= SERVERS_INFIX.len()
            && rest[..SERVERS_INFIX.len()].eq_ignore_ascii_case(SERVERS_INFIX)
        {
            let cn = &rest[SERVERS_INFIX.len()..];
            let user_id = decode_hex_int(cn.get(SERVER_ID_OFFSET..)?)?;
            let content = base.snapshot();
            let id = content.minid_to_node(Minid::address(user_id))?;
            return Some(ResolvedNode::Local { content, id });
        }

        if rest.len() < RECIPIENTS_INFIX.len()
            || !rest[..RECIPIENTS_INFIX.len()].eq_ignore_ascii_case(RECIPIENTS_INFIX)
        {
            return None;
        }
        let cn = &rest[RECIPIENTS_INFIX.len()..];
        let domain_id = decode_hex_int(cn)?;
        let user_id = decode_hex_int(cn.get(8..)?)?;
        let minid = Minid::address(user_id);

        let content = base.snapshot();
        if let Some(id) = content.minid_to_node(minid) {
            return Some(ResolvedNode::Local { content, id });
        }
        if let Some(stub) = base.find_remote(minid) {
            return Some(ResolvedNode::Remote(stub));
        }
        // A domain this base owns cannot supply the node through another
        // base; the id is simply gone.
        if base.has_domain(domain_id) {
            return None;
        }

        let source = self.get_base(-(domain_id as i32))?;
        let source_content = source.snapshot();
        let source_id = source_content.minid_to_node(minid)?;
        let source_node = source_content.node(source_id);
        let domain_root = source_content
            .domains
            .iter()
            .find(|tree| tree.domain_id == domain_id)?;
        let domain = match &source_content.node(domain_root.root).payload {
            NodePayload::Domain(info) => info.clone(),
            _ => return None,
        };
        let stub = RemoteStub {
            minid,
            domain_id,
            kind: source_node.kind,
            domain,
        };
        base.add_remote(stub.clone());
        Some(ResolvedNode::Remote(stub))
    }

    /// Re-synthesize the recipient essdn of a leaf node. Remote stubs
    /// resolve through the base that owns the real node.
    pub fn node_to_dn(&self, base: &AbBase, node: &ResolvedNode) -> Option<String> {
        match node {
            ResolvedNode::Local { content, id } => {
                let ab_node = content.node(*id);
                match ab_node.kind {
                    NodeKind::Person
                    | NodeKind::Room
                    | NodeKind::Equipment
                    | NodeKind::Mlist => {
                        let user = ab_node.user()?;
                        let domain_id = content.root_domain_id(*id);
                        entryid::username_to_essdn(
                            self.org_name(),
                            &user.username,
                            ab_node.id,
                            domain_id,
                        )
                    }
                    _ => None,
                }
            }
            ResolvedNode::Remote(stub) => {
                let _ = base;
                let source = self.get_base(-(stub.domain_id as i32))?;
                let content = source.snapshot();
                let id = content.minid_to_node(stub.minid)?;
                self.node_to_dn(
                    &source,
                    &ResolvedNode::Local {
                        content: content.clone(),
                        id,
                    },
                )
            }
        }
    }

    /// The Configuration/Servers DN of a leaf: twelve hex-rendered
    /// username bytes grouped GUID-style, the object id, and the mail
    /// domain, upper-cased.
    pub fn server_dn(&self, node: &ResolvedNode) -> Option<String> {
        let (username, id) = match node {
            ResolvedNode::Local { content, id } => {
                let ab_node = content.node(*id);
                if ab_node.kind.is_container() {
                    return None;
                }
                (ab_node.user()?.username.clone(), ab_node.id)
            }
            ResolvedNode::Remote(stub) => {
                let source = self.get_base(-(stub.domain_id as i32))?;
                let content = source.snapshot();
                let node_id = content.minid_to_node(stub.minid)?;
                (
                    content.node(node_id).user()?.username.clone(),
                    stub.minid.id(),
                )
            }
        };
        let mail_domain = username.split('@').nth(1).unwrap_or(&username);
        let mut bytes = [0u8; 12];
        for (slot, byte) in bytes.iter_mut().zip(username.bytes()) {
            *slot = byte;
        }
        let dn = format!(
            "{}{}{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{}@{}",
            entryid::essdn_prefix(self.org_name()),
            SERVERS_INFIX,
            bytes[0],
            bytes[1],
            bytes[2],
            bytes[3],
            bytes[4],
            bytes[5],
            bytes[6],
            bytes[7],
            bytes[8],
            bytes[9],
            bytes[10],
            bytes[11],
            encode_hex_int(id),
            mail_domain,
        );
        Some(dn.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AbTreeConfig;
    use directory::{
        DirectoryUser, DomainInfo,
        memory::{Container, InMemoryDirectory},
    };
    use std::sync::Arc;

    fn two_domain_directory() -> Arc<InMemoryDirectory> {
        let dir = InMemoryDirectory::new();
        dir.add_org(1, &[17]);
        for (domain_id, name) in [(17u32, "example.org"), (18, "other.org")] {
            dir.add_domain(DomainInfo {
                id: domain_id,
                name: name.into(),
                title: name.into(),
                address: String::new(),
                homedir: String::new(),
            });
        }
        let mut alice = DirectoryUser::new(42, "alice@example.org");
        alice
            .propvals
            .insert(types::proptag::PR_DISPLAY_NAME, "Alice".into());
        dir.add_user(17, Container::Domain, alice);
        dir.add_user(18, Container::Domain, DirectoryUser::new(77, "zoe@other.org"));
        Arc::new(dir)
    }

    fn tree() -> Arc<AbTree> {
        AbTree::new(
            two_domain_directory(),
            AbTreeConfig {
                org_name: "first".into(),
                ..AbTreeConfig::default()
            },
        )
    }

    #[test]
    fn dn_roundtrip_for_local_user() {
        let tree = tree();
        let base = tree.get_base(1).unwrap();
        let alice = tree.minid_to_node(&base, Minid::address(42)).unwrap();
        let dn = tree.node_to_dn(&base, &alice).unwrap();
        assert_eq!(
            dn,
            "/O=FIRST/OU=EXCHANGE ADMINISTRATIVE GROUP \
             (FYDIBOHF23SPDLT)/CN=RECIPIENTS/CN=000000110000002A-ALICE"
        );
        let resolved = tree.dn_to_node(&base, &dn).unwrap();
        assert_eq!(resolved.minid(), Minid::address(42));
        assert!(!resolved.is_remote());
    }

    #[test]
    fn foreign_dn_materializes_remote_stub() {
        let tree = tree();
        // Domain base for 17 only; zoe lives in domain 18.
        let base = tree.get_base(-17).unwrap();
        let dn = format!(
            "/O=FIRST/OU=EXCHANGE ADMINISTRATIVE GROUP \
             (FYDIBOHF23SPDLT)/CN=RECIPIENTS/CN={}{}-ZOE",
            encode_hex_int(18),
            encode_hex_int(77),
        );
        let resolved = tree.dn_to_node(&base, &dn).unwrap();
        assert!(resolved.is_remote());
        assert_eq!(resolved.minid(), Minid::address(77));
        // Cached on the remote list now.
        let again = tree.dn_to_node(&base, &dn).unwrap();
        assert!(again.is_remote());
        // And the stub's DN resolves through the owning base.
        let dn_back = tree.node_to_dn(&base, &resolved).unwrap();
        assert_eq!(dn_back, dn);
    }

    #[test]
    fn unknown_user_in_owned_domain_is_not_found() {
        let tree = tree();
        let base = tree.get_base(-17).unwrap();
        let dn = format!(
            "/O=FIRST/OU=EXCHANGE ADMINISTRATIVE GROUP \
             (FYDIBOHF23SPDLT)/CN=RECIPIENTS/CN={}{}-GHOST",
            encode_hex_int(17),
            encode_hex_int(4040),
        );
        assert!(tree.dn_to_node(&base, &dn).is_none());
    }

    #[test]
    fn server_dn_embeds_object_id() {
        let tree = tree();
        let base = tree.get_base(1).unwrap();
        let alice = tree.minid_to_node(&base, Minid::address(42)).unwrap();
        let dn = tree.server_dn(&alice).unwrap();
        assert!(dn.contains("/CN=CONFIGURATION/CN=SERVERS/CN="));
        assert!(dn.ends_with("@EXAMPLE.ORG"));
        let resolved = tree.dn_to_node(&base, &dn).unwrap();
        assert_eq!(resolved.minid(), Minid::address(42));
    }
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use directory::{ClassInfo, DirectoryUser, DomainInfo, GroupInfo, lang};
use types::{
    Minid,
    codepage::casefold_cmp,
    constants::{DisplayType, MlistType},
    minid::MinidType,
    proptag::PR_DISPLAY_NAME,
};

/// Index of a node inside its owning base's arena. Never valid across
/// bases; cross-base references go through remote stubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Remote,
    Person,
    Mlist,
    Room,
    Equipment,
    Domain,
    Group,
    Class,
}

impl NodeKind {
    /// The byte tag carried in node GUIDs; containers live above 0x80.
    pub fn as_byte(self) -> u8 {
        match self {
            NodeKind::Remote => 0x00,
            NodeKind::Person => 0x01,
            NodeKind::Mlist => 0x02,
            NodeKind::Room => 0x03,
            NodeKind::Equipment => 0x04,
            NodeKind::Domain => 0x81,
            NodeKind::Group => 0x82,
            NodeKind::Class => 0x83,
        }
    }

    pub fn is_container(self) -> bool {
        self.as_byte() >= 0x80
    }

    /// The single-letter prefix used in GUID path strings.
    pub fn path_letter(self) -> Option<char> {
        Some(match self {
            NodeKind::Domain => 'd',
            NodeKind::Group => 'g',
            NodeKind::Class => 'c',
            NodeKind::Person => 'p',
            NodeKind::Mlist => 'l',
            NodeKind::Room => 'r',
            NodeKind::Equipment => 'e',
            NodeKind::Remote => return None,
        })
    }

    pub fn from_user(dtypx: DisplayType) -> Self {
        match dtypx {
            DisplayType::DistList => NodeKind::Mlist,
            DisplayType::Room => NodeKind::Room,
            DisplayType::Equipment => NodeKind::Equipment,
            DisplayType::MailUser => NodeKind::Person,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodePayload {
    Domain(DomainInfo),
    Group(GroupInfo),
    Class(ClassInfo),
    User(DirectoryUser),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbNode {
    pub kind: NodeKind,
    pub id: u32,
    pub minid: Minid,
    pub payload: NodePayload,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Set when another node already owns this minid in the base's map;
    /// aliases are skipped when the GAL is assembled.
    pub alias: bool,
}

impl AbNode {
    pub fn user(&self) -> Option<&DirectoryUser> {
        match &self.payload {
            NodePayload::User(user) => Some(user),
            _ => None,
        }
    }

    /// Render the display name the way the address book sorts and shows
    /// it: containers use their titles, users prefer PR_DISPLAY_NAME and
    /// fall back to the local part, lists go through the localized
    /// templates.
    pub fn display_name(&self, codepage: u32) -> String {
        match (&self.payload, self.kind) {
            (NodePayload::Domain(info), _) => info.title.clone(),
            (NodePayload::Group(info), _) => info.title.clone(),
            (NodePayload::Class(info), _) => info.name.clone(),
            (NodePayload::User(user), NodeKind::Mlist) => mlist_display_name(user, codepage),
            (NodePayload::User(user), _) => user
                .propvals
                .get(&PR_DISPLAY_NAME)
                .cloned()
                .unwrap_or_else(|| {
                    user.username
                        .split('@')
                        .next()
                        .unwrap_or(&user.username)
                        .to_string()
                }),
        }
    }

    pub fn minid_for(kind: NodeKind, id: u32) -> Minid {
        match kind {
            NodeKind::Domain => Minid::new(MinidType::Domain, id),
            NodeKind::Group => Minid::new(MinidType::Group, id),
            NodeKind::Class => Minid::new(MinidType::Class, id),
            _ => Minid::address(id),
        }
    }
}

fn mlist_display_name(user: &DirectoryUser, codepage: u32) -> String {
    let display = user.propvals.get(&PR_DISPLAY_NAME).cloned().unwrap_or_default();
    match user.list_type {
        MlistType::Normal => {
            let label = lang::get_lang(codepage, lang::MLIST_TEMPLATE_NORMAL)
                .unwrap_or("custom address list");
            format!("{}({})", user.username, label)
        }
        MlistType::Group => lang::get_lang(codepage, lang::MLIST_TEMPLATE_GROUP)
            .unwrap_or("all users in department of {}")
            .replacen("{}", &display, 1),
        MlistType::Domain => lang::get_lang(codepage, lang::MLIST_TEMPLATE_DOMAIN)
            .unwrap_or("all users in domain")
            .to_string(),
        MlistType::Class => lang::get_lang(codepage, lang::MLIST_TEMPLATE_CLASS)
            .unwrap_or("all users in group of {}")
            .replacen("{}", &display, 1),
    }
}

/// Sort a sibling group of freshly loaded leaves by rendered display
/// name, case-folded, the order both the tree and the GAL expose.
pub fn sort_by_display_name(nodes: &mut [(NodeId, String)]) {
    nodes.sort_by(|a, b| casefold_cmp(&a.1, &b.1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;

    fn user(id: u32, username: &str, display: Option<&str>) -> DirectoryUser {
        let mut user = DirectoryUser::new(id, username);
        if let Some(display) = display {
            user.propvals = AHashMap::from_iter([(PR_DISPLAY_NAME, display.to_string())]);
        }
        user
    }

    #[test]
    fn display_name_fallback_is_local_part() {
        let node = AbNode {
            kind: NodeKind::Person,
            id: 42,
            minid: Minid::address(42),
            payload: NodePayload::User(user(42, "alice@example.org", None)),
            parent: None,
            children: Vec::new(),
            alias: false,
        };
        assert_eq!(node.display_name(1252), "alice");
    }

    #[test]
    fn mlist_templates() {
        let mut list = user(50, "team@example.org", Some("Team"));
        list.dtypx = DisplayType::DistList;
        list.list_type = MlistType::Group;
        let node = AbNode {
            kind: NodeKind::Mlist,
            id: 50,
            minid: Minid::address(50),
            payload: NodePayload::User(list),
            parent: None,
            children: Vec::new(),
            alias: false,
        };
        assert_eq!(node.display_name(1252), "all users in department of Team");
    }
}

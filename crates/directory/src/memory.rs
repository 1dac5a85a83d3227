/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::{
    ClassInfo, Directory, DirectoryError, DirectoryUser, DomainInfo, GroupInfo, Result,
};
use ahash::AHashMap;
use parking_lot::RwLock;
use types::constants::DisplayType;

/// An in-process directory backend. Serves the tests and single-node
/// deployments; population happens through the builder-style `add_*`
/// calls before the instance is shared.
#[derive(Default)]
pub struct InMemoryDirectory {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    orgs: AHashMap<u32, Vec<u32>>,
    domains: AHashMap<u32, DomainInfo>,
    domain_groups: AHashMap<u32, Vec<GroupInfo>>,
    group_classes: AHashMap<u32, Vec<ClassInfo>>,
    sub_classes: AHashMap<u32, Vec<ClassInfo>>,
    class_users: AHashMap<u32, Vec<u32>>,
    group_users: AHashMap<u32, Vec<u32>>,
    domain_users: AHashMap<u32, Vec<u32>>,
    users: AHashMap<u32, DirectoryUser>,
    users_by_name: AHashMap<String, u32>,
    user_domain: AHashMap<u32, u32>,
    mlist_ids: AHashMap<u32, (u32, u32)>,
    mlist_members: AHashMap<String, Vec<String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_org(&self, org_id: u32, domain_ids: &[u32]) {
        self.inner
            .write()
            .orgs
            .insert(org_id, domain_ids.to_vec());
    }

    pub fn add_domain(&self, info: DomainInfo) {
        let mut inner = self.inner.write();
        inner.domain_users.entry(info.id).or_default();
        inner.domains.insert(info.id, info);
    }

    pub fn add_group(&self, domain_id: u32, info: GroupInfo) {
        let mut inner = self.inner.write();
        inner.group_users.entry(info.id).or_default();
        inner
            .domain_groups
            .entry(domain_id)
            .or_default()
            .push(info);
    }

    pub fn add_group_class(&self, group_id: u32, info: ClassInfo) {
        self.inner
            .write()
            .group_classes
            .entry(group_id)
            .or_default()
            .push(info);
    }

    pub fn add_sub_class(&self, class_id: u32, info: ClassInfo) {
        self.inner
            .write()
            .sub_classes
            .entry(class_id)
            .or_default()
            .push(info);
    }

    /// Attach a user to a domain, and optionally to a group or class
    /// container inside it.
    pub fn add_user(&self, domain_id: u32, container: Container, user: DirectoryUser) {
        let mut inner = self.inner.write();
        inner.users_by_name.insert(user.username.to_lowercase(), user.id);
        inner.user_domain.insert(user.id, domain_id);
        match container {
            Container::Domain => inner.domain_users.entry(domain_id).or_default().push(user.id),
            Container::Group(group_id) => {
                inner.group_users.entry(group_id).or_default().push(user.id)
            }
            Container::Class(class_id) => {
                inner.class_users.entry(class_id).or_default().push(user.id)
            }
        }
        inner.users.insert(user.id, user);
    }

    pub fn add_mlist(&self, user_id: u32, group_id: u32, domain_id: u32, members: &[&str]) {
        let mut inner = self.inner.write();
        inner.mlist_ids.insert(user_id, (group_id, domain_id));
        if let Some(user) = inner.users.get(&user_id) {
            let address = user.username.to_lowercase();
            inner
                .mlist_members
                .insert(address, members.iter().map(|m| m.to_lowercase()).collect());
        }
    }

    fn resolve_users(&self, ids: &[u32]) -> Vec<DirectoryUser> {
        let inner = self.inner.read();
        ids.iter()
            .filter_map(|id| inner.users.get(id).cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Domain,
    Group(u32),
    Class(u32),
}

impl Directory for InMemoryDirectory {
    fn get_org_domains(&self, org_id: u32) -> Result<Vec<u32>> {
        self.inner
            .read()
            .orgs
            .get(&org_id)
            .cloned()
            .ok_or(DirectoryError::NotFound("organization"))
    }

    fn get_domain_info(&self, domain_id: u32) -> Result<DomainInfo> {
        self.inner
            .read()
            .domains
            .get(&domain_id)
            .cloned()
            .ok_or(DirectoryError::NotFound("domain"))
    }

    fn get_domain_groups(&self, domain_id: u32) -> Result<Vec<GroupInfo>> {
        Ok(self
            .inner
            .read()
            .domain_groups
            .get(&domain_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_group_classes(&self, group_id: u32) -> Result<Vec<ClassInfo>> {
        Ok(self
            .inner
            .read()
            .group_classes
            .get(&group_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_sub_classes(&self, class_id: u32) -> Result<Vec<ClassInfo>> {
        Ok(self
            .inner
            .read()
            .sub_classes
            .get(&class_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_class_users(&self, class_id: u32) -> Result<Vec<DirectoryUser>> {
        let ids = self
            .inner
            .read()
            .class_users
            .get(&class_id)
            .cloned()
            .unwrap_or_default();
        Ok(self.resolve_users(&ids))
    }

    fn get_group_users(&self, group_id: u32) -> Result<Vec<DirectoryUser>> {
        let ids = self
            .inner
            .read()
            .group_users
            .get(&group_id)
            .cloned()
            .unwrap_or_default();
        Ok(self.resolve_users(&ids))
    }

    fn get_domain_users(&self, domain_id: u32) -> Result<Vec<DirectoryUser>> {
        let ids = self
            .inner
            .read()
            .domain_users
            .get(&domain_id)
            .cloned()
            .unwrap_or_default();
        Ok(self.resolve_users(&ids))
    }

    fn get_mlist_ids(&self, user_id: u32) -> Result<(u32, u32)> {
        self.inner
            .read()
            .mlist_ids
            .get(&user_id)
            .copied()
            .ok_or(DirectoryError::NotFound("mlist"))
    }

    fn get_user_ids(&self, username: &str) -> Result<(u32, u32, DisplayType)> {
        let inner = self.inner.read();
        let user_id = *inner
            .users_by_name
            .get(&username.to_lowercase())
            .ok_or(DirectoryError::NotFound("user"))?;
        let domain_id = *inner
            .user_domain
            .get(&user_id)
            .ok_or(DirectoryError::NotFound("domain"))?;
        let dtypx = inner
            .users
            .get(&user_id)
            .map(|u| u.dtypx)
            .ok_or(DirectoryError::NotFound("user"))?;
        Ok((user_id, domain_id, dtypx))
    }

    fn get_domain_ids(&self, domain_name: &str) -> Result<(u32, u32)> {
        let inner = self.inner.read();
        let domain = inner
            .domains
            .values()
            .find(|d| d.name.eq_ignore_ascii_case(domain_name))
            .ok_or(DirectoryError::NotFound("domain"))?;
        let org_id = inner
            .orgs
            .iter()
            .find(|(_, domains)| domains.contains(&domain.id))
            .map(|(org, _)| *org)
            .unwrap_or(0);
        Ok((domain.id, org_id))
    }

    fn get_username_from_id(&self, user_id: u32) -> Result<String> {
        self.inner
            .read()
            .users
            .get(&user_id)
            .map(|u| u.username.clone())
            .ok_or(DirectoryError::NotFound("user"))
    }

    fn get_user_displayname(&self, username: &str) -> Result<String> {
        let inner = self.inner.read();
        let user_id = *inner
            .users_by_name
            .get(&username.to_lowercase())
            .ok_or(DirectoryError::NotFound("user"))?;
        let user = inner
            .users
            .get(&user_id)
            .ok_or(DirectoryError::NotFound("user"))?;
        Ok(user
            .propvals
            .get(&types::proptag::PR_DISPLAY_NAME)
            .cloned()
            .unwrap_or_else(|| user.username.clone()))
    }

    fn get_maildir(&self, username: &str) -> Result<String> {
        let inner = self.inner.read();
        let user_id = *inner
            .users_by_name
            .get(&username.to_lowercase())
            .ok_or(DirectoryError::NotFound("user"))?;
        inner
            .users
            .get(&user_id)
            .map(|u| u.maildir.clone())
            .ok_or(DirectoryError::NotFound("user"))
    }

    fn get_homedir(&self, domain_name: &str) -> Result<String> {
        let inner = self.inner.read();
        inner
            .domains
            .values()
            .find(|d| d.name.eq_ignore_ascii_case(domain_name))
            .map(|d| d.homedir.clone())
            .ok_or(DirectoryError::NotFound("domain"))
    }

    fn get_timezone(&self, username: &str) -> Result<String> {
        let inner = self.inner.read();
        let user_id = *inner
            .users_by_name
            .get(&username.to_lowercase())
            .ok_or(DirectoryError::NotFound("user"))?;
        inner
            .users
            .get(&user_id)
            .map(|u| u.timezone.clone())
            .ok_or(DirectoryError::NotFound("user"))
    }

    fn set_timezone(&self, username: &str, timezone: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let user_id = *inner
            .users_by_name
            .get(&username.to_lowercase())
            .ok_or(DirectoryError::NotFound("user"))?;
        inner
            .users
            .get_mut(&user_id)
            .map(|u| u.timezone = timezone.to_string())
            .ok_or(DirectoryError::NotFound("user"))
    }

    fn get_user_lang(&self, username: &str) -> Result<String> {
        let inner = self.inner.read();
        let user_id = *inner
            .users_by_name
            .get(&username.to_lowercase())
            .ok_or(DirectoryError::NotFound("user"))?;
        inner
            .users
            .get(&user_id)
            .map(|u| u.lang.clone())
            .ok_or(DirectoryError::NotFound("user"))
    }

    fn set_user_lang(&self, username: &str, lang: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let user_id = *inner
            .users_by_name
            .get(&username.to_lowercase())
            .ok_or(DirectoryError::NotFound("user"))?;
        inner
            .users
            .get_mut(&user_id)
            .map(|u| u.lang = lang.to_string())
            .ok_or(DirectoryError::NotFound("user"))
    }

    fn get_user_privilege_bits(&self, username: &str) -> Result<u32> {
        let inner = self.inner.read();
        let user_id = *inner
            .users_by_name
            .get(&username.to_lowercase())
            .ok_or(DirectoryError::NotFound("user"))?;
        inner
            .users
            .get(&user_id)
            .map(|u| u.list_priv)
            .ok_or(DirectoryError::NotFound("user"))
    }

    fn check_mlist_include(&self, list_address: &str, account: &str) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .mlist_members
            .get(&list_address.to_lowercase())
            .is_some_and(|members| members.iter().any(|m| m.eq_ignore_ascii_case(account))))
    }

    fn check_same_org(&self, domain_id1: u32, domain_id2: u32) -> Result<bool> {
        let inner = self.inner.read();
        Ok(inner.orgs.values().any(|domains| {
            domains.contains(&domain_id1) && domains.contains(&domain_id2)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> InMemoryDirectory {
        let dir = InMemoryDirectory::new();
        dir.add_org(1, &[17]);
        dir.add_domain(DomainInfo {
            id: 17,
            name: "example.org".into(),
            title: "Example".into(),
            address: "1 Example Way".into(),
            homedir: "/var/pub/example.org".into(),
        });
        let mut alice = DirectoryUser::new(42, "alice@example.org");
        alice.maildir = "/var/mail/alice".into();
        alice
            .propvals
            .insert(types::proptag::PR_DISPLAY_NAME, "Alice".into());
        dir.add_user(17, Container::Domain, alice);
        dir
    }

    #[test]
    fn lookup_paths() {
        let dir = populated();
        assert_eq!(dir.get_org_domains(1).unwrap(), vec![17]);
        let (user_id, domain_id, dtypx) = dir.get_user_ids("Alice@Example.Org").unwrap();
        assert_eq!((user_id, domain_id), (42, 17));
        assert_eq!(dtypx, DisplayType::MailUser);
        assert_eq!(dir.get_username_from_id(42).unwrap(), "alice@example.org");
        assert_eq!(dir.get_user_displayname("alice@example.org").unwrap(), "Alice");
        assert_eq!(dir.get_domain_ids("EXAMPLE.ORG").unwrap(), (17, 1));
        assert!(dir.get_user_ids("nobody@example.org").is_err());
    }

    #[test]
    fn mlist_membership() {
        let dir = populated();
        let mut list = DirectoryUser::new(50, "team@example.org");
        list.dtypx = DisplayType::DistList;
        dir.add_user(17, Container::Domain, list);
        dir.add_mlist(50, 0, 17, &["alice@example.org"]);
        assert!(dir
            .check_mlist_include("team@example.org", "ALICE@example.org")
            .unwrap());
        assert!(!dir
            .check_mlist_include("team@example.org", "bob@example.org")
            .unwrap());
        assert_eq!(dir.get_mlist_ids(50).unwrap(), (0, 17));
    }
}

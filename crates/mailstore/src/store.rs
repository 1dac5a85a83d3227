/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The per-mailbox facade: calculated properties, named-property id
//! resolution, ownership checks and property-group info.

use crate::{Result, SessionInfo, db_err, lang, oof};
use ahash::AHashMap;
use directory::Directory;
use exmdb::PropertyDb;
use parking_lot::Mutex;
use std::{
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};
use types::{
    EcError, Guid, ProblemArray, PropValue, PropertyGroupInfo, PropertyName, PropertyNameKind,
    ProptagArray, TpropvalArray,
    constants::*,
    entryid::{
        self, FolderEntryid, make_domain_guid, make_eid_ex, make_user_guid,
        serialize_ab_entryid, AbEntryidType,
    },
    proptag::*,
};

/// PS_MAPI: names under this set resolve to their lid directly and are
/// never cached.
pub const PS_MAPI: Guid = Guid {
    time_low: 0x0002_0328,
    time_mid: 0x0000,
    time_hi_and_version: 0x0000,
    clock_seq: [0xc0, 0x00],
    node: [0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
};

const OWNER_CACHE_TTL: Duration = Duration::from_secs(60);

/// The id of the built-in change group partition handed to messages that
/// were never assigned one by a client.
const DEFAULT_GROUP_ID: u32 = 1;

pub struct Store {
    db: Arc<dyn PropertyDb>,
    directory: Arc<dyn Directory>,
    b_private: bool,
    account_id: u32,
    account: String,
    dir: String,
    propid_by_name: Mutex<AHashMap<String, u16>>,
    name_by_propid: Mutex<AHashMap<u16, PropertyName>>,
    last_groupinfo: Mutex<Option<Arc<PropertyGroupInfo>>>,
    groupinfos: Mutex<AHashMap<u32, Arc<PropertyGroupInfo>>>,
    extra_owners: Mutex<AHashMap<String, Instant>>,
}

impl Store {
    pub fn open(
        db: Arc<dyn PropertyDb>,
        directory: Arc<dyn Directory>,
        b_private: bool,
        account_id: u32,
        account: impl Into<String>,
        dir: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Store {
            db,
            directory,
            b_private,
            account_id,
            account: account.into(),
            dir: dir.into(),
            propid_by_name: Mutex::new(AHashMap::new()),
            name_by_propid: Mutex::new(AHashMap::new()),
            last_groupinfo: Mutex::new(None),
            groupinfos: Mutex::new(AHashMap::new()),
            extra_owners: Mutex::new(AHashMap::new()),
        })
    }

    pub fn db(&self) -> &Arc<dyn PropertyDb> {
        &self.db
    }

    pub fn directory(&self) -> &dyn Directory {
        &*self.directory
    }

    pub fn is_private(&self) -> bool {
        self.b_private
    }

    pub fn account_id(&self) -> u32 {
        self.account_id
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// The mailbox GUID, derived from the owning account or domain id.
    pub fn guid(&self) -> Guid {
        if self.b_private {
            make_user_guid(self.account_id)
        } else {
            make_domain_guid(self.account_id)
        }
    }

    /// Owner when the caller is the account itself, or holds the
    /// store-owner permission (cached for a minute).
    pub fn check_owner_mode(&self, session: &SessionInfo) -> bool {
        if self.b_private && session.user_id == self.account_id {
            return true;
        }
        let key = session.username.to_lowercase();
        {
            let mut cache = self.extra_owners.lock();
            if let Some(seen) = cache.get_mut(&key) {
                if seen.elapsed() < OWNER_CACHE_TTL {
                    *seen = Instant::now();
                    return true;
                }
                cache.remove(&key);
            }
        }
        match self.db.check_mailbox_permission(&self.dir, &session.username) {
            Ok(permission) if permission & FRIGHTS_GROMOX_STORE_OWNER != 0 => {
                self.extra_owners.lock().insert(key, Instant::now());
                true
            }
            Ok(_) => false,
            Err(err) => {
                debug!(dir = %self.dir, %err, "mailbox permission lookup failed");
                false
            }
        }
    }

    // Named-property resolution.

    fn cache_propname(&self, propid: u16, name: &PropertyName) {
        if propid == 0 || !is_named_propid(propid) {
            return;
        }
        self.propid_by_name.lock().insert(name.to_key(), propid);
        self.name_by_propid.lock().insert(propid, name.clone());
    }

    /// Resolve names to propids, allocating when `b_create`. PS_MAPI
    /// names short-circuit to their lid.
    pub fn get_named_propids(&self, b_create: bool, names: &[PropertyName]) -> Result<Vec<u16>> {
        let mut propids = vec![0u16; names.len()];
        let mut missing = Vec::new();
        for (index, name) in names.iter().enumerate() {
            if name.guid == PS_MAPI {
                propids[index] = match name.kind {
                    PropertyNameKind::Id(lid) => lid as u16,
                    PropertyNameKind::Name(_) => 0,
                };
                continue;
            }
            match self.propid_by_name.lock().get(&name.to_key()) {
                Some(&propid) => propids[index] = propid,
                None => missing.push(index),
            }
        }
        if !missing.is_empty() {
            let batch: Vec<PropertyName> =
                missing.iter().map(|&index| names[index].clone()).collect();
            let resolved = self
                .db
                .get_named_propids(&self.dir, b_create, &batch)
                .map_err(db_err)?;
            for (&index, &propid) in missing.iter().zip(&resolved) {
                propids[index] = propid;
                self.cache_propname(propid, &names[index]);
            }
        }
        Ok(propids)
    }

    /// The dual of `get_named_propids`, with the same cache discipline.
    pub fn get_named_propnames(&self, propids: &[u16]) -> Result<Vec<Option<PropertyName>>> {
        let mut names = vec![None; propids.len()];
        let mut missing = Vec::new();
        for (index, &propid) in propids.iter().enumerate() {
            if !is_named_propid(propid) {
                continue;
            }
            match self.name_by_propid.lock().get(&propid) {
                Some(name) => names[index] = Some(name.clone()),
                None => missing.push(index),
            }
        }
        if !missing.is_empty() {
            let batch: Vec<u16> = missing.iter().map(|&index| propids[index]).collect();
            let resolved = self.db.get_named_propnames(&self.dir, &batch).map_err(db_err)?;
            for (&index, name) in missing.iter().zip(resolved.into_iter()) {
                if let Some(name) = name {
                    self.cache_propname(propids[index], &name);
                    names[index] = Some(name);
                }
            }
        }
        Ok(names)
    }

    // Property-group info.

    fn build_groupinfo(&self, group_id: u32) -> Result<PropertyGroupInfo> {
        let mut info = PropertyGroupInfo::new(group_id);
        info.append_group(
            [
                PR_MESSAGE_FLAGS,
                PR_READ,
                PR_IMPORTANCE,
                PR_SENSITIVITY,
                PR_MESSAGE_CLASS,
            ]
            .into_iter()
            .collect(),
        );
        info.append_group(
            [PR_SUBJECT, PR_NORMALIZED_SUBJECT, PR_SUBJECT_PREFIX, PR_BODY, PR_HTML]
                .into_iter()
                .collect(),
        );
        info.append_group(
            [
                PR_DISPLAY_TO,
                PR_DISPLAY_CC,
                PR_DISPLAY_BCC,
                PR_HAS_ATTACHMENTS,
                PR_MESSAGE_SIZE,
            ]
            .into_iter()
            .collect(),
        );
        info.append_group(
            [
                PR_CREATION_TIME,
                PR_LAST_MODIFICATION_TIME,
                PR_LOCAL_COMMIT_TIME,
                PR_LAST_MODIFIER_NAME,
                PR_LAST_MODIFIER_ENTRYID,
            ]
            .into_iter()
            .collect(),
        );
        // The appointment pair rides in its own group so calendar edits
        // produce a small partial change.
        let names = [
            PropertyName::by_id(PSETID_APPOINTMENT_GUID, 0x820d),
            PropertyName::by_id(PSETID_APPOINTMENT_GUID, 0x820e),
        ];
        let propids = self.get_named_propids(true, &names)?;
        info.append_group(
            propids
                .into_iter()
                .filter(|&propid| propid != 0)
                .map(|propid| prop_tag(propid, PT_SYSTIME))
                .collect(),
        );
        Ok(info)
    }

    /// The most recent grouping, used to pin messages without one.
    pub fn get_last_property_groupinfo(&self) -> Result<Arc<PropertyGroupInfo>> {
        {
            let cached = self.last_groupinfo.lock();
            if let Some(info) = cached.as_ref() {
                return Ok(info.clone());
            }
        }
        let info = Arc::new(self.build_groupinfo(DEFAULT_GROUP_ID)?);
        *self.last_groupinfo.lock() = Some(info.clone());
        self.groupinfos.lock().insert(info.group_id, info.clone());
        Ok(info)
    }

    pub fn get_property_groupinfo(&self, group_id: u32) -> Result<Arc<PropertyGroupInfo>> {
        if let Some(info) = self.groupinfos.lock().get(&group_id) {
            return Ok(info.clone());
        }
        let info = Arc::new(self.build_groupinfo(group_id)?);
        self.groupinfos.lock().insert(group_id, info.clone());
        Ok(info)
    }

    // Calculated properties.

    fn folder_entryid(&self, folder_id: u64) -> PropValue {
        PropValue::Binary(FolderEntryid::new(self.b_private, self.guid(), make_eid_ex(1, folder_id)).serialize())
    }

    fn display_name(&self) -> String {
        if self.b_private {
            self.directory
                .get_user_displayname(&self.account)
                .unwrap_or_else(|_| self.account.clone())
        } else {
            format!("Public Folders - {}", self.account)
        }
    }

    fn aggregated_rights(&self, session: &SessionInfo) -> u32 {
        let subtree = if self.b_private {
            PRIVATE_FID_IPMSUBTREE
        } else {
            PUBLIC_FID_IPMSUBTREE
        };
        self.db
            .check_folder_permission(&self.dir, make_eid_ex(1, subtree), &session.username)
            .unwrap_or(0)
    }

    fn calculated_property(&self, session: &SessionInfo, proptag: u32) -> Option<PropValue> {
        match proptag {
            PR_MDB_PROVIDER => {
                let uid = if !self.b_private {
                    entryid::STORE_UID_PUBLIC
                } else if self.check_owner_mode(session) {
                    entryid::STORE_UID_PRIVATE_OWNER
                } else {
                    entryid::STORE_UID_PRIVATE_DELEGATE
                };
                Some(PropValue::Binary(uid.to_vec()))
            }
            PR_DISPLAY_NAME => Some(PropValue::Unicode(self.display_name())),
            PR_EMAIL_ADDRESS => {
                let essdn = if self.b_private {
                    let (user_id, domain_id, _) =
                        self.directory.get_user_ids(&self.account).ok()?;
                    entryid::username_to_essdn(
                        &session.org_name,
                        &self.account,
                        user_id,
                        domain_id,
                    )?
                } else {
                    return None;
                };
                Some(PropValue::Unicode(essdn))
            }
            PR_OBJECT_TYPE => Some(PropValue::Long(OBJECT_STORE)),
            PR_STORE_RECORD_KEY => Some(PropValue::Binary(self.guid().to_bytes().to_vec())),
            PR_RECORD_KEY => Some(PropValue::Binary(self.guid().to_bytes().to_vec())),
            PR_STORE_STATE => Some(PropValue::Long(0)),
            PR_ACCESS => {
                if self.check_owner_mode(session) {
                    Some(PropValue::Long(ACCESS_ALL))
                } else {
                    let rights = self.aggregated_rights(session);
                    let mut access = ACCESS_READ;
                    if rights & FRIGHTS_OWNER != 0 {
                        access |= ACCESS_MODIFY | ACCESS_DELETE | ACCESS_HIERARCHY
                            | ACCESS_CONTENTS | ACCESS_FAI_CONTENTS;
                    }
                    if rights & FRIGHTS_CREATE != 0 {
                        access |= ACCESS_CONTENTS | ACCESS_FAI_CONTENTS;
                    }
                    if rights & FRIGHTS_CREATE_SUBFOLDER != 0 {
                        access |= ACCESS_HIERARCHY;
                    }
                    Some(PropValue::Long(access))
                }
            }
            PR_RIGHTS => {
                if self.check_owner_mode(session) {
                    Some(PropValue::Long(RIGHTS_ALL | FRIGHTS_CONTACT))
                } else {
                    Some(PropValue::Long(
                        self.aggregated_rights(session) & !RIGHTS_GROMOX_INTERNAL,
                    ))
                }
            }
            PR_USER_ENTRYID | PR_MAILBOX_OWNER_ENTRYID => {
                let essdn = entryid::username_to_essdn(
                    &session.org_name,
                    &session.username,
                    session.user_id,
                    session.domain_id,
                )?;
                Some(PropValue::Binary(serialize_ab_entryid(
                    AbEntryidType::LocalUser,
                    &essdn,
                )))
            }
            PR_MAILBOX_OWNER_NAME => Some(PropValue::Unicode(self.display_name())),
            PR_FINDER_ENTRYID if self.b_private => {
                Some(self.folder_entryid(PRIVATE_FID_FINDER))
            }
            PR_IPM_FAVORITES_ENTRYID => Some(self.folder_entryid(if self.b_private {
                PRIVATE_FID_SHORTCUTS
            } else {
                PUBLIC_FID_IPMSUBTREE
            })),
            PR_IPM_SUBTREE_ENTRYID => Some(self.folder_entryid(if self.b_private {
                PRIVATE_FID_IPMSUBTREE
            } else {
                PUBLIC_FID_IPMSUBTREE
            })),
            PR_IPM_OUTBOX_ENTRYID if self.b_private => {
                Some(self.folder_entryid(PRIVATE_FID_OUTBOX))
            }
            PR_IPM_SENTMAIL_ENTRYID if self.b_private => {
                Some(self.folder_entryid(PRIVATE_FID_SENT_ITEMS))
            }
            PR_IPM_WASTEBASKET_ENTRYID if self.b_private => {
                Some(self.folder_entryid(PRIVATE_FID_DELETED_ITEMS))
            }
            PR_SCHEDULE_FOLDER_ENTRYID if self.b_private => {
                Some(self.folder_entryid(PRIVATE_FID_SCHEDULE))
            }
            PR_COMMON_VIEWS_ENTRYID if self.b_private => {
                Some(self.folder_entryid(PRIVATE_FID_COMMON_VIEWS))
            }
            PR_VIEWS_ENTRYID if self.b_private => Some(self.folder_entryid(PRIVATE_FID_VIEWS)),
            PR_IPM_PUBLIC_FOLDERS_ENTRYID if !self.b_private => {
                Some(self.folder_entryid(PUBLIC_FID_NONIPMSUBTREE))
            }
            PR_EC_USER_LANGUAGE if self.b_private => self
                .directory
                .get_user_lang(&self.account)
                .ok()
                .filter(|lang| !lang.is_empty())
                .map(|lang| PropValue::Unicode(format!("{lang}.UTF-8"))),
            PR_EC_USER_TIMEZONE if self.b_private => self
                .directory
                .get_timezone(&self.account)
                .ok()
                .filter(|tz| !tz.is_empty())
                .map(PropValue::Unicode),
            PR_THUMBNAIL_PHOTO if self.b_private => {
                let path = Path::new(&self.dir).join("config").join("portrait.jpg");
                std::fs::read(path).ok().map(PropValue::Binary)
            }
            tag if oof::is_oof_proptag(tag) && self.b_private => {
                oof::get_oof_property(&self.dir, tag)
            }
            _ => None,
        }
    }

    pub fn get_all_proptags(&self) -> Result<ProptagArray> {
        let mut tags = self.db.get_store_all_proptags(&self.dir).map_err(db_err)?;
        for tag in [
            PR_MDB_PROVIDER,
            PR_DISPLAY_NAME,
            PR_OBJECT_TYPE,
            PR_RECORD_KEY,
            PR_STORE_RECORD_KEY,
            PR_ACCESS,
            PR_RIGHTS,
            PR_USER_ENTRYID,
            PR_MAILBOX_OWNER_ENTRYID,
            PR_MAILBOX_OWNER_NAME,
            PR_IPM_SUBTREE_ENTRYID,
            PR_IPM_OUTBOX_ENTRYID,
            PR_IPM_SENTMAIL_ENTRYID,
            PR_IPM_WASTEBASKET_ENTRYID,
        ] {
            tags.append(tag);
        }
        Ok(tags)
    }

    pub fn get_properties(
        &self,
        session: &SessionInfo,
        proptags: &ProptagArray,
    ) -> Result<TpropvalArray> {
        let mut out = TpropvalArray::new();
        let mut remaining = ProptagArray::new();
        for proptag in proptags.iter() {
            match self.calculated_property(session, proptag) {
                Some(value) => out.set(proptag, value),
                None => {
                    remaining.append(proptag);
                }
            }
        }
        if !remaining.is_empty() {
            let fetched = self
                .db
                .get_store_properties(&self.dir, session.cpid, &remaining)
                .map_err(db_err)?;
            for pv in fetched.iter() {
                out.set(pv.proptag, pv.value.clone());
            }
        }
        Ok(out)
    }

    /// Write the settable store properties. Unknown or read-only tags
    /// produce per-property problems, never a failed batch.
    pub fn set_properties(
        &self,
        _session: &SessionInfo,
        propvals: &TpropvalArray,
    ) -> Result<ProblemArray> {
        let mut problems = ProblemArray::default();
        for (index, pv) in propvals.iter().enumerate() {
            match pv.proptag {
                tag if oof::is_oof_proptag(tag) => {
                    if !self.b_private {
                        problems.push(index, tag, EcError::NotSupported);
                        continue;
                    }
                    if let Err(err) = oof::set_oof_property(&self.dir, tag, &pv.value) {
                        warn!(dir = %self.dir, %err, "autoreply write failed");
                        problems.push(index, tag, EcError::CallFailed);
                    }
                }
                PR_EC_USER_LANGUAGE => {
                    let Some(language) = pv.value.as_str() else {
                        problems.push(index, pv.proptag, EcError::InvalidParam);
                        continue;
                    };
                    let locale = language.split('.').next().unwrap_or(language);
                    lang::rename_folders(&*self.db, &self.dir, locale)?;
                    if self.b_private {
                        if let Err(err) = self.directory.set_user_lang(&self.account, locale) {
                            warn!(%err, "language pin failed");
                            problems.push(index, pv.proptag, EcError::CallFailed);
                        }
                    }
                }
                PR_EC_USER_TIMEZONE => {
                    if !self.b_private {
                        problems.push(index, pv.proptag, EcError::NotSupported);
                        continue;
                    }
                    let Some(timezone) = pv.value.as_str() else {
                        problems.push(index, pv.proptag, EcError::InvalidParam);
                        continue;
                    };
                    if let Err(err) = self.directory.set_timezone(&self.account, timezone) {
                        warn!(%err, "timezone write failed");
                        problems.push(index, pv.proptag, EcError::CallFailed);
                    }
                }
                PR_THUMBNAIL_PHOTO => {
                    let Some(bytes) = pv.value.as_bytes() else {
                        problems.push(index, pv.proptag, EcError::InvalidParam);
                        continue;
                    };
                    let path = Path::new(&self.dir).join("config").join("portrait.jpg");
                    let outcome = path
                        .parent()
                        .map(std::fs::create_dir_all)
                        .unwrap_or(Ok(()))
                        .and_then(|_| std::fs::write(&path, bytes));
                    if let Err(err) = outcome {
                        warn!(dir = %self.dir, %err, "portrait write failed");
                        problems.push(index, pv.proptag, EcError::CallFailed);
                    }
                }
                PR_MDB_PROVIDER | PR_OBJECT_TYPE | PR_RECORD_KEY | PR_STORE_RECORD_KEY
                | PR_ACCESS | PR_RIGHTS => {
                    problems.push(index, pv.proptag, EcError::AccessDenied);
                }
                // everything else is not writable through the facade
                _ => {}
            }
        }
        Ok(problems)
    }

    /// Accounts listed in `config/delegates.txt`, one per line,
    /// case-insensitive.
    pub fn get_delegates(&self) -> Vec<String> {
        std::fs::read_to_string(Path::new(&self.dir).join("config").join("delegates.txt"))
            .map(|contents| {
                contents
                    .lines()
                    .map(|line| line.trim().to_lowercase())
                    .filter(|line| !line.is_empty() && line.len() <= 324)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_delegate(&self, username: &str) -> bool {
        let needle = username.to_lowercase();
        self.get_delegates().iter().any(|entry| *entry == needle)
    }

    /// Merge the permission rows of the IPM subtree, one row per member,
    /// with the internal bits stripped.
    pub fn get_permissions(&self) -> Result<Vec<(String, u32)>> {
        let subtree = make_eid_ex(
            1,
            if self.b_private {
                PRIVATE_FID_IPMSUBTREE
            } else {
                PUBLIC_FID_IPMSUBTREE
            },
        );
        let (table_id, row_count) = self
            .db
            .load_permission_table(&self.dir, subtree, 0)
            .map_err(db_err)?;
        let tags: ProptagArray = [PR_MEMBER_NAME, PR_SMTP_ADDRESS, PR_MEMBER_RIGHTS]
            .into_iter()
            .collect();
        let rows = self
            .db
            .query_table(&self.dir, None, types::codepage::CP_UTF8, table_id, &tags, 0, row_count)
            .map_err(db_err)?;
        self.db.unload_table(&self.dir, table_id).map_err(db_err)?;
        let mut merged: AHashMap<String, u32> = AHashMap::new();
        for row in rows {
            let member = row
                .get_str(PR_MEMBER_NAME)
                .or_else(|| row.get_str(PR_SMTP_ADDRESS))
                .unwrap_or_default()
                .to_lowercase();
            if member.is_empty() {
                continue;
            }
            let rights = row.get_u32(PR_MEMBER_RIGHTS).unwrap_or(0) & !RIGHTS_GROMOX_INTERNAL;
            *merged.entry(member).or_insert(0) |= rights;
        }
        let mut out: Vec<(String, u32)> = merged.into_iter().collect();
        out.sort();
        Ok(out)
    }
}

/// PSETID_Appointment, needed by the default change grouping.
const PSETID_APPOINTMENT_GUID: Guid = Guid {
    time_low: 0x0006_2002,
    time_mid: 0x0000,
    time_hi_and_version: 0x0000,
    clock_seq: [0xc0, 0x00],
    node: [0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
};

#[cfg(test)]
mod tests {
    use super::*;
    use directory::memory::InMemoryDirectory;
    use exmdb::memory::MemoryDb;

    fn store_with(maildir: &str) -> (Arc<Store>, Arc<MemoryDb>, SessionInfo) {
        let db = Arc::new(MemoryDb::new());
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_domain(directory::DomainInfo {
            id: 17,
            name: "example.org".into(),
            title: "Example".into(),
            address: String::new(),
            homedir: String::new(),
        });
        let mut alice = directory::DirectoryUser::new(42, "alice@example.org");
        alice.maildir = maildir.to_string();
        alice.propvals.insert(PR_DISPLAY_NAME, "Alice".into());
        directory.add_user(17, directory::memory::Container::Domain, alice);
        let store = Store::open(
            db.clone(),
            directory,
            true,
            42,
            "alice@example.org",
            maildir,
        );
        (store, db, SessionInfo::new("alice@example.org", 42, 17))
    }

    #[test]
    fn named_prop_cache_is_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _db, _session) = store_with(dir.path().to_str().unwrap());
        let name = PropertyName::by_id(PSETID_APPOINTMENT_GUID, 0x820d);
        let first = store.get_named_propids(true, std::slice::from_ref(&name)).unwrap();
        let second = store.get_named_propids(true, std::slice::from_ref(&name)).unwrap();
        assert_eq!(first, second);
        assert!(first[0] >= 0x8000);
        let names = store.get_named_propnames(&first).unwrap();
        assert_eq!(names[0].as_ref(), Some(&name));
        // reserved range is resolved directly and never cached
        let mapi = PropertyName::by_id(PS_MAPI, PR_SUBJECT as u32 >> 16);
        let ids = store.get_named_propids(false, &[mapi]).unwrap();
        assert_eq!(ids, vec![0x0037]);
        assert!(store.get_named_propnames(&[0x0037]).unwrap()[0].is_none());
    }

    #[test]
    fn owner_mode_and_mdb_provider() {
        let dir = tempfile::tempdir().unwrap();
        let (store, db, session) = store_with(dir.path().to_str().unwrap());
        assert!(store.check_owner_mode(&session));
        let tags: ProptagArray = [PR_MDB_PROVIDER].into_iter().collect();
        let props = store.get_properties(&session, &tags).unwrap();
        assert_eq!(
            props.get(PR_MDB_PROVIDER).and_then(PropValue::as_bytes),
            Some(&entryid::STORE_UID_PRIVATE_OWNER[..])
        );

        // a delegate sees the delegate provider until granted owner bits
        let other = SessionInfo::new("bob@example.org", 77, 17);
        assert!(!store.check_owner_mode(&other));
        db.grant_mailbox_permission(store.dir(), "bob@example.org", FRIGHTS_GROMOX_STORE_OWNER);
        assert!(store.check_owner_mode(&other));
    }

    #[test]
    fn groupinfo_is_cached_and_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _db, _session) = store_with(dir.path().to_str().unwrap());
        let info = store.get_last_property_groupinfo().unwrap();
        let again = store.get_last_property_groupinfo().unwrap();
        assert!(Arc::ptr_eq(&info, &again));
        assert_eq!(info.get_partial_index(PR_MESSAGE_FLAGS), Some(0));
        assert_eq!(info.get_partial_index(PR_SUBJECT), Some(1));
        assert_eq!(info.get_partial_index(0x7777_001f), None);
        let by_id = store.get_property_groupinfo(info.group_id).unwrap();
        assert!(Arc::ptr_eq(&info, &by_id));
    }

    #[test]
    fn public_store_display_name() {
        let db: Arc<dyn PropertyDb> = Arc::new(MemoryDb::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let store = Store::open(db, directory, false, 17, "example.org", "/var/pub/example.org");
        let session = SessionInfo::new("alice@example.org", 42, 17);
        assert_eq!(
            store.calculated_property(&session, PR_DISPLAY_NAME),
            Some(PropValue::Unicode("Public Folders - example.org".into()))
        );
        assert_eq!(
            store.calculated_property(&session, PR_MDB_PROVIDER),
            Some(PropValue::Binary(entryid::STORE_UID_PUBLIC.to_vec()))
        );
    }
}

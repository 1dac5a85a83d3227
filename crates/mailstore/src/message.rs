/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The per-message facade: instance lifecycle, dirty-tag bookkeeping,
//! change-number allocation and the save/read-flag paths.

use crate::{Result, SessionInfo, db_err, store::Store};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use tracing::debug;
use types::{
    EcError, Guid, ProblemArray, PropValue, ProptagArray, TaggedPropval, TpropvalArray, Xid,
    constants::*,
    entryid::serialize_ab_entryid,
    entryid::{self, AbEntryidType},
    idset::IcsState,
    proptag::*,
    time::current_nttime,
    value::PropvalRowSet,
    xid::Pcl,
};

/// Caps the extended-rule condition blob clients may store on FAI
/// messages.
const MAX_EXTRULE_LENGTH: usize = 510 * 1024;

pub struct Message {
    store: Arc<Store>,
    session: SessionInfo,
    instance_id: u32,
    message_id: u64,
    folder_id: u64,
    /// Present when this message is embedded under an attachment
    /// instance of another open message.
    embedding: Option<Arc<Message>>,
    cpid: u32,
    access: u32,
    writable: bool,
    state: Option<Arc<Mutex<IcsState>>>,
    inner: Mutex<Dirty>,
}

#[derive(Default)]
struct Dirty {
    b_new: bool,
    b_touched: bool,
    change_num: Option<u64>,
    changed_proptags: ProptagArray,
    removed_proptags: ProptagArray,
}

pub enum Parent {
    Folder(u64),
    Attachment(Arc<Message>),
}

impl Message {
    /// Open or create a message instance. `message_id == 0` addresses an
    /// embedded message under the parent attachment.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        store: Arc<Store>,
        session: SessionInfo,
        b_new: bool,
        cpid: u32,
        message_id: u64,
        parent: Parent,
        access: u32,
        writable: bool,
        state: Option<Arc<Mutex<IcsState>>>,
    ) -> Result<Arc<Self>> {
        let (instance_id, folder_id, embedding) = match parent {
            Parent::Attachment(parent_message) => {
                if message_id != 0 {
                    return Err(EcError::InvalidParam);
                }
                let instance_id = store
                    .db()
                    .load_embedded_instance(store.dir(), b_new, parent_message.instance_id)
                    .map_err(db_err)?;
                (instance_id, 0, Some(parent_message))
            }
            Parent::Folder(folder_id) => {
                let username = (!store.is_private()).then_some(session.username.as_str());
                let instance_id = store
                    .db()
                    .load_message_instance(
                        store.dir(),
                        username,
                        cpid,
                        b_new,
                        folder_id,
                        message_id,
                    )
                    .map_err(db_err)?;
                (instance_id, folder_id, None)
            }
        };
        let mut dirty = Dirty {
            b_new,
            ..Dirty::default()
        };
        if !b_new {
            dirty.change_num = store
                .db()
                .get_instance_property(store.dir(), instance_id, PR_CHANGE_NUMBER)
                .map_err(db_err)?
                .and_then(|value| value.as_u64());
        }
        Ok(Arc::new(Message {
            store,
            session,
            instance_id,
            message_id,
            folder_id,
            embedding,
            cpid,
            access,
            writable,
            state,
            inner: Mutex::new(dirty),
        }))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    pub fn folder_id(&self) -> u64 {
        self.folder_id
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn access(&self) -> u32 {
        self.access
    }

    pub fn is_new(&self) -> bool {
        self.inner.lock().b_new
    }

    pub fn is_touched(&self) -> bool {
        self.inner.lock().b_touched
    }

    pub fn change_num(&self) -> Option<u64> {
        self.inner.lock().change_num
    }

    fn mark_touched(&self) {
        self.inner.lock().b_touched = true;
    }

    fn is_fai(&self) -> Result<bool> {
        Ok(self
            .store
            .db()
            .get_instance_property(self.store.dir(), self.instance_id, PR_ASSOCIATED)
            .map_err(db_err)?
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    /// Stamp the canonical initial property set on a brand-new message.
    pub fn init_message(&self, b_fai: bool, new_cpid: u32) -> Result<()> {
        {
            let inner = self.inner.lock();
            if !inner.b_new {
                return Err(EcError::InvalidParam);
            }
        }
        let mut rng = rand::rng();
        let search_key: [u8; 16] = rng.random();
        let message_id = format!(
            "<{:016x}@{}>",
            rng.random::<u64>(),
            self.session.hostname
        );
        let display = self
            .store
            .directory()
            .get_user_displayname(&self.session.username)
            .unwrap_or_else(|_| self.session.username.clone());
        let creator_entryid = entryid::username_to_essdn(
            &self.session.org_name,
            &self.session.username,
            self.session.user_id,
            self.session.domain_id,
        )
        .map(|essdn| serialize_ab_entryid(AbEntryidType::LocalUser, &essdn))
        .unwrap_or_default();

        let propvals: TpropvalArray = [
            TaggedPropval::new(PR_INTERNET_CPID, PropValue::Long(new_cpid)),
            TaggedPropval::new(PR_IMPORTANCE, PropValue::Long(1)),
            TaggedPropval::new(PR_MESSAGE_CLASS, PropValue::Unicode("IPM.Note".into())),
            TaggedPropval::new(PR_SENSITIVITY, PropValue::Long(0)),
            TaggedPropval::new(PR_DISPLAY_BCC, PropValue::Unicode(String::new())),
            TaggedPropval::new(PR_DISPLAY_CC, PropValue::Unicode(String::new())),
            TaggedPropval::new(PR_DISPLAY_TO, PropValue::Unicode(String::new())),
            TaggedPropval::new(
                PR_MESSAGE_FLAGS,
                PropValue::Long(MSGFLAG_UNSENT | MSGFLAG_UNMODIFIED),
            ),
            TaggedPropval::new(PR_READ, PropValue::Bool(true)),
            TaggedPropval::new(PR_ASSOCIATED, PropValue::Bool(b_fai)),
            TaggedPropval::new(PR_CREATION_TIME, PropValue::NtTime(current_nttime())),
            TaggedPropval::new(PR_SEARCH_KEY, PropValue::Binary(search_key.to_vec())),
            TaggedPropval::new(PR_MESSAGE_LOCALE_ID, PropValue::Long(0x0409)),
            TaggedPropval::new(PR_CREATOR_NAME, PropValue::Unicode(display)),
            TaggedPropval::new(PR_CREATOR_ENTRYID, PropValue::Binary(creator_entryid)),
            TaggedPropval::new(PR_INTERNET_MESSAGE_ID, PropValue::Unicode(message_id)),
        ]
        .into_iter()
        .collect();
        self.store
            .db()
            .set_instance_properties(self.store.dir(), self.instance_id, &propvals)
            .map_err(db_err)?;
        self.mark_touched();
        Ok(())
    }

    fn readonly_proptag(&self, proptag: u32, b_new: bool) -> bool {
        match proptag {
            PR_ACCESS | PR_ACCESS_LEVEL | PR_ENTRYID | PR_OBJECT_TYPE | PR_MID | PR_FOLDER_ID
            | PR_RECORD_KEY | PR_STORE_RECORD_KEY | PR_STORE_ENTRYID | PR_PARENT_ENTRYID
            | PR_PARENT_SOURCE_KEY | PR_DISPLAY_TO | PR_DISPLAY_CC | PR_DISPLAY_BCC
            | PR_MESSAGE_SIZE | PR_HAS_ATTACHMENTS | PR_HAS_NAMED_PROPERTIES
            | PR_ASSOCIATED | PR_CHANGE_NUMBER => true,
            PR_READ => self.embedding.is_none(),
            PR_CHANGE_KEY | PR_CREATION_TIME | PR_LAST_MODIFICATION_TIME
            | PR_PREDECESSOR_CHANGE_LIST | PR_SOURCE_KEY => !b_new,
            _ => false,
        }
    }

    fn set_properties_internal(
        &self,
        check: bool,
        propvals: &TpropvalArray,
    ) -> Result<ProblemArray> {
        let mut problems = ProblemArray::default();
        let mut forward = TpropvalArray::new();
        let mut inner = self.inner.lock();
        for (index, pv) in propvals.iter().enumerate() {
            if check {
                if self.readonly_proptag(pv.proptag, inner.b_new) {
                    problems.push(index, pv.proptag, EcError::AccessDenied);
                    continue;
                }
                match pv.proptag {
                    PR_EXTENDED_RULE_MSG_CONDITION => {
                        let fai = self.is_fai()?;
                        let fits = pv
                            .value
                            .as_bytes()
                            .is_some_and(|bytes| bytes.len() <= MAX_EXTRULE_LENGTH);
                        if !fai || !fits {
                            problems.push(index, pv.proptag, EcError::AccessDenied);
                            continue;
                        }
                    }
                    PR_MESSAGE_FLAGS => {
                        // The three derived booleans are written as a
                        // pre-pass; the flags word itself still lands.
                        let flags = pv.value.as_u32().unwrap_or(0);
                        forward.set(PR_READ, PropValue::Bool(flags & MSGFLAG_READ != 0));
                        forward.set(
                            PR_READ_RECEIPT_REQUESTED,
                            PropValue::Bool(flags & MSGFLAG_RN_PENDING != 0),
                        );
                        forward.set(
                            PR_NON_RECEIPT_NOTIFICATION_REQUESTED,
                            PropValue::Bool(flags & MSGFLAG_NRN_PENDING != 0),
                        );
                    }
                    _ => {}
                }
            }
            forward.set(pv.proptag, pv.value.clone());
        }
        // A client writing a subject while clearing the normalized form
        // would fight itself; drop the empty normalized subject.
        if forward
            .get_str(PR_SUBJECT)
            .is_some_and(|subject| !subject.is_empty())
            && forward
                .get_str(PR_NORMALIZED_SUBJECT)
                .is_some_and(|subject| subject.is_empty())
        {
            forward.remove(PR_NORMALIZED_SUBJECT);
        }
        if forward.is_empty() {
            return Ok(problems);
        }
        let db_problems = self
            .store
            .db()
            .set_instance_properties(self.store.dir(), self.instance_id, &forward)
            .map_err(db_err)?;
        for pv in forward.iter() {
            if db_problems.contains_tag(pv.proptag) {
                continue;
            }
            inner.b_touched = true;
            inner.removed_proptags.remove(pv.proptag);
            inner.changed_proptags.append(pv.proptag);
        }
        Ok(problems)
    }

    pub fn set_properties(&self, propvals: &TpropvalArray) -> Result<ProblemArray> {
        if !self.writable {
            return Err(EcError::AccessDenied);
        }
        self.set_properties_internal(true, propvals)
    }

    pub fn remove_properties(&self, proptags: &ProptagArray) -> Result<ProblemArray> {
        if !self.writable {
            return Err(EcError::AccessDenied);
        }
        let mut problems = ProblemArray::default();
        let mut removable = ProptagArray::new();
        let mut inner = self.inner.lock();
        for (index, proptag) in proptags.iter().enumerate() {
            if self.readonly_proptag(proptag, inner.b_new) {
                problems.push(index, proptag, EcError::AccessDenied);
            } else {
                removable.append(proptag);
            }
        }
        if removable.is_empty() {
            return Ok(problems);
        }
        self.store
            .db()
            .remove_instance_properties(self.store.dir(), self.instance_id, &removable)
            .map_err(db_err)?;
        for proptag in removable.iter() {
            inner.b_touched = true;
            inner.changed_proptags.remove(proptag);
            inner.removed_proptags.append(proptag);
        }
        Ok(problems)
    }

    pub fn get_properties(&self, proptags: &ProptagArray) -> Result<TpropvalArray> {
        self.store
            .db()
            .get_instance_properties(self.store.dir(), self.instance_id, proptags)
            .map_err(db_err)
    }

    pub fn get_all_proptags(&self) -> Result<ProptagArray> {
        self.store
            .db()
            .get_instance_all_proptags(self.store.dir(), self.instance_id)
            .map_err(db_err)
    }

    // Recipients and attachments ride on the instance RPCs.

    pub fn get_recipient_num(&self) -> Result<u16> {
        self.store
            .db()
            .get_message_instance_rcpts_num(self.store.dir(), self.instance_id)
            .map_err(db_err)
    }

    pub fn read_recipients(&self, row_id: u32, need_count: u16) -> Result<PropvalRowSet> {
        self.store
            .db()
            .get_message_instance_rcpts(self.store.dir(), self.instance_id, row_id, need_count)
            .map_err(db_err)
    }

    pub fn empty_rcpts(&self) -> Result<()> {
        self.store
            .db()
            .empty_message_instance_rcpts(self.store.dir(), self.instance_id)
            .map_err(db_err)?;
        self.mark_touched();
        Ok(())
    }

    pub fn set_rcpts(&self, rows: &PropvalRowSet) -> Result<()> {
        self.store
            .db()
            .update_message_instance_rcpts(self.store.dir(), self.instance_id, rows)
            .map_err(db_err)?;
        self.mark_touched();
        Ok(())
    }

    pub fn get_attachments_num(&self) -> Result<u16> {
        self.store
            .db()
            .get_message_instance_attachments_num(self.store.dir(), self.instance_id)
            .map_err(db_err)
    }

    pub fn delete_attachment(&self, attachment_num: u32) -> Result<()> {
        self.store
            .db()
            .delete_message_instance_attachment(self.store.dir(), self.instance_id, attachment_num)
            .map_err(db_err)?;
        self.mark_touched();
        Ok(())
    }

    pub fn clear_unsent(&self) -> Result<()> {
        let flags = self
            .store
            .db()
            .get_instance_property(self.store.dir(), self.instance_id, PR_MESSAGE_FLAGS)
            .map_err(db_err)?
            .and_then(|value| value.as_u32())
            .unwrap_or(0);
        self.store
            .db()
            .set_instance_property(
                self.store.dir(),
                self.instance_id,
                PR_MESSAGE_FLAGS,
                &PropValue::Long(flags & !MSGFLAG_UNSENT),
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Commit the instance: allocate a change number, stamp the editor
    /// metadata, extend the PCL and record either a partial or a full
    /// change. On failure nothing advances.
    pub fn save(&self) -> Result<()> {
        {
            let inner = self.inner.lock();
            if !inner.b_new && !inner.b_touched {
                return Ok(());
            }
        }
        let dir = self.store.dir();
        let db = self.store.db().clone();
        let change_num = db.allocate_cn(dir).map_err(db_err)?;
        let b_fai = self.is_fai()?;

        let now = current_nttime();
        let mut metadata = TpropvalArray::new();
        metadata.set(PR_LOCAL_COMMIT_TIME, PropValue::NtTime(now));
        {
            let inner = self.inner.lock();
            if !inner.changed_proptags.contains(PR_LAST_MODIFICATION_TIME) {
                metadata.set(PR_LAST_MODIFICATION_TIME, PropValue::NtTime(now));
            }
            if !inner.changed_proptags.contains(PR_LAST_MODIFIER_NAME) {
                let display = self
                    .store
                    .directory()
                    .get_user_displayname(&self.session.username)
                    .ok()
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| self.session.username.clone());
                metadata.set(PR_LAST_MODIFIER_NAME, PropValue::Unicode(display));
            }
        }
        let modifier_entryid = entryid::username_to_essdn(
            &self.session.org_name,
            &self.session.username,
            self.session.user_id,
            self.session.domain_id,
        )
        .map(|essdn| serialize_ab_entryid(AbEntryidType::LocalUser, &essdn))
        .ok_or(EcError::CallFailed)?;
        metadata.set(PR_LAST_MODIFIER_ENTRYID, PropValue::Binary(modifier_entryid));

        if self.message_id != 0 {
            let pcl_bytes = db
                .get_instance_property(dir, self.instance_id, PR_PREDECESSOR_CHANGE_LIST)
                .map_err(db_err)?;
            let is_new = self.inner.lock().b_new;
            let mut pcl = match pcl_bytes.as_ref().and_then(PropValue::as_bytes) {
                Some(bytes) => Pcl::deserialize(bytes).ok_or(EcError::CallFailed)?,
                None if is_new => Pcl::default(),
                None => return Err(EcError::CallFailed),
            };
            let change_key = Xid::new(self.store_replica_guid(), change_num);
            metadata.set(PR_CHANGE_KEY, PropValue::Binary(change_key.serialize()));
            pcl.append(change_key);
            metadata.set(PR_PREDECESSOR_CHANGE_LIST, PropValue::Binary(pcl.serialize()));
        }

        self.set_properties_internal(false, &metadata)?;
        db.set_instance_property(
            dir,
            self.instance_id,
            PR_CHANGE_NUMBER,
            &PropValue::I8(change_num),
        )
        .map_err(db_err)?;
        db.flush_instance(dir, self.instance_id, Some(self.store.account()))
            .map_err(db_err)?;

        let was_new = {
            let mut inner = self.inner.lock();
            let was_new = inner.b_new;
            inner.b_new = false;
            inner.b_touched = false;
            inner.change_num = Some(change_num);
            was_new
        };

        if self.message_id == 0 {
            if let Some(parent) = &self.embedding {
                parent.mark_touched();
            }
            return Ok(());
        }

        if let Some(state) = &self.state {
            let mut state = state.lock();
            state.given.append(self.message_id);
            if b_fai {
                state.seen_fai.append(change_num);
            } else {
                state.seen.append(change_num);
            }
        }

        if b_fai {
            let mut inner = self.inner.lock();
            inner.changed_proptags.clear();
            inner.removed_proptags.clear();
            return Ok(());
        }

        if was_new {
            self.save_full_change(change_num, true)?;
            return Ok(());
        }

        // Partial-change bookkeeping against the store's group partition.
        let groupinfo = match db.get_message_group_id(dir, self.message_id).map_err(db_err)? {
            Some(group_id) => self.store.get_property_groupinfo(group_id)?,
            None => {
                let info = self.store.get_last_property_groupinfo()?;
                db.set_message_group_id(dir, self.message_id, info.group_id)
                    .map_err(db_err)?;
                info
            }
        };
        db.mark_modified(dir, self.message_id).map_err(db_err)?;

        let mut indices = ProptagArray::new();
        let mut ungrouped = ProptagArray::new();
        let mut full_change = false;
        {
            let mut inner = self.inner.lock();
            inner.changed_proptags.append(PR_MESSAGE_FLAGS);
            for proptag in inner.changed_proptags.iter() {
                match groupinfo.get_partial_index(proptag) {
                    Some(index) => {
                        indices.append(index);
                    }
                    None => {
                        ungrouped.append(proptag);
                    }
                }
            }
            for proptag in inner.removed_proptags.iter() {
                match groupinfo.get_partial_index(proptag) {
                    Some(index) => {
                        indices.append(index);
                    }
                    None => {
                        full_change = true;
                        break;
                    }
                }
            }
            inner.changed_proptags.clear();
            inner.removed_proptags.clear();
        }
        if full_change {
            self.save_full_change(change_num, false)?;
        } else {
            db.save_change_indices(dir, self.message_id, change_num, &indices, &ungrouped)
                .map_err(db_err)?;
        }
        Ok(())
    }

    fn save_full_change(&self, change_num: u64, run_rules: bool) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            inner.changed_proptags.clear();
            inner.removed_proptags.clear();
        }
        let empty = ProptagArray::new();
        self.store
            .db()
            .save_change_indices(
                self.store.dir(),
                self.message_id,
                change_num,
                &empty,
                &empty,
            )
            .map_err(db_err)?;
        // Rules fire when a message first lands in a public folder.
        if run_rules && !self.store.is_private() && self.message_id != 0 {
            self.store
                .db()
                .rule_new_message(
                    self.store.dir(),
                    &self.session.username,
                    self.store.account(),
                    self.cpid,
                    self.folder_id,
                    self.message_id,
                )
                .map_err(db_err)?;
        }
        Ok(())
    }

    fn store_replica_guid(&self) -> Guid {
        self.store.guid()
    }

    pub fn reload(&self) -> Result<()> {
        let reloaded = self
            .store
            .db()
            .reload_message_instance(self.store.dir(), self.instance_id)
            .map_err(db_err)?;
        if !reloaded {
            return Err(EcError::NotFound);
        }
        let mut inner = self.inner.lock();
        inner.b_touched = false;
        inner.changed_proptags.clear();
        inner.removed_proptags.clear();
        Ok(())
    }

    /// The Exchange read-flag state machine. Returns whether the read
    /// state changed; receipt scheduling is reported to the caller.
    pub fn set_readflag(&self, read_flag: u8) -> Result<ReadFlagOutcome> {
        let dir = self.store.dir();
        let db = self.store.db();
        let username = (!self.store.is_private()).then_some(self.session.username.as_str());
        let tags: ProptagArray = [
            PR_READ,
            PR_READ_RECEIPT_REQUESTED,
            PR_NON_RECEIPT_NOTIFICATION_REQUESTED,
            PR_MESSAGE_FLAGS,
        ]
        .into_iter()
        .collect();
        let props = db
            .get_instance_properties(dir, self.instance_id, &tags)
            .map_err(db_err)?;
        let b_read = props.get_bool(PR_READ).unwrap_or(false);
        let receipt_requested = props.get_bool(PR_READ_RECEIPT_REQUESTED).unwrap_or(false);
        let non_receipt_requested = props
            .get_bool(PR_NON_RECEIPT_NOTIFICATION_REQUESTED)
            .unwrap_or(false);
        let flags = props.get_u32(PR_MESSAGE_FLAGS).unwrap_or(0);

        let mut outcome = ReadFlagOutcome::default();
        let notify_bits =
            read_flag & (MSG_READ_FLAG_CLEAR_NOTIFY_READ | MSG_READ_FLAG_CLEAR_NOTIFY_UNREAD);
        if notify_bits == 0 {
            match read_flag {
                MSG_READ_FLAG_DEFAULT | MSG_READ_FLAG_SUPPRESS_RECEIPT => {
                    if !b_read {
                        outcome.changed = true;
                        if read_flag == MSG_READ_FLAG_DEFAULT && receipt_requested {
                            outcome.generate_receipt = true;
                        }
                        self.apply_read_state(true, username)?;
                    }
                }
                MSG_READ_FLAG_CLEAR_READ_FLAG => {
                    if b_read {
                        outcome.changed = true;
                        self.apply_read_state(false, username)?;
                    }
                }
                MSG_READ_FLAG_GENERATE_RECEIPT_ONLY => {
                    if receipt_requested {
                        outcome.generate_receipt = true;
                    }
                }
                _ => {}
            }
            if outcome.generate_receipt {
                let cleared: TpropvalArray = [
                    TaggedPropval::new(PR_READ_RECEIPT_REQUESTED, PropValue::Bool(false)),
                    TaggedPropval::new(
                        PR_NON_RECEIPT_NOTIFICATION_REQUESTED,
                        PropValue::Bool(false),
                    ),
                ]
                .into_iter()
                .collect();
                db.set_instance_properties(dir, self.instance_id, &cleared)
                    .map_err(db_err)?;
                db.set_message_properties(dir, username, self.cpid, self.message_id, &cleared)
                    .map_err(db_err)?;
            }
        } else {
            let mut cleared = TpropvalArray::new();
            if read_flag & MSG_READ_FLAG_CLEAR_NOTIFY_READ != 0 && receipt_requested {
                cleared.set(PR_READ_RECEIPT_REQUESTED, PropValue::Bool(false));
            }
            if read_flag & MSG_READ_FLAG_CLEAR_NOTIFY_UNREAD != 0 && non_receipt_requested {
                cleared.set(PR_NON_RECEIPT_NOTIFICATION_REQUESTED, PropValue::Bool(false));
            }
            if !cleared.is_empty() {
                db.set_instance_properties(dir, self.instance_id, &cleared)
                    .map_err(db_err)?;
                db.set_message_properties(dir, username, self.cpid, self.message_id, &cleared)
                    .map_err(db_err)?;
            }
            if flags & MSGFLAG_UNMODIFIED != 0 {
                db.set_instance_property(
                    dir,
                    self.instance_id,
                    PR_MESSAGE_FLAGS,
                    &PropValue::Long(flags & !MSGFLAG_UNMODIFIED),
                )
                .map_err(db_err)?;
                db.mark_modified(dir, self.message_id).map_err(db_err)?;
            }
        }
        Ok(outcome)
    }

    fn apply_read_state(&self, mark_read: bool, username: Option<&str>) -> Result<()> {
        self.store
            .db()
            .set_instance_property(
                self.store.dir(),
                self.instance_id,
                PR_READ,
                &PropValue::Bool(mark_read),
            )
            .map_err(db_err)?;
        let read_cn = self
            .store
            .db()
            .set_message_read_state(self.store.dir(), username, self.message_id, mark_read)
            .map_err(db_err)?;
        debug!(
            message_id = self.message_id,
            read_cn, mark_read, "read state persisted"
        );
        Ok(())
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        if let Err(err) = self
            .store
            .db()
            .unload_instance(self.store.dir(), self.instance_id)
        {
            debug!(instance_id = self.instance_id, %err, "instance unload failed");
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadFlagOutcome {
    pub changed: bool,
    pub generate_receipt: bool,
}

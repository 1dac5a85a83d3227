/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::{DbError, PermissionData, PropertyDb, Result};
use ahash::AHashMap;
use parking_lot::Mutex;
use types::{
    EcError, Guid, ProblemArray, PropValue, PropertyName, ProptagArray, TaggedPropval,
    TpropvalArray,
    constants::MSGFLAG_SUBMITTED, constants::MSGFLAG_UNSENT,
    content::{AttachmentContent, MessageContent},
    proptag::{self, PR_MEMBER_NAME, PR_MEMBER_RIGHTS, PR_MESSAGE_FLAGS, PR_MID, PR_READ},
    value::PropvalRowSet,
};

/// An in-process property database. It reproduces the visible contract of
/// the remote store closely enough to run the facade logic hermetically:
/// monotonic change numbers, instance load/flush with embedded messages,
/// named-prop allocation from 0x8000, group ids and change indices, read
/// state and folder permissions.
#[derive(Default)]
pub struct MemoryDb {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    mailboxes: AHashMap<String, Mailbox>,
    instances: AHashMap<u32, Instance>,
    tables: AHashMap<u32, PropvalRowSet>,
    next_instance_id: u32,
    next_table_id: u32,
}

#[derive(Default)]
struct Mailbox {
    next_cn: u64,
    next_mid: u64,
    messages: AHashMap<u64, MessageRecord>,
    named_props: Vec<PropertyName>,
    named_index: AHashMap<String, u16>,
    folders: AHashMap<u64, Folder>,
    permissions: AHashMap<String, u32>,
    store_props: TpropvalArray,
    replicas: Vec<Guid>,
}

#[derive(Default)]
struct Folder {
    props: TpropvalArray,
    permissions: AHashMap<String, u32>,
}

#[derive(Default)]
struct MessageRecord {
    folder_id: u64,
    content: MessageContent,
    group_id: Option<u32>,
    modified: bool,
    changes: Vec<ChangeRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub change_num: u64,
    pub indices: Vec<u32>,
    pub ungrouped: Vec<u32>,
    pub full: bool,
}

struct Instance {
    dir: String,
    kind: InstanceKind,
    content: MessageContent,
}

enum InstanceKind {
    Message { message_id: u64, folder_id: u64 },
    Embedded { parent: u32, attachment_num: Option<u32> },
}

impl Inner {
    fn mailbox(&mut self, dir: &str) -> &mut Mailbox {
        self.mailboxes.entry(dir.to_string()).or_default()
    }

    fn instance(&mut self, instance_id: u32) -> Result<&mut Instance> {
        self.instances
            .get_mut(&instance_id)
            .ok_or(DbError::Mapi(EcError::NotFound))
    }
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/population helpers outside the RPC surface.
    pub fn create_folder(&self, dir: &str, folder_id: u64, props: TpropvalArray) {
        let mut inner = self.inner.lock();
        inner.mailbox(dir).folders.insert(
            folder_id,
            Folder {
                props,
                permissions: AHashMap::new(),
            },
        );
    }

    pub fn grant_folder_permission(&self, dir: &str, folder_id: u64, username: &str, rights: u32) {
        let mut inner = self.inner.lock();
        if let Some(folder) = inner.mailbox(dir).folders.get_mut(&folder_id) {
            folder.permissions.insert(username.to_lowercase(), rights);
        }
    }

    pub fn grant_mailbox_permission(&self, dir: &str, username: &str, rights: u32) {
        self.inner
            .lock()
            .mailbox(dir)
            .permissions
            .insert(username.to_lowercase(), rights);
    }

    pub fn set_store_property(&self, dir: &str, proptag: u32, value: PropValue) {
        self.inner.lock().mailbox(dir).store_props.set(proptag, value);
    }

    pub fn insert_message(&self, dir: &str, folder_id: u64, message_id: u64, content: MessageContent) {
        let mut inner = self.inner.lock();
        inner.mailbox(dir).messages.insert(
            message_id,
            MessageRecord {
                folder_id,
                content,
                group_id: None,
                modified: false,
                changes: Vec::new(),
            },
        );
    }

    pub fn message_content(&self, dir: &str, message_id: u64) -> Option<MessageContent> {
        self.inner
            .lock()
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.messages.get(&message_id))
            .map(|record| record.content.clone())
    }

    pub fn message_folder(&self, dir: &str, message_id: u64) -> Option<u64> {
        self.inner
            .lock()
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.messages.get(&message_id))
            .map(|record| record.folder_id)
    }

    pub fn change_records(&self, dir: &str, message_id: u64) -> Vec<ChangeRecord> {
        self.inner
            .lock()
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.messages.get(&message_id))
            .map(|record| record.changes.clone())
            .unwrap_or_default()
    }
}

fn set_props(target: &mut TpropvalArray, propvals: &TpropvalArray) -> ProblemArray {
    for pv in propvals.iter() {
        target.set(pv.proptag, pv.value.clone());
    }
    ProblemArray::default()
}

impl PropertyDb for MemoryDb {
    fn allocate_cn(&self, dir: &str) -> Result<u64> {
        let mut inner = self.inner.lock();
        let mailbox = inner.mailbox(dir);
        mailbox.next_cn += 1;
        Ok(mailbox.next_cn)
    }

    fn load_message_instance(
        &self,
        dir: &str,
        _username: Option<&str>,
        _cpid: u32,
        b_new: bool,
        folder_id: u64,
        message_id: u64,
    ) -> Result<u32> {
        let mut inner = self.inner.lock();
        let content = if b_new {
            MessageContent::new()
        } else {
            inner
                .mailboxes
                .get(dir)
                .and_then(|mb| mb.messages.get(&message_id))
                .map(|record| record.content.clone())
                .ok_or(DbError::Mapi(EcError::NotFound))?
        };
        inner.next_instance_id += 1;
        let instance_id = inner.next_instance_id;
        inner.instances.insert(
            instance_id,
            Instance {
                dir: dir.to_string(),
                kind: InstanceKind::Message {
                    message_id,
                    folder_id,
                },
                content,
            },
        );
        Ok(instance_id)
    }

    fn load_embedded_instance(
        &self,
        dir: &str,
        b_new: bool,
        attachment_instance_id: u32,
    ) -> Result<u32> {
        let mut inner = self.inner.lock();
        let parent = inner
            .instances
            .get(&attachment_instance_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        let (content, attachment_num) = if b_new {
            (MessageContent::new(), None)
        } else {
            let (num, embedded) = parent
                .content
                .attachments
                .iter()
                .enumerate()
                .find_map(|(i, at)| at.embedded.as_ref().map(|e| (i as u32, (**e).clone())))
                .ok_or(DbError::Mapi(EcError::NotFound))?;
            (embedded, Some(num))
        };
        inner.next_instance_id += 1;
        let instance_id = inner.next_instance_id;
        inner.instances.insert(
            instance_id,
            Instance {
                dir: dir.to_string(),
                kind: InstanceKind::Embedded {
                    parent: attachment_instance_id,
                    attachment_num,
                },
                content,
            },
        );
        Ok(instance_id)
    }

    fn reload_message_instance(&self, dir: &str, instance_id: u32) -> Result<bool> {
        let mut inner = self.inner.lock();
        let (message_id, target_dir) = match inner.instances.get(&instance_id) {
            Some(instance) => match &instance.kind {
                InstanceKind::Message { message_id, .. } => (*message_id, instance.dir.clone()),
                InstanceKind::Embedded { .. } => return Ok(false),
            },
            None => return Err(DbError::Mapi(EcError::NotFound)),
        };
        debug_assert_eq!(dir, target_dir);
        let content = inner
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.messages.get(&message_id))
            .map(|record| record.content.clone());
        match content {
            Some(content) => {
                inner.instance(instance_id)?.content = content;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear_message_instance(&self, _dir: &str, instance_id: u32) -> Result<()> {
        self.inner.lock().instance(instance_id)?.content = MessageContent::new();
        Ok(())
    }

    fn unload_instance(&self, _dir: &str, instance_id: u32) -> Result<()> {
        self.inner.lock().instances.remove(&instance_id);
        Ok(())
    }

    fn read_message_instance(&self, _dir: &str, instance_id: u32) -> Result<MessageContent> {
        Ok(self.inner.lock().instance(instance_id)?.content.clone())
    }

    fn write_message_instance(
        &self,
        _dir: &str,
        instance_id: u32,
        content: &MessageContent,
        b_force: bool,
    ) -> Result<(ProptagArray, ProblemArray)> {
        let mut inner = self.inner.lock();
        let instance = inner.instance(instance_id)?;
        if b_force {
            instance.content = content.clone();
        } else {
            let target = &mut instance.content;
            set_props(&mut target.proplist, &content.proplist);
            if !content.recipients.is_empty() {
                target.recipients = content.recipients.clone();
            }
            for attachment in &content.attachments {
                target.attachments.push(attachment.clone());
            }
        }
        Ok((content.proplist.proptags(), ProblemArray::default()))
    }

    fn flush_instance(&self, dir: &str, instance_id: u32, _account: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock();
        let instance = inner.instance(instance_id)?;
        let content = instance.content.clone();
        match instance.kind {
            InstanceKind::Message {
                message_id,
                folder_id,
            } => {
                let mailbox = inner.mailbox(dir);
                let record = mailbox.messages.entry(message_id).or_default();
                record.folder_id = folder_id;
                record.content = content;
            }
            InstanceKind::Embedded {
                parent,
                attachment_num,
            } => {
                let parent_instance = inner.instance(parent)?;
                match attachment_num {
                    Some(num) => {
                        if let Some(slot) = parent_instance.content.attachments.get_mut(num as usize)
                        {
                            slot.embedded = Some(Box::new(content));
                        } else {
                            return Err(DbError::Mapi(EcError::NotFound));
                        }
                    }
                    None => parent_instance
                        .content
                        .attachments
                        .push(AttachmentContent::with_embedded(content)),
                }
            }
        }
        Ok(())
    }

    fn get_embedded_cn(&self, _dir: &str, instance_id: u32) -> Result<Option<u64>> {
        Ok(self
            .inner
            .lock()
            .instance(instance_id)?
            .content
            .proplist
            .get_u64(proptag::PR_CHANGE_NUMBER))
    }

    fn check_instance_cycle(
        &self,
        _dir: &str,
        src_instance_id: u32,
        dst_instance_id: u32,
    ) -> Result<bool> {
        let inner = self.inner.lock();
        let mut cursor = Some(dst_instance_id);
        while let Some(id) = cursor {
            if id == src_instance_id {
                return Ok(true);
            }
            cursor = inner.instances.get(&id).and_then(|i| match i.kind {
                InstanceKind::Embedded { parent, .. } => Some(parent),
                InstanceKind::Message { .. } => None,
            });
        }
        Ok(false)
    }

    fn get_instance_all_proptags(&self, _dir: &str, instance_id: u32) -> Result<ProptagArray> {
        Ok(self
            .inner
            .lock()
            .instance(instance_id)?
            .content
            .proplist
            .proptags())
    }

    fn get_instance_property(
        &self,
        _dir: &str,
        instance_id: u32,
        proptag: u32,
    ) -> Result<Option<PropValue>> {
        Ok(self
            .inner
            .lock()
            .instance(instance_id)?
            .content
            .proplist
            .get(proptag)
            .cloned())
    }

    fn get_instance_properties(
        &self,
        _dir: &str,
        instance_id: u32,
        proptags: &ProptagArray,
    ) -> Result<TpropvalArray> {
        let inner = self.inner.lock();
        let instance = inner
            .instances
            .get(&instance_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        Ok(proptags
            .iter()
            .filter_map(|tag| {
                instance
                    .content
                    .proplist
                    .get(tag)
                    .map(|value| TaggedPropval::new(tag, value.clone()))
            })
            .collect())
    }

    fn set_instance_property(
        &self,
        _dir: &str,
        instance_id: u32,
        proptag: u32,
        value: &PropValue,
    ) -> Result<ProblemArray> {
        self.inner
            .lock()
            .instance(instance_id)?
            .content
            .proplist
            .set(proptag, value.clone());
        Ok(ProblemArray::default())
    }

    fn set_instance_properties(
        &self,
        _dir: &str,
        instance_id: u32,
        propvals: &TpropvalArray,
    ) -> Result<ProblemArray> {
        let mut inner = self.inner.lock();
        let instance = inner.instance(instance_id)?;
        Ok(set_props(&mut instance.content.proplist, propvals))
    }

    fn remove_instance_property(
        &self,
        _dir: &str,
        instance_id: u32,
        proptag: u32,
    ) -> Result<ProblemArray> {
        self.inner
            .lock()
            .instance(instance_id)?
            .content
            .proplist
            .remove(proptag);
        Ok(ProblemArray::default())
    }

    fn remove_instance_properties(
        &self,
        _dir: &str,
        instance_id: u32,
        proptags: &ProptagArray,
    ) -> Result<ProblemArray> {
        let mut inner = self.inner.lock();
        let instance = inner.instance(instance_id)?;
        for tag in proptags.iter() {
            instance.content.proplist.remove(tag);
        }
        Ok(ProblemArray::default())
    }

    fn get_message_instance_rcpts_num(&self, _dir: &str, instance_id: u32) -> Result<u16> {
        Ok(self.inner.lock().instance(instance_id)?.content.recipients.len() as u16)
    }

    fn get_message_instance_rcpts_all_proptags(
        &self,
        _dir: &str,
        instance_id: u32,
    ) -> Result<ProptagArray> {
        let mut inner = self.inner.lock();
        let instance = inner.instance(instance_id)?;
        let mut tags = ProptagArray::new();
        for row in &instance.content.recipients {
            for pv in row.iter() {
                tags.append(pv.proptag);
            }
        }
        Ok(tags)
    }

    fn get_message_instance_rcpts(
        &self,
        _dir: &str,
        instance_id: u32,
        row_id: u32,
        need_count: u16,
    ) -> Result<PropvalRowSet> {
        let mut inner = self.inner.lock();
        let instance = inner.instance(instance_id)?;
        Ok(instance
            .content
            .recipients
            .iter()
            .skip(row_id as usize)
            .take(need_count as usize)
            .cloned()
            .collect())
    }

    fn empty_message_instance_rcpts(&self, _dir: &str, instance_id: u32) -> Result<()> {
        self.inner.lock().instance(instance_id)?.content.recipients.clear();
        Ok(())
    }

    fn update_message_instance_rcpts(
        &self,
        _dir: &str,
        instance_id: u32,
        rows: &PropvalRowSet,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let instance = inner.instance(instance_id)?;
        for row in rows {
            let row_id = row.get_u32(proptag::PR_ROWID);
            let existing = row_id.and_then(|id| {
                instance
                    .content
                    .recipients
                    .iter_mut()
                    .find(|r| r.get_u32(proptag::PR_ROWID) == Some(id))
            });
            match existing {
                Some(slot) => *slot = row.clone(),
                None => instance.content.recipients.push(row.clone()),
            }
        }
        Ok(())
    }

    fn get_message_instance_attachments_num(&self, _dir: &str, instance_id: u32) -> Result<u16> {
        Ok(self.inner.lock().instance(instance_id)?.content.attachments.len() as u16)
    }

    fn delete_message_instance_attachment(
        &self,
        _dir: &str,
        instance_id: u32,
        attachment_num: u32,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let instance = inner.instance(instance_id)?;
        if (attachment_num as usize) < instance.content.attachments.len() {
            instance.content.attachments.remove(attachment_num as usize);
            Ok(())
        } else {
            Err(DbError::Mapi(EcError::NotFound))
        }
    }

    fn get_message_instance_attachment_table_all_proptags(
        &self,
        _dir: &str,
        instance_id: u32,
    ) -> Result<ProptagArray> {
        let mut inner = self.inner.lock();
        let instance = inner.instance(instance_id)?;
        let mut tags = ProptagArray::new();
        for attachment in &instance.content.attachments {
            for pv in attachment.proplist.iter() {
                tags.append(pv.proptag);
            }
        }
        Ok(tags)
    }

    fn query_message_instance_attachment_table(
        &self,
        _dir: &str,
        instance_id: u32,
        proptags: &ProptagArray,
        start_pos: u32,
        row_needed: u32,
    ) -> Result<PropvalRowSet> {
        let mut inner = self.inner.lock();
        let instance = inner.instance(instance_id)?;
        Ok(instance
            .content
            .attachments
            .iter()
            .skip(start_pos as usize)
            .take(row_needed as usize)
            .map(|attachment| {
                proptags
                    .iter()
                    .filter_map(|tag| {
                        attachment
                            .proplist
                            .get(tag)
                            .map(|value| TaggedPropval::new(tag, value.clone()))
                    })
                    .collect()
            })
            .collect())
    }

    fn read_message(
        &self,
        dir: &str,
        _username: Option<&str>,
        _cpid: u32,
        message_id: u64,
    ) -> Result<MessageContent> {
        self.inner
            .lock()
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.messages.get(&message_id))
            .map(|record| record.content.clone())
            .ok_or(DbError::Mapi(EcError::NotFound))
    }

    fn write_message(
        &self,
        dir: &str,
        _account: &str,
        _cpid: u32,
        folder_id: u64,
        content: &MessageContent,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let mailbox = inner.mailbox(dir);
        let message_id = content.proplist.get_u64(PR_MID).unwrap_or_else(|| {
            mailbox.next_mid += 1;
            types::entryid::make_eid_ex(1, 0x10_0000 + mailbox.next_mid)
        });
        mailbox.messages.insert(
            message_id,
            MessageRecord {
                folder_id,
                content: content.clone(),
                group_id: None,
                modified: false,
                changes: Vec::new(),
            },
        );
        Ok(())
    }

    fn get_message_brief(
        &self,
        dir: &str,
        _cpid: u32,
        message_id: u64,
    ) -> Result<Option<MessageContent>> {
        Ok(self
            .inner
            .lock()
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.messages.get(&message_id))
            .map(|record| record.content.clone()))
    }

    fn clear_submit(&self, dir: &str, message_id: u64, b_unsent: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .mailbox(dir)
            .messages
            .get_mut(&message_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        let mut flags = record.content.proplist.get_u32(PR_MESSAGE_FLAGS).unwrap_or(0);
        flags &= !MSGFLAG_SUBMITTED;
        if b_unsent {
            flags |= MSGFLAG_UNSENT;
        } else {
            flags &= !MSGFLAG_UNSENT;
        }
        record
            .content
            .proplist
            .set(PR_MESSAGE_FLAGS, PropValue::Long(flags));
        Ok(())
    }

    fn movecopy_message(
        &self,
        dir: &str,
        _account_id: u32,
        _cpid: u32,
        message_id: u64,
        dst_fid: u64,
        dst_id: u64,
        b_move: bool,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let mailbox = inner.mailbox(dir);
        let record = mailbox
            .messages
            .get(&message_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        let mut content = record.content.clone();
        content.proplist.set(PR_MID, PropValue::I8(dst_id));
        if b_move {
            mailbox.messages.remove(&message_id);
        }
        mailbox.messages.insert(
            dst_id,
            MessageRecord {
                folder_id: dst_fid,
                content,
                group_id: None,
                modified: false,
                changes: Vec::new(),
            },
        );
        Ok(())
    }

    fn movecopy_messages(
        &self,
        dir: &str,
        account_id: u32,
        cpid: u32,
        _src_fid: u64,
        dst_fid: u64,
        message_ids: &[u64],
        b_copy: bool,
    ) -> Result<()> {
        for &message_id in message_ids {
            self.movecopy_message(dir, account_id, cpid, message_id, dst_fid, message_id, !b_copy)?;
        }
        Ok(())
    }

    fn delete_message(
        &self,
        dir: &str,
        _account_id: u32,
        _cpid: u32,
        _folder_id: u64,
        message_id: u64,
        _b_hard: bool,
    ) -> Result<()> {
        self.inner.lock().mailbox(dir).messages.remove(&message_id);
        Ok(())
    }

    fn get_message_group_id(&self, dir: &str, message_id: u64) -> Result<Option<u32>> {
        Ok(self
            .inner
            .lock()
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.messages.get(&message_id))
            .and_then(|record| record.group_id))
    }

    fn set_message_group_id(&self, dir: &str, message_id: u64, group_id: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .mailbox(dir)
            .messages
            .get_mut(&message_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        record.group_id = Some(group_id);
        Ok(())
    }

    fn mark_modified(&self, dir: &str, message_id: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .mailbox(dir)
            .messages
            .get_mut(&message_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        record.modified = true;
        let mut flags = record.content.proplist.get_u32(PR_MESSAGE_FLAGS).unwrap_or(0);
        flags &= !types::constants::MSGFLAG_UNMODIFIED;
        record
            .content
            .proplist
            .set(PR_MESSAGE_FLAGS, PropValue::Long(flags));
        Ok(())
    }

    fn save_change_indices(
        &self,
        dir: &str,
        message_id: u64,
        change_num: u64,
        indices: &ProptagArray,
        ungrouped_proptags: &ProptagArray,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .mailbox(dir)
            .messages
            .get_mut(&message_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        record.changes.push(ChangeRecord {
            change_num,
            indices: indices.iter().collect(),
            ungrouped: ungrouped_proptags.iter().collect(),
            full: indices.is_empty() && ungrouped_proptags.is_empty(),
        });
        Ok(())
    }

    fn rule_new_message(
        &self,
        _dir: &str,
        _username: &str,
        _account: &str,
        _cpid: u32,
        _folder_id: u64,
        _message_id: u64,
    ) -> Result<()> {
        Ok(())
    }

    fn set_message_properties(
        &self,
        dir: &str,
        _username: Option<&str>,
        _cpid: u32,
        message_id: u64,
        propvals: &TpropvalArray,
    ) -> Result<ProblemArray> {
        let mut inner = self.inner.lock();
        let record = inner
            .mailbox(dir)
            .messages
            .get_mut(&message_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        Ok(set_props(&mut record.content.proplist, propvals))
    }

    fn set_message_read_state(
        &self,
        dir: &str,
        _username: Option<&str>,
        message_id: u64,
        mark_as_read: bool,
    ) -> Result<u64> {
        let mut inner = self.inner.lock();
        let mailbox = inner.mailbox(dir);
        mailbox.next_cn += 1;
        let read_cn = mailbox.next_cn;
        let record = mailbox
            .messages
            .get_mut(&message_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        record
            .content
            .proplist
            .set(PR_READ, PropValue::Bool(mark_as_read));
        let mut flags = record.content.proplist.get_u32(PR_MESSAGE_FLAGS).unwrap_or(0);
        if mark_as_read {
            flags |= types::constants::MSGFLAG_READ;
        } else {
            flags &= !types::constants::MSGFLAG_READ;
        }
        record
            .content
            .proplist
            .set(PR_MESSAGE_FLAGS, PropValue::Long(flags));
        Ok(read_cn)
    }

    fn get_named_propids(
        &self,
        dir: &str,
        b_create: bool,
        names: &[PropertyName],
    ) -> Result<Vec<u16>> {
        let mut inner = self.inner.lock();
        let mailbox = inner.mailbox(dir);
        let mut propids = Vec::with_capacity(names.len());
        for name in names {
            let key = name.to_key();
            if let Some(&propid) = mailbox.named_index.get(&key) {
                propids.push(propid);
            } else if b_create {
                let propid = 0x8000 + mailbox.named_props.len() as u16;
                mailbox.named_props.push(name.clone());
                mailbox.named_index.insert(key, propid);
                propids.push(propid);
            } else {
                propids.push(0);
            }
        }
        Ok(propids)
    }

    fn get_named_propnames(
        &self,
        dir: &str,
        propids: &[u16],
    ) -> Result<Vec<Option<PropertyName>>> {
        let inner = self.inner.lock();
        let mailbox = inner.mailboxes.get(dir);
        Ok(propids
            .iter()
            .map(|&propid| {
                mailbox.and_then(|mb| {
                    propid
                        .checked_sub(0x8000)
                        .and_then(|index| mb.named_props.get(index as usize).cloned())
                })
            })
            .collect())
    }

    fn get_store_all_proptags(&self, dir: &str) -> Result<ProptagArray> {
        Ok(self
            .inner
            .lock()
            .mailboxes
            .get(dir)
            .map(|mb| mb.store_props.proptags())
            .unwrap_or_default())
    }

    fn get_store_properties(
        &self,
        dir: &str,
        _cpid: u32,
        proptags: &ProptagArray,
    ) -> Result<TpropvalArray> {
        let inner = self.inner.lock();
        let store_props = inner.mailboxes.get(dir).map(|mb| &mb.store_props);
        Ok(proptags
            .iter()
            .filter_map(|tag| {
                store_props
                    .and_then(|props| props.get(tag))
                    .map(|value| TaggedPropval::new(tag, value.clone()))
            })
            .collect())
    }

    fn check_mailbox_permission(&self, dir: &str, username: &str) -> Result<u32> {
        Ok(self
            .inner
            .lock()
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.permissions.get(&username.to_lowercase()).copied())
            .unwrap_or(0))
    }

    fn check_folder_permission(&self, dir: &str, folder_id: u64, username: &str) -> Result<u32> {
        Ok(self
            .inner
            .lock()
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.folders.get(&folder_id))
            .and_then(|folder| folder.permissions.get(&username.to_lowercase()).copied())
            .unwrap_or(0))
    }

    fn update_folder_permission(
        &self,
        dir: &str,
        folder_id: u64,
        _b_freebusy: bool,
        rows: &[PermissionData],
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let folder = inner
            .mailbox(dir)
            .folders
            .get_mut(&folder_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        for row in rows {
            let member = row
                .propvals
                .get_str(PR_MEMBER_NAME)
                .or_else(|| row.propvals.get_str(proptag::PR_SMTP_ADDRESS))
                .unwrap_or_default()
                .to_lowercase();
            match row.flags {
                crate::PERMISSION_DATA_FLAG_REMOVE_ROW => {
                    folder.permissions.remove(&member);
                }
                _ => {
                    let rights = row.propvals.get_u32(PR_MEMBER_RIGHTS).unwrap_or(0);
                    folder.permissions.insert(member, rights);
                }
            }
        }
        Ok(())
    }

    fn get_folder_all_proptags(&self, dir: &str, folder_id: u64) -> Result<ProptagArray> {
        Ok(self
            .inner
            .lock()
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.folders.get(&folder_id))
            .map(|folder| folder.props.proptags())
            .unwrap_or_default())
    }

    fn get_folder_properties(
        &self,
        dir: &str,
        _cpid: u32,
        folder_id: u64,
        proptags: &ProptagArray,
    ) -> Result<TpropvalArray> {
        let inner = self.inner.lock();
        let folder = inner
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.folders.get(&folder_id));
        Ok(proptags
            .iter()
            .filter_map(|tag| {
                folder
                    .and_then(|f| f.props.get(tag))
                    .map(|value| TaggedPropval::new(tag, value.clone()))
            })
            .collect())
    }

    fn set_folder_properties(
        &self,
        dir: &str,
        _cpid: u32,
        folder_id: u64,
        propvals: &TpropvalArray,
    ) -> Result<ProblemArray> {
        let mut inner = self.inner.lock();
        let folder = inner
            .mailbox(dir)
            .folders
            .get_mut(&folder_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        Ok(set_props(&mut folder.props, propvals))
    }

    fn create_folder_by_properties(
        &self,
        dir: &str,
        _cpid: u32,
        propvals: &TpropvalArray,
    ) -> Result<u64> {
        let mut inner = self.inner.lock();
        let mailbox = inner.mailbox(dir);
        mailbox.next_mid += 1;
        let folder_id = types::entryid::make_eid_ex(1, 0x20_0000 + mailbox.next_mid);
        mailbox.folders.insert(
            folder_id,
            Folder {
                props: propvals.clone(),
                permissions: AHashMap::new(),
            },
        );
        Ok(folder_id)
    }

    fn load_hierarchy_table(
        &self,
        dir: &str,
        _folder_id: u64,
        _username: Option<&str>,
        _table_flags: u32,
    ) -> Result<(u32, u32)> {
        let mut inner = self.inner.lock();
        let rows: PropvalRowSet = inner
            .mailboxes
            .get(dir)
            .map(|mb| {
                mb.folders
                    .keys()
                    .map(|&fid| {
                        [TaggedPropval::new(proptag::PR_FOLDER_ID, PropValue::I8(fid))]
                            .into_iter()
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();
        inner.next_table_id += 1;
        let table_id = inner.next_table_id;
        let count = rows.len() as u32;
        inner.tables.insert(table_id, rows);
        Ok((table_id, count))
    }

    fn load_content_table(
        &self,
        dir: &str,
        _cpid: u32,
        folder_id: u64,
        _username: Option<&str>,
        _table_flags: u32,
    ) -> Result<(u32, u32)> {
        let mut inner = self.inner.lock();
        let rows: PropvalRowSet = inner
            .mailboxes
            .get(dir)
            .map(|mb| {
                mb.messages
                    .iter()
                    .filter(|(_, record)| record.folder_id == folder_id)
                    .map(|(&mid, _)| {
                        [TaggedPropval::new(PR_MID, PropValue::I8(mid))]
                            .into_iter()
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();
        inner.next_table_id += 1;
        let table_id = inner.next_table_id;
        let count = rows.len() as u32;
        inner.tables.insert(table_id, rows);
        Ok((table_id, count))
    }

    fn load_permission_table(
        &self,
        dir: &str,
        folder_id: u64,
        _table_flags: u32,
    ) -> Result<(u32, u32)> {
        let mut inner = self.inner.lock();
        let rows: PropvalRowSet = inner
            .mailboxes
            .get(dir)
            .and_then(|mb| mb.folders.get(&folder_id))
            .map(|folder| {
                folder
                    .permissions
                    .iter()
                    .map(|(member, &rights)| {
                        [
                            TaggedPropval::new(
                                PR_MEMBER_NAME,
                                PropValue::Unicode(member.clone()),
                            ),
                            TaggedPropval::new(
                                proptag::PR_SMTP_ADDRESS,
                                PropValue::Unicode(member.clone()),
                            ),
                            TaggedPropval::new(PR_MEMBER_RIGHTS, PropValue::Long(rights)),
                        ]
                        .into_iter()
                        .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();
        inner.next_table_id += 1;
        let table_id = inner.next_table_id;
        let count = rows.len() as u32;
        inner.tables.insert(table_id, rows);
        Ok((table_id, count))
    }

    fn query_table(
        &self,
        _dir: &str,
        _username: Option<&str>,
        _cpid: u32,
        table_id: u32,
        proptags: &ProptagArray,
        start_pos: u32,
        row_needed: u32,
    ) -> Result<PropvalRowSet> {
        let inner = self.inner.lock();
        let rows = inner
            .tables
            .get(&table_id)
            .ok_or(DbError::Mapi(EcError::NotFound))?;
        Ok(rows
            .iter()
            .skip(start_pos as usize)
            .take(row_needed as usize)
            .map(|row| {
                proptags
                    .iter()
                    .filter_map(|tag| {
                        row.get(tag)
                            .map(|value| TaggedPropval::new(tag, value.clone()))
                    })
                    .collect()
            })
            .collect())
    }

    fn unload_table(&self, _dir: &str, table_id: u32) -> Result<()> {
        self.inner.lock().tables.remove(&table_id);
        Ok(())
    }

    fn get_mapping_guid(&self, dir: &str, replid: u16) -> Result<Option<Guid>> {
        Ok(self
            .inner
            .lock()
            .mailboxes
            .get(dir)
            .and_then(|mb| replid.checked_sub(1).map(|i| (mb, i)))
            .and_then(|(mb, index)| mb.replicas.get(index as usize).copied()))
    }

    fn get_mapping_replid(&self, dir: &str, guid: Guid) -> Result<Option<u16>> {
        let mut inner = self.inner.lock();
        let mailbox = inner.mailbox(dir);
        if let Some(pos) = mailbox.replicas.iter().position(|&g| g == guid) {
            return Ok(Some(pos as u16 + 1));
        }
        mailbox.replicas.push(guid);
        Ok(Some(mailbox.replicas.len() as u16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_numbers_are_monotonic() {
        let db = MemoryDb::new();
        let first = db.allocate_cn("/var/mail/a").unwrap();
        let second = db.allocate_cn("/var/mail/a").unwrap();
        assert!(second > first);
        // independent per mailbox
        assert_eq!(db.allocate_cn("/var/mail/b").unwrap(), first);
    }

    #[test]
    fn instance_flush_persists() {
        let db = MemoryDb::new();
        let dir = "/var/mail/a";
        let mid = types::entryid::make_eid_ex(1, 0x99);
        let instance = db.load_message_instance(dir, None, 65001, true, 0x0d, mid).unwrap();
        db.set_instance_property(
            dir,
            instance,
            proptag::PR_SUBJECT,
            &PropValue::Unicode("Hi".into()),
        )
        .unwrap();
        db.flush_instance(dir, instance, None).unwrap();
        let content = db.message_content(dir, mid).unwrap();
        assert_eq!(content.proplist.get_str(proptag::PR_SUBJECT), Some("Hi"));
    }

    #[test]
    fn named_props_allocate_from_8000() {
        let db = MemoryDb::new();
        let guid = Guid::from_str("00062002-0000-0000-c000-000000000046").unwrap();
        let name = PropertyName::by_id(guid, 0x820d);
        let ids = db.get_named_propids("/m", true, std::slice::from_ref(&name)).unwrap();
        assert_eq!(ids, vec![0x8000]);
        // stable on re-resolution
        let ids2 = db.get_named_propids("/m", false, std::slice::from_ref(&name)).unwrap();
        assert_eq!(ids2, vec![0x8000]);
        let names = db.get_named_propnames("/m", &[0x8000, 0x9000]).unwrap();
        assert_eq!(names[0].as_ref(), Some(&name));
        assert_eq!(names[1], None);
    }

    #[test]
    fn embedded_instance_flush() {
        let db = MemoryDb::new();
        let dir = "/m";
        let parent = db.load_message_instance(dir, None, 65001, true, 0x0d, 0).unwrap();
        let embedded = db.load_embedded_instance(dir, true, parent).unwrap();
        db.set_instance_property(dir, embedded, proptag::PR_SUBJECT, &PropValue::Unicode("e".into()))
            .unwrap();
        db.flush_instance(dir, embedded, None).unwrap();
        let content = db.read_message_instance(dir, parent).unwrap();
        assert_eq!(content.attachments.len(), 1);
        assert_eq!(
            content.attachments[0]
                .embedded
                .as_ref()
                .unwrap()
                .proplist
                .get_str(proptag::PR_SUBJECT),
            Some("e")
        );
    }
}

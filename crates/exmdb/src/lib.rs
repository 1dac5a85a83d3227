/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod memory;

use types::{
    EcError, Guid, ProblemArray, PropValue, PropertyName, ProptagArray, TpropvalArray,
    content::MessageContent, value::PropvalRowSet,
};

/// Failure surface of the remote property database. In-band MAPI errors
/// are carried verbatim; `Transport` covers the RPC channel itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    #[error("property database call failed")]
    Transport,
    #[error(transparent)]
    Mapi(#[from] EcError),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// A permission-table mutation row.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionData {
    pub flags: u32,
    pub propvals: TpropvalArray,
}

pub const PERMISSION_DATA_FLAG_ADD_ROW: u32 = 0x1;
pub const PERMISSION_DATA_FLAG_MODIFY_ROW: u32 = 0x2;
pub const PERMISSION_DATA_FLAG_REMOVE_ROW: u32 = 0x4;

pub const TABLE_FLAG_ASSOCIATED: u32 = 0x2;
pub const TABLE_FLAG_DEPTH: u32 = 0x4;

/// The enumerated RPC surface of the mailbox property database. Every
/// method addresses one mailbox by its directory path; errors come back
/// verbatim and are never retried here.
#[allow(clippy::too_many_arguments)]
pub trait PropertyDb: Send + Sync {
    // Change numbers.
    fn allocate_cn(&self, dir: &str) -> Result<u64>;

    // Instances.
    fn load_message_instance(
        &self,
        dir: &str,
        username: Option<&str>,
        cpid: u32,
        b_new: bool,
        folder_id: u64,
        message_id: u64,
    ) -> Result<u32>;
    fn load_embedded_instance(&self, dir: &str, b_new: bool, attachment_instance_id: u32)
    -> Result<u32>;
    fn reload_message_instance(&self, dir: &str, instance_id: u32) -> Result<bool>;
    fn clear_message_instance(&self, dir: &str, instance_id: u32) -> Result<()>;
    fn unload_instance(&self, dir: &str, instance_id: u32) -> Result<()>;
    fn read_message_instance(&self, dir: &str, instance_id: u32) -> Result<MessageContent>;
    fn write_message_instance(
        &self,
        dir: &str,
        instance_id: u32,
        content: &MessageContent,
        b_force: bool,
    ) -> Result<(ProptagArray, ProblemArray)>;
    /// Commit the instance; the nested error is the database's own verdict
    /// and is handed to the caller untouched.
    fn flush_instance(&self, dir: &str, instance_id: u32, account: Option<&str>) -> Result<()>;
    fn get_embedded_cn(&self, dir: &str, instance_id: u32) -> Result<Option<u64>>;
    fn check_instance_cycle(&self, dir: &str, src_instance_id: u32, dst_instance_id: u32)
    -> Result<bool>;

    // Instance properties.
    fn get_instance_all_proptags(&self, dir: &str, instance_id: u32) -> Result<ProptagArray>;
    fn get_instance_property(
        &self,
        dir: &str,
        instance_id: u32,
        proptag: u32,
    ) -> Result<Option<PropValue>>;
    fn get_instance_properties(
        &self,
        dir: &str,
        instance_id: u32,
        proptags: &ProptagArray,
    ) -> Result<TpropvalArray>;
    fn set_instance_property(
        &self,
        dir: &str,
        instance_id: u32,
        proptag: u32,
        value: &PropValue,
    ) -> Result<ProblemArray>;
    fn set_instance_properties(
        &self,
        dir: &str,
        instance_id: u32,
        propvals: &TpropvalArray,
    ) -> Result<ProblemArray>;
    fn remove_instance_property(&self, dir: &str, instance_id: u32, proptag: u32)
    -> Result<ProblemArray>;
    fn remove_instance_properties(
        &self,
        dir: &str,
        instance_id: u32,
        proptags: &ProptagArray,
    ) -> Result<ProblemArray>;

    // Instance recipients.
    fn get_message_instance_rcpts_num(&self, dir: &str, instance_id: u32) -> Result<u16>;
    fn get_message_instance_rcpts_all_proptags(
        &self,
        dir: &str,
        instance_id: u32,
    ) -> Result<ProptagArray>;
    fn get_message_instance_rcpts(
        &self,
        dir: &str,
        instance_id: u32,
        row_id: u32,
        need_count: u16,
    ) -> Result<PropvalRowSet>;
    fn empty_message_instance_rcpts(&self, dir: &str, instance_id: u32) -> Result<()>;
    fn update_message_instance_rcpts(
        &self,
        dir: &str,
        instance_id: u32,
        rows: &PropvalRowSet,
    ) -> Result<()>;

    // Instance attachments.
    fn get_message_instance_attachments_num(&self, dir: &str, instance_id: u32) -> Result<u16>;
    fn delete_message_instance_attachment(
        &self,
        dir: &str,
        instance_id: u32,
        attachment_num: u32,
    ) -> Result<()>;
    fn get_message_instance_attachment_table_all_proptags(
        &self,
        dir: &str,
        instance_id: u32,
    ) -> Result<ProptagArray>;
    fn query_message_instance_attachment_table(
        &self,
        dir: &str,
        instance_id: u32,
        proptags: &ProptagArray,
        start_pos: u32,
        row_needed: u32,
    ) -> Result<PropvalRowSet>;

    // Messages.
    fn read_message(
        &self,
        dir: &str,
        username: Option<&str>,
        cpid: u32,
        message_id: u64,
    ) -> Result<MessageContent>;
    fn write_message(
        &self,
        dir: &str,
        account: &str,
        cpid: u32,
        folder_id: u64,
        content: &MessageContent,
    ) -> Result<()>;
    fn get_message_brief(&self, dir: &str, cpid: u32, message_id: u64)
    -> Result<Option<MessageContent>>;
    fn clear_submit(&self, dir: &str, message_id: u64, b_unsent: bool) -> Result<()>;
    fn movecopy_message(
        &self,
        dir: &str,
        account_id: u32,
        cpid: u32,
        message_id: u64,
        dst_fid: u64,
        dst_id: u64,
        b_move: bool,
    ) -> Result<()>;
    fn movecopy_messages(
        &self,
        dir: &str,
        account_id: u32,
        cpid: u32,
        src_fid: u64,
        dst_fid: u64,
        message_ids: &[u64],
        b_copy: bool,
    ) -> Result<()>;
    fn delete_message(
        &self,
        dir: &str,
        account_id: u32,
        cpid: u32,
        folder_id: u64,
        message_id: u64,
        b_hard: bool,
    ) -> Result<()>;
    fn get_message_group_id(&self, dir: &str, message_id: u64) -> Result<Option<u32>>;
    fn set_message_group_id(&self, dir: &str, message_id: u64, group_id: u32) -> Result<()>;
    fn mark_modified(&self, dir: &str, message_id: u64) -> Result<()>;
    /// Record a change: `indices` lists the dirty partial groups, or is
    /// empty together with `ungrouped_proptags` to force a full change.
    fn save_change_indices(
        &self,
        dir: &str,
        message_id: u64,
        change_num: u64,
        indices: &ProptagArray,
        ungrouped_proptags: &ProptagArray,
    ) -> Result<()>;
    fn rule_new_message(
        &self,
        dir: &str,
        username: &str,
        account: &str,
        cpid: u32,
        folder_id: u64,
        message_id: u64,
    ) -> Result<()>;
    fn set_message_properties(
        &self,
        dir: &str,
        username: Option<&str>,
        cpid: u32,
        message_id: u64,
        propvals: &TpropvalArray,
    ) -> Result<ProblemArray>;
    /// Persist the read state; returns the read change number.
    fn set_message_read_state(
        &self,
        dir: &str,
        username: Option<&str>,
        message_id: u64,
        mark_as_read: bool,
    ) -> Result<u64>;

    // Named properties.
    fn get_named_propids(
        &self,
        dir: &str,
        b_create: bool,
        names: &[PropertyName],
    ) -> Result<Vec<u16>>;
    fn get_named_propnames(&self, dir: &str, propids: &[u16])
    -> Result<Vec<Option<PropertyName>>>;

    // Store properties.
    fn get_store_all_proptags(&self, dir: &str) -> Result<ProptagArray>;
    fn get_store_properties(
        &self,
        dir: &str,
        cpid: u32,
        proptags: &ProptagArray,
    ) -> Result<TpropvalArray>;

    // Permissions.
    fn check_mailbox_permission(&self, dir: &str, username: &str) -> Result<u32>;
    fn check_folder_permission(&self, dir: &str, folder_id: u64, username: &str) -> Result<u32>;
    fn update_folder_permission(
        &self,
        dir: &str,
        folder_id: u64,
        b_freebusy: bool,
        rows: &[PermissionData],
    ) -> Result<()>;

    // Folders.
    fn get_folder_all_proptags(&self, dir: &str, folder_id: u64) -> Result<ProptagArray>;
    fn get_folder_properties(
        &self,
        dir: &str,
        cpid: u32,
        folder_id: u64,
        proptags: &ProptagArray,
    ) -> Result<TpropvalArray>;
    fn set_folder_properties(
        &self,
        dir: &str,
        cpid: u32,
        folder_id: u64,
        propvals: &TpropvalArray,
    ) -> Result<ProblemArray>;
    fn create_folder_by_properties(
        &self,
        dir: &str,
        cpid: u32,
        propvals: &TpropvalArray,
    ) -> Result<u64>;

    // Tables.
    fn load_hierarchy_table(
        &self,
        dir: &str,
        folder_id: u64,
        username: Option<&str>,
        table_flags: u32,
    ) -> Result<(u32, u32)>;
    fn load_content_table(
        &self,
        dir: &str,
        cpid: u32,
        folder_id: u64,
        username: Option<&str>,
        table_flags: u32,
    ) -> Result<(u32, u32)>;
    fn load_permission_table(&self, dir: &str, folder_id: u64, table_flags: u32)
    -> Result<(u32, u32)>;
    fn query_table(
        &self,
        dir: &str,
        username: Option<&str>,
        cpid: u32,
        table_id: u32,
        proptags: &ProptagArray,
        start_pos: u32,
        row_needed: u32,
    ) -> Result<PropvalRowSet>;
    fn unload_table(&self, dir: &str, table_id: u32) -> Result<()>;

    // Replica mapping.
    fn get_mapping_guid(&self, dir: &str, replid: u16) -> Result<Option<Guid>>;
    fn get_mapping_replid(&self, dir: &str, guid: Guid) -> Result<Option<u16>>;
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Mailbox language changes rename the sixteen well-known IPM folders.

use crate::Result;
use directory::lang::{FolderName, folder_name};
use exmdb::PropertyDb;
use tracing::warn;
use types::{
    PropValue, TaggedPropval, TpropvalArray,
    constants::*,
    entryid::make_eid_ex,
    proptag::PR_DISPLAY_NAME,
};

const RENAMES: [(FolderName, u64); 16] = [
    (FolderName::Ipm, PRIVATE_FID_IPMSUBTREE),
    (FolderName::Inbox, PRIVATE_FID_INBOX),
    (FolderName::Draft, PRIVATE_FID_DRAFT),
    (FolderName::Outbox, PRIVATE_FID_OUTBOX),
    (FolderName::Sent, PRIVATE_FID_SENT_ITEMS),
    (FolderName::Deleted, PRIVATE_FID_DELETED_ITEMS),
    (FolderName::Contacts, PRIVATE_FID_CONTACTS),
    (FolderName::Calendar, PRIVATE_FID_CALENDAR),
    (FolderName::Journal, PRIVATE_FID_JOURNAL),
    (FolderName::Notes, PRIVATE_FID_NOTES),
    (FolderName::Tasks, PRIVATE_FID_TASKS),
    (FolderName::Junk, PRIVATE_FID_JUNK),
    (FolderName::SyncIssues, PRIVATE_FID_SYNC_ISSUES),
    (FolderName::Conflicts, PRIVATE_FID_CONFLICTS),
    (FolderName::LocalFailures, PRIVATE_FID_LOCAL_FAILURES),
    (FolderName::ServerFailures, PRIVATE_FID_SERVER_FAILURES),
];

/// Rewrite the localized display names of the well-known folders. Only
/// the folder names depend on the store; pinning the locale itself is
/// the caller's decision (it is skipped for public stores).
pub fn rename_folders(db: &dyn PropertyDb, dir: &str, locale: &str) -> Result<()> {
    for (folder, folder_id) in RENAMES {
        let name = folder_name(locale, folder);
        let propvals: TpropvalArray =
            [TaggedPropval::new(PR_DISPLAY_NAME, PropValue::Unicode(name.to_string()))]
                .into_iter()
                .collect();
        if let Err(err) =
            db.set_folder_properties(dir, types::codepage::CP_UTF8, make_eid_ex(1, folder_id), &propvals)
        {
            warn!(dir, folder_id, %err, "folder rename failed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exmdb::memory::MemoryDb;

    #[test]
    fn renames_well_known_folders() {
        let db = MemoryDb::new();
        for (_, fid) in RENAMES {
            db.create_folder("/m", make_eid_ex(1, fid), TpropvalArray::new());
        }
        rename_folders(&db, "/m", "de_DE.UTF-8").unwrap();
        let tags: types::ProptagArray = [PR_DISPLAY_NAME].into_iter().collect();
        let props = db
            .get_folder_properties("/m", 65001, make_eid_ex(1, PRIVATE_FID_INBOX), &tags)
            .unwrap();
        assert_eq!(props.get_str(PR_DISPLAY_NAME), Some("Posteingang"));
    }
}

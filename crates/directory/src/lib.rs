/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod lang;
pub mod memory;

use ahash::AHashMap;
use types::constants::{DisplayType, MlistType};

/// One row of the user table as the address book consumes it. The
/// `propvals` map carries directory-sourced MAPI properties as display
/// strings keyed by proptag.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryUser {
    pub id: u32,
    pub username: String,
    pub dtypx: DisplayType,
    pub list_type: MlistType,
    pub list_priv: u32,
    pub maildir: String,
    pub lang: String,
    pub timezone: String,
    pub aliases: Vec<String>,
    pub propvals: AHashMap<u32, String>,
}

impl DirectoryUser {
    pub fn new(id: u32, username: impl Into<String>) -> Self {
        DirectoryUser {
            id,
            username: username.into(),
            dtypx: DisplayType::MailUser,
            list_type: MlistType::Normal,
            list_priv: 0,
            maildir: String::new(),
            lang: String::new(),
            timezone: String::new(),
            aliases: Vec::new(),
            propvals: AHashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    pub id: u32,
    pub name: String,
    pub title: String,
    pub address: String,
    pub homedir: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: u32,
    pub name: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub child_id: u32,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("directory backend failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// The query surface the core needs from the SQL directory. Every call
/// maps onto one enumerated backend query; failures abort the caller's
/// current operation and are never retried here.
pub trait Directory: Send + Sync {
    fn get_org_domains(&self, org_id: u32) -> Result<Vec<u32>>;
    fn get_domain_info(&self, domain_id: u32) -> Result<DomainInfo>;
    fn get_domain_groups(&self, domain_id: u32) -> Result<Vec<GroupInfo>>;
    fn get_group_classes(&self, group_id: u32) -> Result<Vec<ClassInfo>>;
    fn get_sub_classes(&self, class_id: u32) -> Result<Vec<ClassInfo>>;
    fn get_class_users(&self, class_id: u32) -> Result<Vec<DirectoryUser>>;
    fn get_group_users(&self, group_id: u32) -> Result<Vec<DirectoryUser>>;
    fn get_domain_users(&self, domain_id: u32) -> Result<Vec<DirectoryUser>>;
    /// The owning `(group_id, domain_id)` of a mailing list account.
    fn get_mlist_ids(&self, user_id: u32) -> Result<(u32, u32)>;
    fn get_user_ids(&self, username: &str) -> Result<(u32, u32, DisplayType)>;
    fn get_domain_ids(&self, domain_name: &str) -> Result<(u32, u32)>;
    fn get_username_from_id(&self, user_id: u32) -> Result<String>;
    fn get_user_displayname(&self, username: &str) -> Result<String>;
    fn get_maildir(&self, username: &str) -> Result<String>;
    fn get_homedir(&self, domain_name: &str) -> Result<String>;
    fn get_timezone(&self, username: &str) -> Result<String>;
    fn set_timezone(&self, username: &str, timezone: &str) -> Result<()>;
    fn get_user_lang(&self, username: &str) -> Result<String>;
    fn set_user_lang(&self, username: &str, lang: &str) -> Result<()>;
    fn get_user_privilege_bits(&self, username: &str) -> Result<u32>;
    fn check_mlist_include(&self, list_address: &str, account: &str) -> Result<bool>;
    fn check_same_org(&self, domain_id1: u32, domain_id2: u32) -> Result<bool>;
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod lang;
pub mod message;
pub mod oof;
pub mod send;
pub mod store;

use types::EcError;

/// The caller identity a front-end session carries into store and
/// message operations.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub username: String,
    pub user_id: u32,
    pub domain_id: u32,
    pub cpid: u32,
    pub lang: String,
    pub org_name: String,
    pub hostname: String,
}

impl SessionInfo {
    pub fn new(username: impl Into<String>, user_id: u32, domain_id: u32) -> Self {
        SessionInfo {
            username: username.into(),
            user_id,
            domain_id,
            cpid: types::codepage::CP_UTF8,
            lang: "en_US.UTF-8".to_string(),
            org_name: "first organization".to_string(),
            hostname: "localhost".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EcError>;

pub(crate) fn db_err(err: exmdb::DbError) -> EcError {
    match err {
        exmdb::DbError::Transport => EcError::CallFailed,
        exmdb::DbError::Mapi(ec) => ec,
    }
}

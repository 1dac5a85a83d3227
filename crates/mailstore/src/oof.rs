/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Out-of-office state, backed by `config/autoreply.cfg` and the two
//! reply-body fragments in the mailbox directory.

use mail_parser::MessageParser;
use std::path::{Path, PathBuf};
use types::{PropValue, proptag::*, time::unix_to_nttime};
use utils::config::ConfigFile;

const DEFAULT_PREAMBLE: &str = "Content-Type: text/html;\r\n\tcharset=\"utf-8\"";

fn config_path(maildir: &str) -> PathBuf {
    Path::new(maildir).join("config").join("autoreply.cfg")
}

fn reply_path(maildir: &str, external: bool) -> PathBuf {
    Path::new(maildir).join("config").join(if external {
        "external-reply"
    } else {
        "internal-reply"
    })
}

fn read_config(maildir: &str) -> Option<ConfigFile> {
    ConfigFile::read(config_path(maildir)).ok()
}

fn split_fragment(raw: &[u8]) -> (Option<&[u8]>, &[u8]) {
    match raw.windows(4).position(|window| window == b"\r\n\r\n") {
        Some(pos) => (Some(&raw[..pos]), &raw[pos + 4..]),
        None => (None, raw),
    }
}

fn reply_body(maildir: &str, external: bool) -> Option<String> {
    let raw = std::fs::read(reply_path(maildir, external)).ok()?;
    let (_preamble, body) = split_fragment(&raw);
    Some(String::from_utf8_lossy(body).into_owned())
}

fn reply_subject(maildir: &str, external: bool) -> Option<String> {
    let raw = std::fs::read(reply_path(maildir, external)).ok()?;
    MessageParser::default()
        .parse(&raw)
        .and_then(|message| message.subject().map(|subject| subject.to_string()))
}

/// Read one OOF-backed property; `None` when the backing file or key is
/// absent.
pub fn get_oof_property(maildir: &str, proptag: u32) -> Option<PropValue> {
    match proptag {
        PR_OOF_STATE => {
            let state = read_config(maildir)
                .and_then(|config| config.property::<u32>("OOF_STATE").ok().flatten())
                .filter(|&state| state <= 2)
                .unwrap_or(0);
            Some(PropValue::Long(state))
        }
        PR_EC_OUTOFOFFICE_MSG => reply_body(maildir, false).map(PropValue::Unicode),
        PR_EC_EXTERNAL_REPLY => reply_body(maildir, true).map(PropValue::Unicode),
        PR_EC_OUTOFOFFICE_SUBJECT => reply_subject(maildir, false).map(PropValue::Unicode),
        PR_EC_EXTERNAL_SUBJECT => reply_subject(maildir, true).map(PropValue::Unicode),
        PR_EC_OUTOFOFFICE_FROM | PR_EC_OUTOFOFFICE_UNTIL => {
            let key = if proptag == PR_EC_OUTOFOFFICE_FROM {
                "START_TIME"
            } else {
                "END_TIME"
            };
            read_config(maildir)
                .and_then(|config| config.property::<i64>(key).ok().flatten())
                .map(|seconds| PropValue::NtTime(unix_to_nttime(seconds)))
        }
        PR_EC_ALLOW_EXTERNAL | PR_EC_EXTERNAL_AUDIENCE => {
            let key = if proptag == PR_EC_ALLOW_EXTERNAL {
                "ALLOW_EXTERNAL_OOF"
            } else {
                "EXTERNAL_AUDIENCE"
            };
            let value = read_config(maildir)
                .and_then(|config| config.property::<u32>(key).ok().flatten())
                .unwrap_or(0);
            Some(PropValue::Bool(value != 0))
        }
        _ => None,
    }
}

fn write_config_key(maildir: &str, key: &str, value: &str) -> std::io::Result<()> {
    let path = config_path(maildir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut config = ConfigFile::read(&path).unwrap_or_default();
    config.set(key, value);
    config.write_to(&path)
}

/// Replace the body of a reply fragment, keeping an existing preamble.
fn write_reply_body(maildir: &str, external: bool, body: &str) -> std::io::Result<()> {
    let path = reply_path(maildir, external);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let preamble = std::fs::read(&path)
        .ok()
        .and_then(|raw| {
            split_fragment(&raw)
                .0
                .map(|preamble| String::from_utf8_lossy(preamble).into_owned())
        })
        .unwrap_or_else(|| DEFAULT_PREAMBLE.to_string());
    std::fs::write(&path, format!("{preamble}\r\n\r\n{body}"))
}

/// Rewrite the Subject header of a reply fragment, preserving the other
/// headers and the body.
fn write_reply_subject(maildir: &str, external: bool, subject: &str) -> std::io::Result<()> {
    let path = reply_path(maildir, external);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = std::fs::read(&path).unwrap_or_default();
    let (preamble, body) = split_fragment(&raw);
    let mut headers: Vec<String> = preamble
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_else(|| DEFAULT_PREAMBLE.to_string())
        .lines()
        .filter(|line| {
            !line
                .get(..8)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("subject:"))
        })
        .map(str::to_string)
        .collect();
    headers.push(format!("Subject: {subject}"));
    let body = String::from_utf8_lossy(body).into_owned();
    std::fs::write(&path, format!("{}\r\n\r\n{}", headers.join("\r\n"), body))
}

/// Write one OOF-backed property; unknown tags are ignored by the caller
/// before getting here.
pub fn set_oof_property(maildir: &str, proptag: u32, value: &PropValue) -> std::io::Result<bool> {
    match proptag {
        PR_OOF_STATE => {
            let state = value.as_u32().unwrap_or(0).min(2);
            write_config_key(maildir, "OOF_STATE", &state.to_string())?;
        }
        PR_EC_OUTOFOFFICE_FROM | PR_EC_OUTOFOFFICE_UNTIL => {
            let key = if proptag == PR_EC_OUTOFOFFICE_FROM {
                "START_TIME"
            } else {
                "END_TIME"
            };
            let seconds = value
                .as_u64()
                .map(|nt| types::time::nttime_to_unix(nt))
                .unwrap_or(0);
            write_config_key(maildir, key, &seconds.to_string())?;
        }
        PR_EC_ALLOW_EXTERNAL | PR_EC_EXTERNAL_AUDIENCE => {
            let key = if proptag == PR_EC_ALLOW_EXTERNAL {
                "ALLOW_EXTERNAL_OOF"
            } else {
                "EXTERNAL_AUDIENCE"
            };
            let flag = if value.as_bool().unwrap_or(false) { 1 } else { 0 };
            write_config_key(maildir, key, &flag.to_string())?;
        }
        PR_EC_OUTOFOFFICE_MSG | PR_EC_EXTERNAL_REPLY => {
            let body = value.as_str().unwrap_or_default();
            write_reply_body(maildir, proptag == PR_EC_EXTERNAL_REPLY, body)?;
        }
        PR_EC_OUTOFOFFICE_SUBJECT | PR_EC_EXTERNAL_SUBJECT => {
            let subject = value.as_str().unwrap_or_default();
            write_reply_subject(maildir, proptag == PR_EC_EXTERNAL_SUBJECT, subject)?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

pub fn is_oof_proptag(proptag: u32) -> bool {
    matches!(
        proptag,
        PR_OOF_STATE
            | PR_EC_OUTOFOFFICE_MSG
            | PR_EC_EXTERNAL_REPLY
            | PR_EC_OUTOFOFFICE_SUBJECT
            | PR_EC_EXTERNAL_SUBJECT
            | PR_EC_OUTOFOFFICE_FROM
            | PR_EC_OUTOFOFFICE_UNTIL
            | PR_EC_ALLOW_EXTERNAL
            | PR_EC_EXTERNAL_AUDIENCE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let maildir = dir.path().to_str().unwrap();
        assert_eq!(
            get_oof_property(maildir, PR_OOF_STATE),
            Some(PropValue::Long(0))
        );
        set_oof_property(maildir, PR_OOF_STATE, &PropValue::Long(2)).unwrap();
        assert_eq!(
            get_oof_property(maildir, PR_OOF_STATE),
            Some(PropValue::Long(2))
        );
    }

    #[test]
    fn reply_preamble_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let maildir = dir.path().to_str().unwrap();
        set_oof_property(
            maildir,
            PR_EC_OUTOFOFFICE_MSG,
            &PropValue::Unicode("<p>gone fishing</p>".into()),
        )
        .unwrap();
        set_oof_property(
            maildir,
            PR_EC_OUTOFOFFICE_SUBJECT,
            &PropValue::Unicode("Out of office".into()),
        )
        .unwrap();
        // body survives the subject rewrite, and vice versa
        assert_eq!(
            get_oof_property(maildir, PR_EC_OUTOFOFFICE_MSG),
            Some(PropValue::Unicode("<p>gone fishing</p>".into()))
        );
        assert_eq!(
            get_oof_property(maildir, PR_EC_OUTOFOFFICE_SUBJECT),
            Some(PropValue::Unicode("Out of office".into()))
        );
        let raw = std::fs::read_to_string(
            std::path::Path::new(maildir).join("config").join("internal-reply"),
        )
        .unwrap();
        assert!(raw.starts_with("Content-Type: text/html;"));
    }

    #[test]
    fn missing_files_read_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let maildir = dir.path().to_str().unwrap();
        assert_eq!(get_oof_property(maildir, PR_EC_OUTOFOFFICE_MSG), None);
        assert_eq!(get_oof_property(maildir, PR_EC_OUTOFOFFICE_FROM), None);
        assert_eq!(
            get_oof_property(maildir, PR_EC_ALLOW_EXTERNAL),
            Some(PropValue::Bool(false))
        );
    }
}

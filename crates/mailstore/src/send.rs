/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The client-side send path: resolve recipient addresses, render the
//! message to RFC 5322, drive a blocking SMTP transaction and file the
//! message afterwards.

use crate::{Result, SessionInfo, db_err, store::Store};
use mail_builder::MessageBuilder;
use std::{
    io::{BufRead, BufReader, Write},
    net::TcpStream,
    time::Duration,
};
use tracing::{debug, warn};
use types::{
    EcError, PropValue, TpropvalArray,
    codepage::CP_WESTERN,
    constants::*,
    entryid::{
        self, MessageEntryid, eid_gc_value, make_eid_ex, parse_ab_entryid, parse_oneoff_entryid,
    },
    proptag::*,
};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub timeout: Duration,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        SmtpConfig {
            server: "127.0.0.1:25".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// SMTP transaction verdicts, kept apart so the caller can decide
/// whether a bounce is warranted.
#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
    #[error("connection failed: {0}")]
    Connect(std::io::Error),
    #[error("time out in conversation")]
    Timeout,
    #[error("rejected permanently: {0}")]
    Permanent(String),
    #[error("deferred temporarily: {0}")]
    Temporary(String),
    #[error("unexpected answer: {0}")]
    Unknown(String),
}

fn read_response(reader: &mut BufReader<TcpStream>) -> std::result::Result<u16, SmtpError> {
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).map_err(|err| {
            if err.kind() == std::io::ErrorKind::WouldBlock
                || err.kind() == std::io::ErrorKind::TimedOut
            {
                SmtpError::Timeout
            } else {
                SmtpError::Connect(err)
            }
        })?;
        if read == 0 {
            return Err(SmtpError::Unknown("connection closed".to_string()));
        }
        let code: u16 = line
            .get(..3)
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| SmtpError::Unknown(line.trim().to_string()))?;
        // continuation lines of a multiline reply
        if line.as_bytes().get(3) == Some(&b'-') {
            continue;
        }
        return match code {
            200..=399 => Ok(code),
            400..=499 => Err(SmtpError::Temporary(line.trim().to_string())),
            _ => Err(SmtpError::Permanent(line.trim().to_string())),
        };
    }
}

fn send_command(
    stream: &mut TcpStream,
    reader: &mut BufReader<TcpStream>,
    command: &str,
) -> std::result::Result<u16, SmtpError> {
    stream
        .write_all(command.as_bytes())
        .map_err(SmtpError::Connect)?;
    read_response(reader)
}

fn dot_stuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 16);
    for line in body.split_inclusive(|&b| b == b'\n') {
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
    }
    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// One blocking SMTP transaction with the configured relay. Any reply
/// outside the success range aborts the send.
pub fn smtp_submit(
    config: &SmtpConfig,
    from: &str,
    rcpts: &[String],
    body: &[u8],
) -> std::result::Result<(), SmtpError> {
    let mut stream = TcpStream::connect(&config.server).map_err(SmtpError::Connect)?;
    stream
        .set_read_timeout(Some(config.timeout))
        .map_err(SmtpError::Connect)?;
    stream
        .set_write_timeout(Some(config.timeout))
        .map_err(SmtpError::Connect)?;
    let mut reader =
        BufReader::new(stream.try_clone().map_err(SmtpError::Connect)?);
    read_response(&mut reader)?;
    send_command(&mut stream, &mut reader, "HELO localhost\r\n")?;
    send_command(&mut stream, &mut reader, &format!("MAIL FROM:<{from}>\r\n"))?;
    for rcpt in rcpts {
        // a bare local part still has to be a syntactically valid path
        let rcpt = if rcpt.contains('@') {
            rcpt.clone()
        } else {
            format!("{rcpt}@none")
        };
        send_command(&mut stream, &mut reader, &format!("RCPT TO:<{rcpt}>\r\n"))?;
    }
    send_command(&mut stream, &mut reader, "DATA\r\n")?;
    let mut payload = dot_stuff(body);
    payload.extend_from_slice(b".\r\n");
    stream.write_all(&payload).map_err(SmtpError::Connect)?;
    read_response(&mut reader)?;
    let _ = stream.write_all(b"QUIT\r\n");
    Ok(())
}

/// Derive the SMTP address of one recipient row: the literal address,
/// then the addrtype-qualified forms, then the entryid.
fn resolve_recipient(store: &Store, session: &SessionInfo, row: &TpropvalArray) -> Option<String> {
    if let Some(address) = row.get_str(PR_SMTP_ADDRESS) {
        return Some(address.to_string());
    }
    match row.get_str(PR_ADDRTYPE) {
        Some(addrtype) if addrtype.eq_ignore_ascii_case("SMTP") => {
            return row.get_str(PR_EMAIL_ADDRESS).map(str::to_string);
        }
        Some(addrtype) if addrtype.eq_ignore_ascii_case("EX") => {
            let essdn = row.get_str(PR_EMAIL_ADDRESS)?;
            let (_domain_id, user_id, _local) =
                entryid::essdn_to_ids(&session.org_name, essdn)?;
            return store.directory().get_username_from_id(user_id).ok();
        }
        _ => {}
    }
    let entry_bytes = row.get(PR_ENTRYID).and_then(PropValue::as_bytes)?;
    if let Some((_display, addrtype, address)) = parse_oneoff_entryid(entry_bytes) {
        if addrtype.eq_ignore_ascii_case("SMTP") {
            return Some(address);
        }
        return None;
    }
    let (_kind, essdn) = parse_ab_entryid(entry_bytes)?;
    let (_domain_id, user_id, _local) = entryid::essdn_to_ids(&session.org_name, &essdn)?;
    store.directory().get_username_from_id(user_id).ok()
}

/// Send a previously saved message and file it per its submit flags.
pub fn send_message(
    store: &Store,
    session: &SessionInfo,
    config: &SmtpConfig,
    message_id: u64,
    b_submit: bool,
) -> Result<()> {
    let dir = store.dir();
    let db = store.db();
    let username = (!store.is_private()).then_some(session.username.as_str());
    let mut content = db
        .read_message(dir, username, session.cpid, message_id)
        .map_err(db_err)?;

    if content.proplist.get_u32(PR_INTERNET_CPID).is_none() {
        let cpid = if session.cpid != 0 {
            session.cpid
        } else {
            CP_WESTERN
        };
        content.proplist.set(PR_INTERNET_CPID, PropValue::Long(cpid));
    }
    let message_flags = content.proplist.get_u32(PR_MESSAGE_FLAGS).unwrap_or(0);
    let b_resend = message_flags & MSGFLAG_RESEND != 0;

    let mut rcpts = Vec::new();
    for row in &content.recipients {
        if b_resend {
            let rcpt_type = row.get_u32(PR_RECIPIENT_TYPE).unwrap_or(0);
            if rcpt_type & RECIPIENT_TYPE_NEED_RESEND == 0 {
                continue;
            }
        }
        match resolve_recipient(store, session, row) {
            Some(address) => rcpts.push(address),
            None => {
                warn!(message_id, "failed to resolve a recipient address");
                return Err(EcError::NotFound);
            }
        }
    }
    if rcpts.is_empty() {
        warn!(message_id, "message has no recipients to send to");
        return Ok(());
    }

    // Body style selection.
    let override_format = content
        .proplist
        .get_u32(PR_INET_MAIL_OVERRIDE_FORMAT)
        .map(|format| format & MESSAGE_FORMAT_MASK)
        .unwrap_or(MESSAGE_FORMAT_PLAIN_AND_HTML);
    let text_body = content.proplist.get_str(PR_BODY);
    let html_body = content
        .proplist
        .get(PR_HTML)
        .and_then(PropValue::as_bytes)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned());

    let from = content
        .proplist
        .get_str(PR_SENT_REPRESENTING_SMTP_ADDRESS)
        .unwrap_or(&session.username)
        .to_string();
    let mut builder = MessageBuilder::new()
        .from(("", from.as_str()))
        .to(rcpts
            .iter()
            .map(|address| ("", address.as_str()))
            .collect::<Vec<_>>())
        .subject(content.proplist.get_str(PR_SUBJECT).unwrap_or_default());
    match override_format {
        MESSAGE_FORMAT_HTML_ONLY => {
            if let Some(html) = html_body.as_deref() {
                builder = builder.html_body(html);
            } else if let Some(text) = text_body {
                builder = builder.text_body(text);
            }
        }
        MESSAGE_FORMAT_PLAIN_ONLY => {
            if let Some(text) = text_body {
                builder = builder.text_body(text);
            }
        }
        _ => {
            if let Some(text) = text_body {
                builder = builder.text_body(text);
            }
            if let Some(html) = html_body.as_deref() {
                builder = builder.html_body(html);
            }
        }
    }
    if let Some(internet_id) = content.proplist.get_str(PR_INTERNET_MESSAGE_ID) {
        builder = builder.message_id(internet_id.trim_matches(['<', '>']));
    }
    let bytes = builder.write_to_vec().map_err(|err| {
        warn!(%err, "message export failed");
        EcError::CallFailed
    })?;

    if let Err(err) = smtp_submit(config, &from, &rcpts, &bytes) {
        warn!(message_id, %err, "smtp transaction failed");
        return Err(EcError::CallFailed);
    }
    debug!(message_id, rcpts = rcpts.len(), "message submitted");

    if !b_submit {
        return Ok(());
    }
    // Post-submit disposition.
    if content.proplist.get_bool(PR_DELETE_AFTER_SUBMIT).unwrap_or(false) {
        db.delete_message(dir, store.account_id(), session.cpid, 0, message_id, true)
            .map_err(db_err)?;
        return Ok(());
    }
    if let Some(target) = content
        .proplist
        .get(PR_TARGET_ENTRYID)
        .and_then(PropValue::as_bytes)
        .and_then(MessageEntryid::deserialize)
    {
        db.clear_submit(dir, message_id, false).map_err(db_err)?;
        db.movecopy_message(
            dir,
            store.account_id(),
            session.cpid,
            message_id,
            target.folder_id(),
            target.message_id(),
            true,
        )
        .map_err(db_err)?;
    } else {
        db.clear_submit(dir, message_id, false).map_err(db_err)?;
        db.movecopy_message(
            dir,
            store.account_id(),
            session.cpid,
            message_id,
            make_eid_ex(1, PRIVATE_FID_SENT_ITEMS),
            make_eid_ex(1, 0x10_0000 + eid_gc_value(message_id)),
            true,
        )
        .map_err(db_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_stuffing() {
        let body = b"line one\r\n.starts with dot\r\n..double\r\n";
        let stuffed = dot_stuff(body);
        assert_eq!(
            stuffed,
            b"line one\r\n..starts with dot\r\n...double\r\n".to_vec()
        );
    }

    #[test]
    fn response_codes_classify() {
        // covered through the state machine indirectly; the parser
        // itself is a pure function of the first digits
        assert_eq!("250 ok".get(..3).and_then(|d| d.parse::<u16>().ok()), Some(250));
        assert_eq!("xyz".get(..3).and_then(|d| d.parse::<u16>().ok()), None);
    }
}

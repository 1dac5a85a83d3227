/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Filesystem-backed dequeue. Each `.msg` file carries a plain envelope
//! preamble followed by a blank line and the raw RFC 5322 bytes:
//!
//! ```text
//! FROM:<alice@example.org>
//! RCPT:<bob@example.org>
//!
//! <message>
//! ```

use delivery::{
    context::BoundType,
    queue::{MessageQueue, QueuedMessage},
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct SpoolQueue {
    root: PathBuf,
    deferred: PathBuf,
    next_queue_id: Mutex<u64>,
}

impl SpoolQueue {
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let deferred = root.join("deferred");
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(&deferred)?;
        Ok(SpoolQueue {
            root,
            deferred,
            next_queue_id: Mutex::new(1),
        })
    }

    fn parse(&self, path: &Path, raw: &[u8]) -> Option<QueuedMessage> {
        let split = raw.windows(2).position(|window| window == b"\n\n")?;
        let preamble = std::str::from_utf8(&raw[..split]).ok()?;
        let body = raw[split + 2..].to_vec();
        let mut from = String::new();
        let mut rcpts = Vec::new();
        for line in preamble.lines() {
            let line = line.trim().trim_end_matches('\r');
            if let Some(addr) = line.strip_prefix("FROM:") {
                from = addr.trim_matches(['<', '>']).to_string();
            } else if let Some(addr) = line.strip_prefix("RCPT:") {
                rcpts.push(addr.trim_matches(['<', '>']).to_string());
            }
        }
        if rcpts.is_empty() {
            warn!(path = %path.display(), "queue file without recipients");
            return None;
        }
        let mut next = self.next_queue_id.lock();
        let queue_id = *next;
        *next += 1;
        Some(QueuedMessage {
            queue_id,
            bound_type: BoundType::In,
            is_spam: false,
            envelope_from: from,
            envelope_rcpt: rcpts,
            body,
        })
    }
}

impl MessageQueue for SpoolQueue {
    fn get(&self) -> Option<QueuedMessage> {
        let entries = std::fs::read_dir(&self.root).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "msg") {
                continue;
            }
            // claim the file by renaming it out of the scan set
            let claimed = path.with_extension("taken");
            if std::fs::rename(&path, &claimed).is_err() {
                continue;
            }
            match std::fs::read(&claimed) {
                Ok(raw) => {
                    let message = self.parse(&path, &raw);
                    let _ = std::fs::remove_file(&claimed);
                    if message.is_some() {
                        return message;
                    }
                }
                Err(err) => {
                    warn!(path = %claimed.display(), %err, "queue file read failed");
                }
            }
        }
        None
    }

    fn save(&self, message: &QueuedMessage) {
        let path = self.deferred.join(format!("{}.msg", message.queue_id));
        let mut out = Vec::with_capacity(message.body.len() + 128);
        out.extend_from_slice(format!("FROM:<{}>\n", message.envelope_from).as_bytes());
        for rcpt in &message.envelope_rcpt {
            out.extend_from_slice(format!("RCPT:<{rcpt}>\n").as_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&message.body);
        if let Err(err) = std::fs::write(&path, out) {
            warn!(path = %path.display(), %err, "deferred message write failed");
        }
    }

    fn put(&self, _message: QueuedMessage) {}

    fn holding(&self) -> usize {
        std::fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|entry| {
                        entry.path().extension().is_some_and(|ext| ext == "msg")
                    })
                    .count()
            })
            .unwrap_or(0)
    }
}

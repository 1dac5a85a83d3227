/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use mail_parser::{Message, MessageParser};

/// Where a queued message entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundType {
    In,
    Out,
    Relay,
    /// Created in-process by a hook.
    SelfInject,
    #[default]
    Unknown,
}

/// The envelope-side control block of a message in the pipeline.
#[derive(Debug, Default, Clone)]
pub struct ControlInfo {
    pub queue_id: u64,
    pub bound_type: BoundType,
    pub is_spam: bool,
    pub need_bounce: bool,
    pub from: String,
    pub rcpt_to: Vec<String>,
}

impl ControlInfo {
    pub fn clear(&mut self) {
        self.queue_id = 0;
        self.bound_type = BoundType::Unknown;
        self.is_spam = false;
        self.need_bounce = false;
        self.from.clear();
        self.rcpt_to.clear();
    }
}

/// Control block plus raw message body. The MIME view is parsed on
/// demand so the context itself stays movable between pool and worker.
#[derive(Debug, Default)]
pub struct MessageContext {
    pub control: ControlInfo,
    raw: Vec<u8>,
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, raw: Vec<u8>) {
        self.raw = raw;
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn write_content(&mut self, raw: impl Into<Vec<u8>>) {
        self.raw = raw.into();
    }

    /// The parsed MIME tree; `None` when the payload is not a message.
    pub fn mail(&self) -> Option<Message<'_>> {
        MessageParser::default().parse(&self.raw)
    }

    pub fn clear(&mut self) {
        self.control.clear();
        self.raw.clear();
    }
}

/// The shared LIFO pool of contexts hooks use for re-injection.
#[derive(Default)]
pub struct ContextPool {
    free: parking_lot::Mutex<Vec<MessageContext>>,
}

impl ContextPool {
    pub fn with_capacity(count: usize) -> Self {
        let mut free = Vec::with_capacity(count);
        free.resize_with(count, MessageContext::new);
        ContextPool {
            free: parking_lot::Mutex::new(free),
        }
    }

    pub fn get(&self) -> Option<MessageContext> {
        self.free.lock().pop()
    }

    pub fn put(&self, mut context: MessageContext) {
        context.clear();
        self.free.lock().push(context);
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_is_lifo_and_clears() {
        let pool = ContextPool::with_capacity(2);
        assert_eq!(pool.available(), 2);
        let mut ctx = pool.get().unwrap();
        ctx.control.from = "a@b".into();
        ctx.load(b"Subject: x\r\n\r\nbody".to_vec());
        pool.put(ctx);
        let ctx = pool.get().unwrap();
        assert!(ctx.control.from.is_empty());
        assert!(ctx.raw().is_empty());
    }

    #[test]
    fn mail_parses_on_demand() {
        let mut ctx = MessageContext::new();
        ctx.load(b"Subject: hello\r\nFrom: a@b\r\n\r\nworld".to_vec());
        let mail = ctx.mail().unwrap();
        assert_eq!(mail.subject(), Some("hello"));
    }
}

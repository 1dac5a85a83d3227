/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::context::BoundType;

/// One message popped from the dequeue: the envelope the front-end
/// recorded plus the raw RFC 5322 bytes.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub queue_id: u64,
    pub bound_type: BoundType,
    pub is_spam: bool,
    pub envelope_from: String,
    pub envelope_rcpt: Vec<String>,
    pub body: Vec<u8>,
}

/// The authoritative inbound queue. `save` defers a message no hook
/// accepted; it is never a drop.
pub trait MessageQueue: Send + Sync {
    fn get(&self) -> Option<QueuedMessage>;
    fn save(&self, message: &QueuedMessage);
    fn put(&self, message: QueuedMessage);
    /// Number of messages waiting, used by the pool-growth scanner.
    fn holding(&self) -> usize;
}

/// A bounded in-process queue; the unit tests and single-node setups
/// feed the pipeline through this.
#[derive(Default)]
pub struct InProcessQueue {
    pending: parking_lot::Mutex<std::collections::VecDeque<QueuedMessage>>,
    saved: parking_lot::Mutex<Vec<QueuedMessage>>,
}

impl InProcessQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: QueuedMessage) {
        self.pending.lock().push_back(message);
    }

    pub fn saved_count(&self) -> usize {
        self.saved.lock().len()
    }
}

impl MessageQueue for InProcessQueue {
    fn get(&self) -> Option<QueuedMessage> {
        self.pending.lock().pop_front()
    }

    fn save(&self, message: &QueuedMessage) {
        self.saved.lock().push(message.clone());
    }

    fn put(&self, _message: QueuedMessage) {}

    fn holding(&self) -> usize {
        self.pending.lock().len()
    }
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The hook chain: an append-only registry with per-hook in-flight
//! counters, snapshot dispatch, and the per-thread throw bookkeeping
//! that keeps re-injection loops finite.

use crate::{Pipeline, context::MessageContext};
use parking_lot::Mutex;
use std::{
    cell::RefCell,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};
use tracing::{debug, warn};

/// Depth cap of the per-thread throw stack.
pub const MAX_THROWING_NUM: usize = 16;

pub type HookFn = Arc<dyn Fn(&Pipeline, &mut MessageContext) -> bool + Send + Sync>;

/// Hook identity: the address of the boxed closure, stable for the
/// lifetime of the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(usize);

impl HookId {
    fn of(func: &HookFn) -> Self {
        HookId(Arc::as_ptr(func) as *const () as usize)
    }
}

pub struct HookEntry {
    pub id: HookId,
    pub func: HookFn,
    pub plugin: Option<usize>,
    valid: AtomicBool,
    count: AtomicU32,
}

impl HookEntry {
    fn new(func: HookFn, plugin: Option<usize>) -> Arc<Self> {
        Arc::new(HookEntry {
            id: HookId::of(&func),
            func,
            plugin,
            valid: AtomicBool::new(true),
            count: AtomicU32::new(0),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn in_flight(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub struct HookRegistry {
    entries: Mutex<Vec<Arc<HookEntry>>>,
    local: Mutex<Option<Arc<HookEntry>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook; rejected when the same closure is already live.
    pub fn register(&self, func: HookFn, plugin: Option<usize>) -> Option<Arc<HookEntry>> {
        let id = HookId::of(&func);
        let mut entries = self.entries.lock();
        if entries.iter().any(|entry| entry.is_valid() && entry.id == id) {
            return None;
        }
        let entry = HookEntry::new(func, plugin);
        entries.push(entry.clone());
        Some(entry)
    }

    /// Exactly one local (terminal delivery) hook may ever register.
    pub fn register_local(&self, func: HookFn, plugin: Option<usize>) -> Option<Arc<HookEntry>> {
        let mut local = self.local.lock();
        if local.is_some() {
            warn!("a local delivery hook is already registered");
            return None;
        }
        let entry = HookEntry::new(func, plugin);
        *local = Some(entry.clone());
        Some(entry)
    }

    pub fn local(&self) -> Option<Arc<HookEntry>> {
        self.local.lock().clone()
    }

    pub fn has_local(&self) -> bool {
        self.local.lock().is_some()
    }

    /// A consistent snapshot in registration order; the entries stay
    /// alive through their arcs even while a plugin unloads.
    pub fn snapshot(&self) -> Vec<Arc<HookEntry>> {
        self.entries.lock().clone()
    }

    pub fn invalidate_plugin(&self, plugin: usize) -> Vec<Arc<HookEntry>> {
        let entries = self.entries.lock();
        let mut owned = Vec::new();
        for entry in entries.iter() {
            if entry.plugin == Some(plugin) {
                entry.invalidate();
                owned.push(entry.clone());
            }
        }
        owned
    }

    /// Drop invalidated entries whose in-flight count reached zero.
    pub fn sweep(&self) {
        self.entries
            .lock()
            .retain(|entry| entry.is_valid() || entry.in_flight() != 0);
    }

    pub fn remove_entry(&self, id: HookId) {
        self.entries.lock().retain(|entry| entry.id != id);
        let mut local = self.local.lock();
        if local.as_ref().is_some_and(|entry| entry.id == id) {
            *local = None;
        }
    }

    pub fn clear_local(&self) {
        *self.local.lock() = None;
    }
}

#[derive(Default)]
pub struct ThreadState {
    pub last_hook: Option<HookId>,
    pub last_thrower: Option<HookId>,
    pub throwed: Vec<HookId>,
}

thread_local! {
    static THREAD_STATE: RefCell<ThreadState> = RefCell::new(ThreadState::default());
}

pub fn with_thread_state<R>(f: impl FnOnce(&mut ThreadState) -> R) -> R {
    THREAD_STATE.with(|state| f(&mut state.borrow_mut()))
}

pub fn reset_thread_state() {
    with_thread_state(|state| {
        state.last_hook = None;
        state.last_thrower = None;
        state.throwed.clear();
    });
}

/// Walk the chain in registration order, skipping the thread's current
/// thrower, and fall through to the terminal local hook.
pub fn pass_hooks(pipeline: &Pipeline, context: &mut MessageContext) -> bool {
    let snapshot = pipeline.registry().snapshot();
    let last_thrower = with_thread_state(|state| state.last_thrower);
    for entry in &snapshot {
        if !entry.is_valid() || Some(entry.id) == last_thrower {
            continue;
        }
        with_thread_state(|state| state.last_hook = Some(entry.id));
        entry.count.fetch_add(1, Ordering::AcqRel);
        let accepted = (entry.func)(pipeline, context);
        entry.count.fetch_sub(1, Ordering::AcqRel);
        if accepted {
            return true;
        }
    }
    if let Some(local) = pipeline.registry().local() {
        if Some(local.id) != last_thrower {
            with_thread_state(|state| state.last_hook = Some(local.id));
            local.count.fetch_add(1, Ordering::AcqRel);
            let accepted = (local.func)(pipeline, context);
            local.count.fetch_sub(1, Ordering::AcqRel);
            return accepted;
        }
    }
    false
}

/// Re-enter the dispatcher with a context a hook synthesized. The
/// context is consumed either way; the thread-local stack rejects both
/// overflow and re-entry into the throwing hook.
pub fn throw_context(pipeline: &Pipeline, mut context: MessageContext) -> bool {
    let verdict = with_thread_state(|state| {
        let Some(last_hook) = state.last_hook else {
            return Err("throw outside hook dispatch");
        };
        if state.throwed.contains(&last_hook) {
            return Err("message loop detected");
        }
        if state.throwed.len() >= MAX_THROWING_NUM {
            return Err("throw stack exhausted");
        }
        state.throwed.push(last_hook);
        let previous = (state.last_hook, state.last_thrower);
        state.last_thrower = Some(last_hook);
        Ok(previous)
    });
    let (saved_hook, saved_thrower) = match verdict {
        Ok(saved) => saved,
        Err(reason) => {
            warn!(reason, "context throw rejected");
            pipeline.put_context(context);
            return false;
        }
    };
    let accepted = pass_hooks(pipeline, &mut context);
    if !accepted {
        debug!("thrown message not processed by any hook");
    }
    with_thread_state(|state| {
        state.throwed.pop();
        state.last_hook = saved_hook;
        state.last_thrower = saved_thrower;
    });
    pipeline.put_context(context);
    accepted
}

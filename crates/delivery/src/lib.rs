/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod context;
pub mod hooks;
pub mod plugin;
pub mod queue;

use context::{ContextPool, MessageContext};
use hooks::{HookRegistry, pass_hooks, reset_thread_state};
use parking_lot::{Condvar, Mutex};
use plugin::PluginSlot;
use queue::{MessageQueue, QueuedMessage};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};
use tracing::{debug, info, warn};

const SCAN_INTERVAL: Duration = Duration::from_secs(1);
/// Consecutive empty polls before an excess worker retires.
const MAX_TIMES_NOT_SERVED: u32 = 5;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub threads_min: usize,
    pub threads_max: usize,
    pub free_contexts: usize,
    pub mime_ratio: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            threads_min: 2,
            threads_max: 8,
            free_contexts: 32,
            mime_ratio: 4,
        }
    }
}

/// Paths and identities the plugins may query.
#[derive(Debug, Clone, Default)]
pub struct TransportEnv {
    pub host_id: String,
    pub default_domain: String,
    pub admin_mailbox: String,
    pub config_path: String,
    pub data_path: String,
    pub state_path: String,
    pub queue_path: String,
    /// Whether a curated domain list gates relaying decisions.
    pub domainlist_valid: bool,
}

/// Everything the workers and the hooks share: the registry, the
/// context pools, the re-injection queue and the dequeue handle.
pub struct Pipeline {
    config: TransportConfig,
    env: TransportEnv,
    registry: HookRegistry,
    pool: ContextPool,
    inject: Mutex<VecDeque<MessageContext>>,
    wake_lock: Mutex<()>,
    wake: Condvar,
    stop: AtomicBool,
    active_workers: AtomicUsize,
    queue: Arc<dyn MessageQueue>,
    plugins: Mutex<Vec<PluginSlot>>,
}

impl Pipeline {
    pub fn new(
        config: TransportConfig,
        env: TransportEnv,
        queue: Arc<dyn MessageQueue>,
    ) -> Arc<Self> {
        let pool = ContextPool::with_capacity(config.free_contexts);
        Arc::new(Pipeline {
            config,
            env,
            registry: HookRegistry::new(),
            pool,
            inject: Mutex::new(VecDeque::new()),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
            active_workers: AtomicUsize::new(0),
            queue,
            plugins: Mutex::new(Vec::new()),
        })
    }

    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    pub fn env(&self) -> &TransportEnv {
        &self.env
    }

    pub(crate) fn plugins(&self) -> &Mutex<Vec<PluginSlot>> {
        &self.plugins
    }

    pub fn threads_max(&self) -> usize {
        self.config.threads_max
    }

    pub fn context_num(&self) -> usize {
        self.config.threads_max + self.config.free_contexts
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }

    /// Pull a free context for a message a hook wants to synthesize.
    pub fn get_context(&self) -> Option<MessageContext> {
        let context = self.pool.get();
        if context.is_none() {
            warn!("free context pool exhausted");
        }
        context
    }

    pub fn put_context(&self, context: MessageContext) {
        self.pool.put(context);
    }

    /// Queue a synthesized context for any worker and wake one up.
    pub fn enqueue_context(&self, context: MessageContext) {
        self.inject.lock().push_back(context);
        self.wake.notify_one();
    }

    pub fn dequeue_context(&self) -> Option<MessageContext> {
        self.inject.lock().pop_front()
    }

    /// Process a synthesized context on the calling thread, excluding
    /// the throwing hook from the chain.
    pub fn throw_context(&self, context: MessageContext) -> bool {
        hooks::throw_context(self, context)
    }

    pub fn stop_flag(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn notify_all(&self) {
        self.wake.notify_all();
    }

    fn worker_loop(self: &Arc<Self>, fixed: &mut MessageContext) {
        let mut misses = 0u32;
        while !self.stop_flag() {
            if let Some(message) = self.queue.get() {
                misses = 0;
                self.run_queued(fixed, message);
                continue;
            }
            if let Some(mut context) = self.dequeue_context() {
                misses = 0;
                reset_thread_state();
                if !pass_hooks(self, &mut context) {
                    debug!("re-injected message not processed by any hook");
                }
                self.put_context(context);
                continue;
            }
            misses += 1;
            if misses < MAX_TIMES_NOT_SERVED {
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
            if self.active_workers() > self.config.threads_min {
                // retire this excess worker
                return;
            }
            let mut guard = self.wake_lock.lock();
            self.wake.wait_for(&mut guard, Duration::from_secs(1));
        }
    }

    fn run_queued(self: &Arc<Self>, fixed: &mut MessageContext, message: QueuedMessage) {
        fixed.clear();
        fixed.load(message.body.clone());
        if fixed.mail().is_none() {
            debug!(queue_id = message.queue_id, "failed to load message into MIME object");
            self.queue.save(&message);
            self.queue.put(message);
            return;
        }
        fixed.control.queue_id = message.queue_id;
        fixed.control.bound_type = message.bound_type;
        fixed.control.is_spam = message.is_spam;
        fixed.control.need_bounce = true;
        fixed.control.from = message.envelope_from.clone();
        fixed.control.rcpt_to = message.envelope_rcpt.clone();
        reset_thread_state();
        let accepted = pass_hooks(self, fixed);
        if !accepted {
            debug!(
                queue_id = message.queue_id,
                "message cannot be processed by any hook, deferring"
            );
            self.queue.save(&message);
        }
        self.queue.put(message);
        fixed.clear();
    }
}

/// The transport daemon: owns the worker pool and the growth scanner
/// over a shared pipeline.
pub struct Transporter {
    pipeline: Arc<Pipeline>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    scanner: Mutex<Option<JoinHandle<()>>>,
}

fn spawn_worker(
    pipeline: &Arc<Pipeline>,
    workers: &Arc<Mutex<Vec<JoinHandle<()>>>>,
) -> Result<(), TransportError> {
    let pipeline = pipeline.clone();
    let handle = std::thread::Builder::new()
        .name("xprt/worker".to_string())
        .spawn(move || {
            pipeline.active_workers.fetch_add(1, Ordering::AcqRel);
            for slot in pipeline.plugins.lock().iter() {
                if !slot.retired {
                    slot.plugin.thread_create();
                }
            }
            let mut fixed = MessageContext::new();
            pipeline.worker_loop(&mut fixed);
            for slot in pipeline.plugins.lock().iter() {
                if !slot.retired {
                    slot.plugin.thread_destroy();
                }
            }
            pipeline.active_workers.fetch_sub(1, Ordering::AcqRel);
        })
        .map_err(TransportError::Spawn)?;
    workers.lock().push(handle);
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no local delivery hook registered")]
    MissingLocalHook,
    #[error("failed to spawn worker: {0}")]
    Spawn(std::io::Error),
}

impl Transporter {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Transporter {
            pipeline,
            workers: Arc::new(Mutex::new(Vec::new())),
            scanner: Mutex::new(None),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Start `threads_min` workers and the 1 s growth scanner. The
    /// terminal local hook must be in place first.
    pub fn run(&self) -> Result<(), TransportError> {
        if !self.pipeline.registry().has_local() {
            return Err(TransportError::MissingLocalHook);
        }
        for _ in 0..self.pipeline.config.threads_min {
            spawn_worker(&self.pipeline, &self.workers)?;
        }
        let pipeline = self.pipeline.clone();
        let workers = self.workers.clone();
        *self.scanner.lock() = Some(
            std::thread::Builder::new()
                .name("xprt/scan".to_string())
                .spawn(move || {
                    while !pipeline.stop_flag() {
                        std::thread::sleep(SCAN_INTERVAL);
                        pipeline.clean_up_unloading();
                        if pipeline.queue.holding() == 0
                            || pipeline.active_workers() >= pipeline.config.threads_max
                        {
                            continue;
                        }
                        if let Err(err) = spawn_worker(&pipeline, &workers) {
                            warn!(%err, "worker spawn failed");
                        }
                    }
                })
                .map_err(TransportError::Spawn)?,
        );
        info!(
            threads_min = self.pipeline.config.threads_min,
            threads_max = self.pipeline.config.threads_max,
            "transporter running"
        );
        Ok(())
    }

    pub fn stop(&self) {
        self.pipeline.stop.store(true, Ordering::Release);
        self.pipeline.notify_all();
        if let Some(handle) = self.scanner.lock().take() {
            let _ = handle.join();
        }
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

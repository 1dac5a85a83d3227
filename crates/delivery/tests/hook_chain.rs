/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use delivery::{
    Pipeline, TransportConfig, TransportEnv, Transporter,
    context::{BoundType, MessageContext},
    hooks::pass_hooks,
    plugin::{HookPlugin, PluginRegistrar},
    queue::{InProcessQueue, MessageQueue, QueuedMessage},
};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

fn pipeline_with_queue(queue: Arc<InProcessQueue>) -> Arc<Pipeline> {
    Pipeline::new(
        TransportConfig {
            threads_min: 1,
            threads_max: 2,
            free_contexts: 8,
            mime_ratio: 4,
        },
        TransportEnv {
            host_id: "mx.example.org".into(),
            default_domain: "example.org".into(),
            ..TransportEnv::default()
        },
        queue,
    )
}

#[test]
fn chain_runs_in_order_and_ends_at_local() {
    let queue = Arc::new(InProcessQueue::new());
    let pipeline = pipeline_with_queue(queue);
    let order = Arc::new(Mutex::new(Vec::new()));

    let o1 = order.clone();
    pipeline
        .registry()
        .register(Arc::new(move |_: &Pipeline, _: &mut MessageContext| {
            o1.lock().push("h1");
            false
        }), None)
        .unwrap();
    let o2 = order.clone();
    pipeline
        .registry()
        .register(Arc::new(move |_: &Pipeline, _: &mut MessageContext| {
            o2.lock().push("h2");
            false
        }), None)
        .unwrap();
    let o3 = order.clone();
    pipeline
        .registry()
        .register_local(Arc::new(move |_: &Pipeline, _: &mut MessageContext| {
            o3.lock().push("local");
            true
        }), None)
        .unwrap();

    let mut context = MessageContext::new();
    assert!(pass_hooks(&pipeline, &mut context));
    assert_eq!(*order.lock(), vec!["h1", "h2", "local"]);
}

#[test]
fn first_accepting_hook_terminates_chain() {
    let queue = Arc::new(InProcessQueue::new());
    let pipeline = pipeline_with_queue(queue);
    let later_called = Arc::new(AtomicBool::new(false));

    pipeline
        .registry()
        .register(
            Arc::new(|_: &Pipeline, _: &mut MessageContext| true),
            None,
        )
        .unwrap();
    let flag = later_called.clone();
    pipeline
        .registry()
        .register(Arc::new(move |_: &Pipeline, _: &mut MessageContext| {
            flag.store(true, Ordering::SeqCst);
            false
        }), None)
        .unwrap();

    let mut context = MessageContext::new();
    assert!(pass_hooks(&pipeline, &mut context));
    assert!(!later_called.load(Ordering::SeqCst));
}

#[test]
fn throw_skips_the_thrower_and_unwinds() {
    let queue = Arc::new(InProcessQueue::new());
    let pipeline = pipeline_with_queue(queue);
    let order = Arc::new(Mutex::new(Vec::new()));
    let h1_runs = Arc::new(AtomicUsize::new(0));

    // H1 throws a synthesized message on its first run; the nested
    // dispatch must visit H2 and local but never H1 again.
    let o1 = order.clone();
    let runs = h1_runs.clone();
    pipeline
        .registry()
        .register(
            Arc::new(move |pipeline: &Pipeline, _: &mut MessageContext| {
                o1.lock().push("h1");
                if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                    let mut thrown = pipeline.get_context().expect("free context");
                    thrown.control.bound_type = BoundType::SelfInject;
                    thrown.write_content(b"Subject: thrown\r\n\r\n".to_vec());
                    assert!(pipeline.throw_context(thrown));
                }
                false
            }),
            None,
        )
        .unwrap();
    let o2 = order.clone();
    pipeline
        .registry()
        .register(Arc::new(move |_: &Pipeline, _: &mut MessageContext| {
            o2.lock().push("h2");
            false
        }), None)
        .unwrap();
    let o3 = order.clone();
    pipeline
        .registry()
        .register_local(Arc::new(move |_: &Pipeline, _: &mut MessageContext| {
            o3.lock().push("local");
            true
        }), None)
        .unwrap();

    let mut context = MessageContext::new();
    assert!(pass_hooks(&pipeline, &mut context));
    // outer: h1 throws -> nested h2+local, then the outer chain resumes
    assert_eq!(*order.lock(), vec!["h1", "h2", "local", "h2", "local"]);
    assert_eq!(h1_runs.load(Ordering::SeqCst), 1);
    // the thrown context returned to the pool
    assert!(pipeline.get_context().is_some());
}

#[test]
fn recursive_throw_is_rejected_as_loop() {
    let queue = Arc::new(InProcessQueue::new());
    let pipeline = pipeline_with_queue(queue);
    let rejected = Arc::new(AtomicUsize::new(0));

    let seen = rejected.clone();
    pipeline
        .registry()
        .register(
            Arc::new(move |pipeline: &Pipeline, context: &mut MessageContext| {
                if context.control.bound_type != BoundType::SelfInject {
                    let mut thrown = pipeline.get_context().expect("free context");
                    thrown.control.bound_type = BoundType::SelfInject;
                    // the nested dispatch re-enters this hook through a
                    // second throw, which must be detected as a loop
                    if !pipeline.throw_context(thrown) {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }
                }
                false
            }),
            None,
        )
        .unwrap();
    // A second hook that, on the nested pass, throws again back into
    // the chain; its own last_hook is already on the throw stack.
    pipeline
        .registry()
        .register(
            Arc::new(|pipeline: &Pipeline, context: &mut MessageContext| {
                if context.control.bound_type == BoundType::SelfInject {
                    if let Some(thrown) = pipeline.get_context() {
                        // thrower exclusion keeps this bounded
                        pipeline.throw_context(thrown);
                    }
                }
                false
            }),
            None,
        )
        .unwrap();
    pipeline
        .registry()
        .register_local(
            Arc::new(|_: &Pipeline, _: &mut MessageContext| true),
            None,
        )
        .unwrap();

    let mut context = MessageContext::new();
    pass_hooks(&pipeline, &mut context);
    // every context made it back to the pool
    let mut drained = 0;
    while pipeline.get_context().is_some() {
        drained += 1;
    }
    assert_eq!(drained, 8);
}

struct CountingPlugin {
    delivered: Arc<AtomicUsize>,
    fail_init: bool,
}

impl HookPlugin for CountingPlugin {
    fn name(&self) -> &str {
        "counting"
    }

    fn init(&self, registrar: &mut PluginRegistrar<'_>) -> bool {
        if self.fail_init {
            let delivered = self.delivered.clone();
            registrar.register_hook(Arc::new(move |_: &Pipeline, _: &mut MessageContext| {
                delivered.fetch_add(1, Ordering::SeqCst);
                false
            }));
            return false;
        }
        let delivered = self.delivered.clone();
        registrar.register_local(Arc::new(move |_: &Pipeline, ctx: &mut MessageContext| {
            if ctx.control.rcpt_to.is_empty() {
                return false;
            }
            delivered.fetch_add(1, Ordering::SeqCst);
            true
        }))
    }
}

#[test]
fn failed_plugin_init_rolls_back_registrations() {
    let queue = Arc::new(InProcessQueue::new());
    let pipeline = pipeline_with_queue(queue);
    let delivered = Arc::new(AtomicUsize::new(0));
    assert!(!pipeline.load_plugin(Arc::new(CountingPlugin {
        delivered: delivered.clone(),
        fail_init: true,
    })));
    assert!(pipeline.registry().snapshot().is_empty());
    assert!(!pipeline.registry().has_local());
}

#[test]
fn end_to_end_dequeue_delivery() {
    let queue = Arc::new(InProcessQueue::new());
    let pipeline = pipeline_with_queue(queue.clone());
    let delivered = Arc::new(AtomicUsize::new(0));
    assert!(pipeline.load_plugin(Arc::new(CountingPlugin {
        delivered: delivered.clone(),
        fail_init: false,
    })));

    queue.push(QueuedMessage {
        queue_id: 7,
        bound_type: BoundType::In,
        is_spam: false,
        envelope_from: "alice@example.org".into(),
        envelope_rcpt: vec!["bob@example.org".into()],
        body: b"From: alice@example.org\r\nSubject: hi\r\n\r\nhello\r\n".to_vec(),
    });

    let transporter = Transporter::new(pipeline.clone());
    transporter.run().unwrap();
    for _ in 0..200 {
        if delivered.load(Ordering::SeqCst) == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    transporter.stop();
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(queue.holding(), 0);
    assert_eq!(queue.saved_count(), 0);
}

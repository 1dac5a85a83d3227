/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

mod spool;

use abtree::{AbTree, AbTreeConfig};
use clap::Parser;
use delivery::{Pipeline, TransportConfig, TransportEnv, Transporter, plugin::HookPlugin};
use directory::Directory;
use exmdb::PropertyDb;
use spool::SpoolQueue;
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::{error, info};
use types::{
    PropValue,
    constants::PRIVATE_FID_INBOX,
    entryid::make_eid_ex,
    proptag::{PR_MESSAGE_DELIVERY_TIME, PR_SUBJECT},
    time::current_nttime,
};
use utils::{UnwrapFailure, config::ConfigFile};

#[derive(Debug, Parser)]
#[command(name = "gwdelivery", about = "Groupware delivery daemon")]
struct Args {
    /// Config file to read
    #[arg(short, long, default_value = "/etc/gwdelivery/delivery.cfg")]
    config: PathBuf,
}

/// The mandatory terminal hook: file the message into each local
/// recipient's mailbox.
struct LocalDelivery {
    db: Arc<dyn PropertyDb>,
    directory: Arc<dyn Directory>,
}

impl HookPlugin for LocalDelivery {
    fn name(&self) -> &str {
        "local_delivery"
    }

    fn init(&self, registrar: &mut delivery::plugin::PluginRegistrar<'_>) -> bool {
        let db = self.db.clone();
        let directory = self.directory.clone();
        registrar.register_local(Arc::new(move |_pipeline, context| {
            let mut delivered = false;
            let subject = context
                .mail()
                .and_then(|mail| mail.subject().map(str::to_string))
                .unwrap_or_default();
            for rcpt in context.control.rcpt_to.clone() {
                let Ok(maildir) = directory.get_maildir(&rcpt) else {
                    continue;
                };
                let eml_dir = std::path::Path::new(&maildir).join("eml");
                let mid_string = format!("{}.{}", current_nttime(), context.control.queue_id);
                if std::fs::create_dir_all(&eml_dir)
                    .and_then(|_| std::fs::write(eml_dir.join(&mid_string), context.raw()))
                    .is_err()
                {
                    continue;
                }
                let mut content = types::content::MessageContent::new();
                content
                    .proplist
                    .set(PR_SUBJECT, PropValue::Unicode(subject.clone()));
                content.proplist.set(
                    PR_MESSAGE_DELIVERY_TIME,
                    PropValue::NtTime(current_nttime()),
                );
                if db
                    .write_message(
                        &maildir,
                        &rcpt,
                        types::codepage::CP_UTF8,
                        make_eid_ex(1, PRIVATE_FID_INBOX),
                        &content,
                    )
                    .is_ok()
                {
                    delivered = true;
                }
            }
            delivered
        }))
    }
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ConfigFile::read(&args.config).unwrap_or_else(|err| {
        error!(path = %args.config.display(), %err, "cannot read config, using defaults");
        ConfigFile::default()
    });

    let transport_config = TransportConfig {
        threads_min: config.property_or("threads_min", 2usize),
        threads_max: config.property_or("threads_max", 8usize),
        free_contexts: config.property_or("free_contexts", 32usize),
        mime_ratio: config.property_or("mime_ratio", 4usize),
    };
    let queue_path = config
        .get("dequeue_path")
        .unwrap_or("/var/spool/gwdelivery")
        .to_string();
    let env = TransportEnv {
        host_id: config.get("host_id").unwrap_or("localhost").to_string(),
        default_domain: config
            .get("default_domain")
            .unwrap_or("localhost")
            .to_string(),
        admin_mailbox: config
            .get("admin_mailbox")
            .unwrap_or("root@localhost")
            .to_string(),
        config_path: config.get("config_path").unwrap_or("/etc/gwdelivery").to_string(),
        data_path: config
            .get("data_path")
            .unwrap_or("/usr/share/gwdelivery")
            .to_string(),
        state_path: config
            .get("state_path")
            .unwrap_or("/var/lib/gwdelivery")
            .to_string(),
        queue_path: queue_path.clone(),
        domainlist_valid: false,
    };

    let queue = Arc::new(SpoolQueue::new(&queue_path).failed("cannot open dequeue directory"));
    let db: Arc<dyn PropertyDb> = Arc::new(exmdb::memory::MemoryDb::new());
    let dir_backend: Arc<dyn Directory> = Arc::new(directory::memory::InMemoryDirectory::new());

    // address book cache shares the directory with the delivery hooks
    let ab_tree = AbTree::new(
        dir_backend.clone(),
        AbTreeConfig {
            org_name: config.get("x500_org_name").unwrap_or("first organization").to_string(),
            base_capacity: config.property_or("ab_base_capacity", 256usize),
            cache_interval: Duration::from_secs(config.property_or("ab_cache_interval", 300u64)),
        },
    );
    ab_tree.start();

    let pipeline = Pipeline::new(transport_config, env, queue);
    if !pipeline.load_plugin(Arc::new(LocalDelivery {
        db,
        directory: dir_backend,
    })) {
        error!("local delivery hook rejected, refusing to start");
        std::process::exit(1);
    }
    let transporter = Transporter::new(pipeline);
    transporter.run().failed("transporter startup failed");

    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = stop.clone();
    ctrlc::set_handler(move || stop_signal.store(true, Ordering::Release))
        .failed("cannot install signal handler");
    info!("delivery daemon running");
    while !stop.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(250));
    }
    info!("shutting down");
    transporter.stop();
    ab_tree.stop();
}

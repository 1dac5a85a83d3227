/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod base;
pub mod dn;
pub mod guid;
pub mod node;

use ahash::AHashMap;
use base::{
    AbBase, BASE_STATUS_CONSTRUCTING, BASE_STATUS_LIVING, BaseContent, RemoteStub,
};
use directory::Directory;
use node::NodeId;
use parking_lot::Mutex;
use std::{
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};
use tracing::{debug, warn};
use types::{Guid, Minid};

/// How long `get_base` waits for a peer to finish constructing the same
/// base before giving up.
const LOAD_RETRIES: u32 = 60;
const SCAN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct AbTreeConfig {
    pub org_name: String,
    pub base_capacity: usize,
    pub cache_interval: Duration,
}

impl Default for AbTreeConfig {
    fn default() -> Self {
        AbTreeConfig {
            org_name: "first organization".to_string(),
            base_capacity: 256,
            cache_interval: Duration::from_secs(300),
        }
    }
}

/// The cached, per-scope address book directory. Bases are built on
/// first access, vended behind reference-counted handles, and rebuilt in
/// the background once idle past the cache interval.
pub struct AbTree {
    config: AbTreeConfig,
    directory: Arc<dyn Directory>,
    bases: Mutex<AHashMap<i32, Arc<AbBase>>>,
    stop: Arc<AtomicBool>,
    scanner: Mutex<Option<JoinHandle<()>>>,
}

/// RAII reference to a living base; the base cannot be torn down while
/// any of these is held.
pub struct BaseRef {
    base: Arc<AbBase>,
}

impl Deref for BaseRef {
    type Target = AbBase;

    fn deref(&self) -> &AbBase {
        &self.base
    }
}

impl Drop for BaseRef {
    fn drop(&mut self) {
        self.base.release();
    }
}

/// A node as a lookup returns it: either owned by the queried base or a
/// remote stub pointing at a sibling base.
#[derive(Clone)]
pub enum ResolvedNode {
    Local {
        content: Arc<BaseContent>,
        id: NodeId,
    },
    Remote(RemoteStub),
}

impl ResolvedNode {
    pub fn minid(&self) -> Minid {
        match self {
            ResolvedNode::Local { content, id } => content.node(*id).minid,
            ResolvedNode::Remote(stub) => stub.minid,
        }
    }

    pub fn kind(&self) -> node::NodeKind {
        match self {
            ResolvedNode::Local { content, id } => content.node(*id).kind,
            ResolvedNode::Remote(stub) => stub.kind,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ResolvedNode::Remote(_))
    }
}

impl AbTree {
    pub fn new(directory: Arc<dyn Directory>, config: AbTreeConfig) -> Arc<Self> {
        Arc::new(AbTree {
            config,
            directory,
            bases: Mutex::new(AHashMap::new()),
            stop: Arc::new(AtomicBool::new(false)),
            scanner: Mutex::new(None),
        })
    }

    pub fn org_name(&self) -> &str {
        &self.config.org_name
    }

    pub fn directory(&self) -> &dyn Directory {
        &*self.directory
    }

    /// Fetch a living base, constructing it on first access. Blocks for
    /// up to a minute while another thread constructs the same base;
    /// returns `None` on timeout, build failure or a full base map.
    pub fn get_base(&self, base_id: i32) -> Option<BaseRef> {
        for attempt in 0..=LOAD_RETRIES {
            let mut bases = self.bases.lock();
            match bases.get(&base_id).cloned() {
                None => {
                    if bases.len() >= self.config.base_capacity {
                        warn!(base_id, "address book base map is full");
                        return None;
                    }
                    let base = Arc::new(AbBase::new(base_id));
                    bases.insert(base_id, base.clone());
                    drop(bases);
                    match base.build(&*self.directory) {
                        Ok(content) => {
                            base.install(content);
                            base.set_load_time(types::time::current_unix());
                            let bases = self.bases.lock();
                            base.set_status(BASE_STATUS_LIVING);
                            base.acquire();
                            drop(bases);
                            return Some(BaseRef { base });
                        }
                        Err(err) => {
                            warn!(base_id, %err, "address book base build failed");
                            self.bases.lock().remove(&base_id);
                            return None;
                        }
                    }
                }
                Some(base) => {
                    if base.status() == BASE_STATUS_LIVING {
                        base.acquire();
                        return Some(BaseRef { base });
                    }
                    drop(bases);
                    if attempt == LOAD_RETRIES {
                        return None;
                    }
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
        None
    }

    /// Map a base GUID back to its owning base id.
    pub fn guid_to_base_id(&self, guid: Guid) -> Option<i32> {
        let base_id = AbBase::guid_to_base_id(guid);
        let bases = self.bases.lock();
        let base = bases.get(&base_id)?;
        (base.guid == guid).then_some(base_id)
    }

    /// Force every base to be rebuilt by the scanner on its next pass.
    pub fn invalidate_cache(&self) {
        for base in self.bases.lock().values() {
            base.set_load_time(0);
        }
    }

    /// Launch the background scanner that rebuilds idle bases.
    pub fn start(self: &Arc<Self>) {
        let tree = Arc::clone(self);
        let mut scanner = self.scanner.lock();
        if scanner.is_some() {
            return;
        }
        match std::thread::Builder::new()
            .name("abtree/scan".to_string())
            .spawn(move || tree.scan_work())
        {
            Ok(handle) => *scanner = Some(handle),
            Err(err) => warn!(%err, "address book scanner spawn failed"),
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.scanner.lock().take() {
            let _ = handle.join();
        }
    }

    fn scan_work(&self) {
        while !self.stop.load(Ordering::Acquire) {
            std::thread::sleep(SCAN_INTERVAL);
            let candidate = {
                let bases = self.bases.lock();
                let now = types::time::current_unix();
                let found = bases.values().find(|base| {
                    base.status() == BASE_STATUS_LIVING
                        && base.reference() == 0
                        && now - base.load_time() >= self.config.cache_interval.as_secs() as i64
                });
                match found {
                    Some(base) => {
                        base.set_status(BASE_STATUS_CONSTRUCTING);
                        Some(base.clone())
                    }
                    None => None,
                }
            };
            let Some(base) = candidate else {
                continue;
            };
            debug!(base_id = base.base_id, "rebuilding idle address book base");
            base.clear();
            match base.build(&*self.directory) {
                Ok(content) => {
                    base.install(content);
                    let bases = self.bases.lock();
                    base.set_load_time(types::time::current_unix());
                    base.set_status(BASE_STATUS_LIVING);
                    drop(bases);
                }
                Err(err) => {
                    warn!(base_id = base.base_id, %err, "base rebuild failed, dropping");
                    self.bases.lock().remove(&base.base_id);
                }
            }
        }
    }

    /// Probe the base's minid map first, then the remote stub list.
    pub fn minid_to_node(&self, base: &AbBase, minid: Minid) -> Option<ResolvedNode> {
        let content = base.snapshot();
        if let Some(id) = content.minid_to_node(minid) {
            return Some(ResolvedNode::Local { content, id });
        }
        base.find_remote(minid).map(ResolvedNode::Remote)
    }

    pub fn uid_to_node(&self, base: &AbBase, user_id: u32) -> Option<ResolvedNode> {
        self.minid_to_node(base, Minid::address(user_id))
    }

    /// The deterministic per-node GUID; remote stubs resolve their path
    /// through the base that owns the real node.
    pub fn node_to_guid(&self, base: &AbBase, node: &ResolvedNode) -> Option<Guid> {
        match node {
            ResolvedNode::Local { content, id } => guid::node_guid(content, *id),
            ResolvedNode::Remote(stub) => {
                let _ = base;
                let source = self.get_base(-(stub.domain_id as i32))?;
                let content = source.snapshot();
                let id = content.minid_to_node(stub.minid)?;
                let path = guid::node_path(&content, id)?;
                Some(guid::remote_guid(stub.domain_id, stub.minid.id(), &path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use directory::{
        DirectoryUser, DomainInfo,
        memory::{Container, InMemoryDirectory},
    };

    fn directory() -> Arc<InMemoryDirectory> {
        let dir = InMemoryDirectory::new();
        dir.add_org(1, &[17]);
        dir.add_domain(DomainInfo {
            id: 17,
            name: "example.org".into(),
            title: "Example".into(),
            address: String::new(),
            homedir: String::new(),
        });
        let mut alice = DirectoryUser::new(42, "alice@example.org");
        alice
            .propvals
            .insert(types::proptag::PR_DISPLAY_NAME, "Alice".into());
        dir.add_user(17, Container::Domain, alice);
        Arc::new(dir)
    }

    #[test]
    fn get_base_caches_and_counts_references() {
        let tree = AbTree::new(directory(), AbTreeConfig::default());
        let base = tree.get_base(1).unwrap();
        assert_eq!(base.reference(), 1);
        {
            let again = tree.get_base(1).unwrap();
            assert_eq!(again.reference(), 2);
        }
        assert_eq!(base.reference(), 1);
        drop(base);
        let base = tree.get_base(1).unwrap();
        assert_eq!(base.reference(), 1);
    }

    #[test]
    fn capacity_limits_base_map() {
        let tree = AbTree::new(
            directory(),
            AbTreeConfig {
                base_capacity: 1,
                ..AbTreeConfig::default()
            },
        );
        let _held = tree.get_base(-17).unwrap();
        assert!(tree.get_base(1).is_none());
    }

    #[test]
    fn guid_reverse_lookup() {
        let tree = AbTree::new(directory(), AbTreeConfig::default());
        let base = tree.get_base(1).unwrap();
        assert_eq!(tree.guid_to_base_id(base.guid), Some(1));
        assert_eq!(tree.guid_to_base_id(Guid::random()), None);
    }

    #[test]
    fn minid_lookup_scenario() {
        let tree = AbTree::new(directory(), AbTreeConfig::default());
        let base = tree.get_base(1).unwrap();
        let alice = tree.minid_to_node(&base, Minid::address(42)).unwrap();
        assert_eq!(alice.minid(), Minid::address(42));
        assert_eq!(alice.minid().0, 42);
        assert!(!alice.is_remote());
        assert!(tree.minid_to_node(&base, Minid::address(7777)).is_none());
    }

    #[test]
    fn invalidate_resets_load_time() {
        let tree = AbTree::new(directory(), AbTreeConfig::default());
        let base = tree.get_base(1).unwrap();
        assert!(base.load_time() > 0);
        tree.invalidate_cache();
        assert_eq!(base.load_time(), 0);
    }
}

//! Last-known-good snapshot of every attached target.
//!
//! The store is a passive cache: it is written only by [`crate::AgentChannel`]
//! after a reply has been matched to its request, and read by anyone. It is
//! never used to wait for a specific reply; callers get that from the return
//! value of the channel call.

use std::collections::HashMap;
use std::sync::Arc;

use hotline_core::{ClassIdentifier, Endpoint, TargetHandle};
use hotline_proto::ClassEntry;
use parking_lot::RwLock;

/// The most recent FETCH_BYTES result for a target.
///
/// Name and bytes are one value: replacing the fetched class swaps both at
/// once, so a reader can never see the bytes of one class under the name of
/// another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedClass {
    pub name: ClassIdentifier,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug, Default)]
struct TargetStatus {
    endpoint: Option<Endpoint>,
    loaded_classes: Arc<[ClassEntry]>,
    last_fetched: Option<FetchedClass>,
    class_cache: HashMap<ClassIdentifier, Arc<[u8]>>,
    detached: bool,
    generation: u64,
}

/// Point-in-time copy of a target's status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetSnapshot {
    pub endpoint: Option<Endpoint>,
    pub loaded_classes: Arc<[ClassEntry]>,
    pub last_fetched: Option<FetchedClass>,
    pub detached: bool,
    /// Number of successful replies applied so far.
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct StatusStore {
    targets: RwLock<HashMap<TargetHandle, Arc<RwLock<TargetStatus>>>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) the status of `target`, reachable at `endpoint`.
    ///
    /// Re-attaching drops cached bytecode: classes may have been redefined
    /// since the previous session.
    pub fn attach(&self, target: &TargetHandle, endpoint: Endpoint) {
        let slot = self.slot_or_insert(target);
        let mut status = slot.write();
        *status = TargetStatus {
            endpoint: Some(endpoint),
            ..TargetStatus::default()
        };
    }

    pub fn is_attached(&self, target: &TargetHandle) -> bool {
        self.read(target, |status| status.endpoint.is_some())
            .unwrap_or(false)
    }

    pub fn snapshot(&self, target: &TargetHandle) -> Option<TargetSnapshot> {
        self.read(target, |status| TargetSnapshot {
            endpoint: status.endpoint.clone(),
            loaded_classes: status.loaded_classes.clone(),
            last_fetched: status.last_fetched.clone(),
            detached: status.detached,
            generation: status.generation,
        })
    }

    pub fn endpoint(&self, target: &TargetHandle) -> Option<Endpoint> {
        self.read(target, |status| status.endpoint.clone()).flatten()
    }

    pub fn loaded_classes(&self, target: &TargetHandle) -> Arc<[ClassEntry]> {
        self.read(target, |status| status.loaded_classes.clone())
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    pub fn loaded_class_names(&self, target: &TargetHandle) -> Vec<ClassIdentifier> {
        self.loaded_classes(target)
            .iter()
            .map(|entry| ClassIdentifier::new(entry.name.clone()))
            .collect()
    }

    pub fn last_fetched(&self, target: &TargetHandle) -> Option<FetchedClass> {
        self.read(target, |status| status.last_fetched.clone())
            .flatten()
    }

    pub fn cached_bytes(&self, target: &TargetHandle, class: &ClassIdentifier) -> Option<Arc<[u8]>> {
        self.read(target, |status| status.class_cache.get(class).cloned())
            .flatten()
    }

    pub fn is_detached(&self, target: &TargetHandle) -> bool {
        self.read(target, |status| status.detached).unwrap_or(true)
    }

    pub fn generation(&self, target: &TargetHandle) -> u64 {
        self.read(target, |status| status.generation).unwrap_or(0)
    }

    pub(crate) fn record_class_list(&self, target: &TargetHandle, classes: Arc<[ClassEntry]>) {
        self.write(target, |status| {
            status.loaded_classes = classes;
            status.detached = false;
            status.generation += 1;
        });
    }

    pub(crate) fn record_fetch(&self, target: &TargetHandle, fetched: FetchedClass) {
        self.write(target, |status| {
            status
                .class_cache
                .insert(fetched.name.clone(), fetched.bytes.clone());
            status.last_fetched = Some(fetched);
            status.detached = false;
            status.generation += 1;
        });
    }

    /// Record a successful reply that carries no state of its own.
    pub(crate) fn record_ack(&self, target: &TargetHandle) {
        self.write(target, |status| {
            status.detached = false;
            status.generation += 1;
        });
    }

    /// Drop every cached class of `target`, e.g. after a redefinition made
    /// them stale.
    pub(crate) fn invalidate_classes(&self, target: &TargetHandle) {
        self.write(target, |status| status.class_cache.clear());
    }

    /// Mark `target` detached. With `forget_endpoint` the session is over and
    /// a new attach is required before the next request.
    pub(crate) fn mark_detached(&self, target: &TargetHandle, forget_endpoint: bool) {
        self.write(target, |status| {
            status.detached = true;
            if forget_endpoint {
                status.endpoint = None;
            }
        });
    }

    fn slot(&self, target: &TargetHandle) -> Option<Arc<RwLock<TargetStatus>>> {
        self.targets.read().get(target).cloned()
    }

    fn slot_or_insert(&self, target: &TargetHandle) -> Arc<RwLock<TargetStatus>> {
        if let Some(slot) = self.slot(target) {
            return slot;
        }
        self.targets
            .write()
            .entry(target.clone())
            .or_default()
            .clone()
    }

    fn read<T>(&self, target: &TargetHandle, f: impl FnOnce(&TargetStatus) -> T) -> Option<T> {
        let slot = self.slot(target)?;
        let status = slot.read();
        Some(f(&status))
    }

    fn write(&self, target: &TargetHandle, f: impl FnOnce(&mut TargetStatus)) {
        let Some(slot) = self.slot(target) else {
            tracing::debug!(target: "hotline.agent", %target, "status update for unknown target ignored");
            return;
        };
        let mut status = slot.write();
        f(&mut status);
    }
}

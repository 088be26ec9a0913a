//! Outbound half of the sync loop: scene events → document writes.
//!
//! ```text
//!  SceneEvent(Local) ──► Added / Finalized / Removed / Canvas ──► transact(Local)
//!                   └──► Modified ──► DebounceTable ──(deadline)──► transact(Local)
//!  SceneEvent(Remote | Hydration) ──► dropped
//! ```
//!
//! The bridge never reads the document and never mutates the scene. It only
//! turns local intent into origin-tagged transactions, which is why a scene
//! change caused by a peer can never travel back out.

use easel_core::{DrawableObject, ObjectId, ObjectProps, SceneChange, SceneEvent, SceneStore, TxOrigin};
use tokio::time::Instant;

use crate::config::{PendingWritePolicy, SyncConfig};
use crate::debounce::DebounceTable;
use crate::document::{DocumentError, ReplicatedDocument};

/// Counters for the outbound path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Writes made as soon as the event was seen.
    pub immediate_writes: u64,
    /// Writes made when a debounce window closed or was flushed early.
    pub debounced_writes: u64,
    /// Pending writes dropped without reaching the document.
    pub discarded: u64,
    /// Non-local events ignored.
    pub dropped_foreign: u64,
    pub deletes: u64,
    pub canvas_writes: u64,
}

/// Give an id-less object a fresh UUID v4 id and return it.
///
/// Objects that already carry an id keep it.
pub fn ensure_id(obj: &mut DrawableObject) -> ObjectId {
    match obj.id() {
        Some(id) => id.clone(),
        None => obj.assign_id(ObjectId::generate()).clone(),
    }
}

#[derive(Debug)]
pub struct ChangeBridge {
    policy: PendingWritePolicy,
    pending: DebounceTable<ObjectProps>,
    stats: BridgeStats,
}

impl ChangeBridge {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            policy: config.pending_write_policy,
            pending: DebounceTable::new(config.debounce_window),
            stats: BridgeStats::default(),
        }
    }

    /// React to one scene event.
    pub fn handle(
        &mut self,
        event: SceneEvent,
        scene: &SceneStore,
        doc: &mut ReplicatedDocument,
        now: Instant,
    ) -> Result<(), DocumentError> {
        if event.origin != TxOrigin::Local {
            self.drop_foreign(&event);
            return Ok(());
        }

        match event.change {
            SceneChange::Added(id) | SceneChange::Finalized(id) => {
                self.pending.cancel(id.as_str());
                // Gone already: a later Removed in this drain handles it.
                if let Some(props) = scene.serialize(id.as_str()) {
                    doc.set_object(&id, &props, TxOrigin::Local)?;
                    self.stats.immediate_writes += 1;
                }
            }
            SceneChange::Modified(id) => {
                // The stored copy only matters if the object is deleted locally
                // before the window closes; a timer flush reads the scene.
                if let Some(props) = scene.serialize(id.as_str()) {
                    self.pending.schedule(id, props, now);
                }
            }
            SceneChange::Removed(id) => {
                self.resolve_pending_for_delete(&id, doc)?;
                if doc.delete_object(id.as_str(), TxOrigin::Local) {
                    self.stats.deletes += 1;
                }
            }
            SceneChange::Canvas(setting) => {
                doc.set_canvas_setting(&setting, TxOrigin::Local)?;
                self.stats.canvas_writes += 1;
            }
        }
        Ok(())
    }

    fn drop_foreign(&mut self, event: &SceneEvent) {
        self.stats.dropped_foreign += 1;
        log::trace!("Dropping {:?} event {:?}", event.origin, event.change);
        // A peer deleted the object: a stale local write must not bring it back.
        if let SceneChange::Removed(id) = &event.change {
            if self.pending.cancel(id.as_str()).is_some() {
                self.stats.discarded += 1;
                log::debug!("Discarded pending write for {id} (deleted by {})", event.origin);
            }
        }
    }

    fn resolve_pending_for_delete(
        &mut self,
        id: &ObjectId,
        doc: &mut ReplicatedDocument,
    ) -> Result<(), DocumentError> {
        let Some(props) = self.pending.cancel(id.as_str()) else {
            return Ok(());
        };
        match self.policy {
            PendingWritePolicy::FlushThenDelete => {
                doc.set_object(id, &props, TxOrigin::Local)?;
                self.stats.debounced_writes += 1;
            }
            PendingWritePolicy::Discard => {
                self.stats.discarded += 1;
            }
        }
        Ok(())
    }

    /// Write every pending object whose window has closed at `now`.
    ///
    /// The object's current scene state is written, not the state captured
    /// when the edit was scheduled, so a peer patch applied inside the window
    /// is never overwritten by an older local value. Returns the ids written.
    /// Objects removed in the meantime are skipped.
    pub fn flush_due(
        &mut self,
        now: Instant,
        scene: &SceneStore,
        doc: &mut ReplicatedDocument,
    ) -> Vec<ObjectId> {
        let due = self.pending.take_due(now);
        self.write_pending(due, scene, doc)
    }

    /// Write every pending state immediately, regardless of deadlines.
    pub fn flush_all(&mut self, scene: &SceneStore, doc: &mut ReplicatedDocument) -> Vec<ObjectId> {
        let all = self.pending.take_all();
        self.write_pending(all, scene, doc)
    }

    fn write_pending(
        &mut self,
        tasks: Vec<(ObjectId, ObjectProps)>,
        scene: &SceneStore,
        doc: &mut ReplicatedDocument,
    ) -> Vec<ObjectId> {
        let mut written = Vec::with_capacity(tasks.len());
        for (id, _scheduled) in tasks {
            let Some(props) = scene.serialize(id.as_str()) else {
                log::debug!("Skipping flush for removed object {id}");
                continue;
            };
            match doc.set_object(&id, &props, TxOrigin::Local) {
                Ok(()) => {
                    self.stats.debounced_writes += 1;
                    written.push(id);
                }
                Err(e) => log::warn!("Failed to flush {id}: {e}"),
            }
        }
        if !written.is_empty() {
            log::debug!("Flushed {} debounced write(s)", written.len());
        }
        written
    }

    /// Drop every pending write. Returns how many were dropped.
    pub fn discard_all(&mut self) -> usize {
        let dropped = self.pending.take_all().len();
        self.stats.discarded += dropped as u64;
        dropped
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.next_deadline()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.is_pending(id)
    }

    /// Continuous edits folded into a later one before being written.
    pub fn coalesced(&self) -> u64 {
        self.pending.superseded()
    }

    pub fn policy(&self) -> PendingWritePolicy {
        self.policy
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }
}

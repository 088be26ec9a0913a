//! Inbound half of the sync loop: document change batches → scene.
//!
//! Batches are applied in the order the document committed them. Every
//! scene mutation made here carries [`TxOrigin::Remote`], so the outbound
//! bridge ignores it.

use easel_core::{CanvasSetting, DecodeError, ObjectId, ObjectProps, SceneStore, TxOrigin, Upsert};

use crate::document::{ChangeAction, ChangeBatch, KeyChange, MapKind};
use crate::hydration::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Our own write coming back through the observer.
    OwnWrite,
    /// Written by the hydration step, which builds the scene itself.
    Hydration,
    /// Arrived before the session reached `Synced`.
    NotSynced,
}

/// Scene changes caused by one applied batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedBatch {
    pub inserted: Vec<ObjectId>,
    pub patched: Vec<ObjectId>,
    pub removed: Vec<ObjectId>,
    pub canvas: Vec<CanvasSetting>,
    /// Keys that could not be decoded.
    pub skipped: Vec<String>,
}

impl AppliedBatch {
    /// Every object id the batch touched.
    pub fn changed(&self) -> Vec<ObjectId> {
        self.inserted
            .iter()
            .chain(&self.patched)
            .chain(&self.removed)
            .cloned()
            .collect()
    }

    /// Nothing visible changed.
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.patched.is_empty()
            && self.removed.is_empty()
            && self.canvas.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Applied(AppliedBatch),
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverStats {
    pub batches_applied: u64,
    pub batches_discarded: u64,
    pub objects_inserted: u64,
    pub objects_patched: u64,
    pub objects_removed: u64,
    pub objects_skipped: u64,
}

#[derive(Debug, Default)]
pub struct RemoteObserver {
    stats: ObserverStats,
}

impl RemoteObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one batch to `scene`, or discard it.
    ///
    /// A batch with no origin tag came from outside this adapter and is
    /// treated as remote.
    pub fn apply_batch(
        &mut self,
        batch: &ChangeBatch,
        scene: &mut SceneStore,
        state: SessionState,
    ) -> BatchOutcome {
        if let Some(reason) = discard_reason(batch.origin, state) {
            self.stats.batches_discarded += 1;
            log::trace!("Discarding {:?} batch of {} change(s): {reason:?}", batch.map, batch.changes.len());
            return BatchOutcome::Discarded(reason);
        }

        let mut applied = AppliedBatch::default();
        match batch.map {
            MapKind::Objects => {
                for change in &batch.changes {
                    self.apply_object_change(change, scene, &mut applied);
                }
                scene.recompute_geometry(applied.inserted.iter().chain(&applied.patched));
            }
            MapKind::Canvas => {
                for change in &batch.changes {
                    apply_canvas_change(change, scene, &mut applied);
                }
            }
        }

        self.stats.batches_applied += 1;
        self.stats.objects_inserted += applied.inserted.len() as u64;
        self.stats.objects_patched += applied.patched.len() as u64;
        self.stats.objects_removed += applied.removed.len() as u64;
        self.stats.objects_skipped += applied.skipped.len() as u64;
        log::debug!(
            "Applied remote batch: +{} ~{} -{} canvas={} skipped={}",
            applied.inserted.len(),
            applied.patched.len(),
            applied.removed.len(),
            applied.canvas.len(),
            applied.skipped.len()
        );
        BatchOutcome::Applied(applied)
    }

    fn apply_object_change(&mut self, change: &KeyChange, scene: &mut SceneStore, applied: &mut AppliedBatch) {
        let id = ObjectId::new(change.key.as_str());
        match change.action {
            ChangeAction::Add | ChangeAction::Update => {
                let Some(json) = change.value.as_deref() else {
                    log::warn!("Skipping remote object {id}: value is not a JSON string");
                    applied.skipped.push(change.key.clone());
                    return;
                };
                let props = match ObjectProps::from_json(json) {
                    Ok(props) => props,
                    Err(e) => {
                        log::warn!("Skipping remote object {id}: {e}");
                        applied.skipped.push(change.key.clone());
                        return;
                    }
                };
                match scene.apply_remote_upsert(id.clone(), props, TxOrigin::Remote) {
                    Ok(Upsert::Inserted) => applied.inserted.push(id),
                    Ok(Upsert::Patched) => applied.patched.push(id),
                    Err(e) => {
                        log::warn!("Scene rejected remote object {id}: {e}");
                        applied.skipped.push(change.key.clone());
                    }
                }
            }
            ChangeAction::Delete => match scene.apply_remote_remove(id.as_str(), TxOrigin::Remote) {
                Ok(Some(_)) => applied.removed.push(id),
                Ok(None) => log::trace!("Remote delete for unknown object {id}"),
                Err(e) => log::warn!("Scene rejected remote delete of {id}: {e}"),
            },
        }
    }

    pub fn stats(&self) -> ObserverStats {
        self.stats
    }
}

fn discard_reason(origin: Option<TxOrigin>, state: SessionState) -> Option<DiscardReason> {
    match origin {
        Some(TxOrigin::Local) => Some(DiscardReason::OwnWrite),
        Some(TxOrigin::Hydration) => Some(DiscardReason::Hydration),
        _ if !state.is_synced() => Some(DiscardReason::NotSynced),
        _ => None,
    }
}

fn apply_canvas_change(change: &KeyChange, scene: &mut SceneStore, applied: &mut AppliedBatch) {
    if change.action == ChangeAction::Delete {
        // Settings fall back to nothing sensible when removed; keep ours.
        log::debug!("Ignoring removal of canvas setting {}", change.key);
        return;
    }
    let decoded = change
        .value
        .as_deref()
        .ok_or_else(|| DecodeError::Malformed("not a JSON string".into()))
        .and_then(|json| CanvasSetting::decode(&change.key, json));
    match decoded {
        Ok(setting) => match scene.apply_remote_canvas(setting.clone(), TxOrigin::Remote) {
            Ok(()) => applied.canvas.push(setting),
            Err(e) => log::warn!("Scene rejected canvas setting {}: {e}", change.key),
        },
        Err(e) => {
            log::warn!("Skipping canvas setting {}: {e}", change.key);
            applied.skipped.push(change.key.clone());
        }
    }
}

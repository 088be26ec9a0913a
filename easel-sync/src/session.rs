//! One client's view of a shared canvas.
//!
//! The session owns the local scene, the replicated document and both
//! directions of the sync loop. All work happens on the caller's task: a
//! public call mutates the scene, then pumps scene events through the
//! bridge and document batches through the observer before returning.
//!
//! ```text
//!   create_or_update / modify / delete / set_canvas_setting
//!                        │
//!                        ▼
//!                   SceneStore ──events──► ChangeBridge ──► ReplicatedDocument ──► outbound
//!                        ▲                                        │
//!                        └──────── RemoteObserver ◄──batches──────┘◄── apply_remote_update
//! ```

use std::future::Future;
use std::sync::Arc;

use easel_core::{
    CanvasSetting, DrawableObject, EditPhase, InvariantViolation, ObjectId, ObjectProps,
    SceneError, SceneSnapshot, SceneStore, TxOrigin,
};
use tokio::time::Instant;

use crate::bridge::{ensure_id, BridgeStats, ChangeBridge};
use crate::config::SyncConfig;
use crate::debounce::{Clock, SystemClock};
use crate::document::{DocumentError, ReplicatedDocument};
use crate::hydration::{build_scene, HydrationError, HydrationReport, SessionState};
use crate::observer::{BatchOutcome, ObserverStats, RemoteObserver};
use crate::protocol::ProtocolError;

/// Why the render hook fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderReason {
    RemoteBatch,
    DebounceFlush,
    Hydrated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    pub reason: RenderReason,
    /// Objects whose state changed. Empty for a canvas-only batch.
    pub changed: Vec<ObjectId>,
}

type RenderHook = Box<dyn FnMut(&RenderPass)>;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The call needs an attached document.
    NotAttached,
    /// `attach` called while a document is already attached.
    AlreadyAttached,
    Scene(SceneError),
    Document(DocumentError),
    Hydration(HydrationError),
    Protocol(ProtocolError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAttached => write!(f, "No document attached"),
            Self::AlreadyAttached => write!(f, "A document is already attached"),
            Self::Scene(e) => write!(f, "Scene error: {e}"),
            Self::Document(e) => write!(f, "Document error: {e}"),
            Self::Hydration(e) => write!(f, "Hydration error: {e}"),
            Self::Protocol(e) => write!(f, "Protocol error: {e}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<SceneError> for SyncError {
    fn from(e: SceneError) -> Self {
        SyncError::Scene(e)
    }
}

impl From<DocumentError> for SyncError {
    fn from(e: DocumentError) -> Self {
        SyncError::Document(e)
    }
}

impl From<HydrationError> for SyncError {
    fn from(e: HydrationError) -> Self {
        SyncError::Hydration(e)
    }
}

impl From<ProtocolError> for SyncError {
    fn from(e: ProtocolError) -> Self {
        SyncError::Protocol(e)
    }
}

pub struct SyncSession {
    config: SyncConfig,
    state: SessionState,
    scene: SceneStore,
    document: Option<ReplicatedDocument>,
    bridge: ChangeBridge,
    observer: RemoteObserver,
    clock: Arc<dyn Clock>,
    render: Option<RenderHook>,
}

impl SyncSession {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SyncConfig, clock: Arc<dyn Clock>) -> Self {
        let bridge = ChangeBridge::new(&config);
        Self {
            config,
            state: SessionState::Uninitialized,
            scene: SceneStore::new(),
            document: None,
            bridge,
            observer: RemoteObserver::new(),
            clock,
            render: None,
        }
    }

    /// Install the render hook. Replaces any previous one.
    pub fn on_render<F>(&mut self, hook: F)
    where
        F: FnMut(&RenderPass) + 'static,
    {
        self.render = Some(Box::new(hook));
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Attach `doc` and hydrate from its current contents.
    pub fn attach(&mut self, doc: ReplicatedDocument) -> Result<HydrationReport, SyncError> {
        self.begin_hydration()?;
        self.hydrate(doc)
    }

    /// Attach `doc`, wait for the initial state, apply it, then hydrate.
    ///
    /// On any failure the session returns to `Uninitialized` and the scene
    /// is left exactly as it was.
    pub async fn attach_with<F, E>(
        &mut self,
        mut doc: ReplicatedDocument,
        fetch: F,
    ) -> Result<HydrationReport, SyncError>
    where
        F: Future<Output = Result<Vec<u8>, E>>,
        E: std::fmt::Display,
    {
        self.begin_hydration()?;

        let state = match fetch.await {
            Ok(state) => state,
            Err(e) => return Err(self.fail_hydration(HydrationError::Fetch(e.to_string()))),
        };
        if !state.is_empty() {
            if let Err(e) = doc.apply_update(&state, TxOrigin::Hydration) {
                return Err(self.fail_hydration(e.into()));
            }
        }
        self.hydrate(doc)
    }

    fn begin_hydration(&mut self) -> Result<(), SyncError> {
        if self.state != SessionState::Uninitialized {
            return Err(SyncError::AlreadyAttached);
        }
        self.state = SessionState::Hydrating;
        log::info!("Hydrating document {}", self.config.doc_id);
        Ok(())
    }

    fn hydrate(&mut self, doc: ReplicatedDocument) -> Result<HydrationReport, SyncError> {
        let snapshot = doc.snapshot();
        let (scene, report) = match build_scene(&snapshot) {
            Ok(built) => built,
            Err(e) => return Err(self.fail_hydration(e)),
        };

        // Everything queued so far is already reflected in the snapshot.
        doc.take_batches();
        self.bridge.discard_all();
        self.scene = scene;
        self.document = Some(doc);

        self.fire_render(RenderPass {
            reason: RenderReason::Hydrated,
            changed: report.objects.clone(),
        });
        self.state = SessionState::Synced;
        log::info!(
            "Document {} synced: {} object(s), {} skipped",
            self.config.doc_id,
            report.objects.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn fail_hydration(&mut self, e: HydrationError) -> SyncError {
        log::warn!("Hydration of {} failed: {e}", self.config.doc_id);
        self.state = SessionState::Uninitialized;
        SyncError::Hydration(e)
    }

    /// Flush pending writes and give the document back.
    pub fn detach(&mut self) -> Option<ReplicatedDocument> {
        if self.state.is_synced() {
            self.flush_pending();
        }
        self.bridge.discard_all();
        self.state = SessionState::Uninitialized;
        let doc = self.document.take();
        if doc.is_some() {
            log::info!("Detached from document {}", self.config.doc_id);
        }
        doc
    }

    // ── Local edits ───────────────────────────────────────────────

    /// Insert `obj`, or replace the replicated fields of the object with the
    /// same id. Id-less objects get a fresh id, which is returned.
    pub fn create_or_update_object(&mut self, mut obj: DrawableObject) -> Result<ObjectId, SyncError> {
        let id = ensure_id(&mut obj);
        if self.scene.contains(id.as_str()) {
            self.scene.update(id.as_str(), obj.serialize(), EditPhase::Final)?;
        } else {
            self.scene.add(obj)?;
        }
        self.pump()?;
        Ok(id)
    }

    /// Edit an object in place. `Continuous` edits are debounced.
    pub fn modify_object<F>(&mut self, id: &str, phase: EditPhase, f: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut ObjectProps),
    {
        self.scene.modify(id, phase, f)?;
        self.pump()
    }

    /// Remove an object. Returns whether it existed.
    pub fn delete_object(&mut self, id: &str) -> Result<bool, SyncError> {
        let existed = self.scene.remove(id).is_some();
        self.pump()?;
        Ok(existed)
    }

    pub fn set_canvas_setting(&mut self, setting: CanvasSetting) -> Result<(), SyncError> {
        self.scene.set_canvas(setting);
        self.pump()
    }

    /// Selection is per client and never replicated.
    pub fn set_selected(&mut self, id: &str, selected: bool) -> bool {
        self.scene.set_selected(id, selected)
    }

    /// Route pending scene events to the bridge, then apply any batches the
    /// document produced.
    fn pump(&mut self) -> Result<(), SyncError> {
        let events = self.scene.drain_events();
        let now = self.clock.now();
        match (self.state, self.document.as_mut()) {
            (SessionState::Synced, Some(doc)) => {
                for event in events {
                    self.bridge.handle(event, &self.scene, doc, now)?;
                }
            }
            _ => {
                if !events.is_empty() {
                    log::trace!("Session {}: {} local event(s) not replicated", self.state, events.len());
                }
            }
        }
        self.process_remote();
        Ok(())
    }

    // ── Inbound ───────────────────────────────────────────────────

    /// Integrate a peer's update and apply the resulting batches.
    pub fn apply_remote_update(&mut self, payload: &[u8]) -> Result<Vec<BatchOutcome>, SyncError> {
        let doc = self.document.as_mut().ok_or(SyncError::NotAttached)?;
        doc.apply_update(payload, TxOrigin::Remote)?;
        Ok(self.process_remote())
    }

    /// Apply every batch the document has queued, oldest first, firing the
    /// render hook once per batch that changed something.
    pub fn process_remote(&mut self) -> Vec<BatchOutcome> {
        let Some(doc) = self.document.as_mut() else {
            return Vec::new();
        };
        let now = self.clock.now();
        let mut outcomes = Vec::new();

        for batch in doc.take_batches() {
            let outcome = self.observer.apply_batch(&batch, &mut self.scene, self.state);
            // Remote deletes must resolve any pending local write.
            for event in self.scene.drain_events() {
                if let Err(e) = self.bridge.handle(event, &self.scene, doc, now) {
                    log::warn!("Bridge failed on remote event: {e}");
                }
            }
            if let BatchOutcome::Applied(applied) = &outcome {
                if !applied.is_empty() {
                    let pass = RenderPass {
                        reason: RenderReason::RemoteBatch,
                        changed: applied.changed(),
                    };
                    if let Some(hook) = self.render.as_mut() {
                        hook(&pass);
                    }
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    // ── Timers ────────────────────────────────────────────────────

    /// Write debounced state whose window has closed. Returns the ids
    /// written.
    pub fn run_due_timers(&mut self) -> Vec<ObjectId> {
        let now = self.clock.now();
        let written = match (self.state, self.document.as_mut()) {
            (SessionState::Synced, Some(doc)) => self.bridge.flush_due(now, &self.scene, doc),
            _ => Vec::new(),
        };
        self.after_flush(written)
    }

    /// Write every pending debounced state now.
    pub fn flush_pending(&mut self) -> Vec<ObjectId> {
        let written = match (self.state, self.document.as_mut()) {
            (SessionState::Synced, Some(doc)) => self.bridge.flush_all(&self.scene, doc),
            _ => Vec::new(),
        };
        self.after_flush(written)
    }

    fn after_flush(&mut self, written: Vec<ObjectId>) -> Vec<ObjectId> {
        if !written.is_empty() {
            self.fire_render(RenderPass {
                reason: RenderReason::DebounceFlush,
                changed: written.clone(),
            });
        }
        self.process_remote();
        written
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.bridge.next_deadline()
    }

    fn fire_render(&mut self, pass: RenderPass) {
        if let Some(hook) = self.render.as_mut() {
            hook(&pass);
        }
    }

    // ── Outbound ──────────────────────────────────────────────────

    /// Encoded updates from local transactions, oldest first.
    pub fn drain_outbound(&mut self) -> Vec<Vec<u8>> {
        self.document
            .as_mut()
            .map(ReplicatedDocument::drain_outbound)
            .unwrap_or_default()
    }

    /// Full document state for a joining peer.
    pub fn encode_state(&self) -> Option<Vec<u8>> {
        self.document.as_ref().map(ReplicatedDocument::encode_state)
    }

    // ── Reads ─────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn scene(&self) -> &SceneStore {
        &self.scene
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        self.scene.snapshot()
    }

    pub fn document(&self) -> Option<&ReplicatedDocument> {
        self.document.as_ref()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn pending_writes(&self) -> usize {
        self.bridge.pending_len()
    }

    pub fn bridge_stats(&self) -> BridgeStats {
        self.bridge.stats()
    }

    pub fn observer_stats(&self) -> ObserverStats {
        self.observer.stats()
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.scene.check_invariants()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::ManualClock;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn session() -> (SyncSession, ManualClock) {
        let clock = ManualClock::new();
        let session = SyncSession::with_clock(SyncConfig::default(), Arc::new(clock.clone()));
        (session, clock)
    }

    fn synced() -> (SyncSession, ManualClock) {
        let (mut s, clock) = session();
        s.attach(ReplicatedDocument::new(&SyncConfig::default())).unwrap();
        (s, clock)
    }

    #[test]
    fn test_edits_before_attach_stay_local() {
        let (mut s, _) = session();
        let id = s
            .create_or_update_object(DrawableObject::rectangle(0.0, 0.0, 5.0, 5.0))
            .unwrap();
        assert!(s.scene().contains(id.as_str()));
        assert!(s.drain_outbound().is_empty());
        assert_eq!(s.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_attach_replaces_scene_and_fires_render() {
        let (mut s, _) = session();
        s.create_or_update_object(DrawableObject::with_id("stale", DrawableObject::rectangle(0.0, 0.0, 1.0, 1.0).serialize()))
            .unwrap();

        let mut doc = ReplicatedDocument::new(&SyncConfig::default());
        doc.set_object(
            &ObjectId::new("seed"),
            &DrawableObject::ellipse(3.0, 3.0, 2.0, 2.0).serialize(),
            TxOrigin::Remote,
        )
        .unwrap();

        let passes = Rc::new(RefCell::new(Vec::new()));
        let sink = passes.clone();
        s.on_render(move |pass| sink.borrow_mut().push(pass.clone()));

        let report = s.attach(doc).unwrap();
        assert_eq!(report.objects, vec![ObjectId::new("seed")]);
        assert_eq!(s.scene().ids(), vec![ObjectId::new("seed")]);
        assert_eq!(s.state(), SessionState::Synced);
        assert_eq!(passes.borrow()[0].reason, RenderReason::Hydrated);
        assert!(s.drain_outbound().is_empty());
    }

    #[test]
    fn test_attach_twice_is_rejected() {
        let (mut s, _) = synced();
        assert_eq!(
            s.attach(ReplicatedDocument::new(&SyncConfig::default())).unwrap_err(),
            SyncError::AlreadyAttached
        );
    }

    #[test]
    fn test_continuous_edits_wait_for_the_clock() {
        let (mut s, clock) = synced();
        let id = s
            .create_or_update_object(DrawableObject::rectangle(10.0, 10.0, 5.0, 5.0))
            .unwrap();
        s.drain_outbound();

        s.modify_object(id.as_str(), EditPhase::Continuous, |p| p.base.left = 50.0)
            .unwrap();
        assert!(s.run_due_timers().is_empty());
        assert_eq!(s.pending_writes(), 1);

        clock.advance(Duration::from_millis(300));
        assert_eq!(s.run_due_timers(), vec![id.clone()]);
        assert_eq!(s.drain_outbound().len(), 1);
        let doc = s.document().unwrap();
        assert_eq!(doc.object(id.as_str()).unwrap().unwrap().base.left, 50.0);
    }

    #[test]
    fn test_update_of_existing_id_patches() {
        let (mut s, _) = synced();
        let id = s
            .create_or_update_object(DrawableObject::rectangle(0.0, 0.0, 5.0, 5.0))
            .unwrap();
        let mut moved = DrawableObject::rectangle(99.0, 0.0, 5.0, 5.0);
        moved.assign_id(id.clone());
        assert_eq!(s.create_or_update_object(moved).unwrap(), id);

        assert_eq!(s.scene().len(), 1);
        assert_eq!(s.scene().get(id.as_str()).unwrap().props().base.left, 99.0);
    }

    #[test]
    fn test_detach_flushes_and_resets() {
        let (mut s, _) = synced();
        let id = s
            .create_or_update_object(DrawableObject::rectangle(0.0, 0.0, 5.0, 5.0))
            .unwrap();
        s.modify_object(id.as_str(), EditPhase::Continuous, |p| p.base.top = 7.0)
            .unwrap();

        let doc = s.detach().unwrap();
        assert_eq!(doc.object(id.as_str()).unwrap().unwrap().base.top, 7.0);
        assert_eq!(s.state(), SessionState::Uninitialized);
        assert_eq!(s.pending_writes(), 0);
        assert_eq!(s.apply_remote_update(&[]), Err(SyncError::NotAttached));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_scene_alone() {
        let (mut s, _) = session();
        let id = s
            .create_or_update_object(DrawableObject::rectangle(0.0, 0.0, 5.0, 5.0))
            .unwrap();
        let before = s.snapshot();

        let fetch = async { Err::<Vec<u8>, _>("server unavailable") };
        let err = s
            .attach_with(ReplicatedDocument::new(&SyncConfig::default()), fetch)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Hydration(HydrationError::Fetch(_))));
        assert_eq!(s.state(), SessionState::Uninitialized);
        assert_eq!(s.snapshot(), before);
        assert!(s.scene().contains(id.as_str()));
    }
}

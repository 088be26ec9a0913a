//! The authoritative local scene.
//!
//! `SceneStore` owns every object in a slot arena and keeps the
//! [`IdentityRegistry`] in lockstep with it. All mutation goes through its
//! methods, and each mutation queues a [`SceneEvent`] tagged with the
//! [`TxOrigin`] that caused it:
//!
//! ```text
//!  tool action ──► add / update / modify / remove ─────────► SceneEvent(Local)
//!  peer batch  ──► apply_remote_upsert / _remove / _canvas ─► SceneEvent(Remote | Hydration)
//! ```
//!
//! Consumers drain the queue with [`SceneStore::drain_events`].

use std::collections::{BTreeMap, VecDeque};

use crate::canvas::{CanvasSetting, CanvasSettings};
use crate::object::{DrawableObject, ObjectId, ObjectProps};
use crate::origin::TxOrigin;
use crate::registry::{IdentityRegistry, ObjectHandle};

/// Whether a local edit is mid-gesture or complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    /// Drag, resize, typing: more changes are coming.
    Continuous,
    /// End of a drag, text edit or path draw.
    Final,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneChange {
    Added(ObjectId),
    Modified(ObjectId),
    Finalized(ObjectId),
    Removed(ObjectId),
    Canvas(CanvasSetting),
}

impl SceneChange {
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            SceneChange::Added(id)
            | SceneChange::Modified(id)
            | SceneChange::Finalized(id)
            | SceneChange::Removed(id) => Some(id),
            SceneChange::Canvas(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneEvent {
    pub change: SceneChange,
    pub origin: TxOrigin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneError {
    /// Objects must carry an id before they enter the scene.
    MissingId,
    DuplicateId(ObjectId),
    NotFound(ObjectId),
    /// `apply_remote_*` called with a `Local` origin.
    LocalOriginRejected,
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId => write!(f, "Object has no id"),
            Self::DuplicateId(id) => write!(f, "Object {id} already exists"),
            Self::NotFound(id) => write!(f, "Object {id} not found"),
            Self::LocalOriginRejected => write!(f, "Remote apply called with a local origin"),
        }
    }
}

impl std::error::Error for SceneError {}

/// The scene and the registry disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantViolation(pub String);

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Scene invariant violated: {}", self.0)
    }
}

impl std::error::Error for InvariantViolation {}

/// What a remote upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Patched,
}

/// Point-in-time copy of the replicated state, objects in z-order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneSnapshot {
    pub objects: Vec<(ObjectId, ObjectProps)>,
    pub canvas: CanvasSettings,
}

impl SceneSnapshot {
    /// Objects keyed by id, ignoring z-order.
    pub fn by_id(&self) -> BTreeMap<&ObjectId, &ObjectProps> {
        self.objects.iter().map(|(id, p)| (id, p)).collect()
    }

    pub fn get(&self, id: &str) -> Option<&ObjectProps> {
        self.objects
            .iter()
            .find(|(oid, _)| oid.as_str() == id)
            .map(|(_, p)| p)
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    object: Option<DrawableObject>,
}

#[derive(Debug, Default)]
pub struct SceneStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Paint order, bottom first.
    order: Vec<ObjectHandle>,
    registry: IdentityRegistry,
    canvas: CanvasSettings,
    events: VecDeque<SceneEvent>,
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Local mutation ────────────────────────────────────────────

    /// Insert a tool-created object. It must already carry an id.
    pub fn add(&mut self, obj: DrawableObject) -> Result<ObjectHandle, SceneError> {
        let id = obj.id().cloned().ok_or(SceneError::MissingId)?;
        if self.registry.contains(id.as_str()) {
            return Err(SceneError::DuplicateId(id));
        }
        let handle = self.insert(id.clone(), obj);
        self.emit(SceneChange::Added(id), TxOrigin::Local);
        Ok(handle)
    }

    /// Replace the replicated fields of an object.
    pub fn update(&mut self, id: &str, props: ObjectProps, phase: EditPhase) -> Result<(), SceneError> {
        self.modify(id, phase, |p| *p = props)
    }

    /// Edit the replicated fields in place.
    pub fn modify<F>(&mut self, id: &str, phase: EditPhase, f: F) -> Result<(), SceneError>
    where
        F: FnOnce(&mut ObjectProps),
    {
        let obj = self
            .get_mut(id)
            .ok_or_else(|| SceneError::NotFound(ObjectId::new(id)))?;
        f(obj.props_mut());
        obj.recompute_geometry();

        let id = ObjectId::new(id);
        let change = match phase {
            EditPhase::Continuous => SceneChange::Modified(id),
            EditPhase::Final => SceneChange::Finalized(id),
        };
        self.emit(change, TxOrigin::Local);
        Ok(())
    }

    /// Remove an object. Missing ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<DrawableObject> {
        let obj = self.take(id)?;
        self.emit(SceneChange::Removed(ObjectId::new(id)), TxOrigin::Local);
        Some(obj)
    }

    pub fn set_canvas(&mut self, setting: CanvasSetting) {
        self.canvas.apply(&setting);
        self.emit(SceneChange::Canvas(setting), TxOrigin::Local);
    }

    // ── Remote application ────────────────────────────────────────

    /// Insert or patch an object from a peer or the hydration snapshot.
    ///
    /// A patch keeps transient state and leaves derived geometry stale;
    /// callers finish a batch with [`SceneStore::recompute_geometry`].
    pub fn apply_remote_upsert(
        &mut self,
        id: ObjectId,
        props: ObjectProps,
        origin: TxOrigin,
    ) -> Result<Upsert, SceneError> {
        if origin.is_local() {
            return Err(SceneError::LocalOriginRejected);
        }
        if let Some(obj) = self.get_mut(id.as_str()) {
            obj.patch(props);
            self.emit(SceneChange::Finalized(id), origin);
            return Ok(Upsert::Patched);
        }
        let obj = DrawableObject::with_id(id.clone(), props);
        self.insert(id.clone(), obj);
        self.emit(SceneChange::Added(id), origin);
        Ok(Upsert::Inserted)
    }

    /// Remove on behalf of a peer. Absent ids are a no-op.
    pub fn apply_remote_remove(
        &mut self,
        id: &str,
        origin: TxOrigin,
    ) -> Result<Option<DrawableObject>, SceneError> {
        if origin.is_local() {
            return Err(SceneError::LocalOriginRejected);
        }
        let Some(obj) = self.take(id) else {
            log::trace!("Remote remove of unknown object {id}");
            return Ok(None);
        };
        self.emit(SceneChange::Removed(ObjectId::new(id)), origin);
        Ok(Some(obj))
    }

    pub fn apply_remote_canvas(&mut self, setting: CanvasSetting, origin: TxOrigin) -> Result<(), SceneError> {
        if origin.is_local() {
            return Err(SceneError::LocalOriginRejected);
        }
        self.canvas.apply(&setting);
        self.emit(SceneChange::Canvas(setting), origin);
        Ok(())
    }

    pub fn recompute_geometry<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a ObjectId>,
    {
        for id in ids {
            if let Some(obj) = self.get_mut(id.as_str()) {
                obj.recompute_geometry();
            }
        }
    }

    // ── Transient state (never replicated, no events) ─────────────

    pub fn set_selected(&mut self, id: &str, selected: bool) -> bool {
        match self.get_mut(id) {
            Some(obj) => {
                obj.transient.selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn set_hovered(&mut self, id: &str, hovered: bool) -> bool {
        match self.get_mut(id) {
            Some(obj) => {
                obj.transient.hovered = hovered;
                true
            }
            None => false,
        }
    }

    // ── Reads ─────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<&DrawableObject> {
        self.resolve(self.registry.handle(id)?)
    }

    /// Follow a handle. Stale handles resolve to `None`.
    pub fn resolve(&self, handle: ObjectHandle) -> Option<&DrawableObject> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.object.as_ref()
    }

    pub fn handle(&self, id: &str) -> Option<ObjectHandle> {
        self.registry.handle(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    /// Allow-listed props for the wire.
    pub fn serialize(&self, id: &str) -> Option<ObjectProps> {
        self.get(id).map(DrawableObject::serialize)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Objects in paint order.
    pub fn iter(&self) -> impl Iterator<Item = &DrawableObject> {
        self.order.iter().filter_map(|h| self.resolve(*h))
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.iter().filter_map(|o| o.id().cloned()).collect()
    }

    pub fn canvas(&self) -> &CanvasSettings {
        &self.canvas
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            objects: self
                .iter()
                .filter_map(|o| Some((o.id()?.clone(), o.serialize())))
                .collect(),
            canvas: self.canvas.clone(),
        }
    }

    // ── Events ────────────────────────────────────────────────────

    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Registry and arena describe the same set of objects.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if !self.registry.is_consistent() {
            return Err(InvariantViolation("registry directions disagree".into()));
        }
        let live = self.slots.iter().filter(|s| s.object.is_some()).count();
        if live != self.registry.len() || live != self.order.len() {
            return Err(InvariantViolation(format!(
                "{live} live objects, {} registry entries, {} ordered handles",
                self.registry.len(),
                self.order.len()
            )));
        }
        for (id, handle) in self.registry.iter() {
            match self.resolve(handle) {
                Some(obj) if obj.id() == Some(id) => {}
                Some(obj) => {
                    return Err(InvariantViolation(format!(
                        "registry maps {id} to a slot holding {:?}",
                        obj.id()
                    )))
                }
                None => return Err(InvariantViolation(format!("dangling registry entry {id}"))),
            }
        }
        for handle in &self.order {
            if self.registry.id(*handle).is_none() {
                return Err(InvariantViolation(format!("unregistered handle {handle:?}")));
            }
        }
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────────

    fn emit(&mut self, change: SceneChange, origin: TxOrigin) {
        self.events.push_back(SceneEvent { change, origin });
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut DrawableObject> {
        let handle = self.registry.handle(id)?;
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.object.as_mut()
    }

    fn insert(&mut self, id: ObjectId, obj: DrawableObject) -> ObjectHandle {
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(obj);
                ObjectHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(obj),
                });
                ObjectHandle {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        if let Some(stale) = self.registry.insert(id, handle) {
            log::warn!("Registry entry {stale:?} replaced by {handle:?}");
        }
        self.order.push(handle);
        handle
    }

    /// Drop an object from arena, registry and paint order together.
    fn take(&mut self, id: &str) -> Option<DrawableObject> {
        let handle = self.registry.remove(id)?;
        self.order.retain(|h| *h != handle);
        let slot = self.slots.get_mut(handle.index as usize)?;
        let obj = slot.object.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        obj
    }
}

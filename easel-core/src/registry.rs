//! Identity registry: object id ↔ scene slot.
//!
//! The registry never owns objects. A handle is an index into the scene's
//! slot arena plus the slot generation at insert time; once the scene drops
//! the object the slot generation moves on and the old handle stops
//! resolving, even if the slot is reused.

use std::collections::HashMap;

use crate::object::ObjectId;

/// Non-owning reference to a scene slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ObjectHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Default, Clone)]
pub struct IdentityRegistry {
    by_id: HashMap<ObjectId, ObjectHandle>,
    by_handle: HashMap<ObjectHandle, ObjectId>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` at `handle`, returning the handle it previously had.
    pub(crate) fn insert(&mut self, id: ObjectId, handle: ObjectHandle) -> Option<ObjectHandle> {
        let previous = self.by_id.insert(id.clone(), handle);
        if let Some(old) = previous {
            self.by_handle.remove(&old);
        }
        self.by_handle.insert(handle, id);
        previous
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<ObjectHandle> {
        let handle = self.by_id.remove(id)?;
        self.by_handle.remove(&handle);
        Some(handle)
    }

    pub(crate) fn clear(&mut self) {
        self.by_id.clear();
        self.by_handle.clear();
    }

    pub fn handle(&self, id: &str) -> Option<ObjectHandle> {
        self.by_id.get(id).copied()
    }

    pub fn id(&self, handle: ObjectHandle) -> Option<&ObjectId> {
        self.by_handle.get(&handle)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, ObjectHandle)> {
        self.by_id.iter().map(|(id, h)| (id, *h))
    }

    /// Both directions agree with each other.
    pub fn is_consistent(&self) -> bool {
        self.by_id.len() == self.by_handle.len()
            && self
                .by_id
                .iter()
                .all(|(id, h)| self.by_handle.get(h) == Some(id))
    }
}

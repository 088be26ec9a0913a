//! Session configuration.

use std::time::Duration;
use uuid::Uuid;

/// What happens to a pending debounced write when its object is deleted
/// locally before the window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingWritePolicy {
    /// Write the pending state, then the delete. Peers observe the final
    /// geometry before the removal and no stale write can follow the delete.
    FlushThenDelete,
    /// Drop the pending state and write only the delete.
    Discard,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Coalescing window for continuous edits, per object.
    pub debounce_window: Duration,
    pub pending_write_policy: PendingWritePolicy,
    /// Name of the shared map holding objects.
    pub objects_map: String,
    /// Name of the shared map holding canvas settings.
    pub canvas_map: String,
    /// Our identity on the transport.
    pub peer_id: Uuid,
    /// Document being edited.
    pub doc_id: Uuid,
    /// Capacity of the channel built by `driver::outbound_channel`.
    pub outbound_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(300),
            pending_write_policy: PendingWritePolicy::FlushThenDelete,
            objects_map: "objects".to_string(),
            canvas_map: "canvasSettings".to_string(),
            peer_id: Uuid::new_v4(),
            doc_id: Uuid::nil(),
            outbound_capacity: 256,
        }
    }
}

impl SyncConfig {
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    pub fn with_pending_write_policy(mut self, policy: PendingWritePolicy) -> Self {
        self.pending_write_policy = policy;
        self
    }

    pub fn with_doc_id(mut self, doc_id: Uuid) -> Self {
        self.doc_id = doc_id;
        self
    }

    pub fn with_peer_id(mut self, peer_id: Uuid) -> Self {
        self.peer_id = peer_id;
        self
    }
}

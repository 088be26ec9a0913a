//! # easel-sync — Replicated scene synchronization for Easel
//!
//! Keeps a local [`easel_core::SceneStore`] and a shared Yrs document in
//! step, in both directions, without letting either side echo the other.
//!
//! ## Architecture
//!
//! ```text
//!  ┌─────────────┐  SceneEvent(Local)  ┌──────────────┐   transact(Local)   ┌──────────────────┐
//!  │ SceneStore  │ ──────────────────► │ ChangeBridge │ ──────────────────► │ReplicatedDocument│
//!  │ (local)     │                     │ + debounce   │                     │ (Yrs maps)       │
//!  └──────▲──────┘                     └──────────────┘                     └────────┬─────────┘
//!         │                                                                          │
//!         │ apply_remote_*(Remote)     ┌────────────────┐   ChangeBatch(origin)      │
//!         └─────────────────────────── │ RemoteObserver │ ◄──────────────────────────┘
//!                                      └────────────────┘
//! ```
//!
//! Every event and transaction carries a [`TxOrigin`](easel_core::TxOrigin).
//! The bridge only writes `Local` events; the observer only applies batches
//! that are neither `Local` nor `Hydration`.
//!
//! ## Modules
//!
//! - [`session`] — `SyncSession` facade and the programmatic edit API
//! - [`document`] — typed adapter over the shared Yrs maps
//! - [`bridge`] — local edits → document writes
//! - [`debounce`] — per-object coalescing of continuous edits
//! - [`observer`] — document batches → scene patches
//! - [`hydration`] — session states and the initial snapshot load
//! - [`protocol`] — bincode envelope for transport payloads
//! - [`driver`] — tokio event loop around a session
//! - [`config`] — `SyncConfig`

pub mod bridge;
pub mod config;
pub mod debounce;
pub mod document;
pub mod driver;
pub mod hydration;
pub mod observer;
pub mod protocol;
pub mod session;

// Re-exports for convenience
pub use bridge::{ensure_id, BridgeStats, ChangeBridge};
pub use config::{PendingWritePolicy, SyncConfig};
pub use debounce::{Clock, DebounceTable, ManualClock, SystemClock};
pub use document::{
    ChangeAction, ChangeBatch, ChangeFeed, DocWriter, DocumentError, DocumentSnapshot, KeyChange,
    MapKind, ReplicatedDocument, TransactionStats,
};
pub use driver::{outbound_channel, run, DriverStats, Inbound, LocalCommand};
pub use hydration::{build_scene, HydrationError, HydrationReport, SessionState};
pub use observer::{AppliedBatch, BatchOutcome, DiscardReason, ObserverStats, RemoteObserver};
pub use protocol::{EnvelopeKind, ProtocolError, UpdateEnvelope};
pub use session::{RenderPass, RenderReason, SyncError, SyncSession};

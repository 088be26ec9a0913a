//! Async event loop around a [`SyncSession`].
//!
//! The driver serializes three sources of work onto one task: messages
//! from the transport, local commands from the UI, and debounce deadlines.
//! After each step it wraps the session's outbound updates in
//! [`UpdateEnvelope`]s and sends them.
//!
//! ```text
//!  inbound stream ──┐
//!                   ├──► select! ──► SyncSession ──► UpdateEnvelope ──► mpsc::Sender
//!  sleep_until ─────┘
//! ```

use std::convert::Infallible;

use easel_core::{CanvasSetting, DrawableObject, EditPhase, ObjectId, ObjectProps};
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::document::ReplicatedDocument;
use crate::protocol::{EnvelopeKind, ProtocolError, UpdateEnvelope};
use crate::session::{SyncError, SyncSession};

/// A UI-originated edit, for callers that talk to the session through the
/// driver instead of directly.
#[derive(Debug, Clone)]
pub enum LocalCommand {
    Upsert(DrawableObject),
    Update {
        id: ObjectId,
        props: ObjectProps,
        phase: EditPhase,
    },
    Delete(ObjectId),
    SetCanvas(CanvasSetting),
}

#[derive(Debug, Clone)]
pub enum Inbound {
    /// A document became available; `initial_state` is its full state as a
    /// Yrs update (empty for a new document).
    DocumentAttached { initial_state: Vec<u8> },
    /// Encoded [`UpdateEnvelope`] from the transport.
    Payload(Vec<u8>),
    /// A peer asked for our full state.
    StateRequested,
    DocumentDetached,
    Local(LocalCommand),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub received: u64,
    pub applied: u64,
    /// Envelopes carrying our own peer id.
    pub ignored_own: u64,
    /// Envelopes for another document.
    pub ignored_foreign_doc: u64,
    /// Envelopes or payloads that failed to decode or apply.
    pub rejected: u64,
    pub sent: u64,
    pub timer_flushes: u64,
}

struct Driver {
    peer_id: Uuid,
    doc_id: Uuid,
    lamport: u64,
    outbound: mpsc::Sender<Vec<u8>>,
    stats: DriverStats,
}

/// Outbound channel sized by [`SyncConfig::outbound_capacity`]. Hand the
/// sender to [`run`] and the receiver to the transport.
pub fn outbound_channel(config: &SyncConfig) -> (mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
    mpsc::channel(config.outbound_capacity.max(1))
}

/// Run `session` until `inbound` ends, then flush pending writes.
pub async fn run<S>(
    session: &mut SyncSession,
    mut inbound: S,
    outbound: mpsc::Sender<Vec<u8>>,
) -> Result<DriverStats, SyncError>
where
    S: Stream<Item = Inbound> + Unpin,
{
    let mut driver = Driver {
        peer_id: session.config().peer_id,
        doc_id: session.config().doc_id,
        lamport: 0,
        outbound,
        stats: DriverStats::default(),
    };

    loop {
        let deadline = session.next_deadline();
        tokio::select! {
            msg = inbound.next() => {
                match msg {
                    Some(msg) => driver.handle(session, msg).await?,
                    None => break,
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if !session.run_due_timers().is_empty() {
                    driver.stats.timer_flushes += 1;
                }
            }
        }
        let updates = session.drain_outbound();
        driver.send_all(EnvelopeKind::Update, updates).await?;
    }

    session.flush_pending();
    let updates = session.drain_outbound();
    driver.send_all(EnvelopeKind::Update, updates).await?;
    log::info!(
        "Driver for {} stopped: {} received, {} sent",
        driver.doc_id,
        driver.stats.received,
        driver.stats.sent
    );
    Ok(driver.stats)
}

impl Driver {
    async fn handle(&mut self, session: &mut SyncSession, msg: Inbound) -> Result<(), SyncError> {
        match msg {
            Inbound::DocumentAttached { initial_state } => {
                if session.document().is_some() {
                    self.detach(session).await?;
                }
                let doc = ReplicatedDocument::new(session.config());
                let fetch = std::future::ready(Ok::<_, Infallible>(initial_state));
                if let Err(e) = session.attach_with(doc, fetch).await {
                    log::warn!("Attach failed: {e}");
                }
            }
            Inbound::Payload(bytes) => self.receive(session, &bytes),
            Inbound::StateRequested => match session.encode_state() {
                Some(state) => self.send_all(EnvelopeKind::FullState, vec![state]).await?,
                None => log::debug!("State requested with no document attached"),
            },
            Inbound::DocumentDetached => self.detach(session).await?,
            Inbound::Local(command) => {
                if let Err(e) = apply_local(session, command) {
                    log::warn!("Local command failed: {e}");
                }
            }
        }
        Ok(())
    }

    fn receive(&mut self, session: &mut SyncSession, bytes: &[u8]) {
        self.stats.received += 1;
        let envelope = match UpdateEnvelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.rejected += 1;
                log::warn!("Failed to decode envelope: {e}");
                return;
            }
        };
        if envelope.peer_id == self.peer_id {
            self.stats.ignored_own += 1;
            log::trace!("Ignoring own envelope (clock {})", envelope.clock);
            return;
        }
        if envelope.doc_id != self.doc_id {
            self.stats.ignored_foreign_doc += 1;
            log::debug!("Ignoring envelope for document {}", envelope.doc_id);
            return;
        }
        self.lamport = self.lamport.max(envelope.clock) + 1;

        match session.apply_remote_update(&envelope.payload) {
            Ok(_) => self.stats.applied += 1,
            Err(SyncError::NotAttached) => {
                log::debug!("Dropping {:?} from {}: not attached", envelope.kind, envelope.peer_id);
            }
            Err(e) => {
                self.stats.rejected += 1;
                log::warn!("Rejected update from {}: {e}", envelope.peer_id);
            }
        }
    }

    async fn detach(&mut self, session: &mut SyncSession) -> Result<(), SyncError> {
        if let Some(mut doc) = session.detach() {
            let updates = doc.drain_outbound();
            self.send_all(EnvelopeKind::Update, updates).await?;
        }
        Ok(())
    }

    async fn send_all(&mut self, kind: EnvelopeKind, payloads: Vec<Vec<u8>>) -> Result<(), SyncError> {
        for payload in payloads {
            self.lamport += 1;
            let envelope = UpdateEnvelope {
                kind,
                peer_id: self.peer_id,
                doc_id: self.doc_id,
                clock: self.lamport,
                payload,
            };
            let bytes = envelope.encode()?;
            self.outbound
                .send(bytes)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
            self.stats.sent += 1;
        }
        Ok(())
    }
}

fn apply_local(session: &mut SyncSession, command: LocalCommand) -> Result<(), SyncError> {
    match command {
        LocalCommand::Upsert(obj) => session.create_or_update_object(obj).map(|_| ()),
        LocalCommand::Update { id, props, phase } => {
            session.modify_object(id.as_str(), phase, |p| *p = props)
        }
        LocalCommand::Delete(id) => session.delete_object(id.as_str()).map(|_| ()),
        LocalCommand::SetCanvas(setting) => session.set_canvas_setting(setting),
    }
}

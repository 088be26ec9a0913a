//! Typed adapter over the shared Yrs document.
//!
//! Two root maps hold the replicated state:
//!
//! ```text
//! Doc
//!  ├── "objects"         id  → JSON object props (one value per object)
//!  └── "canvasSettings"  key → JSON value
//! ```
//!
//! Every write runs inside [`ReplicatedDocument::transact`], which opens a
//! Yrs transaction carrying the [`TxOrigin`] tag. Map observers turn each
//! committed transaction into a [`ChangeBatch`] that remembers that tag, so
//! readers can tell their own writes from a peer's.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use easel_core::{CanvasSetting, DecodeError, ObjectId, ObjectProps, TxOrigin};
use yrs::types::map::MapEvent;
use yrs::types::EntryChange;
use yrs::updates::decoder::Decode;
use yrs::{
    Any, Doc, Map, MapRef, Observable, Origin, Out, ReadTxn, StateVector, Subscription, Transact,
    TransactionMut, Update,
};

use crate::config::SyncConfig;

/// Errors from the document adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// Payload is not a valid Yrs v1 update.
    Decode(String),
    /// Payload decoded but could not be integrated.
    Integrate(String),
    /// A value could not be serialized for the map.
    Encode(DecodeError),
    /// Remote payloads cannot be tagged as local writes.
    LocalApplyRejected,
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "Update decode error: {e}"),
            Self::Integrate(e) => write!(f, "Update integration error: {e}"),
            Self::Encode(e) => write!(f, "Value encode error: {e}"),
            Self::LocalApplyRejected => write!(f, "Refusing to apply a payload with a local origin"),
        }
    }
}

impl std::error::Error for DocumentError {}

impl From<DecodeError> for DocumentError {
    fn from(e: DecodeError) -> Self {
        DocumentError::Encode(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Objects,
    Canvas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Add,
    Update,
    Delete,
}

/// One key's change within a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChange {
    pub key: String,
    pub action: ChangeAction,
    /// New JSON value for add/update. `None` on delete, or when the stored
    /// value is not a string.
    pub value: Option<String>,
}

/// Every change one transaction made to one map.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub map: MapKind,
    /// `None` when a writer outside this adapter left the origin unset.
    pub origin: Option<TxOrigin>,
    pub changes: Vec<KeyChange>,
}

/// FIFO of change batches in commit order, filled by map observers.
#[derive(Debug, Clone, Default)]
pub struct ChangeFeed {
    queue: Arc<Mutex<VecDeque<ChangeBatch>>>,
}

impl ChangeFeed {
    fn lock(&self) -> MutexGuard<'_, VecDeque<ChangeBatch>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, batch: ChangeBatch) {
        self.lock().push_back(batch);
    }

    pub fn drain(&self) -> Vec<ChangeBatch> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Committed transaction counts per origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub local: u64,
    pub remote: u64,
    pub hydration: u64,
}

impl TransactionStats {
    fn record(&mut self, origin: TxOrigin) {
        match origin {
            TxOrigin::Local => self.local += 1,
            TxOrigin::Remote => self.remote += 1,
            TxOrigin::Hydration => self.hydration += 1,
        }
    }
}

/// Raw map contents at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSnapshot {
    pub objects: Vec<(ObjectId, Option<String>)>,
    pub canvas: Vec<(String, Option<String>)>,
}

/// Write access handed to a [`ReplicatedDocument::transact`] closure.
pub struct DocWriter<'a, 'doc> {
    txn: &'a mut TransactionMut<'doc>,
    objects: &'a MapRef,
    canvas: &'a MapRef,
    touched: bool,
}

impl DocWriter<'_, '_> {
    pub fn set_object_json(&mut self, id: &ObjectId, json: String) {
        self.objects.insert(self.txn, id.as_str(), json);
        self.touched = true;
    }

    /// Returns whether the key existed.
    pub fn delete_object(&mut self, id: &str) -> bool {
        let existed = self.objects.remove(self.txn, id).is_some();
        self.touched |= existed;
        existed
    }

    pub fn set_canvas_json(&mut self, key: &str, json: String) {
        self.canvas.insert(self.txn, key, json);
        self.touched = true;
    }
}

pub struct ReplicatedDocument {
    doc: Doc,
    objects: MapRef,
    canvas: MapRef,
    feed: ChangeFeed,
    _subscriptions: Vec<Subscription>,
    outbound: VecDeque<Vec<u8>>,
    stats: TransactionStats,
}

impl ReplicatedDocument {
    pub fn new(config: &SyncConfig) -> Self {
        Self::from_doc(Doc::new(), config)
    }

    fn from_doc(doc: Doc, config: &SyncConfig) -> Self {
        let objects = doc.get_or_insert_map(config.objects_map.as_str());
        let canvas = doc.get_or_insert_map(config.canvas_map.as_str());
        let mut this = Self {
            doc,
            objects,
            canvas,
            feed: ChangeFeed::default(),
            _subscriptions: Vec::new(),
            outbound: VecDeque::new(),
            stats: TransactionStats::default(),
        };

        let feed = this.feed.clone();
        let objects_sub = this.observe_objects(move |batch| feed.push(batch.clone()));
        let feed = this.feed.clone();
        let canvas_sub = this.observe_canvas(move |batch| feed.push(batch.clone()));
        this._subscriptions = vec![objects_sub, canvas_sub];
        this
    }

    /// Run `f` in one transaction tagged with `origin`.
    ///
    /// Local transactions that wrote something queue their encoded update
    /// for the transport.
    pub fn transact<R, F>(&mut self, origin: TxOrigin, f: F) -> R
    where
        F: FnOnce(&mut DocWriter<'_, '_>) -> R,
    {
        let (result, touched, update) = {
            let mut txn = self.doc.transact_mut_with(origin.as_str());
            let mut writer = DocWriter {
                txn: &mut txn,
                objects: &self.objects,
                canvas: &self.canvas,
                touched: false,
            };
            let result = f(&mut writer);
            let touched = writer.touched;
            let update = if touched && origin.is_local() {
                Some(txn.encode_update_v1())
            } else {
                None
            };
            (result, touched, update)
        };

        if touched {
            self.stats.record(origin);
        }
        if let Some(update) = update {
            self.outbound.push_back(update);
        }
        result
    }

    pub fn set_object(
        &mut self,
        id: &ObjectId,
        props: &ObjectProps,
        origin: TxOrigin,
    ) -> Result<(), DocumentError> {
        let json = props.to_json()?;
        self.transact(origin, |w| w.set_object_json(id, json));
        Ok(())
    }

    pub fn delete_object(&mut self, id: &str, origin: TxOrigin) -> bool {
        self.transact(origin, |w| w.delete_object(id))
    }

    pub fn set_canvas_setting(
        &mut self,
        setting: &CanvasSetting,
        origin: TxOrigin,
    ) -> Result<(), DocumentError> {
        let json = setting.value_json()?;
        self.transact(origin, |w| w.set_canvas_json(setting.key(), json));
        Ok(())
    }

    /// Integrate a payload produced by another replica.
    pub fn apply_update(&mut self, payload: &[u8], origin: TxOrigin) -> Result<(), DocumentError> {
        if origin.is_local() {
            return Err(DocumentError::LocalApplyRejected);
        }
        let update = Update::decode_v1(payload).map_err(|e| DocumentError::Decode(e.to_string()))?;
        {
            let mut txn = self.doc.transact_mut_with(origin.as_str());
            txn.apply_update(update)
                .map_err(|e| DocumentError::Integrate(e.to_string()))?;
        }
        self.stats.record(origin);
        Ok(())
    }

    /// Full state as a single update, for a joining peer.
    pub fn encode_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        let txn = self.doc.transact();
        let mut objects: Vec<(ObjectId, Option<String>)> = self
            .objects
            .iter(&txn)
            .map(|(key, value)| (ObjectId::new(key), out_string(&value)))
            .collect();
        objects.sort_by(|a, b| a.0.cmp(&b.0));

        let mut canvas: Vec<(String, Option<String>)> = self
            .canvas
            .iter(&txn)
            .map(|(key, value)| (key.to_string(), out_string(&value)))
            .collect();
        canvas.sort_by(|a, b| a.0.cmp(&b.0));

        DocumentSnapshot { objects, canvas }
    }

    /// Decoded props for one object, `Ok(None)` if absent.
    pub fn object(&self, id: &str) -> Result<Option<ObjectProps>, DecodeError> {
        let txn = self.doc.transact();
        match self.objects.get(&txn, id).as_ref().map(out_string) {
            None => Ok(None),
            Some(Some(json)) => ObjectProps::from_json(&json).map(Some),
            Some(None) => Err(DecodeError::Malformed(format!("{id} is not a JSON string"))),
        }
    }

    pub fn object_count(&self) -> u32 {
        let txn = self.doc.transact();
        self.objects.len(&txn)
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.snapshot().objects.into_iter().map(|(id, _)| id).collect()
    }

    /// Observe the objects map. The callback runs during commit and must
    /// not touch the document.
    pub fn observe_objects<F>(&self, f: F) -> Subscription
    where
        F: Fn(&ChangeBatch) + Send + Sync + 'static,
    {
        self.objects.observe(move |txn, event| {
            if let Some(batch) = batch_from_event(MapKind::Objects, txn, event) {
                f(&batch);
            }
        })
    }

    pub fn observe_canvas<F>(&self, f: F) -> Subscription
    where
        F: Fn(&ChangeBatch) + Send + Sync + 'static,
    {
        self.canvas.observe(move |txn, event| {
            if let Some(batch) = batch_from_event(MapKind::Canvas, txn, event) {
                f(&batch);
            }
        })
    }

    /// Batches committed since the last call, oldest first.
    pub fn take_batches(&self) -> Vec<ChangeBatch> {
        self.feed.drain()
    }

    pub fn pending_batches(&self) -> usize {
        self.feed.len()
    }

    /// Encoded updates from local transactions, oldest first.
    pub fn drain_outbound(&mut self) -> Vec<Vec<u8>> {
        self.outbound.drain(..).collect()
    }

    pub fn stats(&self) -> TransactionStats {
        self.stats
    }
}

fn out_string(value: &Out) -> Option<String> {
    match value {
        Out::Any(Any::String(s)) => Some(s.to_string()),
        _ => None,
    }
}

fn origin_tag(origin: &Origin) -> Option<TxOrigin> {
    TxOrigin::ALL
        .into_iter()
        .find(|o| *origin == Origin::from(o.as_str()))
}

fn batch_from_event(map: MapKind, txn: &TransactionMut, event: &MapEvent) -> Option<ChangeBatch> {
    let mut changes: Vec<KeyChange> = event
        .keys(txn)
        .iter()
        .map(|(key, change)| {
            let (action, value) = match change {
                EntryChange::Inserted(v) => (ChangeAction::Add, out_string(v)),
                EntryChange::Updated(_, v) => (ChangeAction::Update, out_string(v)),
                EntryChange::Removed(_) => (ChangeAction::Delete, None),
            };
            KeyChange {
                key: key.to_string(),
                action,
                value,
            }
        })
        .collect();
    if changes.is_empty() {
        return None;
    }
    changes.sort_by(|a, b| a.key.cmp(&b.key));
    Some(ChangeBatch {
        map,
        origin: txn.origin().and_then(origin_tag),
        changes,
    })
}

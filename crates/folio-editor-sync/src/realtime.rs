//! Realtime strategy: every local edit is submitted to a collaborative
//! transport as soon as it happens, and remote edits are applied as they
//! arrive.
//!
//! Diffs are taken per field-locale scope against the value the transport
//! will hold once everything already submitted is acknowledged: the pending
//! value if one exists, the acknowledged value otherwise.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use folio_common::sync::lock;
use folio_common::{EditorConfig, Property, Subscription, SubscriptionBag};
use folio_editor_core::{
    Collaborator, Entity, EntitySys, LocalChange, Operation, Path, PresenceTracker, Segment, UserId,
    Value, diff,
};
use n0_future::StreamExt;
use n0_future::boxed::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::document::{DocumentCore, DocumentStatus, EntityDocument, PendingMutation};
use crate::error::{DocumentError, TransportError};

/// Operations generated by one local mutation, in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Per-document sequence number, strictly increasing.
    pub seq: u64,
    pub ops: Vec<Operation>,
}

/// Everything a realtime transport reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// The submission with this `seq` (and every earlier one) is durable.
    Acknowledged { seq: u64 },
    /// The submission with this `seq` was refused.
    Rejected { seq: u64, error: TransportError },
    /// Operations from another editor. `seq` is the session's sequence
    /// number and is used to drop replays.
    Remote { seq: u64, ops: Vec<Operation> },
    SysChanged(EntitySys),
    PeerJoined(UserId),
    PeerLeft(UserId),
    Focus { user_id: UserId, path: Option<Path> },
}

/// A collaborative session for one entity.
#[trait_variant::make(Send)]
pub trait OtTransport: Send + Sync + 'static {
    /// Send one submission. Order of calls is the order of generation.
    async fn submit(&self, submission: Submission) -> Result<(), TransportError>;

    /// Tell other editors which path the local user is editing.
    async fn announce(&self, focus: Option<Path>) -> Result<(), TransportError>;

    /// Event stream for this session. Called once when the document opens.
    fn events(&self) -> BoxStream<TransportEvent>;
}

struct InFlight {
    seq: u64,
    scope: Path,
    value: Option<Value>,
    ops: Vec<Operation>,
}

#[derive(Default)]
struct SyncState {
    next_seq: u64,
    connected: bool,
    last_remote_seq: Option<u64>,
    /// Acknowledged field values, as the transport holds them.
    acked: Value,
    /// Latest submitted but unacknowledged value per scope, with its seq.
    pending: HashMap<Path, (u64, Option<Value>)>,
    /// Unacknowledged submissions, oldest first.
    in_flight: VecDeque<InFlight>,
    presence: PresenceTracker,
}

/// Value under `fields` at `scope`.
fn fields_at(fields: &Value, scope: &Path) -> Option<Value> {
    let relative = scope.strip_prefix(&Path::fields())?;
    relative
        .iter()
        .try_fold(fields, |node, seg| match seg {
            Segment::Key(k) => node.get(k.as_str()),
            Segment::Index(i) => node.get(*i),
        })
        .cloned()
}

impl SyncState {
    fn acked_at(&self, scope: &Path) -> Option<Value> {
        fields_at(&self.acked, scope)
    }

    fn set_acked(&mut self, scope: &Path, value: Option<Value>) {
        let Some((field, locale)) = scope.field_locale_ids() else {
            return;
        };
        let Value::Object(fields) = &mut self.acked else {
            return;
        };
        match value {
            Some(value) => {
                let locales = fields
                    .entry(field.to_string())
                    .or_insert_with(|| Value::Object(Default::default()));
                if let Value::Object(locales) = locales {
                    locales.insert(locale.to_string(), value);
                }
            }
            None => {
                if let Some(Value::Object(locales)) = fields.get_mut(field) {
                    locales.shift_remove(locale);
                    if locales.is_empty() {
                        fields.shift_remove(field);
                    }
                }
            }
        }
    }

    /// Apply a remote operation to the acknowledged value and to every
    /// pending or in-flight value it touches.
    ///
    /// An operation at or above a scope overwrites it on the transport, so
    /// that scope's baselines become the rebased acknowledged value.
    fn rebase(&mut self, op: &Operation, core: &DocumentCore) {
        let mut acked = Some(std::mem::take(&mut self.acked));
        if let Err(e) = op.apply_at(&Path::fields(), &mut acked) {
            warn!(path = %op.path, error = %e, "acknowledged baseline out of step");
        }
        self.acked = acked.unwrap_or_else(|| Value::Object(Default::default()));

        let acked = &self.acked;
        let pending = self
            .pending
            .iter_mut()
            .map(|(scope, (_, value))| (scope, value));
        let in_flight = self
            .in_flight
            .iter_mut()
            .map(|entry| (&entry.scope, &mut entry.value));
        for (scope, value) in pending.chain(in_flight) {
            if scope.starts_with(&op.path) {
                *value = fields_at(acked, scope);
            } else if op.path.starts_with(scope) {
                if let Err(e) = op.apply_at(scope, value) {
                    warn!(
                        %scope,
                        path = %op.path,
                        error = %e,
                        "remote op does not fit pending value, taking local copy"
                    );
                    *value = core.get_value_at(scope);
                }
            }
        }
    }

    fn base_for(&self, scope: &Path) -> Option<Value> {
        match self.pending.get(scope) {
            Some((_, value)) => value.clone(),
            None => self.acked_at(scope),
        }
    }
}

struct Shared<T> {
    core: DocumentCore,
    transport: Arc<T>,
    user_id: UserId,
    state: Mutex<SyncState>,
    presence: Property<Vec<Collaborator>>,
    outbound: mpsc::UnboundedSender<Submission>,
}

/// Document synchronised through an [`OtTransport`].
pub struct RealtimeDocument<T: OtTransport> {
    shared: Arc<Shared<T>>,
    tasks: Mutex<SubscriptionBag>,
}

impl<T: OtTransport> RealtimeDocument<T> {
    /// Open a document over `entity` and start its workers on the current
    /// tokio runtime.
    pub fn open(entity: Entity, transport: Arc<T>, user_id: UserId, config: &EditorConfig) -> Self {
        let acked = Value::Object(entity.fields.clone());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            core: DocumentCore::new(entity),
            transport,
            user_id,
            state: Mutex::new(SyncState {
                next_seq: 1,
                acked,
                ..Default::default()
            }),
            presence: Property::new(Vec::new()),
            outbound,
        });

        // Offline until the transport says otherwise; edits queue meanwhile.
        if !shared.core.status().is_unrecoverable() {
            shared.core.set_status(DocumentStatus::Disconnected);
        }

        let mut tasks = SubscriptionBag::new();
        tasks.add(Subscription::spawn(submit_loop(shared.clone(), outbound_rx)));
        let events = shared.transport.events();
        tasks.add(Subscription::spawn(event_loop(shared.clone(), events)));
        tasks.add(Subscription::spawn(prune_loop(
            shared.clone(),
            config.presence_stale(),
        )));

        Self {
            shared,
            tasks: Mutex::new(tasks),
        }
    }

    /// Other editors and what they focus, ordered by user id.
    pub fn collaborators(&self) -> &Property<Vec<Collaborator>> {
        &self.shared.presence
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared.state).connected
    }

    /// Number of submissions not yet acknowledged.
    pub fn unacknowledged(&self) -> usize {
        lock(&self.shared.state).in_flight.len()
    }

    /// Announce that the local user is editing `(field, locale)`.
    pub async fn focus(&self, field: &str, locale: &str) -> Result<(), DocumentError> {
        self.announce(Some(Path::field_locale(field, locale))).await
    }

    pub async fn blur(&self) -> Result<(), DocumentError> {
        self.announce(None).await
    }

    async fn announce(&self, focus: Option<Path>) -> Result<(), DocumentError> {
        if self.shared.core.is_disposed() {
            return Err(DocumentError::Disposed);
        }
        Ok(self.shared.transport.announce(focus).await?)
    }
}

impl<T: OtTransport> EntityDocument for RealtimeDocument<T> {
    fn core(&self) -> &DocumentCore {
        &self.shared.core
    }

    fn commit(&self, change: LocalChange) -> PendingMutation {
        let result = self.shared.submit_local(change);
        Box::pin(async move { result })
    }

    fn dispose(&self) {
        self.shared.core.dispose();
        lock(&self.tasks).release_all();
        debug!("realtime document disposed");
    }
}

impl<T: OtTransport> Shared<T> {
    fn submit_local(&self, change: LocalChange) -> Result<(), DocumentError> {
        let mut state = lock(&self.state);
        // Read under the sync lock so remote edits applied since the store
        // write are already part of the value.
        let value = self.core.get_value_at(&change.scope);
        let base = state.base_for(&change.scope);
        let ops = diff(&change.scope, base.as_ref(), value.as_ref());
        if ops.is_empty() {
            return Ok(());
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .pending
            .insert(change.scope.clone(), (seq, value.clone()));
        state.in_flight.push_back(InFlight {
            seq,
            scope: change.scope,
            value,
            ops: ops.clone(),
        });
        metrics::counter!("folio_realtime_submissions_total").increment(1);
        if state.connected {
            self.outbound
                .send(Submission { seq, ops })
                .map_err(|_| DocumentError::Disposed)?;
        } else {
            debug!(seq, "queued while disconnected");
        }
        Ok(())
    }

    fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected => {
                lock(&self.state).connected = false;
                self.core.set_status(DocumentStatus::Disconnected);
            }
            TransportEvent::Acknowledged { seq } => self.on_acknowledged(seq),
            TransportEvent::Rejected { seq, error } => self.on_rejected(seq, error),
            TransportEvent::Remote { seq, ops } => self.on_remote(seq, ops),
            TransportEvent::SysChanged(sys) => {
                self.core.replace_sys(sys);
            }
            TransportEvent::PeerJoined(user_id) => self.update_presence(|p| {
                p.join(user_id);
            }),
            TransportEvent::PeerLeft(user_id) => self.update_presence(|p| {
                p.leave(&user_id);
            }),
            TransportEvent::Focus { user_id, path } => self.update_presence(|p| match path {
                Some(path) => p.focus(user_id, path),
                None => p.blur(&user_id),
            }),
        }
    }

    /// Resubmit everything not yet acknowledged, oldest first.
    fn on_connected(&self) {
        let mut state = lock(&self.state);
        state.connected = true;
        for entry in &state.in_flight {
            let submission = Submission {
                seq: entry.seq,
                ops: entry.ops.clone(),
            };
            if self.outbound.send(submission).is_err() {
                return;
            }
        }
        debug!(resubmitted = state.in_flight.len(), "transport connected");
        drop(state);
        if self.core.status() == DocumentStatus::Disconnected {
            self.core.clear_error();
        }
    }

    fn on_acknowledged(&self, seq: u64) {
        let mut state = lock(&self.state);
        while state.in_flight.front().is_some_and(|entry| entry.seq <= seq) {
            let Some(entry) = state.in_flight.pop_front() else {
                break;
            };
            state.set_acked(&entry.scope, entry.value);
            if state
                .pending
                .get(&entry.scope)
                .is_some_and(|(pending_seq, _)| *pending_seq == entry.seq)
            {
                state.pending.remove(&entry.scope);
            }
        }
    }

    /// Drop the refused edits for that scope and restore the acknowledged
    /// value locally.
    fn on_rejected(&self, seq: u64, error: TransportError) {
        let mut state = lock(&self.state);
        let Some(scope) = state
            .in_flight
            .iter()
            .find(|entry| entry.seq == seq)
            .map(|entry| entry.scope.clone())
        else {
            return;
        };
        warn!(seq, %scope, %error, "submission rejected; restoring acknowledged value");
        state.in_flight.retain(|entry| entry.scope != scope);
        state.pending.remove(&scope);
        let acked = state.acked_at(&scope);
        drop(state);

        let restored = self.core.mutate(|store| match acked {
            Some(value) => store.set_value_at(&scope, value),
            None => store.remove_value_at(&scope),
        });
        if let Err(e) = restored {
            warn!(%scope, error = %e, "could not restore rejected scope");
            self.core.set_status(DocumentStatus::DocumentError);
        }
    }

    fn on_remote(&self, seq: u64, ops: Vec<Operation>) {
        let mut state = lock(&self.state);
        if state.last_remote_seq.is_some_and(|last| seq <= last) {
            debug!(seq, "dropping replayed remote operations");
            return;
        }

        if let Err(e) = self.core.apply_remote(&ops) {
            warn!(seq, error = %e, "remote operations do not apply locally");
            drop(state);
            self.core.set_status(DocumentStatus::DocumentError);
            return;
        }
        state.last_remote_seq = Some(seq);
        metrics::counter!("folio_realtime_remote_ops_total").increment(ops.len() as u64);

        // The transport already holds these edits: fold them into every
        // baseline we diff against.
        for op in &ops {
            state.rebase(op, &self.core);
        }
    }

    fn update_presence(&self, f: impl FnOnce(&mut PresenceTracker)) {
        let snapshot = {
            let mut state = lock(&self.state);
            f(&mut state.presence);
            // Our own record is tracked by the transport, not shown to us.
            state.presence.leave(&self.user_id);
            state.presence.snapshot()
        };
        self.presence.set_if_changed(snapshot);
    }
}

/// Drain the outbound queue one submission at a time.
async fn submit_loop<T: OtTransport>(
    shared: Arc<Shared<T>>,
    mut rx: mpsc::UnboundedReceiver<Submission>,
) {
    while let Some(submission) = rx.recv().await {
        let seq = submission.seq;
        if let Err(e) = shared.transport.submit(submission).await {
            // Kept in flight; resubmitted on the next `Connected`.
            warn!(seq, error = %e, "submit failed");
            lock(&shared.state).connected = false;
            shared.core.set_status(DocumentStatus::Disconnected);
        }
    }
}

async fn event_loop<T: OtTransport>(shared: Arc<Shared<T>>, mut events: BoxStream<TransportEvent>) {
    while let Some(event) = events.next().await {
        if shared.core.is_disposed() {
            break;
        }
        shared.handle(event);
    }
    debug!("transport event stream ended");
    shared.core.set_status(DocumentStatus::Disconnected);
}

async fn prune_loop<T: OtTransport>(shared: Arc<Shared<T>>, max_age: std::time::Duration) {
    let mut interval = tokio::time::interval(max_age.max(std::time::Duration::from_secs(1)));
    loop {
        interval.tick().await;
        let snapshot = {
            let mut state = lock(&shared.state);
            if !state.presence.prune_stale_focus(max_age) {
                continue;
            }
            state.presence.snapshot()
        };
        shared.presence.set_if_changed(snapshot);
    }
}

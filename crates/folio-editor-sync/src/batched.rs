//! Batched strategy: local edits mark the document dirty and a debounced
//! flush persists the full field map in one request.
//!
//! One worker task per document owns the debounce timer and performs every
//! request, so at most one request is ever in flight. Edits made while a
//! request is outstanding are picked up by the next flush.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use folio_common::sync::lock;
use folio_common::{EditorConfig, Property, Subscription};
use folio_editor_core::{Entity, LocalChange, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::authority::{PersistRequest, PersistenceAuthority};
use crate::document::{DocumentCore, DocumentStatus, EntityDocument, PendingMutation};
use crate::error::{DocumentError, PersistenceError, PersistenceErrorKind};

type Reply = oneshot::Sender<Result<(), DocumentError>>;

enum Command {
    Changed,
    FlushNow(Reply),
    Reload(Reply),
}

/// Document persisted through a [`PersistenceAuthority`] in debounced batches.
pub struct BatchedDocument<A: PersistenceAuthority> {
    core: DocumentCore,
    commands: mpsc::UnboundedSender<Command>,
    dirty: Property<bool>,
    saving: Property<bool>,
    worker: Mutex<Option<Subscription>>,
    authority: Arc<A>,
}

impl<A: PersistenceAuthority> BatchedDocument<A> {
    /// Open a document over `entity` and start its worker on the current
    /// tokio runtime.
    pub fn open(entity: Entity, authority: Arc<A>, config: &EditorConfig) -> Self {
        let core = DocumentCore::new(entity);
        let dirty = Property::new(false);
        let saving = Property::new(false);
        let (commands, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            core: core.clone(),
            authority: authority.clone(),
            dirty: dirty.clone(),
            saving: saving.clone(),
            debounce: config.debounce(),
            trailing: config.saving_trailing(),
            skip_transformation: config.skip_transformation,
        };
        Self {
            core,
            commands,
            dirty,
            saving,
            worker: Mutex::new(Some(Subscription::spawn(worker.run(rx)))),
            authority,
        }
    }

    pub fn authority(&self) -> &Arc<A> {
        &self.authority
    }

    /// Whether there are edits the authority has not accepted yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn dirty(&self) -> &Property<bool> {
        &self.dirty
    }

    /// True from the start of a flush until shortly after it finishes.
    pub fn is_saving(&self) -> &Property<bool> {
        &self.saving
    }

    /// Flush now instead of waiting for the debounce window.
    pub async fn flush_now(&self) -> Result<(), DocumentError> {
        self.request(Command::FlushNow).await
    }

    /// Replace local data with the authority's copy and clear any conflict.
    /// Unsaved edits are discarded.
    pub async fn reload(&self) -> Result<(), DocumentError> {
        self.request(Command::Reload).await
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<(), DocumentError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| DocumentError::Disposed)?;
        rx.await.map_err(|_| DocumentError::Disposed)?
    }
}

impl<A: PersistenceAuthority> EntityDocument for BatchedDocument<A> {
    fn core(&self) -> &DocumentCore {
        &self.core
    }

    fn commit(&self, change: LocalChange) -> PendingMutation {
        self.dirty.set_if_changed(true);
        let result = self
            .commands
            .send(Command::Changed)
            .map_err(|_| DocumentError::Disposed);
        debug!(path = %change.path, revision = change.revision, "scheduled flush");
        Box::pin(async move { result })
    }

    /// Cancels the debounce timer. A request already in flight completes but
    /// its result is discarded.
    fn dispose(&self) {
        self.core.dispose();
        if let Some(worker) = lock(&self.worker).take() {
            worker.release();
        }
        debug!("batched document disposed");
    }
}

struct Worker<A> {
    core: DocumentCore,
    authority: Arc<A>,
    dirty: Property<bool>,
    saving: Property<bool>,
    debounce: Duration,
    trailing: Duration,
    skip_transformation: bool,
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl<A: PersistenceAuthority> Worker<A> {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut flush_at: Option<Instant> = None;
        let mut saving_clear_at: Option<Instant> = None;
        loop {
            tokio::select! {
                biased;
                command = rx.recv() => match command {
                    None => break,
                    Some(Command::Changed) => {
                        flush_at = Some(Instant::now() + self.debounce);
                    }
                    Some(Command::FlushNow(reply)) => {
                        flush_at = None;
                        let result = self.flush(&mut saving_clear_at).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Reload(reply)) => {
                        flush_at = None;
                        let _ = reply.send(self.reload().await);
                    }
                },
                _ = sleep_until(flush_at) => {
                    flush_at = None;
                    if let Err(e) = self.flush(&mut saving_clear_at).await {
                        debug!(error = %e, "debounced flush failed");
                    }
                }
                _ = sleep_until(saving_clear_at) => {
                    saving_clear_at = None;
                    self.saving.set_if_changed(false);
                }
            }
        }
    }

    /// Send the current field map with the last known version.
    async fn flush(&self, saving_clear_at: &mut Option<Instant>) -> Result<(), DocumentError> {
        if !self.dirty.get() {
            return Ok(());
        }
        let (sys, fields, revision) = self
            .core
            .read(|store| (store.sys().clone(), store.fields(), store.revision()));
        let request =
            PersistRequest::put(sys.resource_path(), sys.version, Some(Value::Object(fields)))
                .skip_transformation(self.skip_transformation);

        self.saving.set_if_changed(true);
        *saving_clear_at = None;
        metrics::counter!("folio_batched_flushes_total").increment(1);
        debug!(version = sys.version, revision, "flushing");

        let result = self.detached(request).await;
        *saving_clear_at = Some(Instant::now() + self.trailing);

        if self.core.is_disposed() {
            return Err(DocumentError::Disposed);
        }

        match result {
            Ok(response) => {
                self.accept(response, revision);
                self.core.clear_error();
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                warn!(version = sys.version, "edit conflict; keeping local edits");
                metrics::counter!("folio_batched_conflicts_total").increment(1);
                self.core.set_status(DocumentStatus::EditConflict);
                Err(e.into())
            }
            Err(e) => {
                warn!(error = %e, "flush failed");
                metrics::counter!("folio_batched_failures_total").increment(1);
                self.core.set_status(DocumentStatus::InternalServerError);
                Err(e.into())
            }
        }
    }

    /// Take the authority's response. If nothing changed locally since the
    /// request was built, the response replaces local data and the document
    /// is clean; otherwise only `sys` is taken and the newer local edits stay
    /// dirty.
    fn accept(&self, response: Option<Entity>, revision: u64) {
        let dirty = &self.dirty;
        self.core.accept_response(response, revision, || {
            dirty.set_if_changed(false);
        });
    }

    async fn reload(&self) -> Result<(), DocumentError> {
        let sys = self.core.sys();
        let result = self.detached(PersistRequest::get(sys.resource_path())).await;
        if self.core.is_disposed() {
            return Err(DocumentError::Disposed);
        }
        match result? {
            Some(entity) => {
                self.core.replace_entity(entity);
                self.dirty.set_if_changed(false);
                self.core.clear_error();
                Ok(())
            }
            None => Err(
                PersistenceError::new(PersistenceErrorKind::NotFound, "reload returned no entity")
                    .into(),
            ),
        }
    }

    /// Run the request on its own task so tearing down the worker does not
    /// cancel it.
    fn detached(
        &self,
        request: PersistRequest,
    ) -> impl Future<Output = Result<Option<Entity>, PersistenceError>> + Send + 'static {
        let authority = self.authority.clone();
        let core = self.core.clone();
        let handle = tokio::spawn(async move {
            let result = authority.request(request).await;
            if core.is_disposed() {
                warn!("document disposed during request; discarding result");
            }
            result
        });
        async move {
            handle.await.unwrap_or_else(|e| {
                Err(PersistenceError::new(
                    PersistenceErrorKind::Transport,
                    e.to_string(),
                ))
            })
        }
    }
}

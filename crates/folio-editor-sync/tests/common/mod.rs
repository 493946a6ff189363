//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use folio_common::EditorConfig;
use folio_editor_core::{Entity, EntityType, Fields, Path};
use folio_editor_sync::{
    Method, OtTransport, PersistRequest, PersistenceAuthority, PersistenceError, Submission,
    TransportError, TransportEvent,
};
use n0_future::Stream;
use n0_future::boxed::BoxStream;
use tokio::sync::mpsc;

pub fn config() -> EditorConfig {
    EditorConfig::default()
}

pub fn entity(version: u64) -> Entity {
    let mut entity = Entity::new_local("e1", EntityType::Entry, Some("article".into()));
    entity.sys.version = version;
    entity
}

/// Let spawned workers run. Time is paused in these tests, so this only
/// advances the virtual clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

type Scripted = Result<Option<Entity>, PersistenceError>;

/// Authority holding one entity. Every accepted write bumps `version`;
/// publishing and archiving record the version they were applied to.
pub struct MemoryAuthority {
    state: Mutex<AuthorityState>,
    delay: Duration,
}

struct AuthorityState {
    entity: Entity,
    calls: Vec<PersistRequest>,
    scripted: VecDeque<Scripted>,
}

impl MemoryAuthority {
    pub fn new(entity: Entity) -> Self {
        Self::with_delay(entity, Duration::ZERO)
    }

    /// Every request takes `delay` to answer.
    pub fn with_delay(entity: Entity, delay: Duration) -> Self {
        Self {
            state: Mutex::new(AuthorityState {
                entity,
                calls: Vec::new(),
                scripted: VecDeque::new(),
            }),
            delay,
        }
    }

    /// Answer the next request with `response` instead of the stored entity.
    pub fn script(&self, response: Scripted) {
        self.state.lock().unwrap().scripted.push_back(response);
    }

    pub fn calls(&self) -> Vec<PersistRequest> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn entity(&self) -> Entity {
        self.state.lock().unwrap().entity.clone()
    }
}

impl AuthorityState {
    fn handle(&mut self, request: PersistRequest) -> Scripted {
        let sys = &mut self.entity.sys;
        if request.method != Method::Get && request.version != Some(sys.version) {
            return Err(PersistenceError::version_mismatch());
        }
        let suffix = request.path.get(2).map(|s| s.as_str());
        match (request.method, suffix) {
            (Method::Get, _) => return Ok(Some(self.entity.clone())),
            (Method::Put, None) => {
                if let Some(serde_json::Value::Object(fields)) = request.data {
                    self.entity.fields = fields;
                }
            }
            (Method::Put, Some("published")) => sys.published_version = Some(sys.version),
            (Method::Delete, Some("published")) => sys.published_version = None,
            (Method::Put, Some("archived")) => sys.archived_version = Some(sys.version),
            (Method::Delete, Some("archived")) => sys.archived_version = None,
            (Method::Delete, None) => {
                sys.deleted_version = Some(sys.version);
                return Ok(None);
            }
            _ => return Err(PersistenceError::new(
                folio_editor_sync::PersistenceErrorKind::NotFound,
                "no such resource",
            )),
        }
        self.entity.sys.version += 1;
        Ok(Some(self.entity.clone()))
    }
}

impl PersistenceAuthority for MemoryAuthority {
    async fn request(&self, request: PersistRequest) -> Result<Option<Entity>, PersistenceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(request.clone());
        match state.scripted.pop_front() {
            Some(response) => response,
            None => state.handle(request),
        }
    }
}

struct EventStream(mpsc::UnboundedReceiver<TransportEvent>);

impl Stream for EventStream {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_recv(cx)
    }
}

/// Transport whose events are pushed by the test.
pub struct ScriptedTransport {
    submitted: Mutex<Vec<Submission>>,
    announced: Mutex<Vec<Option<Path>>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    fail_submits: AtomicBool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            submitted: Mutex::new(Vec::new()),
            announced: Mutex::new(Vec::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            fail_submits: AtomicBool::new(false),
        }
    }

    pub fn emit(&self, event: TransportEvent) {
        self.events_tx.send(event).unwrap();
    }

    pub fn submitted(&self) -> Vec<Submission> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submitted_seqs(&self) -> Vec<u64> {
        self.submitted().iter().map(|s| s.seq).collect()
    }

    pub fn announced(&self) -> Vec<Option<Path>> {
        self.announced.lock().unwrap().clone()
    }

    pub fn fail_submits(&self, fail: bool) {
        self.fail_submits.store(fail, Ordering::SeqCst);
    }
}

impl OtTransport for ScriptedTransport {
    async fn submit(&self, submission: Submission) -> Result<(), TransportError> {
        if self.fail_submits.load(Ordering::SeqCst) {
            return Err(TransportError::Send("socket closed".into()));
        }
        self.submitted.lock().unwrap().push(submission);
        Ok(())
    }

    async fn announce(&self, focus: Option<Path>) -> Result<(), TransportError> {
        self.announced.lock().unwrap().push(focus);
        Ok(())
    }

    fn events(&self) -> BoxStream<TransportEvent> {
        match self.events_rx.lock().unwrap().take() {
            Some(rx) => Box::pin(EventStream(rx)),
            None => Box::pin(EventStream(mpsc::unbounded_channel().1)),
        }
    }
}

pub fn fields(value: serde_json::Value) -> Fields {
    serde_json::from_value(value).unwrap()
}

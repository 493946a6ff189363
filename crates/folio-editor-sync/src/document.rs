//! Shared document plumbing and the `EntityDocument` trait.
//!
//! A document owns one `PathValueStore`. Mutations are applied to the store
//! synchronously under a write lock, published on the change notifier, and
//! then handed to the sync strategy through [`EntityDocument::commit`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use folio_common::Property;
use folio_common::sync::{read, write};
use folio_editor_core::{
    ChangeNotifier, ChangeStream, Entity, EntitySys, LocalChange, Operation, Path, PathValueStore,
    ResourceState, StoreError, Value, rich_text,
};
use n0_future::boxed::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DocumentError;

/// Resolves once the strategy has taken over a mutation (queued, scheduled or
/// submitted), not once it is durable.
pub type PendingMutation = BoxFuture<Result<(), DocumentError>>;

/// Observable health of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentStatus {
    #[default]
    Ok,
    /// The authority rejected a save because our version is stale.
    EditConflict,
    /// A save failed for any other reason.
    InternalServerError,
    /// The realtime transport is down.
    Disconnected,
    /// The document could not be kept consistent with the remote session.
    DocumentError,
    Archived,
    Deleted,
}

impl DocumentStatus {
    /// Statuses in which the document cannot accept edits at all.
    pub fn is_unrecoverable(self) -> bool {
        matches!(
            self,
            DocumentStatus::Disconnected | DocumentStatus::DocumentError | DocumentStatus::Deleted
        )
    }

    fn with_lifecycle(self, state: ResourceState) -> Self {
        match (self, state) {
            (_, ResourceState::Deleted) => DocumentStatus::Deleted,
            (DocumentStatus::Ok, ResourceState::Archived) => DocumentStatus::Archived,
            (DocumentStatus::Archived, s) if s != ResourceState::Archived => DocumentStatus::Ok,
            (status, _) => status,
        }
    }
}

/// State every strategy shares: the store, the notifier, and observable
/// `sys` / status. Cheap to clone; clones refer to the same document.
#[derive(Clone)]
pub struct DocumentCore {
    store: Arc<RwLock<PathValueStore>>,
    notifier: ChangeNotifier,
    sys: Property<EntitySys>,
    status: Property<DocumentStatus>,
    disposed: Arc<AtomicBool>,
}

impl DocumentCore {
    pub fn new(entity: Entity) -> Self {
        let sys = entity.sys.clone();
        let status = DocumentStatus::Ok.with_lifecycle(ResourceState::from_sys(&sys));
        Self {
            store: Arc::new(RwLock::new(PathValueStore::new(entity))),
            notifier: ChangeNotifier::new(),
            sys: Property::new(sys),
            status: Property::new(status),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `f` with shared access to the store.
    pub fn read<R>(&self, f: impl FnOnce(&PathValueStore) -> R) -> R {
        f(&read(&self.store))
    }

    /// Run `f` with exclusive access to the store. Nothing is published.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut PathValueStore) -> R) -> R {
        f(&mut write(&self.store))
    }

    pub fn get_value_at(&self, path: &Path) -> Option<Value> {
        self.read(|store| store.get_value_at(path))
    }

    pub fn entity(&self) -> Entity {
        self.read(PathValueStore::entity)
    }

    /// Apply a local mutation and publish its path.
    pub fn mutate(
        &self,
        f: impl FnOnce(&mut PathValueStore) -> Result<LocalChange, StoreError>,
    ) -> Result<LocalChange, DocumentError> {
        if self.is_disposed() {
            return Err(DocumentError::Disposed);
        }
        let change = self.write(f)?;
        self.notifier.notify(change.path.clone());
        Ok(change)
    }

    /// Apply operations received from another editor, publishing each path
    /// the same way a local edit would be.
    ///
    /// The batch is applied all or nothing: if any operation is rejected the
    /// store is left untouched and nothing is published.
    pub fn apply_remote(&self, ops: &[Operation]) -> Result<Vec<LocalChange>, DocumentError> {
        if self.is_disposed() {
            return Err(DocumentError::Disposed);
        }
        let changes = self.write(|store| store.apply_all(ops))?;
        for change in &changes {
            self.notifier.notify(change.path.clone());
        }
        Ok(changes)
    }

    /// Replace `sys` with the authority's copy. A `sys` older than the one
    /// held is ignored; returns whether it was taken.
    pub fn replace_sys(&self, sys: EntitySys) -> bool {
        let current = self.write(|store| {
            let current = store.sys().version;
            if sys.version >= current {
                store.replace_sys(sys.clone());
            }
            current
        });
        if sys.version < current {
            warn!(version = sys.version, current, "ignoring stale sys");
            return false;
        }
        self.publish_sys(sys);
        true
    }

    /// Replace the whole entity with the authority's copy.
    pub fn replace_entity(&self, entity: Entity) {
        let sys = entity.sys.clone();
        self.write(|store| store.replace_entity(entity));
        self.notifier.notify(Path::fields());
        self.publish_sys(sys);
    }

    /// Take the authority's answer to a request built at store `revision`.
    ///
    /// If the store is still at `revision` the whole entity is replaced and
    /// `settled` runs under the same write guard, so no local edit can land
    /// in between. Otherwise only `sys` is taken. Returns whether the store
    /// was still at `revision`.
    pub(crate) fn accept_response(
        &self,
        response: Option<Entity>,
        revision: u64,
        settled: impl FnOnce(),
    ) -> bool {
        let (unchanged, sys, replaced) = self.write(|store| {
            let unchanged = store.revision() == revision;
            let (sys, replaced) = match response {
                Some(entity) if unchanged => {
                    let sys = entity.sys.clone();
                    store.replace_entity(entity);
                    (Some(sys), true)
                }
                Some(entity) if entity.sys.version >= store.sys().version => {
                    store.replace_sys(entity.sys.clone());
                    (Some(entity.sys), false)
                }
                Some(entity) => {
                    warn!(version = entity.sys.version, "ignoring stale sys");
                    (None, false)
                }
                None => (None, false),
            };
            if unchanged {
                settled();
            }
            (unchanged, sys, replaced)
        });
        if replaced {
            self.notifier.notify(Path::fields());
        }
        if let Some(sys) = sys {
            self.publish_sys(sys);
        }
        unchanged
    }

    fn publish_sys(&self, sys: EntitySys) {
        let state = ResourceState::from_sys(&sys);
        self.status.update(|status| {
            let next = status.with_lifecycle(state);
            let changed = next != *status;
            *status = next;
            changed
        });
        self.sys.set_if_changed(sys);
    }

    pub fn sys(&self) -> EntitySys {
        self.sys.get()
    }

    pub fn sys_property(&self) -> &Property<EntitySys> {
        &self.sys
    }

    pub fn status(&self) -> DocumentStatus {
        self.status.get()
    }

    pub fn status_property(&self) -> &Property<DocumentStatus> {
        &self.status
    }

    pub fn set_status(&self, status: DocumentStatus) {
        if self.status.set_if_changed(status) {
            tracing::debug!(?status, "document status");
        }
    }

    /// Back to `Ok`, or to the lifecycle status (`Archived`, `Deleted`).
    pub fn clear_error(&self) {
        let state = ResourceState::from_sys(&self.sys());
        self.set_status(DocumentStatus::Ok.with_lifecycle(state));
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Mark the document torn down and end all change streams.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.notifier.close();
        }
    }
}

fn ready(result: Result<(), DocumentError>) -> PendingMutation {
    Box::pin(async move { result })
}

/// A live, path-addressable view over one entity.
///
/// Implementors supply the shared [`DocumentCore`] and a sync strategy via
/// [`commit`](EntityDocument::commit); everything else is provided.
pub trait EntityDocument {
    fn core(&self) -> &DocumentCore;

    /// Hand an already applied local change to the sync strategy.
    fn commit(&self, change: LocalChange) -> PendingMutation;

    /// Tear down the document. Later mutations fail with `Disposed`.
    fn dispose(&self) {
        self.core().dispose();
    }

    fn mutate(
        &self,
        f: impl FnOnce(&mut PathValueStore) -> Result<LocalChange, StoreError>,
    ) -> PendingMutation
    where
        Self: Sized,
    {
        match self.core().mutate(f) {
            Ok(change) => self.commit(change),
            Err(e) => ready(Err(e)),
        }
    }

    fn get_value_at(&self, path: &Path) -> Option<Value> {
        self.core().get_value_at(path)
    }

    /// Store `value` at `path`. The empty rich-text document is stored as
    /// absence.
    fn set_value_at(&self, path: &Path, value: Value) -> PendingMutation
    where
        Self: Sized,
    {
        if rich_text::is_empty_document(&value) {
            return self.remove_value_at(path);
        }
        self.mutate(|store| store.set_value_at(path, value))
    }

    fn remove_value_at(&self, path: &Path) -> PendingMutation
    where
        Self: Sized,
    {
        self.mutate(|store| store.remove_value_at(path))
    }

    fn push_value_at(&self, path: &Path, value: Value) -> PendingMutation
    where
        Self: Sized,
    {
        self.mutate(|store| store.push_value_at(path, value))
    }

    fn insert_value_at(&self, path: &Path, index: usize, value: Value) -> PendingMutation
    where
        Self: Sized,
    {
        self.mutate(|store| store.insert_value_at(path, index, value))
    }

    fn field_value(&self, field: &str, locale: &str) -> Option<Value> {
        self.get_value_at(&Path::field_locale(field, locale))
    }

    fn set_field_value(&self, field: &str, locale: &str, value: Option<Value>) -> PendingMutation
    where
        Self: Sized,
    {
        let path = Path::field_locale(field, locale);
        match value {
            Some(value) => self.set_value_at(&path, value),
            None => self.remove_value_at(&path),
        }
    }

    fn sys(&self) -> EntitySys {
        self.core().sys()
    }

    fn state(&self) -> ResourceState {
        ResourceState::from_sys(&self.core().sys())
    }

    fn status(&self) -> DocumentStatus {
        self.core().status()
    }

    fn subscribe_changes(&self) -> ChangeStream {
        self.core().notifier().subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_editor_core::EntityType;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records commits instead of persisting them.
    struct Recording {
        core: DocumentCore,
        commits: Mutex<Vec<LocalChange>>,
    }

    impl EntityDocument for Recording {
        fn core(&self) -> &DocumentCore {
            &self.core
        }

        fn commit(&self, change: LocalChange) -> PendingMutation {
            self.commits.lock().unwrap().push(change);
            ready(Ok(()))
        }
    }

    fn doc() -> Recording {
        Recording {
            core: DocumentCore::new(Entity::new_local("e1", EntityType::Entry, None)),
            commits: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_mutation_is_visible_before_commit_resolves() {
        let doc = doc();
        let mut changes = doc.subscribe_changes();
        let pending = doc.set_field_value("title", "en", Some(json!("Hello")));

        assert_eq!(doc.field_value("title", "en"), Some(json!("Hello")));
        assert_eq!(changes.try_recv(), Some(Path::field_locale("title", "en")));
        pending.await.unwrap();
        assert_eq!(doc.commits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_rich_text_is_removed() {
        let doc = doc();
        doc.set_field_value("body", "en", Some(json!("x"))).await.unwrap();
        doc.set_field_value("body", "en", Some(rich_text::empty_document()))
            .await
            .unwrap();
        assert_eq!(doc.field_value("body", "en"), None);
    }

    #[tokio::test]
    async fn test_store_errors_resolve_as_rejections() {
        let doc = doc();
        let err = doc
            .set_value_at(&Path::parse("/sys/version"), json!(3))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Store(StoreError::ReadOnlyPath(_))));
        assert!(doc.commits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disposed_document_rejects_mutations() {
        let doc = doc();
        doc.dispose();
        let err = doc
            .set_field_value("title", "en", Some(json!("late")))
            .await
            .unwrap_err();
        assert_eq!(err, DocumentError::Disposed);
        assert_eq!(doc.field_value("title", "en"), None);
    }

    #[test]
    fn test_status_follows_lifecycle() {
        let mut entity = Entity::new_local("e1", EntityType::Entry, None);
        entity.sys.archived_version = Some(1);
        let core = DocumentCore::new(entity);
        assert_eq!(core.status(), DocumentStatus::Archived);

        let mut sys = core.sys();
        sys.archived_version = None;
        sys.version = 2;
        core.replace_sys(sys.clone());
        assert_eq!(core.status(), DocumentStatus::Ok);

        sys.deleted_version = Some(2);
        core.replace_sys(sys);
        assert_eq!(core.status(), DocumentStatus::Deleted);
        assert!(core.status().is_unrecoverable());
    }

    #[test]
    fn test_older_sys_is_ignored() {
        let core = DocumentCore::new(Entity::new_local("e1", EntityType::Entry, None));
        let mut newer = core.sys();
        newer.version = 5;
        assert!(core.replace_sys(newer.clone()));

        let mut stale = newer.clone();
        stale.version = 3;
        stale.published_version = Some(2);
        assert!(!core.replace_sys(stale));
        assert_eq!(core.sys(), newer);
        assert_eq!(core.read(|store| store.sys().version), 5);
    }

    #[test]
    fn test_failed_remote_batch_changes_nothing() {
        let core = DocumentCore::new(Entity::new_local("e1", EntityType::Entry, None));
        let mut changes = core.notifier().subscribe();
        let batch = [
            Operation::insert(Path::field_locale("title", "de"), json!("half")),
            Operation::insert(Path::field_locale("tags", "en").index(5), json!("x")),
        ];
        assert!(core.apply_remote(&batch).is_err());
        assert_eq!(core.get_value_at(&Path::field_locale("title", "de")), None);
        assert_eq!(changes.try_recv(), None);
    }

    #[test]
    fn test_response_does_not_clobber_newer_edits() {
        let core = DocumentCore::new(Entity::new_local("e1", EntityType::Entry, None));
        let revision = core.read(PathValueStore::revision);
        let mut response = core.entity();
        response.sys.version = 2;
        response.fields = serde_json::from_value(json!({"title": {"en": "server"}})).unwrap();

        // a local edit lands while the request is out
        core.mutate(|store| store.set_value_at(&Path::field_locale("title", "en"), json!("mine")))
            .unwrap();
        let mut settled = false;
        assert!(!core.accept_response(Some(response.clone()), revision, || settled = true));
        assert!(!settled);
        assert_eq!(core.get_value_at(&Path::field_locale("title", "en")), Some(json!("mine")));
        assert_eq!(core.sys().version, 2);

        let revision = core.read(PathValueStore::revision);
        response.sys.version = 3;
        assert!(core.accept_response(Some(response), revision, || settled = true));
        assert!(settled);
        assert_eq!(core.get_value_at(&Path::field_locale("title", "en")), Some(json!("server")));
    }
}

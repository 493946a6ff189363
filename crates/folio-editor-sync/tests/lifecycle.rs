mod common;

use std::sync::{Arc, Mutex};

use common::{MemoryAuthority, config, entity, settle};
use folio_editor_core::{Action, ResourceState};
use folio_editor_sync::{
    ActionError, ActionObserver, ActionOutcome, ActionPermissions, BatchedDocument,
    DocumentStatus, EntityDocument, PersistenceError, PersistenceErrorKind, PublicationWarnings,
    ResourceStateManager, Validator, WarningsDismissed,
};
use n0_future::boxed::BoxFuture;
use serde_json::json;

fn allow_all() -> Arc<dyn ActionPermissions> {
    Arc::new(|_: Action| true)
}

struct Setup {
    authority: Arc<MemoryAuthority>,
    doc: BatchedDocument<MemoryAuthority>,
    manager: ResourceStateManager<MemoryAuthority>,
}

fn setup(version: u64, permissions: Arc<dyn ActionPermissions>) -> Setup {
    let authority = Arc::new(MemoryAuthority::new(entity(version)));
    let doc = BatchedDocument::open(authority.entity(), authority.clone(), &config());
    let manager = ResourceStateManager::new(doc.core().clone(), authority.clone(), permissions);
    Setup {
        authority,
        doc,
        manager,
    }
}

#[derive(Default)]
struct RecordingObserver(Mutex<Vec<(Action, ActionOutcome)>>);

impl ActionObserver for RecordingObserver {
    fn on_outcome(&self, action: Action, outcome: &ActionOutcome) {
        self.0.lock().unwrap().push((action, outcome.clone()));
    }
}

struct StubValidator {
    valid: bool,
    api_errors: Mutex<Vec<PersistenceError>>,
}

impl Validator for StubValidator {
    fn run(&self) -> bool {
        self.valid
    }

    fn set_api_response_errors(&self, error: &PersistenceError) {
        self.api_errors.lock().unwrap().push(error.clone());
    }
}

struct Warnings {
    accept: bool,
}

impl PublicationWarnings for Warnings {
    fn show(&self) -> BoxFuture<Result<(), WarningsDismissed>> {
        let accept = self.accept;
        Box::pin(async move { if accept { Ok(()) } else { Err(WarningsDismissed) } })
    }
}

#[tokio::test(start_paused = true)]
async fn test_publish_draft_scenario() {
    let Setup {
        authority, manager, ..
    } = setup(5, allow_all());
    assert_eq!(manager.state(), ResourceState::Draft);

    let mut published = entity(6);
    published.sys.published_version = Some(6);
    authority.script(Ok(Some(published)));

    assert_eq!(manager.publish().await.unwrap(), ResourceState::Published);
    settle().await;
    assert_eq!(manager.state_property().get(), ResourceState::Published);
}

#[tokio::test(start_paused = true)]
async fn test_edit_after_publish_is_changed() {
    let Setup { doc, manager, .. } = setup(1, allow_all());

    manager.publish().await.unwrap();
    assert_eq!(doc.sys().published_version, Some(1));
    assert_eq!(doc.sys().version, 2);
    assert_eq!(manager.state(), ResourceState::Published);
    assert_eq!(manager.available_actions(), vec![Action::Unpublish]);

    doc.set_field_value("title", "en", Some(json!("edited"))).await.unwrap();
    doc.flush_now().await.unwrap();
    assert_eq!(doc.sys().version, 3);
    assert_eq!(manager.state(), ResourceState::Changed);

    manager.publish().await.unwrap();
    assert_eq!(manager.state(), ResourceState::Published);
}

#[tokio::test(start_paused = true)]
async fn test_illegal_and_forbidden_actions_make_no_request() {
    let deny_delete: Arc<dyn ActionPermissions> = Arc::new(|a: Action| a != Action::Delete);
    let Setup {
        authority, manager, ..
    } = setup(1, deny_delete);

    assert_eq!(
        manager.unpublish().await.unwrap_err(),
        ActionError::Illegal {
            action: Action::Unpublish,
            state: ResourceState::Draft
        }
    );
    assert_eq!(
        manager.delete().await.unwrap_err(),
        ActionError::NotPermitted(Action::Delete)
    );
    assert_eq!(manager.available_actions(), vec![Action::Archive, Action::Publish]);
    assert!(authority.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_local_validation_blocks_publish() {
    let observer = Arc::new(RecordingObserver::default());
    let Setup {
        authority, manager, ..
    } = setup(1, allow_all());
    let manager = manager
        .with_validator(Arc::new(StubValidator {
            valid: false,
            api_errors: Mutex::new(Vec::new()),
        }))
        .with_observer(observer.clone());

    assert_eq!(manager.publish().await.unwrap_err(), ActionError::ValidationFailed);
    assert!(authority.calls().is_empty());
    let outcomes = observer.0.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], (Action::Publish, ActionOutcome::Failed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_dismissed_warnings_cancel_publish() {
    let Setup {
        authority, manager, ..
    } = setup(1, allow_all());
    let manager = manager.with_warnings(Arc::new(Warnings { accept: false }));
    assert_eq!(manager.publish().await.unwrap_err(), ActionError::Cancelled);
    assert!(authority.calls().is_empty());

    let manager = manager.with_warnings(Arc::new(Warnings { accept: true }));
    assert_eq!(manager.publish().await.unwrap(), ResourceState::Published);
}

#[tokio::test(start_paused = true)]
async fn test_server_validation_errors_reach_the_validator() {
    let validator = Arc::new(StubValidator {
        valid: true,
        api_errors: Mutex::new(Vec::new()),
    });
    let Setup {
        authority, manager, ..
    } = setup(1, allow_all());
    let manager = manager.with_validator(validator.clone());
    authority.script(Err(PersistenceError::new(
        PersistenceErrorKind::Client(422),
        "title is required",
    )));

    let err = manager.publish().await.unwrap_err();
    assert!(matches!(err, ActionError::Persistence(ref e) if e.is_validation()));
    assert_eq!(validator.api_errors.lock().unwrap().len(), 1);
    assert_eq!(manager.state(), ResourceState::Draft);
}

#[tokio::test(start_paused = true)]
async fn test_failed_action_leaves_state() {
    let Setup {
        authority, manager, ..
    } = setup(1, allow_all());
    authority.script(Err(PersistenceError::new(PersistenceErrorKind::Server(500), "boom")));
    assert!(manager.archive().await.is_err());
    assert_eq!(manager.state(), ResourceState::Draft);
    assert_eq!(manager.in_progress(), None);
}

#[tokio::test(start_paused = true)]
async fn test_archive_and_unarchive() {
    let Setup { doc, manager, .. } = setup(1, allow_all());
    assert_eq!(manager.archive().await.unwrap(), ResourceState::Archived);
    assert_eq!(doc.status(), DocumentStatus::Archived);
    assert_eq!(manager.unarchive().await.unwrap(), ResourceState::Draft);
    assert_eq!(doc.status(), DocumentStatus::Ok);
}

#[tokio::test(start_paused = true)]
async fn test_delete_is_terminal() {
    let Setup { doc, manager, .. } = setup(3, allow_all());
    assert_eq!(manager.delete().await.unwrap(), ResourceState::Deleted);
    assert_eq!(doc.sys().deleted_version, Some(3));
    assert_eq!(doc.status(), DocumentStatus::Deleted);
    assert!(manager.available_actions().is_empty());
    assert!(matches!(
        manager.archive().await.unwrap_err(),
        ActionError::Illegal { .. }
    ));
}

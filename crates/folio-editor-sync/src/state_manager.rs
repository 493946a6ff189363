//! Lifecycle actions (publish, archive, ...) and their side effects.
//!
//! The lifecycle state itself is derived from `sys`; this module checks an
//! action against that state and the user's permissions, runs the
//! pre-publish collaborators, sends the request, and installs the returned
//! `sys`.

use std::sync::{Arc, Mutex};

use folio_common::sync::lock;
use folio_common::{Property, Subscription};
use folio_editor_core::{Action, EntitySys, ResourceState};
use n0_future::boxed::BoxFuture;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::authority::{PersistRequest, PersistenceAuthority};
use crate::document::DocumentCore;
use crate::error::{ActionError, PersistenceError, PersistenceErrorKind};

/// Whether the current user may perform a lifecycle action.
pub trait ActionPermissions: Send + Sync {
    fn can(&self, action: Action) -> bool;
}

/// Entity-level validation run before publishing.
pub trait Validator: Send + Sync {
    /// Validate locally. `false` blocks the publish.
    fn run(&self) -> bool;

    /// Show validation errors the authority reported after submission.
    fn set_api_response_errors(&self, error: &PersistenceError);
}

/// The user dismissed the publication warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningsDismissed;

/// Warnings the user must acknowledge before publishing, such as references
/// to unpublished entries.
pub trait PublicationWarnings: Send + Sync {
    fn show(&self) -> BoxFuture<Result<(), WarningsDismissed>>;
}

/// How an action ended, for notification and analytics.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Succeeded { state: ResourceState },
    Failed { error: SmolStr },
}

/// Told about every action outcome. Never influences control flow.
pub trait ActionObserver: Send + Sync {
    fn on_outcome(&self, action: Action, outcome: &ActionOutcome);
}

impl<F> ActionPermissions for F
where
    F: Fn(Action) -> bool + Send + Sync,
{
    fn can(&self, action: Action) -> bool {
        self(action)
    }
}

/// Drives lifecycle actions for one document.
pub struct ResourceStateManager<A: PersistenceAuthority> {
    core: DocumentCore,
    authority: Arc<A>,
    permissions: Arc<dyn ActionPermissions>,
    validator: Option<Arc<dyn Validator>>,
    warnings: Option<Arc<dyn PublicationWarnings>>,
    observer: Option<Arc<dyn ActionObserver>>,
    state: Property<ResourceState>,
    in_progress: Mutex<Option<Action>>,
    _watch: Subscription,
}

impl<A: PersistenceAuthority> ResourceStateManager<A> {
    /// Must be called within a tokio runtime; `state()` is kept current by a
    /// listener on the document's `sys`.
    pub fn new(
        core: DocumentCore,
        authority: Arc<A>,
        permissions: Arc<dyn ActionPermissions>,
    ) -> Self {
        let state = Property::new(ResourceState::from_sys(&core.sys()));
        let watch = {
            let state = state.clone();
            core.sys_property().for_each(move |sys| {
                state.set_if_changed(ResourceState::from_sys(&sys));
            })
        };
        Self {
            core,
            authority,
            permissions,
            validator: None,
            warnings: None,
            observer: None,
            state,
            in_progress: Mutex::new(None),
            _watch: watch,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_warnings(mut self, warnings: Arc<dyn PublicationWarnings>) -> Self {
        self.warnings = Some(warnings);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ActionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Current state, derived from the document's `sys`.
    pub fn state(&self) -> ResourceState {
        ResourceState::from_sys(&self.core.sys())
    }

    pub fn state_property(&self) -> &Property<ResourceState> {
        &self.state
    }

    /// Actions that are both legal now and permitted.
    pub fn available_actions(&self) -> Vec<Action> {
        self.state()
            .available_actions()
            .into_iter()
            .filter(|action| self.permissions.can(*action))
            .collect()
    }

    pub fn in_progress(&self) -> Option<Action> {
        *lock(&self.in_progress)
    }

    pub async fn publish(&self) -> Result<ResourceState, ActionError> {
        self.apply(Action::Publish).await
    }

    pub async fn unpublish(&self) -> Result<ResourceState, ActionError> {
        self.apply(Action::Unpublish).await
    }

    pub async fn archive(&self) -> Result<ResourceState, ActionError> {
        self.apply(Action::Archive).await
    }

    pub async fn unarchive(&self) -> Result<ResourceState, ActionError> {
        self.apply(Action::Unarchive).await
    }

    pub async fn delete(&self) -> Result<ResourceState, ActionError> {
        self.apply(Action::Delete).await
    }

    /// Run `action`. On success the authority's `sys` replaces the local one
    /// and the new state is returned; on failure nothing local changes.
    pub async fn apply(&self, action: Action) -> Result<ResourceState, ActionError> {
        {
            let mut in_progress = lock(&self.in_progress);
            if let Some(running) = *in_progress {
                return Err(ActionError::InProgress(running));
            }
            *in_progress = Some(action);
        }
        let result = self.run(action).await;
        *lock(&self.in_progress) = None;

        let outcome = match &result {
            Ok(state) => ActionOutcome::Succeeded { state: *state },
            Err(e) => ActionOutcome::Failed {
                error: smol_str::format_smolstr!("{e}"),
            },
        };
        if let Some(observer) = &self.observer {
            observer.on_outcome(action, &outcome);
        }
        metrics::counter!("folio_actions_total", "action" => action.as_str()).increment(1);
        result
    }

    async fn run(&self, action: Action) -> Result<ResourceState, ActionError> {
        if self.core.is_disposed() {
            return Err(ActionError::Disposed);
        }
        let state = self.state();
        if !state.allows(action) {
            return Err(ActionError::Illegal { action, state });
        }
        if !self.permissions.can(action) {
            return Err(ActionError::NotPermitted(action));
        }
        if action == Action::Publish {
            self.before_publish().await?;
        }

        let sys = self.core.sys();
        debug!(%action, version = sys.version, "sending action");
        let response = self.authority.request(request_for(action, &sys)).await;
        if self.core.is_disposed() {
            return Err(ActionError::Disposed);
        }

        let next = match response {
            Ok(Some(entity)) => entity.sys,
            Ok(None) if action == Action::Delete => EntitySys {
                deleted_version: Some(sys.version),
                ..sys
            },
            Ok(None) => {
                return Err(PersistenceError::new(
                    PersistenceErrorKind::Transport,
                    "response carried no entity",
                )
                .into());
            }
            Err(e) => {
                warn!(%action, error = %e, "action failed");
                if action == Action::Publish && e.is_validation() {
                    if let Some(validator) = &self.validator {
                        validator.set_api_response_errors(&e);
                    }
                }
                return Err(e.into());
            }
        };

        self.core.replace_sys(next);
        let state = self.state();
        info!(%action, ?state, "action succeeded");
        Ok(state)
    }

    async fn before_publish(&self) -> Result<(), ActionError> {
        if let Some(validator) = &self.validator {
            if !validator.run() {
                return Err(ActionError::ValidationFailed);
            }
        }
        if let Some(warnings) = &self.warnings {
            warnings.show().await.map_err(|WarningsDismissed| ActionError::Cancelled)?;
        }
        Ok(())
    }
}

/// The request an action sends.
pub fn request_for(action: Action, sys: &EntitySys) -> PersistRequest {
    match action {
        Action::Publish => {
            PersistRequest::put(PersistRequest::resource(sys, Some("published")), sys.version, None)
        }
        Action::Unpublish => {
            PersistRequest::delete(PersistRequest::resource(sys, Some("published")), sys.version)
        }
        Action::Archive => {
            PersistRequest::put(PersistRequest::resource(sys, Some("archived")), sys.version, None)
        }
        Action::Unarchive => {
            PersistRequest::delete(PersistRequest::resource(sys, Some("archived")), sys.version)
        }
        Action::Delete => PersistRequest::delete(PersistRequest::resource(sys, None), sys.version),
    }
}

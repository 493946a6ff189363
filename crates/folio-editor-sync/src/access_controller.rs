//! Reactive per field-locale access decisions for one document.

use std::sync::Arc;

use folio_common::{Property, Subscription};
use folio_editor_core::{
    AccessDecision, AccessInputs, Collaborator, ContentType, Path, UserId, decide,
};

use crate::document::DocumentStatus;

/// Field-locale permissions of the current user.
pub trait FieldPermissions: Send + Sync {
    fn can_edit(&self, field: &str, locale: &str) -> bool;
}

impl<F> FieldPermissions for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn can_edit(&self, field: &str, locale: &str) -> bool {
        self(field, locale)
    }
}

/// Combines the content type, permissions, presence and document status
/// into an [`AccessDecision`] per (field, locale).
#[derive(Clone)]
pub struct AccessController {
    user_id: UserId,
    content_type: Arc<ContentType>,
    permissions: Property<Arc<dyn FieldPermissions>>,
    collaborators: Property<Vec<Collaborator>>,
    status: Property<DocumentStatus>,
}

impl AccessController {
    pub fn new(
        user_id: UserId,
        content_type: ContentType,
        permissions: Arc<dyn FieldPermissions>,
        collaborators: Property<Vec<Collaborator>>,
        status: Property<DocumentStatus>,
    ) -> Self {
        Self {
            user_id,
            content_type: Arc::new(content_type),
            permissions: Property::new(permissions),
            collaborators,
            status,
        }
    }

    /// Swap the permission source, e.g. after the user's role changed.
    /// Watched decisions are recomputed.
    pub fn set_permissions(&self, permissions: Arc<dyn FieldPermissions>) {
        self.permissions.set(permissions);
    }

    pub fn inputs(&self, field: &str, locale: &str) -> AccessInputs {
        let schema = self.content_type.field(field);
        let path = Path::field_locale(field, locale);
        let occupied_by = if schema.is_some_and(|f| f.kind.is_single_editor()) {
            self.collaborators.with(|all| {
                all.iter()
                    .find(|c| c.user_id != self.user_id && c.is_focused_on(&path))
                    .map(|c| c.user_id.clone())
            })
        } else {
            None
        };
        AccessInputs {
            field_disabled: schema.is_some_and(|f| f.disabled),
            permitted: self.permissions.with(|p| p.can_edit(field, locale)),
            occupied_by,
            disconnected: self.status.get().is_unrecoverable(),
        }
    }

    /// Decision for the current inputs.
    pub fn access(&self, field: &str, locale: &str) -> AccessDecision {
        decide(&self.inputs(field, locale))
    }

    /// A property holding the decision, recomputed whenever permissions,
    /// presence or document status change, for as long as the subscription
    /// lives.
    pub fn watch(&self, field: &str, locale: &str) -> (Property<AccessDecision>, Subscription) {
        let decision = Property::new(self.access(field, locale));
        let this = self.clone();
        let (field, locale) = (field.to_owned(), locale.to_owned());
        let out = decision.clone();
        let mut presence = self.collaborators.subscribe();
        let mut status = self.status.subscribe();
        let mut permissions = self.permissions.subscribe();
        let task = Subscription::spawn(async move {
            loop {
                tokio::select! {
                    changed = presence.changed() => if changed.is_err() { break },
                    changed = status.changed() => if changed.is_err() { break },
                    changed = permissions.changed() => if changed.is_err() { break },
                }
                presence.borrow_and_update();
                status.borrow_and_update();
                permissions.borrow_and_update();
                out.set_if_changed(this.access(&field, &locale));
            }
        });
        (decision, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_editor_core::{ContentTypeField, FieldKind, PresenceTracker};

    fn controller(status: DocumentStatus) -> (AccessController, Property<Vec<Collaborator>>) {
        let content_type = ContentType::new(
            "article",
            vec![
                ContentTypeField::new("title", FieldKind::Symbol),
                ContentTypeField::new("body", FieldKind::RichText),
                ContentTypeField::new("slug", FieldKind::Symbol).disabled(),
            ],
        );
        let collaborators = Property::new(Vec::new());
        let permissions: Arc<dyn FieldPermissions> =
            Arc::new(|field: &str, locale: &str| !(field == "title" && locale == "de"));
        let controller = AccessController::new(
            "me".into(),
            content_type,
            permissions,
            collaborators.clone(),
            Property::new(status),
        );
        (controller, collaborators)
    }

    fn focused(user: &str, field: &str, locale: &str) -> Vec<Collaborator> {
        let mut tracker = PresenceTracker::new();
        tracker.focus(user.into(), Path::field_locale(field, locale));
        tracker.snapshot()
    }

    #[test]
    fn test_decisions() {
        let (access, _) = controller(DocumentStatus::Ok);
        assert_eq!(access.access("title", "en"), AccessDecision::Editable);
        assert_eq!(access.access("title", "de"), AccessDecision::Denied);
        assert_eq!(access.access("slug", "en"), AccessDecision::EditingDisabled);
    }

    #[test]
    fn test_occupied_only_for_single_editor_fields() {
        let (access, collaborators) = controller(DocumentStatus::Ok);
        collaborators.set(focused("bob", "body", "en"));
        assert_eq!(
            access.access("body", "en"),
            AccessDecision::Occupied { by: "bob".into() }
        );
        assert_eq!(access.access("body", "de"), AccessDecision::Editable);

        collaborators.set(focused("bob", "title", "en"));
        assert_eq!(access.access("title", "en"), AccessDecision::Editable);

        collaborators.set(focused("me", "body", "en"));
        assert_eq!(access.access("body", "en"), AccessDecision::Editable);
    }

    #[test]
    fn test_unrecoverable_status_disconnects() {
        let (access, _) = controller(DocumentStatus::DocumentError);
        assert_eq!(access.access("title", "en"), AccessDecision::Disconnected);
        let (access, _) = controller(DocumentStatus::EditConflict);
        assert_eq!(access.access("title", "en"), AccessDecision::Editable);
    }

    #[tokio::test]
    async fn test_watch_follows_inputs() {
        let (access, collaborators) = controller(DocumentStatus::Ok);
        let (decision, _subscription) = access.watch("body", "en");
        let mut rx = decision.subscribe();
        assert_eq!(decision.get(), AccessDecision::Editable);

        collaborators.set(focused("bob", "body", "en"));
        rx.changed().await.unwrap();
        assert_eq!(decision.get(), AccessDecision::Occupied { by: "bob".into() });

        access.status.set(DocumentStatus::Disconnected);
        collaborators.set(Vec::new());
        rx.changed().await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(decision.get(), AccessDecision::Disconnected);
    }

    #[tokio::test]
    async fn test_watch_follows_permission_changes() {
        let (access, _) = controller(DocumentStatus::Ok);
        let (decision, _subscription) = access.watch("title", "en");
        let mut rx = decision.subscribe();
        assert_eq!(decision.get(), AccessDecision::Editable);

        access.set_permissions(Arc::new(|_: &str, locale: &str| locale != "en"));
        rx.changed().await.unwrap();
        assert_eq!(decision.get(), AccessDecision::Denied);
        assert_eq!(access.access("title", "de"), AccessDecision::Editable);
    }
}

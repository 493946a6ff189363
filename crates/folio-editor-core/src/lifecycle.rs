//! Lifecycle state derived from `sys` metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::EntitySys;

/// Where an entity is in its publishing lifecycle.
///
/// Never stored; always recomputed from `sys` with [`ResourceState::from_sys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    /// Never published.
    Draft,
    /// Published, no edits since.
    Published,
    /// Published, with edits since the last publish.
    Changed,
    /// Archived (not published after archiving).
    Archived,
    /// Deleted; terminal.
    Deleted,
}

/// State-changing actions on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Archive,
    Unarchive,
    Publish,
    Unpublish,
    Delete,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Archive,
        Action::Unarchive,
        Action::Publish,
        Action::Unpublish,
        Action::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Archive => "archive",
            Action::Unarchive => "unarchive",
            Action::Publish => "publish",
            Action::Unpublish => "unpublish",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResourceState {
    /// Derive the state from version arithmetic.
    ///
    /// Publishing bumps `version` once past `publishedVersion`, so an entity
    /// is `Changed` only once `version > publishedVersion + 1`. A response that
    /// reports `version == publishedVersion` also counts as `Published`.
    pub fn from_sys(sys: &EntitySys) -> Self {
        match (sys.deleted_version, sys.archived_version, sys.published_version) {
            (Some(_), _, _) => ResourceState::Deleted,
            (None, Some(archived), published) if published.is_none_or(|p| archived > p) => {
                ResourceState::Archived
            }
            (None, _, Some(published)) if sys.version > published + 1 => ResourceState::Changed,
            (None, _, Some(_)) => ResourceState::Published,
            (None, _, None) => ResourceState::Draft,
        }
    }

    /// Whether `action` is legal from this state.
    pub fn allows(self, action: Action) -> bool {
        use Action::*;
        match self {
            ResourceState::Draft => matches!(action, Publish | Archive | Delete),
            ResourceState::Published => matches!(action, Unpublish),
            ResourceState::Changed => matches!(action, Publish | Unpublish),
            ResourceState::Archived => matches!(action, Unarchive | Delete),
            ResourceState::Deleted => false,
        }
    }

    /// Actions legal from this state, in [`Action::ALL`] order.
    pub fn available_actions(self) -> Vec<Action> {
        Action::ALL.into_iter().filter(|a| self.allows(*a)).collect()
    }

    pub fn is_terminal(self) -> bool {
        self == ResourceState::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    fn sys(version: u64, published: Option<u64>, archived: Option<u64>) -> EntitySys {
        let mut sys = EntitySys::new("e1", EntityType::Entry);
        sys.version = version;
        sys.published_version = published;
        sys.archived_version = archived;
        sys
    }

    #[test]
    fn test_draft_then_published() {
        assert_eq!(ResourceState::from_sys(&sys(5, None, None)), ResourceState::Draft);
        assert_eq!(ResourceState::from_sys(&sys(6, Some(6), None)), ResourceState::Published);
        assert_eq!(ResourceState::from_sys(&sys(7, Some(6), None)), ResourceState::Published);
        assert_eq!(ResourceState::from_sys(&sys(8, Some(6), None)), ResourceState::Changed);
    }

    #[test]
    fn test_archived() {
        assert_eq!(ResourceState::from_sys(&sys(4, None, Some(3))), ResourceState::Archived);
        assert_eq!(ResourceState::from_sys(&sys(9, Some(2), Some(8))), ResourceState::Archived);
        // republished after archiving
        assert_eq!(ResourceState::from_sys(&sys(9, Some(8), Some(2))), ResourceState::Published);
    }

    #[test]
    fn test_deleted_is_terminal() {
        let mut deleted = sys(3, Some(2), Some(1));
        deleted.deleted_version = Some(3);
        let state = ResourceState::from_sys(&deleted);
        assert_eq!(state, ResourceState::Deleted);
        assert!(state.available_actions().is_empty());
    }

    #[test]
    fn test_legality_table() {
        use Action::*;
        assert_eq!(ResourceState::Draft.available_actions(), vec![Archive, Publish, Delete]);
        assert_eq!(ResourceState::Published.available_actions(), vec![Unpublish]);
        assert_eq!(ResourceState::Changed.available_actions(), vec![Publish, Unpublish]);
        assert_eq!(ResourceState::Archived.available_actions(), vec![Unarchive, Delete]);
    }

    #[test]
    fn test_changed_iff_version_past_publish() {
        for published in 0..5u64 {
            for version in published..published + 5 {
                let state = ResourceState::from_sys(&sys(version, Some(published), None));
                assert_eq!(state == ResourceState::Changed, version > published + 1);
            }
        }
    }
}

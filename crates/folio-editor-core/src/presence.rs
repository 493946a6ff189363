//! Presence of other users editing the same entity.
//!
//! Each user only ever updates their own record; the tracker is the local
//! mirror of what the realtime transport reports.

use std::collections::HashMap;
use std::time::Duration;

use web_time::Instant;

use crate::path::Path;
use crate::types::UserId;

/// A user connected to the same document.
#[derive(Debug, Clone, PartialEq)]
pub struct Collaborator {
    pub user_id: UserId,
    /// Assigned colour (RGBA).
    pub color: u32,
    /// Field-locale path the user is currently editing.
    pub focused_path: Option<Path>,
    /// When `focused_path` was last set.
    pub focused_at: Option<Instant>,
}

impl Collaborator {
    /// Whether this collaborator is editing at or inside `path`.
    pub fn is_focused_on(&self, path: &Path) -> bool {
        self.focused_path.as_ref().is_some_and(|p| p.overlaps(path))
    }
}

/// Collaborators keyed by user id.
#[derive(Debug, Default, Clone)]
pub struct PresenceTracker {
    collaborators: HashMap<UserId, Collaborator>,
    next_color_index: usize,
}

/// Predefined collaborator colours (pastel-ish for readability).
const COLLABORATOR_COLORS: [u32; 8] = [
    0xFF6B6BFF, // Red
    0x4ECDC4FF, // Teal
    0xFFE66DFF, // Yellow
    0x95E1D3FF, // Mint
    0xF38181FF, // Coral
    0xAA96DAFF, // Purple
    0xFCBF49FF, // Orange
    0x2EC4B6FF, // Cyan
];

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user. Joining twice keeps the existing record and colour.
    pub fn join(&mut self, user_id: UserId) -> &Collaborator {
        let next = &mut self.next_color_index;
        self.collaborators.entry(user_id.clone()).or_insert_with(|| {
            let color = COLLABORATOR_COLORS[*next % COLLABORATOR_COLORS.len()];
            *next += 1;
            Collaborator {
                user_id,
                color,
                focused_path: None,
                focused_at: None,
            }
        })
    }

    pub fn leave(&mut self, user_id: &str) -> Option<Collaborator> {
        self.collaborators.remove(user_id)
    }

    /// Record that `user_id` is editing `path`. Unknown users are joined first.
    pub fn focus(&mut self, user_id: UserId, path: Path) {
        self.join(user_id.clone());
        if let Some(collab) = self.collaborators.get_mut(&user_id) {
            collab.focused_path = Some(path);
            collab.focused_at = Some(Instant::now());
        }
    }

    pub fn blur(&mut self, user_id: &str) {
        if let Some(collab) = self.collaborators.get_mut(user_id) {
            collab.focused_path = None;
            collab.focused_at = None;
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&Collaborator> {
        self.collaborators.get(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.collaborators.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.collaborators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collaborators.is_empty()
    }

    /// All collaborators ordered by user id, for publishing to observers.
    pub fn snapshot(&self) -> Vec<Collaborator> {
        let mut all: Vec<_> = self.collaborators.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        all
    }

    /// Clear focus that has not been refreshed within `max_age`.
    ///
    /// Returns true if anything changed.
    pub fn prune_stale_focus(&mut self, max_age: Duration) -> bool {
        let now = Instant::now();
        let mut changed = false;
        for collab in self.collaborators.values_mut() {
            if let Some(at) = collab.focused_at {
                if now.duration_since(at) > max_age {
                    collab.focused_path = None;
                    collab.focused_at = None;
                    changed = true;
                }
            }
        }
        changed
    }
}

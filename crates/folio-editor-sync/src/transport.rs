//! Wire protocol for realtime collaboration messages.
//!
//! Frames are postcard-encoded. Operation values and path segments are
//! untagged JSON, which postcard cannot describe, so operation lists and
//! focus paths travel as embedded JSON strings.

use folio_editor_core::{Operation, Path, UserId};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::realtime::{Submission, TransportEvent};

/// Messages exchanged between collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CollabMessage {
    /// A batch of operations.
    Operations {
        /// Session sequence number.
        seq: u64,
        /// JSON-encoded `Vec<Operation>`.
        payload: String,
    },

    /// A collaborator's focus moved.
    Focus {
        user_id: UserId,
        /// JSON-encoded `Path`, or `None` when they stopped editing.
        path: Option<String>,
    },

    /// Collaborator joined the session.
    Join { user_id: UserId },

    /// Collaborator left the session.
    Leave { user_id: UserId },
}

impl CollabMessage {
    pub fn operations(seq: u64, ops: &[Operation]) -> Result<Self, TransportError> {
        Ok(CollabMessage::Operations {
            seq,
            payload: serde_json::to_string(ops)?,
        })
    }

    pub fn from_submission(submission: &Submission) -> Result<Self, TransportError> {
        Self::operations(submission.seq, &submission.ops)
    }

    pub fn focus(user_id: UserId, path: Option<&Path>) -> Result<Self, TransportError> {
        Ok(CollabMessage::Focus {
            user_id,
            path: path.map(serde_json::to_string::<Path>).transpose()?,
        })
    }

    /// Serialize message to postcard bytes for wire transmission.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        Ok(postcard::to_stdvec(self)?)
    }

    /// Deserialize message from postcard bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// The event a document should see for this message.
    pub fn into_event(self) -> Result<TransportEvent, TransportError> {
        Ok(match self {
            CollabMessage::Operations { seq, payload } => TransportEvent::Remote {
                seq,
                ops: serde_json::from_str(&payload)?,
            },
            CollabMessage::Focus { user_id, path } => TransportEvent::Focus {
                user_id,
                path: path.map(|p| serde_json::from_str(&p)).transpose()?,
            },
            CollabMessage::Join { user_id } => TransportEvent::PeerJoined(user_id),
            CollabMessage::Leave { user_id } => TransportEvent::PeerLeft(user_id),
        })
    }
}

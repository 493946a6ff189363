//! Per field-locale editability.

use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Whether the current user may edit a (field, locale) right now.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AccessDecision {
    Editable,
    /// No permission for this field-locale.
    Denied,
    /// The content type disables the field.
    EditingDisabled,
    /// Another collaborator is editing a field that cannot merge concurrent edits.
    Occupied { by: UserId },
    /// No transport, or the document hit an unrecoverable error.
    Disconnected,
}

impl AccessDecision {
    pub fn is_editable(&self) -> bool {
        matches!(self, AccessDecision::Editable)
    }
}

/// Everything [`decide`] looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessInputs {
    /// Content-type field flag.
    pub field_disabled: bool,
    /// Permission source verdict for this field-locale.
    pub permitted: bool,
    /// A collaborator other than the current user focused on this
    /// single-editor field-locale.
    pub occupied_by: Option<UserId>,
    /// Transport down or document status unrecoverable.
    pub disconnected: bool,
}

/// First match wins: disabled, denied, occupied, disconnected, editable.
pub fn decide(inputs: &AccessInputs) -> AccessDecision {
    if inputs.field_disabled {
        AccessDecision::EditingDisabled
    } else if !inputs.permitted {
        AccessDecision::Denied
    } else if let Some(by) = &inputs.occupied_by {
        AccessDecision::Occupied { by: by.clone() }
    } else if inputs.disconnected {
        AccessDecision::Disconnected
    } else {
        AccessDecision::Editable
    }
}

//! Entity and content-type data model.
//!
//! An entity is a `sys` envelope plus a map of field values keyed by field id
//! and then locale code. Content types describe which fields exist and how
//! they may be edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// JSON value stored at a path.
pub type Value = serde_json::Value;

/// Field id within a content type.
pub type FieldId = SmolStr;

/// Locale code such as `en-US`.
pub type LocaleCode = SmolStr;

/// Identifier of an editing user.
pub type UserId = SmolStr;

/// `fields` of an entity: field id -> locale code -> value.
pub type Fields = serde_json::Map<String, Value>;

/// Kind of edited record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Entry,
    Asset,
}

impl EntityType {
    /// Collection name used by the persistence authority.
    pub fn collection(self) -> &'static str {
        match self {
            EntityType::Entry => "entries",
            EntityType::Asset => "assets",
        }
    }
}

/// System metadata of an entity, owned by the persistence authority.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySys {
    pub id: SmolStr,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Server-assigned, strictly increasing with every accepted mutation.
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type_id: Option<SmolStr>,
}

impl EntitySys {
    /// Sys for a record that has never been persisted.
    pub fn new(id: impl Into<SmolStr>, entity_type: EntityType) -> Self {
        Self {
            id: id.into(),
            entity_type,
            version: 1,
            published_version: None,
            archived_version: None,
            deleted_version: None,
            updated_at: None,
            content_type_id: None,
        }
    }

    /// `[collection, id]`, the resource path at the persistence authority.
    pub fn resource_path(&self) -> Vec<SmolStr> {
        vec![self.entity_type.collection().into(), self.id.clone()]
    }
}

/// An edited record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub sys: EntitySys,
    #[serde(default)]
    pub fields: Fields,
}

impl Entity {
    pub fn new(sys: EntitySys, fields: Fields) -> Self {
        Self { sys, fields }
    }

    /// A locally constructed entity with empty fields.
    pub fn new_local(
        id: impl Into<SmolStr>,
        entity_type: EntityType,
        content_type_id: Option<SmolStr>,
    ) -> Self {
        let mut sys = EntitySys::new(id, entity_type);
        sys.content_type_id = content_type_id;
        Self {
            sys,
            fields: Fields::new(),
        }
    }

    /// Value of one field in one locale.
    pub fn field_value(&self, field: &str, locale: &str) -> Option<&Value> {
        self.fields.get(field).and_then(|locales| locales.get(locale))
    }
}

/// Value shape of a content-type field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Symbol,
    Text,
    RichText,
    Integer,
    Number,
    Date,
    Boolean,
    Location,
    Link,
    Array,
    Object,
}

impl FieldKind {
    /// Fields whose concurrent edits cannot be merged; only one user may
    /// edit such a field-locale at a time.
    pub fn is_single_editor(self) -> bool {
        matches!(self, FieldKind::RichText)
    }
}

/// One field of a content type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypeField {
    pub id: FieldId,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub localized: bool,
}

impl ContentTypeField {
    pub fn new(id: impl Into<FieldId>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            kind,
            disabled: false,
            localized: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// Schema of an entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentType {
    pub id: SmolStr,
    #[serde(default)]
    pub fields: Vec<ContentTypeField>,
}

impl ContentType {
    pub fn new(id: impl Into<SmolStr>, fields: Vec<ContentTypeField>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn field(&self, id: &str) -> Option<&ContentTypeField> {
        self.fields.iter().find(|f| f.id == id)
    }
}

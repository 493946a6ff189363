//! Request/response interface to the server that owns entity data.

use folio_editor_core::{Entity, EntitySys, Value};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::PersistenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Delete,
}

/// One call to the persistence authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistRequest {
    pub method: Method,
    /// `[collection, entity_id, ...]`
    pub path: Vec<SmolStr>,
    /// Version the client last saw; used by the authority to detect conflicts.
    pub version: Option<u64>,
    pub data: Option<Value>,
    /// Ask the authority not to transform the payload server-side.
    #[serde(default)]
    pub skip_transformation: bool,
}

impl PersistRequest {
    pub fn get(path: Vec<SmolStr>) -> Self {
        Self {
            method: Method::Get,
            path,
            version: None,
            data: None,
            skip_transformation: false,
        }
    }

    pub fn put(path: Vec<SmolStr>, version: u64, data: Option<Value>) -> Self {
        Self {
            method: Method::Put,
            path,
            version: Some(version),
            data,
            skip_transformation: false,
        }
    }

    pub fn delete(path: Vec<SmolStr>, version: u64) -> Self {
        Self {
            method: Method::Delete,
            path,
            version: Some(version),
            data: None,
            skip_transformation: false,
        }
    }

    pub fn skip_transformation(mut self, skip: bool) -> Self {
        self.skip_transformation = skip;
        self
    }

    /// The entity's resource path with an optional trailing segment, e.g. `published`.
    pub fn resource(sys: &EntitySys, suffix: Option<&str>) -> Vec<SmolStr> {
        let mut path = sys.resource_path();
        path.extend(suffix.map(SmolStr::from));
        path
    }
}

/// The server side of persistence.
///
/// Returns the authoritative entity, or `None` when the response has no body
/// (e.g. a delete).
#[trait_variant::make(Send)]
pub trait PersistenceAuthority: Send + Sync + 'static {
    async fn request(&self, request: PersistRequest) -> Result<Option<Entity>, PersistenceError>;
}

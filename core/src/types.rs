//! The caller's intended change for a PUT.
//!
//! # Design
//! A PUT that hits 409 or 412 has to be rebuilt against fresh server state,
//! so the dispatcher needs more than a request body. `Edit` keeps the
//! representation the caller started from (`base` plus its ETag) apart from
//! the fields the caller actually set (`changes`). That split is what lets
//! the merge tell the caller's edits from the server's concurrent ones.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DispatchError;
use crate::http::HttpResponse;

/// A JSON object representation of a resource.
pub type Representation = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edit {
    /// Representation the caller last read. Empty when the caller writes blind.
    #[serde(default)]
    pub base: Representation,
    /// ETag of `base`, sent as `If-Match` on the first attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub changes: Representation,
    /// Fields on which the caller's value wins a merge.
    #[serde(default)]
    pub authoritative: BTreeSet<String>,
}

impl Edit {
    /// An edit with no base representation and no precondition.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: Representation, etag: Option<String>) -> Self {
        Self {
            base,
            etag,
            ..Self::default()
        }
    }

    /// Start an edit from a successful GET: its body becomes `base` and its
    /// `ETag` header becomes the precondition.
    pub fn from_response(response: &HttpResponse) -> Result<Self, DispatchError> {
        let base = parse_representation(response)?;
        Ok(Self::with_base(base, response.etag().map(str::to_string)))
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.changes.insert(field.into(), value.into());
        self
    }

    /// Set a field whose value must survive a merge against concurrent edits.
    pub fn set_authoritative(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        self.authoritative.insert(field.clone());
        self.changes.insert(field, value.into());
        self
    }

    pub fn is_authoritative(&self, field: &str) -> bool {
        self.authoritative.contains(field)
    }

    /// Body of the first PUT attempt: `base` overlaid with `changes`.
    pub fn proposed(&self) -> Representation {
        crate::merge::reapply(&self.base, &self.changes)
    }
}

/// Parse a response body as a JSON object.
pub(crate) fn parse_representation(response: &HttpResponse) -> Result<Representation, DispatchError> {
    match serde_json::from_str::<Value>(&response.body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DispatchError::Representation {
            status: response.status,
            reason: format!("expected a JSON object, got {}", kind(&other)),
        }),
        Err(e) => Err(DispatchError::Representation {
            status: response.status,
            reason: e.to_string(),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

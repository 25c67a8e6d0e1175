//! Grant model and the raw-row boundary.
//!
//! Grant rows arrive from the session source as loosely typed JSON. They are
//! parsed here, once, into strict [`Grant`] records; nothing optional or
//! untyped is allowed past this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use portal_core::{DomainError, DomainResult};

use crate::Action;

/// One permission row for the current principal.
///
/// `module` is informational only (it names the business area the row was
/// administered under); it never takes part in a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub module: String,
    pub path: String,
    pub can_view: bool,
    pub can_edit: bool,
    pub can_create: bool,
    pub can_delete: bool,
}

impl Grant {
    /// A grant with every capability flag off.
    pub fn new(module: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_view(mut self) -> Self {
        self.can_view = true;
        self
    }

    pub fn with_edit(mut self) -> Self {
        self.can_edit = true;
        self
    }

    pub fn with_create(mut self) -> Self {
        self.can_create = true;
        self
    }

    pub fn with_delete(mut self) -> Self {
        self.can_delete = true;
        self
    }

    /// Whether this single row carries the flag backing `action`.
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Read => self.can_view,
            Action::Update => self.can_edit,
            Action::Create => self.can_create,
            Action::Delete => self.can_delete,
        }
    }
}

/// A grant row exactly as the external source delivered it.
///
/// Every field is optional and untyped; [`RawGrant::into_grant`] applies the
/// defaults (missing or non-boolean flag = `false`) and rejects rows without a
/// usable path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGrant {
    #[serde(default)]
    pub module: Option<Value>,
    #[serde(default)]
    pub path: Option<Value>,
    #[serde(default)]
    pub can_view: Option<Value>,
    #[serde(default)]
    pub can_edit: Option<Value>,
    #[serde(default)]
    pub can_create: Option<Value>,
    #[serde(default)]
    pub can_delete: Option<Value>,
}

impl RawGrant {
    /// Convert into a strict [`Grant`].
    ///
    /// Rows whose path is missing, not a string, or blank are rejected rather
    /// than collapsed to `/`: a broken row must never turn into a root grant.
    pub fn into_grant(self) -> DomainResult<Grant> {
        let path = match self.path {
            Some(Value::String(path)) if !path.trim().is_empty() => path,
            Some(Value::String(_)) => return Err(DomainError::validation("grant path is blank")),
            None => return Err(DomainError::validation("grant path is missing")),
            Some(other) => {
                return Err(DomainError::validation(format!(
                    "grant path must be a string, got {}",
                    json_kind(&other)
                )));
            }
        };

        let module = match self.module {
            Some(Value::String(module)) => module,
            _ => String::new(),
        };

        Ok(Grant {
            module,
            path,
            can_view: flag(self.can_view),
            can_edit: flag(self.can_edit),
            can_create: flag(self.can_create),
            can_delete: flag(self.can_delete),
        })
    }
}

fn flag(value: Option<Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A row refused at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedGrant {
    /// Position of the row in the source payload.
    pub index: usize,
    /// Module named by the row, when it had one.
    pub module: Option<String>,
    pub reason: DomainError,
}

/// Result of parsing one grant payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedGrants {
    pub grants: Vec<Grant>,
    pub rejected: Vec<RejectedGrant>,
}

/// Parse a JSON grant payload (an array of row objects).
///
/// Individual bad rows are collected in `rejected` and logged; only a payload
/// that is not an array at all is an error.
pub fn parse_grant_rows(payload: Value) -> DomainResult<ParsedGrants> {
    let Value::Array(rows) = payload else {
        return Err(DomainError::validation(format!(
            "grant payload must be an array, got {}",
            json_kind(&payload)
        )));
    };

    let mut parsed = ParsedGrants::default();

    for (index, row) in rows.into_iter().enumerate() {
        let module = row
            .get("module")
            .and_then(Value::as_str)
            .map(str::to_string);

        let result = serde_json::from_value::<RawGrant>(row)
            .map_err(|e| DomainError::validation(format!("grant row is not an object: {e}")))
            .and_then(RawGrant::into_grant);

        match result {
            Ok(grant) => parsed.grants.push(grant),
            Err(reason) => {
                tracing::warn!(index, module = ?module, %reason, "rejecting grant row");
                parsed.rejected.push(RejectedGrant { index, module, reason });
            }
        }
    }

    Ok(parsed)
}

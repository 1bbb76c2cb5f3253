//! Data targets, the write side of a dynamic-value binding.
//!
//! A target names a location inside a request (a cookie, a header, the
//! body or a field of a structured body) and the source its value comes
//! from. Applying it to a request copy resolves the source against the
//! prefix and writes the result. An absent value leaves the request
//! untouched.

use crate::action::RequestAction;
use crate::error::ResolveError;
use crate::history::ActionHistory;
use crate::json_path::{self, PathSegment};
use crate::source::DataSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A location in a request bound to a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// Upsert a cookie by exact name
    Cookie { name: String, source: DataSource },

    /// Upsert a header, matching the name case-insensitively
    Header {
        key: String,
        source: DataSource,

        /// The value observed at capture time
        #[serde(default, skip_serializing_if = "Option::is_none")]
        captured: Option<String>,
    },

    /// Replace the whole body
    Body { source: DataSource },

    /// Re-render a JSON body from its captured shape
    JsonContainer {
        template: Value,
        fields: Vec<JsonFieldTarget>,
    },

    /// Re-render an `application/x-www-form-urlencoded` body
    QueryString { params: Vec<(QueryPart, QueryPart)> },
}

/// One dynamic field of a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonFieldTarget {
    pub path: Vec<PathSegment>,
    pub source: DataSource,
}

/// A key or value of a query string: captured text, or a bound source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPart {
    Literal(String),
    Source(DataSource),
}

impl QueryPart {
    fn resolve<H: ActionHistory + ?Sized>(
        &self,
        prefix: &H,
    ) -> Result<Option<String>, ResolveError> {
        match self {
            QueryPart::Literal(text) => Ok(Some(text.clone())),
            QueryPart::Source(source) => source.resolve(prefix),
        }
    }
}

impl Target {
    pub fn cookie(name: impl Into<String>, source: DataSource) -> Self {
        Target::Cookie {
            name: name.into(),
            source,
        }
    }

    pub fn header(key: impl Into<String>, source: DataSource) -> Self {
        Target::Header {
            key: key.into(),
            source,
            captured: None,
        }
    }

    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Target::Cookie { .. } => "cookie",
            Target::Header { .. } => "header",
            Target::Body { .. } => "body",
            Target::JsonContainer { .. } => "json",
            Target::QueryString { .. } => "query",
        }
    }

    /// Resolve the bound value against `prefix` and write it into `dest`.
    pub fn apply<H: ActionHistory + ?Sized>(
        &self,
        dest: &mut RequestAction,
        prefix: &H,
    ) -> Result<(), ResolveError> {
        match self {
            Target::Cookie { name, source } => {
                if let Some(value) = source.resolve(prefix)? {
                    dest.upsert_cookie(name, value);
                }
            }

            Target::Header { key, source, .. } => {
                if let Some(value) = source.resolve(prefix)? {
                    dest.headers.insert(key.as_str(), value);
                }
            }

            Target::Body { source } => {
                if let Some(value) = source.resolve(prefix)? {
                    dest.body = Some(value.into_bytes());
                }
            }

            Target::JsonContainer { template, fields } => {
                let mut document = template.clone();
                for field in fields {
                    if let Some(value) = field.source.resolve(prefix)? {
                        set_existing(&mut document, &field.path, value);
                    }
                }
                // Serializing a `Value` cannot fail
                if let Ok(body) = serde_json::to_vec(&document) {
                    dest.body = Some(body);
                }
            }

            Target::QueryString { params } => {
                let mut resolved = Vec::with_capacity(params.len());
                for (key, value) in params {
                    let (Some(key), Some(value)) = (key.resolve(prefix)?, value.resolve(prefix)?)
                    else {
                        return Ok(());
                    };
                    resolved.push((key, value));
                }
                let body = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(resolved)
                    .finish();
                dest.body = Some(body.into_bytes());
            }
        }
        Ok(())
    }
}

/// Set a string value at `path`, only when the parent exists and already
/// holds the addressed key or index.
fn set_existing(document: &mut Value, path: &[PathSegment], value: String) {
    let Some((last, parent_path)) = path.split_last() else {
        return;
    };
    let Some(parent) = json_path::lookup_mut(document, parent_path) else {
        return;
    };
    let slot = match (parent, last) {
        (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index),
        (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key),
        _ => None,
    };
    if let Some(slot) = slot {
        *slot = Value::String(value);
    }
}

impl RequestAction {
    /// A copy of this request with every target applied against `prefix`.
    ///
    /// The copy carries no targets of its own.
    pub fn materialize<H: ActionHistory + ?Sized>(
        &self,
        prefix: &H,
    ) -> Result<RequestAction, ResolveError> {
        let mut request = RequestAction {
            targets: Vec::new(),
            ..self.clone()
        };
        for target in &self.targets {
            target.apply(&mut request, prefix)?;
        }
        Ok(request)
    }
}

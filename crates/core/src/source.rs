//! Data sources, the read side of a dynamic-value binding.
//!
//! A source is a pure function of the actions preceding the one being
//! resolved. Leaf sources read one earlier action (addressed by absolute
//! index) or carry a literal; intermediary sources transform the value of
//! an upstream source. Absence propagates: an intermediary whose upstream
//! reports nothing reports nothing without running its own transform.

use crate::error::ResolveError;
use crate::history::ActionHistory;
use crate::http::percent_decode;
use crate::json_path::{self, PathSegment};
use regex_lite::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A composable value source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// A constant string
    Str { text: String },

    /// Text the user typed during capture
    Input { text: String },

    /// A header of the action at `index`
    Header { index: usize, key: String },

    /// A cookie of the action at `index`; `pattern` is matched at the start
    /// of the stored value and the result percent-decoded
    Cookie {
        index: usize,
        name: String,
        pattern: String,
    },

    /// The raw body of the action at `index`
    Body { index: usize },

    /// Character slice of the upstream value, with Python slice semantics
    /// (negative bounds count from the end, out-of-range bounds clamp)
    Substr {
        upstream: Box<DataSource>,
        start: i64,
        end: i64,
    },

    /// First capture group of `pattern` searched in the upstream value,
    /// `default` when the pattern does not match
    Regex {
        upstream: Box<DataSource>,
        pattern: String,
        default: String,
    },

    /// Projection of the upstream value parsed as JSON
    JsonField {
        upstream: Box<DataSource>,
        path: Vec<PathSegment>,
    },
}

impl DataSource {
    pub fn constant(text: impl Into<String>) -> Self {
        DataSource::Str { text: text.into() }
    }

    pub fn input(text: impl Into<String>) -> Self {
        DataSource::Input { text: text.into() }
    }

    pub fn header(index: usize, key: impl Into<String>) -> Self {
        DataSource::Header {
            index,
            key: key.into(),
        }
    }

    pub fn cookie(index: usize, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        DataSource::Cookie {
            index,
            name: name.into(),
            pattern: pattern.into(),
        }
    }

    pub fn body(index: usize) -> Self {
        DataSource::Body { index }
    }

    /// Wrap this source in a character slice.
    pub fn substr(self, start: i64, end: i64) -> Self {
        DataSource::Substr {
            upstream: Box::new(self),
            start,
            end,
        }
    }

    /// Wrap this source in a pattern extraction.
    pub fn regex(self, pattern: impl Into<String>, default: impl Into<String>) -> Self {
        DataSource::Regex {
            upstream: Box::new(self),
            pattern: pattern.into(),
            default: default.into(),
        }
    }

    /// Wrap this source in a JSON projection.
    pub fn json_field(self, path: Vec<PathSegment>) -> Self {
        DataSource::JsonField {
            upstream: Box::new(self),
            path,
        }
    }

    /// Resolve the value against `prefix`.
    ///
    /// `Ok(None)` means the value is legitimately absent. An index past the
    /// end of the prefix is reported as [`ResolveError::ActionNotFound`].
    pub fn resolve<H: ActionHistory + ?Sized>(
        &self,
        prefix: &H,
    ) -> Result<Option<String>, ResolveError> {
        match self {
            DataSource::Str { text } | DataSource::Input { text } => Ok(Some(text.clone())),

            DataSource::Header { index, key } => Ok(prefix
                .lookup(*index)?
                .and_then(|action| action.header(key))
                .map(str::to_owned)),

            DataSource::Cookie {
                index,
                name,
                pattern,
            } => {
                let Some(value) = prefix
                    .lookup(*index)?
                    .and_then(|action| action.cookie_value(name))
                else {
                    return Ok(None);
                };
                let re = compile(&format!("(?s)^(?:{pattern})"), pattern)?;
                Ok(re
                    .captures(&value)
                    .map(|caps| percent_decode(first_capture(&caps))))
            }

            DataSource::Body { index } => Ok(prefix
                .lookup(*index)?
                .and_then(|action| action.body())
                .map(|body| String::from_utf8_lossy(body).into_owned())),

            DataSource::Substr {
                upstream,
                start,
                end,
            } => Ok(upstream
                .resolve(prefix)?
                .map(|value| slice_chars(&value, *start, *end))),

            DataSource::Regex {
                upstream,
                pattern,
                default,
            } => {
                let Some(value) = upstream.resolve(prefix)? else {
                    return Ok(None);
                };
                let re = compile(&format!("(?si){pattern}"), pattern)?;
                Ok(Some(match re.captures(&value) {
                    Some(caps) => first_capture(&caps).to_string(),
                    None => default.clone(),
                }))
            }

            DataSource::JsonField { upstream, path } => {
                let Some(value) = upstream.resolve(prefix)? else {
                    return Ok(None);
                };
                let Ok(document) = serde_json::from_str::<serde_json::Value>(&value) else {
                    return Ok(None);
                };
                Ok(json_path::lookup(&document, path).and_then(json_path::project))
            }
        }
    }

    /// The action index this source ultimately reads from, if any.
    pub fn action_index(&self) -> Option<usize> {
        match self {
            DataSource::Str { .. } | DataSource::Input { .. } => None,
            DataSource::Header { index, .. }
            | DataSource::Cookie { index, .. }
            | DataSource::Body { index } => Some(*index),
            DataSource::Substr { upstream, .. }
            | DataSource::Regex { upstream, .. }
            | DataSource::JsonField { upstream, .. } => upstream.action_index(),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Str { text } => write!(f, "str({text:?})"),
            DataSource::Input { text } => write!(f, "input({text:?})"),
            DataSource::Header { index, key } => write!(f, "header(#{index}, {key})"),
            DataSource::Cookie { index, name, .. } => write!(f, "cookie(#{index}, {name})"),
            DataSource::Body { index } => write!(f, "body(#{index})"),
            DataSource::Substr {
                upstream,
                start,
                end,
            } => write!(f, "{upstream}[{start}..{end}]"),
            DataSource::Regex { upstream, .. } => write!(f, "regex({upstream})"),
            DataSource::JsonField { upstream, path } => {
                write!(f, "{upstream}")?;
                path.iter().try_for_each(|segment| write!(f, "{segment}"))
            }
        }
    }
}

fn compile(full: &str, pattern: &str) -> Result<Regex, ResolveError> {
    Regex::new(full).map_err(|e| ResolveError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Group 1 when the pattern captures, the whole match otherwise.
fn first_capture<'h>(caps: &Captures<'h>) -> &'h str {
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

/// Slice by characters with Python `text[start:end]` semantics.
fn slice_chars(text: &str, start: i64, end: i64) -> String {
    let len = text.chars().count() as i64;
    let clamp = |bound: i64| {
        if bound < 0 {
            (len + bound).max(0)
        } else {
            bound.min(len)
        }
    };
    let (start, end) = (clamp(start), clamp(end));
    if start >= end {
        return String::new();
    }
    text.chars()
        .skip(start as usize)
        .take((end - start) as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ResponseAction};
    use crate::http::{Cookie, Headers};
    use crate::json_path;

    const JSON_BODY: &str = r#"{"json_key": [{"key3": "test"}, "test2", 2, false], "key2": null}"#;

    fn actions() -> Vec<Action> {
        let first = ResponseAction {
            headers: [("User-Agent", "Chrome"), ("Test1", "test"), ("Time", "12:06:29")]
                .into_iter()
                .collect(),
            cookies: vec![Cookie::new("session", "test"), Cookie::new("_gl", "1.0.21879")],
            body: Some(JSON_BODY.as_bytes().to_vec()),
            ..ResponseAction::default()
        };
        let second = ResponseAction {
            headers: [("User-Agent", "Chrome"), ("Test2", "test"), ("Time", "12:06:30")]
                .into_iter()
                .collect(),
            ..ResponseAction::default()
        };
        let third = ResponseAction {
            headers: Headers::from_iter([("X-Link", "url"), ("Set-Cookie", "sid=a%2Fb; path=/")]),
            cookies: vec![Cookie::new("session", "test2"), Cookie::new("_gl2", "1.0.12368")],
            // Invalid JSON
            body: Some(br#"{"json_key": [{"key3": "test"}, "key2": null}"#.to_vec()),
            ..ResponseAction::default()
        };
        vec![
            Action::Response(first),
            Action::Response(second),
            Action::Response(third),
        ]
    }

    #[test]
    fn substr_composes() {
        let prefix: Vec<Action> = vec![];
        let source = DataSource::constant("test11").substr(1, 4);
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some("est"));

        let source = DataSource::constant("tttest2222").substr(1, 7).substr(1, 6);
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some("test2"));

        let source = DataSource::constant("other_tests3")
            .substr(2, 9)
            .substr(0, -1)
            .substr(1, 1000);
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some("er_te"));
    }

    #[test]
    fn full_substr_is_identity() {
        let prefix: Vec<Action> = vec![];
        let text = "žluťoučký kůň";
        let len = text.chars().count() as i64;
        let source = DataSource::constant(text).substr(0, len);
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some(text));
    }

    #[test]
    fn header_source_ignores_case() {
        let prefix = actions();
        let source = DataSource::header(0, "user-Agent");
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some("Chrome"));
        let source = DataSource::header(1, "time");
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some("12:06:30"));
        let source = DataSource::header(2, "time");
        assert_eq!(source.resolve(&prefix).unwrap(), None);
    }

    #[test]
    fn cookie_source_reads_by_name() {
        let prefix = actions();
        let source = DataSource::cookie(0, "session", ".*");
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some("test"));
        let source = DataSource::cookie(2, "_gl2", ".*");
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some("1.0.12368"));
        let source = DataSource::cookie(2, "inexistent", ".*");
        assert_eq!(source.resolve(&prefix).unwrap(), None);
        let source = DataSource::cookie(1, "session", ".*");
        assert_eq!(source.resolve(&prefix).unwrap(), None);
    }

    #[test]
    fn cookie_source_applies_offset_pattern_and_decodes() {
        let prefix = actions();
        // Set-Cookie values are decoded while parsing: "a/b"
        let source = DataSource::cookie(2, "sid", "(?:.{2})(.{1})");
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn body_source_reads_raw_body() {
        let prefix = actions();
        assert_eq!(
            DataSource::body(0).resolve(&prefix).unwrap().as_deref(),
            Some(JSON_BODY)
        );
        assert_eq!(DataSource::body(1).resolve(&prefix).unwrap(), None);
    }

    #[test]
    fn index_past_prefix_is_missing_reference() {
        let prefix = actions();
        assert_eq!(
            DataSource::body(100).resolve(&prefix),
            Err(ResolveError::ActionNotFound { index: 100, len: 3 })
        );
    }

    #[test]
    fn empty_slot_is_absent_not_error() {
        let prefix: Vec<Option<Action>> = vec![None, None];
        assert_eq!(DataSource::header(1, "a").resolve(&prefix), Ok(None));
    }

    #[test]
    fn json_field_projection() {
        let prefix = actions();
        let body = DataSource::body(0);
        let cases: Vec<(Vec<PathSegment>, Option<&str>)> = vec![
            (json_path!["json_key", 0, "key3"], Some("test")),
            (json_path!["json_key", 2], Some("2")),
            (json_path!["json_key", 3], Some("false")),
            (json_path!["json_key", 0], Some(r#"{"key3":"test"}"#)),
            (json_path!["key2", 3], None),
            (json_path!["json_key", 4], None),
            (json_path!["json_key", 0, 0], None),
            (json_path!["json_key", 3, "invalid"], None),
            (json_path!["key2", "invalid"], None),
        ];
        for (path, expected) in cases {
            let source = body.clone().json_field(path.clone());
            assert_eq!(
                source.resolve(&prefix).unwrap().as_deref(),
                expected,
                "path {path:?}"
            );
        }
    }

    #[test]
    fn json_field_of_invalid_or_missing_body_is_absent() {
        let prefix = actions();
        let path = json_path!["json_key"];
        assert_eq!(DataSource::body(1).json_field(path.clone()).resolve(&prefix), Ok(None));
        assert_eq!(DataSource::body(2).json_field(path).resolve(&prefix), Ok(None));
    }

    #[test]
    fn regex_source_extracts_group_or_default() {
        let prefix = actions();
        let source = DataSource::body(0).regex(r#""KEY3": "([^"]*)""#, "fallback");
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some("test"));

        let source = DataSource::body(0).regex("nomatch(.*)", "fallback");
        assert_eq!(source.resolve(&prefix).unwrap().as_deref(), Some("fallback"));

        // Absent upstream short-circuits before the default applies
        let source = DataSource::body(1).regex("x", "fallback");
        assert_eq!(source.resolve(&prefix).unwrap(), None);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let prefix = actions();
        let source = DataSource::body(0).regex("(", "d");
        assert!(matches!(
            source.resolve(&prefix),
            Err(ResolveError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn action_index_sees_through_wrappers() {
        let source = DataSource::cookie(4, "a", ".*").substr(0, 2).regex("x", "");
        assert_eq!(source.action_index(), Some(4));
        assert_eq!(DataSource::input("x").substr(0, 1).action_index(), None);
    }

    #[test]
    fn display_is_compact() {
        let source = DataSource::body(2).json_field(json_path!["a", 1]);
        assert_eq!(source.to_string(), "body(#2).a[1]");
    }
}

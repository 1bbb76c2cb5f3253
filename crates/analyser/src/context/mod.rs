//! Context synthesis.
//!
//! Given a container (usually a response body) and a value known to occur
//! in it, build a pattern whose first capture group re-extracts that value
//! from the same container, and only that occurrence. Patterns are stored
//! in [`DataSource::Regex`](erpeto_core::DataSource) sources and evaluated
//! case-insensitively with `.` matching newlines.
//!
//! Two strategies exist:
//! - [`text`]: literal context before and after the value, widened until
//!   the match is unique.
//! - [`html`]: the value of a tag attribute, localized by the tag name, a
//!   subset of its attribute names and, when needed, neighbouring tags.

pub mod html;
pub mod text;

pub use text::fixed_offset_pattern;

use erpeto_config::AnalyserConfig;
use regex_lite::Regex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Value does not occur in the container")]
    NeedleNotFound,

    #[error("No unique pattern found")]
    NoUniquePattern,
}

/// Builds extraction patterns. Cheap to construct; holds only limits.
#[derive(Debug, Clone)]
pub struct ContextSynthesizer {
    /// Initial context width and widening step, in characters
    pub window: usize,

    /// Containers shorter than this get a fixed-offset pattern
    pub short_container: usize,

    /// Neighbouring tags tried when localizing an attribute
    pub max_landmarks: usize,

    /// Longest start-anchored prefix a pattern may carry
    pub max_anchor_prefix: usize,
}

impl ContextSynthesizer {
    pub fn from_config(config: &AnalyserConfig) -> Self {
        Self {
            window: config.context_window,
            short_container: config.short_container,
            max_landmarks: config.max_landmarks,
            max_anchor_prefix: config.max_anchor_prefix,
        }
    }

    /// Pattern extracting the first occurrence of `needle` in `container`.
    ///
    /// An occurrence that sits in an HTML attribute value is localized
    /// through the markup first. Literal context is the fallback for
    /// everything else, and for attributes the markup cannot single out.
    pub fn synthesize(&self, container: &str, needle: &str) -> Result<String, ContextError> {
        if needle.is_empty() || !container.contains(needle) {
            return Err(ContextError::NeedleNotFound);
        }

        if html::looks_like_attribute_value(container, needle) {
            match html::attribute_pattern(container, needle, self.max_landmarks) {
                Some(Ok(pattern)) => return Ok(pattern),
                Some(Err(e)) => debug!(error = %e, "Attribute not unique, using literal context"),
                None => {}
            }
        }

        self.text_pattern(container, needle)
    }
}

impl Default for ContextSynthesizer {
    fn default() -> Self {
        Self::from_config(&AnalyserConfig::default())
    }
}

/// Group 1 of the single match of `pattern` in `haystack`, under the flags
/// sources are evaluated with. `None` when the pattern is invalid, does not
/// match or matches more than once.
pub(crate) fn unique_capture(pattern: &str, haystack: &str) -> Option<String> {
    let re = Regex::new(&format!("(?si){pattern}")).ok()?;
    let mut matches = re.captures_iter(haystack);
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    first.get(1).map(|m| m.as_str().to_string())
}

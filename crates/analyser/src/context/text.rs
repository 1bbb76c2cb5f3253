//! Literal-context patterns.

use super::{ContextError, ContextSynthesizer, unique_capture};
use regex_lite::escape;

/// Capture `len` characters after skipping `start`, or the whole value when
/// the occurrence spans all `total` characters.
pub fn fixed_offset_pattern(start: usize, len: usize, total: usize) -> String {
    if start == 0 && len == total {
        "(.*)".to_string()
    } else {
        format!("^.{{{start}}}(.{{{len}}})")
    }
}

impl ContextSynthesizer {
    /// Pattern built from the literal text around the first occurrence of
    /// `needle`.
    ///
    /// The context window starts at `window` characters on each side and
    /// grows by the same step while the pattern is ambiguous, up to
    /// `max_anchor_prefix` characters. Once it reaches the start of the
    /// container the whole prefix is anchored, which only works for
    /// prefixes within that same bound.
    pub fn text_pattern(&self, container: &str, needle: &str) -> Result<String, ContextError> {
        let start = container
            .find(needle)
            .filter(|_| !needle.is_empty())
            .ok_or(ContextError::NeedleNotFound)?;
        let before = &container[..start];
        let after = &container[start + needle.len()..];

        let start_chars = before.chars().count();
        let len = needle.chars().count();
        let total = container.chars().count();

        if total < self.short_container || start_chars < self.window {
            return Ok(fixed_offset_pattern(start_chars, len, total));
        }

        // Patterns are evaluated ASCII case-insensitively
        let folded = container.to_ascii_lowercase();

        let step = self.window.max(1);
        let mut width = step;
        while width < start_chars && width <= self.max_anchor_prefix {
            let prefix = tail(before, width);
            let suffix = head(after, width);
            if occurrences(
                &folded,
                &prefix.to_ascii_lowercase(),
                len,
                &suffix.to_ascii_lowercase(),
            ) == 1
            {
                let pattern = format!("{}(.{{{len}}}){}", literal(prefix), literal(suffix));
                if unique_capture(&pattern, container).as_deref() == Some(needle) {
                    return Ok(pattern);
                }
            }
            width += step;
        }

        if start_chars > self.max_anchor_prefix {
            return Err(ContextError::NoUniquePattern);
        }
        let pattern = format!(
            "^{}(.{{{len}}}){}",
            literal(before),
            literal(head(after, width))
        );
        match unique_capture(&pattern, container) {
            Some(found) if found == needle => Ok(pattern),
            _ => Err(ContextError::NoUniquePattern),
        }
    }
}

/// How many positions of `haystack` hold `prefix`, then any `len`
/// characters, then `suffix`. Counting stops at two.
fn occurrences(haystack: &str, prefix: &str, len: usize, suffix: &str) -> usize {
    let mut count = 0;
    let mut from = 0;
    while from <= haystack.len() {
        let Some(offset) = haystack[from..].find(prefix) else {
            break;
        };
        let at = from + offset;
        if skip_chars(&haystack[at + prefix.len()..], len).is_some_and(|rest| rest.starts_with(suffix)) {
            count += 1;
            if count > 1 {
                break;
            }
        }
        from = at + haystack[at..].chars().next().map_or(1, char::len_utf8);
    }
    count
}

/// `text` without its first `n` characters, if it has that many.
fn skip_chars(text: &str, n: usize) -> Option<&str> {
    if n == 0 {
        return Some(text);
    }
    let (index, c) = text.char_indices().nth(n - 1)?;
    Some(&text[index + c.len_utf8()..])
}

fn literal(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("(?:{})", escape(text))
    }
}

/// The last `n` characters of `text`.
fn tail(text: &str, n: usize) -> &str {
    match n.checked_sub(1).and_then(|skip| text.char_indices().rev().nth(skip)) {
        Some((index, _)) => &text[index..],
        None if n == 0 => "",
        None => text,
    }
}

/// The first `n` characters of `text`.
fn head(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

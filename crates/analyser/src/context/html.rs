//! Attribute-value patterns for HTML bodies.
//!
//! The markup is not parsed into a tree. A small lexer walks the opening
//! tags in document order, which is all the localization needs: the tag
//! holding the value, its attribute names, and the tags around it.

use super::{ContextError, unique_capture};
use regex_lite::escape;
use std::ops::Range;

/// An opening tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Lowercased tag name
    pub name: String,
    pub attrs: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Lowercased attribute name
    pub name: String,

    /// Raw value, entities left as written
    pub value: Option<String>,

    /// Quote character around the value, if any
    pub quote: Option<char>,
}

/// Whether the first occurrence of `needle` reads like an attribute value:
/// optionally quoted, preceded by `=` and inside an open tag.
pub fn looks_like_attribute_value(html: &str, needle: &str) -> bool {
    let Some(index) = html.find(needle) else {
        return false;
    };
    let before = &html[..index];
    let after = &html[index + needle.len()..];

    let quoted = ['"', '\'']
        .into_iter()
        .any(|q| before.ends_with(q) && after.starts_with(q));
    let before = if quoted { &before[..before.len() - 1] } else { before };

    let mut rest = before.trim_end().chars().rev();
    if rest.next() != Some('=') {
        return false;
    }
    for c in rest {
        match c {
            '<' => return true,
            '>' => return false,
            _ => {}
        }
    }
    false
}

/// Localize the first attribute whose value equals `needle`.
///
/// `None` when no tag carries such an attribute; the caller then falls
/// back to literal context.
pub fn attribute_pattern(
    html: &str,
    needle: &str,
    max_landmarks: usize,
) -> Option<Result<String, ContextError>> {
    let tags = lex_tags(html);
    let (position, target) = tags.iter().enumerate().find_map(|(position, tag)| {
        tag.attrs
            .iter()
            .position(|attr| attr.value.as_deref() == Some(needle))
            .map(|target| (position, target))
    })?;

    let mut template = AttrTemplate::new(&tags[position], target);
    Some(localize(&mut template, &tags, position, html, needle, max_landmarks))
}

fn localize<'t>(
    template: &mut AttrTemplate<'t>,
    tags: &'t [Tag],
    position: usize,
    html: &str,
    needle: &str,
    max_landmarks: usize,
) -> Result<String, ContextError> {
    let mut found = template.is_unique(html, needle);

    // Attribute names, in document order, accumulated one at a time
    let mut activated = Vec::new();
    for index in 0..template.active.len() {
        if found {
            break;
        }
        if index == template.target {
            continue;
        }
        template.active[index] = true;
        activated.push(index);
        found = template.is_unique(html, needle);
    }

    // Neighbouring tags, alternating before and after
    let mut distance = 1;
    while !found && template.landmarks() < max_landmarks {
        let previous = position.checked_sub(distance).map(|i| &tags[i]);
        let next = tags.get(position + distance);
        if previous.is_none() && next.is_none() {
            break;
        }
        if let Some(tag) = previous {
            template.before.insert(0, tag);
            found = template.is_unique(html, needle);
        }
        if !found
            && template.landmarks() < max_landmarks
            && let Some(tag) = next
        {
            template.after.push(tag);
            found = template.is_unique(html, needle);
        }
        distance += 1;
    }

    if !found {
        return Err(ContextError::NoUniquePattern);
    }

    for index in activated {
        template.active[index] = false;
        if !template.is_unique(html, needle) {
            template.active[index] = true;
        }
    }
    template.prune_landmarks(html, needle);

    Ok(template.build())
}

/// The pattern under construction.
struct AttrTemplate<'t> {
    tag: &'t Tag,
    target: usize,
    active: Vec<bool>,
    before: Vec<&'t Tag>,
    after: Vec<&'t Tag>,
}

impl<'t> AttrTemplate<'t> {
    fn new(tag: &'t Tag, target: usize) -> Self {
        Self {
            tag,
            target,
            active: vec![false; tag.attrs.len()],
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    fn landmarks(&self) -> usize {
        self.before.len() + self.after.len()
    }

    fn is_unique(&self, html: &str, needle: &str) -> bool {
        unique_capture(&self.build(), html).as_deref() == Some(needle)
    }

    /// Drop landmarks that are not needed for uniqueness.
    fn prune_landmarks(&mut self, html: &str, needle: &str) {
        let mut index = 0;
        while index < self.before.len() {
            let removed = self.before.remove(index);
            if !self.is_unique(html, needle) {
                self.before.insert(index, removed);
                index += 1;
            }
        }
        let mut index = 0;
        while index < self.after.len() {
            let removed = self.after.remove(index);
            if !self.is_unique(html, needle) {
                self.after.insert(index, removed);
                index += 1;
            }
        }
    }

    fn build(&self) -> String {
        let mut pattern = String::new();
        for tag in &self.before {
            pattern.push_str(&landmark(tag));
            pattern.push_str(".*?");
        }

        pattern.push('<');
        pattern.push_str(&escape(&self.tag.name));
        pattern.push_str("[^>]+");
        for attr in self.enabled(0..self.target) {
            pattern.push_str(&escape(&attr.name));
            pattern.push_str("[^>]+");
        }

        let attr = &self.tag.attrs[self.target];
        pattern.push_str(&escape(&attr.name));
        pattern.push_str(r"\s*=\s*");
        pattern.push_str(&value_pattern(attr.quote));

        for attr in self.enabled(self.target + 1..self.tag.attrs.len()) {
            pattern.push_str("[^>]+");
            pattern.push_str(&escape(&attr.name));
        }

        for tag in &self.after {
            pattern.push_str(".*?");
            pattern.push_str(&landmark(tag));
        }
        pattern
    }

    fn enabled(&self, range: Range<usize>) -> impl Iterator<Item = &'t Attribute> + '_ {
        let tag = self.tag;
        range
            .filter(move |&index| self.active[index])
            .map(move |index| &tag.attrs[index])
    }
}

fn value_pattern(quote: Option<char>) -> String {
    match quote {
        Some(q) => format!("{q}([^{q}]*){q}"),
        None => r"([^\s>]*)".to_string(),
    }
}

/// A tag with the same name and at least the same attributes, in order.
fn landmark(tag: &Tag) -> String {
    let mut pattern = format!("<{}[^>]*", escape(&tag.name));
    for attr in &tag.attrs {
        pattern.push_str(&escape(&attr.name));
        pattern.push_str("[^>]*");
    }
    pattern.push('>');
    pattern
}

/// Opening tags of `html` in document order. Comments, closing tags and
/// declarations are skipped.
pub fn lex_tags(html: &str) -> Vec<Tag> {
    let bytes = html.as_bytes();
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(offset) = html[pos..].find('<') {
        let start = pos + offset + 1;
        if html[start..].starts_with("!--") {
            pos = html[start..]
                .find("-->")
                .map_or(bytes.len(), |end| start + end + 3);
            continue;
        }
        if !bytes.get(start).is_some_and(u8::is_ascii_alphabetic) {
            pos = start;
            continue;
        }

        let name_len = html[start..]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b':' | b'_'))
            .count();
        let name = html[start..start + name_len].to_ascii_lowercase();
        let (attrs, end) = lex_attributes(html, start + name_len);
        tags.push(Tag { name, attrs });
        pos = end;
    }
    tags
}

/// Attributes from `pos` to the end of the tag, and the position after it.
fn lex_attributes(html: &str, mut pos: usize) -> (Vec<Attribute>, usize) {
    let bytes = html.as_bytes();
    let len = bytes.len();
    let skip_space = |mut pos: usize| {
        while pos < len && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        pos
    };
    let mut attrs = Vec::new();

    loop {
        while pos < len && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b'/') {
            pos += 1;
        }
        if pos >= len {
            return (attrs, len);
        }
        if bytes[pos] == b'>' {
            return (attrs, pos + 1);
        }

        let name_start = pos;
        while pos < len && !bytes[pos].is_ascii_whitespace() && !matches!(bytes[pos], b'=' | b'>' | b'/') {
            pos += 1;
        }
        if pos == name_start {
            // stray '='
            pos += 1;
            continue;
        }
        let name = html[name_start..pos].to_ascii_lowercase();

        let after_name = skip_space(pos);
        if after_name >= len || bytes[after_name] != b'=' {
            attrs.push(Attribute {
                name,
                value: None,
                quote: None,
            });
            pos = after_name;
            continue;
        }

        pos = skip_space(after_name + 1);
        match bytes.get(pos) {
            Some(&q @ (b'"' | b'\'')) => {
                let value_start = pos + 1;
                let value_end = html[value_start..]
                    .find(q as char)
                    .map_or(len, |end| value_start + end);
                attrs.push(Attribute {
                    name,
                    value: Some(html[value_start..value_end].to_string()),
                    quote: Some(q as char),
                });
                pos = (value_end + 1).min(len);
            }
            _ => {
                let value_start = pos;
                while pos < len && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' {
                    pos += 1;
                }
                attrs.push(Attribute {
                    name,
                    value: Some(html[value_start..pos].to_string()),
                    quote: None,
                });
            }
        }
    }
}

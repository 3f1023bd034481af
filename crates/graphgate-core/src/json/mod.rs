//! Streaming JSON utilities.
//!
//! These functions operate on raw document bytes without building a value
//! tree. They back the hot path of request handling: reading variables,
//! finding cursor fields in results, and stripping disallowed fields from
//! responses.
//!
//! - [`keys`] lists the keys of a document at every depth.
//! - [`filter`] keeps the first-level fields whose key is in a [`KeySet`].
//! - [`get`] and [`lookup`] locate fields by key.
//! - [`replace`] rewrites located values in a single copy.

mod filter;
mod keys;
mod scanner;

use std::io::{self, Write};

pub use filter::{filter, hash_key, KeySet};
pub use keys::keys;
pub use scanner::{Field, FieldScanner, Span, Token};

use scanner::first_significant;

/// Find every field, at any depth, whose key is in `keys`.
///
/// Fields are returned in document order of their keys. When both a field
/// and one of its descendants match, both are returned.
pub fn get<'a>(doc: &'a [u8], keys: &KeySet) -> Vec<Field<'a>> {
    let mut found = Vec::new();
    collect(doc, 0, keys, &mut found);
    found
}

fn collect<'a>(doc: &'a [u8], base: usize, keys: &KeySet, found: &mut Vec<Field<'a>>) {
    for token in FieldScanner::with_offset(doc, base) {
        let Token::Field(field) = token else {
            continue;
        };
        if keys.contains(field.key) {
            found.push(field);
        }
        let local = Span::new(field.value.start - base, field.value.end - base);
        let value = local.slice(doc);
        if matches!(first_significant(value), Some(b'{') | Some(b'[')) {
            collect(value, field.value.start, keys, found);
        }
    }
}

/// Find a first-level field by key.
pub fn lookup<'a>(doc: &'a [u8], key: &str) -> Option<Field<'a>> {
    FieldScanner::new(doc).find_map(|token| match token {
        Token::Field(field) if field.key == key.as_bytes() => Some(field),
        _ => None,
    })
}

/// A value substitution for [`replace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Span of the value being replaced.
    pub span: Span,
    /// Replacement bytes, written verbatim.
    pub value: Vec<u8>,
}

impl Edit {
    pub fn new(span: Span, value: impl Into<Vec<u8>>) -> Self {
        Self {
            span,
            value: value.into(),
        }
    }
}

/// Copy `doc` to `w`, substituting each edited span with its replacement.
///
/// Edits may be given in any order. An edit overlapping an earlier one is
/// ignored.
pub fn replace<W: Write>(w: &mut W, doc: &[u8], mut edits: Vec<Edit>) -> io::Result<()> {
    edits.sort_by_key(|e| e.span.start);

    let mut pos = 0;
    for edit in &edits {
        if edit.span.start < pos || edit.span.end >= doc.len() {
            continue;
        }
        w.write_all(&doc[pos..edit.span.start])?;
        w.write_all(&edit.value)?;
        pos = edit.span.end + 1;
    }
    w.write_all(&doc[pos..])?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_deep() {
        let doc = br#"{"a":{"cur":"1"},"list":[{"cur":"2"},{"cur":"3"}],"cur":"4"}"#;
        let set: KeySet = ["cur"].iter().collect();
        let values: Vec<&[u8]> = get(doc, &set).iter().map(|f| f.value.slice(doc)).collect();
        assert_eq!(
            values,
            vec![
                b"\"1\"".as_slice(),
                b"\"2\"".as_slice(),
                b"\"3\"".as_slice(),
                b"\"4\"".as_slice()
            ]
        );
    }

    #[test]
    fn test_get_matches_parent_and_child() {
        let doc = br#"{"x":{"x":1}}"#;
        let set: KeySet = ["x"].iter().collect();
        let found = get(doc, &set);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].value.slice(doc), br#"{"x":1}"#);
        assert_eq!(found[1].value.slice(doc), b"1");
    }

    #[test]
    fn test_lookup_top_level_only() {
        let doc = br#"{"nested":{"id":1},"id":2}"#;
        let field = lookup(doc, "id").unwrap();
        assert_eq!(field.value.slice(doc), b"2");
        assert!(lookup(doc, "missing").is_none());
    }

    #[test]
    fn test_replace_in_any_order() {
        let doc = br#"{"a":"x","b":"y"}"#;
        let a = lookup(doc, "a").unwrap();
        let b = lookup(doc, "b").unwrap();
        let mut out = Vec::new();
        replace(
            &mut out,
            doc,
            vec![Edit::new(b.value, "null"), Edit::new(a.value, "\"z\"")],
        )
        .unwrap();
        assert_eq!(out, br#"{"a":"z","b":null}"#);
    }

    #[test]
    fn test_replace_skips_overlaps() {
        let doc = br#"{"x":{"x":1}}"#;
        let set: KeySet = ["x"].iter().collect();
        let edits = get(doc, &set)
            .into_iter()
            .map(|f| Edit::new(f.value, "0"))
            .collect();
        let mut out = Vec::new();
        replace(&mut out, doc, edits).unwrap();
        assert_eq!(out, br#"{"x":0}"#);
    }

    #[test]
    fn test_replace_without_edits_copies() {
        let doc = br#"{"a":1}"#;
        let mut out = Vec::new();
        replace(&mut out, doc, Vec::new()).unwrap();
        assert_eq!(out, doc);
    }
}

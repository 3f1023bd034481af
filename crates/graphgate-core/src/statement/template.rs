//! `{{name}}` placeholders in statement text.
//!
//! A placeholder may appear bare (`{{id}}`) or wrapped in single quotes
//! (`'{{id}}'`); both forms are replaced as a unit. Rendering substitutes a
//! quoted SQL string literal, parameterizing substitutes a positional `$n`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::ops::Range;

use super::prepared::ArgDescriptor;
use crate::error::Result;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder<'a> {
    range: Range<usize>,
    name: &'a str,
}

fn is_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn placeholders(text: &str) -> Vec<Placeholder<'_>> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(open) = text[pos..].find(OPEN) {
        let start = pos + open;
        let name_start = start + OPEN.len();
        let Some(close) = text[name_start..].find(CLOSE) else {
            break;
        };
        let name_end = name_start + close;
        let end = name_end + CLOSE.len();
        let name = text[name_start..name_end].trim();

        if !is_name(name) {
            pos = name_start;
            continue;
        }

        let quoted = start > 0 && bytes[start - 1] == b'\'' && bytes.get(end) == Some(&b'\'');
        let range = if quoted { start - 1..end + 1 } else { start..end };
        pos = range.end;
        found.push(Placeholder { range, name });
    }

    found
}

/// Names of the placeholders in `text`, in order of first appearance.
pub fn names(text: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for p in placeholders(text) {
        if !names.contains(&p.name) {
            names.push(p.name);
        }
    }
    names
}

/// Double every single quote.
pub fn escape_quotes(s: &str) -> Cow<'_, str> {
    if s.contains('\'') {
        Cow::Owned(s.replace('\'', "''"))
    } else {
        Cow::Borrowed(s)
    }
}

/// Append a `{{name}}` placeholder.
pub fn write_placeholder(out: &mut String, name: &str) {
    let _ = write!(out, "{}{}{}", OPEN, name, CLOSE);
}

/// Rewrite `$name` variable references as `{{name}}` placeholders.
pub fn from_variables(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut rest = s;

    while let Some(i) = rest.find('$') {
        out.push_str(&rest[..i]);
        let after = &rest[i + 1..];
        let len = after
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        if len == 0 {
            out.push('$');
        } else {
            write_placeholder(&mut out, &after[..len]);
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}

/// Substitute every placeholder with the value returned by `value`.
///
/// Values are written as SQL string literals with single quotes doubled;
/// `None` is written as `NULL`.
pub fn render<F>(text: &str, mut value: F) -> Result<String>
where
    F: FnMut(&ArgDescriptor) -> Result<Option<String>>,
{
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    for p in placeholders(text) {
        out.push_str(&text[pos..p.range.start]);
        match value(&ArgDescriptor::new(p.name))? {
            Some(v) => {
                out.push('\'');
                out.push_str(&escape_quotes(&v));
                out.push('\'');
            }
            None => out.push_str("NULL"),
        }
        pos = p.range.end;
    }
    out.push_str(&text[pos..]);

    Ok(out)
}

/// Replace placeholders with positional parameters.
///
/// Repeated names share one parameter. Returns the rewritten text and the
/// argument descriptors in parameter order.
pub fn parameterize(text: &str) -> (String, Vec<ArgDescriptor>) {
    let mut out = String::with_capacity(text.len());
    let mut args: Vec<ArgDescriptor> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut pos = 0;

    for p in placeholders(text) {
        out.push_str(&text[pos..p.range.start]);
        let n = *positions.entry(p.name).or_insert_with(|| {
            args.push(ArgDescriptor::new(p.name));
            args.len()
        });
        let _ = write!(out, "${}", n);
        pos = p.range.end;
    }
    out.push_str(&text[pos..]);

    (out, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::ArgKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_quotes_values() {
        let sql = "SELECT * FROM t WHERE a = '{{a}}' AND b = {{b}} AND c = {{c}}";
        let out = render(sql, |arg| {
            Ok(match arg.name.as_str() {
                "a" => Some("it's".to_string()),
                "b" => Some("1".to_string()),
                _ => None,
            })
        })
        .unwrap();
        assert_eq!(out, "SELECT * FROM t WHERE a = 'it''s' AND b = '1' AND c = NULL");
    }

    #[test]
    fn test_render_propagates_errors() {
        let err = render("{{x}}", |_| {
            Err(crate::Error::InvalidRequest("missing variable x".to_string()))
        });
        assert!(err.is_err());
    }

    #[test]
    fn test_parameterize_reuses_numbers() {
        let (sql, args) = parameterize("WHERE a = '{{id}}' OR b = {{ cursor }} OR c = {{id}}");
        assert_eq!(sql, "WHERE a = $1 OR b = $2 OR c = $1");
        let names: Vec<_> = args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["id", "cursor"]);
        assert_eq!(args[1].kind, ArgKind::Cursor);
    }

    #[test]
    fn test_invalid_placeholders_left_alone() {
        let (sql, args) = parameterize("SELECT '{{}}', '{{a b}}', '{{unterminated'");
        assert_eq!(sql, "SELECT '{{}}', '{{a b}}', '{{unterminated'");
        assert!(args.is_empty());
    }

    #[test]
    fn test_from_variables() {
        assert_eq!(from_variables("$user_id"), "{{user_id}}");
        assert_eq!(from_variables("a:$b-$c"), "a:{{b}}-{{c}}");
        assert_eq!(from_variables("cost $ 5"), "cost $ 5");
        assert_eq!(from_variables("plain"), "plain");
    }

    #[test]
    fn test_names_in_order() {
        assert_eq!(names("{{b}} {{a}} {{b}}"), vec!["b", "a"]);
    }
}

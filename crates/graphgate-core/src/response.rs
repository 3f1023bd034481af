//! Result redaction and response rendering.

use bytes::Bytes;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::json::{self, Edit, FieldScanner, KeySet, Token};
use crate::security::{AuthorizationProfiles, OperationKind};
use crate::statement::{SelectionNode, SelectionTree};
use crate::trace::Trace;

/// Strips fields a role may not see from a result document.
///
/// Each selected table keeps its allowed columns plus the fields of its
/// child selections (and their cursors). Tables without a column
/// restriction are left as they are. The top level keeps only the root
/// selections and their cursors.
pub struct Redactor<'a> {
    profiles: &'a AuthorizationProfiles,
    role: &'a str,
    kind: OperationKind,
    selection: &'a SelectionTree,
}

impl<'a> Redactor<'a> {
    pub fn new(
        profiles: &'a AuthorizationProfiles,
        role: &'a str,
        kind: OperationKind,
        selection: &'a SelectionTree,
    ) -> Self {
        Self {
            profiles,
            role,
            kind,
            selection,
        }
    }

    pub fn redact(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() || self.selection.is_empty() {
            return Ok(data.to_vec());
        }

        let roots: Vec<&SelectionNode> = self.selection.roots().collect();
        let mut keys = KeySet::new();
        for root in &roots {
            keys.insert(&root.name);
            if let Some(cursor) = root.cursor_field() {
                keys.insert(cursor);
            }
        }

        let mut top = Vec::with_capacity(data.len());
        json::filter(&mut top, data, &keys).map_err(io_error)?;

        self.redact_children(&top, &roots)
    }

    /// Redact the values of `nodes` found among the first-level fields of `doc`.
    fn redact_children(&self, doc: &[u8], nodes: &[&SelectionNode]) -> Result<Vec<u8>> {
        if nodes.is_empty() {
            return Ok(doc.to_vec());
        }

        let mut edits = Vec::new();
        for token in FieldScanner::new(doc) {
            let Token::Field(field) = token else {
                continue;
            };
            let Some(node) = nodes.iter().find(|n| n.name.as_bytes() == field.key) else {
                continue;
            };
            let value = field.value.slice(doc);
            let redacted = self.redact_node(value, node)?;
            if redacted != value {
                edits.push(Edit::new(field.value, redacted));
            }
        }

        if edits.is_empty() {
            return Ok(doc.to_vec());
        }

        let mut out = Vec::with_capacity(doc.len());
        json::replace(&mut out, doc, edits).map_err(io_error)?;
        Ok(out)
    }

    fn redact_node(&self, value: &[u8], node: &SelectionNode) -> Result<Vec<u8>> {
        let children: Vec<&SelectionNode> = self.selection.children(node.id).collect();
        let nested = self.redact_children(value, &children)?;

        let Some(columns) = self
            .profiles
            .allowed_columns(self.role, &node.table, self.kind)
        else {
            return Ok(nested);
        };

        let mut keys: KeySet = columns.iter().collect();
        for child in &children {
            keys.insert(&child.name);
            if let Some(cursor) = child.cursor_field() {
                keys.insert(cursor);
            }
        }

        let mut out = Vec::with_capacity(nested.len());
        json::filter(&mut out, &nested, &keys).map_err(io_error)?;
        Ok(out)
    }
}

fn io_error(e: std::io::Error) -> Error {
    Error::MalformedInput(e.to_string())
}

/// Render a successful response.
///
/// Produces `{"data":<data>}`, with `"extensions":{"tracing":...}` when a
/// trace is given. Empty data renders as `null`.
pub fn render(data: &[u8], trace: Option<&Trace>) -> Result<Bytes> {
    let data = trim(data);
    let mut out = Vec::with_capacity(data.len() + 16);

    out.extend_from_slice(b"{\"data\":");
    if data.is_empty() {
        out.extend_from_slice(b"null");
    } else {
        out.extend_from_slice(data);
    }

    if let Some(trace) = trace {
        out.extend_from_slice(b",\"extensions\":{\"tracing\":");
        serde_json::to_writer(&mut out, trace)
            .map_err(|e| Error::MalformedInput(format!("trace: {}", e)))?;
        out.push(b'}');
    }
    out.push(b'}');

    Ok(Bytes::from(out))
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    errors: [ErrorEntry<'a>; 1],
}

#[derive(Serialize)]
struct ErrorEntry<'a> {
    message: &'a str,
    code: &'a str,
}

/// Render an error response: `{"errors":[{"message":...,"code":...}]}`.
pub fn render_error(err: &Error, production: bool) -> Bytes {
    let message = err.client_message(production);
    let body = ErrorBody {
        errors: [ErrorEntry {
            message: &message,
            code: err.code(),
        }],
    };
    match serde_json::to_vec(&body) {
        Ok(out) => Bytes::from(out),
        Err(_) => Bytes::from_static(br#"{"errors":[{"message":"internal error","code":"INTERNAL"}]}"#),
    }
}

fn trim(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &data[start..end]
}

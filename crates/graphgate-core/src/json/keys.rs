//! Key extraction over a whole document.

use super::scanner::{escaped, escaped_by, is_number_byte, is_whitespace, Nesting, State};

/// Region of an array that has already been represented by its first element.
#[derive(Debug, Clone, Copy)]
struct SkipWindow {
    /// End of the first element.
    start: usize,
    /// End of the array.
    end: usize,
}

/// Collect the keys of every object in `doc`, at every depth, in document
/// order.
///
/// Arrays are assumed to be homogeneous: only the first element that can
/// carry keys is scanned (an object, or an array holding an object at any
/// depth), and the remaining elements are skipped. Scalars before it, and
/// arrays of scalars, contribute nothing. Keys are returned as raw bytes
/// borrowed from `doc`, without unescaping; duplicates are kept.
pub fn keys(doc: &[u8]) -> Vec<&[u8]> {
    let mut res = Vec::with_capacity(20);
    let mut skips: Vec<SkipWindow> = Vec::new();
    let mut nesting = Nesting::default();
    let mut state = State::ExpectValue;
    let mut key: Option<&[u8]> = None;
    let mut key_start = 0;
    let mut start = 0;
    let mut list_end: Option<usize> = None;

    let mut i = 0;
    while i < doc.len() {
        let c = doc[i];

        if state.in_container() {
            nesting.observe(doc, i);
        }

        let mut closed = false;
        let mut descend = false;

        match state {
            State::ExpectKey => {
                if let Some(window) = skips.last().copied() {
                    if i >= window.start {
                        skips.pop();
                        // Past the array close and the separator after it.
                        i = window.end + 2;
                        continue;
                    }
                }
                match c {
                    b'{' => {
                        state = State::ExpectObjClose;
                        start = i;
                        nesting.start();
                    }
                    b'"' => {
                        state = State::ExpectKeyClose;
                        key_start = i;
                    }
                    _ => {}
                }
            }
            State::ExpectKeyClose => {
                if c == b'"' && !escaped(doc, i) {
                    state = State::ExpectColon;
                    key = doc.get(key_start + 1..i);
                }
            }
            State::ExpectColon => {
                if c == b':' {
                    state = State::ExpectValue;
                }
            }
            State::ExpectValue => match c {
                b'"' => state = State::ExpectString,
                b'[' => {
                    state = State::ExpectListClose;
                    start = i;
                    nesting.start();
                }
                b'{' => {
                    state = State::ExpectObjClose;
                    start = i;
                    nesting.start();
                }
                b'0'..=b'9' | b'-' => state = State::ExpectNumClose,
                b'f' | b'F' | b't' | b'T' => state = State::ExpectBoolClose,
                b'n' => state = State::ExpectNull,
                _ => {}
            },
            State::ExpectString => closed = c == b'"' && !escaped(doc, i),
            State::ExpectNumClose => closed = !is_number_byte(c),
            State::ExpectBoolClose => closed = c == b'e' || c == b'E',
            State::ExpectNull => closed = c == b'l' && escaped_by(doc, i, b'l'),
            State::ExpectObjClose => {
                if nesting.is_closed() && c == b'}' {
                    closed = true;
                    if let Some(end) = list_end.take() {
                        skips.push(SkipWindow { start: i, end });
                    }
                    i = start;
                }
            }
            State::ExpectListClose => {
                if nesting.is_closed() && c == b']' {
                    closed = true;
                    let end = i;
                    list_end = None;
                    // Resume at the first element that can carry keys and
                    // skip the rest of the array once it closes.
                    match first_keyed_element(doc, start, end) {
                        Some(at) if doc[at] == b'{' => {
                            i = at - 1;
                            list_end = Some(end);
                        }
                        Some(at) => {
                            if let Some(close) = container_end(doc, at, end) {
                                skips.push(SkipWindow { start: close, end });
                            }
                            i = at - 1;
                            descend = true;
                        }
                        None => i = end,
                    }
                }
            }
        }

        if closed {
            if let Some(k) = key.take() {
                res.push(k);
            }
            state = State::ExpectKey;
        }
        if descend {
            state = State::ExpectValue;
        }

        i += 1;
    }

    res
}

/// Position of the first element of the array at `start..=end` that holds
/// keys: an object, or an array with an object somewhere inside it.
fn first_keyed_element(doc: &[u8], start: usize, end: usize) -> Option<usize> {
    let mut j = start + 1;
    let mut in_string = false;
    while j < end {
        let c = doc[j];
        if in_string {
            in_string = !(c == b'"' && !escaped(doc, j));
        } else {
            match c {
                b'"' => in_string = true,
                b'{' => return Some(j),
                b'[' => {
                    let close = container_end(doc, j, end)?;
                    if first_keyed_element(doc, j, close).is_some() {
                        return Some(j);
                    }
                    j = close;
                }
                _ => {}
            }
        }
        j += 1;
    }
    None
}

/// Position of the bracket closing the container opened at `open`, looking
/// no further than `limit`.
fn container_end(doc: &[u8], open: usize, limit: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (j, &c) in doc.iter().enumerate().take(limit + 1).skip(open) {
        if in_string {
            in_string = !(c == b'"' && !escaped(doc, j));
            continue;
        }
        match c {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

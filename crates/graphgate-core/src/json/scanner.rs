//! Byte-oriented JSON token scanning.
//!
//! The scanner walks a document once, left to right, tracking an explicit
//! state instead of building a tree. Container values (objects and arrays)
//! are skipped as a whole by counting brackets outside of strings, so the
//! fields of an object are visited without ever materializing nested values.
//!
//! The input is assumed to be well-formed JSON. Truncated or malformed input
//! never causes an out-of-range access, but may yield partial results.
//!
//! A quote is treated as escaped iff the byte right before it is a backslash.
//! A string ending in an escaped backslash (`"a\\"`) is therefore not
//! terminated where it should be; keys and values containing that sequence
//! are not supported.

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    ExpectKey,
    ExpectKeyClose,
    ExpectColon,
    ExpectValue,
    ExpectString,
    ExpectListClose,
    ExpectObjClose,
    ExpectNumClose,
    ExpectBoolClose,
    ExpectNull,
}

impl State {
    /// Whether the scanner is inside a container value and must count brackets.
    pub(crate) fn in_container(self) -> bool {
        matches!(self, State::ExpectObjClose | State::ExpectListClose)
    }
}

/// Inclusive byte range `[start, end]` within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// First byte of the range.
    pub start: usize,
    /// Last byte of the range (inclusive).
    pub end: usize,
}

impl Span {
    /// Create a span covering `start..=end`.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Shift the span by `offset` bytes.
    pub fn offset(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }

    /// The bytes covered by this span, or an empty slice if out of range.
    pub fn slice<'a>(&self, doc: &'a [u8]) -> &'a [u8] {
        doc.get(self.start..=self.end).unwrap_or(&[])
    }
}

/// A key/value pair found by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    /// Key bytes, without the surrounding quotes and without unescaping.
    pub key: &'a [u8],
    /// Offset of the key's opening quote.
    pub key_start: usize,
    /// Span of the value.
    pub value: Span,
}

impl<'a> Field<'a> {
    /// Span covering the whole `"key":value` entry.
    pub fn entry(&self) -> Span {
        Span::new(self.key_start, self.value.end)
    }

    fn offset(self, offset: usize) -> Self {
        Self {
            key: self.key,
            key_start: self.key_start + offset,
            value: self.value.offset(offset),
        }
    }
}

/// Structural event produced by [`FieldScanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// An array opened where a key was expected.
    ListOpen(usize),
    /// An object opened where a key was expected.
    ObjectOpen(usize),
    /// A complete key/value pair.
    Field(Field<'a>),
}

/// Bracket counter for container values that ignores brackets inside strings.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Nesting {
    depth: i32,
    in_string: bool,
}

impl Nesting {
    /// Start tracking a container whose opening bracket was just consumed.
    pub(crate) fn start(&mut self) {
        self.depth = 1;
        self.in_string = false;
    }

    /// Account for the byte at `i`.
    pub(crate) fn observe(&mut self, doc: &[u8], i: usize) {
        let c = doc[i];
        if c == b'"' && !escaped(doc, i) {
            self.in_string = !self.in_string;
        }
        if !self.in_string {
            match c {
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => self.depth -= 1,
                _ => {}
            }
        }
    }

    /// True once the matching close bracket has been seen.
    pub(crate) fn is_closed(&self) -> bool {
        self.depth == 0
    }
}

/// Whether the byte at `i` is preceded by a backslash.
#[inline]
pub(crate) fn escaped(doc: &[u8], i: usize) -> bool {
    i > 0 && doc[i - 1] == b'\\'
}

#[inline]
pub(crate) fn is_number_byte(c: u8) -> bool {
    c.is_ascii_digit() || matches!(c, b'.' | b'e' | b'E' | b'+' | b'-')
}

#[inline]
pub(crate) fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r')
}

/// First non-whitespace byte of a document.
pub(crate) fn first_significant(doc: &[u8]) -> Option<u8> {
    doc.iter().copied().find(|c| !is_whitespace(*c))
}

/// Single-pass iterator over the fields of an object, or of every element of
/// an array of objects.
///
/// Values are reported as spans; nested containers are skipped whole, so only
/// the first level of fields is produced.
pub struct FieldScanner<'a> {
    doc: &'a [u8],
    base: usize,
    pos: usize,
    state: State,
    key_start: usize,
    value_start: usize,
    key: Option<&'a [u8]>,
    nesting: Nesting,
}

impl<'a> FieldScanner<'a> {
    /// Scan a whole document.
    pub fn new(doc: &'a [u8]) -> Self {
        Self::with_offset(doc, 0)
    }

    /// Scan a sub-slice of a larger document; reported offsets are shifted by
    /// `base` so they index into the larger document.
    pub fn with_offset(doc: &'a [u8], base: usize) -> Self {
        Self {
            doc,
            base,
            pos: 0,
            state: State::ExpectKey,
            key_start: 0,
            value_start: 0,
            key: None,
            nesting: Nesting::default(),
        }
    }

    fn close(&mut self, end: usize) -> Option<Field<'a>> {
        self.state = State::ExpectKey;
        let key = self.key.take()?;
        let field = Field {
            key,
            key_start: self.key_start,
            value: Span::new(self.value_start, end),
        };
        Some(field.offset(self.base))
    }
}

impl<'a> Iterator for FieldScanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = self.doc;

        while self.pos < doc.len() {
            let i = self.pos;
            let c = doc[i];
            self.pos += 1;

            if self.state.in_container() {
                self.nesting.observe(doc, i);
            }

            let closed = match self.state {
                State::ExpectKey => match c {
                    b'[' => return Some(Token::ListOpen(self.base + i)),
                    b'{' => return Some(Token::ObjectOpen(self.base + i)),
                    b'"' => {
                        self.state = State::ExpectKeyClose;
                        self.key_start = i;
                        None
                    }
                    _ => None,
                },
                State::ExpectKeyClose => {
                    if c == b'"' && !escaped(doc, i) {
                        self.state = State::ExpectColon;
                        self.key = doc.get(self.key_start + 1..i);
                    }
                    None
                }
                State::ExpectColon => {
                    if c == b':' {
                        self.state = State::ExpectValue;
                    }
                    None
                }
                State::ExpectValue => {
                    let next = match c {
                        b'"' => Some(State::ExpectString),
                        b'[' => Some(State::ExpectListClose),
                        b'{' => Some(State::ExpectObjClose),
                        b'0'..=b'9' | b'-' => Some(State::ExpectNumClose),
                        b'f' | b'F' | b't' | b'T' => Some(State::ExpectBoolClose),
                        b'n' => Some(State::ExpectNull),
                        _ => None,
                    };
                    if let Some(next) = next {
                        self.state = next;
                        self.value_start = i;
                        if next.in_container() {
                            self.nesting.start();
                        }
                    }
                    None
                }
                State::ExpectString if c == b'"' && !escaped(doc, i) => self.close(i),
                State::ExpectListClose if self.nesting.is_closed() && c == b']' => self.close(i),
                State::ExpectObjClose if self.nesting.is_closed() && c == b'}' => self.close(i),
                State::ExpectNumClose if !is_number_byte(c) => self.close(i - 1),
                State::ExpectBoolClose if c == b'e' || c == b'E' => self.close(i),
                State::ExpectNull if c == b'l' && escaped_by(doc, i, b'l') => self.close(i),
                _ => None,
            };

            if let Some(field) = closed {
                return Some(Token::Field(field));
            }
        }

        None
    }
}

/// Whether the byte before `i` equals `prev`.
#[inline]
pub(crate) fn escaped_by(doc: &[u8], i: usize, prev: u8) -> bool {
    i > 0 && doc[i - 1] == prev
}

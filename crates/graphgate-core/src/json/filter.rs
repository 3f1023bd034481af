//! Field filtering by key set.

use std::collections::HashSet;
use std::io::{self, Write};

use xxhash_rust::xxh64::xxh64;

use super::scanner::{first_significant, FieldScanner, Token};

/// Hash a key the way [`KeySet`] stores it.
#[inline]
pub fn hash_key(key: &[u8]) -> u64 {
    xxh64(key, 0)
}

/// A set of allowed keys, stored as 64-bit hashes.
///
/// Membership is decided by hash only; two distinct keys with the same
/// 64-bit hash are indistinguishable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    hashes: HashSet<u64>,
}

impl KeySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key.
    pub fn insert(&mut self, key: impl AsRef<[u8]>) {
        self.hashes.insert(hash_key(key.as_ref()));
    }

    /// Check whether a raw key is a member.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.hashes.contains(&hash_key(key))
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl<K: AsRef<[u8]>> FromIterator<K> for KeySet {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = KeySet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

impl<K: AsRef<[u8]>> Extend<K> for KeySet {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}

/// Write `doc` to `w` keeping only the first-level fields whose key is in
/// `keys`.
///
/// An object document produces an object; an array of objects produces an
/// array of filtered objects. Kept values are copied verbatim, except that
/// every tab and newline byte is dropped. A scalar document is copied
/// through with the same stripping.
pub fn filter<W: Write>(w: &mut W, doc: &[u8], keys: &KeySet) -> io::Result<()> {
    match first_significant(doc) {
        Some(b'{') | Some(b'[') => {}
        Some(_) => return write_stripped(w, doc),
        None => return Ok(()),
    }

    let mut is_list = false;
    let mut items = 0usize;
    let mut fields = 0usize;

    for token in FieldScanner::new(doc) {
        match token {
            Token::ListOpen(_) => {
                if !is_list {
                    w.write_all(b"[")?;
                    is_list = true;
                }
            }
            Token::ObjectOpen(_) => {
                if items == 0 {
                    w.write_all(b"{")?;
                } else {
                    w.write_all(b"},{")?;
                }
                items += 1;
                fields = 0;
            }
            Token::Field(field) => {
                if !keys.contains(field.key) {
                    continue;
                }
                if fields != 0 {
                    w.write_all(b",")?;
                }
                write_stripped(w, field.entry().slice(doc))?;
                fields += 1;
            }
        }
    }

    if items != 0 {
        w.write_all(b"}")?;
    }
    if is_list {
        w.write_all(b"]")?;
    }

    Ok(())
}

/// Copy `bytes`, dropping every tab and newline.
pub(crate) fn write_stripped<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    for part in bytes.split(|b| *b == b'\t' || *b == b'\n') {
        if !part.is_empty() {
            w.write_all(part)?;
        }
    }
    Ok(())
}

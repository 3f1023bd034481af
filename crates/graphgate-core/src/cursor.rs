//! Opaque pagination cursors.
//!
//! Cursor values leaving the engine are encrypted with AES-256-GCM and
//! encoded as:
//!
//! ```text
//! __gg-enc:<base64url( version(1) ‖ nonce(12) ‖ ciphertext+tag )>
//! ```
//!
//! The version byte is authenticated as associated data. Callers must treat
//! the token as opaque.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::prelude::*;
use rand::RngCore;
use thiserror::Error;

use crate::json::{self, Edit, KeySet};
use crate::statement::SelectionTree;

/// Prefix of encrypted cursor tokens.
pub const CURSOR_PREFIX: &str = "__gg-enc:";

const VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_CONTEXT: &str = "graphgate 2024-01-01 cursor encryption key";

/// Cursor encoding or decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// The token is not an encrypted cursor.
    #[error("invalid cursor format: {0}")]
    InvalidFormat(&'static str),

    /// The token was produced by an unknown envelope version.
    #[error("unsupported cursor version {0}")]
    UnsupportedVersion(u8),

    /// Authentication failed: the token was tampered with or encrypted
    /// under another key.
    #[error("cursor decryption failed")]
    Decrypt,

    #[error("cursor encryption failed")]
    Encrypt,
}

/// Encrypts outgoing cursors and decrypts incoming ones.
#[derive(Clone)]
pub struct CursorCodec {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorCodec").finish_non_exhaustive()
    }
}

impl CursorCodec {
    /// Create a codec from a raw 256-bit key.
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(&Key::<Aes256Gcm>::from(key)),
        }
    }

    /// Derive the key from a configured secret.
    pub fn from_secret(secret: &str) -> Self {
        Self::new(blake3::derive_key(KEY_CONTEXT, secret.as_bytes()))
    }

    /// Use a random key. Cursors do not survive a restart.
    pub fn random() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key)
    }

    /// Encrypt a cursor value into an opaque token.
    pub fn encrypt(&self, cursor: &str) -> Result<String, CursorError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: cursor.as_bytes(),
                    aad: &[VERSION],
                },
            )
            .map_err(|_| CursorError::Encrypt)?;

        let mut envelope = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        envelope.push(VERSION);
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", CURSOR_PREFIX, BASE64_URL_SAFE_NO_PAD.encode(envelope)))
    }

    /// Decrypt a token produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, token: &str) -> Result<String, CursorError> {
        let encoded = token
            .strip_prefix(CURSOR_PREFIX)
            .ok_or(CursorError::InvalidFormat("missing prefix"))?;
        let envelope = BASE64_URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CursorError::InvalidFormat("invalid base64"))?;

        if envelope.len() < 1 + NONCE_LEN + TAG_LEN {
            return Err(CursorError::InvalidFormat("too short"));
        }
        if envelope[0] != VERSION {
            return Err(CursorError::UnsupportedVersion(envelope[0]));
        }

        let (nonce, ciphertext) = envelope[1..].split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &envelope[..1],
                },
            )
            .map_err(|_| CursorError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CursorError::Decrypt)
    }

    /// Encrypt every `<name>_cursor` string in `doc` for the paginated nodes
    /// of `selection`. Empty cursors become `null`.
    pub fn encrypt_cursors(
        &self,
        doc: &[u8],
        selection: &SelectionTree,
    ) -> crate::error::Result<Vec<u8>> {
        let names: Vec<String> = selection
            .nodes()
            .iter()
            .filter_map(|n| n.cursor_field())
            .collect();
        if names.is_empty() || doc.is_empty() {
            return Ok(doc.to_vec());
        }
        let keys: KeySet = names.iter().collect();

        let mut edits = Vec::new();
        for field in json::get(doc, &keys) {
            let value = field.value.slice(doc);
            if value.first() != Some(&b'"') {
                continue;
            }
            let cursor: String = serde_json::from_slice(value)
                .map_err(|e| crate::Error::MalformedInput(format!("cursor value: {}", e)))?;
            let replacement = if cursor.is_empty() {
                b"null".to_vec()
            } else {
                let token = self.encrypt(&cursor)?;
                serde_json::to_vec(&token)
                    .map_err(|e| crate::Error::MalformedInput(e.to_string()))?
            };
            edits.push(Edit::new(field.value, replacement));
        }

        if edits.is_empty() {
            return Ok(doc.to_vec());
        }

        let mut out = Vec::with_capacity(doc.len() + edits.len() * 64);
        json::replace(&mut out, doc, edits)
            .map_err(|e| crate::Error::MalformedInput(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::SelectionNode;
    use serde_json::Value;

    #[test]
    fn test_round_trip() {
        let codec = CursorCodec::from_secret("secret");
        for cursor in ["a", "10:2024-01-01T00:00:00Z", "ünïcödé", "{\"id\":1}"] {
            let token = codec.encrypt(cursor).unwrap();
            assert!(token.starts_with(CURSOR_PREFIX));
            assert!(!token.contains(cursor));
            assert_eq!(codec.decrypt(&token).unwrap(), cursor);
        }
    }

    #[test]
    fn test_tokens_are_randomized() {
        let codec = CursorCodec::random();
        assert_ne!(codec.encrypt("x").unwrap(), codec.encrypt("x").unwrap());
    }

    #[test]
    fn test_tampered_token_fails() {
        let codec = CursorCodec::from_secret("secret");
        let token = codec.encrypt("page-2").unwrap();
        let mut envelope = BASE64_URL_SAFE_NO_PAD
            .decode(&token[CURSOR_PREFIX.len()..])
            .unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 1;
        let tampered = format!("{}{}", CURSOR_PREFIX, BASE64_URL_SAFE_NO_PAD.encode(&envelope));
        assert_eq!(codec.decrypt(&tampered), Err(CursorError::Decrypt));

        envelope[last] ^= 1;
        envelope[0] = 2;
        let versioned = format!("{}{}", CURSOR_PREFIX, BASE64_URL_SAFE_NO_PAD.encode(&envelope));
        assert_eq!(codec.decrypt(&versioned), Err(CursorError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_wrong_key_fails() {
        let token = CursorCodec::from_secret("a").encrypt("x").unwrap();
        assert_eq!(CursorCodec::from_secret("b").decrypt(&token), Err(CursorError::Decrypt));
    }

    #[test]
    fn test_invalid_formats() {
        let codec = CursorCodec::random();
        assert!(matches!(codec.decrypt("plain"), Err(CursorError::InvalidFormat(_))));
        assert!(matches!(codec.decrypt("__gg-enc:!!"), Err(CursorError::InvalidFormat(_))));
        assert!(matches!(codec.decrypt("__gg-enc:AQ"), Err(CursorError::InvalidFormat(_))));
    }

    #[test]
    fn test_encrypt_cursors_in_result() {
        let codec = CursorCodec::from_secret("secret");
        let selection = SelectionTree::new(vec![
            SelectionNode::root(0, "products", "products").with_cursor(),
            SelectionNode::child(1, 0, "reviews", "reviews").with_cursor(),
        ])
        .unwrap();
        let doc = br#"{"products":[{"id":1,"reviews":[],"reviews_cursor":""}],"products_cursor":"10"}"#;

        let out = codec.encrypt_cursors(doc, &selection).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();

        let token = value["products_cursor"].as_str().unwrap();
        assert_eq!(codec.decrypt(token).unwrap(), "10");
        assert_eq!(value["products"][0]["reviews_cursor"], Value::Null);
        assert_eq!(value["products"][0]["id"], 1);
    }

    #[test]
    fn test_encrypt_cursors_without_paginated_nodes() {
        let codec = CursorCodec::random();
        let selection = SelectionTree::new(vec![SelectionNode::root(0, "p", "p")]).unwrap();
        let doc = br#"{"p":{"p_cursor":"1"}}"#;
        assert_eq!(codec.encrypt_cursors(doc, &selection).unwrap(), doc.to_vec());
    }
}

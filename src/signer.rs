//! Self-verifying URL tokens.
//!
//! A token is `base64url(flag ++ digest ++ payload)` without padding. The
//! digest is the first 16 bytes of `SHA-256(url ++ secret)`; the payload is
//! the URL itself, raw-deflated when that makes it strictly smaller (flag 1)
//! and stored as-is otherwise (flag 0). Nothing is persisted: any holder of
//! the secret can check a token on its own.

use std::fmt;
use std::io::{Read, Write};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use crate::error::{Result, ScrapeError};

const DIGEST_LEN: usize = 16;
const FLAG_PLAIN: u8 = 0;
const FLAG_DEFLATE: u8 = 1;

/// Upper bound on an inflated URL.
const MAX_URL_BYTES: u64 = 64 * 1024;

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn digest(&self, url: &[u8]) -> [u8; DIGEST_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(url);
        hasher.update(&self.secret);
        let full = hasher.finalize();

        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&full[..DIGEST_LEN]);
        out
    }

    /// Turn `url` into an opaque token.
    #[must_use]
    pub fn sign(&self, url: &str) -> String {
        let raw = url.as_bytes();
        let (flag, payload) = match deflate(raw) {
            Some(packed) if packed.len() < raw.len() => (FLAG_DEFLATE, packed),
            _ => (FLAG_PLAIN, raw.to_vec()),
        };

        let mut token = Vec::with_capacity(1 + DIGEST_LEN + payload.len());
        token.push(flag);
        token.extend_from_slice(&self.digest(raw));
        token.extend_from_slice(&payload);
        URL_SAFE_NO_PAD.encode(token)
    }

    /// Recover the URL a token was made from.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::SignatureInvalid`] for anything this signer did
    /// not produce: bad encoding, short input, unknown flag, a payload that
    /// does not inflate, a digest mismatch or a URL that is not UTF-8.
    pub fn verify(&self, token: &str) -> Result<String> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| ScrapeError::SignatureInvalid)?;
        if bytes.len() < 1 + DIGEST_LEN {
            return Err(ScrapeError::SignatureInvalid);
        }

        let (digest, payload) = bytes[1..].split_at(DIGEST_LEN);
        let url = match bytes[0] {
            FLAG_PLAIN => payload.to_vec(),
            FLAG_DEFLATE => {
                let url = inflate(payload).ok_or(ScrapeError::SignatureInvalid)?;
                // Only the canonical encoding is accepted.
                if deflate(&url).as_deref() != Some(payload) {
                    return Err(ScrapeError::SignatureInvalid);
                }
                url
            }
            _ => return Err(ScrapeError::SignatureInvalid),
        };

        if !constant_time_eq(&self.digest(&url), digest) {
            return Err(ScrapeError::SignatureInvalid);
        }

        String::from_utf8(url).map_err(|_| ScrapeError::SignatureInvalid)
    }
}

fn deflate(raw: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(raw).ok()?;
    encoder.finish().ok()
}

fn inflate(payload: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    DeflateDecoder::new(payload)
        .take(MAX_URL_BYTES + 1)
        .read_to_end(&mut out)
        .ok()?;
    (out.len() as u64 <= MAX_URL_BYTES).then_some(out)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

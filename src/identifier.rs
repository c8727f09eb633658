//! Bech32-style author identifiers.
//!
//! Identifiers are `prefix` + `1` + data characters drawn from the bech32
//! alphabet. No checksum is verified: decoding unpacks 5-bit groups into bytes
//! and keeps the first 32, so trailing checksum characters are ignored.

use std::fmt;

use bech32::{
    primitives::iter::{ByteIterExt, Fe32IterExt},
    Fe32,
};

use crate::error::{DecodeError, EncodeError, InputError};

const SEPARATOR: char = '1';

/// Length in bytes of an author key.
pub const KEY_LEN: usize = 32;

/// Prefix used for public key identifiers.
pub const NPUB_PREFIX: &str = "npub";
/// Prefix used for TLV profile identifiers.
pub const NPROFILE_PREFIX: &str = "nprofile";

/// TLV entry type that holds the author key in `nprofile` payloads.
const TLV_SPECIAL: u8 = 0;

/// 32-byte author key decoded from an identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalAuthorKey([u8; KEY_LEN]);

impl CanonicalAuthorKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(hex_key: &str) -> Result<Self, EncodeError> {
        let bytes = hex::decode(hex_key).map_err(|e| EncodeError::InvalidHex(e.to_string()))?;
        let len = bytes.len();
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| EncodeError::InvalidLength(len))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Lowercase hex rendering used on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Shortened hex form for display, e.g. `3bf0c63f…459d`.
    pub fn short(&self) -> String {
        let hex = self.to_hex();
        format!("{}…{}", &hex[..8], &hex[hex.len() - 4..])
    }

    pub fn to_npub(&self) -> String {
        // Cannot fail: the key is always 32 bytes.
        encode(NPUB_PREFIX, &self.0).unwrap_or_default()
    }
}

impl fmt::Display for CanonicalAuthorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CanonicalAuthorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalAuthorKey({})", self.to_hex())
    }
}

/// Decode an identifier into its 32-byte key.
pub fn decode(text: &str) -> Result<CanonicalAuthorKey, DecodeError> {
    let bytes = decode_bytes(text)?;
    if bytes.len() < KEY_LEN {
        return Err(DecodeError::ShortPayload(bytes.len()));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes[..KEY_LEN]);
    Ok(CanonicalAuthorKey(key))
}

/// Unpack every data character of an identifier into bytes.
///
/// Leftover bits after the last full byte (padding or checksum) are dropped.
fn decode_bytes(text: &str) -> Result<Vec<u8>, DecodeError> {
    let sep = match text.rfind(SEPARATOR) {
        Some(idx) if idx > 0 => idx,
        _ => return Err(DecodeError::MissingSeparator),
    };
    let data = text[sep + SEPARATOR.len_utf8()..].to_lowercase();
    let fes = data
        .chars()
        .map(|c| Fe32::from_char(c).map_err(|_| DecodeError::InvalidCharacter(c)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(fes.into_iter().fes_to_bytes().collect())
}

/// Encode a 32-byte key as `prefix1<data>`, without a checksum.
pub fn encode(prefix: &str, key: &[u8]) -> Result<String, EncodeError> {
    if key.len() != KEY_LEN {
        return Err(EncodeError::InvalidLength(key.len()));
    }
    let mut out = String::with_capacity(prefix.len() + 1 + (key.len() * 8).div_ceil(5));
    out.push_str(prefix);
    out.push(SEPARATOR);
    out.extend(key.iter().copied().bytes_to_fes().map(Fe32::to_char));
    Ok(out)
}

/// Extract the key from an `nprofile` identifier's TLV payload.
fn decode_profile(text: &str) -> Result<CanonicalAuthorKey, DecodeError> {
    let bytes = decode_bytes(text)?;
    let mut rest = bytes.as_slice();
    while let [kind, len, tail @ ..] = rest {
        let len = *len as usize;
        if tail.len() < len {
            break;
        }
        let (value, next) = tail.split_at(len);
        if *kind == TLV_SPECIAL && len == KEY_LEN {
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(value);
            return Ok(CanonicalAuthorKey(key));
        }
        rest = next;
    }
    Err(DecodeError::MissingKey)
}

/// Accepted surface form of an author identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorIdentifier {
    /// `npub1…`
    Npub(String),
    /// `nprofile1…`
    Nprofile(String),
}

impl AuthorIdentifier {
    /// Normalize user input into a decodable identifier.
    ///
    /// Accepts `npub1…`, `nprofile1…`, the `nostr:` scheme in front of
    /// either, and `@`-containing aliases that embed one of them.
    pub fn parse(input: &str) -> Result<Self, InputError> {
        let mut trimmed = input.trim();
        while let Some(rest) = trimmed.strip_prefix("nostr:") {
            trimmed = rest.trim_start();
        }
        if trimmed.is_empty() {
            return Err(InputError::Empty);
        }
        if let Some(id) = Self::from_bare(trimmed) {
            return Ok(id);
        }
        if trimmed.contains('@') {
            // NIP-05 names need DNS/HTTP lookups; only embedded keys are usable.
            let embedded = trimmed
                .split(|c: char| c == '@' || c == '/' || c.is_whitespace())
                .find_map(Self::from_bare);
            if let Some(id) = embedded {
                return Ok(id);
            }
        }
        Err(InputError::Unsupported(trimmed.to_string()))
    }

    fn from_bare(token: &str) -> Option<Self> {
        let lower = token.to_ascii_lowercase();
        if lower.starts_with("nprofile1") {
            Some(Self::Nprofile(token.to_string()))
        } else if lower.starts_with("npub1") {
            Some(Self::Npub(token.to_string()))
        } else {
            None
        }
    }

    pub fn decode(&self) -> Result<CanonicalAuthorKey, DecodeError> {
        match self {
            Self::Npub(text) => decode(text),
            Self::Nprofile(text) => decode_profile(text),
        }
    }
}

//! Canonical serialization and SHA-256 content digests.
//!
//! Every manifest pushed to a registry is addressed by the digest of its
//! serialized bytes, and the registry echoes that digest back. Two
//! independently built manifests with the same content must therefore
//! serialize to exactly the same bytes. [`canonicalize`] guarantees this by
//! writing JSON with object keys sorted at every depth and no insignificant
//! whitespace, regardless of struct field order or the map implementation
//! `serde_json` was compiled with.
//!
//! # Example
//!
//! ```rust
//! use ocipack_core::digest::{canonicalize, digest};
//! use serde_json::json;
//!
//! let a = canonicalize(&json!({"b": 1, "a": [true, null]})).unwrap();
//! assert_eq!(a, br#"{"a":[true,null],"b":1}"#);
//!
//! let d = digest(b"{}");
//! assert_eq!(
//!     d.as_str(),
//!     "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
//! );
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::error::{Error, Result};

/// A `sha256:<hex>` content digest.
///
/// The inner string is always the algorithm prefix followed by 64 lowercase
/// hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    /// The only supported digest algorithm.
    pub const ALGORITHM: &'static str = "sha256";

    const HEX_LEN: usize = 64;

    /// Computes the digest of raw bytes.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(bytes);
        hasher.finish()
    }

    /// Parses a `sha256:<hex>` digest string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDigest`] if the algorithm is not sha256 or the
    /// hex part is not 64 lowercase hex characters.
    pub fn parse(input: &str) -> Result<Self> {
        let (algorithm, hex_part) = input.split_once(':').ok_or_else(|| Error::InvalidDigest {
            digest: input.to_string(),
            reason: "missing algorithm prefix".to_string(),
        })?;

        if algorithm != Self::ALGORITHM {
            return Err(Error::InvalidDigest {
                digest: input.to_string(),
                reason: format!("unsupported algorithm '{algorithm}'"),
            });
        }

        Self::from_hex(hex_part).map_err(|_| Error::InvalidDigest {
            digest: input.to_string(),
            reason: format!("expected {} lowercase hex characters", Self::HEX_LEN),
        })
    }

    /// Builds a digest from a bare hex string, as reported by staging tools.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDigest`] if `hex_part` is not 64 lowercase hex
    /// characters.
    pub fn from_hex(hex_part: &str) -> Result<Self> {
        let valid = hex_part.len() == Self::HEX_LEN
            && hex_part
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        if !valid {
            return Err(Error::InvalidDigest {
                digest: hex_part.to_string(),
                reason: format!("expected {} lowercase hex characters", Self::HEX_LEN),
            });
        }

        Ok(Self(format!("{}:{hex_part}", Self::ALGORITHM)))
    }

    /// Returns the full `sha256:<hex>` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the algorithm prefix.
    #[must_use]
    pub const fn algorithm(&self) -> &'static str {
        Self::ALGORITHM
    }

    /// Returns the hex part without the algorithm prefix.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.0[Self::ALGORITHM.len() + 1..]
    }

    /// Returns the tag under which referrers of this digest are published.
    ///
    /// The colon is replaced with a hyphen since colons are not valid in tags.
    ///
    /// ```rust
    /// use ocipack_core::Digest;
    ///
    /// let d = Digest::of(b"{}");
    /// assert_eq!(d.referrer_tag(), format!("sha256-{}", d.hex()));
    /// ```
    #[must_use]
    pub fn referrer_tag(&self) -> String {
        format!("{}-{}", Self::ALGORITHM, self.hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental digest over content read in chunks.
///
/// Also counts the bytes it has seen, so a staged file can be described
/// without holding it in memory.
#[derive(Clone, Default)]
pub struct Hasher {
    inner: Sha256,
    size: u64,
}

impl Hasher {
    /// Creates an empty hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.size += size_in_bytes(chunk);
    }

    /// Number of bytes fed so far.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Finishes hashing and returns the digest.
    #[must_use]
    pub fn finish(self) -> Digest {
        Digest(format!(
            "{}:{}",
            Digest::ALGORITHM,
            hex::encode(self.inner.finalize())
        ))
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher").field("size", &self.size).finish_non_exhaustive()
    }
}

/// Computes the `sha256:<hex>` digest of raw bytes.
#[must_use]
pub fn digest(bytes: &[u8]) -> Digest {
    Digest::of(bytes)
}

/// Returns the exact length of a payload, as recorded in descriptors.
#[must_use]
pub const fn size_in_bytes(bytes: &[u8]) -> u64 {
    bytes.len() as u64
}

/// Serializes a value to canonical JSON bytes.
///
/// Object keys are sorted by their UTF-8 bytes at every depth, no whitespace
/// is emitted, and strings use `serde_json`'s escaping.
///
/// # Errors
///
/// Returns an error only if the value cannot be represented as JSON
/// (e.g. a map with non-string keys).
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    let mut out = Vec::with_capacity(512);
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(item, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

//! Content identity engine.
//!
//! Per-file identity is SHA-512 over the netstring framing
//! `{len}:` + bytes + `;{len}`, which separates `"ab" + "c"` from
//! `"a" + "bc"` and the empty file from the absent file. The aggregate
//! identity of a file set feeds each entry's framed path followed by its
//! framed per-file id into one SHA-512, in sorted path order, so it is
//! order- and platform-independent yet sensitive to any byte or path
//! change. It is also computable from a manifest alone, without the file
//! bytes.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::{Error, Result};

const READ_BLOCK_SIZE: usize = 1024 * 1024;

/// SHA-512 content identity, 128 lowercase hex chars.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    pub fn from_hex(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.len() != 128 || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(Error::InvalidName {
                raw: s,
                reason: "content id must be 128 lowercase hex chars".into(),
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `prefix` is a leading fragment of the hex form.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(prefix)
    }

    fn from_digest(hasher: Sha512) -> Self {
        Self(format!("{:x}", hasher.finalize()))
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({}..)", &self.0[..12])
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContentId {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> {
        ContentId::from_hex(s)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> String {
        id.0
    }
}

fn frame_prefix(hasher: &mut Sha512, len: u64) {
    hasher.update(format!("{}:", len).as_bytes());
}

fn frame_suffix(hasher: &mut Sha512, len: u64) {
    hasher.update(format!(";{}", len).as_bytes());
}

/// Identity of an in-memory byte string.
pub fn hash_bytes(bytes: &[u8]) -> ContentId {
    let mut hasher = Sha512::new();
    frame_prefix(&mut hasher, bytes.len() as u64);
    hasher.update(bytes);
    frame_suffix(&mut hasher, bytes.len() as u64);
    ContentId::from_digest(hasher)
}

/// Identity of a stream whose length is known up front.
///
/// The declared length is part of the framing, so a stream that yields a
/// different number of bytes (a file modified mid-read, a truncated
/// container entry) fails with `ContentMismatch` rather than producing an
/// id for bytes nobody declared.
pub fn hash_reader(mut reader: impl Read, declared_len: u64, what: &str) -> Result<ContentId> {
    let mut hasher = Sha512::new();
    frame_prefix(&mut hasher, declared_len);

    let mut buffer = vec![0u8; READ_BLOCK_SIZE];
    let mut seen = 0u64;
    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| Error::io(format!("hashing {}", what), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        seen += n as u64;
        if seen > declared_len {
            break;
        }
    }
    if seen != declared_len {
        return Err(Error::ContentMismatch {
            what: what.to_string(),
            reason: format!("declared {} bytes, read {}", declared_len, seen),
        });
    }

    frame_suffix(&mut hasher, declared_len);
    Ok(ContentId::from_digest(hasher))
}

/// Identity of a file on disk, streamed in 1 MiB blocks.
pub fn hash_file(path: &Path) -> Result<ContentId> {
    let file = File::open(path).map_err(|e| Error::io_at("opening", path, e))?;
    let len = file
        .metadata()
        .map_err(|e| Error::io_at("inspecting", path, e))?
        .len();
    hash_reader(BufReader::new(file), len, &path.display().to_string())
}

/// Aggregate identity of a set of `(normalized path, per-file id)` pairs.
///
/// Paths must already use `/` separators. Input order is irrelevant;
/// duplicate paths are an error.
pub fn aggregate_id(entries: &[(String, ContentId)]) -> Result<ContentId> {
    let mut sorted: Vec<&(String, ContentId)> = entries.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    for pair in sorted.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(Error::AlreadyExists(format!(
                "duplicate path in file set: {}",
                pair[0].0
            )));
        }
    }

    let mut hasher = Sha512::new();
    for (path, id) in sorted {
        frame_prefix(&mut hasher, path.len() as u64);
        hasher.update(path.as_bytes());
        frame_suffix(&mut hasher, path.len() as u64);
        frame_prefix(&mut hasher, id.as_str().len() as u64);
        hasher.update(id.as_str().as_bytes());
        frame_suffix(&mut hasher, id.as_str().len() as u64);
    }
    Ok(ContentId::from_digest(hasher))
}

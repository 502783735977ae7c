//! Validated name newtypes.
//!
//! BeadName: the human name of a bead lineage, also the stem of archive
//! filenames and workspace directories.
//! InputNick: the local alias an input is mounted under in a workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of a bead lineage - a safe single path component.
///
/// Doubles as the archive filename stem, where a single `_` separates the
/// name from the freeze timestamp; `__` is therefore reserved.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BeadName(String);

impl BeadName {
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if let Some(reason) = component_problem(&s) {
            return Err(Error::InvalidName {
                raw: s,
                reason: reason.into(),
            });
        }
        if s.contains("__") {
            return Err(Error::InvalidName {
                raw: s,
                reason: "double underscore is reserved".into(),
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BeadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BeadName({:?})", self.0)
    }
}

impl fmt::Display for BeadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for BeadName {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> {
        BeadName::parse(s)
    }
}

impl From<BeadName> for String {
    fn from(n: BeadName) -> String {
        n.0
    }
}

/// Local alias for a workspace input - the directory name under `input/`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InputNick(String);

impl InputNick {
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if let Some(reason) = component_problem(&s) {
            return Err(Error::InvalidName {
                raw: s,
                reason: reason.into(),
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for InputNick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputNick({:?})", self.0)
    }
}

impl fmt::Display for InputNick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for InputNick {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> {
        InputNick::parse(s)
    }
}

impl From<InputNick> for String {
    fn from(n: InputNick) -> String {
        n.0
    }
}

/// Why `s` is unusable as a single path component, if it is.
fn component_problem(s: &str) -> Option<&'static str> {
    if s.is_empty() {
        Some("empty")
    } else if s == "." || s == ".." {
        Some("reserved directory name")
    } else if s.contains('/') || s.contains('\\') {
        Some("contains a path separator")
    } else if s.contains('\0') {
        Some("contains NUL")
    } else {
        None
    }
}

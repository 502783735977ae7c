//! Bead metadata: kinds, input specs, and the persisted `BeadMeta` record.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content_id::ContentId;
use super::name::{BeadName, InputNick};
use super::timestamp::FreezeTime;
use crate::error::{Error, Result};

/// Format version of the persisted metadata. Archives carrying any other
/// value are rejected as invalid containers rather than misread.
pub const META_VERSION: &str = "aaa947a6-1f7a-11e6-ba3a-0021cc73492e";

/// Lineage identity of a computation, shared by every bead frozen from the
/// same workspace line regardless of renames.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Kind(String);

impl Kind {
    /// Mint a fresh lineage identity for a brand-new workspace.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let uuid = Uuid::parse_str(&s).map_err(|e| Error::InvalidName {
            raw: s.clone(),
            reason: format!("kind must be a UUID: {}", e),
        })?;
        Ok(Self(uuid.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({})", self.0)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Kind {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> {
        Kind::parse(s)
    }
}

impl From<Kind> for String {
    fn from(k: Kind) -> String {
        k.0
    }
}

/// Pinned description of one input dependency: which lineage, which exact
/// content, frozen when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub kind: Kind,
    pub content_id: ContentId,
    pub freeze_time: FreezeTime,
}

/// The persisted metadata of a bead.
///
/// `freeze_time` and `freeze_name` are both present (frozen archive) or
/// both absent (live workspace); [`BeadMeta::validate`] enforces this and
/// the version gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeadMeta {
    pub meta_version: String,
    pub kind: Kind,
    pub inputs: BTreeMap<InputNick, InputSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeze_time: Option<FreezeTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeze_name: Option<BeadName>,
}

impl BeadMeta {
    pub fn new_workspace(kind: Kind) -> Self {
        Self {
            meta_version: META_VERSION.to_string(),
            kind,
            inputs: BTreeMap::new(),
            freeze_time: None,
            freeze_name: None,
        }
    }

    /// Derive the frozen form of this metadata at `freeze_time` under
    /// `freeze_name`, inputs carried over unchanged.
    pub fn frozen_as(&self, name: BeadName, freeze_time: FreezeTime) -> Self {
        Self {
            meta_version: META_VERSION.to_string(),
            kind: self.kind.clone(),
            inputs: self.inputs.clone(),
            freeze_time: Some(freeze_time),
            freeze_name: Some(name),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.meta_version != META_VERSION {
            return Err(Error::InvalidContainer(format!(
                "unrecognized meta version {}",
                self.meta_version
            )));
        }
        if self.freeze_time.is_some() != self.freeze_name.is_some() {
            return Err(Error::InvalidContainer(
                "freeze_time and freeze_name must be present together".into(),
            ));
        }
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.freeze_time.is_some()
    }

    pub fn has_input(&self, nick: &InputNick) -> bool {
        self.inputs.contains_key(nick)
    }
}

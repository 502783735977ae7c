//! The common capability surface of the two bead states.
//!
//! An [`Archive`](super::archive::Archive) is a frozen bead, a
//! [`Workspace`](super::workspace::Workspace) is a live one; both answer
//! the same questions about identity and dependencies. Accessors are
//! fallible because an archive parses its metadata on first use.

use super::content_id::ContentId;
use super::meta::{BeadMeta, InputSpec, Kind};
use super::name::InputNick;
use crate::error::Result;

pub trait Bead {
    /// The full metadata record.
    fn metadata(&self) -> Result<BeadMeta>;

    /// Aggregate content identity of the bead's code and data.
    fn content_id(&self) -> Result<ContentId>;

    fn kind(&self) -> Result<Kind> {
        Ok(self.metadata()?.kind)
    }

    fn input(&self, nick: &InputNick) -> Result<Option<InputSpec>> {
        Ok(self.metadata()?.inputs.get(nick).cloned())
    }

    fn has_input(&self, nick: &InputNick) -> Result<bool> {
        Ok(self.metadata()?.has_input(nick))
    }
}

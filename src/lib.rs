//! Content-addressed storage for frozen computations.
//!
//! A *bead* is an immutable archive of one computation of the form
//! `output = code(*inputs)`: source files, output files, and references to
//! the beads the computation consumed. A *workspace* is the mutable staging
//! directory used to produce the next bead. *Boxes* are directories holding
//! archived beads, searched as one unit through a [`Registry`].

#![forbid(unsafe_code)]

pub mod core;
pub mod error;
mod fsutil;

pub use error::{Error, Result};

// Re-export core types at crate root for convenience
pub use crate::core::{
    Archive, Bead, BeadBox, BeadMeta, BeadName, ContentId, FreezeTime, InputNick, InputSpec,
    InputStatus, Kind, Registry, TimeMatch, TimeSelector, UpdateSelector, Workspace,
    MIN_CONTENT_ID_PREFIX,
};

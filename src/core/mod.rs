//! Domain model: names, timestamps, content identity, metadata, and the
//! three bead states (archive, workspace, box).

pub mod archive;
pub mod bead;
pub mod box_store;
pub mod content_id;
pub mod json_canon;
pub(crate) mod lazy;
pub mod meta;
pub mod name;
pub mod timestamp;
pub mod workspace;

pub use archive::Archive;
pub use bead::Bead;
pub use box_store::{BeadBox, Registry, TimeMatch, TimeSelector, MIN_CONTENT_ID_PREFIX};
pub use content_id::ContentId;
pub use meta::{BeadMeta, InputSpec, Kind};
pub use name::{BeadName, InputNick};
pub use timestamp::FreezeTime;
pub use workspace::{InputStatus, UpdateSelector, Workspace};

//! Boxes and the registry.
//!
//! A box is a plain directory holding bead containers; nothing else is
//! stored there, and foreign files are tolerated. The registry is the
//! ordered set of boxes a user works against; searches treat them as one
//! unit.

use std::path::{Path, PathBuf};

use tracing::warn;

use super::archive::{self, Archive};
use super::bead::Bead;
use super::content_id::ContentId;
use super::meta::Kind;
use super::name::BeadName;
use super::timestamp::FreezeTime;
use super::workspace::Workspace;
use crate::error::{Error, Result};

/// Version selection applied after a reference has been narrowed to one
/// bead lineage.
#[derive(Debug, Clone)]
pub enum TimeSelector {
    /// Exact freeze time.
    At(FreezeTime),
    /// Greatest freeze time; content id breaks ties.
    Latest,
    /// Most recently arrived container (by file modification time). Can
    /// disagree with `Latest` when an old archive is copied into a box
    /// late, or under clock skew between producers.
    Newest,
    /// One step forward from the given version in `(freeze_time,
    /// content_id)` order.
    Next(FreezeTime, ContentId),
    /// One step back from the given version.
    Prev(FreezeTime, ContentId),
}

/// Time-window predicate for box searches.
#[derive(Debug, Clone)]
pub enum TimeMatch {
    NewerThan(FreezeTime),
    OlderThan(FreezeTime),
    AtOrNewer(FreezeTime),
    AtOrOlder(FreezeTime),
}

impl TimeMatch {
    pub fn matches(&self, t: &FreezeTime) -> bool {
        match self {
            TimeMatch::NewerThan(bound) => t > bound,
            TimeMatch::OlderThan(bound) => t < bound,
            TimeMatch::AtOrNewer(bound) => t >= bound,
            TimeMatch::AtOrOlder(bound) => t <= bound,
        }
    }
}

/// Shortest content id prefix the registry will search for. Shorter hex
/// strings are far more likely to be stray names than id fragments.
pub const MIN_CONTENT_ID_PREFIX: usize = 8;

fn is_content_id_prefix(raw: &str) -> bool {
    raw.len() >= MIN_CONTENT_ID_PREFIX
        && raw
            .bytes()
            .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// A named directory of bead containers.
#[derive(Debug, Clone)]
pub struct BeadBox {
    name: String,
    location: PathBuf,
}

impl BeadBox {
    pub fn new(name: impl Into<String>, location: impl Into<PathBuf>) -> Result<Self> {
        let name = name.into();
        let location = location.into();
        if name.is_empty() {
            return Err(Error::InvalidName {
                raw: name,
                reason: "box name must be non-empty".into(),
            });
        }
        if !location.is_dir() {
            return Err(Error::NotFound(format!(
                "box directory {}",
                location.display()
            )));
        }
        Ok(Self { name, location })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// All bead containers in the box. Foreign and malformed files are
    /// skipped with a warning.
    pub fn archives(&self) -> Result<Vec<Archive>> {
        archive::scan_dir(&self.location)
    }

    /// All versions of one lineage, by filename alone.
    pub fn find_by_name(&self, name: &BeadName) -> Result<Vec<Archive>> {
        Ok(self
            .archives()?
            .into_iter()
            .filter(|a| a.name() == name)
            .collect())
    }

    /// Versions of one lineage within a freeze-time window.
    pub fn find_in_window(&self, name: &BeadName, window: &TimeMatch) -> Result<Vec<Archive>> {
        Ok(self
            .find_by_name(name)?
            .into_iter()
            .filter(|a| window.matches(a.freeze_time()))
            .collect())
    }

    /// Freeze `workspace` into this box.
    pub fn store(&self, workspace: &Workspace) -> Result<Archive> {
        workspace.freeze_into(&self.location)
    }
}

/// The ordered collection of boxes a user works against.
#[derive(Debug, Default)]
pub struct Registry {
    boxes: Vec<BeadBox>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_box(&mut self, bead_box: BeadBox) -> Result<()> {
        if self.boxes.iter().any(|b| b.name == bead_box.name) {
            return Err(Error::AlreadyExists(format!("box {}", bead_box.name)));
        }
        self.boxes.push(bead_box);
        Ok(())
    }

    pub fn remove_box(&mut self, name: &str) -> Result<BeadBox> {
        let idx = self
            .boxes
            .iter()
            .position(|b| b.name == name)
            .ok_or_else(|| Error::NotFound(format!("box {}", name)))?;
        Ok(self.boxes.remove(idx))
    }

    pub fn boxes(&self) -> &[BeadBox] {
        &self.boxes
    }

    pub fn get_box(&self, name: &str) -> Option<&BeadBox> {
        self.boxes.iter().find(|b| b.name == name)
    }

    /// The implicit save destination, defined only when exactly one box
    /// is registered.
    pub fn default_box(&self) -> Result<&BeadBox> {
        match self.boxes.as_slice() {
            [] => Err(Error::NotFound("no boxes registered".into())),
            [only] => Ok(only),
            _ => Err(Error::AmbiguousReference(
                "multiple boxes registered, name one".into(),
            )),
        }
    }

    /// The box `save` targets: the named one, or [`Registry::default_box`].
    pub fn save_target(&self, box_name: Option<&str>) -> Result<&BeadBox> {
        match box_name {
            Some(name) => self
                .get_box(name)
                .ok_or_else(|| Error::NotFound(format!("box {}", name))),
            None => self.default_box(),
        }
    }

    /// Every archive across all boxes. A box that cannot be listed is
    /// skipped with a warning rather than failing the whole search.
    fn all_archives(&self) -> Vec<Archive> {
        let mut archives = Vec::new();
        for bead_box in &self.boxes {
            match bead_box.archives() {
                Ok(mut found) => archives.append(&mut found),
                Err(e) => {
                    warn!(box_name = %bead_box.name, error = %e, "skipping unreadable box");
                }
            }
        }
        archives
    }

    /// All versions of one lineage across all boxes, each paired with the
    /// box holding it. Filename matching only; no archive is opened.
    pub fn find_by_name(&self, name: &BeadName) -> Vec<(&BeadBox, Archive)> {
        let mut matches = Vec::new();
        for bead_box in &self.boxes {
            match bead_box.find_by_name(name) {
                Ok(found) => matches.extend(found.into_iter().map(|a| (bead_box, a))),
                Err(e) => {
                    warn!(box_name = %bead_box.name, error = %e, "skipping unreadable box");
                }
            }
        }
        matches
    }

    /// Every archive of the given lineage kind, anywhere. This opens each
    /// container's metadata, so it is the slow path; unreadable archives
    /// are skipped with a warning.
    pub fn find_by_kind(&self, kind: &Kind) -> Vec<Archive> {
        let mut matches = Vec::new();
        for archive in self.all_archives() {
            match archive.kind() {
                Ok(found) if &found == kind => matches.push(archive),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %archive.path().display(), error = %e, "skipping unreadable archive")
                }
            }
        }
        matches
    }

    /// Every archive whose aggregate content id starts with `prefix`.
    ///
    /// The prefix must be at least [`MIN_CONTENT_ID_PREFIX`] lowercase hex
    /// characters; anything shorter or with other characters matches
    /// nothing, so a stray short string cannot fan out across the whole
    /// registry. Opens each container's metadata, like
    /// [`Registry::find_by_kind`].
    pub fn find_by_content_id_prefix(&self, prefix: &str) -> Vec<Archive> {
        if !is_content_id_prefix(prefix) {
            return Vec::new();
        }
        let mut matches = Vec::new();
        for archive in self.all_archives() {
            match archive.content_id() {
                Ok(id) if id.matches_prefix(prefix) => matches.push(archive),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %archive.path().display(), error = %e, "skipping unreadable archive")
                }
            }
        }
        matches
    }

    /// The archive carrying exactly this aggregate content id.
    pub fn find_by_content_id(&self, id: &ContentId) -> Result<Archive> {
        for archive in self.all_archives() {
            match archive.content_id() {
                Ok(found) if &found == id => return Ok(archive),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %archive.path().display(), error = %e, "skipping unreadable archive")
                }
            }
        }
        Err(Error::NotFound(format!("content id {:?}", id)))
    }

    /// Is there a version of `name` frozen after `after` anywhere?
    pub fn has_newer(&self, name: &BeadName, after: &FreezeTime) -> Result<bool> {
        let window = TimeMatch::NewerThan(after.clone());
        for bead_box in &self.boxes {
            if !bead_box.find_in_window(name, &window)?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Resolve a raw reference to a single archive.
    ///
    /// `raw` may be a bead name, a kind, or a content id prefix; matches
    /// are unioned across all boxes. More than one distinct bead name
    /// among the matches is ambiguous; the time selector then picks the
    /// version within the one surviving lineage.
    pub fn resolve_ref(&self, raw: &str, selector: &TimeSelector) -> Result<Archive> {
        let candidates = self.candidates(raw);
        if candidates.is_empty() {
            return Err(Error::NotFound(format!("bead {}", raw)));
        }
        let mut names: Vec<&BeadName> = candidates.iter().map(|a| a.name()).collect();
        names.sort();
        names.dedup();
        if names.len() > 1 {
            return Err(Error::AmbiguousReference(format!(
                "{} matches {} different beads",
                raw,
                names.len()
            )));
        }
        self.select(candidates, selector)
            .ok_or_else(|| Error::NotFound(format!("no version of {} for {:?}", raw, selector)))
    }

    /// Union of the three public searches, deduplicated by container path.
    fn candidates(&self, raw: &str) -> Vec<Archive> {
        let mut matched: Vec<Archive> = match BeadName::parse(raw) {
            Ok(name) => self.find_by_name(&name).into_iter().map(|(_, a)| a).collect(),
            Err(_) => Vec::new(),
        };
        let mut merge = |found: Vec<Archive>| {
            for archive in found {
                if !matched.iter().any(|m| m.path() == archive.path()) {
                    matched.push(archive);
                }
            }
        };
        if let Ok(kind) = Kind::parse(raw) {
            merge(self.find_by_kind(&kind));
        }
        merge(self.find_by_content_id_prefix(raw));
        matched
    }

    fn select(&self, candidates: Vec<Archive>, selector: &TimeSelector) -> Option<Archive> {
        // Pair each candidate with its (freeze_time, content_id) key;
        // candidates whose metadata cannot be read drop out here.
        let mut keyed: Vec<(FreezeTime, ContentId, Archive)> = Vec::new();
        for archive in candidates {
            match archive.content_id() {
                Ok(id) => keyed.push((archive.freeze_time().clone(), id, archive)),
                Err(e) => {
                    warn!(path = %archive.path().display(), error = %e, "skipping unreadable archive")
                }
            }
        }

        match selector {
            TimeSelector::At(t) => keyed
                .into_iter()
                .filter(|(time, _, _)| time == t)
                .max_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)))
                .map(|(_, _, a)| a),
            TimeSelector::Latest => keyed
                .into_iter()
                .max_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)))
                .map(|(_, _, a)| a),
            TimeSelector::Newest => {
                // Arrival order needs a readable mtime; an archive without
                // one is skipped, not silently sorted oldest.
                let mut by_arrival: Vec<(u64, Archive)> = Vec::new();
                for (_, _, archive) in keyed {
                    match archive.modified_ms() {
                        Ok(ms) => by_arrival.push((ms, archive)),
                        Err(e) => {
                            warn!(path = %archive.path().display(), error = %e, "skipping unreadable archive")
                        }
                    }
                }
                by_arrival
                    .into_iter()
                    .max_by_key(|(ms, _)| *ms)
                    .map(|(_, a)| a)
            }
            TimeSelector::Next(t, id) => keyed
                .into_iter()
                .filter(|(time, cid, _)| (time, cid) > (t, id))
                .min_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)))
                .map(|(_, _, a)| a),
            TimeSelector::Prev(t, id) => keyed
                .into_iter()
                .filter(|(time, cid, _)| (time, cid) < (t, id))
                .max_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)))
                .map(|(_, _, a)| a),
        }
    }
}

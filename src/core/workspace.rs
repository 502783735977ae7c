//! Live beads: mutable staging directories.
//!
//! A workspace is where the next bead is produced. Input beads are mounted
//! read-only under `input/<nick>`, computation output goes to `output/`,
//! and `.bead-meta/` holds the live metadata. Whether an input is loaded
//! is never tracked separately: the filesystem is the state, an input is
//! loaded exactly when its slot directory exists.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::archive::{Archive, InputMap};
use super::bead::Bead;
use super::box_store::{Registry, TimeSelector};
use super::content_id::{self, ContentId};
use super::meta::{BeadMeta, InputSpec, Kind};
use super::name::{BeadName, InputNick};
use super::timestamp::FreezeTime;
use crate::error::{Error, Result};
use crate::fsutil;

pub mod layout {
    pub const INPUT: &str = "input";
    pub const OUTPUT: &str = "output";
    pub const TEMP: &str = "temp";
    pub const META_DIR: &str = ".bead-meta";
    pub const BEAD_META: &str = ".bead-meta/bead";
    pub const INPUT_MAP: &str = ".bead-meta/input.map";
}

/// Version selection for [`Workspace::update_input`], anchored at the
/// input's currently recorded version where relevant.
#[derive(Debug, Clone)]
pub enum UpdateSelector {
    Latest,
    Newest,
    At(FreezeTime),
    Next,
    Prev,
}

/// One row of [`Workspace::status`].
#[derive(Debug)]
pub struct InputStatus {
    pub nick: InputNick,
    pub loaded: bool,
    pub tracked_name: Option<BeadName>,
    /// The pinned version is still available in some registered box.
    pub pinned_present: bool,
    /// A newer version of the tracked bead name exists.
    pub stale: bool,
}

/// A mutable staging directory for producing the next bead.
#[derive(Debug)]
pub struct Workspace {
    directory: PathBuf,
    meta: BeadMeta,
    input_map: InputMap,
}

impl Workspace {
    /// Create a fresh workspace at `directory`. A missing `kind` means a
    /// brand-new computation lineage.
    pub fn initialize(directory: impl Into<PathBuf>, kind: Option<Kind>) -> Result<Self> {
        let directory = directory.into();
        if directory.exists() {
            return Err(Error::AlreadyExists(format!(
                "{} already exists",
                directory.display()
            )));
        }
        workspace_name(&directory)?;

        fs::create_dir_all(&directory).map_err(|e| Error::io_at("creating", &directory, e))?;
        for sub in [layout::INPUT, layout::OUTPUT, layout::TEMP, layout::META_DIR] {
            let path = directory.join(sub);
            fs::create_dir(&path).map_err(|e| Error::io_at("creating", &path, e))?;
        }

        let meta = BeadMeta::new_workspace(kind.unwrap_or_else(Kind::generate));
        let workspace = Self {
            directory,
            meta,
            input_map: InputMap::new(),
        };
        workspace.save_meta()?;
        workspace.save_input_map()?;
        info!(workspace = %workspace.directory.display(), kind = %workspace.meta.kind, "workspace initialized");
        Ok(workspace)
    }

    /// Open an existing workspace directory.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        if !Self::is_valid(&directory) {
            return Err(Error::InvalidContainer(format!(
                "{} is not a workspace",
                directory.display()
            )));
        }
        let meta: BeadMeta = fsutil::read_json(&directory.join(layout::BEAD_META))?;
        meta.validate()?;
        if meta.is_frozen() {
            return Err(Error::InvalidContainer(format!(
                "{} carries frozen metadata",
                directory.display()
            )));
        }
        let map_path = directory.join(layout::INPUT_MAP);
        let input_map = if map_path.is_file() {
            fsutil::read_json(&map_path)?
        } else {
            InputMap::new()
        };
        Ok(Self {
            directory,
            meta,
            input_map,
        })
    }

    /// Reconstruct a workspace from a frozen bead: the archive's code tree
    /// becomes the working tree, its kind and inputs are adopted, all
    /// inputs start out unloaded.
    pub fn from_archive(archive: &Archive, directory: impl Into<PathBuf>) -> Result<Self> {
        let meta = archive.metadata()?;
        let mut workspace = Self::initialize(directory, Some(meta.kind.clone()))?;
        archive.unpack_code_to(&workspace.directory)?;
        workspace.meta.inputs = meta.inputs;
        workspace.input_map = archive.input_map()?.clone();
        workspace.save_meta()?;
        workspace.save_input_map()?;
        Ok(workspace)
    }

    pub fn is_valid(directory: &Path) -> bool {
        directory.join(layout::INPUT).is_dir()
            && directory.join(layout::OUTPUT).is_dir()
            && directory.join(layout::TEMP).is_dir()
            && directory.join(layout::BEAD_META).is_file()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The bead name this workspace freezes under: its directory name.
    pub fn name(&self) -> Result<BeadName> {
        workspace_name(&self.directory)
    }

    pub fn kind(&self) -> &Kind {
        &self.meta.kind
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&InputNick, &InputSpec)> {
        self.meta.inputs.iter()
    }

    pub fn is_loaded(&self, nick: &InputNick) -> bool {
        self.input_slot(nick).is_dir()
    }

    /// The bead name searched when updating `nick`: the recorded mapping,
    /// or the nick itself when it happens to be a valid bead name.
    pub fn tracked_name(&self, nick: &InputNick) -> Option<BeadName> {
        self.input_map
            .get(nick)
            .cloned()
            .or_else(|| BeadName::parse(nick.as_str()).ok())
    }

    fn input_slot(&self, nick: &InputNick) -> PathBuf {
        self.directory.join(layout::INPUT).join(nick.as_str())
    }

    /// Record a new dependency under `nick` and load it.
    pub fn add_input(
        &mut self,
        registry: &Registry,
        nick: InputNick,
        raw_ref: &str,
        selector: &TimeSelector,
    ) -> Result<()> {
        if self.meta.has_input(&nick) {
            return Err(Error::AlreadyExists(format!("input {}", nick)));
        }
        let archive = registry.resolve_ref(raw_ref, selector)?;
        let spec = InputSpec {
            kind: archive.kind()?,
            content_id: archive.content_id()?,
            freeze_time: archive.freeze_time().clone(),
        };
        self.meta.inputs.insert(nick.clone(), spec);
        self.input_map.insert(nick.clone(), archive.name().clone());
        self.save_meta()?;
        self.save_input_map()?;
        self.load_from(&nick, &archive)
    }

    /// Materialize a recorded input into its slot.
    pub fn load_input(&mut self, registry: &Registry, nick: &InputNick) -> Result<()> {
        let spec = self
            .meta
            .inputs
            .get(nick)
            .ok_or_else(|| Error::NotFound(format!("input {}", nick)))?
            .clone();
        if self.is_loaded(nick) {
            debug!(nick = %nick, "input already loaded");
            return Ok(());
        }
        let archive = registry.find_by_content_id(&spec.content_id)?;
        self.load_from(nick, &archive)
    }

    /// Extract into a staging directory, verify every file against the
    /// manifest, then move the staging directory into the slot. The slot
    /// either appears complete and verified or not at all.
    fn load_from(&mut self, nick: &InputNick, archive: &Archive) -> Result<()> {
        let spec = self
            .meta
            .inputs
            .get(nick)
            .ok_or_else(|| Error::NotFound(format!("input {}", nick)))?;
        let archive_id = archive.content_id()?;
        if archive_id != spec.content_id {
            return Err(Error::ContentMismatch {
                what: format!("input {}", nick),
                reason: "archive does not carry the pinned content".into(),
            });
        }
        if self.is_loaded(nick) {
            return Ok(());
        }

        let staging = self
            .directory
            .join(layout::TEMP)
            .join(format!(".load-{}", nick));
        let result = self.stage_input(&staging, nick, archive);
        if result.is_err() {
            let _ = fsutil::remove_tree_force(&staging);
        }
        result
    }

    fn stage_input(&self, staging: &Path, nick: &InputNick, archive: &Archive) -> Result<()> {
        if staging.exists() {
            fsutil::remove_tree_force(staging)?;
        }
        archive.unpack_data_to(staging)?;

        let manifest = archive.manifest()?;
        for rel in fsutil::walk_files(staging)? {
            let entry_name = format!("{}/{}", super::archive::layout::DATA_DIR, rel);
            let expected = manifest.get(&entry_name).ok_or_else(|| Error::ContentMismatch {
                what: entry_name.clone(),
                reason: "extracted file is not in the manifest".into(),
            })?;
            let actual = content_id::hash_file(&staging.join(&rel))?;
            if &actual != expected {
                return Err(Error::ContentMismatch {
                    what: entry_name,
                    reason: "extracted content does not match manifest".into(),
                });
            }
        }

        let slot = self.input_slot(nick);
        fs::rename(staging, &slot).map_err(|e| Error::io_at("mounting input at", &slot, e))?;
        fsutil::set_readonly_recursive(&slot)?;
        info!(nick = %nick, archive = %archive.path().display(), "input loaded");
        Ok(())
    }

    /// Remove the slot contents; the recorded dependency stays.
    pub fn unload_input(&mut self, nick: &InputNick) -> Result<()> {
        if !self.meta.has_input(nick) {
            return Err(Error::NotFound(format!("input {}", nick)));
        }
        if self.is_loaded(nick) {
            fsutil::remove_tree_force(&self.input_slot(nick))?;
            debug!(nick = %nick, "input unloaded");
        }
        Ok(())
    }

    /// Drop the dependency entirely: slot, spec, and name mapping.
    pub fn delete_input(&mut self, nick: &InputNick) -> Result<()> {
        self.unload_input(nick)?;
        self.meta.inputs.remove(nick);
        self.input_map.remove(nick);
        self.save_meta()?;
        self.save_input_map()?;
        Ok(())
    }

    /// Point `nick` at another bead lineage without touching loaded data.
    pub fn remap_input(&mut self, nick: &InputNick, bead_name: BeadName) -> Result<()> {
        if !self.meta.has_input(nick) {
            return Err(Error::NotFound(format!("input {}", nick)));
        }
        self.input_map.insert(nick.clone(), bead_name);
        self.save_input_map()
    }

    /// Replace the pinned version of `nick`. Without `new_ref` the tracked
    /// bead name is searched; `Next`/`Prev` step relative to the recorded
    /// version.
    pub fn update_input(
        &mut self,
        registry: &Registry,
        nick: &InputNick,
        new_ref: Option<&str>,
        selector: &UpdateSelector,
    ) -> Result<()> {
        let spec = self
            .meta
            .inputs
            .get(nick)
            .ok_or_else(|| Error::NotFound(format!("input {}", nick)))?
            .clone();
        let tracked;
        let raw_ref = match new_ref {
            Some(raw) => raw,
            None => {
                tracked = self
                    .tracked_name(nick)
                    .ok_or_else(|| Error::NotFound(format!("no tracked bead name for {}", nick)))?;
                tracked.as_str()
            }
        };
        let time_selector = match selector {
            UpdateSelector::Latest => TimeSelector::Latest,
            UpdateSelector::Newest => TimeSelector::Newest,
            UpdateSelector::At(t) => TimeSelector::At(t.clone()),
            UpdateSelector::Next => {
                TimeSelector::Next(spec.freeze_time.clone(), spec.content_id.clone())
            }
            UpdateSelector::Prev => {
                TimeSelector::Prev(spec.freeze_time.clone(), spec.content_id.clone())
            }
        };
        let archive = registry.resolve_ref(raw_ref, &time_selector)?;

        self.unload_input(nick)?;
        let new_spec = InputSpec {
            kind: archive.kind()?,
            content_id: archive.content_id()?,
            freeze_time: archive.freeze_time().clone(),
        };
        self.meta.inputs.insert(nick.clone(), new_spec);
        self.input_map.insert(nick.clone(), archive.name().clone());
        self.save_meta()?;
        self.save_input_map()?;
        self.load_from(nick, &archive)
    }

    /// Per-input summary against the registered boxes.
    pub fn status(&self, registry: &Registry) -> Result<Vec<InputStatus>> {
        let mut rows = Vec::new();
        for (nick, spec) in &self.meta.inputs {
            let tracked_name = self.tracked_name(nick);
            let pinned_present = registry.find_by_content_id(&spec.content_id).is_ok();
            let stale = match &tracked_name {
                Some(name) => registry.has_newer(name, &spec.freeze_time)?,
                None => false,
            };
            rows.push(InputStatus {
                nick: nick.clone(),
                loaded: self.is_loaded(nick),
                tracked_name,
                pinned_present,
                stale,
            });
        }
        Ok(rows)
    }

    /// Freeze the workspace into an archive in the target box: an explicit
    /// box by name, or the sole registered box.
    pub fn save(&self, registry: &Registry, box_name: Option<&str>) -> Result<Archive> {
        let target = registry.save_target(box_name)?;
        self.freeze_into(target.location())
    }

    /// Snapshot the workspace into a new archive in `dest_dir`.
    pub(crate) fn freeze_into(&self, dest_dir: &Path) -> Result<Archive> {
        let name = self.name()?;
        let freeze_time = FreezeTime::now();
        let frozen = self.meta.frozen_as(name.clone(), freeze_time.clone());

        let (code_files, data_files) = self.snapshot_files()?;
        let archive = Archive::create(
            dest_dir,
            &name,
            &freeze_time,
            &frozen,
            &self.input_map,
            &code_files,
            &data_files,
        )?;
        info!(
            workspace = %self.directory.display(),
            archive = %archive.path().display(),
            "workspace saved"
        );
        Ok(archive)
    }

    /// Remove the workspace from disk. Refused unless its current content
    /// is archived in some registered box, or `force` is given.
    pub fn destroy(self, registry: &Registry, force: bool) -> Result<()> {
        if !force {
            let id = self.content_id()?;
            if registry.find_by_content_id(&id).is_err() {
                return Err(Error::UnsafeState(format!(
                    "{} has content not present in any box",
                    self.directory.display()
                )));
            }
        }
        info!(workspace = %self.directory.display(), forced = force, "workspace destroyed");
        fsutil::remove_tree_force(&self.directory)
    }

    /// Code and data files as `(archive-relative slash path, absolute
    /// path)` pairs. Code is everything outside `input/`, `output/`,
    /// `temp/`, and the metadata directory; data is `output/` contents.
    fn snapshot_files(&self) -> Result<(Vec<(String, PathBuf)>, Vec<(String, PathBuf)>)> {
        let excluded = [
            format!("{}/", layout::INPUT),
            format!("{}/", layout::OUTPUT),
            format!("{}/", layout::TEMP),
            format!("{}/", layout::META_DIR),
        ];
        let mut code_files = Vec::new();
        for rel in fsutil::walk_files(&self.directory)? {
            if excluded.iter().any(|prefix| rel.starts_with(prefix)) {
                continue;
            }
            code_files.push((rel.clone(), self.directory.join(&rel)));
        }
        let output_dir = self.directory.join(layout::OUTPUT);
        let mut data_files = Vec::new();
        for rel in fsutil::walk_files(&output_dir)? {
            data_files.push((rel.clone(), output_dir.join(&rel)));
        }
        Ok((code_files, data_files))
    }

    fn save_meta(&self) -> Result<()> {
        fsutil::write_json_atomic(&self.directory.join(layout::BEAD_META), &self.meta)
    }

    fn save_input_map(&self) -> Result<()> {
        fsutil::write_json_atomic(&self.directory.join(layout::INPUT_MAP), &self.input_map)
    }
}

impl Bead for Workspace {
    fn metadata(&self) -> Result<BeadMeta> {
        Ok(self.meta.clone())
    }

    /// Aggregate id of the current code and output trees, computed the
    /// same way an archive of this workspace would compute it.
    fn content_id(&self) -> Result<ContentId> {
        let (code_files, data_files) = self.snapshot_files()?;
        let mut entries = Vec::with_capacity(code_files.len() + data_files.len());
        for (rel, path) in &code_files {
            let entry_name = format!("{}/{}", super::archive::layout::CODE_DIR, rel);
            entries.push((entry_name, content_id::hash_file(path)?));
        }
        for (rel, path) in &data_files {
            let entry_name = format!("{}/{}", super::archive::layout::DATA_DIR, rel);
            entries.push((entry_name, content_id::hash_file(path)?));
        }
        content_id::aggregate_id(&entries)
    }
}

fn workspace_name(directory: &Path) -> Result<BeadName> {
    let raw = directory
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidName {
            raw: directory.display().to_string(),
            reason: "workspace directory has no usable name".into(),
        })?;
    BeadName::parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::box_store::BeadBox;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Workspace, Registry) {
        let root = TempDir::new().unwrap();
        let workspace = Workspace::initialize(root.path().join("analysis"), None).unwrap();
        let box_dir = root.path().join("store");
        fs::create_dir(&box_dir).unwrap();
        let mut registry = Registry::new();
        registry
            .add_box(BeadBox::new("store", &box_dir).unwrap())
            .unwrap();
        (root, workspace, registry)
    }

    fn nick(s: &str) -> InputNick {
        InputNick::parse(s).unwrap()
    }

    /// Freeze a producer workspace named `name` into the registry's box.
    /// Repeat calls reuse the same workspace, producing successive
    /// versions of the same lineage.
    fn freeze_producer(root: &TempDir, registry: &Registry, name: &str, output: &[u8]) -> Archive {
        let dir = root.path().join(name);
        let ws = if dir.exists() {
            Workspace::open(&dir).unwrap()
        } else {
            let ws = Workspace::initialize(&dir, None).unwrap();
            fs::write(ws.directory().join("run.sh"), b"#!/bin/sh\n").unwrap();
            ws
        };
        fs::write(ws.directory().join("output/result.csv"), output).unwrap();
        ws.save(registry, None).unwrap()
    }

    #[test]
    fn initialize_creates_layout_and_refuses_existing() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("fresh");
        let ws = Workspace::initialize(&path, None).unwrap();
        assert!(path.join("input").is_dir());
        assert!(path.join("output").is_dir());
        assert!(path.join("temp").is_dir());
        assert!(path.join(".bead-meta/bead").is_file());
        assert!(!ws.metadata().unwrap().is_frozen());

        let err = Workspace::initialize(&path, None).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn open_rejects_non_workspace() {
        let root = TempDir::new().unwrap();
        let err = Workspace::open(root.path().join("nowhere")).unwrap_err();
        assert!(matches!(err, Error::InvalidContainer(_)));
    }

    #[test]
    fn open_reads_back_persisted_state() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("persisted");
        let kind = {
            let ws = Workspace::initialize(&path, None).unwrap();
            ws.kind().clone()
        };
        let reopened = Workspace::open(&path).unwrap();
        assert_eq!(reopened.kind(), &kind);
    }

    #[test]
    fn add_input_records_loads_and_write_protects() {
        let (root, mut ws, registry) = fixture();
        freeze_producer(&root, &registry, "rates", b"eur,1.1\n");

        ws.add_input(&registry, nick("rates"), "rates", &TimeSelector::Latest)
            .unwrap();
        assert!(ws.is_loaded(&nick("rates")));
        let mounted = ws.directory().join("input/rates/result.csv");
        assert_eq!(fs::read(&mounted).unwrap(), b"eur,1.1\n");
        // Permission bits, not a write attempt; root ignores write bits.
        let perms = fs::metadata(&mounted).unwrap().permissions();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(perms.mode() & 0o222, 0);
        }
        #[cfg(not(unix))]
        assert!(perms.readonly());

        let err = ws
            .add_input(&registry, nick("rates"), "rates", &TimeSelector::Latest)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn unload_keeps_spec_and_load_restores_content() {
        let (root, mut ws, registry) = fixture();
        freeze_producer(&root, &registry, "rates", b"eur,1.1\n");
        ws.add_input(&registry, nick("rates"), "rates", &TimeSelector::Latest)
            .unwrap();

        ws.unload_input(&nick("rates")).unwrap();
        assert!(!ws.is_loaded(&nick("rates")));
        assert!(ws.metadata().unwrap().has_input(&nick("rates")));

        ws.load_input(&registry, &nick("rates")).unwrap();
        assert!(ws.is_loaded(&nick("rates")));
        assert_eq!(
            fs::read(ws.directory().join("input/rates/result.csv")).unwrap(),
            b"eur,1.1\n"
        );
    }

    #[test]
    fn delete_input_drops_everything() {
        let (root, mut ws, registry) = fixture();
        freeze_producer(&root, &registry, "rates", b"x\n");
        ws.add_input(&registry, nick("rates"), "rates", &TimeSelector::Latest)
            .unwrap();

        ws.delete_input(&nick("rates")).unwrap();
        assert!(!ws.metadata().unwrap().has_input(&nick("rates")));
        assert!(!ws.is_loaded(&nick("rates")));
        assert_eq!(ws.tracked_name(&nick("rates")), BeadName::parse("rates").ok());
    }

    #[test]
    fn operations_on_unknown_inputs_fail() {
        let (_root, mut ws, registry) = fixture();
        assert!(matches!(
            ws.unload_input(&nick("ghost")).unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            ws.load_input(&registry, &nick("ghost")).unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            ws.remap_input(&nick("ghost"), BeadName::parse("x").unwrap())
                .unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn save_produces_a_valid_archive() {
        let (_root, ws, registry) = fixture();
        fs::write(ws.directory().join("model.py"), b"pass\n").unwrap();
        fs::write(ws.directory().join("output/out.txt"), b"42\n").unwrap();

        let archive = ws.save(&registry, None).unwrap();
        archive.verify().unwrap();
        assert_eq!(archive.name().as_str(), "analysis");
        let manifest = archive.manifest().unwrap();
        assert!(manifest.contains_key("code/model.py"));
        assert!(manifest.contains_key("data/out.txt"));
        assert!(!manifest.keys().any(|k| k.contains(".bead-meta")));
    }

    #[test]
    fn workspace_and_archive_agree_on_content_id() {
        let (_root, ws, registry) = fixture();
        fs::write(ws.directory().join("model.py"), b"pass\n").unwrap();
        fs::write(ws.directory().join("output/out.txt"), b"42\n").unwrap();

        let before = ws.content_id().unwrap();
        let archive = ws.save(&registry, None).unwrap();
        assert_eq!(archive.content_id().unwrap(), before);
    }

    #[test]
    fn destroy_refuses_unarchived_state_unless_forced() {
        let (root, ws, registry) = fixture();
        fs::write(ws.directory().join("precious.py"), b"work\n").unwrap();
        let dir = ws.directory().to_path_buf();

        let err = ws.destroy(&registry, false).unwrap_err();
        assert!(matches!(err, Error::UnsafeState(_)));
        assert!(dir.exists());

        let ws = Workspace::open(&dir).unwrap();
        ws.save(&registry, None).unwrap();
        let ws = Workspace::open(&dir).unwrap();
        ws.destroy(&registry, false).unwrap();
        assert!(!dir.exists());
        drop(root);
    }

    #[test]
    fn destroy_force_skips_the_safety_check() {
        let (_root, ws, registry) = fixture();
        fs::write(ws.directory().join("scratch.txt"), b"junk\n").unwrap();
        let dir = ws.directory().to_path_buf();
        ws.destroy(&registry, true).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn from_archive_reconstructs_code_and_metadata() {
        let (root, ws, registry) = fixture();
        fs::write(ws.directory().join("model.py"), b"pass\n").unwrap();
        fs::write(ws.directory().join("output/out.txt"), b"42\n").unwrap();
        let kind = ws.kind().clone();
        let archive = ws.save(&registry, None).unwrap();

        let rebuilt =
            Workspace::from_archive(&archive, root.path().join("analysis-continued")).unwrap();
        assert_eq!(rebuilt.kind(), &kind);
        assert_eq!(
            fs::read(rebuilt.directory().join("model.py")).unwrap(),
            b"pass\n"
        );
        // Output is data, not code; it must not come back.
        assert!(!rebuilt.directory().join("output/out.txt").exists());
        assert!(!rebuilt.metadata().unwrap().is_frozen());
    }

    #[test]
    fn status_reports_loaded_and_stale_inputs() {
        let (root, mut ws, registry) = fixture();
        freeze_producer(&root, &registry, "rates", b"v1\n");
        ws.add_input(&registry, nick("rates"), "rates", &TimeSelector::Latest)
            .unwrap();

        let rows = ws.status(&registry).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].loaded);
        assert!(rows[0].pinned_present);
        assert!(!rows[0].stale);

        // A newer freeze of the same lineage makes the input stale.
        freeze_producer(&root, &registry, "rates", b"v2\n");
        let rows = ws.status(&registry).unwrap();
        assert!(rows[0].stale);
    }

    #[test]
    fn update_input_moves_to_the_latest_version() {
        let (root, mut ws, registry) = fixture();
        freeze_producer(&root, &registry, "rates", b"v1\n");
        ws.add_input(&registry, nick("rates"), "rates", &TimeSelector::Latest)
            .unwrap();
        freeze_producer(&root, &registry, "rates", b"v2\n");

        ws.update_input(&registry, &nick("rates"), None, &UpdateSelector::Latest)
            .unwrap();
        assert_eq!(
            fs::read(ws.directory().join("input/rates/result.csv")).unwrap(),
            b"v2\n"
        );
        let rows = ws.status(&registry).unwrap();
        assert!(!rows[0].stale);
    }

    #[test]
    fn update_input_prev_steps_back() {
        let (root, mut ws, registry) = fixture();
        freeze_producer(&root, &registry, "rates", b"v1\n");
        freeze_producer(&root, &registry, "rates", b"v2\n");
        ws.add_input(&registry, nick("rates"), "rates", &TimeSelector::Latest)
            .unwrap();
        assert_eq!(
            fs::read(ws.directory().join("input/rates/result.csv")).unwrap(),
            b"v2\n"
        );

        ws.update_input(&registry, &nick("rates"), None, &UpdateSelector::Prev)
            .unwrap();
        assert_eq!(
            fs::read(ws.directory().join("input/rates/result.csv")).unwrap(),
            b"v1\n"
        );

        // Off the older end of the lineage.
        let err = ws
            .update_input(&registry, &nick("rates"), None, &UpdateSelector::Prev)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn remap_input_changes_only_the_tracking() {
        let (root, mut ws, registry) = fixture();
        freeze_producer(&root, &registry, "rates", b"v1\n");
        ws.add_input(&registry, nick("fx"), "rates", &TimeSelector::Latest)
            .unwrap();
        assert_eq!(ws.tracked_name(&nick("fx")), BeadName::parse("rates").ok());

        ws.remap_input(&nick("fx"), BeadName::parse("rates-eu").unwrap())
            .unwrap();
        assert_eq!(
            ws.tracked_name(&nick("fx")),
            BeadName::parse("rates-eu").ok()
        );
        assert!(ws.is_loaded(&nick("fx")));
    }
}

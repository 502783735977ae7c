//! Frozen beads: immutable zip containers.
//!
//! A container holds `code/` and `data/` subtrees plus three metadata
//! entries under `meta/`. Opening one is cheap: only the filename is
//! parsed. Metadata, manifest, and the aggregate content id are computed
//! on first use and cached; a `.xmeta` side file next to the container
//! short-circuits the parse on later opens, keyed by the container's
//! modification time so a replaced container invalidates it.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::bead::Bead;
use super::content_id::{self, ContentId};
use super::json_canon::to_canon_json_bytes;
use super::lazy::Lazy;
use super::meta::BeadMeta;
use super::name::{BeadName, InputNick};
use super::timestamp::FreezeTime;
use crate::error::{Error, Result};
use crate::fsutil;

pub mod layout {
    pub const CODE_DIR: &str = "code";
    pub const DATA_DIR: &str = "data";

    pub const BEAD_META: &str = "meta/bead";
    pub const MANIFEST: &str = "meta/manifest";
    pub const INPUT_MAP: &str = "meta/input.map";
}

pub const CONTAINER_EXT: &str = "zip";
const SIDE_CACHE_EXT: &str = "xmeta";

const ARCHIVE_COMMENT: &str = "\
This file is a bead zip archive.

It is a normal zip file that stores one discrete computation of the form

    output = code(*inputs)

Code and output are stored as files under code/ and data/; inputs are
referenced by content id in the metadata. The remaining metadata links
different versions of the same computation and identifies the newest one.
";

/// Per-file content ids keyed by in-container path (`code/...`, `data/...`).
pub type Manifest = BTreeMap<String, ContentId>;

/// Input nick to tracked bead name, as recorded at freeze time.
pub type InputMap = BTreeMap<InputNick, BeadName>;

#[derive(Debug, Serialize, Deserialize)]
struct SideCache {
    modified_ms: u64,
    meta: BeadMeta,
    content_id: ContentId,
}

#[derive(Debug)]
struct Core {
    meta: BeadMeta,
    content_id: ContentId,
}

/// A frozen bead on disk.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    name: BeadName,
    freeze_time: FreezeTime,
    core: Lazy<Core>,
    manifest: Lazy<Manifest>,
    input_map: Lazy<InputMap>,
}

impl Archive {
    /// Open an existing container. Only the filename is inspected here;
    /// everything else is parsed lazily.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::NotFound(format!("no archive at {}", path.display())));
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidContainer(format!("bad filename: {}", path.display())))?;
        let (name, freeze_time) = parse_filename(filename)?;
        Ok(Self {
            path,
            name,
            freeze_time,
            core: Lazy::new(),
            manifest: Lazy::new(),
            input_map: Lazy::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bead name, as parsed from the filename.
    pub fn name(&self) -> &BeadName {
        &self.name
    }

    /// Freeze timestamp, as parsed from the filename.
    pub fn freeze_time(&self) -> &FreezeTime {
        &self.freeze_time
    }

    /// Modification time of the container file in milliseconds since the
    /// epoch. Used for `Newest` selection and side-cache keying.
    pub fn modified_ms(&self) -> Result<u64> {
        container_modified_ms(&self.path)
    }

    /// The per-file manifest.
    pub fn manifest(&self) -> Result<&Manifest> {
        self.manifest.get_or_try_init(|| {
            let mut zip = self.open_zip()?;
            let bytes = read_entry(&mut zip, layout::MANIFEST, &self.path)?;
            serde_json::from_slice(&bytes).map_err(|e| {
                Error::InvalidContainer(format!("parsing manifest of {}: {}", self.path.display(), e))
            })
        })
    }

    /// The nick-to-tracked-name map recorded at freeze time.
    pub fn input_map(&self) -> Result<&InputMap> {
        self.input_map.get_or_try_init(|| {
            let mut zip = self.open_zip()?;
            let bytes = read_entry(&mut zip, layout::INPUT_MAP, &self.path)?;
            serde_json::from_slice(&bytes).map_err(|e| {
                Error::InvalidContainer(format!(
                    "parsing input map of {}: {}",
                    self.path.display(),
                    e
                ))
            })
        })
    }

    fn core(&self) -> Result<&Core> {
        self.core.get_or_try_init(|| {
            if let Some(core) = self.try_side_cache() {
                return Ok(core);
            }
            let core = self.parse_core()?;
            self.write_side_cache(&core);
            Ok(core)
        })
    }

    fn parse_core(&self) -> Result<Core> {
        let mut zip = self.open_zip()?;
        let bytes = read_entry(&mut zip, layout::BEAD_META, &self.path)?;
        let meta: BeadMeta = serde_json::from_slice(&bytes).map_err(|e| {
            Error::InvalidContainer(format!("parsing metadata of {}: {}", self.path.display(), e))
        })?;
        meta.validate()?;
        drop(zip);

        let manifest = self.manifest()?;
        let entries: Vec<(String, ContentId)> = manifest
            .iter()
            .map(|(path, id)| (path.clone(), id.clone()))
            .collect();
        let content_id = content_id::aggregate_id(&entries)?;
        Ok(Core { meta, content_id })
    }

    fn side_cache_path(&self) -> PathBuf {
        self.path.with_extension(SIDE_CACHE_EXT)
    }

    fn try_side_cache(&self) -> Option<Core> {
        let cache: SideCache = fsutil::read_json(&self.side_cache_path()).ok()?;
        let modified_ms = container_modified_ms(&self.path).ok()?;
        if cache.modified_ms != modified_ms {
            return None;
        }
        cache.meta.validate().ok()?;
        Some(Core {
            meta: cache.meta,
            content_id: cache.content_id,
        })
    }

    /// Best effort; a missing or unwritable side cache only costs a
    /// re-parse next time.
    fn write_side_cache(&self, core: &Core) {
        let modified_ms = match container_modified_ms(&self.path) {
            Ok(ms) => ms,
            Err(_) => return,
        };
        let cache = SideCache {
            modified_ms,
            meta: core.meta.clone(),
            content_id: core.content_id.clone(),
        };
        if let Err(e) = fsutil::write_json_atomic(&self.side_cache_path(), &cache) {
            debug!(path = %self.path.display(), error = %e, "side cache not written");
        }
    }

    fn open_zip(&self) -> Result<ZipArchive<File>> {
        let file = File::open(&self.path).map_err(|e| Error::io_at("opening", &self.path, e))?;
        ZipArchive::new(file).map_err(|e| {
            Error::InvalidContainer(format!("{} is not a zip file: {}", self.path.display(), e))
        })
    }

    /// Structural check: required entries present and parseable, metadata
    /// consistent with the filename. Does not touch file contents; that is
    /// [`Archive::verify`].
    pub fn validate(&self) -> Result<()> {
        let meta = self.metadata()?;
        self.manifest()?;
        self.input_map()?;

        let frozen_name = meta.freeze_name.as_ref().ok_or_else(|| {
            Error::InvalidContainer(format!("{} is not frozen", self.path.display()))
        })?;
        let frozen_time = meta
            .freeze_time
            .as_ref()
            .ok_or_else(|| Error::InvalidContainer(format!("{} is not frozen", self.path.display())))?;
        if frozen_name != &self.name || frozen_time != &self.freeze_time {
            return Err(Error::InvalidContainer(format!(
                "{}: filename does not match embedded metadata",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Full content verification: re-hash every `code/` and `data/` entry
    /// against the manifest and recompute the aggregate id. Expensive;
    /// callers opt in.
    pub fn verify(&self) -> Result<()> {
        self.validate()?;
        let manifest = self.manifest()?.clone();
        let expected_id = self.content_id()?;

        let mut zip = self.open_zip()?;
        let mut recomputed: Vec<(String, ContentId)> = Vec::new();
        for i in 0..zip.len() {
            let entry = zip.by_index(i).map_err(|e| {
                Error::InvalidContainer(format!("reading {}: {}", self.path.display(), e))
            })?;
            let entry_name = entry.name().to_string();
            if !is_content_path(&entry_name) {
                continue;
            }
            let declared = entry.size();
            let expected = manifest.get(&entry_name).ok_or_else(|| Error::ContentMismatch {
                what: entry_name.clone(),
                reason: "present in container but not in manifest".into(),
            })?;
            let actual = content_id::hash_reader(entry, declared, &entry_name)?;
            if &actual != expected {
                return Err(Error::ContentMismatch {
                    what: entry_name,
                    reason: "content does not match manifest".into(),
                });
            }
            recomputed.push((entry_name, actual));
        }

        if recomputed.len() != manifest.len() {
            for path in manifest.keys() {
                if !recomputed.iter().any(|(p, _)| p == path) {
                    return Err(Error::ContentMismatch {
                        what: path.clone(),
                        reason: "listed in manifest but missing from container".into(),
                    });
                }
            }
        }

        let actual_id = content_id::aggregate_id(&recomputed)?;
        if actual_id != expected_id {
            return Err(Error::ContentMismatch {
                what: self.path.display().to_string(),
                reason: "aggregate content id does not match".into(),
            });
        }
        Ok(())
    }

    /// Extract the `code/` subtree into `dest`, prefix stripped.
    pub fn unpack_code_to(&self, dest: &Path) -> Result<()> {
        self.extract_entries(Some(layout::CODE_DIR), dest)
    }

    /// Extract the `data/` subtree into `dest`, prefix stripped.
    pub fn unpack_data_to(&self, dest: &Path) -> Result<()> {
        self.extract_entries(Some(layout::DATA_DIR), dest)
    }

    /// Extract the whole container layout into `dest` with prefixes kept:
    /// `code/`, `data/`, and the `meta/` entries land as they are stored.
    pub fn unpack_all_to(&self, dest: &Path) -> Result<()> {
        self.extract_entries(None, dest)
    }

    /// Every entry path is safety-checked before anything is written; on
    /// any failure the files written so far are removed again, along with
    /// every directory the extraction created, so the destination is left
    /// as it was found.
    fn extract_entries(&self, subtree: Option<&str>, dest: &Path) -> Result<()> {
        let mut created_dirs: Vec<PathBuf> = Vec::new();
        create_dirs_tracked(dest, &mut created_dirs)?;
        let canonical_dest = match dest.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                remove_dirs(&mut created_dirs);
                return Err(Error::io_at("resolving", dest, e));
            }
        };

        let mut written: Vec<PathBuf> = Vec::new();
        let result =
            self.extract_entries_inner(subtree, &canonical_dest, &mut written, &mut created_dirs);
        if result.is_err() {
            for path in &written {
                let _ = fs::remove_file(path);
            }
            remove_dirs(&mut created_dirs);
        }
        result
    }

    fn extract_entries_inner(
        &self,
        subtree: Option<&str>,
        canonical_dest: &Path,
        written: &mut Vec<PathBuf>,
        created_dirs: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let prefix = subtree.map(|s| format!("{}/", s));
        let mut zip = self.open_zip()?;
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| {
                Error::InvalidContainer(format!("reading {}: {}", self.path.display(), e))
            })?;
            let entry_name = entry.name().to_string();
            if entry_name.ends_with('/') {
                continue;
            }
            let rel = match &prefix {
                Some(p) => match entry_name.strip_prefix(p.as_str()) {
                    Some(rel) => rel,
                    None => continue,
                },
                None => entry_name.as_str(),
            };

            let target = fsutil::safe_join(canonical_dest, rel)?;
            if let Some(parent) = target.parent() {
                create_dirs_tracked(parent, created_dirs)?;
            }
            fsutil::ensure_contained(canonical_dest, &target, &entry_name)?;

            let mut out =
                File::create(&target).map_err(|e| Error::io_at("creating", &target, e))?;
            written.push(target.clone());
            std::io::copy(&mut entry, &mut out)
                .map_err(|e| Error::io_at("extracting to", &target, e))?;
        }
        Ok(())
    }

    /// Assemble a new container in `dest_dir` from a workspace snapshot.
    ///
    /// `code_files` are `(workspace-relative slash path, absolute path)`
    /// pairs for the code subtree; `data_files` likewise for `output/`
    /// contents. The container is built at a `.tmp` path and renamed into
    /// place, so the box never holds a half-written archive.
    pub(crate) fn create(
        dest_dir: &Path,
        name: &BeadName,
        freeze_time: &FreezeTime,
        meta: &BeadMeta,
        input_map: &InputMap,
        code_files: &[(String, PathBuf)],
        data_files: &[(String, PathBuf)],
    ) -> Result<Archive> {
        let filename = format!("{}_{}.{}", name, freeze_time, CONTAINER_EXT);
        let final_path = dest_dir.join(&filename);
        if final_path.exists() {
            return Err(Error::AlreadyExists(format!(
                "archive {} already exists",
                final_path.display()
            )));
        }
        let tmp_path = dest_dir.join(format!("{}.tmp", filename));

        let result = write_container(&tmp_path, meta, input_map, code_files, data_files);
        let content_id = match result {
            Ok(id) => id,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };
        fs::rename(&tmp_path, &final_path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            Error::io_at("renaming archive into", dest_dir, e)
        })?;
        debug!(archive = %final_path.display(), content_id = %content_id, "archive created");

        let archive = Archive::open(&final_path)?;
        archive.write_side_cache(&Core {
            meta: meta.clone(),
            content_id,
        });
        Ok(archive)
    }
}

impl Bead for Archive {
    fn metadata(&self) -> Result<BeadMeta> {
        Ok(self.core()?.meta.clone())
    }

    fn content_id(&self) -> Result<ContentId> {
        Ok(self.core()?.content_id.clone())
    }
}

/// Strict `{name}_{freezetime}.zip` parse. The timestamp follows the last
/// underscore; bead names cannot contain `__`, so the split is unambiguous.
pub(crate) fn parse_filename(filename: &str) -> Result<(BeadName, FreezeTime)> {
    let bad = || Error::InvalidContainer(format!("not an archive filename: {}", filename));
    let stem = filename
        .strip_suffix(&format!(".{}", CONTAINER_EXT))
        .ok_or_else(bad)?;
    let (name, time) = stem.rsplit_once('_').ok_or_else(bad)?;
    let name = BeadName::parse(name)?;
    let freeze_time = FreezeTime::parse(time)?;
    Ok((name, freeze_time))
}

/// `create_dir_all` that records which directories it actually created,
/// so a failed extraction can take them down again.
fn create_dirs_tracked(dir: &Path, created: &mut Vec<PathBuf>) -> Result<()> {
    let mut missing = Vec::new();
    let mut cursor = Some(dir);
    while let Some(p) = cursor {
        if p.as_os_str().is_empty() || p.exists() {
            break;
        }
        missing.push(p.to_path_buf());
        cursor = p.parent();
    }
    fs::create_dir_all(dir).map_err(|e| Error::io_at("creating", dir, e))?;
    created.append(&mut missing);
    Ok(())
}

/// Remove directories deepest-first; each is gone only if already empty.
fn remove_dirs(dirs: &mut Vec<PathBuf>) {
    dirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    for dir in dirs.iter() {
        let _ = fs::remove_dir(dir);
    }
}

fn is_content_path(entry_name: &str) -> bool {
    (entry_name.starts_with("code/") || entry_name.starts_with("data/"))
        && !entry_name.ends_with('/')
}

fn container_modified_ms(path: &Path) -> Result<u64> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| Error::io_at("inspecting", path, e))?;
    let ms = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Ok(ms)
}

fn read_entry(zip: &mut ZipArchive<File>, entry_name: &str, container: &Path) -> Result<Vec<u8>> {
    let mut entry = zip.by_name(entry_name).map_err(|_| {
        Error::InvalidContainer(format!(
            "{} has no {} entry",
            container.display(),
            entry_name
        ))
    })?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| Error::io(format!("reading {} of {}", entry_name, container.display()), e))?;
    Ok(bytes)
}

fn write_container(
    tmp_path: &Path,
    meta: &BeadMeta,
    input_map: &InputMap,
    code_files: &[(String, PathBuf)],
    data_files: &[(String, PathBuf)],
) -> Result<ContentId> {
    let file = File::create(tmp_path).map_err(|e| Error::io_at("creating", tmp_path, e))?;
    let mut zip = ZipWriter::new(file);
    zip.set_comment(ARCHIVE_COMMENT);

    // Entry mtimes are pinned so container bytes depend only on content.
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let mut manifest = Manifest::new();
    let mut add_tree = |zip: &mut ZipWriter<File>,
                        subtree: &str,
                        files: &[(String, PathBuf)]|
     -> Result<()> {
        let mut sorted: Vec<&(String, PathBuf)> = files.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        for (rel, source) in sorted {
            let entry_name = format!("{}/{}", subtree, rel);
            if manifest.contains_key(&entry_name) {
                return Err(Error::AlreadyExists(format!(
                    "duplicate entry {}",
                    entry_name
                )));
            }
            let id = content_id::hash_file(source)?;
            zip.start_file(entry_name.as_str(), options)
                .map_err(|e| Error::InvalidContainer(format!("adding {}: {}", entry_name, e)))?;
            let mut input = File::open(source).map_err(|e| Error::io_at("opening", source, e))?;
            std::io::copy(&mut input, &mut *zip)
                .map_err(|e| Error::io_at("packing", source, e))?;
            manifest.insert(entry_name, id);
        }
        Ok(())
    };
    add_tree(&mut zip, layout::CODE_DIR, code_files)?;
    add_tree(&mut zip, layout::DATA_DIR, data_files)?;

    let mut write_meta_entry = |zip: &mut ZipWriter<File>,
                                entry_name: &str,
                                bytes: &[u8]|
     -> Result<()> {
        zip.start_file(entry_name, options)
            .map_err(|e| Error::InvalidContainer(format!("adding {}: {}", entry_name, e)))?;
        zip.write_all(bytes)
            .map_err(|e| Error::io(format!("writing {}", entry_name), e))?;
        Ok(())
    };
    write_meta_entry(&mut zip, layout::BEAD_META, &to_canon_json_bytes(meta)?)?;
    write_meta_entry(&mut zip, layout::INPUT_MAP, &to_canon_json_bytes(input_map)?)?;
    write_meta_entry(&mut zip, layout::MANIFEST, &to_canon_json_bytes(&manifest)?)?;

    zip.finish()
        .map_err(|e| Error::InvalidContainer(format!("finishing container: {}", e)))?;

    let entries: Vec<(String, ContentId)> =
        manifest.iter().map(|(p, id)| (p.clone(), id.clone())).collect();
    content_id::aggregate_id(&entries)
}

/// Open every archive in `dir`, skipping files that are not bead
/// containers. Foreign and malformed files are reported at warn level and
/// otherwise ignored.
pub(crate) fn scan_dir(dir: &Path) -> Result<Vec<Archive>> {
    let mut archives = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| Error::io_at("listing", dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io_at("listing", dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !filename.ends_with(&format!(".{}", CONTAINER_EXT)) {
            continue;
        }
        match Archive::open(&path) {
            Ok(archive) => archives.push(archive),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping non-bead file");
            }
        }
    }
    Ok(archives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::meta::Kind;
    use tempfile::TempDir;

    const T1: &str = "20240115T120000000000+0000";

    fn frozen_meta(name: &str, time: &str) -> BeadMeta {
        BeadMeta::new_workspace(Kind::generate()).frozen_as(
            BeadName::parse(name).unwrap(),
            FreezeTime::parse(time).unwrap(),
        )
    }

    fn make_archive(dir: &Path, name: &str, files: &[(&str, &[u8])]) -> Archive {
        let src = TempDir::new().unwrap();
        let mut code_files = Vec::new();
        for (rel, bytes) in files {
            let path = src.path().join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, bytes).unwrap();
            code_files.push((rel.to_string(), path));
        }
        Archive::create(
            dir,
            &BeadName::parse(name).unwrap(),
            &FreezeTime::parse(T1).unwrap(),
            &frozen_meta(name, T1),
            &InputMap::new(),
            &code_files,
            &[],
        )
        .unwrap()
    }

    #[test]
    fn filename_parse_is_strict() {
        let (name, time) = parse_filename("eu-rates_20240115T120000000000+0000.zip").unwrap();
        assert_eq!(name.as_str(), "eu-rates");
        assert_eq!(time.as_str(), T1);

        assert!(parse_filename("eu-rates.zip").is_err());
        assert!(parse_filename("eu-rates_garbage.zip").is_err());
        assert!(parse_filename("eu-rates_20240115T120000000000+0000.tar").is_err());
    }

    #[test]
    fn name_with_underscore_still_parses() {
        let (name, _) = parse_filename("model_v2_20240115T120000000000+0000.zip").unwrap();
        assert_eq!(name.as_str(), "model_v2");
    }

    #[test]
    fn create_open_roundtrip() {
        let dir = TempDir::new().unwrap();
        let created = make_archive(dir.path(), "demo", &[("main.py", b"print(1)")]);
        assert_eq!(created.name().as_str(), "demo");

        let reopened = Archive::open(created.path()).unwrap();
        reopened.validate().unwrap();
        assert_eq!(reopened.content_id().unwrap(), created.content_id().unwrap());
        assert_eq!(
            reopened.manifest().unwrap().keys().collect::<Vec<_>>(),
            vec!["code/main.py"]
        );
    }

    #[test]
    fn create_refuses_existing_target() {
        let dir = TempDir::new().unwrap();
        make_archive(dir.path(), "demo", &[("f", b"x")]);
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("f"), b"x").unwrap();
        let err = Archive::create(
            dir.path(),
            &BeadName::parse("demo").unwrap(),
            &FreezeTime::parse(T1).unwrap(),
            &frozen_meta("demo", T1),
            &InputMap::new(),
            &[("f".to_string(), src.path().join("f"))],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn content_id_ignores_bead_name() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let a = make_archive(dir_a.path(), "first", &[("x.txt", b"same")]);
        let b = make_archive(dir_b.path(), "second", &[("x.txt", b"same")]);
        assert_eq!(a.content_id().unwrap(), b.content_id().unwrap());
    }

    #[test]
    fn content_id_tracks_paths_and_bytes() {
        let base = TempDir::new().unwrap();
        let d1 = base.path().join("1");
        let d2 = base.path().join("2");
        let d3 = base.path().join("3");
        for d in [&d1, &d2, &d3] {
            fs::create_dir_all(d).unwrap();
        }
        let a = make_archive(&d1, "x", &[("a.txt", b"v")]);
        let b = make_archive(&d2, "x", &[("b.txt", b"v")]);
        let c = make_archive(&d3, "x", &[("a.txt", b"w")]);
        assert_ne!(a.content_id().unwrap(), b.content_id().unwrap());
        assert_ne!(a.content_id().unwrap(), c.content_id().unwrap());
    }

    #[test]
    fn verify_passes_on_intact_archive() {
        let dir = TempDir::new().unwrap();
        let archive = make_archive(dir.path(), "ok", &[("a", b"1"), ("sub/b", b"2")]);
        archive.verify().unwrap();
    }

    #[test]
    fn side_cache_is_ignored_when_container_changes() {
        let dir = TempDir::new().unwrap();
        let archive = make_archive(dir.path(), "cached", &[("a", b"1")]);
        let id = archive.content_id().unwrap();
        let cache_path = archive.side_cache_path();
        assert!(cache_path.exists());

        // Poison the cache with a wrong mtime key; reopen must re-parse.
        let mut cache: SideCache = fsutil::read_json(&cache_path).unwrap();
        cache.modified_ms += 1;
        cache.content_id = content_id::hash_bytes(b"bogus");
        fsutil::write_json_atomic(&cache_path, &cache).unwrap();

        let reopened = Archive::open(archive.path()).unwrap();
        assert_eq!(reopened.content_id().unwrap(), id);
    }

    #[test]
    fn unpack_strips_subtree_prefix() {
        let dir = TempDir::new().unwrap();
        let archive = make_archive(dir.path(), "tree", &[("a.txt", b"1"), ("sub/b.txt", b"2")]);
        let dest = TempDir::new().unwrap();
        archive.unpack_code_to(dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"1");
        assert_eq!(fs::read(dest.path().join("sub/b.txt")).unwrap(), b"2");
    }

    #[test]
    fn extraction_rejects_traversal_entries() {
        // Hand-build a container whose entry path escapes the destination.
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format!("evil_{}.zip", T1));
        {
            let file = File::create(&path).unwrap();
            let mut zip = ZipWriter::new(file);
            let options = FileOptions::default();
            zip.start_file("code/../../escape.txt", options).unwrap();
            zip.write_all(b"gotcha").unwrap();
            zip.start_file("meta/bead", options).unwrap();
            zip.write_all(&to_canon_json_bytes(&frozen_meta("evil", T1)).unwrap())
                .unwrap();
            zip.start_file("meta/manifest", options).unwrap();
            zip.write_all(b"{}").unwrap();
            zip.start_file("meta/input.map", options).unwrap();
            zip.write_all(b"{}").unwrap();
            zip.finish().unwrap();
        }
        let archive = Archive::open(&path).unwrap();
        let dest = TempDir::new().unwrap();
        let extract_root = dest.path().join("slot");
        let err = archive.unpack_code_to(&extract_root).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }));
        assert!(!dest.path().join("escape.txt").exists());
        // Fail-closed: the slot directory itself was created by the
        // extraction and must be gone again.
        assert!(!extract_root.exists());
    }

    #[test]
    fn failed_extraction_removes_created_directories() {
        // A good nested entry first, so directories exist by the time the
        // bad entry is rejected.
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format!("evil_{}.zip", T1));
        {
            let file = File::create(&path).unwrap();
            let mut zip = ZipWriter::new(file);
            let options = FileOptions::default();
            zip.start_file("code/sub/deep/ok.txt", options).unwrap();
            zip.write_all(b"fine").unwrap();
            zip.start_file("code/../../escape.txt", options).unwrap();
            zip.write_all(b"gotcha").unwrap();
            zip.finish().unwrap();
        }
        let archive = Archive::open(&path).unwrap();
        let dest = TempDir::new().unwrap();
        let extract_root = dest.path().join("slot");
        let err = archive.unpack_code_to(&extract_root).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }));
        assert!(!extract_root.exists());
        // The pre-existing destination parent survives untouched.
        assert!(dest.path().exists());
    }

    #[test]
    fn unpack_all_preserves_container_layout() {
        let dir = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("main.py"), b"print(1)").unwrap();
        fs::write(src.path().join("out.bin"), [1u8, 2, 3]).unwrap();
        let archive = Archive::create(
            dir.path(),
            &BeadName::parse("demo").unwrap(),
            &FreezeTime::parse(T1).unwrap(),
            &frozen_meta("demo", T1),
            &InputMap::new(),
            &[("main.py".to_string(), src.path().join("main.py"))],
            &[("out.bin".to_string(), src.path().join("out.bin"))],
        )
        .unwrap();

        let dest = TempDir::new().unwrap();
        archive.unpack_all_to(dest.path()).unwrap();
        assert_eq!(
            fs::read(dest.path().join("code/main.py")).unwrap(),
            b"print(1)"
        );
        assert_eq!(
            fs::read(dest.path().join("data/out.bin")).unwrap(),
            vec![1u8, 2, 3]
        );
        let meta: BeadMeta =
            serde_json::from_slice(&fs::read(dest.path().join(layout::BEAD_META)).unwrap())
                .unwrap();
        meta.validate().unwrap();
        assert_eq!(meta.freeze_name.as_ref().unwrap().as_str(), "demo");
    }

    #[test]
    fn scan_dir_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        make_archive(dir.path(), "real", &[("f", b"x")]);
        fs::write(dir.path().join("notes.txt"), b"not a bead").unwrap();
        fs::write(dir.path().join("broken.zip"), b"not a zip either").unwrap();

        let archives = scan_dir(dir.path()).unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].name().as_str(), "real");
    }
}

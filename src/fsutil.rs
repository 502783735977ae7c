//! Filesystem helpers shared by workspaces, archives, and boxes.
//!
//! Everything that persists metadata goes through [`write_json_atomic`]:
//! write to a sibling temp file, then rename over the target. A crash leaves
//! either the old file or the new one, never a torn write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Serialize `value` as JSON and atomically replace `path` with it.
///
/// The temp file is created in the target's parent directory so the final
/// rename never crosses a filesystem boundary.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidContainer(format!("no parent for {}", path.display())))?;
    let mut tmp =
        NamedTempFile::new_in(parent).map_err(|e| Error::io_at("creating temp file in", parent, e))?;
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::InvalidContainer(format!("encoding {}: {}", path.display(), e)))?;
    tmp.write_all(&bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| Error::io_at("writing", path, e))?;
    tmp.persist(path)
        .map_err(|e| Error::io_at("persisting", path, e.error))?;
    Ok(())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| Error::io_at("reading", path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidContainer(format!("parsing {}: {}", path.display(), e)))
}

/// Join an archive-supplied relative path onto `base`, refusing anything
/// that could land outside it.
///
/// Rejected outright: absolute paths, backslashes, empty paths, and any
/// `.` / `..` component. Callers must additionally run
/// [`ensure_contained`] on the resolved parent before writing, which
/// catches escape via symlinks already present under `base`.
pub(crate) fn safe_join(base: &Path, entry: &str) -> Result<PathBuf> {
    let traversal = || Error::PathTraversal {
        entry: entry.to_string(),
    };
    if entry.is_empty() || entry.contains('\\') {
        return Err(traversal());
    }
    let rel = Path::new(entry);
    if rel.is_absolute() {
        return Err(traversal());
    }
    for comp in rel.components() {
        match comp {
            std::path::Component::Normal(_) => {}
            _ => return Err(traversal()),
        }
    }
    Ok(base.join(rel))
}

/// Verify that `path`'s parent directory resolves to a location under
/// `canonical_base` (which must already be canonicalized).
pub(crate) fn ensure_contained(canonical_base: &Path, path: &Path, entry: &str) -> Result<()> {
    let parent = path.parent().ok_or_else(|| Error::PathTraversal {
        entry: entry.to_string(),
    })?;
    let resolved = parent
        .canonicalize()
        .map_err(|e| Error::io_at("resolving", parent, e))?;
    if resolved.starts_with(canonical_base) {
        Ok(())
    } else {
        Err(Error::PathTraversal {
            entry: entry.to_string(),
        })
    }
}

/// Walk `root` recursively and return the relative paths of all regular
/// files, `/`-normalized and sorted.
///
/// Hand-rolled rather than pulling in a walker crate; the trees involved
/// are small and ordering must be exact.
pub(crate) fn walk_files(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| Error::io_at("listing", &dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io_at("listing", &dir, e))?;
            let path = entry.path();
            let ftype = entry
                .file_type()
                .map_err(|e| Error::io_at("inspecting", &path, e))?;
            if ftype.is_dir() {
                stack.push(path);
            } else if ftype.is_file() {
                out.push(relative_slash_path(root, &path)?);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Express `path` relative to `root` with `/` separators.
pub(crate) fn relative_slash_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        Error::InvalidContainer(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        ))
    })?;
    let mut parts = Vec::new();
    for comp in rel.components() {
        match comp {
            std::path::Component::Normal(os) => match os.to_str() {
                Some(s) => parts.push(s),
                None => {
                    return Err(Error::InvalidContainer(format!(
                        "non-UTF-8 path under {}",
                        root.display()
                    )))
                }
            },
            _ => {
                return Err(Error::InvalidContainer(format!(
                    "unexpected path component in {}",
                    path.display()
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

/// Recursively mark every file and directory under `root` read-only.
pub(crate) fn set_readonly_recursive(root: &Path) -> Result<()> {
    chmod_recursive(root, true)
}

/// Recursively restore write permission under `root`.
pub(crate) fn clear_readonly_recursive(root: &Path) -> Result<()> {
    chmod_recursive(root, false)
}

fn chmod_recursive(root: &Path, readonly: bool) -> Result<()> {
    // Directories first when clearing, children first when setting, so the
    // walk itself never hits a permission wall.
    if !readonly {
        chmod_one(root, false)?;
    }
    let meta = fs::symlink_metadata(root).map_err(|e| Error::io_at("inspecting", root, e))?;
    if meta.is_dir() {
        let entries = fs::read_dir(root).map_err(|e| Error::io_at("listing", root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io_at("listing", root, e))?;
            chmod_recursive(&entry.path(), readonly)?;
        }
    }
    if readonly {
        chmod_one(root, true)?;
    }
    Ok(())
}

#[cfg(unix)]
fn chmod_one(path: &Path, readonly: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let meta = fs::symlink_metadata(path).map_err(|e| Error::io_at("inspecting", path, e))?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mode = meta.permissions().mode();
    let new_mode = if readonly { mode & !0o222 } else { mode | 0o200 };
    fs::set_permissions(path, fs::Permissions::from_mode(new_mode))
        .map_err(|e| Error::io_at("changing permissions of", path, e))
}

#[cfg(not(unix))]
fn chmod_one(path: &Path, readonly: bool) -> Result<()> {
    let meta = fs::symlink_metadata(path).map_err(|e| Error::io_at("inspecting", path, e))?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    perms.set_readonly(readonly);
    fs::set_permissions(path, perms).map_err(|e| Error::io_at("changing permissions of", path, e))
}

/// Remove a tree that may contain read-only files.
pub(crate) fn remove_tree_force(root: &Path) -> Result<()> {
    if !root.exists() {
        return Ok(());
    }
    clear_readonly_recursive(root)?;
    fs::remove_dir_all(root).map_err(|e| Error::io_at("removing", root, e))
}

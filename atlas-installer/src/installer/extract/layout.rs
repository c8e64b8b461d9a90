//! Post-extraction layout fixes.
//!
//! Release archives are often packed with a single versioned wrapper
//! directory (`Atlas_Interactivo-1.0.0-linux-x64/...`). Its contents are
//! lifted into the destination so the application and its marker files sit
//! at the top level.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::Path;

use uuid::Uuid;

/// Names directly under `dir`; empty when `dir` does not exist.
pub(crate) fn top_level_names(dir: &Path) -> io::Result<HashSet<OsString>> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|entry| entry.map(|entry| entry.file_name()))
            .collect(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(e) => Err(e),
    }
}

/// Lift a wrapper directory's contents into `destination`.
///
/// Applies only when extraction added exactly one top-level entry (relative
/// to `before`) and that entry is a real directory. Files already present
/// are replaced and directories merged. Returns the wrapper's name.
pub(crate) fn flatten_wrapper(
    destination: &Path,
    before: &HashSet<OsString>,
) -> io::Result<Option<String>> {
    let added: Vec<OsString> = top_level_names(destination)?
        .into_iter()
        .filter(|name| !before.contains(name))
        .collect();
    let [name] = added.as_slice() else {
        return Ok(None);
    };

    let wrapper = destination.join(name);
    if !fs::symlink_metadata(&wrapper)?.is_dir() {
        return Ok(None);
    }

    // Move aside first: a child may share the wrapper's name
    let staging = destination.join(format!(".unwrap-{}", Uuid::new_v4().simple()));
    fs::rename(&wrapper, &staging)?;
    merge_into(&staging, destination)?;
    fs::remove_dir(&staging)?;

    Ok(Some(name.to_string_lossy().into_owned()))
}

/// Move everything in `source` into `target`, leaving `source` empty.
fn merge_into(source: &Path, target: &Path) -> io::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        let incoming_dir = entry.file_type()?.is_dir();

        match fs::symlink_metadata(&to) {
            Ok(existing) if existing.is_dir() && incoming_dir => {
                merge_into(&from, &to)?;
                fs::remove_dir(&from)?;
                continue;
            }
            Ok(existing) if existing.is_dir() => fs::remove_dir_all(&to)?,
            Ok(_) => fs::remove_file(&to)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::rename(&from, &to)?;
    }
    Ok(())
}

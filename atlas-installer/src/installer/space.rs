//! Free-space check for the destination volume.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use super::download::format_size;
use super::error::{InstallError, InstallResult};
use super::events::Reporter;

/// Free bytes on the volume that holds (or will hold) `path`.
///
/// The destination usually does not exist yet, so the nearest existing
/// ancestor is measured instead.
pub(crate) fn available_space(path: &Path) -> io::Result<u64> {
    let volume = existing_ancestor(path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no existing parent of {}", path.display()),
        )
    })?;
    fs2::available_space(volume)
}

fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().ok()?.join(path)
    };
    absolute
        .ancestors()
        .find(|candidate| candidate.exists())
        .map(Path::to_path_buf)
}

/// Refuse to start when `destination` has less than `required` bytes free.
///
/// A volume that cannot be measured is not a reason to stop; it is logged
/// and the installation goes ahead.
pub(crate) fn ensure_free_space(
    destination: &Path,
    required: u64,
    reporter: &Reporter<'_>,
) -> InstallResult<()> {
    match available_space(destination) {
        Ok(available) if available < required => {
            reporter.warn(format!(
                "Not enough free space: {} available, {} required",
                format_size(available),
                format_size(required)
            ));
            Err(InstallError::InsufficientSpace {
                path: destination.to_path_buf(),
                available,
                required,
            })
        }
        Ok(available) => {
            reporter.info(format!("Free space: {} available", format_size(available)));
            Ok(())
        }
        Err(e) => {
            reporter.warn(format!(
                "Could not determine free space for {}: {}",
                destination.display(),
                e
            ));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::error::ErrorKind;
    use crate::installer::events::MemoryReporter;

    #[test]
    fn test_missing_destination_measures_parent() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("not").join("created").join("yet");

        assert_eq!(existing_ancestor(&dest), Some(temp.path().to_path_buf()));
        assert!(available_space(&dest).unwrap() > 0);
        assert!(!dest.exists());
    }

    #[test]
    fn test_relative_destination() {
        assert!(existing_ancestor(Path::new("surely/not/here")).is_some());
    }

    #[test]
    fn test_insufficient_space() {
        let temp = tempfile::tempdir().unwrap();
        let memory = MemoryReporter::new();

        let err = ensure_free_space(&temp.path().join("Atlas"), u64::MAX, &Reporter::new(&memory))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientSpace);
        assert!(memory
            .log_messages()
            .iter()
            .any(|m| m.starts_with("Not enough free space")));
    }

    #[test]
    fn test_enough_space() {
        let temp = tempfile::tempdir().unwrap();
        let memory = MemoryReporter::new();

        ensure_free_space(&temp.path().join("Atlas"), 1, &Reporter::new(&memory)).unwrap();
        assert!(memory
            .log_messages()
            .iter()
            .any(|m| m.starts_with("Free space:")));
    }
}

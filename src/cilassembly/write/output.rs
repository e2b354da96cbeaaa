//! Atomic file replacement.
//!
//! Every output is first written completely to a temporary file in the destination directory
//! and only then renamed over the destination. A failure at any point before the rename leaves
//! the destination untouched; the temporary file is removed when the [`Output`] is dropped.
//!
//! When several files belong together (image and PDB), all temporaries are written before the
//! first one is persisted, and every destination is copied aside before it is replaced. If a later
//! rename fails, the destinations already replaced are restored from those copies, so a failed
//! write never leaves a new image next to an old PDB.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::{Error, Result};

/// A fully written temporary file waiting to replace its destination.
#[derive(Debug)]
pub struct Output {
    path: PathBuf,
    temp: NamedTempFile,
}

impl Output {
    /// Write `data` to a temporary file next to `path`.
    ///
    /// The temporary file takes over the permissions of an existing destination.
    ///
    /// # Errors
    /// Returns [`Error::WriteFailed`] if the temporary file cannot be created or written.
    pub fn create(path: &Path, data: &[u8]) -> Result<Output> {
        let failed = |source| Error::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let mut temp = NamedTempFile::new_in(directory_of(path)).map_err(failed)?;
        temp.write_all(data).map_err(failed)?;
        temp.as_file().sync_all().map_err(failed)?;

        if let Ok(metadata) = std::fs::metadata(path) {
            temp.as_file()
                .set_permissions(metadata.permissions())
                .map_err(failed)?;
        }

        Ok(Output {
            path: path.to_path_buf(),
            temp,
        })
    }

    /// Destination of this output.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the temporary file over the destination.
    ///
    /// # Errors
    /// Returns [`Error::WriteFailed`] if the rename fails; the temporary file is removed.
    pub fn finalize(self) -> Result<()> {
        let Output { path, temp } = self;
        match temp.persist(&path) {
            Ok(_) => Ok(()),
            Err(error) => Err(Error::WriteFailed {
                path,
                source: error.error,
            }),
        }
    }
}

/// The previous content of a destination, kept until every output of a group is in place.
#[derive(Debug)]
struct Backup {
    path: PathBuf,
    original: Option<NamedTempFile>,
}

impl Backup {
    /// Copy the current content of `path` aside. A missing destination has nothing to keep.
    fn take(path: &Path) -> Result<Backup> {
        let failed = |source| Error::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let original = if path.is_file() {
            let temp = NamedTempFile::new_in(directory_of(path)).map_err(failed)?;
            std::fs::copy(path, temp.path()).map_err(failed)?;
            Some(temp)
        } else {
            None
        };

        Ok(Backup {
            path: path.to_path_buf(),
            original,
        })
    }

    /// Put the kept content back, or remove a destination that did not exist before.
    fn restore(self) -> Result<()> {
        let Backup { path, original } = self;
        let restored = match original {
            Some(temp) => temp.persist(&path).map(|_| ()).map_err(|error| error.error),
            None => std::fs::remove_file(&path),
        };
        restored.map_err(|source| Error::WriteFailed { path, source })
    }
}

fn directory_of(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Replace every `(path, data)` pair as a group.
///
/// All temporaries are written before any destination is touched. If replacing a destination
/// fails, the ones replaced before it get their previous content back.
///
/// # Errors
/// Returns [`Error::WriteFailed`] for the first output that could not be written or renamed.
pub fn write_all(outputs: &[(&Path, &[u8])]) -> Result<()> {
    let prepared = outputs
        .iter()
        .map(|(path, data)| Output::create(path, data))
        .collect::<Result<Vec<_>>>()?;

    let mut replaced: Vec<Backup> = Vec::with_capacity(prepared.len());
    for output in prepared {
        log::debug!("Replacing {}", output.path().display());
        let step = Backup::take(output.path()).and_then(|backup| {
            output.finalize()?;
            Ok(backup)
        });

        match step {
            Ok(backup) => replaced.push(backup),
            Err(error) => {
                for backup in replaced.into_iter().rev() {
                    let path = backup.path.clone();
                    match backup.restore() {
                        Ok(()) => log::warn!("Restored {}", path.display()),
                        Err(restore) => log::error!("{restore}"),
                    }
                }
                return Err(error);
            }
        }
    }
    Ok(())
}

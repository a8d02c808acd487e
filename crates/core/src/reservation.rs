//! Output name reservations.
//!
//! Stages that write into a shared output folder claim their final names
//! before doing any work, so concurrent workers never pick the same name.
//! A [`Reservation`] is either committed once its content is in place, or
//! rolled back, which deletes the placeholder file and folder. Dropping an
//! uncommitted reservation rolls it back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::Result;
use crate::article::Article;
use crate::unique::{is_dir_empty, sanitize_file_name, unique_file, unique_file_and_folder, unique_folder};

/// A claimed output file and/or folder.
#[derive(Debug)]
pub struct Reservation {
    base_name: String,
    file: Option<PathBuf>,
    folder: Option<PathBuf>,
    committed: bool,
}

impl Reservation {
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn file_name(&self) -> Option<String> {
        file_name_of(self.file.as_deref())
    }

    pub fn folder_name(&self) -> Option<String> {
        file_name_of(self.folder.as_deref())
    }

    /// Keeps whatever is now at the reserved paths.
    pub fn commit(mut self) {
        self.committed = true;
    }

    /// Deletes the reserved file and folder.
    pub fn rollback(mut self) {
        self.cleanup();
        self.committed = true;
    }

    fn cleanup(&mut self) {
        if let Some(file) = &self.file {
            let _ = fs::remove_file(file);
        }
        if let Some(folder) = &self.folder {
            let _ = fs::remove_dir_all(folder);
        }
        tracing::trace!(base_name = %self.base_name, "Released reservation");
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.cleanup();
        }
    }
}

fn file_name_of(path: Option<&Path>) -> Option<String> {
    path.and_then(Path::file_name).map(|n| n.to_string_lossy().into_owned())
}

/// Output folder handing out reservations and receiving finished files.
#[derive(Debug, Clone)]
pub struct SaveTarget {
    base_folder: PathBuf,
}

impl SaveTarget {
    /// Creates `base_folder` if needed.
    pub fn new(base_folder: impl Into<PathBuf>) -> Result<Self> {
        let base_folder = base_folder.into();
        fs::create_dir_all(&base_folder)?;
        let base_folder = base_folder.canonicalize()?;
        Ok(Self { base_folder })
    }

    pub fn base_folder(&self) -> &Path {
        &self.base_folder
    }

    /// Reserves names derived from the article title.
    pub fn reserve_for(
        &self, article: &dyn Article, file_suffix: Option<&str>, folder_suffix: Option<&str>,
    ) -> Result<Reservation> {
        self.reserve(&sanitize_file_name(article.title(), "document"), file_suffix, folder_suffix)
    }

    /// Reserves `base_name + file_suffix` and/or `base_name + folder_suffix`
    /// under one shared, unique base name.
    pub fn reserve(
        &self, base_name: &str, file_suffix: Option<&str>, folder_suffix: Option<&str>,
    ) -> Result<Reservation> {
        let claimed = match (file_suffix, folder_suffix) {
            (Some(file), Some(folder)) => unique_file_and_folder(&self.base_folder, base_name, file, folder)?,
            (Some(file), None) => unique_file(&self.base_folder, base_name, file)?,
            (None, folder) => unique_folder(&self.base_folder, base_name, folder.unwrap_or_default())?,
        };
        Ok(Reservation { base_name: claimed.base_name, file: claimed.file, folder: claimed.folder, committed: false })
    }

    /// Moves finished output into the reservation and commits it.
    ///
    /// A missing `from_file` removes the reserved file; a missing or empty
    /// `from_folder` removes the reserved folder. On error the reservation is
    /// rolled back.
    pub fn deliver(&self, reservation: Reservation, from_file: Option<&Path>, from_folder: Option<&Path>) -> Result<()> {
        match from_file {
            Some(src) => {
                let Some(dest) = reservation.file() else {
                    return Err(io::Error::other("no target file reserved").into());
                };
                tracing::debug!(path = %dest.display(), "Saving");
                move_file(src, dest)?;
            }
            None => {
                if let Some(dest) = reservation.file() {
                    fs::remove_file(dest)?;
                }
            }
        }

        match from_folder.filter(|f| !is_dir_empty(f)) {
            Some(src) => {
                let Some(dest) = reservation.folder() else {
                    return Err(io::Error::other("no target folder reserved").into());
                };
                copy_dir_all(src, dest)?;
            }
            None => {
                if let Some(dest) = reservation.folder() {
                    let _ = fs::remove_dir_all(dest);
                }
            }
        }

        reservation.commit();
        Ok(())
    }
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    fs::copy(src, dest)?;
    fs::remove_file(src)
}

pub(crate) fn copy_dir_all(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

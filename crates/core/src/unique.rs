//! Collision-free file and folder names.
//!
//! A name is claimed by creating the file (or folder) on disk, so two workers
//! can never be handed the same path. When `prefix + suffix` is taken, a
//! zero-padded counter is appended: `photo.png`, `photo_001.png`,
//! `photo_002.png`, and so on. The lowercase spelling is checked as well so
//! names stay unique on case-insensitive filesystems.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Longest file-name stem produced by [`sanitize_file_name`].
pub const MAX_NAME_LEN: usize = 200;

/// A claimed name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueName {
    /// Name without suffixes (`photo_001`).
    pub base_name: String,
    pub file: Option<PathBuf>,
    pub folder: Option<PathBuf>,
}

fn candidate(prefix: &str, num: usize) -> String {
    if num == 0 { prefix.to_string() } else { format!("{prefix}_{num:03}") }
}

fn taken(folder: &Path, name: &str, suffix: &str) -> bool {
    folder.join(format!("{name}{suffix}")).exists() || folder.join(format!("{}{suffix}", name.to_lowercase())).exists()
}

fn try_create_file(path: &Path) -> io::Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

fn try_create_dir(path: &Path) -> io::Result<bool> {
    match fs::create_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Creates an empty file `base_folder/prefix[_NNN]suffix`.
pub fn unique_file(base_folder: &Path, prefix: &str, suffix: &str) -> io::Result<UniqueName> {
    fs::create_dir_all(base_folder)?;
    for num in 0.. {
        let name = candidate(prefix, num);
        if taken(base_folder, &name, suffix) {
            continue;
        }
        let file = base_folder.join(format!("{name}{suffix}"));
        if try_create_file(&file)? {
            return Ok(UniqueName { base_name: name, file: Some(file), folder: None });
        }
    }
    unreachable!("unbounded counter")
}

/// Creates an empty folder `base_folder/prefix[_NNN]suffix`.
pub fn unique_folder(base_folder: &Path, prefix: &str, suffix: &str) -> io::Result<UniqueName> {
    fs::create_dir_all(base_folder)?;
    for num in 0.. {
        let name = candidate(prefix, num);
        if taken(base_folder, &name, suffix) {
            continue;
        }
        let folder = base_folder.join(format!("{name}{suffix}"));
        if try_create_dir(&folder)? {
            return Ok(UniqueName { base_name: name, file: None, folder: Some(folder) });
        }
    }
    unreachable!("unbounded counter")
}

/// Creates a file and a folder sharing one base name.
pub fn unique_file_and_folder(
    base_folder: &Path, prefix: &str, file_suffix: &str, folder_suffix: &str,
) -> io::Result<UniqueName> {
    fs::create_dir_all(base_folder)?;
    for num in 0.. {
        let name = candidate(prefix, num);
        if taken(base_folder, &name, file_suffix) || taken(base_folder, &name, folder_suffix) {
            continue;
        }
        let file = base_folder.join(format!("{name}{file_suffix}"));
        if !try_create_file(&file)? {
            continue;
        }
        let folder = base_folder.join(format!("{name}{folder_suffix}"));
        match try_create_dir(&folder) {
            Ok(true) => return Ok(UniqueName { base_name: name, file: Some(file), folder: Some(folder) }),
            Ok(false) => {
                let _ = fs::remove_file(&file);
            }
            Err(e) => {
                let _ = fs::remove_file(&file);
                return Err(e);
            }
        }
    }
    unreachable!("unbounded counter")
}

/// Turns arbitrary text (titles, URL path segments) into a portable file name.
///
/// Non-ASCII characters are dropped, characters that are unsafe in file names
/// become `_`, runs of whitespace collapse to one space, and the result is
/// capped at [`MAX_NAME_LEN`] bytes. Falls back to `fallback` when nothing
/// usable remains.
pub fn sanitize_file_name(text: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(text.len().min(MAX_NAME_LEN));
    let mut pending_space = false;
    for ch in text.chars() {
        if !ch.is_ascii() {
            continue;
        }
        if ch.is_ascii_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            c if c.is_ascii_control() => {}
            c => out.push(c),
        }
        if out.len() >= MAX_NAME_LEN {
            break;
        }
    }
    out.truncate(MAX_NAME_LEN);
    let trimmed = out.trim_matches(|c: char| c == '.' || c == ' ');
    if trimmed.is_empty() { fallback.to_string() } else { trimmed.to_string() }
}

/// Removes everything inside `dir`, creating it if missing.
pub fn clear_dir(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}

/// True when `dir` is missing or has no entries.
pub fn is_dir_empty(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut it| it.next().is_none()).unwrap_or(true)
}

use crate::error::{PlayerError, Result};
use crate::metadata::is_valid_media;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const PARENT_LABEL: &str = "../";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Parent,
    Directory,
    Media,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerEntry {
    pub kind: EntryKind,
    pub path: PathBuf,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// The explorer moved into another directory.
    Navigated,
    /// A playable file was picked.
    Media(PathBuf),
    /// Not a directory and not playable.
    Ignored,
}

/// Directory browser state: the current directory and its listing.
#[derive(Debug)]
pub struct Explorer {
    path: PathBuf,
    entries: Vec<ExplorerEntry>,
    notice: Option<String>,
}

impl Explorer {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut explorer = Self {
            path: path.into(),
            entries: Vec::new(),
            notice: None,
        };
        explorer.refresh();
        explorer
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ExplorerEntry] {
        &self.entries
    }

    /// Message left by the last listing failure, if any.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn refresh(&mut self) {
        let mut entries = vec![ExplorerEntry {
            kind: EntryKind::Parent,
            path: self.parent_path(),
            label: String::from(PARENT_LABEL),
        }];

        match list_directory(&self.path) {
            Ok(children) => entries.extend(children),
            Err(PlayerError::Io(err)) if err.kind() == ErrorKind::PermissionDenied => {
                self.notice = Some(String::from("Permission denied."));
            }
            Err(err) => {
                self.notice = Some(format!("Error loading directory: {err}"));
            }
        }

        self.entries = entries;
    }

    pub fn go_up(&mut self) {
        self.path = self.parent_path();
        self.refresh();
    }

    /// Acts on the entry labelled `label` in the current listing.
    pub fn activate(&mut self, label: &str) -> Activation {
        if label == PARENT_LABEL || label == ".." {
            self.go_up();
            return Activation::Navigated;
        }

        let target = self.path.join(label);
        if target.is_dir() {
            self.path = target;
            self.refresh();
            return Activation::Navigated;
        }

        if is_valid_media(&target) {
            Activation::Media(target)
        } else {
            Activation::Ignored
        }
    }

    fn parent_path(&self) -> PathBuf {
        let resolved = self
            .path
            .canonicalize()
            .unwrap_or_else(|_| self.path.clone());
        resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(resolved)
    }
}

/// Children of `dir`: directories first, then files, each group ordered by
/// case-insensitive name.
pub fn list_directory(dir: &Path) -> Result<Vec<ExplorerEntry>> {
    let mut folders = Vec::new();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let label = entry.file_name().to_string_lossy().to_string();

        if entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false) {
            folders.push(ExplorerEntry {
                kind: EntryKind::Directory,
                path,
                label,
            });
        } else {
            let kind = if is_valid_media(&path) {
                EntryKind::Media
            } else {
                EntryKind::Document
            };
            files.push(ExplorerEntry { kind, path, label });
        }
    }

    folders.sort_by_cached_key(|entry| entry.label.to_lowercase());
    files.sort_by_cached_key(|entry| entry.label.to_lowercase());
    folders.extend(files);
    Ok(folders)
}

/// Every playable file below `root`, in path order.
pub fn scan_media(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_valid_media(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

//! Bank and preset listings built from directories or command output.
//!
//! Titles replace `_` with spaces and are prefixed with `label/` when the root
//! is labeled. Indices run from 0 across all roots in order.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use zyngine_types::ListEntry;

use crate::error::{EngineError, EngineResult};

/// A directory to list, optionally labeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRoot {
    pub label: Option<String>,
    pub path: PathBuf,
}

impl ListRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            label: None,
            path: path.into(),
        }
    }

    pub fn labeled(label: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            label: Some(label.to_string()),
            path: path.into(),
        }
    }

    fn title(&self, name: &str) -> String {
        let name = name.replace('_', " ");
        match &self.label {
            Some(label) => format!("{}/{}", label, name),
            None => name,
        }
    }
}

/// Regular files whose extension matches `ext` (case-insensitive, with or
/// without the leading dot).
pub fn file_list(roots: &[ListRoot], ext: &str) -> Vec<ListEntry> {
    let suffix = format!(".{}", ext.trim_start_matches('.').to_lowercase());
    let mut entries = Vec::new();
    for root in roots {
        for (name, path) in sorted_entries(&root.path) {
            if !path.is_file() {
                continue;
            }
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(stem) = strip_suffix_ignore_case(name, &suffix) else {
                continue;
            };
            entries.push(ListEntry {
                index: entries.len(),
                title: root.title(stem),
                label: root.label.clone(),
                path,
            });
        }
    }
    entries
}

/// `name` without a trailing `suffix` (already lowercase). The stem must be
/// non-empty, and the split must fall on a char boundary of `name`.
fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if split == 0 || !name.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = name.split_at(split);
    (tail.to_lowercase() == suffix).then_some(stem)
}

/// Subdirectories, titled by their name without extension.
pub fn dir_list(roots: &[ListRoot]) -> Vec<ListEntry> {
    let mut entries = Vec::new();
    for root in roots {
        for (_, path) in sorted_entries(&root.path) {
            if !path.is_dir() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            entries.push(ListEntry {
                index: entries.len(),
                title: root.title(stem),
                label: root.label.clone(),
                path,
            });
        }
    }
    entries
}

/// One entry per non-empty output line of a shell command.
pub fn try_command_list(cmd: &str) -> EngineResult<Vec<ListEntry>> {
    let output = shell(cmd)
        .output()
        .map_err(|e| EngineError::Listing(format!("{}: {}", cmd, e)))?;
    if !output.status.success() {
        return Err(EngineError::Listing(format!("{}: {}", cmd, output.status)));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| ListEntry {
            path: PathBuf::from(line),
            index,
            title: line.replace('_', " "),
            label: None,
        })
        .collect())
}

pub fn command_list(cmd: &str) -> Vec<ListEntry> {
    try_command_list(cmd).unwrap_or_else(|e| {
        log::error!(target: "engine::listing", "{}", e);
        Vec::new()
    })
}

fn shell(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/C", cmd]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", cmd]);
        c
    }
}

/// Directory entries sorted by file name. Unreadable directories yield nothing.
fn sorted_entries(dir: &Path) -> Vec<(OsString, PathBuf)> {
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) => {
            log::warn!(target: "engine::listing", "skipping {}: {}", dir.display(), e);
            return Vec::new();
        }
    };
    let mut entries: Vec<(OsString, PathBuf)> = read
        .filter_map(Result::ok)
        .map(|e| (e.file_name(), e.path()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

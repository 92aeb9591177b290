//! Directory walk producing the list of files a run works on.

use crate::config::CompiledFilters;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Walks a root folder recursively and collects candidate files.
pub struct Scanner<'a> {
    filters: &'a CompiledFilters,
    excluded_dirs: Vec<PathBuf>,
}

impl<'a> Scanner<'a> {
    pub fn new(filters: &'a CompiledFilters) -> Self {
        Self {
            filters,
            excluded_dirs: Vec::new(),
        }
    }

    /// Never descend into `dir` (used for the audit log directory).
    pub fn exclude_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded_dirs.push(dir.into());
        self
    }

    /// Returns every included file under `root`, sorted by path.
    ///
    /// Entries that cannot be listed are logged and skipped. Symbolic links
    /// are not followed into directories; links to files (and dangling
    /// links) are returned so the probe can judge them.
    pub fn scan(&self, root: &Path) -> Vec<PathBuf> {
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| self.should_visit(root, entry));

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };

            let file_type = entry.file_type();
            let candidate = if file_type.is_file() {
                true
            } else if file_type.is_symlink() {
                // Dangling links stay in so they are reported.
                fs::metadata(entry.path()).map_or(true, |meta| !meta.is_dir())
            } else {
                false
            };

            if !candidate {
                continue;
            }

            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if self.filters.should_include(relative) {
                files.push(entry.into_path());
            } else {
                tracing::debug!(path = %relative.display(), "excluded by filters");
            }
        }

        files.sort();
        tracing::debug!(root = %root.display(), files = files.len(), "scan complete");
        files
    }

    fn should_visit(&self, root: &Path, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return true;
        }
        if self.excluded_dirs.iter().any(|dir| dir == entry.path()) {
            return false;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        self.filters.should_descend(relative)
    }
}

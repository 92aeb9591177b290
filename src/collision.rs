//! Collision-free destination paths.
//!
//! A proposed destination that is taken gets a numeric suffix before its
//! extension, `name (1).ext`, `name (2).ext` and so on. "Taken" means present
//! on disk, claimed earlier in the same pass, or occupied by a simulated move
//! from an earlier dry-run operation.

use crate::probe::split_file_name;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("no free name for {} after {attempts} attempts", .path.display())]
pub struct CollisionExhausted {
    pub path: PathBuf,
    pub attempts: u32,
}

/// Paths whose on-disk state differs from the run's view of them.
///
/// Only dry runs populate this: a simulated move leaves the source on disk and
/// the destination empty.
#[derive(Debug, Clone, Default)]
pub struct PathOverlay {
    occupied: HashSet<PathBuf>,
    vacated: HashSet<PathBuf>,
}

impl PathOverlay {
    /// Records a simulated move from `from` to `to`.
    pub fn record_move(&mut self, from: &Path, to: &Path) {
        self.occupied.remove(from);
        self.vacated.insert(from.to_path_buf());
        self.vacated.remove(to);
        self.occupied.insert(to.to_path_buf());
    }

    fn is_occupied(&self, path: &Path) -> Option<bool> {
        if self.occupied.contains(path) {
            Some(true)
        } else if self.vacated.contains(path) {
            Some(false)
        } else {
            None
        }
    }
}

/// Resolves destinations for one operation pass.
#[derive(Debug)]
pub struct CollisionResolver<'a> {
    claimed: HashSet<PathBuf>,
    max_attempts: u32,
    overlay: &'a PathOverlay,
}

impl<'a> CollisionResolver<'a> {
    pub fn new(max_attempts: u32, overlay: &'a PathOverlay) -> Self {
        Self {
            claimed: HashSet::new(),
            max_attempts,
            overlay,
        }
    }

    /// Returns a free destination for `proposed` and claims it.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionExhausted`] when the proposal and every numbered
    /// alternative up to the attempt limit are taken.
    pub fn resolve(&mut self, proposed: &Path) -> Result<PathBuf, CollisionExhausted> {
        if !self.is_taken(proposed) {
            self.claimed.insert(proposed.to_path_buf());
            return Ok(proposed.to_path_buf());
        }

        let name = proposed
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (stem, extension) = split_file_name(&name);
        let parent = proposed.parent().unwrap_or(Path::new(""));

        for n in 1..=self.max_attempts {
            let candidate = match extension {
                Some(ext) => parent.join(format!("{stem} ({n}).{ext}")),
                None => parent.join(format!("{stem} ({n})")),
            };
            if !self.is_taken(&candidate) {
                tracing::debug!(
                    proposed = %proposed.display(),
                    resolved = %candidate.display(),
                    "destination taken, using numbered name"
                );
                self.claimed.insert(candidate.clone());
                return Ok(candidate);
            }
        }

        Err(CollisionExhausted {
            path: proposed.to_path_buf(),
            attempts: self.max_attempts,
        })
    }

    fn is_taken(&self, path: &Path) -> bool {
        if self.claimed.contains(path) {
            return true;
        }
        self.overlay
            .is_occupied(path)
            .unwrap_or_else(|| fs::symlink_metadata(path).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_free_path_is_returned_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let overlay = PathOverlay::default();
        let mut resolver = CollisionResolver::new(10, &overlay);

        let proposed = temp_dir.path().join("a.txt");
        assert_eq!(resolver.resolve(&proposed).unwrap(), proposed);
    }

    #[test]
    fn test_existing_file_gets_suffix_before_extension() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "x").unwrap();
        fs::write(temp_dir.path().join("a (1).txt"), "x").unwrap();
        let overlay = PathOverlay::default();
        let mut resolver = CollisionResolver::new(10, &overlay);

        assert_eq!(
            resolver.resolve(&temp_dir.path().join("a.txt")).unwrap(),
            temp_dir.path().join("a (2).txt")
        );
    }

    #[test]
    fn test_claims_within_a_pass() {
        let temp_dir = TempDir::new().unwrap();
        let overlay = PathOverlay::default();
        let mut resolver = CollisionResolver::new(10, &overlay);
        let proposed = temp_dir.path().join("README");

        let first = resolver.resolve(&proposed).unwrap();
        let second = resolver.resolve(&proposed).unwrap();
        let third = resolver.resolve(&proposed).unwrap();
        assert_eq!(first, proposed);
        assert_eq!(second, temp_dir.path().join("README (1)"));
        assert_eq!(third, temp_dir.path().join("README (2)"));
    }

    #[test]
    fn test_overlay_overrides_disk() {
        let temp_dir = TempDir::new().unwrap();
        let moved_away = temp_dir.path().join("old.txt");
        fs::write(&moved_away, "x").unwrap();
        let simulated = temp_dir.path().join("2020").join("new.txt");

        let mut overlay = PathOverlay::default();
        overlay.record_move(&moved_away, &simulated);
        let mut resolver = CollisionResolver::new(10, &overlay);

        assert_eq!(resolver.resolve(&moved_away).unwrap(), moved_away);
        assert_eq!(
            resolver.resolve(&simulated).unwrap(),
            temp_dir.path().join("2020").join("new (1).txt")
        );
    }

    #[test]
    fn test_exhaustion() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "x").unwrap();
        fs::write(temp_dir.path().join("a (1).txt"), "x").unwrap();
        let overlay = PathOverlay::default();
        let mut resolver = CollisionResolver::new(1, &overlay);

        let err = resolver.resolve(&temp_dir.path().join("a.txt")).unwrap_err();
        assert_eq!(err.attempts, 1);
    }
}

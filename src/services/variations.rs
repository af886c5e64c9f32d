//! Index of existing destination-tree folders
//!
//! Library folders drift over time: case changes, punctuation differences,
//! a year added or dropped. Before minting a new canonical folder the
//! pipeline checks whether a plausible variation of it already exists, so
//! re-runs and re-releases land in the same place.
//!
//! The index is a snapshot taken once per run. Folders created while the
//! run is in flight are not visible to it; only collisions against
//! pre-existing entries are detected.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::text_utils::{extract_year, normalize_query};

/// Case-folded comparison key for destination folder names.
fn comparison_key(name: &str) -> String {
    normalize_query(name).to_lowercase()
}

/// Partial matches are only considered when the normalized names differ in
/// length by less than this many characters.
const PARTIAL_LENGTH_SLACK: usize = 5;

/// One directory already present under the destination root.
#[derive(Debug, Clone)]
struct DestinationEntry {
    name: String,
    normalized: String,
    year: Option<u16>,
}

/// Snapshot of every directory under the destination root.
#[derive(Debug, Default)]
pub struct VariationIndex {
    entries: Vec<DestinationEntry>,
    dirs: HashSet<PathBuf>,
}

impl VariationIndex {
    /// Walk the destination tree once and pre-compute the comparison keys.
    pub fn build(dest_root: &Path) -> Self {
        let mut entries = Vec::new();
        let mut dirs = HashSet::new();

        for entry in WalkDir::new(dest_root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            let name = entry.file_name().to_string_lossy().to_string();
            dirs.insert(entry.path().to_path_buf());
            if entry.depth() == 0 {
                continue;
            }
            entries.push(DestinationEntry {
                normalized: comparison_key(&name),
                year: extract_year(&name),
                name,
            });
        }

        debug!(folders = entries.len(), "Built destination variation index");
        Self { entries, dirs }
    }

    /// Find an existing folder that plausibly represents the same title.
    ///
    /// An exact normalized match (with agreeing or absent years) wins
    /// immediately. Otherwise partial matches (one name containing the
    /// other, lengths within a small slack) are ranked by
    /// `(name length, year mismatch)`: the shortest plausible name wins,
    /// and among equally short names the year-matched one.
    pub fn find_variation(&self, name: &str, year: Option<u16>) -> Option<String> {
        let normalized = comparison_key(name);
        debug!(name = name, year = ?year, "Checking existing variations");

        let mut partial_matches: Vec<&DestinationEntry> = Vec::new();

        for entry in &self.entries {
            if normalized == entry.normalized
                && (entry.year == year || year.is_none() || entry.year.is_none())
            {
                debug!(existing = %entry.name, "Found exact matching variation");
                return Some(entry.name.clone());
            }

            if (entry.normalized.contains(&normalized) || normalized.contains(&entry.normalized))
                && normalized.len().abs_diff(entry.normalized.len()) < PARTIAL_LENGTH_SLACK
            {
                partial_matches.push(entry);
            }
        }

        let closest = partial_matches
            .into_iter()
            .min_by_key(|entry| (entry.name.len(), entry.year != year))?;
        debug!(existing = %closest.name, "Found closest matching variation");
        Some(closest.name.clone())
    }

    /// Whether a directory existed under the destination root when the
    /// snapshot was taken.
    pub fn dir_exists(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }
}

//! Destination path resolution
//!
//! Combines the classifier's verdict, the metadata resolution, and the
//! variation index into a final destination path: resolution-tier bucket,
//! canonical folder, optional season or Extras folder, and (in rename
//! mode) a recomputed file name.

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use super::file_utils::{extension_suffix, sanitize_for_filename};
use super::filename_parser::{Classification, MediaKind, ParsedResolution, format_identifier,
    parse_resolution};
use super::resolver::ResolutionResult;
use super::tmdb::MetadataSearch;
use super::variations::VariationIndex;

/// Top-level folder every organized path lives under.
pub const LIBRARY_ROOT: &str = "CineSync";

/// Per-run organization toggles.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizeSettings {
    /// Recompute destination file names from canonical titles
    pub rename_enabled: bool,
    /// Group movies under provider-reported collections
    pub collection_enabled: bool,
    /// Drop Extras items entirely instead of placing them
    pub skip_extras: bool,
    /// Keep `{tmdb-…}`-style tags in folder names
    pub folder_ids_enabled: bool,
}

/// One row of the tier table: first predicate to match decides the bucket.
pub struct TierRule {
    pub name: &'static str,
    pub matches: fn(&ParsedResolution) -> bool,
}

fn has_uhd_marker(r: &ParsedResolution) -> bool {
    matches!(r.resolution.as_deref(), Some("2160p" | "4k" | "2160"))
}

fn has_fhd_marker(r: &ParsedResolution) -> bool {
    matches!(r.resolution.as_deref(), Some("1080p" | "1080"))
}

fn remux_uhd(r: &ParsedResolution) -> bool {
    r.is_remux && has_uhd_marker(r)
}

fn remux_fhd(r: &ParsedResolution) -> bool {
    r.is_remux && has_fhd_marker(r)
}

fn any_remux(r: &ParsedResolution) -> bool {
    r.is_remux
}

fn uhd(r: &ParsedResolution) -> bool {
    has_uhd_marker(r)
}

fn fhd(r: &ParsedResolution) -> bool {
    has_fhd_marker(r)
}

fn hd720(r: &ParsedResolution) -> bool {
    matches!(r.resolution.as_deref(), Some("720p"))
}

fn sd480(r: &ParsedResolution) -> bool {
    matches!(r.resolution.as_deref(), Some("480p"))
}

fn dvd(r: &ParsedResolution) -> bool {
    matches!(r.resolution.as_deref(), Some("dvd"))
}

/// Tier table for shows. Remux rules take priority over the generic
/// resolution rules; evaluation order is part of the contract.
pub const SHOW_TIERS: &[TierRule] = &[
    TierRule { name: "UltraHDRemuxShows", matches: remux_uhd },
    TierRule { name: "1080pRemuxLibrary", matches: remux_fhd },
    TierRule { name: "RemuxShows", matches: any_remux },
    TierRule { name: "UltraHD", matches: uhd },
    TierRule { name: "FullHD", matches: fhd },
    TierRule { name: "SDClassics", matches: hd720 },
    TierRule { name: "Retro480p", matches: sd480 },
    TierRule { name: "RetroDVD", matches: dvd },
];

pub const SHOW_TIER_DEFAULT: &str = "Shows";

/// Tier table for movies, same shape as [`SHOW_TIERS`].
pub const MOVIE_TIERS: &[TierRule] = &[
    TierRule { name: "4KRemux", matches: remux_uhd },
    TierRule { name: "1080pRemux", matches: remux_fhd },
    TierRule { name: "MoviesRemux", matches: any_remux },
    TierRule { name: "UltraHD", matches: uhd },
    TierRule { name: "FullHD", matches: fhd },
    TierRule { name: "SDMovies", matches: hd720 },
    TierRule { name: "Retro480p", matches: sd480 },
    TierRule { name: "DVDClassics", matches: dvd },
];

pub const MOVIE_TIER_DEFAULT: &str = "Movies";

/// Bucket a filename into a resolution tier using an ordered rule table.
pub fn resolution_tier(file_name: &str, tiers: &[TierRule], default: &'static str) -> &'static str {
    let parsed = parse_resolution(file_name);
    tiers
        .iter()
        .find(|rule| (rule.matches)(&parsed))
        .map(|rule| rule.name)
        .unwrap_or(default)
}

/// A fully resolved destination, kept structured for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPath {
    pub root: PathBuf,
    /// "Movies" or "Shows"
    pub media_class: &'static str,
    /// Resolution tier, "Movie Collections", or "Extras"
    pub tier: String,
    pub collection_folder: Option<String>,
    pub folder: String,
    /// "Season N" or "Extras"
    pub season_folder: Option<String>,
    pub file_name: String,
}

impl DestinationPath {
    pub fn to_path(&self) -> PathBuf {
        let mut path = self
            .root
            .join(LIBRARY_ROOT)
            .join(self.media_class)
            .join(&self.tier);
        if let Some(collection) = &self.collection_folder {
            path = path.join(collection);
        }
        path = path.join(&self.folder);
        if let Some(season) = &self.season_folder {
            path = path.join(season);
        }
        path.join(&self.file_name)
    }
}

static TAG_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" \{(?:imdb|tvdb|tmdb)-[^}]*\}$").unwrap());
static REPEATED_DASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").unwrap());

/// Strip a trailing metadata tag from a canonical name.
fn strip_folder_tag(name: &str) -> String {
    TAG_SUFFIX_RE.replace(name, "").to_string()
}

fn collapse_dashes(name: &str) -> String {
    REPEATED_DASH_RE
        .replace_all(name, "-")
        .trim_matches('-')
        .to_string()
}

/// Resolves final destination paths for classified, resolved items.
pub struct PathResolver {
    dest_root: PathBuf,
    settings: OrganizeSettings,
    index: Arc<VariationIndex>,
    metadata: Arc<dyn MetadataSearch>,
}

impl PathResolver {
    pub fn new(
        dest_root: PathBuf,
        settings: OrganizeSettings,
        index: Arc<VariationIndex>,
        metadata: Arc<dyn MetadataSearch>,
    ) -> Self {
        Self {
            dest_root,
            settings,
            index,
            metadata,
        }
    }

    /// Compute where a file belongs. `None` means the file is deliberately
    /// skipped (an Extras item with extras suppressed).
    pub async fn resolve_path(
        &self,
        classification: &Classification,
        resolution: &ResolutionResult,
        file_name: &str,
    ) -> Option<DestinationPath> {
        match &classification.kind {
            MediaKind::Movie { year, .. } => {
                self.resolve_movie_path(resolution, *year, file_name).await
            }
            MediaKind::Episode {
                show_hint,
                season,
                episode,
                identifier,
                year,
            } => {
                self.resolve_show_path(
                    resolution,
                    show_hint,
                    *season,
                    *episode,
                    identifier.as_deref(),
                    *year,
                    classification.is_extra,
                    file_name,
                )
                .await
            }
        }
    }

    async fn resolve_movie_path(
        &self,
        resolution: &ResolutionResult,
        classified_year: Option<u16>,
        file_name: &str,
    ) -> Option<DestinationPath> {
        let (display_name, year) = match resolution {
            ResolutionResult::Resolved {
                canonical_name,
                year,
                ..
            } => (canonical_name.clone(), year.or(classified_year)),
            ResolutionResult::Unresolved { original_query } => {
                (original_query.clone(), classified_year)
            }
        };

        let mut movie_folder = if self.settings.folder_ids_enabled {
            display_name.clone()
        } else {
            strip_folder_tag(&display_name)
        };
        movie_folder = append_year(&movie_folder, year);
        movie_folder = sanitize_for_filename(&movie_folder);

        let collection = self.movie_collection(resolution).await;

        let (tier, collection_folder, folder) = match collection {
            Some(collection) => {
                let mut collection_folder =
                    sanitize_for_filename(&format!("{} {{tmdb-{}}}", collection.name, collection.id));
                if let Some(existing) = self.index.find_variation(&collection_folder, None) {
                    info!(collection = %collection_folder, existing = %existing,
                        "Using existing collection folder variation");
                    collection_folder = existing;
                }
                ("Movie Collections".to_string(), Some(collection_folder), movie_folder)
            }
            None => {
                let mut folder = movie_folder;
                if let Some(existing) = self.index.find_variation(&folder, year) {
                    info!(folder = %folder, existing = %existing,
                        "Using existing movie folder variation");
                    folder = existing;
                }
                let tier = resolution_tier(file_name, MOVIE_TIERS, MOVIE_TIER_DEFAULT);
                (tier.to_string(), None, folder)
            }
        };

        let out_name = if self.settings.rename_enabled {
            let renamed = format!(
                "{}{}",
                append_year(&display_name, year),
                extension_suffix(file_name)
            );
            info!(from = file_name, to = %renamed, "Renaming movie file");
            sanitize_for_filename(&renamed)
        } else {
            file_name.to_string()
        };

        Some(DestinationPath {
            root: self.dest_root.clone(),
            media_class: "Movies",
            tier,
            collection_folder,
            folder,
            season_folder: None,
            file_name: out_name,
        })
    }

    async fn movie_collection(
        &self,
        resolution: &ResolutionResult,
    ) -> Option<super::tmdb::CollectionRef> {
        if !self.settings.collection_enabled {
            return None;
        }
        let ResolutionResult::Resolved { provider_id, .. } = resolution else {
            return None;
        };
        match self.metadata.movie_collection(*provider_id).await {
            Ok(Some(collection)) => {
                info!(collection = %collection.name, "Movie belongs to a collection");
                Some(collection)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to fetch collection info");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_show_path(
        &self,
        resolution: &ResolutionResult,
        show_hint: &str,
        season: u32,
        episode: Option<u32>,
        identifier: Option<&str>,
        classified_year: Option<u16>,
        is_extra: bool,
        file_name: &str,
    ) -> Option<DestinationPath> {
        let (display_name, year) = match resolution {
            ResolutionResult::Resolved {
                canonical_name,
                year,
                ..
            } => (canonical_name.clone(), year.or(classified_year)),
            ResolutionResult::Unresolved { original_query } => {
                (original_query.clone(), classified_year)
            }
        };

        let mut show_folder = if self.settings.folder_ids_enabled {
            display_name
        } else {
            strip_folder_tag(&display_name)
        };
        show_folder = append_year(&show_folder, year);
        show_folder = sanitize_for_filename(&show_folder);

        if is_extra {
            if self.settings.skip_extras {
                info!(file = file_name, "Skipping extras file, extras folder is disabled");
                return None;
            }
            // Extras attach to the show's existing folder when one exists
            // under any tier, instead of opening a parallel Extras tree.
            let tier = self
                .find_existing_show_tier(&show_folder)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "Extras".to_string());
            return Some(DestinationPath {
                root: self.dest_root.clone(),
                media_class: "Shows",
                tier,
                collection_folder: None,
                folder: show_folder,
                season_folder: Some("Extras".to_string()),
                file_name: file_name.to_string(),
            });
        }

        let tier = resolution_tier(file_name, SHOW_TIERS, SHOW_TIER_DEFAULT);
        let season_folder = format!("Season {}", season);

        let out_name = match (self.settings.rename_enabled, episode, resolution) {
            (true, Some(episode), ResolutionResult::Resolved { provider_id, .. }) => {
                let fallback = identifier
                    .map(str::to_string)
                    .unwrap_or_else(|| format_identifier(season, episode));
                self.renamed_episode(show_hint, *provider_id, season, episode, &fallback, file_name)
                    .await
            }
            _ => file_name.to_string(),
        };

        Some(DestinationPath {
            root: self.dest_root.clone(),
            media_class: "Shows",
            tier: tier.to_string(),
            collection_folder: None,
            folder: show_folder,
            season_folder: Some(season_folder),
            file_name: out_name,
        })
    }

    fn find_existing_show_tier(&self, show_folder: &str) -> Option<&'static str> {
        SHOW_TIERS
            .iter()
            .map(|rule| rule.name)
            .chain(std::iter::once(SHOW_TIER_DEFAULT))
            .find(|tier| {
                let path = self
                    .dest_root
                    .join(LIBRARY_ROOT)
                    .join("Shows")
                    .join(tier)
                    .join(show_folder);
                self.index.dir_exists(&path)
            })
    }

    /// Compute the renamed episode file name, fetching the episode title
    /// from the provider. An absolute episode number past the end of the
    /// season is remapped once via `((n - 1) mod total) + 1`.
    async fn renamed_episode(
        &self,
        show: &str,
        show_id: u64,
        season: u32,
        episode: u32,
        identifier: &str,
        file_name: &str,
    ) -> String {
        let ext = extension_suffix(file_name);

        let renamed = match self.episode_title(show_id, season, episode).await {
            Some((effective_episode, title)) => {
                let name = format!(
                    "{} - {} - {}{}",
                    show,
                    format_identifier(season, effective_episode),
                    title,
                    ext
                );
                info!(from = file_name, to = %name, "Renaming episode file");
                name
            }
            None => {
                let name = format!("{} - {}{}", show, identifier, ext);
                warn!(from = file_name, to = %name, "Episode name not found, renaming without title");
                name
            }
        };

        sanitize_for_filename(&collapse_dashes(&renamed))
    }

    async fn episode_title(
        &self,
        show_id: u64,
        season: u32,
        episode: u32,
    ) -> Option<(u32, String)> {
        match self.metadata.episode_name(show_id, season, episode).await {
            Ok(Some(title)) => return Some((episode, title)),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Failed to fetch episode name");
                return None;
            }
        }

        // The provider has no such episode; treat the number as absolute
        // and remap it into the season's actual episode count.
        let total = match self.metadata.season_episode_count(show_id, season).await {
            Ok(Some(total)) if total > 0 => total as u32,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to fetch season episode count");
                return None;
            }
        };
        if episode <= total {
            return None;
        }

        let mapped = ((episode - 1) % total) + 1;
        debug!(
            episode,
            total, mapped, "Absolute episode exceeds season length, remapped"
        );
        match self.metadata.episode_name(show_id, season, mapped).await {
            Ok(Some(title)) => Some((mapped, title)),
            _ => None,
        }
    }
}

/// Append `(YYYY)` to a folder name unless it already carries it.
fn append_year(name: &str, year: Option<u16>) -> String {
    match year {
        Some(y) if !name.contains(&format!("({y})")) => format!("{name} ({y})"),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_table_show_buckets() {
        assert_eq!(
            resolution_tier("Show.S01E01.2160p.Remux.mkv", SHOW_TIERS, SHOW_TIER_DEFAULT),
            "UltraHDRemuxShows"
        );
        assert_eq!(
            resolution_tier("Show.S01E01.1080p.REMUX.mkv", SHOW_TIERS, SHOW_TIER_DEFAULT),
            "1080pRemuxLibrary"
        );
        assert_eq!(
            resolution_tier("Show.S01E01.Remux.mkv", SHOW_TIERS, SHOW_TIER_DEFAULT),
            "RemuxShows"
        );
        assert_eq!(
            resolution_tier("Show.S01E01.1080p.mkv", SHOW_TIERS, SHOW_TIER_DEFAULT),
            "FullHD"
        );
        assert_eq!(
            resolution_tier("Show.S01E01.720p.mkv", SHOW_TIERS, SHOW_TIER_DEFAULT),
            "SDClassics"
        );
        assert_eq!(
            resolution_tier("Show.S01E01.mkv", SHOW_TIERS, SHOW_TIER_DEFAULT),
            "Shows"
        );
    }

    #[test]
    fn test_tier_table_movie_buckets() {
        assert_eq!(
            resolution_tier("Movie.4K.Remux.mkv", MOVIE_TIERS, MOVIE_TIER_DEFAULT),
            "4KRemux"
        );
        assert_eq!(
            resolution_tier("Movie.2160p.mkv", MOVIE_TIERS, MOVIE_TIER_DEFAULT),
            "UltraHD"
        );
        assert_eq!(
            resolution_tier("Movie.DVD.mkv", MOVIE_TIERS, MOVIE_TIER_DEFAULT),
            "DVDClassics"
        );
        assert_eq!(
            resolution_tier("Movie.mkv", MOVIE_TIERS, MOVIE_TIER_DEFAULT),
            "Movies"
        );
    }

    #[test]
    fn test_remux_rules_take_priority() {
        // A 2160p remux must not land in the plain UltraHD tier.
        let names: Vec<&str> = SHOW_TIERS.iter().map(|r| r.name).collect();
        assert!(
            names.iter().position(|n| *n == "RemuxShows").unwrap()
                < names.iter().position(|n| *n == "UltraHD").unwrap()
        );
    }

    #[test]
    fn test_strip_folder_tag() {
        assert_eq!(strip_folder_tag("Show (2021) {tmdb-555}"), "Show (2021)");
        assert_eq!(strip_folder_tag("Show (2021) {imdb-tt001}"), "Show (2021)");
        assert_eq!(strip_folder_tag("Show (2021)"), "Show (2021)");
    }

    #[test]
    fn test_append_year() {
        assert_eq!(append_year("Show", Some(2021)), "Show (2021)");
        assert_eq!(append_year("Show (2021)", Some(2021)), "Show (2021)");
        assert_eq!(
            append_year("Show (2021) {tmdb-5}", Some(2021)),
            "Show (2021) {tmdb-5}"
        );
        assert_eq!(append_year("Show", None), "Show");
    }

    #[test]
    fn test_collapse_dashes() {
        assert_eq!(collapse_dashes("Show - S01E01 --- .mkv"), "Show - S01E01 - .mkv");
        assert_eq!(collapse_dashes("--Show-"), "Show");
    }

    #[test]
    fn test_destination_path_composition() {
        let dest = DestinationPath {
            root: PathBuf::from("/library"),
            media_class: "Shows",
            tier: "FullHD".to_string(),
            collection_folder: None,
            folder: "Some Show (2021) {tmdb-555}".to_string(),
            season_folder: Some("Season 1".to_string()),
            file_name: "Some Show - S01E02 - Pilot Part 2.mkv".to_string(),
        };
        assert_eq!(
            dest.to_path(),
            PathBuf::from(
                "/library/CineSync/Shows/FullHD/Some Show (2021) {tmdb-555}/Season 1/Some Show - S01E02 - Pilot Part 2.mkv"
            )
        );
    }
}

//! Classification of raw media file names
//!
//! Decides whether a file is a TV episode or a movie, and pulls out the
//! season/episode identifier, a show or movie name hint, and the year.
//! Patterns are evaluated in a fixed priority order:
//! - "Show.Name.S02E05.mkv"
//! - "Show Name 3x05.mkv"
//! - "Show.Name.S0215.mkv" / "Show.Name.02e15.mkv"
//! - "Show Name Ep 12.mkv" (season recovered from the parent folder)

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::text_utils::{self, clean_query};

/// What a raw file was classified as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaKind {
    Movie {
        /// Name extracted from the parent folder, if any
        title_hint: Option<String>,
        year: Option<u16>,
    },
    Episode {
        /// Show name hint from the filename or parent folder
        show_hint: String,
        /// Always positive; defaults to 1 when unknown
        season: u32,
        /// Episode number within the season, when determined
        episode: Option<u32>,
        /// Normalized `SxxEyy` identifier; absent for bonus content
        /// discovered through directory-level signals only
        identifier: Option<String>,
        year: Option<u16>,
    },
}

/// Classifier output: the kind plus the extras placement flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: MediaKind,
    /// Bonus/non-numbered content that belongs in an Extras folder
    pub is_extra: bool,
}

/// Episode identifier shapes, in match priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePattern {
    /// `S02E05`
    SeasonEpisode,
    /// `3x05`
    SeasonXEpisode,
    /// `S0215` (season digits then episode digits)
    CompactSeason,
    /// `02e15`
    CompactEpisode,
    /// `Ep 12` / `EP. 12`; season recovered from the parent folder
    EpNumber,
}

/// The ordered pattern table. First match wins; reordering entries changes
/// classification behavior, so the order is part of the contract.
pub static EPISODE_PATTERNS: Lazy<Vec<(Regex, EpisodePattern)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(?i)^(.*?)[\s._-]*\bS(\d{2})E(\d{2,3})\b").unwrap(),
            EpisodePattern::SeasonEpisode,
        ),
        (
            Regex::new(r"(?i)^(.*?)[\s._-]*\b(\d{1,2})x(\d{2})\b").unwrap(),
            EpisodePattern::SeasonXEpisode,
        ),
        (
            Regex::new(r"(?i)^(.*?)[\s._-]*\bS(\d{2})(\d{1,3})\b").unwrap(),
            EpisodePattern::CompactSeason,
        ),
        (
            Regex::new(r"(?i)^(.*?)[\s._-]*\b(\d{2})e(\d{2,3})\b").unwrap(),
            EpisodePattern::CompactEpisode,
        ),
        (
            Regex::new(r"(?i)^(.*?)[\s._-]*\bEp\.?\s*(\d{1,4})\b").unwrap(),
            EpisodePattern::EpNumber,
        ),
    ]
});

static SEASON_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(S\d{2}.*|Season\s*\d+).*").unwrap());
static PARENT_SEASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)S(\d{2})|Season\s*(\d+)").unwrap());
static DIR_SIGNAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)season|episode|\bs\d{2}\b").unwrap());
static LIST_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}\.\s*").unwrap());
static TRAILING_JUNK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+$|\($").unwrap());

static MOVIE_NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(.+?)\s*\[(\d{4})\]").unwrap(),
        Regex::new(r"(.+?)\s*\((\d{4})\)").unwrap(),
        Regex::new(r"(.+?)\s*(\d{4})").unwrap(),
    ]
});

/// Classify a file by its name and the directory it sits in.
pub fn classify(file_name: &str, parent_dir: &Path) -> Classification {
    for (pattern, kind) in EPISODE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(file_name) {
            let classification = classify_episode(&caps, *kind, parent_dir);
            debug!(
                file = file_name,
                pattern = ?kind,
                classification = ?classification.kind,
                "Classified by filename pattern"
            );
            return classification;
        }
    }

    let parent_str = parent_dir.to_string_lossy();
    if DIR_SIGNAL_RE.is_match(&parent_str) {
        // Directory-level signal without a usable episode identifier:
        // treat as bonus content attached to the show named by the folder.
        let folder_name = parent_folder_name(parent_dir);
        let (show_hint, year) = show_hint_from_folder(&folder_name);
        let season = season_from_parent(&folder_name).unwrap_or(1).max(1);
        debug!(file = file_name, show = %show_hint, "Classified as extras by directory signal");
        return Classification {
            kind: MediaKind::Episode {
                show_hint,
                season,
                episode: None,
                identifier: None,
                year,
            },
            is_extra: true,
        };
    }

    let folder_name = parent_folder_name(parent_dir);
    let (title_hint, year) = extract_movie_name_and_year(&folder_name);
    Classification {
        kind: MediaKind::Movie {
            title_hint: title_hint.map(|t| text_utils::standardize_title(&t)),
            year,
        },
        is_extra: false,
    }
}

fn classify_episode(
    caps: &regex::Captures<'_>,
    pattern: EpisodePattern,
    parent_dir: &Path,
) -> Classification {
    let folder_name = parent_folder_name(parent_dir);
    let name_part = caps.get(1).map(|m| m.as_str()).unwrap_or("");

    let parsed = match pattern {
        EpisodePattern::SeasonEpisode => {
            let (folder_show, year) = show_hint_from_folder(&folder_name);
            let show = match clean_name_part(name_part) {
                s if s.is_empty() => folder_show,
                s => s,
            };
            parse_pair(caps, 2, 3).map(|(s, e)| (show, s, e, year))
        }
        EpisodePattern::SeasonXEpisode
        | EpisodePattern::CompactSeason
        | EpisodePattern::CompactEpisode => {
            let show = clean_name_part(name_part);
            let year = text_utils::extract_folder_year(&folder_name);
            parse_pair(caps, 2, 3).map(|(s, e)| (show, s, e, year))
        }
        EpisodePattern::EpNumber => {
            let show = clean_name_part(name_part);
            let year = text_utils::extract_folder_year(&folder_name);
            let season = season_from_parent(&folder_name).unwrap_or(1);
            caps.get(2)
                .and_then(|m| m.as_str().parse().ok())
                .map(|e| (show, season, e, year))
        }
    };

    match parsed {
        Some((show_hint, season, episode, year)) => {
            let season = season.max(1);
            Classification {
                kind: MediaKind::Episode {
                    show_hint,
                    season,
                    episode: Some(episode),
                    identifier: Some(format_identifier(season, episode)),
                    year,
                },
                is_extra: false,
            }
        }
        None => {
            // Identifier that cannot be mapped to SxxEyy form: degrade to
            // S01E01 and route the file to Extras instead of failing.
            let (show_hint, year) = show_hint_from_folder(&folder_name);
            Classification {
                kind: MediaKind::Episode {
                    show_hint,
                    season: 1,
                    episode: None,
                    identifier: Some("S01E01".to_string()),
                    year,
                },
                is_extra: true,
            }
        }
    }
}

fn parse_pair(caps: &regex::Captures<'_>, a: usize, b: usize) -> Option<(u32, u32)> {
    let season = caps.get(a)?.as_str().parse().ok()?;
    let episode = caps.get(b)?.as_str().parse().ok()?;
    Some((season, episode))
}

/// Format a season/episode pair as the canonical `SxxEyy` identifier.
pub fn format_identifier(season: u32, episode: u32) -> String {
    format!("S{:02}E{:02}", season, episode)
}

fn parent_folder_name(parent_dir: &Path) -> String {
    parent_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Derive a show name hint and year from the parent folder: clean the
/// noise vocabulary, cut season markers, and split the year out.
fn show_hint_from_folder(folder_name: &str) -> (String, Option<u16>) {
    let (clean_folder, _) = clean_query(folder_name);
    let show = SEASON_SUFFIX_RE.replace(&clean_folder, "");
    let show = show.replace(['-', '.'], " ");
    let show = TRAILING_JUNK_RE
        .replace_all(show.trim(), "")
        .trim()
        .to_string();

    let year =
        text_utils::extract_folder_year(folder_name).or_else(|| text_utils::extract_year(&show));
    let show = match year {
        Some(y) => show
            .trim_end_matches(&format!("({y})"))
            .trim_end_matches(&y.to_string())
            .trim()
            .to_string(),
        None => show,
    };

    (show, year)
}

fn clean_name_part(name_part: &str) -> String {
    name_part.replace(['.', '_'], " ").trim().to_string()
}

fn season_from_parent(folder_name: &str) -> Option<u32> {
    PARENT_SEASON_RE.captures(folder_name).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse().ok())
    })
}

/// Extract a movie name and year from a folder name. Handles a leading
/// list prefix (`12. Movie Name 2008`) and bracketed, parenthesized, or
/// bare year forms.
pub fn extract_movie_name_and_year(folder_name: &str) -> (Option<String>, Option<u16>) {
    let stripped = LIST_PREFIX_RE.replace(folder_name, "");

    for pattern in MOVIE_NAME_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&stripped) {
            let name = caps
                .get(1)
                .map(|m| m.as_str().replace(['.', '-'], " "))
                .map(|n| n.replace(['[', ']'], "").trim().to_string())
                .filter(|n| !n.is_empty());
            let year = caps.get(2).and_then(|m| m.as_str().parse().ok());
            return (name, year);
        }
    }

    (None, None)
}

/// Resolution token pulled from a filename, plus whether it is a remux.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResolution {
    pub resolution: Option<String>,
    pub is_remux: bool,
}

static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(4K|2160p|1080p|720p|1080|2160|480p|DVD)").unwrap());

/// Extract the resolution marker from a filename, lowercased.
pub fn parse_resolution(file_name: &str) -> ParsedResolution {
    let lower = file_name.to_lowercase();
    ParsedResolution {
        resolution: RESOLUTION_RE
            .captures(file_name)
            .map(|caps| caps.get(1).unwrap().as_str().to_lowercase()),
        is_remux: lower.contains("remux"),
    }
}

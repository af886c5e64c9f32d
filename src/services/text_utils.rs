//! Text normalization for search queries
//!
//! Raw release names carry quality markers, group tags, and stylized
//! spellings that confuse the metadata provider's search endpoint. This
//! module turns them into clean, searchable titles.

use once_cell::sync::Lazy;
use regex::Regex;

/// A cleaned search query: title with the year token split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub title: String,
    pub year: Option<u16>,
}

/// Quality/encoding/release tokens stripped from queries.
/// An attached release-group suffix (`x265-GROUP`) is removed with the token.
const NOISE_TOKENS: &[&str] = &[
    "Unrated",
    "Remastered",
    "IMAX",
    "Extended",
    "BDRemux",
    "ITA",
    "ENG",
    "x265",
    "H265",
    "HDR10",
    "WebDl",
    "Rip",
    "4K",
    "HDR",
    "DV",
    "2160p",
    "BDRip",
    "AC3",
    "5.1",
    "Sub",
    "NAHOM",
    "mkv",
    "Complete",
];

static NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    let tokens = NOISE_TOKENS
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{tokens})(?:-\w+)?\b")).unwrap()
});

static SEASON_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bS\d{2}\b.*").unwrap());
static EMPTY_PARENS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*\)").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static YEAR_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").unwrap());
static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[._-]").unwrap());
static PUNCTUATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s()-]").unwrap());
static TRAILING_PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(.*$").unwrap());
static PAREN_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)").unwrap());
static DOTTED_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.(\d{4})\.").unwrap());
static TRAILING_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)\s*$").unwrap());
static BARE_TRAILING_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})\s*$").unwrap());
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").unwrap());
static LEET_CHAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9@#$%&*]").unwrap());
static LEET_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[014579@#$%&*3]").unwrap());

/// Genre words removed before hitting the provider's human-facing search
/// page, whose relevance ranking is thrown off by them.
const GENRE_NAMES: &[&str] = &[
    "Action",
    "Comedy",
    "Drama",
    "Thriller",
    "Horror",
    "Romance",
    "Adventure",
    "Sci-Fi",
    "Fantasy",
    "Mystery",
    "Crime",
    "Documentary",
    "Animation",
    "Family",
    "Music",
    "War",
    "Western",
    "History",
    "Biography",
];

static GENRE_RE: Lazy<Regex> = Lazy::new(|| {
    let names = GENRE_NAMES
        .iter()
        .map(|g| regex::escape(g))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{names})\b")).unwrap()
});

/// Strip noise tokens, season markers, and empty parentheses, then split
/// out a 4-digit year token if one is present.
pub fn clean_query(raw: &str) -> (String, Option<u16>) {
    let cleaned = NOISE_RE.replace_all(raw, "");
    let cleaned = SEASON_MARKER_RE.replace(&cleaned, "");
    let cleaned = EMPTY_PARENS_RE.replace_all(&cleaned, "");
    let cleaned = WHITESPACE_RE.replace_all(&cleaned, " ");
    let cleaned = cleaned.trim().to_string();

    if let Some(m) = YEAR_TOKEN_RE.captures(&cleaned) {
        let year = m.get(1).and_then(|y| y.as_str().parse().ok());
        let full = m.get(0).unwrap();
        let title = cleaned[..full.start()].trim().to_string();
        return (title, year);
    }

    (cleaned, None)
}

/// Replace separators with spaces, drop stray punctuation, and collapse
/// whitespace. Idempotent.
pub fn normalize_query(query: &str) -> String {
    let normalized = SEPARATOR_RE.replace_all(query, " ");
    let normalized = PUNCTUATION_RE.replace_all(&normalized, "");
    WHITESPACE_RE
        .replace_all(&normalized, " ")
        .trim()
        .to_string()
}

/// Full normalization pass: clean noise, split the year, normalize the
/// remaining title.
pub fn normalize(raw: &str) -> NormalizedQuery {
    let (title, year) = clean_query(raw);
    NormalizedQuery {
        title: normalize_query(&title),
        year,
    }
}

/// Substitute stylized leet characters back to letters, but only when more
/// than 4 words in the title contain such characters. A low affected count
/// means the digits are probably part of the real title, so the string is
/// left untouched.
pub fn standardize_title(title: &str) -> String {
    let affected = WORD_RE
        .find_iter(title)
        .filter(|w| LEET_WORD_RE.is_match(w.as_str()))
        .count();

    let standardized = if affected > 4 {
        LEET_CHAR_RE
            .replace_all(title, |caps: &regex::Captures| {
                match caps.get(0).unwrap().as_str() {
                    "0" => "o",
                    "1" => "i",
                    "3" => "e",
                    "4" => "a",
                    "5" => "s",
                    "7" => "t",
                    "9" => "g",
                    "@" => "a",
                    "#" => "h",
                    "$" => "s",
                    "%" => "p",
                    "&" => "and",
                    "*" => "x",
                    other => other,
                }
                .to_string()
            })
            .to_string()
    } else {
        title.to_string()
    };

    WHITESPACE_RE
        .replace_all(&standardized, " ")
        .trim()
        .to_string()
}

/// Extract a trailing year from a name, either `(2019)` or a bare `2019`.
pub fn extract_year(name: &str) -> Option<u16> {
    let trimmed = name.trim();
    if let Some(caps) = TRAILING_YEAR_RE.captures(trimmed) {
        return caps.get(1).and_then(|y| y.as_str().parse().ok());
    }
    BARE_TRAILING_YEAR_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|y| y.as_str().parse().ok())
}

/// Extract a year from a folder name, skipping 4-digit tokens that are
/// actually resolutions (1080, 2160, ...).
pub fn extract_folder_year(folder_name: &str) -> Option<u16> {
    const RESOLUTIONS: &[&str] = &["1080", "480", "720", "2160"];

    for re in [&*PAREN_YEAR_RE, &*DOTTED_YEAR_RE] {
        if let Some(caps) = re.captures(folder_name) {
            let year = caps.get(1).unwrap().as_str();
            if !RESOLUTIONS.contains(&year) {
                return year.parse().ok();
            }
        }
    }
    None
}

/// Re-extract a bare title by dropping trailing parenthetical content.
pub fn extract_title(query: &str) -> String {
    TRAILING_PAREN_RE.replace(query, "").trim().to_string()
}

/// Remove genre words from a query (used before the web-search fallback).
pub fn remove_genre_names(query: &str) -> String {
    let stripped = GENRE_RE.replace_all(query, "");
    WHITESPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

//! Application configuration management

use std::env;
use std::path::PathBuf;

use anyhow::Result;

use crate::error::ConfigError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Source roots to scan (comma separated in SOURCE_DIR)
    pub source_dirs: Vec<PathBuf>,

    /// Root the organized library is built under
    pub destination_dir: PathBuf,

    /// TMDB API key; absent means items keep their parsed names
    pub tmdb_api_key: Option<String>,

    /// Prefer `{imdb-…}` tags in folder names
    pub imdb_folder_id: bool,

    /// Prefer `{tvdb-…}` tags for TV folder names
    pub tvdb_folder_id: bool,

    /// Tag folders with `{tmdb-…}`
    pub tmdb_folder_id: bool,

    /// Recompute destination file names from canonical titles
    pub rename_enabled: bool,

    /// Group movies under provider-reported collections
    pub movie_collection_enabled: bool,

    /// Drop files that would land in an Extras folder
    pub skip_extras_folder: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let source_raw =
            env::var("SOURCE_DIR").map_err(|_| ConfigError::MissingVar("SOURCE_DIR"))?;
        let source_dirs: Vec<PathBuf> = source_raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        if source_dirs.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "SOURCE_DIR",
                value: source_raw,
            }
            .into());
        }

        let destination_dir = env::var("DESTINATION_DIR")
            .map_err(|_| ConfigError::MissingVar("DESTINATION_DIR"))?
            .into();

        // A placeholder key left over from a .env template counts as unset
        let tmdb_api_key = env::var("TMDB_API_KEY")
            .ok()
            .filter(|k| !k.is_empty() && k != "your_tmdb_api_key_here");

        Ok(Self {
            source_dirs,
            destination_dir,
            tmdb_api_key,
            imdb_folder_id: env_flag("IMDB_FOLDER_ID", false),
            tvdb_folder_id: env_flag("TVDB_FOLDER_ID", false),
            tmdb_folder_id: env_flag("TMDB_FOLDER_ID", true),
            rename_enabled: env_flag("RENAME_ENABLED", false),
            movie_collection_enabled: env_flag("MOVIE_COLLECTION_ENABLED", false),
            skip_extras_folder: env_flag("SKIP_EXTRAS_FOLDER", false),
        })
    }

    /// Whether any metadata tag is kept in folder names
    pub fn folder_ids_enabled(&self) -> bool {
        self.imdb_folder_id || self.tvdb_folder_id || self.tmdb_folder_id
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

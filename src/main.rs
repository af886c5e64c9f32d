//! CineSync - symlink-based media library organizer
//!
//! Scans one or more source directories of raw media files, identifies
//! each file against TMDB with a cascading fallback search, and builds a
//! normalized library of symlinks under the destination root.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use cinesync::cli::CliOptions;
use cinesync::config::Config;
use cinesync::services::tmdb::Candidate;
use cinesync::services::{
    DisambiguationPolicy, FolderIdPreferences, MetadataResolver, OrganizeSettings, PathResolver,
    ScannerService, TmdbClient, VariationIndex,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let options = CliOptions::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "cinesync=info".into()),
        )
        .init();

    // Configuration problems are the only fatal errors; detect them
    // before any work begins.
    let config = Config::from_env()?;
    tracing::info!("Starting CineSync");

    std::fs::create_dir_all(&config.destination_dir)
        .context("Failed to create destination directory")?;

    let client = Arc::new(TmdbClient::new(config.tmdb_api_key.clone()));
    if config.tmdb_api_key.is_some() && !client.validate_key().await {
        tracing::warn!("TMDB API key could not be validated; metadata lookups may fail");
    }

    let policy = if options.auto_select {
        DisambiguationPolicy::AutoFirst
    } else {
        DisambiguationPolicy::Interactive(Box::new(prompt_choice))
    };

    let resolver = Arc::new(MetadataResolver::new(
        client.clone(),
        policy,
        FolderIdPreferences {
            imdb: config.imdb_folder_id,
            tvdb: config.tvdb_folder_id,
            tmdb: config.tmdb_folder_id,
        },
    ));

    let index = Arc::new(VariationIndex::build(&config.destination_dir));

    let settings = OrganizeSettings {
        rename_enabled: config.rename_enabled,
        collection_enabled: config.movie_collection_enabled,
        skip_extras: config.skip_extras_folder,
        folder_ids_enabled: config.folder_ids_enabled(),
    };
    let path_resolver = Arc::new(PathResolver::new(
        config.destination_dir.clone(),
        settings,
        index,
        client,
    ));

    let scanner = ScannerService::new(resolver, path_resolver);

    let source_dirs = match &options.single_path {
        Some(path) => vec![path.clone()],
        None => config.source_dirs.clone(),
    };
    scanner.run(&source_dirs).await?;

    Ok(())
}

/// Blocking stdin prompt used when auto-select is off.
fn prompt_choice(_query: &str, candidates: &[Candidate]) -> Option<usize> {
    print!(
        "Choose an option (1-{}) or press Enter to skip: ",
        candidates.len()
    );
    std::io::stdout().flush().ok()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok()?;
    let choice: usize = line.trim().parse().ok()?;
    (1..=candidates.len())
        .contains(&choice)
        .then(|| choice - 1)
}

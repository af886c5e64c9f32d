//! Integration tests for the media pipeline
//!
//! These tests verify the complete flow from raw filename to destination
//! path against a scripted metadata provider:
//! - Classification and query normalization
//! - Resolution, canonical naming, and episode renames
//! - Variation reuse and extras placement
//! - Symlink materialization

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use pretty_assertions::assert_eq;

use cinesync::services::filename_parser::{self, MediaKind};
use cinesync::services::materializer::{self, Outcome};
use cinesync::services::resolver::{
    DisambiguationPolicy, FolderIdPreferences, MetadataResolver, ResolveContext,
};
use cinesync::services::text_utils::{self, NormalizedQuery};
use cinesync::services::tmdb::{Candidate, CollectionRef, ExternalIds, MetadataSearch, SearchKind};
use cinesync::services::{OrganizeSettings, PathResolver, VariationIndex};

// ============================================================================
// Scripted metadata provider
// ============================================================================

#[derive(Default)]
struct FakeProvider {
    search_results: HashMap<String, Vec<Candidate>>,
    episode_names: HashMap<(u32, u32), String>,
    season_lengths: HashMap<u32, usize>,
    collection: Option<CollectionRef>,
}

impl FakeProvider {
    fn with_search(mut self, query: &str, results: Vec<Candidate>) -> Self {
        self.search_results.insert(query.to_string(), results);
        self
    }

    fn with_episode(mut self, season: u32, episode: u32, name: &str) -> Self {
        self.episode_names
            .insert((season, episode), name.to_string());
        self
    }
}

#[async_trait]
impl MetadataSearch for FakeProvider {
    fn is_available(&self) -> bool {
        true
    }

    async fn search(
        &self,
        _kind: SearchKind,
        query: &str,
        _year: Option<u16>,
    ) -> Result<Vec<Candidate>> {
        Ok(self.search_results.get(query).cloned().unwrap_or_default())
    }

    async fn lookup(&self, _kind: SearchKind, _id: u64) -> Result<Option<Candidate>> {
        Ok(None)
    }

    async fn external_ids(&self, _kind: SearchKind, _id: u64) -> Result<ExternalIds> {
        Ok(ExternalIds::default())
    }

    async fn episode_name(
        &self,
        _show_id: u64,
        season: u32,
        episode: u32,
    ) -> Result<Option<String>> {
        Ok(self.episode_names.get(&(season, episode)).cloned())
    }

    async fn season_episode_count(&self, _show_id: u64, season: u32) -> Result<Option<usize>> {
        Ok(self.season_lengths.get(&season).copied())
    }

    async fn movie_collection(&self, _movie_id: u64) -> Result<Option<CollectionRef>> {
        Ok(self.collection.clone())
    }

    async fn web_fallback_search(&self, _kind: SearchKind, _query: &str) -> Result<Option<u64>> {
        Ok(None)
    }
}

fn candidate(id: u64, name: &str, year: u16) -> Candidate {
    Candidate {
        provider_id: id,
        display_name: name.to_string(),
        year: Some(year),
    }
}

fn tmdb_prefs() -> FolderIdPreferences {
    FolderIdPreferences {
        imdb: false,
        tvdb: false,
        tmdb: true,
    }
}

fn resolver_for(provider: Arc<FakeProvider>) -> MetadataResolver {
    MetadataResolver::new(provider, DisambiguationPolicy::AutoFirst, tmdb_prefs())
}

fn path_resolver_for(
    dest_root: &Path,
    provider: Arc<FakeProvider>,
    settings: OrganizeSettings,
) -> PathResolver {
    let index = Arc::new(VariationIndex::build(dest_root));
    PathResolver::new(dest_root.to_path_buf(), settings, index, provider)
}

// ============================================================================
// Normalization and classification laws
// ============================================================================

#[test]
fn normalize_strips_noise_tokens_and_extracts_year() {
    let query = text_utils::normalize("Movie.Title.2160p.HDR.x265-GROUP (2019)");
    assert_eq!(
        query,
        NormalizedQuery {
            title: "Movie Title".to_string(),
            year: Some(2019),
        }
    );
}

#[test]
fn classify_episode_and_movie() {
    let c = filename_parser::classify("Show.Name.S02E05.mkv", Path::new("/src/Show Name Season 2"));
    match c.kind {
        MediaKind::Episode {
            season, episode, ..
        } => {
            assert_eq!(season, 2);
            assert_eq!(episode, Some(5));
        }
        other => panic!("expected episode, got {:?}", other),
    }

    let c = filename_parser::classify("Random.Movie.2020.mkv", Path::new("/src/Random Movie 2020"));
    assert!(matches!(c.kind, MediaKind::Movie { .. }));
}

// ============================================================================
// End-to-end destination paths
// ============================================================================

#[tokio::test]
async fn end_to_end_show_rename_with_tmdb_folder_id() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(
        FakeProvider::default()
            .with_search("Some Show", vec![candidate(555, "Some Show", 2021)])
            .with_episode(1, 2, "Pilot Part 2"),
    );

    let file_name = "Some.Show.S01E02.1080p.mkv";
    let parent = tmp.path().join("incoming");
    let classification = filename_parser::classify(file_name, &parent);

    let resolver = resolver_for(provider.clone());
    let query = NormalizedQuery {
        title: "Some Show".to_string(),
        year: None,
    };
    let ctx = ResolveContext {
        actual_dir_name: "incoming",
        file_name,
    };
    let resolution = resolver.resolve(SearchKind::Tv, &query, &ctx).await;

    let path_resolver = path_resolver_for(
        tmp.path(),
        provider,
        OrganizeSettings {
            rename_enabled: true,
            collection_enabled: false,
            skip_extras: false,
            folder_ids_enabled: true,
        },
    );
    let dest = path_resolver
        .resolve_path(&classification, &resolution, file_name)
        .await
        .expect("episode should not be skipped");

    assert_eq!(
        dest.to_path(),
        tmp.path().join(
            "CineSync/Shows/FullHD/Some Show (2021) {tmdb-555}/Season 1/Some Show - S01E02 - Pilot Part 2.mkv"
        )
    );
}

#[tokio::test]
async fn absolute_episode_number_is_remapped_into_season() {
    let tmp = tempfile::tempdir().unwrap();
    let mut provider = FakeProvider::default()
        .with_search("Long Show", vec![candidate(90, "Long Show", 2005)])
        .with_episode(1, 3, "The Third One");
    provider.season_lengths.insert(1, 10);
    let provider = Arc::new(provider);

    // Absolute episode 13 in a 10-episode season maps to episode 3
    let file_name = "Long.Show.S01E13.mkv";
    let classification = filename_parser::classify(file_name, Path::new("/src/batch"));

    let resolver = resolver_for(provider.clone());
    let query = NormalizedQuery {
        title: "Long Show".to_string(),
        year: None,
    };
    let ctx = ResolveContext {
        actual_dir_name: "batch",
        file_name,
    };
    let resolution = resolver.resolve(SearchKind::Tv, &query, &ctx).await;

    let path_resolver = path_resolver_for(
        tmp.path(),
        provider,
        OrganizeSettings {
            rename_enabled: true,
            folder_ids_enabled: true,
            ..Default::default()
        },
    );
    let dest = path_resolver
        .resolve_path(&classification, &resolution, file_name)
        .await
        .unwrap();

    assert_eq!(dest.file_name, "Long Show - S01E03 - The Third One.mkv");
}

#[tokio::test]
async fn movie_reuses_existing_folder_variation() {
    let tmp = tempfile::tempdir().unwrap();
    let existing = tmp.path().join("CineSync/Movies/FullHD/The Matrix (1999)");
    std::fs::create_dir_all(&existing).unwrap();

    let provider = Arc::new(
        FakeProvider::default()
            .with_search("The Matrix", vec![candidate(603, "The Matrix", 1999)]),
    );

    let file_name = "The.Matrix.1999.1080p.mkv";
    let classification =
        filename_parser::classify(file_name, &tmp.path().join("The Matrix 1999"));

    let resolver = resolver_for(provider.clone());
    let query = NormalizedQuery {
        title: "The Matrix".to_string(),
        year: Some(1999),
    };
    let ctx = ResolveContext {
        actual_dir_name: "movies",
        file_name,
    };
    let resolution = resolver.resolve(SearchKind::Movie, &query, &ctx).await;

    // Folder tags disabled, so the canonical folder matches the untagged
    // variation already on disk.
    let path_resolver = path_resolver_for(
        tmp.path(),
        provider,
        OrganizeSettings {
            folder_ids_enabled: false,
            ..Default::default()
        },
    );
    let dest = path_resolver
        .resolve_path(&classification, &resolution, file_name)
        .await
        .unwrap();

    assert_eq!(dest.folder, "The Matrix (1999)");
    assert_eq!(
        dest.to_path(),
        existing.join(file_name)
    );
}

#[tokio::test]
async fn movie_collections_group_under_collection_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let mut provider = FakeProvider::default()
        .with_search("The Matrix", vec![candidate(603, "The Matrix", 1999)]);
    provider.collection = Some(CollectionRef {
        id: 2344,
        name: "The Matrix Collection".to_string(),
    });
    let provider = Arc::new(provider);

    let file_name = "The.Matrix.1999.2160p.mkv";
    let classification =
        filename_parser::classify(file_name, &tmp.path().join("The Matrix 1999"));

    let resolver = resolver_for(provider.clone());
    let query = NormalizedQuery {
        title: "The Matrix".to_string(),
        year: Some(1999),
    };
    let ctx = ResolveContext {
        actual_dir_name: "movies",
        file_name,
    };
    let resolution = resolver.resolve(SearchKind::Movie, &query, &ctx).await;

    let path_resolver = path_resolver_for(
        tmp.path(),
        provider,
        OrganizeSettings {
            collection_enabled: true,
            folder_ids_enabled: true,
            ..Default::default()
        },
    );
    let dest = path_resolver
        .resolve_path(&classification, &resolution, file_name)
        .await
        .unwrap();

    assert_eq!(
        dest.to_path(),
        tmp.path().join(
            "CineSync/Movies/Movie Collections/The Matrix Collection {tmdb-2344}/The Matrix (1999) {tmdb-603}/The.Matrix.1999.2160p.mkv"
        )
    );
}

// ============================================================================
// Extras placement
// ============================================================================

#[tokio::test]
async fn extras_attach_to_existing_show_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let existing = tmp
        .path()
        .join("CineSync/Shows/UltraHD/Some Show (2021) {tmdb-555}");
    std::fs::create_dir_all(&existing).unwrap();

    let provider = Arc::new(
        FakeProvider::default().with_search("Some Show", vec![candidate(555, "Some Show", 2021)]),
    );

    let file_name = "Behind the Scenes.mkv";
    let classification =
        filename_parser::classify(file_name, Path::new("/src/Some Show Season 1"));
    assert!(classification.is_extra);

    let resolver = resolver_for(provider.clone());
    let query = NormalizedQuery {
        title: "Some Show".to_string(),
        year: None,
    };
    let ctx = ResolveContext {
        actual_dir_name: "shows",
        file_name,
    };
    let resolution = resolver.resolve(SearchKind::Tv, &query, &ctx).await;

    let path_resolver = path_resolver_for(
        tmp.path(),
        provider,
        OrganizeSettings {
            folder_ids_enabled: true,
            ..Default::default()
        },
    );
    let dest = path_resolver
        .resolve_path(&classification, &resolution, file_name)
        .await
        .unwrap();

    // The show already lives under UltraHD, so extras attach there
    assert_eq!(dest.to_path(), existing.join("Extras").join(file_name));
}

#[tokio::test]
async fn extras_are_skipped_when_suppressed() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(
        FakeProvider::default().with_search("Some Show", vec![candidate(555, "Some Show", 2021)]),
    );

    let file_name = "Behind the Scenes.mkv";
    let classification =
        filename_parser::classify(file_name, Path::new("/src/Some Show Season 1"));

    let resolver = resolver_for(provider.clone());
    let query = NormalizedQuery {
        title: "Some Show".to_string(),
        year: None,
    };
    let ctx = ResolveContext {
        actual_dir_name: "shows",
        file_name,
    };
    let resolution = resolver.resolve(SearchKind::Tv, &query, &ctx).await;

    let path_resolver = path_resolver_for(
        tmp.path(),
        provider,
        OrganizeSettings {
            skip_extras: true,
            folder_ids_enabled: true,
            ..Default::default()
        },
    );
    assert!(
        path_resolver
            .resolve_path(&classification, &resolution, file_name)
            .await
            .is_none()
    );
}

// ============================================================================
// Materialization
// ============================================================================

#[cfg(unix)]
#[test]
fn materialize_is_idempotent_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src/Some.Show.S01E02.1080p.mkv");
    std::fs::create_dir_all(source.parent().unwrap()).unwrap();
    std::fs::write(&source, b"video").unwrap();

    let dest: PathBuf = tmp
        .path()
        .join("CineSync/Shows/FullHD/Some Show (2021) {tmdb-555}/Season 1/Some.Show.S01E02.1080p.mkv");

    assert_eq!(materializer::materialize(&source, &dest).unwrap(), Outcome::Created);
    assert_eq!(
        materializer::materialize(&source, &dest).unwrap(),
        Outcome::AlreadyLinked
    );
}

// ============================================================================
// Unresolved fallback
// ============================================================================

#[tokio::test]
async fn unresolved_items_keep_their_parsed_name() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::default());

    let file_name = "Obscure.Movie.2012.1080p.mkv";
    let classification =
        filename_parser::classify(file_name, &tmp.path().join("Obscure Movie 2012"));

    let resolver = resolver_for(provider.clone());
    let query = NormalizedQuery {
        title: "Obscure Movie".to_string(),
        year: Some(2012),
    };
    let ctx = ResolveContext {
        actual_dir_name: "movies",
        file_name,
    };
    let resolution = resolver.resolve(SearchKind::Movie, &query, &ctx).await;
    assert!(!resolution.is_resolved());

    let path_resolver = path_resolver_for(
        tmp.path(),
        provider,
        OrganizeSettings {
            folder_ids_enabled: true,
            ..Default::default()
        },
    );
    let dest = path_resolver
        .resolve_path(&classification, &resolution, file_name)
        .await
        .unwrap();

    assert_eq!(dest.folder, "Obscure Movie (2012)");
    assert_eq!(
        dest.to_path(),
        tmp.path()
            .join("CineSync/Movies/FullHD/Obscure Movie (2012)")
            .join(file_name)
    );
}

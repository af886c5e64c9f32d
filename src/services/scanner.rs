//! Pipeline orchestration
//!
//! Walks the source directories, then runs classify → resolve → place →
//! materialize for every discovered video file on a bounded worker pool.
//! Per-file failures are contained to that file; the run always proceeds
//! to completion.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};
use walkdir::WalkDir;

use super::file_utils::is_video_file;
use super::filename_parser::{self, Classification, MediaKind};
use super::materializer::{self, Outcome};
use super::organizer::PathResolver;
use super::resolver::{MetadataResolver, ResolveContext};
use super::text_utils::{self, NormalizedQuery};
use super::tmdb::SearchKind;

/// Counters for one pipeline run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanSummary {
    pub total_files: usize,
    pub created: usize,
    pub already_linked: usize,
    pub replaced: usize,
    pub skipped: usize,
    pub unresolved: usize,
    pub failed: usize,
}

/// A raw file found under a source root.
#[derive(Debug, Clone)]
struct DiscoveredFile {
    source_path: PathBuf,
    parent_dir: PathBuf,
    file_name: String,
    /// Name of the source root the file was found under
    source_root_name: String,
}

struct ItemResult {
    outcome: Option<Outcome>,
    unresolved: bool,
}

/// Walks sources and drives the per-file pipeline.
pub struct ScannerService {
    resolver: Arc<MetadataResolver>,
    path_resolver: Arc<PathResolver>,
    workers: usize,
}

impl ScannerService {
    pub fn new(resolver: Arc<MetadataResolver>, path_resolver: Arc<PathResolver>) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            resolver,
            path_resolver,
            workers,
        }
    }

    /// Process every video file under the given source roots.
    pub async fn run(&self, source_dirs: &[PathBuf]) -> Result<ScanSummary> {
        for dir in source_dirs {
            if !dir.is_dir() {
                bail!("source directory does not exist: {}", dir.display());
            }
        }

        let files = self.discover(source_dirs);
        let mut summary = ScanSummary {
            total_files: files.len(),
            ..Default::default()
        };
        info!(total = files.len(), workers = self.workers, "Starting pipeline run");

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for file in files {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .context("Worker pool closed")?;
            let resolver = self.resolver.clone();
            let path_resolver = self.path_resolver.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let source = file.source_path.clone();
                let result = process_file(file, resolver, path_resolver).await;
                (source, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(item))) => {
                    if item.unresolved {
                        summary.unresolved += 1;
                    }
                    match item.outcome {
                        Some(Outcome::Created) => summary.created += 1,
                        Some(Outcome::AlreadyLinked) => summary.already_linked += 1,
                        Some(Outcome::Replaced) => summary.replaced += 1,
                        Some(Outcome::Skipped) | None => summary.skipped += 1,
                    }
                }
                Ok((source, Err(e))) => {
                    error!(source = %source.display(), error = %e, "Failed to process file");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Worker task panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            total = summary.total_files,
            created = summary.created,
            already_linked = summary.already_linked,
            replaced = summary.replaced,
            skipped = summary.skipped,
            unresolved = summary.unresolved,
            failed = summary.failed,
            "Pipeline run completed"
        );
        Ok(summary)
    }

    fn discover(&self, source_dirs: &[PathBuf]) -> Vec<DiscoveredFile> {
        let mut files = Vec::new();

        for source_dir in source_dirs {
            let source_root_name = source_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            info!(source = %source_dir.display(), "Scanning source directory");

            for entry in WalkDir::new(source_dir)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let file_name = entry.file_name().to_string_lossy().to_string();
                if !is_video_file(&file_name) {
                    continue;
                }
                files.push(DiscoveredFile {
                    source_path: entry.path().to_path_buf(),
                    parent_dir: entry
                        .path()
                        .parent()
                        .map(|p| p.to_path_buf())
                        .unwrap_or_default(),
                    file_name,
                    source_root_name: source_root_name.clone(),
                });
            }
        }

        files
    }
}

/// Build the search query from a classification, degrading to the parent
/// folder name when the classifier could not extract a usable title.
fn build_query(
    classification: &Classification,
    file: &DiscoveredFile,
) -> (SearchKind, NormalizedQuery) {
    match &classification.kind {
        MediaKind::Episode {
            show_hint, year, ..
        } => (
            SearchKind::Tv,
            NormalizedQuery {
                title: show_hint.clone(),
                year: *year,
            },
        ),
        MediaKind::Movie { title_hint, year } => {
            let title = title_hint.clone().unwrap_or_else(|| {
                let parent = file
                    .parent_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                text_utils::normalize(&parent).title
            });
            (
                SearchKind::Movie,
                NormalizedQuery {
                    title,
                    year: *year,
                },
            )
        }
    }
}

async fn process_file(
    file: DiscoveredFile,
    resolver: Arc<MetadataResolver>,
    path_resolver: Arc<PathResolver>,
) -> Result<ItemResult> {
    let classification = filename_parser::classify(&file.file_name, &file.parent_dir);
    let (kind, query) = build_query(&classification, &file);

    let ctx = ResolveContext {
        actual_dir_name: &file.source_root_name,
        file_name: &file.file_name,
    };
    let resolution = resolver.resolve(kind, &query, &ctx).await;
    let unresolved = !resolution.is_resolved();

    let Some(dest) = path_resolver
        .resolve_path(&classification, &resolution, &file.file_name)
        .await
    else {
        return Ok(ItemResult {
            outcome: None,
            unresolved,
        });
    };

    let dest_path = dest.to_path();
    let outcome = materializer::materialize(&file.source_path, &dest_path)?;
    info!(
        source = %file.source_path.display(),
        dest = %dest_path.display(),
        outcome = ?outcome,
        "Processed file"
    );

    Ok(ItemResult {
        outcome: Some(outcome),
        unresolved,
    })
}

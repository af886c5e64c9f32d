//! Pipeline components and external service integrations

pub mod file_utils;
pub mod filename_parser;
pub mod materializer;
pub mod organizer;
pub mod rate_limiter;
pub mod resolver;
pub mod scanner;
pub mod text_utils;
pub mod tmdb;
pub mod variations;

pub use materializer::Outcome;
pub use organizer::{DestinationPath, OrganizeSettings, PathResolver};
pub use resolver::{
    DisambiguationPolicy, FolderIdPreferences, MetadataResolver, ResolutionResult,
};
pub use scanner::{ScanSummary, ScannerService};
pub use tmdb::{MetadataSearch, SearchKind, TmdbClient};
pub use variations::VariationIndex;

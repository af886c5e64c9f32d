//! TMDB (The Movie Database) API client
//!
//! Base URL: https://api.themoviedb.org/3
//!
//! Rate limiting: TMDB allows ~40 requests per 10 seconds. This client
//! uses rate limiting and retry logic to handle this gracefully. Besides
//! the structured API it also knows how to scrape the human-facing search
//! page, whose relevance ranking is more forgiving of noisy titles than
//! the search endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rate_limiter::{RateLimitedClient, RetryConfig, retry_async};
use super::text_utils::remove_genre_names;

/// Which provider namespace a search or lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKind {
    Movie,
    Tv,
}

impl SearchKind {
    /// Path segment used by the structured API (`movie` / `tv`)
    pub fn as_path(&self) -> &'static str {
        match self {
            SearchKind::Movie => "movie",
            SearchKind::Tv => "tv",
        }
    }
}

/// One search result from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub provider_id: u64,
    pub display_name: String,
    pub year: Option<u16>,
}

/// External identifiers for a resolved item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIds {
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<u64>,
}

/// A movie collection the provider reports an item as belonging to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    pub id: u64,
    pub name: String,
}

/// Capability consumed by the resolver and path resolver. All operations
/// may fail; callers treat failures as empty results and continue.
#[async_trait]
pub trait MetadataSearch: Send + Sync {
    /// Whether the provider can be queried at all (an API key is set).
    fn is_available(&self) -> bool;

    async fn search(
        &self,
        kind: SearchKind,
        query: &str,
        year: Option<u16>,
    ) -> Result<Vec<Candidate>>;

    /// Fetch full details for a known provider ID.
    async fn lookup(&self, kind: SearchKind, id: u64) -> Result<Option<Candidate>>;

    async fn external_ids(&self, kind: SearchKind, id: u64) -> Result<ExternalIds>;

    async fn episode_name(
        &self,
        show_id: u64,
        season: u32,
        episode: u32,
    ) -> Result<Option<String>>;

    /// Number of episodes the provider lists for a season.
    async fn season_episode_count(&self, show_id: u64, season: u32) -> Result<Option<usize>>;

    async fn movie_collection(&self, movie_id: u64) -> Result<Option<CollectionRef>>;

    /// Search the provider's public search page and scrape the first
    /// result link to recover a provider ID.
    async fn web_fallback_search(&self, kind: SearchKind, query: &str) -> Result<Option<u64>>;
}

/// TMDB API client with rate limiting and retry logic
pub struct TmdbClient {
    client: Arc<RateLimitedClient>,
    web_client: Arc<RateLimitedClient>,
    base_url: String,
    web_base_url: String,
    api_key: String,
    retry_config: RetryConfig,
    key_warning_logged: AtomicBool,
}

#[derive(Debug, Clone, Deserialize)]
struct MovieSearchResponse {
    results: Vec<TmdbMovie>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShowSearchResponse {
    results: Vec<TmdbShow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TmdbMovie {
    id: u64,
    title: String,
    release_date: Option<String>,
    belongs_to_collection: Option<TmdbCollectionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TmdbShow {
    id: u64,
    name: String,
    first_air_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TmdbCollectionInfo {
    id: u64,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ExternalIdsResponse {
    imdb_id: Option<String>,
    tvdb_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct EpisodeResponse {
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SeasonResponse {
    #[serde(default)]
    episodes: Vec<EpisodeSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct EpisodeSummary {
    #[allow(dead_code)]
    episode_number: u32,
}

/// Extract the release year from a `YYYY-MM-DD` date string.
fn date_year(date: Option<&str>) -> Option<u16> {
    date.and_then(|d| d.split('-').next())
        .and_then(|y| y.parse().ok())
}

static MOVIE_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/movie/(\d+)").unwrap());
static TV_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/tv/(\d+)").unwrap());

/// Pull the first result link's provider ID out of a search page.
/// Parsing is kept synchronous so the non-Send DOM never crosses an await.
fn scrape_first_result_id(html: &str, kind: SearchKind) -> Option<u64> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a.result").ok()?;
    let href = document
        .select(&selector)
        .next()
        .and_then(|link| link.value().attr("href"))?;

    let re = match kind {
        SearchKind::Movie => &*MOVIE_LINK_RE,
        SearchKind::Tv => &*TV_LINK_RE,
    };
    re.captures(href)
        .and_then(|caps| caps.get(1))
        .and_then(|id| id.as_str().parse().ok())
}

impl TmdbClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_tmdb()),
            web_client: Arc::new(RateLimitedClient::for_tmdb_web()),
            base_url: "https://api.themoviedb.org/3".to_string(),
            web_base_url: "https://www.themoviedb.org".to_string(),
            api_key: api_key.unwrap_or_default(),
            retry_config: RetryConfig::default(),
            key_warning_logged: AtomicBool::new(false),
        }
    }

    fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn warn_key_missing_once(&self) {
        if !self.key_warning_logged.swap(true, Ordering::Relaxed) {
            warn!("TMDB API key not configured; items will keep their parsed names");
        }
    }

    /// Validate the configured API key against the configuration endpoint.
    pub async fn validate_key(&self) -> bool {
        if !self.has_api_key() {
            self.warn_key_missing_once();
            return false;
        }

        let url = format!("{}/configuration", self.base_url);
        match self
            .client
            .get_with_query(&url, &[("api_key", self.api_key.as_str())])
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                if !self.key_warning_logged.swap(true, Ordering::Relaxed) {
                    warn!(status = %response.status(), "TMDB API key validation failed");
                }
                false
            }
            Err(e) => {
                if !self.key_warning_logged.swap(true, Ordering::Relaxed) {
                    warn!(error = %e, "TMDB API key validation failed");
                }
                false
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        params: Vec<(String, String)>,
        operation: &str,
    ) -> Result<T> {
        let client = self.client.clone();
        let retry_config = self.retry_config.clone();

        retry_async(
            || {
                let url = url.clone();
                let client = client.clone();
                let params = params.clone();
                async move {
                    let response = client.get_with_query(&url, &params).await?;

                    if response.status().as_u16() == 429 {
                        warn!("TMDB rate limit hit, will retry");
                        anyhow::bail!("Rate limited (429)");
                    }

                    if response.status().as_u16() == 401 {
                        anyhow::bail!("TMDB API key is invalid");
                    }

                    if !response.status().is_success() {
                        anyhow::bail!("TMDB request failed with status: {}", response.status());
                    }

                    response.json::<T>().await.context("Failed to parse TMDB response")
                }
            },
            &retry_config,
            operation,
        )
        .await
    }

    fn api_params(&self) -> Vec<(String, String)> {
        vec![("api_key".to_string(), self.api_key.clone())]
    }
}

#[async_trait]
impl MetadataSearch for TmdbClient {
    fn is_available(&self) -> bool {
        let available = self.has_api_key();
        if !available {
            self.warn_key_missing_once();
        }
        available
    }

    async fn search(
        &self,
        kind: SearchKind,
        query: &str,
        year: Option<u16>,
    ) -> Result<Vec<Candidate>> {
        if !self.is_available() {
            return Ok(Vec::new());
        }

        let url = format!("{}/search/{}", self.base_url, kind.as_path());
        let mut params = self.api_params();
        params.push(("query".to_string(), query.to_string()));
        params.push(("include_adult".to_string(), "false".to_string()));
        if let Some(y) = year {
            let param = match kind {
                SearchKind::Movie => "primary_release_year",
                SearchKind::Tv => "first_air_date_year",
            };
            params.push((param.to_string(), y.to_string()));
        }

        let candidates: Vec<Candidate> = match kind {
            SearchKind::Movie => {
                let response: MovieSearchResponse =
                    self.get_json(url, params, "tmdb_search_movie").await?;
                response
                    .results
                    .into_iter()
                    .map(|m| Candidate {
                        provider_id: m.id,
                        display_name: m.title,
                        year: date_year(m.release_date.as_deref()),
                    })
                    .collect()
            }
            SearchKind::Tv => {
                let response: ShowSearchResponse =
                    self.get_json(url, params, "tmdb_search_tv").await?;
                response
                    .results
                    .into_iter()
                    .map(|s| Candidate {
                        provider_id: s.id,
                        display_name: s.name,
                        year: date_year(s.first_air_date.as_deref()),
                    })
                    .collect()
            }
        };

        debug!(query = query, count = candidates.len(), "TMDB search returned results");
        Ok(candidates)
    }

    async fn lookup(&self, kind: SearchKind, id: u64) -> Result<Option<Candidate>> {
        if !self.is_available() {
            return Ok(None);
        }

        let url = format!("{}/{}/{}", self.base_url, kind.as_path(), id);
        let candidate = match kind {
            SearchKind::Movie => {
                let movie: TmdbMovie = self
                    .get_json(url, self.api_params(), "tmdb_lookup_movie")
                    .await?;
                Candidate {
                    provider_id: movie.id,
                    display_name: movie.title,
                    year: date_year(movie.release_date.as_deref()),
                }
            }
            SearchKind::Tv => {
                let show: TmdbShow = self
                    .get_json(url, self.api_params(), "tmdb_lookup_tv")
                    .await?;
                Candidate {
                    provider_id: show.id,
                    display_name: show.name,
                    year: date_year(show.first_air_date.as_deref()),
                }
            }
        };

        Ok(Some(candidate))
    }

    async fn external_ids(&self, kind: SearchKind, id: u64) -> Result<ExternalIds> {
        if !self.is_available() {
            return Ok(ExternalIds::default());
        }

        let url = format!("{}/{}/{}/external_ids", self.base_url, kind.as_path(), id);
        let response: ExternalIdsResponse = self
            .get_json(url, self.api_params(), "tmdb_external_ids")
            .await?;

        Ok(ExternalIds {
            imdb_id: response.imdb_id.filter(|i| !i.is_empty()),
            tvdb_id: response.tvdb_id,
        })
    }

    async fn episode_name(
        &self,
        show_id: u64,
        season: u32,
        episode: u32,
    ) -> Result<Option<String>> {
        if !self.is_available() {
            return Ok(None);
        }

        let url = format!(
            "{}/tv/{}/season/{}/episode/{}",
            self.base_url, show_id, season, episode
        );
        let response = self.client.get_with_query(&url, &self.api_params()).await?;

        if response.status().as_u16() == 404 {
            debug!(show_id, season, episode, "Episode not found on TMDB");
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("TMDB episode fetch failed with status: {}", response.status());
        }

        let episode_data: EpisodeResponse = response
            .json()
            .await
            .context("Failed to parse TMDB episode")?;
        Ok(episode_data.name.filter(|n| !n.is_empty()))
    }

    async fn season_episode_count(&self, show_id: u64, season: u32) -> Result<Option<usize>> {
        if !self.is_available() {
            return Ok(None);
        }

        let url = format!("{}/tv/{}/season/{}", self.base_url, show_id, season);
        let response = self.client.get_with_query(&url, &self.api_params()).await?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("TMDB season fetch failed with status: {}", response.status());
        }

        let season_data: SeasonResponse = response
            .json()
            .await
            .context("Failed to parse TMDB season")?;
        Ok(Some(season_data.episodes.len()).filter(|c| *c > 0))
    }

    async fn movie_collection(&self, movie_id: u64) -> Result<Option<CollectionRef>> {
        if !self.is_available() {
            return Ok(None);
        }

        let url = format!("{}/movie/{}", self.base_url, movie_id);
        let mut params = self.api_params();
        params.push((
            "append_to_response".to_string(),
            "belongs_to_collection".to_string(),
        ));

        let movie: TmdbMovie = self.get_json(url, params, "tmdb_movie_collection").await?;
        Ok(movie
            .belongs_to_collection
            .map(|c| CollectionRef { id: c.id, name: c.name }))
    }

    async fn web_fallback_search(&self, kind: SearchKind, query: &str) -> Result<Option<u64>> {
        let cleaned = remove_genre_names(query);
        let url = format!(
            "{}/search?query={}",
            self.web_base_url,
            urlencoding::encode(&cleaned)
        );

        let response = self.web_client.get(&url).await?;
        if !response.status().is_success() {
            anyhow::bail!("TMDB web search failed with status: {}", response.status());
        }

        let body = response.text().await.context("Failed to read TMDB search page")?;
        let id = scrape_first_result_id(&body, kind);
        debug!(query = %cleaned, id = ?id, "Web fallback search scraped result");
        Ok(id)
    }
}

//! Metadata resolution with cascading fallback search
//!
//! A raw title rarely matches the provider's search endpoint on the first
//! try. The resolver walks an ordered cascade of progressively looser
//! queries and stops at the first one that returns candidates. Outcomes,
//! including failures to resolve, are memoized for the process lifetime so
//! a season's worth of episodes costs one search.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::text_utils::{self, NormalizedQuery, extract_title};
use super::tmdb::{Candidate, ExternalIds, MetadataSearch, SearchKind};

/// How multi-candidate results are arbitrated.
pub enum DisambiguationPolicy {
    /// Take the provider's top-ranked candidate without asking.
    AutoFirst,
    /// Present up to three candidates to the callback; `None` or an
    /// out-of-range index leaves the item unresolved.
    Interactive(PromptFn),
    /// Never guess: ambiguous results stay unresolved.
    FailClosed,
}

pub type PromptFn = Box<dyn Fn(&str, &[Candidate]) -> Option<usize> + Send + Sync>;

/// Which external-ID tag goes into canonical folder names.
#[derive(Debug, Clone, Copy, Default)]
pub struct FolderIdPreferences {
    pub imdb: bool,
    pub tvdb: bool,
    pub tmdb: bool,
}

/// Context carried alongside a query for the late cascade steps.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Name of the source directory being scanned
    pub actual_dir_name: &'a str,
    /// Raw file name of the item being resolved
    pub file_name: &'a str,
}

/// Outcome of one resolution. Cached; cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionResult {
    Resolved {
        /// `"{title} ({year}) {tag}"`
        canonical_name: String,
        provider_id: u64,
        external_ids: ExternalIds,
        year: Option<u16>,
    },
    Unresolved {
        original_query: String,
    },
}

impl ResolutionResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionResult::Resolved { .. })
    }
}

type CacheKey = (String, Option<u16>);

/// Drives the cascading search against the metadata provider.
pub struct MetadataResolver {
    client: Arc<dyn MetadataSearch>,
    policy: DisambiguationPolicy,
    folder_ids: FolderIdPreferences,
    cache: RwLock<HashMap<CacheKey, ResolutionResult>>,
}

impl MetadataResolver {
    pub fn new(
        client: Arc<dyn MetadataSearch>,
        policy: DisambiguationPolicy,
        folder_ids: FolderIdPreferences,
    ) -> Self {
        Self {
            client,
            policy,
            folder_ids,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a normalized query to a canonical name. Every (title, year)
    /// pair is resolved against the network at most once per process;
    /// concurrent misses may duplicate work but always agree on the value.
    pub async fn resolve(
        &self,
        kind: SearchKind,
        query: &NormalizedQuery,
        ctx: &ResolveContext<'_>,
    ) -> ResolutionResult {
        if !self.client.is_available() {
            return ResolutionResult::Unresolved {
                original_query: query.title.clone(),
            };
        }

        let key = (query.title.clone(), query.year);
        if let Some(cached) = self.cache.read().get(&key) {
            debug!(title = %query.title, "Resolution served from cache");
            return cached.clone();
        }

        let result = self.resolve_uncached(kind, query, ctx).await;
        self.cache.write().insert(key, result.clone());
        result
    }

    async fn resolve_uncached(
        &self,
        kind: SearchKind,
        query: &NormalizedQuery,
        ctx: &ResolveContext<'_>,
    ) -> ResolutionResult {
        let candidates = self.cascade(kind, query, ctx).await;

        if candidates.is_empty() {
            warn!(
                title = %query.title,
                year = ?query.year,
                "No results from any search strategy; keeping original name"
            );
            return ResolutionResult::Unresolved {
                original_query: query.title.clone(),
            };
        }

        let Some(chosen) = self.select(&query.title, &candidates) else {
            warn!(title = %query.title, "No valid selection made, skipping");
            return ResolutionResult::Unresolved {
                original_query: query.title.clone(),
            };
        };

        // External IDs are fetched only once a candidate is chosen, and
        // only when a tag preference actually needs them.
        let needs_ids = match kind {
            SearchKind::Tv => self.folder_ids.imdb || self.folder_ids.tvdb,
            SearchKind::Movie => self.folder_ids.imdb,
        };
        let external_ids = if needs_ids {
            match self.client.external_ids(kind, chosen.provider_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(error = %e, "Failed to fetch external IDs");
                    ExternalIds::default()
                }
            }
        } else {
            ExternalIds::default()
        };

        let canonical_name = self.compose_canonical(kind, chosen, &external_ids);
        info!(
            title = %query.title,
            canonical = %canonical_name,
            "Resolved via metadata provider"
        );

        ResolutionResult::Resolved {
            canonical_name,
            provider_id: chosen.provider_id,
            external_ids,
            year: chosen.year,
        }
    }

    /// The ordered fallback cascade. Stops at the first non-empty result
    /// set; transport failures only disable the step they occur in.
    async fn cascade(
        &self,
        kind: SearchKind,
        query: &NormalizedQuery,
        ctx: &ResolveContext<'_>,
    ) -> Vec<Candidate> {
        let mut results = self
            .try_step(kind, "primary", &query.title, query.year)
            .await;

        if results.is_empty() && query.year.is_some() {
            results = self.try_step(kind, "year_dropped", &query.title, None).await;
        }

        if results.is_empty() {
            let extracted = extract_title(&query.title);
            if !extracted.is_empty() && extracted != query.title {
                results = self
                    .try_step(kind, "extracted_title", &extracted, query.year)
                    .await;
            }
        }

        if results.is_empty() {
            results = self.web_fallback(kind, &query.title).await;
        }

        if results.is_empty()
            && let Some(year) = query.year
        {
            results = self
                .try_step(kind, "year_only", &year.to_string(), None)
                .await;
        }

        if results.is_empty() {
            let cleaned = text_utils::normalize(ctx.file_name);
            if !cleaned.title.is_empty() && cleaned.title != query.title {
                results = self
                    .try_step(
                        kind,
                        "cleaned_filename",
                        &cleaned.title,
                        query.year.or(cleaned.year),
                    )
                    .await;
            }
        }

        if results.is_empty() && !ctx.actual_dir_name.is_empty() {
            let dir_query = text_utils::normalize(ctx.actual_dir_name);
            if !dir_query.title.is_empty() && dir_query.title != query.title {
                results = self
                    .try_step(
                        kind,
                        "directory_name",
                        &dir_query.title,
                        query.year.or(dir_query.year),
                    )
                    .await;
            }
        }

        results
    }

    async fn try_step(
        &self,
        kind: SearchKind,
        step: &str,
        query: &str,
        year: Option<u16>,
    ) -> Vec<Candidate> {
        debug!(step, query, year = ?year, "Cascade search attempt");
        match self.client.search(kind, query, year).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(step, error = %e, "Search step failed, treating as empty");
                Vec::new()
            }
        }
    }

    /// Scrape the provider's public search page for an ID, then fetch the
    /// full details for it. The page's ranking is looser than the API's,
    /// which rescues titles the structured search refuses to match.
    async fn web_fallback(&self, kind: SearchKind, title: &str) -> Vec<Candidate> {
        debug!(step = "web_fallback", query = title, "Cascade search attempt");

        let id = match self.client.web_fallback_search(kind, title).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Web fallback search failed, treating as empty");
                None
            }
        };
        let Some(id) = id else {
            return Vec::new();
        };

        match self.client.lookup(kind, id).await {
            Ok(Some(candidate)) => vec![candidate],
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Lookup of scraped ID failed, treating as empty");
                Vec::new()
            }
        }
    }

    fn select<'a>(&self, query: &str, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        if candidates.len() == 1 {
            return Some(&candidates[0]);
        }

        match &self.policy {
            DisambiguationPolicy::AutoFirst => Some(&candidates[0]),
            DisambiguationPolicy::FailClosed => None,
            DisambiguationPolicy::Interactive(prompt) => {
                let shown = &candidates[..candidates.len().min(3)];
                info!("Multiple results found for '{}':", query);
                for (idx, candidate) in shown.iter().enumerate() {
                    let year = candidate
                        .year
                        .map(|y| y.to_string())
                        .unwrap_or_else(|| "Unknown Year".to_string());
                    info!(
                        "{}: {} ({}) [tmdb-{}]",
                        idx + 1,
                        candidate.display_name,
                        year,
                        candidate.provider_id
                    );
                }
                prompt(query, shown).and_then(|idx| shown.get(idx))
            }
        }
    }

    fn compose_canonical(
        &self,
        kind: SearchKind,
        candidate: &Candidate,
        ids: &ExternalIds,
    ) -> String {
        let year = candidate
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "Unknown Year".to_string());

        match self.folder_tag(kind, candidate, ids) {
            Some(tag) => format!("{} ({}) {}", candidate.display_name, year, tag),
            None => format!("{} ({})", candidate.display_name, year),
        }
    }

    /// Tag preference: IMDb > TVDB > TMDb for TV, IMDb > TMDb for movies.
    /// A preferred ID the provider does not have falls through to the next.
    fn folder_tag(
        &self,
        kind: SearchKind,
        candidate: &Candidate,
        ids: &ExternalIds,
    ) -> Option<String> {
        if self.folder_ids.imdb
            && let Some(imdb) = &ids.imdb_id
        {
            return Some(format!("{{imdb-{imdb}}}"));
        }

        match kind {
            SearchKind::Tv => {
                if self.folder_ids.tvdb
                    && let Some(tvdb) = ids.tvdb_id
                {
                    return Some(format!("{{tvdb-{tvdb}}}"));
                }
                Some(format!("{{tmdb-{}}}", candidate.provider_id))
            }
            SearchKind::Movie => self
                .folder_ids
                .tmdb
                .then(|| format!("{{tmdb-{}}}", candidate.provider_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider: maps exact query strings to candidate lists and
    /// counts how many search calls were made.
    #[derive(Default)]
    struct FakeClient {
        responses: HashMap<String, Vec<Candidate>>,
        web_result: Option<u64>,
        search_calls: AtomicUsize,
    }

    impl FakeClient {
        fn with_response(mut self, query: &str, candidates: Vec<Candidate>) -> Self {
            self.responses.insert(query.to_string(), candidates);
            self
        }
    }

    #[async_trait]
    impl MetadataSearch for FakeClient {
        fn is_available(&self) -> bool {
            true
        }

        async fn search(
            &self,
            _kind: SearchKind,
            query: &str,
            _year: Option<u16>,
        ) -> Result<Vec<Candidate>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses.get(query).cloned().unwrap_or_default())
        }

        async fn lookup(&self, _kind: SearchKind, id: u64) -> Result<Option<Candidate>> {
            Ok(Some(Candidate {
                provider_id: id,
                display_name: format!("Looked Up {id}"),
                year: Some(2000),
            }))
        }

        async fn external_ids(&self, _kind: SearchKind, _id: u64) -> Result<ExternalIds> {
            Ok(ExternalIds {
                imdb_id: Some("tt0133093".to_string()),
                tvdb_id: Some(81189),
            })
        }

        async fn episode_name(&self, _: u64, _: u32, _: u32) -> Result<Option<String>> {
            Ok(None)
        }

        async fn season_episode_count(&self, _: u64, _: u32) -> Result<Option<usize>> {
            Ok(None)
        }

        async fn movie_collection(
            &self,
            _: u64,
        ) -> Result<Option<super::super::tmdb::CollectionRef>> {
            Ok(None)
        }

        async fn web_fallback_search(
            &self,
            _kind: SearchKind,
            _query: &str,
        ) -> Result<Option<u64>> {
            Ok(self.web_result)
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

    #[tokio::test]
    async fn test_primary_hit_resolves_with_tmdb_tag() {
        let client =
            FakeClient::default().with_response("Some Show", vec![candidate(555, "Some Show", 2021)]);
        let resolver = MetadataResolver::new(
            Arc::new(client),
            DisambiguationPolicy::AutoFirst,
            tmdb_prefs(),
        );

        let query = NormalizedQuery {
            title: "Some Show".to_string(),
            year: Some(2021),
        };
        let ctx = ResolveContext {
            actual_dir_name: "incoming",
            file_name: "Some.Show.S01E02.mkv",
        };
        match resolver.resolve(SearchKind::Tv, &query, &ctx).await {
            ResolutionResult::Resolved { canonical_name, provider_id, .. } => {
                assert_eq!(canonical_name, "Some Show (2021) {tmdb-555}");
                assert_eq!(provider_id, 555);
            }
            other => panic!("expected resolved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_directory_fallback_caches_under_original_key() {
        // Nothing matches the primary query; only the directory-derived
        // query returns a candidate.
        let client = Arc::new(
            FakeClient::default()
                .with_response("Actual Show Name", vec![candidate(7, "Actual Show Name", 2015)]),
        );
        let resolver = MetadataResolver::new(
            client.clone(),
            DisambiguationPolicy::AutoFirst,
            tmdb_prefs(),
        );

        let query = NormalizedQuery {
            title: "Garbled Name".to_string(),
            year: None,
        };
        let ctx = ResolveContext {
            actual_dir_name: "Actual.Show.Name",
            file_name: "garbled.mkv",
        };

        let first = resolver.resolve(SearchKind::Tv, &query, &ctx).await;
        assert!(first.is_resolved());

        // The second resolve of the same original query must come from the
        // cache: the search call count stays where the cascade left it.
        let calls_after_first = client.search_calls.load(Ordering::SeqCst);
        let second = resolver.resolve(SearchKind::Tv, &query, &ctx).await;
        assert_eq!(first, second);
        assert_eq!(client.search_calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_unresolved_is_cached_and_short_circuits() {
        let client = Arc::new(FakeClient::default());
        let resolver = MetadataResolver::new(
            client.clone(),
            DisambiguationPolicy::AutoFirst,
            tmdb_prefs(),
        );

        let query = NormalizedQuery {
            title: "Nothing Matches".to_string(),
            year: Some(1990),
        };
        let ctx = ResolveContext {
            actual_dir_name: "",
            file_name: "x.mkv",
        };

        let first = resolver.resolve(SearchKind::Movie, &query, &ctx).await;
        assert_eq!(
            first,
            ResolutionResult::Unresolved {
                original_query: "Nothing Matches".to_string()
            }
        );

        // Second resolve hits the cache, issuing no further searches.
        let calls_after_first = client.search_calls.load(Ordering::SeqCst);
        let second = resolver.resolve(SearchKind::Movie, &query, &ctx).await;
        assert_eq!(first, second);
        assert_eq!(client.search_calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_web_fallback_recovers_scraped_id() {
        let mut client = FakeClient::default();
        client.web_result = Some(42);
        let resolver = MetadataResolver::new(
            Arc::new(client),
            DisambiguationPolicy::AutoFirst,
            tmdb_prefs(),
        );

        let query = NormalizedQuery {
            title: "Obscure Film".to_string(),
            year: None,
        };
        let ctx = ResolveContext {
            actual_dir_name: "",
            file_name: "obscure.mkv",
        };
        match resolver.resolve(SearchKind::Movie, &query, &ctx).await {
            ResolutionResult::Resolved { provider_id, .. } => assert_eq!(provider_id, 42),
            other => panic!("expected resolved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fail_closed_leaves_ambiguous_unresolved() {
        let client = FakeClient::default().with_response(
            "Twins",
            vec![candidate(1, "Twins", 1988), candidate(2, "Twins", 2005)],
        );
        let resolver = MetadataResolver::new(
            Arc::new(client),
            DisambiguationPolicy::FailClosed,
            tmdb_prefs(),
        );

        let query = NormalizedQuery {
            title: "Twins".to_string(),
            year: None,
        };
        let ctx = ResolveContext {
            actual_dir_name: "",
            file_name: "twins.mkv",
        };
        assert!(!resolver.resolve(SearchKind::Movie, &query, &ctx).await.is_resolved());
    }

    #[tokio::test]
    async fn test_interactive_choice_picks_candidate() {
        let client = FakeClient::default().with_response(
            "Twins",
            vec![candidate(1, "Twins", 1988), candidate(2, "Twins", 2005)],
        );
        let resolver = MetadataResolver::new(
            Arc::new(client),
            DisambiguationPolicy::Interactive(Box::new(|_, _| Some(1))),
            tmdb_prefs(),
        );

        let query = NormalizedQuery {
            title: "Twins".to_string(),
            year: None,
        };
        let ctx = ResolveContext {
            actual_dir_name: "",
            file_name: "twins.mkv",
        };
        match resolver.resolve(SearchKind::Movie, &query, &ctx).await {
            ResolutionResult::Resolved { provider_id, .. } => assert_eq!(provider_id, 2),
            other => panic!("expected resolved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_imdb_preference_wins_for_movies() {
        let client =
            FakeClient::default().with_response("The Matrix", vec![candidate(603, "The Matrix", 1999)]);
        let resolver = MetadataResolver::new(
            Arc::new(client),
            DisambiguationPolicy::AutoFirst,
            FolderIdPreferences {
                imdb: true,
                tvdb: false,
                tmdb: true,
            },
        );

        let query = NormalizedQuery {
            title: "The Matrix".to_string(),
            year: Some(1999),
        };
        let ctx = ResolveContext {
            actual_dir_name: "",
            file_name: "matrix.mkv",
        };
        match resolver.resolve(SearchKind::Movie, &query, &ctx).await {
            ResolutionResult::Resolved { canonical_name, .. } => {
                assert_eq!(canonical_name, "The Matrix (1999) {imdb-tt0133093}");
            }
            other => panic!("expected resolved, got {:?}", other),
        }
    }
}

// Resolution engine.
//
// Drives the pipeline once per unique listing title: guard, validated
// cache lookup, query generation, candidate search and scoring, detail
// validation, cache write, and finally back-fills every listing that
// shares the title. Sequential per title by design; the only shared
// mutable state is the cache, owned by the caller and passed in.

pub mod cache;
pub mod guard;
pub mod market;
pub mod normalize;
pub mod pace;
pub mod score;

use std::collections::HashMap;

use chrono::{Datelike, Utc};

use crate::models::ListingRecord;
use crate::services::tmdb::MovieCandidate;
use crate::services::MovieProvider;

use self::cache::{CacheOutcome, CachedFilm, ResolutionCache};
use self::market::MarketProfile;
use self::normalize::QueryVariant;
use self::pace::Pacer;
use self::score::{CandidateFacts, MatchTuning, ScoreContext};

/// Counters for one enrichment run, logged as the run report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub unique_titles: usize,
    /// Titles freshly resolved against the metadata service this run.
    pub resolved: usize,
    /// Titles served from a still-valid cache entry.
    pub from_cache: usize,
    /// Titles with no confident match (fresh or cached marker).
    pub not_found: usize,
    /// Titles the guard kept away from the service entirely.
    pub skipped: usize,
    /// Titles whose searches all failed; retried next run.
    pub transient_failures: usize,
    pub enriched_listings: usize,
}

enum TitleOutcome {
    ResolvedFresh,
    CachedHit,
    CachedAbsent,
    NotFound,
    Skipped,
    Transient,
}

struct PoolEntry {
    candidate: MovieCandidate,
    score: f64,
    variant_index: usize,
    query: String,
}

pub struct Resolver<'a, P> {
    provider: &'a P,
    profile: &'a MarketProfile,
    tuning: &'a MatchTuning,
    pacer: &'a Pacer,
}

impl<'a, P: MovieProvider> Resolver<'a, P> {
    pub fn new(
        provider: &'a P,
        profile: &'a MarketProfile,
        tuning: &'a MatchTuning,
        pacer: &'a Pacer,
    ) -> Self {
        Self {
            provider,
            profile,
            tuning,
            pacer,
        }
    }

    /// Resolve every unique title in `listings`, then back-fill the
    /// enrichment into each listing sharing a resolved title.
    pub async fn enrich(
        &self,
        listings: &mut [ListingRecord],
        cache: &mut ResolutionCache,
    ) -> EnrichmentSummary {
        let current_year = Utc::now().year();

        // Group by raw title, first-seen order. The first parseable
        // declared year/runtime per title is representative.
        let mut order: Vec<String> = Vec::new();
        let mut declared: HashMap<String, (Option<i32>, Option<i32>)> = HashMap::new();
        for listing in listings.iter() {
            let title = listing.movie_title.trim();
            if title.is_empty() {
                continue;
            }
            match declared.entry(title.to_string()) {
                std::collections::hash_map::Entry::Vacant(slot) => {
                    order.push(title.to_string());
                    slot.insert((listing.declared_year(), listing.declared_runtime()));
                }
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    let slot = slot.get_mut();
                    if slot.0.is_none() {
                        slot.0 = listing.declared_year();
                    }
                    if slot.1.is_none() {
                        slot.1 = listing.declared_runtime();
                    }
                }
            }
        }

        tracing::info!(
            "Enriching {} listings across {} unique titles",
            listings.len(),
            order.len()
        );

        let mut summary = EnrichmentSummary {
            unique_titles: order.len(),
            ..Default::default()
        };

        for title in &order {
            let (declared_year, declared_runtime) = declared[title.as_str()];
            let declared_year =
                declared_year.or_else(|| normalize::extract_year_from_title(title));

            let outcome = self
                .resolve_title(title, declared_year, declared_runtime, cache, current_year)
                .await;

            // Only titles that hit the network pay the inter-title delay.
            match outcome {
                TitleOutcome::ResolvedFresh => {
                    summary.resolved += 1;
                    self.pacer.pause().await;
                }
                TitleOutcome::NotFound => {
                    summary.not_found += 1;
                    self.pacer.pause().await;
                }
                TitleOutcome::Transient => {
                    summary.transient_failures += 1;
                    self.pacer.pause().await;
                }
                TitleOutcome::CachedHit => summary.from_cache += 1,
                TitleOutcome::CachedAbsent => summary.not_found += 1,
                TitleOutcome::Skipped => summary.skipped += 1,
            }
        }

        for listing in listings.iter_mut() {
            let key = normalize::normalize_title(&listing.movie_title);
            if key.is_empty() {
                continue;
            }
            if let Some(film) = cache.resolved_film(&key) {
                listing.apply_enrichment(film);
                summary.enriched_listings += 1;
            }
        }

        summary
    }

    async fn resolve_title(
        &self,
        title: &str,
        declared_year: Option<i32>,
        declared_runtime: Option<i32>,
        cache: &mut ResolutionCache,
        current_year: i32,
    ) -> TitleOutcome {
        let key = normalize::normalize_title(title);

        if let Some(reason) = guard::skip_reason(title, self.profile) {
            tracing::debug!("Skipping '{}' ({})", title, reason);
            // Guard rules evolve; an entry written under old rules is stale.
            cache.evict(&key);
            return TitleOutcome::Skipped;
        }

        let queries = normalize::generate_queries(title, self.profile);
        let Some(base) = queries.first() else {
            return TitleOutcome::Skipped;
        };

        let required_tokens = self.profile.required_brand_tokens(title);
        let strict_year = !required_tokens.is_empty();
        let ctx = ScoreContext {
            declared_year,
            declared_runtime,
            strict_year,
            alias_sourced: false,
            current_year,
        };

        match cache.lookup(&key, &base.text, &ctx, &required_tokens, self.tuning) {
            CacheOutcome::Resolved(film) => {
                tracing::debug!(
                    "Cache hit for '{}': {} ({})",
                    title,
                    film.tmdb_title,
                    film.tmdb_id
                );
                return TitleOutcome::CachedHit;
            }
            CacheOutcome::Absent => {
                tracing::debug!("Cache marks '{}' as not found", title);
                return TitleOutcome::CachedAbsent;
            }
            CacheOutcome::Miss => {}
        }

        tracing::info!(
            "Searching for '{}' (year: {:?}, runtime: {:?})",
            title,
            declared_year,
            declared_runtime
        );

        let (pool, any_search_ok) = self
            .collect_candidates(&queries, &ctx, &required_tokens)
            .await;

        let threshold = if strict_year {
            self.tuning.broadcast_accept_threshold
        } else {
            self.tuning.accept_threshold
        };
        let finalists: Vec<&PoolEntry> = pool.iter().filter(|c| c.score >= threshold).collect();

        if finalists.is_empty() {
            if any_search_ok {
                tracing::info!(
                    "No confident match for '{}' ({} candidates considered)",
                    title,
                    pool.len()
                );
                cache.put_absent(&key, declared_year, declared_runtime);
                return TitleOutcome::NotFound;
            }
            tracing::warn!("All searches failed for '{}'; will retry next run", title);
            return TitleOutcome::Transient;
        }

        // Detail validation. Runtime confirmation is only worth extra
        // lookups when the listing actually declared a runtime.
        let check_limit = if declared_runtime.is_some() { 3 } else { 1 };
        let mut explicit_rejection = false;

        for entry in finalists.iter().take(check_limit) {
            let details = match self.provider.movie_details(entry.candidate.id).await {
                Ok(details) => details,
                Err(e) => {
                    tracing::warn!(
                        "Detail fetch failed for {} ('{}'): {:#}",
                        entry.candidate.id,
                        title,
                        e
                    );
                    continue;
                }
            };

            if !guard::passes_brand_gate(
                &required_tokens,
                &details.title,
                details.original_title.as_deref(),
            ) {
                tracing::debug!("[Skip] '{}' fails brand gate for '{}'", details.title, title);
                explicit_rejection = true;
                continue;
            }

            if let (Some(declared), Some(actual)) = (declared_runtime, details.runtime) {
                let tolerance = score::runtime_tolerance(declared, self.tuning);
                if (declared - actual).abs() > tolerance {
                    tracing::info!(
                        "[Skip] '{}' runtime mismatch ({} vs {} declared)",
                        details.title,
                        actual,
                        declared
                    );
                    explicit_rejection = true;
                    continue;
                }
            }

            let film = CachedFilm {
                tmdb_id: details.id,
                tmdb_title: details.title.clone(),
                tmdb_original_title: details.original_title.clone(),
                release_date: details.release_date.clone(),
                director: details.director().map(str::to_string),
                runtime: details.runtime,
                genres: details.genre_names(),
                poster_path: details.poster_path.clone(),
                backdrop_path: details.backdrop_path.clone(),
                overview: details.overview.clone(),
                vote_average: details.vote_average,
            };

            if entry.query != title {
                tracing::debug!(
                    "Matched '{}' via '{}' (score {:.2})",
                    title,
                    entry.query,
                    entry.score
                );
            }
            tracing::info!("Resolved '{}' -> {} ({})", title, film.tmdb_title, film.tmdb_id);
            cache.put_resolved(&key, film, declared_year, declared_runtime);
            return TitleOutcome::ResolvedFresh;
        }

        if explicit_rejection {
            tracing::info!("All finalists rejected for '{}'", title);
            cache.put_absent(&key, declared_year, declared_runtime);
            return TitleOutcome::NotFound;
        }

        // Finalists existed but every detail fetch failed: transient, so
        // nothing is cached and the next run retries.
        tracing::warn!("Detail fetches failed for '{}'; will retry next run", title);
        TitleOutcome::Transient
    }

    /// One search call per query variant, merged into a pool keyed by
    /// candidate id. A candidate seen again from a later variant keeps its
    /// best score; ties keep the earliest variant.
    async fn collect_candidates(
        &self,
        queries: &[QueryVariant],
        ctx: &ScoreContext,
        required_tokens: &[String],
    ) -> (Vec<PoolEntry>, bool) {
        let mut by_id: HashMap<i64, usize> = HashMap::new();
        let mut pool: Vec<PoolEntry> = Vec::new();
        let mut any_search_ok = false;

        for (variant_index, variant) in queries.iter().enumerate() {
            if variant.text.chars().count() < 2 {
                continue;
            }

            // A screening-date "year" would wrongly narrow the search;
            // only a plausible release year is worth filtering by.
            let search_year = ctx
                .declared_year
                .filter(|y| *y < ctx.current_year)
                .or(variant.year_hint);

            let results = match self.provider.search_movie(&variant.text, search_year).await {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!("Search failed for '{}': {:#}", variant.text, e);
                    continue;
                }
            };
            any_search_ok = true;

            let variant_ctx = ScoreContext {
                declared_year: ctx.declared_year.or(variant.year_hint),
                alias_sourced: variant.from_alias,
                ..ctx.clone()
            };

            for candidate in results.into_iter().take(5) {
                if !guard::passes_brand_gate(
                    required_tokens,
                    &candidate.title,
                    candidate.original_title.as_deref(),
                ) {
                    continue;
                }

                let score = score::score_candidate(
                    &variant.text,
                    &CandidateFacts::from(&candidate),
                    &variant_ctx,
                    self.tuning,
                );

                match by_id.get(&candidate.id).copied() {
                    Some(slot) => {
                        if score > pool[slot].score {
                            pool[slot] = PoolEntry {
                                candidate,
                                score,
                                variant_index,
                                query: variant.text.clone(),
                            };
                        }
                    }
                    None => {
                        by_id.insert(candidate.id, pool.len());
                        pool.push(PoolEntry {
                            candidate,
                            score,
                            variant_index,
                            query: variant.text.clone(),
                        });
                    }
                }
            }
        }

        pool.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.variant_index.cmp(&b.variant_index))
        });

        (pool, any_search_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};

    use crate::services::tmdb::{Credits, CrewMember, Genre, MovieDetails};

    #[derive(Default)]
    struct StubProvider {
        search_calls: AtomicUsize,
        detail_calls: AtomicUsize,
        queries_seen: Mutex<Vec<String>>,
        by_query: HashMap<String, Vec<MovieCandidate>>,
        details: HashMap<i64, MovieDetails>,
        fail_search: bool,
    }

    impl MovieProvider for StubProvider {
        async fn search_movie(
            &self,
            query: &str,
            _year: Option<i32>,
        ) -> Result<Vec<MovieCandidate>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.queries_seen.lock().unwrap().push(query.to_string());
            if self.fail_search {
                return Err(anyhow!("service unavailable"));
            }
            Ok(self.by_query.get(query).cloned().unwrap_or_default())
        }

        async fn movie_details(&self, id: i64) -> Result<MovieDetails> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            self.details
                .get(&id)
                .cloned()
                .ok_or_else(|| anyhow!("no details for {id}"))
        }
    }

    fn candidate(
        id: i64,
        title: &str,
        original: Option<&str>,
        release_date: &str,
        votes: i64,
    ) -> MovieCandidate {
        MovieCandidate {
            id,
            title: title.to_string(),
            original_title: original.map(str::to_string),
            release_date: Some(release_date.to_string()),
            popularity: Some(10.0),
            vote_count: Some(votes),
        }
    }

    fn details_for(c: &MovieCandidate, runtime: Option<i32>, director: &str) -> MovieDetails {
        MovieDetails {
            id: c.id,
            title: c.title.clone(),
            original_title: c.original_title.clone(),
            overview: Some(format!("About {}", c.title)),
            release_date: c.release_date.clone(),
            poster_path: Some(format!("/poster-{}.jpg", c.id)),
            backdrop_path: None,
            vote_average: Some(7.0),
            runtime,
            genres: Some(vec![Genre {
                id: 18,
                name: "Drama".into(),
            }]),
            credits: Some(Credits {
                crew: Some(vec![CrewMember {
                    name: director.to_string(),
                    job: Some("Director".into()),
                }]),
            }),
        }
    }

    fn listing(title: &str) -> ListingRecord {
        ListingRecord {
            cinema_name: "Test Cinema".into(),
            movie_title: title.to_string(),
            date_text: "2026-08-07".into(),
            showtime: "19:30".into(),
            ..Default::default()
        }
    }

    fn test_cache(name: &str) -> ResolutionCache {
        let path = PathBuf::from(std::env::temp_dir()).join(format!(
            "showtime-enricher-resolver-{}-{}.json",
            std::process::id(),
            name
        ));
        ResolutionCache::load(&path, false)
    }

    async fn run(
        provider: &StubProvider,
        listings: &mut [ListingRecord],
        cache: &mut ResolutionCache,
    ) -> EnrichmentSummary {
        let profile = MarketProfile::default();
        let tuning = MatchTuning::default();
        let pacer = Pacer::disabled();
        let resolver = Resolver::new(provider, &profile, &tuning, &pacer);
        resolver.enrich(listings, cache).await
    }

    #[tokio::test]
    async fn test_guarded_titles_issue_no_external_calls() {
        let provider = StubProvider::default();
        let mut listings = vec![listing("Friday Film Quiz"), listing("Open Mic Night")];
        let mut cache = test_cache("guard");

        let summary = run(&provider, &mut listings, &mut cache).await;

        assert_eq!(summary.skipped, 2);
        assert_eq!(provider.search_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.detail_calls.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_event_prefix_resolution_and_backfill() {
        let amelie = candidate(
            194,
            "Amélie",
            Some("Le Fabuleux Destin d'Amélie Poulain"),
            "2001-04-25",
            11_000,
        );
        let mut provider = StubProvider::default();
        provider
            .by_query
            .insert("Amélie".into(), vec![amelie.clone()]);
        provider
            .details
            .insert(194, details_for(&amelie, Some(122), "Jean-Pierre Jeunet"));

        let mut first = listing("Drink & Dine: Amélie");
        first.year = Some("2001".into());
        let second = listing("Drink & Dine: Amélie");
        let mut listings = vec![first, second];
        let mut cache = test_cache("amelie");

        let summary = run(&provider, &mut listings, &mut cache).await;

        assert_eq!(summary.unique_titles, 1);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.enriched_listings, 2);
        // The event prefix was stripped before searching.
        assert!(provider
            .queries_seen
            .lock()
            .unwrap()
            .contains(&"Amélie".to_string()));

        for l in &listings {
            assert_eq!(l.tmdb_id, Some(194));
            assert_eq!(l.director.as_deref(), Some("Jean-Pierre Jeunet"));
            assert_eq!(l.runtime, Some(122));
        }
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let film = candidate(550, "Fight Club", None, "1999-10-15", 27_000);
        let mut provider = StubProvider::default();
        provider
            .by_query
            .insert("Fight Club".into(), vec![film.clone()]);
        provider
            .details
            .insert(550, details_for(&film, Some(139), "David Fincher"));

        let mut listings = vec![listing("Fight Club")];
        let mut cache = test_cache("idempotent");

        let first = run(&provider, &mut listings, &mut cache).await;
        assert_eq!(first.resolved, 1);
        let searches_after_first = provider.search_calls.load(Ordering::SeqCst);
        let id_after_first = listings[0].tmdb_id;

        let mut listings_again = vec![listing("Fight Club")];
        let second = run(&provider, &mut listings_again, &mut cache).await;

        assert_eq!(second.resolved, 0);
        assert_eq!(second.from_cache, 1);
        assert_eq!(listings_again[0].tmdb_id, id_after_first);
        // No further external calls: the cached entry re-validated.
        assert_eq!(
            provider.search_calls.load(Ordering::SeqCst),
            searches_after_first
        );
    }

    #[tokio::test]
    async fn test_broadcast_title_never_matches_unrelated_drama() {
        let recording = candidate(
            101,
            "National Theatre Live: A Streetcar Named Desire",
            None,
            "2014-09-16",
            60,
        );
        let drama_1951 = candidate(102, "A Streetcar Named Desire", None, "1951-09-18", 2_500);
        let desire = candidate(103, "Desire", None, "1936-04-11", 6_000);

        let hits = vec![desire, drama_1951, recording.clone()];
        let mut provider = StubProvider::default();
        provider
            .by_query
            .insert("NT Live: A Streetcar Named Desire".into(), hits.clone());
        provider
            .by_query
            .insert("A Streetcar Named Desire".into(), hits);
        provider
            .details
            .insert(101, details_for(&recording, Some(180), "Benedict Andrews"));

        let mut listings = vec![listing("NT Live: A Streetcar Named Desire")];
        let mut cache = test_cache("streetcar");

        let summary = run(&provider, &mut listings, &mut cache).await;

        assert_eq!(summary.resolved, 1);
        assert_eq!(listings[0].tmdb_id, Some(101));
        let matched = listings[0].tmdb_title.as_deref().unwrap();
        assert!(matched.to_lowercase().contains("streetcar"));
    }

    #[tokio::test]
    async fn test_runtime_validation_skips_short_film_homonym() {
        let short_film = candidate(1, "The Heist", None, "2015-03-01", 1_000);
        let feature = candidate(2, "The Heist", None, "2015-06-01", 1_000);
        let mut provider = StubProvider::default();
        provider
            .by_query
            .insert("The Heist".into(), vec![short_film.clone(), feature.clone()]);
        provider
            .details
            .insert(1, details_for(&short_film, Some(11), "A"));
        provider.details.insert(2, details_for(&feature, Some(98), "B"));

        let mut entry = listing("The Heist");
        entry.runtime_min = Some("95".into());
        let mut listings = vec![entry];
        let mut cache = test_cache("runtime");

        let summary = run(&provider, &mut listings, &mut cache).await;

        assert_eq!(summary.resolved, 1);
        assert_eq!(listings[0].tmdb_id, Some(2));
        // The short was fetched, failed validation, and was skipped.
        assert_eq!(provider.detail_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_writes_no_cache_entry() {
        let provider = StubProvider {
            fail_search: true,
            ..Default::default()
        };
        let mut listings = vec![listing("Some Film")];
        let mut cache = test_cache("transient");

        let summary = run(&provider, &mut listings, &mut cache).await;

        assert_eq!(summary.transient_failures, 1);
        assert!(cache.is_empty());
        assert!(listings[0].tmdb_id.is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_cached_and_not_retried() {
        let mut provider = StubProvider::default();
        provider.by_query.insert("Obscurity".into(), Vec::new());

        let mut listings = vec![listing("Obscurity")];
        let mut cache = test_cache("notfound");

        let first = run(&provider, &mut listings, &mut cache).await;
        assert_eq!(first.not_found, 1);
        assert_eq!(cache.len(), 1);
        let searches_after_first = provider.search_calls.load(Ordering::SeqCst);

        let mut listings_again = vec![listing("Obscurity")];
        let second = run(&provider, &mut listings_again, &mut cache).await;
        assert_eq!(second.not_found, 1);
        assert_eq!(
            provider.search_calls.load(Ordering::SeqCst),
            searches_after_first
        );
    }

    #[tokio::test]
    async fn test_alias_path_resolves_when_direct_search_falls_short() {
        // TMDB lists Obayashi's film as "House" / "ハウス"; raw similarity
        // to "Hausu" is weak, the curated alias carries it over the line.
        let house = candidate(9, "House", Some("ハウス"), "1977-07-30", 700);
        let mut provider = StubProvider::default();
        provider.by_query.insert("Hausu".into(), vec![house.clone()]);
        provider
            .details
            .insert(9, details_for(&house, Some(88), "Nobuhiko Obayashi"));

        let mut listings = vec![listing("Hausu")];
        let mut cache = test_cache("hausu");

        let summary = run(&provider, &mut listings, &mut cache).await;

        assert_eq!(summary.resolved, 1);
        assert_eq!(listings[0].tmdb_id, Some(9));
        // Both the direct variant and the alias variant were searched.
        assert_eq!(provider.search_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_summary_counts_are_consistent() {
        let film = candidate(77, "Paris, Texas", None, "1984-05-19", 6_000);
        let mut provider = StubProvider::default();
        provider
            .by_query
            .insert("Paris, Texas".into(), vec![film.clone()]);
        provider
            .details
            .insert(77, details_for(&film, Some(145), "Wim Wenders"));
        provider.by_query.insert("Nothingness".into(), Vec::new());

        let mut listings = vec![
            listing("Paris, Texas"),
            listing("Paris, Texas"),
            listing("Friday Film Quiz"),
            listing("Nothingness"),
        ];
        let mut cache = test_cache("summary");

        let summary = run(&provider, &mut listings, &mut cache).await;

        assert_eq!(summary.unique_titles, 3);
        assert_eq!(
            summary.unique_titles,
            summary.resolved
                + summary.from_cache
                + summary.not_found
                + summary.skipped
                + summary.transient_failures
        );
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.enriched_listings, 2);
    }
}

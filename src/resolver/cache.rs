// Persistent resolution cache.
//
// Maps the normalized form of a listing title to the film it last
// resolved to, or to an explicit not-found marker. Entries are never
// trusted blindly: every lookup re-validates against the current guard
// rules and the current listing's declared year/runtime, because matching
// rules evolve between runs and a title can be shared by genuinely
// different films. The whole map is read at run start and written once at
// run end; this object is the only writer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::guard;
use super::score::{self, CandidateFacts, MatchTuning, ScoreContext};

/// Projection of a resolved film persisted in the cache and back-filled
/// into listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFilm {
    pub tmdb_id: i64,
    pub tmdb_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_original_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backdrop_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_average: Option<f64>,
}

impl CachedFilm {
    pub fn release_year(&self) -> Option<i32> {
        self.release_date.as_deref()?.split('-').next()?.parse().ok()
    }

    /// Re-score a cached film as if it were a fresh candidate. Cached
    /// entries were vetted once, so assume a healthy vote count rather
    /// than re-penalizing obscurity we can no longer measure.
    pub fn facts(&self) -> CandidateFacts<'_> {
        CandidateFacts {
            title: &self.tmdb_title,
            original_title: self.tmdb_original_title.as_deref(),
            release_year: self.release_year(),
            runtime: self.runtime,
            vote_count: 1000,
        }
    }
}

/// One cache slot: a resolved film, or `film: None` as the explicit
/// not-found marker, plus the declared context the resolution was made
/// under (needed to detect drift on later lookups).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub film: Option<CachedFilm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_runtime: Option<i32>,
}

/// Result of a validated lookup.
#[derive(Debug)]
pub enum CacheOutcome {
    /// A cached film that passed re-validation.
    Resolved(CachedFilm),
    /// A still-trusted explicit not-found marker.
    Absent,
    /// No entry, or the entry was evicted; resolve fresh.
    Miss,
}

#[derive(Debug)]
pub struct ResolutionCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
}

impl ResolutionCache {
    /// Load the cache file, treating a missing or unreadable file as
    /// empty: a cold cache costs API quota, never correctness.
    pub fn load(path: &Path, retry_not_found: bool) -> Self {
        let mut entries: HashMap<String, CacheEntry> = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        "Cache file {} is unreadable ({}), starting cold",
                        path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(
                    "Could not read cache file {} ({}), starting cold",
                    path.display(),
                    e
                );
                HashMap::new()
            }
        };

        let mut dirty = false;
        if retry_not_found {
            let before = entries.len();
            entries.retain(|_, entry| entry.film.is_some());
            let purged = before - entries.len();
            if purged > 0 {
                tracing::info!("Cleared {} not-found cache entries for retry", purged);
                dirty = true;
            }
        }

        tracing::debug!("Loaded {} cache entries from {}", entries.len(), path.display());
        Self {
            path: path.to_path_buf(),
            entries,
            dirty,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validated lookup. `query` is the cleaned base variant for the
    /// title; re-scoring runs against it, not the raw noisy title.
    pub fn lookup(
        &mut self,
        key: &str,
        query: &str,
        ctx: &ScoreContext,
        required_tokens: &[String],
        tuning: &MatchTuning,
    ) -> CacheOutcome {
        let Some(entry) = self.entries.get(key) else {
            return CacheOutcome::Miss;
        };

        let evict_reason: Option<&str> = match &entry.film {
            None => {
                // An absent marker is trusted until the listing's declared
                // runtime drifts materially from what it was recorded under.
                match (ctx.declared_runtime, entry.declared_runtime) {
                    (Some(now), Some(then))
                        if (now - then).abs() > score::runtime_tolerance(then, tuning) =>
                    {
                        Some("declared runtime changed")
                    }
                    _ => None,
                }
            }
            Some(film) => {
                if !guard::passes_brand_gate(
                    required_tokens,
                    &film.tmdb_title,
                    film.tmdb_original_title.as_deref(),
                ) {
                    Some("brand token gate")
                } else if let (Some(declared), Some(runtime)) = (ctx.declared_runtime, film.runtime)
                {
                    if (declared - runtime).abs() > score::runtime_tolerance(declared, tuning) {
                        Some("runtime mismatch")
                    } else {
                        rescore_reason(query, film, ctx, tuning)
                    }
                } else {
                    rescore_reason(query, film, ctx, tuning)
                }
            }
        };

        match evict_reason {
            Some(reason) => {
                tracing::info!("[Cache invalidate] '{}': {}", key, reason);
                self.entries.remove(key);
                self.dirty = true;
                CacheOutcome::Miss
            }
            None => match &self.entries[key].film {
                Some(film) => CacheOutcome::Resolved(film.clone()),
                None => CacheOutcome::Absent,
            },
        }
    }

    /// Unvalidated read, used for the back-fill pass after every title has
    /// already been looked up (and therefore validated) this run.
    pub fn resolved_film(&self, key: &str) -> Option<&CachedFilm> {
        self.entries.get(key).and_then(|e| e.film.as_ref())
    }

    pub fn put_resolved(
        &mut self,
        key: &str,
        film: CachedFilm,
        declared_year: Option<i32>,
        declared_runtime: Option<i32>,
    ) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                film: Some(film),
                declared_year,
                declared_runtime,
            },
        );
        self.dirty = true;
    }

    pub fn put_absent(
        &mut self,
        key: &str,
        declared_year: Option<i32>,
        declared_runtime: Option<i32>,
    ) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                film: None,
                declared_year,
                declared_runtime,
            },
        );
        self.dirty = true;
    }

    pub fn evict(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.dirty = true;
        }
    }

    /// Write the whole map back to disk. Skipped when nothing changed
    /// this run, so an all-cache-hit run does not rewrite the file.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            tracing::debug!("Cache unchanged, skipping write");
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize resolution cache")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache file {}", self.path.display()))?;
        tracing::info!("Wrote {} cache entries to {}", self.entries.len(), self.path.display());
        self.dirty = false;
        Ok(())
    }
}

fn rescore_reason(
    query: &str,
    film: &CachedFilm,
    ctx: &ScoreContext,
    tuning: &MatchTuning,
) -> Option<&'static str> {
    let score = score::score_candidate(query, &film.facts(), ctx, tuning);
    (score < tuning.revalidate_threshold).then_some("below re-validation threshold")
}

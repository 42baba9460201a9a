use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::resolver::cache::CachedFilm;

/// One scraped screening of a film at one venue, date and time.
///
/// Produced by the per-cinema scraping collaborators; this crate never
/// creates listings, it only attaches enrichment fields to them. Scraped
/// fields arrive as loosely-typed strings and may be absent or unreliable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingRecord {
    pub cinema_name: String,
    pub movie_title: String,
    pub date_text: String,
    pub showtime: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie_title_en: Option<String>,

    // Fields some scrapers fill from the cinema's own detail pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_min: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,

    // Enrichment fields, filled by the resolution engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_original_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_poster_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_backdrop_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_overview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_average: Option<f64>,
}

impl ListingRecord {
    /// Release year declared by the scraper, if it parses and is plausible.
    pub fn declared_year(&self) -> Option<i32> {
        self.year.as_deref().and_then(parse_year_value)
    }

    /// Runtime in minutes declared by the scraper. Accepts "112", "112min",
    /// "112 min" and similar; anything else is treated as absent.
    pub fn declared_runtime(&self) -> Option<i32> {
        let raw = self.runtime_min.as_deref()?;
        let digits = raw.trim().trim_end_matches(|c: char| !c.is_ascii_digit());
        let minutes: i32 = digits.trim().parse().ok()?;
        (minutes > 0).then_some(minutes)
    }

    /// Merge a resolved film into this listing. Fields the scraper already
    /// filled are left untouched.
    pub fn apply_enrichment(&mut self, film: &CachedFilm) {
        if self.tmdb_id.is_none() {
            self.tmdb_id = Some(film.tmdb_id);
        }
        if self.tmdb_title.is_none() {
            self.tmdb_title = Some(film.tmdb_title.clone());
        }
        if self.tmdb_original_title.is_none() {
            self.tmdb_original_title = film.tmdb_original_title.clone();
        }
        if self.tmdb_poster_path.is_none() {
            self.tmdb_poster_path = film.poster_path.clone();
        }
        if self.tmdb_backdrop_path.is_none() {
            self.tmdb_backdrop_path = film.backdrop_path.clone();
        }
        if self.tmdb_overview.is_none() {
            self.tmdb_overview = film.overview.clone();
        }
        if self.runtime.is_none() {
            self.runtime = film.runtime;
        }
        if self.genres.is_none() && !film.genres.is_empty() {
            self.genres = Some(film.genres.clone());
        }
        if self.vote_average.is_none() {
            self.vote_average = film.vote_average;
        }
        if self.director.is_none() {
            self.director = film.director.clone();
        }
        if self.year.is_none() {
            if let Some(year) = film.release_year() {
                self.year = Some(year.to_string());
            }
        }
    }
}

/// Parse a scraped year string, rejecting values outside the plausible
/// range for a film release (pre-cinema or far future).
pub fn parse_year_value(raw: &str) -> Option<i32> {
    let year: i32 = raw.trim().parse().ok()?;
    let current_year = Utc::now().year();
    (1880..=current_year + 3).contains(&year).then_some(year)
}

// TMDB metadata provider client
// API Documentation: https://developer.themoviedb.org/reference/intro/getting-started

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::MovieProvider;

const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";

/// TMDB API client
pub struct TmdbClient {
    client: Client,
    api_key: String,
}

/// Search result page for movies
#[derive(Debug, Deserialize)]
struct MovieSearchResults {
    results: Vec<MovieCandidate>,
}

/// One search hit. Ephemeral: scored once, then discarded unless it wins.
#[derive(Debug, Clone, Deserialize)]
pub struct MovieCandidate {
    pub id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<String>,
    pub popularity: Option<f64>,
    pub vote_count: Option<i64>,
}

impl MovieCandidate {
    pub fn release_year(&self) -> Option<i32> {
        year_of(self.release_date.as_deref())
    }
}

/// Detailed movie info
#[derive(Debug, Clone, Deserialize)]
pub struct MovieDetails {
    pub id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
    pub runtime: Option<i32>,
    pub genres: Option<Vec<Genre>>,
    pub credits: Option<Credits>,
}

impl MovieDetails {
    pub fn release_year(&self) -> Option<i32> {
        year_of(self.release_date.as_deref())
    }

    /// Name of the first crew member credited as Director, if any.
    pub fn director(&self) -> Option<&str> {
        self.credits
            .as_ref()?
            .crew
            .as_ref()?
            .iter()
            .find(|c| c.job.as_deref() == Some("Director"))
            .map(|c| c.name.as_str())
    }

    pub fn genre_names(&self) -> Vec<String> {
        self.genres
            .as_ref()
            .map(|genres| genres.iter().map(|g| g.name.clone()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Credits response (crew only - cast is not needed for enrichment)
#[derive(Debug, Clone, Deserialize)]
pub struct Credits {
    pub crew: Option<Vec<CrewMember>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrewMember {
    pub name: String,
    pub job: Option<String>,
}

fn year_of(release_date: Option<&str>) -> Option<i32> {
    release_date?.split('-').next()?.parse().ok()
}

impl TmdbClient {
    /// Create a new TMDB client with a bounded per-request timeout.
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key,
        }
    }
}

impl MovieProvider for TmdbClient {
    async fn search_movie(&self, query: &str, year: Option<i32>) -> Result<Vec<MovieCandidate>> {
        let mut url = format!(
            "{}/search/movie?api_key={}&query={}&include_adult=false&language=en-GB",
            TMDB_API_BASE,
            self.api_key,
            urlencoding::encode(query)
        );

        if let Some(y) = year {
            url.push_str(&format!("&year={}", y));
        }

        let response: MovieSearchResults = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to search TMDB for movies")?
            .json()
            .await
            .context("Failed to parse TMDB movie search response")?;

        Ok(response.results)
    }

    async fn movie_details(&self, id: i64) -> Result<MovieDetails> {
        let url = format!(
            "{}/movie/{}?api_key={}&language=en-GB&append_to_response=credits",
            TMDB_API_BASE, id, self.api_key
        );

        let response: MovieDetails = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get TMDB movie details")?
            .json()
            .await
            .context("Failed to parse TMDB movie details response")?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_year_parsing() {
        let candidate = MovieCandidate {
            id: 1,
            title: "Test".into(),
            original_title: None,
            release_date: Some("2001-04-25".into()),
            popularity: None,
            vote_count: None,
        };
        assert_eq!(candidate.release_year(), Some(2001));

        let undated = MovieCandidate {
            release_date: Some("".into()),
            ..candidate.clone()
        };
        assert_eq!(undated.release_year(), None);
    }

    #[test]
    fn test_director_extraction() {
        let details: MovieDetails = serde_json::from_str(
            r#"{
                "id": 194,
                "title": "Amélie",
                "original_title": "Le Fabuleux Destin d'Amélie Poulain",
                "release_date": "2001-04-25",
                "runtime": 122,
                "genres": [{"id": 35, "name": "Comedy"}],
                "credits": {
                    "crew": [
                        {"name": "Bruno Delbonnel", "job": "Director of Photography"},
                        {"name": "Jean-Pierre Jeunet", "job": "Director"}
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(details.director(), Some("Jean-Pierre Jeunet"));
        assert_eq!(details.genre_names(), vec!["Comedy".to_string()]);
        assert_eq!(details.release_year(), Some(2001));
    }
}

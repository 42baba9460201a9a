// Services module - external metadata providers

pub mod tmdb;

use anyhow::Result;

use self::tmdb::{MovieCandidate, MovieDetails};

/// Seam between the resolution engine and the external metadata service.
///
/// The engine is generic over this trait so tests can drive it with a
/// canned, call-counting provider instead of the network.
pub trait MovieProvider {
    /// Free-text movie search, optionally narrowed to a release year.
    fn search_movie(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> impl std::future::Future<Output = Result<Vec<MovieCandidate>>> + Send;

    /// Full detail for one candidate (adds runtime, credits, artwork).
    fn movie_details(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<MovieDetails>> + Send;
}

/// TMDB (The Movie Database) metadata provider
///
/// Endpoints used:
/// 1. Details: /movie/{id}
/// 2. Popular: /movie/popular?page=N
/// 3. Search: /search/movie?query=...
/// 4. Genres: /genre/movie/list
///
/// Every response is cached; transient failures (connect errors, timeouts,
/// 429 and 5xx) are retried according to the configured [`RetryPolicy`].
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{Genre, Movie, MovieId, TmdbGenreList, TmdbMovie, TmdbMovieDetails, TmdbPage},
    services::providers::{with_retries, MetadataProvider, RetryPolicy},
};
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DETAILS_CACHE_TTL: u64 = 86400; // 24 hours
const POPULAR_CACHE_TTL: u64 = 3600; // 1 hour
const SEARCH_CACHE_TTL: u64 = 3600;
const GENRES_CACHE_TTL: u64 = 86400;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Cache,
    retry: RetryPolicy,
}

/// Maps a non-success TMDB status to the error the caller should see
fn classify_status(status: StatusCode, path: &str, body: &str) -> AppError {
    if status == StatusCode::NOT_FOUND {
        AppError::NotFound(format!("TMDB resource {}", path))
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        AppError::ServiceUnavailable(format!("TMDB returned status {}", status))
    } else {
        AppError::ExternalApi(format!("TMDB API returned status {}: {}", status, body))
    }
}

/// TMDB's year filter takes a single year; ranges use release-date bounds
fn year_params(year_range: Option<(i32, i32)>) -> Vec<(&'static str, String)> {
    match year_range {
        None => vec![],
        Some((from, to)) if from == to => vec![("year", from.to_string())],
        Some((from, to)) => {
            let mut params = Vec::new();
            if from != i32::MIN {
                params.push(("primary_release_date.gte", format!("{}-01-01", from)));
            }
            if to != i32::MAX {
                params.push(("primary_release_date.lte", format!("{}-12-31", to)));
            }
            params
        }
    }
}

impl TmdbProvider {
    pub fn new(cache: Cache, api_key: String, api_url: String, retry: RetryPolicy) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
            retry,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> AppResult<T> {
        with_retries(self.retry, path, || self.get_json_once(path, params)).await
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("language", "en-US")])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(path, status = %status, body = %body, "TMDB request failed");
            return Err(classify_status(status, path, &body));
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(error = %e, path, "Failed to deserialize TMDB response");
            AppError::ExternalApi(format!("Failed to parse TMDB response: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbProvider {
    async fn movie_details(&self, movie_id: MovieId) -> AppResult<Movie> {
        cached!(
            self.cache,
            CacheKey::MovieDetails(movie_id),
            DETAILS_CACHE_TTL,
            async move {
                let details: TmdbMovieDetails =
                    self.get_json(&format!("/movie/{}", movie_id), &[]).await?;
                tracing::debug!(movie_id, provider = "tmdb", "Movie details fetched");
                Ok::<Movie, AppError>(details.into())
            }
        )
    }

    async fn popular_movies(&self, page: u32) -> AppResult<Vec<Movie>> {
        if page == 0 {
            return Err(AppError::InvalidInput("Pages start at 1".to_string()));
        }

        cached!(
            self.cache,
            CacheKey::PopularMovies(page),
            POPULAR_CACHE_TTL,
            async move {
                let response: TmdbPage<TmdbMovie> = self
                    .get_json("/movie/popular", &[("page", page.to_string())])
                    .await?;

                // TMDB answers pages past the end with an empty list
                let movies: Vec<Movie> = if response.total_pages > 0 && page > response.total_pages {
                    Vec::new()
                } else {
                    response.results.into_iter().map(Movie::from).collect()
                };

                tracing::info!(
                    page = response.page,
                    results = movies.len(),
                    provider = "tmdb",
                    "Popular movies fetched"
                );
                Ok::<Vec<Movie>, AppError>(movies)
            }
        )
    }

    async fn search_movies(
        &self,
        query: &str,
        year_range: Option<(i32, i32)>,
    ) -> AppResult<Vec<Movie>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        cached!(
            self.cache,
            CacheKey::MovieSearch {
                query: query.to_string(),
                year_range,
            },
            SEARCH_CACHE_TTL,
            async move {
                let mut params = vec![
                    ("query", query.trim().to_string()),
                    ("page", "1".to_string()),
                ];
                params.extend(year_params(year_range));

                let response: TmdbPage<TmdbMovie> = self.get_json("/search/movie", &params).await?;
                let movies: Vec<Movie> = response.results.into_iter().map(Movie::from).collect();

                tracing::info!(
                    query = %query,
                    results = movies.len(),
                    provider = "tmdb",
                    "Movie search completed"
                );
                Ok::<Vec<Movie>, AppError>(movies)
            }
        )
    }

    async fn genres(&self) -> AppResult<Vec<Genre>> {
        cached!(self.cache, CacheKey::Genres, GENRES_CACHE_TTL, async move {
            let list: TmdbGenreList = self.get_json("/genre/movie/list", &[]).await?;
            Ok::<Vec<Genre>, AppError>(list.genres)
        })
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cache::MemoryBackend;
    use std::sync::Arc;

    async fn create_test_provider(api_url: &str) -> TmdbProvider {
        let (cache, _handle) = Cache::new(Arc::new(MemoryBackend::new())).await;
        TmdbProvider::new(
            cache,
            "test_key".to_string(),
            api_url.to_string(),
            RetryPolicy::none(),
        )
        .unwrap()
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "/movie/1", ""),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "/movie/1", ""),
            AppError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "/movie/1", ""),
            AppError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "/movie/1", "bad key"),
            AppError::ExternalApi(_)
        ));
    }

    #[test]
    fn test_year_params() {
        assert!(year_params(None).is_empty());
        assert_eq!(year_params(Some((1999, 1999))), vec![("year", "1999".to_string())]);
        assert_eq!(
            year_params(Some((1990, 2000))),
            vec![
                ("primary_release_date.gte", "1990-01-01".to_string()),
                ("primary_release_date.lte", "2000-12-31".to_string()),
            ]
        );
        assert_eq!(
            year_params(Some((i32::MIN, 2000))),
            vec![("primary_release_date.lte", "2000-12-31".to_string())]
        );
    }

    #[tokio::test]
    async fn test_trailing_slash_trimmed() {
        let provider = create_test_provider("http://test.local/3/").await;
        assert_eq!(provider.api_url, "http://test.local/3");
    }

    #[tokio::test]
    async fn test_empty_search_rejected() {
        let provider = create_test_provider("http://test.local").await;
        let result = provider.search_movies("   ", None).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_cached_details_served_without_network() {
        let provider = create_test_provider("http://127.0.0.1:9").await;
        let movie = Movie {
            id: 603,
            title: "The Matrix".to_string(),
            overview: None,
            genre_ids: vec![28],
            release_year: Some(1999),
            vote_average: Some(8.2),
            popularity: None,
            poster_path: None,
        };
        provider
            .cache
            .set(&CacheKey::MovieDetails(603), &movie, 60)
            .await
            .unwrap();

        assert_eq!(provider.movie_details(603).await.unwrap(), movie);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let provider = create_test_provider("http://127.0.0.1:9").await;
        let err = provider.movie_details(1).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }

    #[test]
    fn test_popular_page_deserialization() {
        let json = r#"{
            "page": 1,
            "results": [
                {"id": 550, "title": "Fight Club", "genre_ids": [18], "release_date": "1999-10-15", "vote_average": 8.4},
                {"id": 680, "title": "Pulp Fiction", "genre_ids": [53, 80], "release_date": "1994-09-10"}
            ],
            "total_pages": 500,
            "total_results": 10000
        }"#;

        let page: TmdbPage<TmdbMovie> = serde_json::from_str(json).unwrap();
        assert_eq!(page.total_pages, 500);
        let movies: Vec<Movie> = page.results.into_iter().map(Movie::from).collect();
        assert_eq!(movies[0].title, "Fight Club");
        assert_eq!(movies[1].genre_ids, vec![53, 80]);
        assert_eq!(movies[1].vote_average, None);
    }
}

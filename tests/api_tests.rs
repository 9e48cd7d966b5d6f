use axum::http::{header::AUTHORIZATION, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;

use cinematch_api::{
    db::{cache::MemoryBackend, Cache, CacheWriterHandle, MemoryRatingStore, MemoryUserStore},
    error::{AppError, AppResult},
    models::{Genre, Movie, MovieId},
    routes::{create_router, AppState},
    services::{
        providers::MetadataProvider, AuthService, MovieService, PasswordHasher,
        RecommendationService,
    },
};

/// In-process stand-in for TMDB
struct FakeTmdb {
    movies: Vec<Movie>,
}

impl FakeTmdb {
    fn new() -> Self {
        let movie = |id: MovieId, title: &str, genre: i64, year: i32, vote: f64| Movie {
            id,
            title: title.to_string(),
            overview: None,
            genre_ids: vec![genre],
            release_year: Some(year),
            vote_average: Some(vote),
            popularity: Some(vote * 10.0),
            poster_path: Some(format!("/{}.jpg", id)),
        };

        Self {
            movies: vec![
                movie(603, "The Matrix", 28, 1999, 8.2),
                movie(604, "The Matrix Reloaded", 28, 2003, 7.0),
                movie(348, "Alien", 27, 1979, 8.1),
                movie(679, "Aliens", 28, 1986, 7.9),
                movie(13, "Forrest Gump", 18, 1994, 8.5),
                movie(278, "The Shawshank Redemption", 18, 1994, 8.7),
                movie(680, "Pulp Fiction", 80, 1994, 8.5),
                movie(155, "The Dark Knight", 28, 2008, 8.5),
            ],
        }
    }
}

#[async_trait::async_trait]
impl MetadataProvider for FakeTmdb {
    async fn movie_details(&self, movie_id: MovieId) -> AppResult<Movie> {
        self.movies
            .iter()
            .find(|m| m.id == movie_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("TMDB resource /movie/{}", movie_id)))
    }

    async fn popular_movies(&self, page: u32) -> AppResult<Vec<Movie>> {
        Ok(if page == 1 { self.movies.clone() } else { vec![] })
    }

    async fn search_movies(
        &self,
        query: &str,
        _year_range: Option<(i32, i32)>,
    ) -> AppResult<Vec<Movie>> {
        let query = query.to_lowercase();
        Ok(self
            .movies
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&query))
            .cloned()
            .collect())
    }

    async fn genres(&self) -> AppResult<Vec<Genre>> {
        Ok(vec![
            Genre { id: 18, name: "Drama".into() },
            Genre { id: 27, name: "Horror".into() },
            Genre { id: 28, name: "Action".into() },
            Genre { id: 80, name: "Crime".into() },
        ])
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Server plus the cache writer, which must outlive the test
async fn create_test_server() -> (TestServer, CacheWriterHandle) {
    let (cache, writer) = Cache::new(Arc::new(MemoryBackend::new())).await;
    let ratings = Arc::new(MemoryRatingStore::new());
    let metadata: Arc<dyn MetadataProvider> = Arc::new(FakeTmdb::new());

    let state = Arc::new(AppState {
        auth: AuthService::new(
            Arc::new(MemoryUserStore::new()),
            cache.clone(),
            PasswordHasher::with_cost(1024, 1).unwrap(),
            3600,
        ),
        recommendations: RecommendationService::new(
            ratings.clone(),
            Arc::clone(&metadata),
            cache,
            3600,
        ),
        movies: MovieService::new(ratings, metadata),
    });

    (TestServer::new(create_router(state)).unwrap(), writer)
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

async fn signup(server: &TestServer, name: &str) -> String {
    let response = server
        .post("/api/v1/users")
        .json(&json!({ "display_name": name, "password": "password123" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["token"].as_str().unwrap().to_string()
}

async fn rate(server: &TestServer, token: &str, movie_id: MovieId, score: i16) {
    server
        .put("/api/v1/ratings")
        .add_header(AUTHORIZATION, bearer(token))
        .json(&json!({ "movie_id": movie_id, "score": score }))
        .await
        .assert_status_ok();
}

async fn get_json(server: &TestServer, token: &str, path: &str) -> Value {
    let response = server
        .get(path)
        .add_header(AUTHORIZATION, bearer(token))
        .await;
    response.assert_status_ok();
    response.json()
}

fn ids(items: &Value, field: &str) -> Vec<i64> {
    items
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item[field].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let (server, _writer) = create_test_server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "healthy" }));
    assert!(!response.header("x-request-id").is_empty());
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (server, _writer) = create_test_server().await;
    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("trace-abc-123"),
        )
        .await;
    assert_eq!(response.header("x-request-id"), "trace-abc-123");
}

#[tokio::test]
async fn test_signup_and_login() {
    let (server, _writer) = create_test_server().await;
    let token = signup(&server, "neo").await;

    let me = get_json(&server, &token, "/api/v1/me").await;
    assert_eq!(me["display_name"], "neo");
    assert!(me.get("password_hash").is_none());

    let response = server
        .post("/api/v1/sessions")
        .json(&json!({ "display_name": "neo", "password": "password123" }))
        .await;
    response.assert_status_ok();
    let session: Value = response.json();
    assert_eq!(session["user"]["display_name"], "neo");
    assert_ne!(session["token"].as_str().unwrap(), token);
}

#[tokio::test]
async fn test_signup_errors() {
    let (server, _writer) = create_test_server().await;
    signup(&server, "trinity").await;

    let duplicate = server
        .post("/api/v1/users")
        .json(&json!({ "display_name": "trinity", "password": "password456" }))
        .await;
    duplicate.assert_status(StatusCode::CONFLICT);

    let weak = server
        .post("/api/v1/users")
        .json(&json!({ "display_name": "switch", "password": "short" }))
        .await;
    weak.assert_status(StatusCode::BAD_REQUEST);
    assert!(weak.json::<Value>()["error"]
        .as_str()
        .unwrap()
        .contains("Password"));
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let (server, _writer) = create_test_server().await;
    signup(&server, "tank").await;

    let response = server
        .post("/api/v1/sessions")
        .json(&json!({ "display_name": "tank", "password": "password999" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let (server, _writer) = create_test_server().await;

    server
        .get("/api/v1/recommendations")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .get("/api/v1/me")
        .add_header(AUTHORIZATION, bearer("not-a-session"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert!(response.json::<Value>()["error"].is_string());
}

#[tokio::test]
async fn test_logout_ends_session() {
    let (server, _writer) = create_test_server().await;
    let token = signup(&server, "mouse").await;

    server
        .delete("/api/v1/sessions/current")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    server
        .get("/api/v1/me")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rating_lifecycle() {
    let (server, _writer) = create_test_server().await;
    let token = signup(&server, "oracle").await;

    rate(&server, &token, 603, 3).await;
    rate(&server, &token, 603, 5).await;
    rate(&server, &token, 13, 4).await;

    let ratings = get_json(&server, &token, "/api/v1/ratings").await;
    let mut rated = ids(&ratings, "movie_id");
    rated.sort();
    assert_eq!(rated, vec![13, 603]);
    let matrix = ratings
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["movie_id"] == 603)
        .unwrap();
    assert_eq!(matrix["score"], 5);

    server
        .put("/api/v1/ratings")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "movie_id": 603, "score": 6 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .delete("/api/v1/ratings/603")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .delete("/api/v1/ratings/603")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let ratings = get_json(&server, &token, "/api/v1/ratings").await;
    assert_eq!(ids(&ratings, "movie_id"), vec![13]);
}

#[tokio::test]
async fn test_new_user_gets_popular_recommendations() {
    let (server, _writer) = create_test_server().await;
    let token = signup(&server, "dozer").await;

    let result = get_json(&server, &token, "/api/v1/recommendations").await;
    assert_eq!(result["strategy"], "popularity");
    assert!(result["message"].is_string());
    assert_eq!(result["stale"], false);

    let items = ids(&result["items"], "movie_id");
    assert_eq!(items.len(), 8);
    // Highest community rating first
    assert_eq!(items[0], 278);
    assert_eq!(result["items"][0]["movie"]["title"], "The Shawshank Redemption");
}

#[tokio::test]
async fn test_similar_users_drive_recommendations() {
    let (server, _writer) = create_test_server().await;
    let alice = signup(&server, "alice").await;
    let bob = signup(&server, "bob").await;

    for (movie_id, score) in [(603, 5), (679, 5), (348, 4)] {
        rate(&server, &alice, movie_id, score).await;
    }
    for (movie_id, score) in [(603, 5), (679, 4), (348, 5), (155, 5)] {
        rate(&server, &bob, movie_id, score).await;
    }

    let result = get_json(&server, &alice, "/api/v1/recommendations").await;
    assert_eq!(result["strategy"], "collaborative");
    let items = ids(&result["items"], "movie_id");
    assert_eq!(items[0], 155);
    assert!(items.iter().all(|id| ![603, 679, 348].contains(id)));
}

#[tokio::test]
async fn test_recommendation_filters() {
    let (server, _writer) = create_test_server().await;
    let token = signup(&server, "niobe").await;

    let result = get_json(&server, &token, "/api/v1/recommendations?genres=18,80&limit=2").await;
    let items = result["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    for item in items {
        let genres = item["movie"]["genre_ids"].as_array().unwrap();
        assert!(genres.contains(&json!(18)) || genres.contains(&json!(80)));
    }

    let result = get_json(&server, &token, "/api/v1/recommendations?genres=99").await;
    assert!(result["items"].as_array().unwrap().is_empty());

    server
        .get("/api/v1/recommendations?genres=drama")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .get("/api/v1/recommendations?year_from=2010&year_to=1990")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rating_invalidates_cached_recommendations() {
    let (server, _writer) = create_test_server().await;
    let token = signup(&server, "ghost").await;

    let before = get_json(&server, &token, "/api/v1/recommendations").await;
    assert!(ids(&before["items"], "movie_id").contains(&278));

    rate(&server, &token, 278, 5).await;
    let after = get_json(&server, &token, "/api/v1/recommendations").await;
    assert!(!ids(&after["items"], "movie_id").contains(&278));
}

#[tokio::test]
async fn test_browse_movies() {
    let (server, _writer) = create_test_server().await;
    let token = signup(&server, "seraph").await;
    rate(&server, &token, 603, 5).await;
    rate(&server, &token, 680, 2).await;

    let popular = get_json(&server, &token, "/api/v1/movies/popular?genres=28").await;
    assert_eq!(ids(&popular, "id"), vec![604, 679, 155]);

    let search = get_json(&server, &token, "/api/v1/movies/search?q=alien").await;
    assert_eq!(ids(&search, "id"), vec![348, 679]);

    server
        .get("/api/v1/movies/search")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let details = get_json(&server, &token, "/api/v1/movies/603").await;
    assert_eq!(details["title"], "The Matrix");
    server
        .get("/api/v1/movies/1")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let genres = get_json(&server, &token, "/api/v1/genres").await;
    assert_eq!(genres.as_array().unwrap().len(), 4);

    let favorites = get_json(&server, &token, "/api/v1/ratings/favorites").await;
    assert_eq!(ids(&favorites, "movie_id"), vec![603]);
    assert_eq!(favorites[0]["movie"]["title"], "The Matrix");
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    let (server, _writer) = create_test_server().await;
    let token = signup(&server, "apoc").await;

    for path in [
        "/api/v1/recommendations?min_score=abc",
        "/api/v1/recommendations?limit=-1",
        "/api/v1/movies/abc",
        "/api/v1/movies/popular?year_from=soon",
    ] {
        let response = server
            .get(path)
            .add_header(AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["error"].is_string(), "{}", path);
    }

    let response = server
        .put("/api/v1/ratings")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "movie_id": "matrix", "score": 5 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"].is_string());

    let response = server
        .delete("/api/v1/ratings/latest")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"].is_string());
}

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{MovieId, Rating},
};

/// Persistence for (user, movie, score) triples
#[async_trait::async_trait]
pub trait RatingStore: Send + Sync {
    /// Inserts or overwrites the rating for its (user, movie) pair
    async fn upsert(&self, rating: &Rating) -> AppResult<Rating>;

    async fn user_ratings(&self, user_id: Uuid) -> AppResult<Vec<Rating>>;

    /// Every rating of every user: the input of the rating matrix
    async fn all_ratings(&self) -> AppResult<Vec<Rating>>;

    /// Removes a rating, returning whether one existed
    async fn delete(&self, user_id: Uuid, movie_id: MovieId) -> AppResult<bool>;
}

/// PostgreSQL rating store backed by the `user_ratings` table
#[derive(Clone)]
pub struct PgRatingStore {
    pool: PgPool,
}

impl PgRatingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RatingStore for PgRatingStore {
    async fn upsert(&self, rating: &Rating) -> AppResult<Rating> {
        let stored = sqlx::query_as::<_, Rating>(
            r#"
            INSERT INTO user_ratings (user_id, movie_id, score, rated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, movie_id)
            DO UPDATE SET score = EXCLUDED.score, rated_at = EXCLUDED.rated_at
            RETURNING user_id, movie_id, score, rated_at
            "#,
        )
        .bind(rating.user_id)
        .bind(rating.movie_id)
        .bind(rating.score)
        .bind(rating.rated_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %stored.user_id,
            movie_id = stored.movie_id,
            score = stored.score,
            "Rating stored"
        );

        Ok(stored)
    }

    async fn user_ratings(&self, user_id: Uuid) -> AppResult<Vec<Rating>> {
        let ratings = sqlx::query_as::<_, Rating>(
            r#"
            SELECT user_id, movie_id, score, rated_at
            FROM user_ratings
            WHERE user_id = $1
            ORDER BY rated_at DESC, movie_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ratings)
    }

    async fn all_ratings(&self) -> AppResult<Vec<Rating>> {
        let ratings = sqlx::query_as::<_, Rating>(
            r#"
            SELECT user_id, movie_id, score, rated_at
            FROM user_ratings
            ORDER BY user_id, movie_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ratings)
    }

    async fn delete(&self, user_id: Uuid, movie_id: MovieId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM user_ratings WHERE user_id = $1 AND movie_id = $2")
            .bind(user_id)
            .bind(movie_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

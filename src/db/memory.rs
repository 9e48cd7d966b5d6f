//! Process-local stores, selected with `STORAGE=memory`.

use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RatingStore, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{MovieId, Rating, User},
};

#[derive(Default)]
pub struct MemoryRatingStore {
    ratings: RwLock<BTreeMap<(Uuid, MovieId), Rating>>,
}

impl MemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RatingStore for MemoryRatingStore {
    async fn upsert(&self, rating: &Rating) -> AppResult<Rating> {
        self.ratings
            .write()
            .await
            .insert((rating.user_id, rating.movie_id), rating.clone());
        Ok(rating.clone())
    }

    async fn user_ratings(&self, user_id: Uuid) -> AppResult<Vec<Rating>> {
        let ratings = self.ratings.read().await;
        let mut found: Vec<Rating> = ratings
            .range((user_id, MovieId::MIN)..=(user_id, MovieId::MAX))
            .map(|(_, r)| r.clone())
            .collect();
        found.sort_by(|a, b| b.rated_at.cmp(&a.rated_at).then(a.movie_id.cmp(&b.movie_id)));
        Ok(found)
    }

    async fn all_ratings(&self) -> AppResult<Vec<Rating>> {
        Ok(self.ratings.read().await.values().cloned().collect())
    }

    async fn delete(&self, user_id: Uuid, movie_id: MovieId) -> AppResult<bool> {
        Ok(self
            .ratings
            .write()
            .await
            .remove(&(user_id, movie_id))
            .is_some())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: &User) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.display_name == user.display_name) {
            return Err(AppError::Conflict(format!(
                "Display name '{}' is already taken",
                user.display_name
            )));
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_name(&self, display_name: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.display_name == display_name)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_overwrites_same_pair() {
        let store = MemoryRatingStore::new();
        let user = Uuid::new_v4();

        store.upsert(&Rating::new(user, 603, 3).unwrap()).await.unwrap();
        store.upsert(&Rating::new(user, 603, 5).unwrap()).await.unwrap();

        let ratings = store.user_ratings(user).await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].score, 5);
    }

    #[tokio::test]
    async fn test_user_ratings_are_scoped_to_user() {
        let store = MemoryRatingStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.upsert(&Rating::new(alice, 1, 4).unwrap()).await.unwrap();
        store.upsert(&Rating::new(alice, 2, 2).unwrap()).await.unwrap();
        store.upsert(&Rating::new(bob, 1, 5).unwrap()).await.unwrap();

        assert_eq!(store.user_ratings(alice).await.unwrap().len(), 2);
        assert_eq!(store.user_ratings(bob).await.unwrap().len(), 1);
        assert_eq!(store.all_ratings().await.unwrap().len(), 3);

        assert!(store.delete(alice, 2).await.unwrap());
        assert!(!store.delete(alice, 2).await.unwrap());
        assert_eq!(store.user_ratings(alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_display_name_conflicts() {
        let store = MemoryUserStore::new();
        store
            .create(&User::new("neo".to_string(), "h".to_string()))
            .await
            .unwrap();

        let result = store
            .create(&User::new("neo".to_string(), "h2".to_string()))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let found = store.find_by_name("neo").await.unwrap().unwrap();
        assert_eq!(store.find_by_id(found.id).await.unwrap(), Some(found));
        assert_eq!(store.find_by_name("morpheus").await.unwrap(), None);
    }
}

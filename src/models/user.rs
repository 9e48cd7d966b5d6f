use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account that can rate movies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct User {
    /// Unique identifier for the user
    pub id: Uuid,
    /// Unique, user-chosen name used to log in
    pub display_name: String,
    /// Argon2id PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a new user with a fresh identifier
    pub fn new(display_name: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

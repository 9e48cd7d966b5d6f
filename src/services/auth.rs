use std::sync::Arc;

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as Argon2PasswordHasher, PasswordVerifier,
        SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{Cache, CacheKey, UserStore},
    error::{AppError, AppResult},
    models::User,
};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const DISPLAY_NAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;

const INVALID_CREDENTIALS: &str = "Invalid display name or password";

/// Password hasher using Argon2id
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher {
    /// Argon2id v19 with the recommended parameters
    /// Memory: 19456 KiB (19 MiB)
    /// Iterations: 2
    /// Parallelism: 1
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Custom memory (KiB) and iteration cost
    pub fn with_cost(m_cost: u32, t_cost: u32) -> AppResult<Self> {
        let params = Params::new(m_cost, t_cost, 1, None)
            .map_err(|e| AppError::Internal(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        Ok(password_hash.to_string())
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!(
                "Password verification failed: {}",
                e
            ))),
        }
    }
}

/// A logged-in user and the bearer token for the session
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// Accounts and cache-backed sessions
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    cache: Cache,
    hasher: PasswordHasher,
    session_ttl: u64,
}

fn validate_signup(display_name: &str, password: &str) -> AppResult<()> {
    let name_len = display_name.chars().count();
    if !DISPLAY_NAME_LEN.contains(&name_len) {
        return Err(AppError::InvalidInput(format!(
            "Display name must be {} to {} characters",
            DISPLAY_NAME_LEN.start(),
            DISPLAY_NAME_LEN.end()
        )));
    }
    if display_name.chars().any(char::is_control) {
        return Err(AppError::InvalidInput(
            "Display name contains invalid characters".to_string(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, cache: Cache, hasher: PasswordHasher, session_ttl: u64) -> Self {
        Self {
            users,
            cache,
            hasher,
            session_ttl,
        }
    }

    /// Creates an account and logs it in
    pub async fn signup(&self, display_name: &str, password: &str) -> AppResult<AuthSession> {
        let display_name = display_name.trim();
        validate_signup(display_name, password)?;

        let password_hash = self.hash(password.to_string()).await?;
        let user = self
            .users
            .create(&User::new(display_name.to_string(), password_hash))
            .await?;

        tracing::info!(user_id = %user.id, "User signed up");
        self.start_session(user).await
    }

    pub async fn login(&self, display_name: &str, password: &str) -> AppResult<AuthSession> {
        let Some(user) = self.users.find_by_name(display_name.trim()).await? else {
            tracing::debug!("Login for unknown display name");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        if !self.verify(password.to_string(), user.password_hash.clone()).await? {
            tracing::warn!(user_id = %user.id, "Login with wrong password");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        tracing::info!(user_id = %user.id, "User logged in");
        self.start_session(user).await
    }

    pub async fn logout(&self, token: &str) -> AppResult<()> {
        self.cache.delete(&CacheKey::Session(token.to_string())).await
    }

    /// Resolves a bearer token to its user
    pub async fn authenticate(&self, token: &str) -> AppResult<User> {
        let user_id: Option<Uuid> = self
            .cache
            .get_from_cache(&CacheKey::Session(token.to_string()))
            .await?;

        let Some(user_id) = user_id else {
            return Err(AppError::Unauthorized("Session expired or unknown".to_string()));
        };

        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Session user no longer exists".to_string()))
    }

    async fn start_session(&self, user: User) -> AppResult<AuthSession> {
        let token = Uuid::new_v4().simple().to_string();
        self.cache
            .set(&CacheKey::Session(token.clone()), &user.id, self.session_ttl)
            .await?;
        Ok(AuthSession { user, token })
    }

    // Argon2 is CPU bound; keep it off the async workers
    async fn hash(&self, password: String) -> AppResult<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
    }

    async fn verify(&self, password: String, hash: String) -> AppResult<bool> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
    }
}

pub mod auth;
pub mod content;
pub mod engine;
pub mod movies;
pub mod providers;
pub mod recommendations;

pub use auth::{AuthService, AuthSession, PasswordHasher};
pub use movies::MovieService;
pub use recommendations::RecommendationService;

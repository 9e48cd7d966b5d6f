pub mod cache;
pub mod memory;
pub mod postgres;
pub mod ratings;
pub mod users;

pub use cache::{Cache, CacheKey, CacheWriterHandle};
pub use memory::{MemoryRatingStore, MemoryUserStore};
pub use postgres::create_pool;
pub use ratings::{PgRatingStore, RatingStore};
pub use users::{PgUserStore, UserStore};

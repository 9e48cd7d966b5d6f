pub mod backend;
pub mod store;

mod macros;

pub use backend::{create_redis_client, CacheBackend, MemoryBackend, RedisBackend};
pub use store::{Cache, CacheKey, CacheWriterHandle};

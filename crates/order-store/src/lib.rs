//! Persistence for the order aggregate.
//!
//! - [`OrderRepository`]: the contract every backing store satisfies
//! - [`PostgresOrderRepository`]: row try-locks and version-checked writes
//! - [`InMemoryOrderRepository`]: same semantics, for tests and local runs
//! - [`CachedOrderRepository`]: cache-aside decorator over any repository

pub mod cache;
pub mod cached;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use cache::{CacheError, InMemoryOrderCache, OrderCache, RedisOrderCache, cache_key};
pub use cached::{CachedOrderRepository, DEFAULT_CACHE_TTL};
pub use common::{OrderId, Version};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderRepository;
pub use postgres::PostgresOrderRepository;
pub use repository::{OrderRepository, OrderRepositoryExt, SCAN_BATCH_LIMIT};

#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{CacheEntry, CacheKey, InMemoryProgressCache, ProgressCache, Storage, StorageError};

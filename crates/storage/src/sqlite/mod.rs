use std::sync::Arc;
use std::time::Duration;

use roadmap_core::model::UserId;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{ProgressCache, Storage, StorageError};

mod mapping;
mod migrate;
mod progress_cache_repo;

/// SQLite-backed progress cache, so dashboards have last-known progress on start.
///
/// Rows belong to one owner; a repository only sees the rows of the user it
/// was scoped to with [`SqliteRepository::for_user`].
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
    owner: String,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self {
            pool,
            owner: String::new(),
        })
    }

    /// Same pool, rows of `user` only. `None` is the anonymous owner.
    #[must_use]
    pub fn for_user(&self, user: Option<UserId>) -> Self {
        Self {
            pool: self.pool.clone(),
            owner: user.map(|u| u.to_string()).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn owner(&self) -> &str {
        &self.owner
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`, scoped to `user`.
    ///
    /// Entries left by an earlier process are marked stale: push events sent
    /// while nothing was listening are lost, so every read after a restart
    /// goes back to the server first.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection, migrations or the stale
    /// marking cannot be completed.
    pub async fn sqlite(database_url: &str, user: Option<UserId>) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url)
            .await?
            .for_user(user);
        repo.migrate().await?;
        repo.invalidate_all().await?;
        let progress: Arc<dyn ProgressCache> = Arc::new(repo);
        Ok(Self { progress })
    }
}

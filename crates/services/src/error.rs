//! Shared error types for the services crate.

use thiserror::Error;

use roadmap_core::ModelError;
use roadmap_core::model::{NodeId, RoadmapId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the REST client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("base url cannot carry path segments: {0}")]
    BaseUrl(String),
}

/// Errors emitted by `ProgressQueries`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ProgressMutator::toggle_node`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToggleError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("could not load progress: {0}")]
    Load(#[from] QueryError),
    #[error("roadmap definition unavailable: {0}")]
    Roadmap(#[source] ApiError),
    #[error("node update rejected: {0}")]
    NodeWrite(#[source] ApiError),
    #[error("node `{node}` on roadmap {roadmap_id} saved but progress tree was not: {source}")]
    PartialWrite {
        roadmap_id: RoadmapId,
        node: NodeId,
        #[source]
        source: ApiError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the push channel transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PushError {
    #[error("push channel connect failed: {0}")]
    Connect(String),
    #[error("push channel send failed: {0}")]
    Send(String),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

/// Errors emitted while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid {var} value: {raw}")]
    Invalid { var: &'static str, raw: String },
    #[error("invalid url {raw}: {source}")]
    Url {
        raw: String,
        #[source]
        source: url::ParseError,
    },
    #[error("cannot derive push channel url from {0}")]
    PushUrl(String),
}

/// Errors emitted while bootstrapping the sync services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod mutator;
pub mod push;
pub mod queries;
pub mod sync_services;

pub use roadmap_core::Clock;

pub use api::{HttpProgressApi, ProgressApi, UpsertProgress};
pub use config::SyncConfig;
pub use error::{ApiError, ConfigError, PushError, QueryError, SyncServicesError, ToggleError};
pub use mutator::{ProgressMutator, ToggleOutcome};
pub use push::{ChannelState, Notification, NotificationKind, PushChannel, ReconnectPolicy};
pub use queries::ProgressQueries;
pub use sync_services::SyncServices;

use std::sync::Arc;

use url::Url;

use roadmap_core::model::UserId;
use storage::repository::{ProgressCache, Storage};

use crate::Clock;
use crate::api::{HttpProgressApi, ProgressApi};
use crate::config::SyncConfig;
use crate::error::SyncServicesError;
use crate::mutator::ProgressMutator;
use crate::push::{PushChannel, PushEventHandler, PushTransport, ReconnectPolicy, WsTransport};
use crate::queries::ProgressQueries;

const NOTIFICATION_CAPACITY: usize = 64;

/// Wires the REST client, the progress cache and the push channel together.
#[derive(Clone)]
pub struct SyncServices {
    clock: Clock,
    api: Arc<dyn ProgressApi>,
    cache: Arc<dyn ProgressCache>,
    queries: ProgressQueries,
    events: PushEventHandler,
    ws_url: Url,
    reconnect: ReconnectPolicy,
    user_id: Option<UserId>,
}

impl SyncServices {
    /// Build services from configuration, opening the `SQLite` cache if one is
    /// configured. A persistent cache is scoped to the configured user.
    ///
    /// # Errors
    ///
    /// Returns `SyncServicesError` if the cache database cannot be opened.
    pub async fn from_config(config: &SyncConfig, clock: Clock) -> Result<Self, SyncServicesError> {
        let storage = match &config.cache_db {
            Some(url) => Storage::sqlite(url, config.user_id).await?,
            None => Storage::in_memory(),
        };
        let api: Arc<dyn ProgressApi> = Arc::new(HttpProgressApi::new(
            config.api_url.clone(),
            config.api_token.clone(),
        ));
        Ok(Self::new(clock, api, storage.progress, config))
    }

    #[must_use]
    pub fn new(
        clock: Clock,
        api: Arc<dyn ProgressApi>,
        cache: Arc<dyn ProgressCache>,
        config: &SyncConfig,
    ) -> Self {
        let queries = ProgressQueries::new(clock, Arc::clone(&api), Arc::clone(&cache));
        let events = PushEventHandler::new(Arc::clone(&cache), NOTIFICATION_CAPACITY);
        Self {
            clock,
            api,
            cache,
            queries,
            events,
            ws_url: config.ws_url.clone(),
            reconnect: config.reconnect.clone(),
            user_id: config.user_id,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    #[must_use]
    pub fn queries(&self) -> &ProgressQueries {
        &self.queries
    }

    /// Push event dispatcher; subscribe to it for notifications.
    #[must_use]
    pub fn events(&self) -> &PushEventHandler {
        &self.events
    }

    /// Mutator for the configured user, `None` when nobody is logged in.
    ///
    /// The cache belongs to that user, so no mutator is handed out for anyone else.
    #[must_use]
    pub fn mutator(&self) -> Option<ProgressMutator> {
        self.user_id.map(|user| {
            ProgressMutator::new(
                self.clock,
                user,
                Arc::clone(&self.api),
                Arc::clone(&self.cache),
            )
        })
    }

    /// Start the push channel over WebSocket. Logs in right away when a user
    /// is configured.
    #[must_use]
    pub fn spawn_push(&self) -> PushChannel {
        self.spawn_push_with(Arc::new(WsTransport))
    }

    #[must_use]
    pub fn spawn_push_with(&self, transport: Arc<dyn PushTransport>) -> PushChannel {
        let channel = PushChannel::spawn(
            self.ws_url.clone(),
            self.reconnect.clone(),
            transport,
            self.events.clone(),
        );
        if let Some(user) = self.user_id {
            channel.set_identity(Some(user));
        }
        channel
    }
}

//! Environment-driven configuration for the sync services.

use std::env;
use std::time::Duration;

use url::Url;

use roadmap_core::model::UserId;

use crate::error::ConfigError;
use crate::push::ReconnectPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_url: Url,
    pub ws_url: Url,
    pub api_token: Option<String>,
    pub user_id: Option<UserId>,
    /// `SQLite` URL for the progress cache; `None` keeps it in memory.
    pub cache_db: Option<String>,
    pub reconnect: ReconnectPolicy,
    ws_derived: bool,
}

impl SyncConfig {
    /// Read `ROADMAP_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as `from_env` with an arbitrary variable source. Blank values count
    /// as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unusable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_url = parse_url(get("ROADMAP_API_URL").as_deref().unwrap_or(DEFAULT_API_URL))?;
        let (ws_url, ws_derived) = match get("ROADMAP_WS_URL") {
            Some(raw) => (parse_url(&raw)?, false),
            None => (derive_ws_url(&api_url)?, true),
        };
        let user_id = get("ROADMAP_USER_ID")
            .map(|raw| {
                raw.parse::<UserId>().map_err(|_| ConfigError::Invalid {
                    var: "ROADMAP_USER_ID",
                    raw,
                })
            })
            .transpose()?;

        let mut reconnect = ReconnectPolicy::default();
        if let Some(ms) = millis(get("ROADMAP_RECONNECT_BASE_MS"), "ROADMAP_RECONNECT_BASE_MS")? {
            reconnect.base = ms;
        }
        if let Some(ms) = millis(get("ROADMAP_RECONNECT_MAX_MS"), "ROADMAP_RECONNECT_MAX_MS")? {
            reconnect.max = ms;
        }
        reconnect.max = reconnect.max.max(reconnect.base);
        if let Some(ms) = millis(get("ROADMAP_CONNECT_TIMEOUT_MS"), "ROADMAP_CONNECT_TIMEOUT_MS")? {
            reconnect.connect_timeout = ms;
        }

        Ok(Self {
            api_url,
            ws_url,
            api_token: get("ROADMAP_API_TOKEN"),
            user_id,
            cache_db: get("ROADMAP_CACHE_DB"),
            reconnect,
            ws_derived,
        })
    }

    /// Replace the API base. A derived push URL follows it; an explicit one is kept.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `raw` is not a usable URL.
    pub fn set_api_url(&mut self, raw: &str) -> Result<(), ConfigError> {
        self.api_url = parse_url(raw)?;
        if self.ws_derived {
            self.ws_url = derive_ws_url(&self.api_url)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ConfigError` if `raw` is not a usable URL.
    pub fn set_ws_url(&mut self, raw: &str) -> Result<(), ConfigError> {
        self.ws_url = parse_url(raw)?;
        self.ws_derived = false;
        Ok(())
    }
}

/// `http(s)://host/base` becomes `ws(s)://host/base/ws`.
///
/// # Errors
///
/// Returns `ConfigError::PushUrl` for schemes other than http(s) or ws(s).
pub fn derive_ws_url(api: &Url) -> Result<Url, ConfigError> {
    let scheme = match api.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(ConfigError::PushUrl(api.to_string())),
    };
    let mut url = api.clone();
    url.set_scheme(scheme)
        .map_err(|()| ConfigError::PushUrl(api.to_string()))?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| ConfigError::PushUrl(api.to_string()))?
        .pop_if_empty()
        .push("ws");
    Ok(url)
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::Url {
        raw: raw.to_string(),
        source,
    })
}

fn millis(raw: Option<String>, var: &'static str) -> Result<Option<Duration>, ConfigError> {
    raw.map(|raw| match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::Invalid { var, raw }),
    })
    .transpose()
}

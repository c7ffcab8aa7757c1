//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

/// Default base URL of the workspace Web API.
pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api/";

/// Default capacity of the event stream broadcast channel.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`], or built directly
/// with [`ClientConfig::new`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL that API method names are appended to. Always ends in `/`.
    pub api_base_url: String,

    /// API token sent as a bearer credential.
    pub token: String,

    /// Capacity of the event stream broadcast channel.
    pub event_bus_capacity: usize,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl ClientConfig {
    /// Creates a configuration with the given API base URL and token and
    /// defaults for everything else.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_base_url: normalize_base_url(api_base_url.into()),
            token: token.into(),
            event_bus_capacity: DEFAULT_EVENT_BUS_CAPACITY,
            log_json: false,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable                 | Default                   |
    /// |--------------------------|---------------------------|
    /// | `RTM_API_BASE_URL`       | `https://slack.com/api/`  |
    /// | `RTM_TOKEN`              | required                  |
    /// | `RTM_EVENT_BUS_CAPACITY` | `1024`                    |
    /// | `RTM_LOG_JSON`           | `false`                   |
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `RTM_TOKEN` is unset or empty.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let api_base_url = std::env::var("RTM_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());

        let token = std::env::var("RTM_TOKEN").unwrap_or_default();
        if token.trim().is_empty() {
            return Err("RTM_TOKEN must be set".into());
        }

        let event_bus_capacity = parse_env("RTM_EVENT_BUS_CAPACITY", DEFAULT_EVENT_BUS_CAPACITY);
        let log_json = parse_env_bool("RTM_LOG_JSON", false);

        Ok(Self {
            api_base_url: normalize_base_url(api_base_url),
            token,
            event_bus_capacity: event_bus_capacity.max(1),
            log_json,
        })
    }
}

// The token is a credential; keep it out of logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("token", &"<redacted>")
            .field("event_bus_capacity", &self.event_bus_capacity)
            .field("log_json", &self.log_json)
            .finish()
    }
}

fn normalize_base_url(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

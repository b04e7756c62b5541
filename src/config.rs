//! Runtime configuration for the notifier.
//!
//! Configuration is resolved once at startup from, in increasing priority:
//! built-in defaults, an optional TOML file, `NOTIFIER_*` environment
//! variables, and the legacy unprefixed `SERVER_URL` / `PORT` variables.
//! The resulting [`NotifierConfig`] is immutable and shared behind an `Arc`.

use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable prefix for all settings (`NOTIFIER_APP_SECRET`, ...)
pub const ENV_PREFIX: &str = "NOTIFIER";

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_NAME: &str = "notifier";

/// What to do with text that matches no configured command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Look the text up in the search service
    #[default]
    Search,
    /// Send the text straight back
    Echo,
}

/// A literal text command with a fixed reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandRule {
    /// Exact, case-sensitive message text
    pub trigger: String,
    /// Reply sent when the trigger matches
    pub reply: String,
}

/// Reply texts. `{term}` is replaced with the user's search text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplyTemplates {
    pub results_header: String,
    pub no_results: String,
    pub attachment_ack: String,
}

impl Default for ReplyTemplates {
    fn default() -> Self {
        Self {
            results_header: "\"{term}\" се съдържа в следните статии:".to_string(),
            no_results: "Търсене за \"{term}\" не доведе до никакви резултати".to_string(),
            attachment_ack: "Message with attachment received".to_string(),
        }
    }
}

impl ReplyTemplates {
    /// Header placed above the result buttons
    pub fn results_header(&self, term: &str) -> String {
        self.results_header.replace("{term}", term)
    }

    /// Message sent when the lookup returns nothing
    pub fn no_results(&self, term: &str) -> String {
        self.no_results.replace("{term}", term)
    }
}

/// Fully resolved notifier configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Shared secret the platform signs deliveries with
    pub app_secret: String,
    /// Token expected in `hub.verify_token` during the handshake
    pub validation_token: String,
    /// Page access token for the Send API
    pub page_access_token: String,
    /// Public base URL this service is reachable at
    pub server_url: String,
    /// Address to bind to
    pub bind_address: String,
    /// Port to listen on
    pub port: u16,
    /// Reject deliveries that carry no signature header
    pub strict_signatures: bool,
    /// Base URL of the keyword search endpoint; the encoded term is appended
    pub search_url: String,
    /// Base URL of the Graph API, without `/me/messages`
    pub graph_api_url: String,
    /// Upper bound on each outbound call
    pub request_timeout_secs: u64,
    /// Behaviour for text that matches no command
    pub fallback: FallbackPolicy,
    /// Literal commands checked before the fallback
    pub commands: Vec<CommandRule>,
    /// Reply texts
    pub templates: ReplyTemplates,
    /// Window for suppressing redelivered message ids; 0 disables it
    pub dedup_window_secs: u64,
    /// Maximum number of message ids remembered inside the window
    pub dedup_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            app_secret: String::new(),
            validation_token: String::new(),
            page_access_token: String::new(),
            server_url: String::new(),
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            strict_signatures: true,
            search_url: "http://magadanski.com/wp-json/mf/v1/search/".to_string(),
            graph_api_url: "https://graph.facebook.com/v2.6".to_string(),
            request_timeout_secs: 10,
            fallback: FallbackPolicy::Search,
            commands: Vec::new(),
            templates: ReplyTemplates::default(),
            dedup_window_secs: 0,
            dedup_capacity: 1024,
        }
    }
}

// Secrets never go through Debug.
impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("server_url", &self.server_url)
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("strict_signatures", &self.strict_signatures)
            .field("search_url", &self.search_url)
            .field("graph_api_url", &self.graph_api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("fallback", &self.fallback)
            .field("commands", &self.commands.len())
            .field("dedup_window_secs", &self.dedup_window_secs)
            .finish_non_exhaustive()
    }
}

impl NotifierConfig {
    /// Load configuration from the given file (or `notifier.toml` if present)
    /// and the process environment.
    ///
    /// The result is not validated; call [`NotifierConfig::validate`] before serving.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_sources(path, std::env::vars().collect())
    }

    /// Load configuration from a file and an explicit environment map.
    pub fn from_sources(
        path: Option<&Path>,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let file_source = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path.display().to_string()));
                }
                File::from(path).format(FileFormat::Toml).required(true)
            }
            None => File::with_name(DEFAULT_CONFIG_NAME)
                .format(FileFormat::Toml)
                .required(false),
        };

        let legacy_server_url = env.get("SERVER_URL").cloned();
        let legacy_port = env.get("PORT").cloned();

        let config = Config::builder()
            .add_source(file_source)
            // NOTIFIER_APP_SECRET -> app_secret, NOTIFIER_TEMPLATES__NO_RESULTS -> templates.no_results
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .set_override_option("server_url", legacy_server_url)?
            .set_override_option("port", legacy_port)?
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check that every required value is present and usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("app_secret", &self.app_secret),
            ("validation_token", &self.validation_token),
            ("page_access_token", &self.page_access_token),
            ("server_url", &self.server_url),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        for (field, value) in [
            ("server_url", &self.server_url),
            ("search_url", &self.search_url),
            ("graph_api_url", &self.graph_api_url),
        ] {
            reqwest::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
                field,
                reason: e.to_string(),
            })?;
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Require only the app secret, for offline signing.
    pub fn require_app_secret(&self) -> Result<&str, ConfigError> {
        if self.app_secret.trim().is_empty() {
            return Err(ConfigError::Missing(vec!["app_secret"]));
        }
        Ok(&self.app_secret)
    }

    /// Get the full bind address (ip:port)
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Timeout applied to every outbound request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Duplicate-suppression window, if enabled
    pub fn dedup_window(&self) -> Option<Duration> {
        (self.dedup_window_secs > 0).then(|| Duration::from_secs(self.dedup_window_secs))
    }

    /// The callback URL to register with the platform
    pub fn callback_url(&self) -> String {
        format!("{}/webhook", self.server_url.trim_end_matches('/'))
    }

    /// Human-readable summary with secrets masked.
    pub fn redacted(&self) -> String {
        let mask = |value: &str| if value.is_empty() { "<unset>" } else { "********" };
        let mut lines = vec![
            format!("app_secret          = {}", mask(&self.app_secret)),
            format!("validation_token    = {}", mask(&self.validation_token)),
            format!("page_access_token   = {}", mask(&self.page_access_token)),
            format!("server_url          = {}", self.server_url),
            format!("listen              = {}", self.socket_addr()),
            format!("strict_signatures   = {}", self.strict_signatures),
            format!("search_url          = {}", self.search_url),
            format!("graph_api_url       = {}", self.graph_api_url),
            format!("request_timeout     = {}s", self.request_timeout_secs),
            format!("fallback            = {:?}", self.fallback),
            format!("commands            = {}", self.commands.len()),
        ];
        match self.dedup_window() {
            Some(window) => lines.push(format!(
                "dedup               = {}s / {} ids",
                window.as_secs(),
                self.dedup_capacity
            )),
            None => lines.push("dedup               = off".to_string()),
        }
        lines.join("\n")
    }
}

//! Configuration for the synchronization client.
//!
//! Values are resolved in three layers: built-in defaults, an optional YAML
//! file, and command-line flags parsed with `arrrg`.  Later layers win.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default service location.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";

/// Default header carrying the token.
pub const DEFAULT_TOKEN_HEADER: &str = "Authorization-Token";

/// Default number of messages fetched by the initial history load.
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

/// Default cadence of the message poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Default cadence of the presence and stats poll.
pub const DEFAULT_PRESENCE_INTERVAL: Duration = Duration::from_millis(5000);

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How the token is attached to authenticated requests.
///
/// Deployments differ: the reference service reads a bare token from a custom
/// header, others expect `Authorization: Bearer <token>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthHeader {
    /// Header name.
    pub name: String,

    /// Optional scheme placed before the token, separated by one space.
    #[serde(default)]
    pub scheme: Option<String>,
}

impl AuthHeader {
    /// A custom header carrying the bare token.
    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scheme: None,
        }
    }

    /// The standard `Authorization: Bearer <token>` header.
    pub fn bearer() -> Self {
        Self {
            name: "Authorization".to_string(),
            scheme: Some("Bearer".to_string()),
        }
    }

    /// The header value for a token.
    pub fn value_for(&self, token: &str) -> String {
        match &self.scheme {
            Some(scheme) => format!("{scheme} {token}"),
            None => token.to_string(),
        }
    }
}

impl Default for AuthHeader {
    fn default() -> Self {
        Self::custom(DEFAULT_TOKEN_HEADER)
    }
}

/// Command-line arguments for the pollchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Service base URL.
    #[arrrg(optional, "Service base URL (default: http://localhost:8080/)", "URL")]
    pub base_url: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "Read settings from a YAML file", "FILE")]
    pub config: Option<String>,

    /// Where the token is persisted between runs.
    #[arrrg(optional, "Persist the session token in this file", "PATH")]
    pub token_file: Option<String>,

    /// Header used to carry the token.
    #[arrrg(optional, "Token header name (default: Authorization-Token)", "HEADER")]
    pub token_header: Option<String>,

    /// Scheme placed before the token in the header.
    #[arrrg(optional, "Token scheme, e.g. Bearer (default: none)", "SCHEME")]
    pub token_scheme: Option<String>,

    /// Messages fetched by the initial load.
    #[arrrg(optional, "Messages loaded at startup (default: 100)", "N")]
    pub history_limit: Option<u32>,

    /// Message poll cadence in milliseconds.
    #[arrrg(optional, "Message poll interval in ms (default: 1500)", "MS")]
    pub poll_ms: Option<u64>,

    /// Presence poll cadence in milliseconds.
    #[arrrg(optional, "Presence poll interval in ms (default: 5000)", "MS")]
    pub presence_ms: Option<u64>,

    /// Per-request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 10)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// Login to use instead of prompting.
    #[arrrg(optional, "Login name (prompted if absent)", "LOGIN")]
    pub login: Option<String>,

    /// Create an account before logging in.
    #[arrrg(flag, "Register a new account first")]
    pub register: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Do not ring the terminal bell on new messages.
    #[arrrg(flag, "Do not ring the bell on new messages")]
    pub no_bell: bool,
}

/// Settings as they appear in a YAML configuration file.
///
/// Every field is optional; absent fields keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Service base URL.
    pub base_url: Option<String>,
    /// Token persistence path.
    pub token_file: Option<PathBuf>,
    /// Token header settings.
    pub auth_header: Option<AuthHeader>,
    /// Messages fetched by the initial load.
    pub history_limit: Option<u32>,
    /// Message poll cadence in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Presence poll cadence in milliseconds.
    pub presence_interval_ms: Option<u64>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Whether to use ANSI styling.
    pub color: Option<bool>,
    /// Whether to ring the bell on new messages.
    pub bell: Option<bool>,
}

impl FileConfig {
    /// Parse a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read config {}", path.display()), err)
        })?;
        Self::from_yaml(&text)
    }
}

/// Resolved configuration for a sync session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Service base URL; always ends with `/`.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// How the token travels.
    pub auth_header: AuthHeader,

    /// Messages fetched by the initial load.
    pub history_limit: u32,

    /// Message poll cadence.
    pub poll_interval: Duration,

    /// Presence and stats poll cadence.
    pub presence_interval: Duration,

    /// Token persistence path; `None` keeps the token in memory only.
    pub token_file: Option<PathBuf>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Whether to ring the bell when new messages arrive.
    pub bell: bool,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    ///
    /// Defaults:
    /// - Base URL: http://localhost:8080/
    /// - Token header: `Authorization-Token`, no scheme
    /// - History: 100 messages
    /// - Polls: messages every 1.5 s, presence every 5 s
    /// - Timeout: 10 s
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            auth_header: AuthHeader::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            presence_interval: DEFAULT_PRESENCE_INTERVAL,
            token_file: None,
            use_color: true,
            bell: true,
        }
    }

    /// Sets the service base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(base_url.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the token header.
    pub fn with_auth_header(mut self, auth_header: AuthHeader) -> Self {
        self.auth_header = auth_header;
        self
    }

    /// Sets the initial history page size.
    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets the message poll cadence.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the presence poll cadence.
    pub fn with_presence_interval(mut self, interval: Duration) -> Self {
        self.presence_interval = interval;
        self
    }

    /// Sets the token persistence path.
    pub fn with_token_file(mut self, path: Option<PathBuf>) -> Self {
        self.token_file = path;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Disables the new-message bell.
    pub fn without_bell(mut self) -> Self {
        self.bell = false;
        self
    }

    /// Overlay values from a configuration file.
    pub fn apply_file(mut self, file: FileConfig) -> Self {
        if let Some(base_url) = file.base_url {
            self = self.with_base_url(base_url);
        }
        if let Some(path) = file.token_file {
            self.token_file = Some(path);
        }
        if let Some(auth_header) = file.auth_header {
            self.auth_header = auth_header;
        }
        if let Some(limit) = file.history_limit {
            self.history_limit = limit;
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.presence_interval_ms {
            self.presence_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(color) = file.color {
            self.use_color = color;
        }
        if let Some(bell) = file.bell {
            self.bell = bell;
        }
        self
    }

    /// Overlay values from the command line.
    pub fn apply_args(mut self, args: &ChatArgs) -> Self {
        if let Some(base_url) = &args.base_url {
            self = self.with_base_url(base_url.clone());
        }
        if let Some(path) = &args.token_file {
            self.token_file = Some(PathBuf::from(path));
        }
        if let Some(name) = &args.token_header {
            self.auth_header.name = name.clone();
        }
        if let Some(scheme) = &args.token_scheme {
            self.auth_header.scheme = Some(scheme.clone()).filter(|s| !s.is_empty());
        }
        if let Some(limit) = args.history_limit {
            self.history_limit = limit;
        }
        if let Some(ms) = args.poll_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = args.presence_ms {
            self.presence_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = args.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if args.no_color {
            self.use_color = false;
        }
        if args.no_bell {
            self.bell = false;
        }
        self
    }

    /// Resolve defaults, the `--config` file if given, then the flags.
    pub fn from_args(args: &ChatArgs) -> Result<Self> {
        let mut config = Self::new();
        if let Some(path) = &args.config {
            config = config.apply_file(FileConfig::load(path)?);
        }
        let config = config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.  Both timers need a
    /// period and every request needs a timeout.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("poll_interval", self.poll_interval),
            ("presence_interval", self.presence_interval),
            ("timeout", self.timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::validation(
                    format!("{name} must be greater than zero"),
                    Some(name.to_string()),
                ));
            }
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_base_url(mut base_url: String) -> String {
    if !base_url.ends_with('/') {
        base_url.push('/');
    }
    base_url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SyncConfig::new();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.auth_header, AuthHeader::custom("Authorization-Token"));
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert_eq!(config.presence_interval, Duration::from_millis(5000));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.token_file.is_none());
        assert!(config.use_color);
        assert!(config.bell);
    }

    #[test]
    fn auth_header_values() {
        assert_eq!(AuthHeader::default().value_for("abc"), "abc");
        let bearer = AuthHeader::bearer();
        assert_eq!(bearer.name, "Authorization");
        assert_eq!(bearer.value_for("abc"), "Bearer abc");
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = SyncConfig::new().with_base_url("http://chat.example.com/v1");
        assert_eq!(config.base_url, "http://chat.example.com/v1/");
    }

    #[test]
    fn config_from_args_defaults() {
        let config = SyncConfig::from_args(&ChatArgs::default()).unwrap();
        assert_eq!(config, SyncConfig::new());
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            base_url: Some("https://chat.example.com".to_string()),
            token_file: Some("/tmp/pollchat.token".to_string()),
            token_header: Some("Authorization".to_string()),
            token_scheme: Some("Bearer".to_string()),
            history_limit: Some(20),
            poll_ms: Some(3000),
            presence_ms: Some(10_000),
            timeout_secs: Some(5),
            no_color: true,
            no_bell: true,
            ..ChatArgs::default()
        };
        let config = SyncConfig::from_args(&args).unwrap();
        assert_eq!(config.base_url, "https://chat.example.com/");
        assert_eq!(config.token_file, Some(PathBuf::from("/tmp/pollchat.token")));
        assert_eq!(config.auth_header, AuthHeader::bearer());
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.poll_interval, Duration::from_millis(3000));
        assert_eq!(config.presence_interval, Duration::from_millis(10_000));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!config.use_color);
        assert!(!config.bell);
    }

    #[test]
    fn yaml_file_then_flags() {
        let file = FileConfig::from_yaml(
            "base_url: http://files.example.com\n\
             poll_interval_ms: 2000\n\
             auth_header:\n  name: Authorization\n  scheme: Bearer\n\
             color: false\n",
        )
        .unwrap();
        let args = ChatArgs {
            poll_ms: Some(2500),
            ..ChatArgs::default()
        };
        let config = SyncConfig::new().apply_file(file).apply_args(&args);
        assert_eq!(config.base_url, "http://files.example.com/");
        assert_eq!(config.poll_interval, Duration::from_millis(2500));
        assert_eq!(config.auth_header, AuthHeader::bearer());
        assert!(!config.use_color);
    }

    #[test]
    fn yaml_rejects_unknown_fields() {
        assert!(FileConfig::from_yaml("pol_interval_ms: 3\n").is_err());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let args = ChatArgs {
            poll_ms: Some(0),
            ..ChatArgs::default()
        };
        let err = SyncConfig::from_args(&args).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("poll_interval"));

        let args = ChatArgs {
            presence_ms: Some(0),
            ..ChatArgs::default()
        };
        assert!(SyncConfig::from_args(&args).unwrap_err().is_validation());

        let args = ChatArgs {
            timeout_secs: Some(0),
            ..ChatArgs::default()
        };
        assert!(SyncConfig::from_args(&args).unwrap_err().is_validation());
    }

    #[test]
    fn zero_interval_from_yaml_is_rejected() {
        let file = FileConfig::from_yaml("presence_interval_ms: 0\n").unwrap();
        let config = SyncConfig::new().apply_file(file);
        assert!(config.validate().unwrap_err().is_validation());
        assert!(SyncConfig::new().validate().is_ok());
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let err = FileConfig::load("/nonexistent/pollchat.yaml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}

//! Config for the player client
//!
//! Configuration can be created programmatically using [`Configuration::new()`] and the
//! `with_*` builders, or by reading environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional except `CLIENT_PLAYER_ID`. Flags are case-insensitive: set the value to
//! `"true"` to enable one.
//!
//! - `CLIENT_PLAYER_ID`: identity of this player (required)
//! - `CLIENT_HOST` / `CLIENT_PORT`: address of the host (default: `127.0.0.1:22`)
//! - `CLIENT_USER` / `CLIENT_PASSWORD`: SSH credentials
//! - `CLIENT_REMOTE_BASE_DIR`: remote directory holding the player logs
//! - `CLIENT_REMOTE_FEED`: remote order feed (default: `<base>/orders.log`)
//! - `CLIENT_UPLOAD_SUBDIR`: receiving subdirectory of the base dir (default: `recibidos`)
//! - `CLIENT_EVENT_LOG`: local event log shared with the games (default: `eventos_minijuego1.log`)
//! - `CLIENT_FEED_MIRROR`: local copy of the order feed (default: `game_status.log`)
//! - `CLIENT_CATALOG`: catalog file replacing the built-in game list
//! - `CLIENT_INTERPRETER`: program used to run the built-in games (default: `python3`)
//! - `CLIENT_ACCEPT_POLL_SECS`: delay between acceptance polls (default: `3`)
//! - `CLIENT_ROUND_POLL_SECS`: delay between round polls (default: `2`)
//! - `CLIENT_MAX_BACKOFF_SECS`: cap of the poll delay while the host is unreachable (default: `16`)
//! - `CLIENT_CONNECT_TIMEOUT_SECS`: SSH connection timeout (default: `5`)
//! - `CLIENT_VERBOSE`: print progress to stdout (default: `true`)
//! - `CLIENT_LOG`: write diagnostics to a file (default: `false`)
//! - `CLIENT_LOG_DIR`: directory of the diagnostics file (default: current directory)

use std::{path::PathBuf, time::Duration};

use anyhow::Context;

use crate::catalog::BUILTIN_GAMES_LOG;

/// Where and how to reach the host.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) user: String,
    pub(crate) password: String,
    pub(crate) base_dir: String,
    pub(crate) feed_path: Option<String>,
    pub(crate) upload_subdir: String,
    pub(crate) connect_timeout: Duration,
}

impl RemoteConfig {
    /// Remote path of the order feed.
    pub fn feed_path(&self) -> String {
        match &self.feed_path {
            Some(path) => path.clone(),
            None => format!("{}/orders.log", self.base_dir.trim_end_matches('/')),
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("base_dir", &self.base_dir)
            .field("feed_path", &self.feed_path())
            .field("upload_subdir", &self.upload_subdir)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 22,
            user: String::new(),
            password: String::new(),
            base_dir: "Player_logs".to_string(),
            feed_path: None,
            upload_subdir: "recibidos".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration of the player client.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) player_id: String,
    pub(crate) remote: RemoteConfig,
    pub(crate) event_log: PathBuf,
    pub(crate) feed_mirror: PathBuf,
    pub(crate) catalog: Option<PathBuf>,
    pub(crate) interpreter: String,
    pub(crate) accept_poll: Duration,
    pub(crate) round_poll: Duration,
    pub(crate) max_backoff: Duration,
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) log_dir: PathBuf,
}

impl Configuration {
    /// Create a new configuration for `player_id` with default parameters.
    ///
    /// By default:
    /// - The host is `127.0.0.1:22`, with empty credentials.
    /// - Acceptance is polled every 3 seconds, rounds every 2 seconds.
    /// - Progress is printed to stdout, diagnostics are not written to a file.
    /// - The built-in game catalog is run with `python3`, and the event log is the file those games
    ///   write to.
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            remote: RemoteConfig::default(),
            event_log: PathBuf::from(BUILTIN_GAMES_LOG),
            feed_mirror: PathBuf::from("game_status.log"),
            catalog: None,
            interpreter: "python3".to_string(),
            accept_poll: Duration::from_secs(3),
            round_poll: Duration::from_secs(2),
            max_backoff: Duration::from_secs(16),
            verbose: true,
            log: false,
            log_dir: PathBuf::from("."),
        }
    }

    /// Create configuration from `CLIENT_*` environment variables.
    ///
    /// # Errors
    /// Returned when `CLIENT_PLAYER_ID` is missing or a numeric variable cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let flag = |var: &str, default: bool| match lookup(var) {
            Some(val) => val.eq_ignore_ascii_case("true"),
            None => default,
        };
        let secs = |var: &str, default: u64| -> anyhow::Result<Duration> {
            match lookup(var) {
                Some(val) => val
                    .trim()
                    .parse()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{var} should be a number of seconds, got '{val}'")),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let player_id = lookup("CLIENT_PLAYER_ID").context("CLIENT_PLAYER_ID is not set")?;
        let mut config = Self::new(player_id);

        let remote = &mut config.remote;
        if let Some(host) = lookup("CLIENT_HOST") {
            remote.host = host;
        }
        if let Some(port) = lookup("CLIENT_PORT") {
            remote.port = port
                .trim()
                .parse()
                .with_context(|| format!("CLIENT_PORT should be a port number, got '{port}'"))?;
        }
        if let Some(user) = lookup("CLIENT_USER") {
            remote.user = user;
        }
        if let Some(password) = lookup("CLIENT_PASSWORD") {
            remote.password = password;
        }
        if let Some(base_dir) = lookup("CLIENT_REMOTE_BASE_DIR") {
            remote.base_dir = base_dir;
        }
        remote.feed_path = lookup("CLIENT_REMOTE_FEED");
        if let Some(subdir) = lookup("CLIENT_UPLOAD_SUBDIR") {
            remote.upload_subdir = subdir;
        }
        remote.connect_timeout = secs("CLIENT_CONNECT_TIMEOUT_SECS", 5)?;

        if let Some(path) = lookup("CLIENT_EVENT_LOG") {
            config.event_log = PathBuf::from(path);
        }
        if let Some(path) = lookup("CLIENT_FEED_MIRROR") {
            config.feed_mirror = PathBuf::from(path);
        }
        config.catalog = lookup("CLIENT_CATALOG").map(PathBuf::from);
        if let Some(interpreter) = lookup("CLIENT_INTERPRETER") {
            config.interpreter = interpreter;
        }
        config.accept_poll = secs("CLIENT_ACCEPT_POLL_SECS", 3)?;
        config.round_poll = secs("CLIENT_ROUND_POLL_SECS", 2)?;
        config.max_backoff = secs("CLIENT_MAX_BACKOFF_SECS", 16)?;
        config.verbose = flag("CLIENT_VERBOSE", true);
        config.log = flag("CLIENT_LOG", false);
        if let Some(dir) = lookup("CLIENT_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Identity of this player.
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Host connection settings.
    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }

    /// Set the host address.
    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.remote.host = host.into();
        self.remote.port = port;
        self
    }

    /// Set the SSH credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.remote.user = user.into();
        self.remote.password = password.into();
        self
    }

    /// Set the remote base directory, and optionally the feed path (defaults to `<base>/orders.log`).
    pub fn with_remote_dirs(mut self, base_dir: impl Into<String>, feed: Option<String>) -> Self {
        self.remote.base_dir = base_dir.into();
        self.remote.feed_path = feed;
        self
    }

    /// Set the local event log path.
    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log = path.into();
        self
    }

    /// Set the local mirror of the order feed.
    pub fn with_feed_mirror(mut self, path: impl Into<PathBuf>) -> Self {
        self.feed_mirror = path.into();
        self
    }

    /// Load the game catalog from a file instead of using the built-in one.
    pub fn with_catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog = Some(path.into());
        self
    }

    /// Set the delays between acceptance polls and between round polls.
    pub fn with_poll_intervals(mut self, accept: Duration, round: Duration) -> Self {
        self.accept_poll = accept;
        self.round_poll = round;
        self
    }

    /// Set the longest poll delay reached while the host is unreachable.
    pub fn with_max_backoff(mut self, value: Duration) -> Self {
        self.max_backoff = value;
        self
    }

    /// Enable or disable progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn player_id_is_required() {
        assert!(Configuration::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn defaults_from_env() {
        let config = Configuration::from_lookup(lookup(&[("CLIENT_PLAYER_ID", "7")])).unwrap();
        assert_eq!(config.player_id(), "7");
        assert_eq!(config.accept_poll, Duration::from_secs(3));
        assert_eq!(config.round_poll, Duration::from_secs(2));
        assert_eq!(config.remote().feed_path(), "Player_logs/orders.log");
        assert_eq!(config.remote().upload_subdir, "recibidos");
        assert!(config.verbose);
        assert!(!config.log);
    }

    #[test]
    fn event_log_is_shared_with_builtin_games() {
        let config = Configuration::new("7");
        assert_eq!(config.event_log, PathBuf::from("eventos_minijuego1.log"));
        assert_eq!(config.event_log, PathBuf::from(BUILTIN_GAMES_LOG));
    }

    #[test]
    fn overrides_from_env() {
        let config = Configuration::from_lookup(lookup(&[
            ("CLIENT_PLAYER_ID", "tonoto"),
            ("CLIENT_HOST", "192.168.0.24"),
            ("CLIENT_PORT", "2222"),
            ("CLIENT_REMOTE_BASE_DIR", "/srv/game/"),
            ("CLIENT_ROUND_POLL_SECS", "1"),
            ("CLIENT_VERBOSE", "FALSE"),
            ("CLIENT_LOG", "True"),
        ]))
        .unwrap();
        assert_eq!(config.remote().host, "192.168.0.24");
        assert_eq!(config.remote().port, 2222);
        assert_eq!(config.remote().feed_path(), "/srv/game/orders.log");
        assert_eq!(config.round_poll, Duration::from_secs(1));
        assert!(!config.verbose);
        assert!(config.log);
    }

    #[test]
    fn password_is_not_printed() {
        let config = Configuration::new("7").with_credentials("minipc", "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn bad_number_is_reported() {
        let err = Configuration::from_lookup(lookup(&[
            ("CLIENT_PLAYER_ID", "7"),
            ("CLIENT_ACCEPT_POLL_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CLIENT_ACCEPT_POLL_SECS"));
    }
}

//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The bearer token is loaded from TWS_BEARER_TOKEN or bearer_token_file and
//! falls back to the built-in web client token.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use twitter_api::ApiConfig;
use twitter_auth::LoginConfig;
use twitter_pool::PoolConfig;
use upstream::ClientConfig;

/// Root configuration. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub login: LoginSection,
    #[serde(default)]
    pub pool: PoolSection,
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one JSON document per account
    #[serde(default = "default_accounts_dir")]
    pub accounts_dir: PathBuf,
}

/// Upstream HTTP settings
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Send every request to this origin instead of the public endpoints
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(skip)]
    pub bearer_token: Option<Secret<String>>,
    /// Path to a file containing the bearer token (alternative to TWS_BEARER_TOKEN)
    #[serde(default)]
    pub bearer_token_file: Option<PathBuf>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct LoginSection {
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub email_first: bool,
    #[serde(default = "default_code_timeout")]
    pub code_timeout_secs: u64,
    #[serde(default = "default_code_poll_interval")]
    pub code_poll_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct PoolSection {
    /// Unset waits for an account indefinitely
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_secs: u64,
}

fn default_accounts_dir() -> PathBuf {
    PathBuf::from("accounts")
}

fn default_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_code_timeout() -> u64 {
    30
}

fn default_code_poll_interval() -> u64 {
    5
}

fn default_max_poll_interval() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            accounts_dir: default_accounts_dir(),
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            user_agent: None,
            base_url: None,
            bearer_token: None,
            bearer_token_file: None,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for LoginSection {
    fn default() -> Self {
        Self {
            manual: false,
            email_first: false,
            code_timeout_secs: default_code_timeout(),
            code_poll_interval_secs: default_code_poll_interval(),
        }
    }
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: None,
            max_poll_interval_secs: default_max_poll_interval(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Bearer token resolution order:
    /// 1. TWS_BEARER_TOKEN env var
    /// 2. bearer_token_file path from config
    /// 3. built-in default
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        config.client.bearer_token = common::resolve_secret(
            "TWS_BEARER_TOKEN",
            config.client.bearer_token_file.as_deref(),
        )?;

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let positive = [
            ("client.timeout_secs", self.client.timeout_secs),
            ("client.max_attempts", u64::from(self.client.max_attempts)),
            ("login.code_timeout_secs", self.login.code_timeout_secs),
            (
                "login.code_poll_interval_secs",
                self.login.code_poll_interval_secs,
            ),
            ("pool.max_poll_interval_secs", self.pool.max_poll_interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if let Some(base) = &self.client.base_url
            && !base.starts_with("http://")
            && !base.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {base}"
            )));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("twscrape.toml")
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut client = match &self.client.base_url {
            Some(base) => ClientConfig::with_base_url(base),
            None => ClientConfig::default(),
        };
        client.timeout = Duration::from_secs(self.client.timeout_secs);
        if let Some(user_agent) = &self.client.user_agent {
            client.user_agent.clone_from(user_agent);
        }
        if let Some(token) = &self.client.bearer_token {
            client.bearer_token.clone_from(token.expose());
        }
        client
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            max_attempts: self.client.max_attempts,
            retry_delay: Duration::from_millis(self.client.retry_delay_ms),
        }
    }

    pub fn login_config(&self) -> LoginConfig {
        LoginConfig {
            manual: self.login.manual,
            email_first: self.login.email_first,
            code_timeout: Duration::from_secs(self.login.code_timeout_secs),
            code_poll_interval: Duration::from_secs(self.login.code_poll_interval_secs),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            acquire_timeout: self.pool.acquire_timeout_secs.map(Duration::from_secs),
            max_poll_interval: Duration::from_secs(self.pool.max_poll_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("twscrape.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("TWS_BEARER_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.store.accounts_dir, PathBuf::from("accounts"));
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.client.max_attempts, 3);
        assert!(!config.login.manual);
        assert_eq!(config.login.code_timeout_secs, 30);
        assert_eq!(config.pool.acquire_timeout_secs, None);
        assert!(config.client.bearer_token.is_none());

        let client = config.client_config();
        assert_eq!(client.bearer_token, upstream::DEFAULT_BEARER_TOKEN);
        assert_eq!(client.gql_url, upstream::GQL_URL);
        assert_eq!(config.pool_config().acquire_timeout, None);
    }

    #[test]
    fn test_load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("TWS_BEARER_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[store]
accounts_dir = "/var/lib/twscrape/accounts"

[client]
timeout_secs = 10
user_agent = "test-agent"
base_url = "http://127.0.0.1:9000/"
max_attempts = 5
retry_delay_ms = 250

[login]
manual = true
email_first = true
code_timeout_secs = 90
code_poll_interval_secs = 2

[pool]
acquire_timeout_secs = 60
max_poll_interval_secs = 1
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.store.accounts_dir,
            PathBuf::from("/var/lib/twscrape/accounts")
        );

        let client = config.client_config();
        assert_eq!(client.timeout, Duration::from_secs(10));
        assert_eq!(client.user_agent, "test-agent");
        assert_eq!(client.gql_url, "http://127.0.0.1:9000/i/api/graphql");

        let api = config.api_config();
        assert_eq!(api.max_attempts, 5);
        assert_eq!(api.retry_delay, Duration::from_millis(250));

        let login = config.login_config();
        assert!(login.manual);
        assert!(login.email_first);
        assert_eq!(login.code_timeout, Duration::from_secs(90));
        assert_eq!(login.code_poll_interval, Duration::from_secs(2));

        let pool = config.pool_config();
        assert_eq!(pool.acquire_timeout, Some(Duration::from_secs(60)));
        assert_eq!(pool.max_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/twscrape.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_zero_values_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("TWS_BEARER_TOKEN") };
        let cases = [
            ("[client]\ntimeout_secs = 0", "client.timeout_secs"),
            ("[client]\nmax_attempts = 0", "client.max_attempts"),
            ("[login]\ncode_timeout_secs = 0", "login.code_timeout_secs"),
            (
                "[login]\ncode_poll_interval_secs = 0",
                "login.code_poll_interval_secs",
            ),
            ("[pool]\nmax_poll_interval_secs = 0", "pool.max_poll_interval_secs"),
        ];
        for (contents, field) in cases {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(&dir, contents);
            let err = Config::load(&path).unwrap_err().to_string();
            assert!(
                err.contains(&format!("{field} must be greater than 0")),
                "got: {err}"
            );
        }
    }

    #[test]
    fn test_base_url_without_scheme_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[client]\nbase_url = \"twitter.com\"");
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("base_url must start with http"), "got: {err}");
    }

    #[test]
    fn test_bearer_token_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("TWS_BEARER_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("bearer");
        std::fs::write(&token_path, "file-token\n").unwrap();
        let path = write_config(
            &dir,
            &format!(
                "[client]\nbearer_token_file = \"{}\"",
                token_path.display()
            ),
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.client_config().bearer_token, "file-token");
    }

    #[test]
    fn test_bearer_token_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("bearer");
        std::fs::write(&token_path, "file-token").unwrap();
        let path = write_config(
            &dir,
            &format!(
                "[client]\nbearer_token_file = \"{}\"",
                token_path.display()
            ),
        );

        unsafe { set_env("TWS_BEARER_TOKEN", "env-token") };
        let config = Config::load(&path);
        unsafe { remove_env("TWS_BEARER_TOKEN") };
        assert_eq!(config.unwrap().client_config().bearer_token, "env-token");
    }

    #[test]
    fn test_bearer_token_file_nonexistent_returns_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("TWS_BEARER_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[client]\nbearer_token_file = \"/nonexistent/path/bearer\"",
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("twscrape.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }
}

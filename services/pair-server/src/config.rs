//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The upload token is loaded from the UPLOAD_TOKEN env var or
//! `upload.token_file`, never stored in the TOML directly.

use common::Secret;
use pairing::{AttemptPolicy, Branding, DEFAULT_SESSION_MARKER, DEFAULT_UPLOAD_URL_PREFIX};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
    pub bridge: BridgeConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub branding: Branding,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// How long the handler waits for a pairing code before answering
    /// with the unavailable placeholder
    #[serde(default = "default_code_timeout")]
    pub code_timeout_secs: u64,
}

/// Attempt workflow settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    pub temp_dir: PathBuf,
    pub session_marker: String,
    pub code_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub close_delay_ms: u64,
    pub export_read_attempts: u32,
    pub export_poll_ms: u64,
    /// Reconnects allowed per attempt; absent retries until success or 401
    pub max_retries: Option<u32>,
    /// Lifetime of one attempt; absent has no limit
    pub attempt_deadline_secs: Option<u64>,
    pub max_active_attempts: usize,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./temp"),
            session_marker: DEFAULT_SESSION_MARKER.to_string(),
            code_delay_ms: 1500,
            settle_delay_ms: 4000,
            retry_delay_ms: 2000,
            close_delay_ms: 10,
            export_read_attempts: 3,
            export_poll_ms: 1000,
            max_retries: None,
            attempt_deadline_secs: None,
            max_active_attempts: 32,
        }
    }
}

impl PairingConfig {
    pub fn policy(&self) -> AttemptPolicy {
        AttemptPolicy {
            code_delay: Duration::from_millis(self.code_delay_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_retries: self.max_retries,
            deadline: self.attempt_deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Protocol bridge sidecar settings
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    pub url: String,
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,
    /// Browser names advertised to the server; one is picked per session
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
}

/// Blob storage upload settings
#[derive(Debug, Deserialize)]
pub struct UploadConfig {
    pub endpoint: String,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,
    #[serde(skip)]
    pub token: Option<Secret<String>>,
    /// Path to a file containing the upload token (alternative to UPLOAD_TOKEN)
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

fn default_max_connections() -> usize {
    100
}

fn default_code_timeout() -> u64 {
    60
}

fn default_bridge_timeout() -> u64 {
    30
}

fn default_upload_timeout() -> u64 {
    60
}

fn default_url_prefix() -> String {
    DEFAULT_UPLOAD_URL_PREFIX.to_string()
}

fn default_browsers() -> Vec<String> {
    vec!["Safari".into(), "Chrome".into(), "Firefox".into()]
}

fn require_http_url(field: &'static str, url: &str) -> common::Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(common::Error::invalid(
            field,
            format!("must start with http:// or https://, got: {url}"),
        ));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Upload token resolution order:
    /// 1. UPLOAD_TOKEN env var
    /// 2. token_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(token) = std::env::var("UPLOAD_TOKEN") {
            config.upload.token = Some(Secret::new(token));
        } else if let Some(ref token_file) = config.upload.token_file {
            let token = std::fs::read_to_string(token_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read token_file {}: {e}",
                    token_file.display()
                ))
            })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.upload.token = Some(Secret::new(token));
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("bridge.url", &self.bridge.url)?;
        require_http_url("upload.endpoint", &self.upload.endpoint)?;

        if self.server.code_timeout_secs == 0 {
            return Err(common::Error::invalid(
                "server.code_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::invalid(
                "server.max_connections",
                "must be greater than 0",
            ));
        }
        if self.pairing.max_active_attempts == 0 {
            return Err(common::Error::invalid(
                "pairing.max_active_attempts",
                "must be greater than 0",
            ));
        }
        if self.pairing.export_read_attempts == 0 {
            return Err(common::Error::invalid(
                "pairing.export_read_attempts",
                "must be greater than 0",
            ));
        }
        if self.pairing.session_marker.is_empty() || self.pairing.session_marker.contains('~') {
            return Err(common::Error::invalid(
                "pairing.session_marker",
                "must be non-empty and must not contain '~'",
            ));
        }
        if self.upload.url_prefix.is_empty() {
            return Err(common::Error::invalid(
                "upload.url_prefix",
                "must not be empty",
            ));
        }
        if self.bridge.browsers.is_empty() {
            return Err(common::Error::invalid(
                "bridge.browsers",
                "must list at least one browser",
            ));
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
        PathBuf::from("pairgate.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn minimal_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:8000"

[bridge]
url = "http://127.0.0.1:3001"

[upload]
endpoint = "https://upload.example/put"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("pairgate.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("UPLOAD_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.max_connections, 100);
        assert_eq!(config.server.code_timeout_secs, 60);
        assert_eq!(config.pairing.temp_dir, PathBuf::from("./temp"));
        assert_eq!(config.pairing.session_marker, "BRAVO");
        assert_eq!(config.pairing.max_retries, None);
        assert_eq!(config.pairing.max_active_attempts, 32);
        assert_eq!(config.bridge.timeout_secs, 30);
        assert_eq!(config.bridge.browsers, vec!["Safari", "Chrome", "Firefox"]);
        assert_eq!(config.upload.url_prefix, "https://mega.nz/file/");
        assert_eq!(config.branding, Branding::default());
        assert!(config.upload.token.is_none());
    }

    #[test]
    fn test_policy_reflects_pairing_section() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("UPLOAD_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &format!(
                "{}\n[pairing]\ncode_delay_ms = 100\nsettle_delay_ms = 200\nretry_delay_ms = 300\nmax_retries = 5\nattempt_deadline_secs = 600\n",
                minimal_toml()
            ),
        );

        let policy = Config::load(&path).unwrap().pairing.policy();
        assert_eq!(policy.code_delay, Duration::from_millis(100));
        assert_eq!(policy.settle_delay, Duration::from_millis(200));
        assert_eq!(policy.retry_delay, Duration::from_millis(300));
        assert_eq!(policy.max_retries, Some(5));
        assert_eq!(policy.deadline, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_default_policy_matches_library_default() {
        assert_eq!(PairingConfig::default().policy(), AttemptPolicy::default());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/pairgate.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_branding_override() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("UPLOAD_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &format!("{}\n[branding]\ntitle = \"MY-BOT\"\n", minimal_toml()),
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.branding.title, "MY-BOT");
        assert_eq!(config.branding.repo_url, Branding::default().repo_url);
    }

    #[test]
    fn test_token_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        unsafe { set_env("UPLOAD_TOKEN", "upl-env-123") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.upload.token.as_ref().unwrap().expose(),
            "upl-env-123"
        );
        unsafe { remove_env("UPLOAD_TOKEN") };
    }

    #[test]
    fn test_token_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("UPLOAD_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("upload_token");
        std::fs::write(&token_path, "upl-file-456\n").unwrap();
        let path = write_config(
            &dir,
            &minimal_toml().replace(
                "endpoint = \"https://upload.example/put\"",
                &format!(
                    "endpoint = \"https://upload.example/put\"\ntoken_file = \"{}\"",
                    token_path.display()
                ),
            ),
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.upload.token.as_ref().unwrap().expose(),
            "upl-file-456"
        );
    }

    #[test]
    fn test_token_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &minimal_toml().replace(
                "endpoint = \"https://upload.example/put\"",
                "endpoint = \"https://upload.example/put\"\ntoken_file = \"/nonexistent/upload_token\"",
            ),
        );

        unsafe { set_env("UPLOAD_TOKEN", "upl-env-wins") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.upload.token.as_ref().unwrap().expose(),
            "upl-env-wins",
            "UPLOAD_TOKEN must take precedence over token_file"
        );
        unsafe { remove_env("UPLOAD_TOKEN") };
    }

    #[test]
    fn test_missing_token_file_returns_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("UPLOAD_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &minimal_toml().replace(
                "endpoint = \"https://upload.example/put\"",
                "endpoint = \"https://upload.example/put\"\ntoken_file = \"/nonexistent/upload_token\"",
            ),
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_invalid_bridge_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &minimal_toml().replace("http://127.0.0.1:3001", "127.0.0.1:3001"),
        );
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("bridge.url"), "got: {err}");
    }

    #[test]
    fn test_marker_with_separator_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &format!("{}\n[pairing]\nsession_marker = \"A~B\"\n", minimal_toml()),
        );
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("session_marker"), "got: {err}");
    }

    #[test]
    fn test_zero_limits_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for section in [
            "[pairing]\nmax_active_attempts = 0\n",
            "[pairing]\nexport_read_attempts = 0\n",
        ] {
            let path = write_config(&dir, &format!("{}\n{section}", minimal_toml()));
            assert!(Config::load(&path).is_err(), "{section} must be rejected");
        }

        let path = write_config(
            &dir,
            &minimal_toml().replace(
                "listen_addr = \"127.0.0.1:8000\"",
                "listen_addr = \"127.0.0.1:8000\"\ncode_timeout_secs = 0",
            ),
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
        assert_eq!(path, PathBuf::from("pairgate.toml"));
    }
}

use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Set only behind a reverse proxy that appends the caller to
    /// `X-Forwarded-For`. Otherwise the header is ignored.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

/// Session lifetime and abuse limits.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayConfig {
    pub session_ttl_secs: u64,
    pub qr_cooldown_secs: u64,
    pub rate_limit_per_window: usize,
    pub rate_window_secs: u64,
    pub sweep_interval_secs: u64,
    pub default_user_key: String,
}

impl RelayConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn qr_cooldown(&self) -> Duration {
        Duration::from_secs(self.qr_cooldown_secs)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 300,
            qr_cooldown_secs: 60,
            rate_limit_per_window: 10,
            rate_window_secs: 60,
            sweep_interval_secs: 30,
            default_user_key: "anonymous".to_string(),
        }
    }
}

/// Everything the provider may change under us: endpoints, the client
/// profile we impersonate and the name of the auth cookie.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub generate_path: String,
    pub status_path: String,
    pub login_path: String,
    pub timeout_seconds: u64,
    pub auth_cookie_name: String,
    pub device_fingerprint: String,
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
}

impl UpstreamConfig {
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            generate_path: "generate-qr-code".to_string(),
            status_path: "check-qr-status".to_string(),
            login_path: "login-qr".to_string(),
            timeout_seconds: 10,
            auth_cookie_name: "SPC_ST".to_string(),
            device_fingerprint: String::new(),
            headers: default_headers(),
        }
    }
}

const DEFAULT_BASE_URL: &str =
    "https://us-central1-get-feedback-a0119.cloudfunctions.net/app/api/shopee";

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "User-Agent".to_string(),
            "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36".to_string(),
        ),
        ("Accept".to_string(), "application/json, text/plain, */*".to_string()),
        ("Accept-Language".to_string(), "vi-VN,vi;q=0.9,en-US;q=0.8".to_string()),
    ])
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for the daily rolling log file. Stdout only when unset.
    pub directory: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let relay = RelayConfig::default();
        let upstream = UpstreamConfig::default();

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.trust_forwarded_for", false)?
            .set_default("relay.session_ttl_secs", relay.session_ttl_secs)?
            .set_default("relay.qr_cooldown_secs", relay.qr_cooldown_secs)?
            .set_default("relay.rate_limit_per_window", relay.rate_limit_per_window as u64)?
            .set_default("relay.rate_window_secs", relay.rate_window_secs)?
            .set_default("relay.sweep_interval_secs", relay.sweep_interval_secs)?
            .set_default("relay.default_user_key", relay.default_user_key)?
            .set_default("upstream.base_url", upstream.base_url)?
            .set_default("upstream.generate_path", upstream.generate_path)?
            .set_default("upstream.status_path", upstream.status_path)?
            .set_default("upstream.login_path", upstream.login_path)?
            .set_default("upstream.timeout_seconds", upstream.timeout_seconds)?
            .set_default("upstream.auth_cookie_name", upstream.auth_cookie_name)?
            .set_default("upstream.device_fingerprint", upstream.device_fingerprint)?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

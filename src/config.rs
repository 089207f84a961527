use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    pub erp: ErpConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for one transaction request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErpConfig {
    pub api_url: String,
    pub transaction_url: String,
    pub renew_url: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_token_safety_margin_secs")]
    pub token_safety_margin_secs: u64,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub ping_interval_secs: u64,
    pub ping_timeout_ms: u64,
    /// Redis session store; sessions stay in process memory when unset
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3000,
            ping_interval_secs: 15,
            ping_timeout_ms: 5000,
            redis_url: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_ttl_secs")]
    pub token_ttl_secs: u64,
}

fn default_request_timeout_ms() -> u64 {
    60_000
}
fn default_token_ttl_secs() -> u64 {
    290
}
fn default_token_safety_margin_secs() -> u64 {
    10
}
fn default_http_timeout_ms() -> u64 {
    10_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    300
}
fn default_poll_attempts() -> u32 {
    10
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_jwt_ttl_secs() -> u64 {
    3000
}

impl AppConfig {
    /// Load `config/{env}.yaml`, apply secret overrides from the
    /// environment, then validate.
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config yaml")
    }

    /// Secrets are usually injected by the environment rather than committed
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&str, &mut String); 5] = [
            ("ERP_APP_KEY", &mut self.erp.app_key),
            ("ERP_TOKEN", &mut self.erp.token),
            ("ERP_USERNAME", &mut self.erp.username),
            ("ERP_PASSWORD", &mut self.erp.password),
            ("JWT_SECRET", &mut self.auth.jwt_secret),
        ];
        for (key, slot) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
        if let Some(url) = lookup("REDIS_URL").filter(|v| !v.is_empty()) {
            self.session.redis_url = Some(url);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("erp.api_url", &self.erp.api_url),
            ("erp.transaction_url", &self.erp.transaction_url),
            ("erp.renew_url", &self.erp.renew_url),
            ("auth.jwt_secret", &self.auth.jwt_secret),
        ] {
            if value.trim().is_empty() {
                bail!("{} must not be empty", name);
            }
        }
        if self.session.ping_interval_secs == 0 {
            bail!("session.ping_interval_secs must be positive");
        }
        if self.session.ping_interval_secs >= self.session.ttl_secs {
            bail!(
                "session.ping_interval_secs ({}) must be shorter than session.ttl_secs ({})",
                self.session.ping_interval_secs,
                self.session.ttl_secs
            );
        }
        if self.erp.max_attempts == 0 {
            bail!("erp.max_attempts must be at least 1");
        }
        if self.erp.poll_attempts == 0 {
            bail!("erp.poll_attempts must be at least 1");
        }
        if self.erp.token_safety_margin_secs >= self.erp.token_ttl_secs {
            bail!(
                "erp.token_safety_margin_secs ({}) must be shorter than erp.token_ttl_secs ({})",
                self.erp.token_safety_margin_secs,
                self.erp.token_ttl_secs
            );
        }
        Ok(())
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ErpConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn token_safety_margin(&self) -> Duration {
        Duration::from_secs(self.token_safety_margin_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: stockgate.log
use_json: false
rotation: daily
gateway:
  host: 0.0.0.0
  port: 8080
erp:
  api_url: https://api.erp.example
  transaction_url: https://erp.example/mge
  renew_url: https://erp.example/mge/keepalive
auth:
  jwt_secret: dev-secret
"#;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.gateway.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.erp.token_ttl_secs, 290);
        assert_eq!(config.erp.token_safety_margin_secs, 10);
        assert_eq!(config.erp.max_attempts, 3);
        assert_eq!(config.erp.poll_attempts, 10);
        assert_eq!(config.erp.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.session.ttl(), Duration::from_secs(3000));
        assert_eq!(config.session.ping_interval(), Duration::from_secs(15));
        assert_eq!(config.auth.token_ttl_secs, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_secrets() {
        let mut config = AppConfig::from_yaml(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("ERP_PASSWORD", "s3cret"),
            ("JWT_SECRET", "prod-secret"),
            ("ERP_TOKEN", ""),
            ("REDIS_URL", "redis://cache:6379/2"),
        ]);
        assert_eq!(config.session.redis_url, None);
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.session.redis_url.as_deref(), Some("redis://cache:6379/2"));
        assert_eq!(config.erp.password, "s3cret");
        assert_eq!(config.auth.jwt_secret, "prod-secret");
        assert_eq!(config.erp.token, "");
    }

    #[test]
    fn test_validation_rejects_missing_secret() {
        let mut config = AppConfig::from_yaml(MINIMAL).unwrap();
        config.auth.jwt_secret.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth.jwt_secret"));
    }

    #[test]
    fn test_validation_rejects_ping_not_shorter_than_ttl() {
        let mut config = AppConfig::from_yaml(MINIMAL).unwrap();
        config.session.ping_interval_secs = config.session.ttl_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_poll_attempts() {
        let mut config = AppConfig::from_yaml(MINIMAL).unwrap();
        config.erp.poll_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("erp.poll_attempts"));
    }

    #[test]
    fn test_validation_rejects_margin_covering_token_ttl() {
        let mut config = AppConfig::from_yaml(MINIMAL).unwrap();
        config.erp.token_safety_margin_secs = config.erp.token_ttl_secs;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("erp.token_safety_margin_secs"));
    }
}

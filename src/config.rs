//! Bot configuration: TOML file with environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("bot token is not set (bot_token in config or TELEGRAM_BOT_TOKEN)")]
    MissingToken,
    #[error("{name} must be a numeric chat id, got {value:?}")]
    InvalidChatId { name: &'static str, value: String },
    #[error("webapp_url is not a valid URL: {0}")]
    InvalidWebappUrl(#[from] url::ParseError),
    #[error("session.{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub cart_render_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 3600,
            sweep_interval_secs: 60,
            cart_render_delay_ms: 1000,
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn cart_render_delay(&self) -> Duration {
        Duration::from_millis(self.cart_render_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot_token: Option<String>,
    pub db_path: PathBuf,
    /// Telegram users allowed to run admin commands.
    pub admin_ids: Vec<i64>,
    /// Direct chat that receives detailed order notifications.
    pub admin_chat_id: Option<i64>,
    /// Group that receives short order notifications.
    pub admin_group_id: Option<i64>,
    pub webapp_url: Option<url::Url>,
    pub shop_name: String,
    pub currency: String,
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            db_path: PathBuf::from("/var/lib/shop-bot/shop.db"),
            admin_ids: Vec::new(),
            admin_chat_id: None,
            admin_group_id: None,
            webapp_url: None,
            shop_name: "Fresh777".to_string(),
            currency: "so'm".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Loads the file at `path` (defaults if it does not exist) and applies
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::parse(&raw)?
        } else {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults and environment"
            );
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(token) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.bot_token = Some(token);
        }
        if let Some(path) = non_empty("SHOP_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(value) = non_empty("ADMIN_CHAT_ID") {
            self.admin_chat_id = Some(parse_chat_id("ADMIN_CHAT_ID", &value)?);
        }
        if let Some(value) = non_empty("ADMIN_GROUP_ID") {
            self.admin_group_id = Some(parse_chat_id("ADMIN_GROUP_ID", &value)?);
        }
        if let Some(value) = non_empty("WEBAPP_URL") {
            self.webapp_url = Some(url::Url::parse(value.trim())?);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.idle_ttl_secs == 0 {
            return Err(ConfigError::ZeroDuration("idle_ttl_secs"));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("sweep_interval_secs"));
        }
        Ok(())
    }

    pub fn bot_token(&self) -> Result<String, ConfigError> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or(ConfigError::MissingToken)
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    /// Web-app link for the storefront; Telegram only accepts https here.
    pub fn webapp_link(&self) -> Option<&url::Url> {
        self.webapp_url
            .as_ref()
            .filter(|url| url.scheme() == "https")
    }
}

fn parse_chat_id(name: &'static str, value: &str) -> Result<i64, ConfigError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidChatId {
            name,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parses_file_with_session_section() {
        let config = Config::parse(
            r#"
            bot_token = "123:abc"
            db_path = "/tmp/shop.db"
            admin_ids = [1, 2]
            admin_group_id = -100500
            shop_name = "Test shop"

            [session]
            idle_ttl_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.bot_token().unwrap(), "123:abc");
        assert!(config.is_admin(2));
        assert!(!config.is_admin(3));
        assert_eq!(config.admin_group_id, Some(-100500));
        assert_eq!(config.admin_chat_id, None);
        assert_eq!(config.session.idle_ttl(), Duration::from_secs(120));
        assert_eq!(config.session.sweep_interval_secs, 60);
        assert_eq!(config.currency, "so'm");
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = Config::parse(r#"bot_token = "from-file""#).unwrap();
        config
            .apply_env(env(&[
                ("TELEGRAM_BOT_TOKEN", "from-env"),
                ("ADMIN_CHAT_ID", " 42 "),
                ("WEBAPP_URL", "https://shop.example.com"),
                ("ADMIN_GROUP_ID", ""),
            ]))
            .unwrap();

        assert_eq!(config.bot_token().unwrap(), "from-env");
        assert_eq!(config.admin_chat_id, Some(42));
        assert_eq!(config.admin_group_id, None);
        assert!(config.webapp_link().is_some());
    }

    #[test]
    fn rejects_non_numeric_chat_id() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("ADMIN_GROUP_ID", "@shop_admins")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidChatId {
                name: "ADMIN_GROUP_ID",
                ..
            }
        ));
    }

    #[test]
    fn missing_token_is_an_error() {
        let config = Config {
            bot_token: Some("   ".to_string()),
            ..Config::default()
        };
        assert!(matches!(config.bot_token(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn plain_http_webapp_is_not_linked() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("WEBAPP_URL", "http://localhost:5000")]))
            .unwrap();
        assert!(config.webapp_url.is_some());
        assert!(config.webapp_link().is_none());
    }

    #[test]
    fn zero_ttl_fails_validation() {
        let config = Config::parse("[session]\nidle_ttl_secs = 0").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("idle_ttl_secs"))
        ));
    }
}

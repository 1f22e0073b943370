//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::bot::WizardOptions;
use crate::error::ConfigError;

pub const DEFAULT_DB_PATH: &str = "./data/signal-relay.db";
pub const DEFAULT_WEBHOOK_URL: &str = "https://pineconnector.net/webhook/";
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram channel configuration. Present only when a bot token is set.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
}

impl TelegramConfig {
    pub fn allows_everyone(&self) -> bool {
        self.allowed_users.iter().any(|u| u == "*")
    }
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// `None` runs the bot on the local CLI channel.
    pub telegram: Option<TelegramConfig>,
    pub db_path: PathBuf,
    pub webhook_url: String,
    pub webhook_timeout: Duration,
    pub wizard: WizardOptions,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            webhook_url: DEFAULT_WEBHOOK_URL.to_string(),
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
            wizard: WizardOptions::default(),
        }
    }
}

impl BotConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key → value lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let telegram = var("TELEGRAM_BOT_TOKEN").map(|token| {
            let allowed_users: Vec<String> = var("TELEGRAM_ALLOWED_USERS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            TelegramConfig {
                bot_token: SecretString::from(token.trim().to_string()),
                allowed_users,
            }
        });

        let db_path = var("SIGNAL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let webhook_url = var("SIGNAL_WEBHOOK_URL")
            .unwrap_or_else(|| DEFAULT_WEBHOOK_URL.to_string());
        if !webhook_url.starts_with("http://") && !webhook_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "SIGNAL_WEBHOOK_URL".into(),
                message: "must be an http(s) URL".into(),
            });
        }

        let webhook_timeout = match var("SIGNAL_WEBHOOK_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "SIGNAL_WEBHOOK_TIMEOUT_SECS".into(),
                        message: format!("expected a positive number of seconds, got '{raw}'"),
                    });
                }
            },
            None => DEFAULT_WEBHOOK_TIMEOUT,
        };

        let strict_numbers = match var("SIGNAL_STRICT_NUMBERS") {
            Some(raw) => parse_bool("SIGNAL_STRICT_NUMBERS", &raw)?,
            None => false,
        };

        Ok(Self {
            telegram,
            db_path,
            webhook_url,
            webhook_timeout,
            wizard: WizardOptions { strict_numbers },
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected true or false, got '{raw}'"),
        }),
    }
}

//! Runtime configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then
//! `IMGBOT_*` environment variables. The two credentials are also
//! accepted from their conventional names (`TELEGRAM_TOKEN`,
//! `OPENAI_API_KEY`).

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "imgbot.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] figment::Error),

    #[error("missing telegram bot token (set TELEGRAM_TOKEN or IMGBOT_TELEGRAM_TOKEN)")]
    MissingTelegramToken,
}

/// Bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: String,
    /// Image provider key; requests fail politely without one
    pub openai_api_key: Option<String>,
    /// Minimum seconds between processed requests per user
    pub cooldown_secs: u64,
    /// Root directory for generated images
    pub generated_dir: PathBuf,
    /// Root directory for uploaded images
    pub uploaded_dir: PathBuf,
    /// Directory for daily log files
    pub log_dir: PathBuf,
    /// Long-poll timeout passed to getUpdates
    pub poll_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            openai_api_key: None,
            cooldown_secs: 10,
            generated_dir: PathBuf::from("generated_images"),
            uploaded_dir: PathBuf::from("uploaded_images"),
            log_dir: PathBuf::from("logs"),
            poll_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration, layering defaults, TOML, and environment.
    pub fn load(config_file: Option<&Path>) -> Result<Config, ConfigError> {
        let toml = match config_file {
            Some(path) => Toml::file_exact(path),
            None => Toml::file(DEFAULT_CONFIG_FILE),
        };

        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(toml)
            .merge(Env::prefixed("IMGBOT_"))
            .extract()?;

        // Conventional credential names take over when the prefixed
        // forms are absent
        if config.telegram_token.is_empty() {
            if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
                config.telegram_token = token;
            }
        }
        if config.openai_api_key.is_none() {
            config.openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }

        if config.telegram_token.is_empty() {
            return Err(ConfigError::MissingTelegramToken);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cooldown_secs, 10);
        assert_eq!(config.poll_timeout_secs, 30);
        assert_eq!(config.generated_dir, PathBuf::from("generated_images"));
        assert_eq!(config.uploaded_dir, PathBuf::from("uploaded_images"));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_load_requires_token() {
        figment::Jail::expect_with(|_jail| {
            assert!(matches!(
                Config::load(None),
                Err(ConfigError::MissingTelegramToken)
            ));
            Ok(())
        });
    }

    #[test]
    fn test_env_layer_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("IMGBOT_TELEGRAM_TOKEN", "tok-123");
            jail.set_env("IMGBOT_COOLDOWN_SECS", "3");

            let config = Config::load(None).expect("load");
            assert_eq!(config.telegram_token, "tok-123");
            assert_eq!(config.cooldown_secs, 3);
            Ok(())
        });
    }

    #[test]
    fn test_conventional_credential_names() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TELEGRAM_TOKEN", "tok-legacy");
            jail.set_env("OPENAI_API_KEY", "sk-test");

            let config = Config::load(None).expect("load");
            assert_eq!(config.telegram_token, "tok-legacy");
            assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
            Ok(())
        });
    }

    #[test]
    fn test_toml_layer() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "imgbot.toml",
                r#"
                telegram_token = "tok-file"
                cooldown_secs = 20
                generated_dir = "out/generated"
                "#,
            )?;

            let config = Config::load(None).expect("load");
            assert_eq!(config.telegram_token, "tok-file");
            assert_eq!(config.cooldown_secs, 20);
            assert_eq!(config.generated_dir, PathBuf::from("out/generated"));
            Ok(())
        });
    }
}

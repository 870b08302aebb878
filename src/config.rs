use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::groq;

/// Environment variable holding the Telegram bot token.
pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_TOKEN";
/// Environment variable holding the completion provider API key.
pub const GROQ_API_KEY_VAR: &str = "GROQ_API_KEY";

const DEFAULT_BOT_USERNAME: &str = "robotutor_bot";
const DEFAULT_MENTION_ALIAS: &str = "john";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// A required environment variable is unset or empty.
    MissingEnv(&'static str),
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::MissingEnv(var) => write!(f, "environment variable {} is not set", var),
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::MissingEnv(_) | Self::Validation(_) => None,
        }
    }
}

/// Non-secret settings. Every field is optional; secrets never live here.
#[derive(Deserialize, Default)]
struct ConfigFile {
    /// Bot handle used for group mention detection (with or without `@`).
    bot_username: Option<String>,
    /// Extra trigger word for group mentions. Empty string disables it.
    mention_alias: Option<String>,
    model: Option<String>,
    api_url: Option<String>,
    request_timeout_secs: Option<u64>,
    /// Directory for the database and logs. Defaults to current directory.
    data_dir: Option<String>,
}

pub struct Config {
    pub telegram_token: String,
    pub groq_api_key: String,
    /// Lower-cased, without the leading `@`.
    pub bot_username: String,
    /// Lower-cased alias, `None` when disabled.
    pub mention_alias: Option<String>,
    pub model: String,
    pub api_url: String,
    pub request_timeout: Duration,
    pub data_dir: PathBuf,
}

impl Config {
    /// Load settings from an optional JSON file and secrets from the process environment.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], reading secrets through `env` instead of the process environment.
    pub fn load_with<P, F>(path: Option<P>, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) => {
                let path = path.as_ref().to_path_buf();
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::ReadFile { path: path.clone(), source: e })?;
                serde_json::from_str(&content)
                    .map_err(|e| ConfigError::ParseJson { path, source: e })?
            }
            None => ConfigFile::default(),
        };

        let telegram_token = required_env(&env, TELEGRAM_TOKEN_VAR)?;
        let groq_api_key = required_env(&env, GROQ_API_KEY_VAR)?;

        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} appears invalid (expected format: 123456789:ABCdefGHI...)",
                TELEGRAM_TOKEN_VAR
            )));
        }

        let bot_username = file
            .bot_username
            .unwrap_or_else(|| DEFAULT_BOT_USERNAME.to_string())
            .trim()
            .trim_start_matches('@')
            .to_lowercase();
        if bot_username.is_empty() {
            return Err(ConfigError::Validation("bot_username must not be empty".into()));
        }

        let mention_alias = match file.mention_alias {
            Some(alias) if alias.trim().is_empty() => None,
            Some(alias) => Some(alias.trim().to_lowercase()),
            None => Some(DEFAULT_MENTION_ALIAS.to_string()),
        };

        let timeout_secs = file
            .request_timeout_secs
            .unwrap_or(groq::DEFAULT_TIMEOUT.as_secs());
        if timeout_secs == 0 {
            return Err(ConfigError::Validation("request_timeout_secs must be positive".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_token,
            groq_api_key,
            bot_username,
            mention_alias,
            model: file.model.unwrap_or_else(|| groq::DEFAULT_MODEL.to_string()),
            api_url: file.api_url.unwrap_or_else(|| groq::DEFAULT_API_URL.to_string()),
            request_timeout: Duration::from_secs(timeout_secs),
            data_dir,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("robotutor.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn required_env<F>(env: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingEnv(key))
}

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_APP_NAME: &str = "Agenda";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub app_name: String,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: Option<String>,
    /// Base64url ES256 private key used to sign new-appointment events.
    pub signing_key: Option<String>,
    pub delivery_timeout: std::time::Duration,
    pub signature_ttl: time::Duration,
}

pub fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

pub fn default_delivery_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(5)
}

pub fn default_signature_ttl() -> time::Duration {
    time::Duration::days(7)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {field} '{value}'; expected <number>[s|m|h|d]")]
    InvalidDuration { field: &'static str, value: String },
    #[error("{field} must be greater than 0")]
    NonPositiveDuration { field: &'static str },
    #[error("invalid bind address '{0}'")]
    InvalidBind(String),
    #[error("invalid signing key")]
    InvalidSigningKey,
}

/// Settings read from `--config`. Anything given on the command line or in
/// the environment wins over the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<String>,
    pub app_name: Option<String>,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: Option<String>,
    pub signing_key: Option<String>,
    pub delivery_timeout: Option<String>,
    pub signature_ttl: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &raw)
    }

    fn parse(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Parses `<number>[s|m|h|d]`; a bare number is seconds.
pub fn parse_duration(field: &'static str, raw: &str) -> Result<time::Duration, ConfigError> {
    let value = raw.trim();
    let invalid = || ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    };
    if value.is_empty() {
        return Err(invalid());
    }

    let (amount, unit) = match value.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => {
            (&value[..value.len() - 1], ch.to_ascii_lowercase())
        }
        _ => (value, 's'),
    };

    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(ConfigError::NonPositiveDuration { field });
    }

    let factor: i64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return Err(invalid()),
    };
    amount
        .checked_mul(factor)
        .map(time::Duration::seconds)
        .ok_or_else(invalid)
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            app_name: DEFAULT_APP_NAME.to_string(),
            vapid_private_key: None,
            vapid_public_key: None,
            vapid_subject: None,
            signing_key: None,
            delivery_timeout: default_delivery_timeout(),
            signature_ttl: default_signature_ttl(),
        }
    }
}

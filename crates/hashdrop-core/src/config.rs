use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HashdropError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding blobs, temp files and the hash index.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            retention: RetentionConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Periodically evict files older than `max_age`. Off by default.
    #[serde(default)]
    pub enabled: bool,

    /// Maximum file age, e.g. "30m", "1h", "7d".
    #[serde(default = "default_max_age")]
    pub max_age: String,

    /// Sweep interval. Falls back to `max_age` when unset.
    #[serde(default)]
    pub every: Option<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age: default_max_age(),
            every: None,
        }
    }
}

impl RetentionConfig {
    pub fn max_age_duration(&self) -> Result<Duration> {
        parse_human_duration(&self.max_age)
    }

    pub fn sweep_interval(&self) -> Result<Duration> {
        match &self.every {
            Some(every) => parse_human_duration(every),
            None => self.max_age_duration(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_age() -> String {
    "1h".to_string()
}

/// Parse a simple duration string like "45s", "30m", "4h" or "2d".
/// A bare number is taken as seconds.
pub fn parse_human_duration(raw: &str) -> Result<Duration> {
    let input = raw.trim();
    let (num_part, unit) = match input.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&input[..input.len() - 1], Some(c)),
        Some(_) => (input, None),
        None => return Err(HashdropError::Config("duration must not be empty".into())),
    };

    let value: u64 = num_part
        .parse()
        .map_err(|_| HashdropError::Config(format!("invalid duration value: '{raw}'")))?;

    let secs = match unit {
        None | Some('s') | Some('S') => value,
        Some('m') | Some('M') => value.saturating_mul(60),
        Some('h') | Some('H') => value.saturating_mul(60 * 60),
        Some('d') | Some('D') => value.saturating_mul(60 * 60 * 24),
        Some(other) => {
            return Err(HashdropError::Config(format!(
                "unsupported duration suffix '{other}' in '{raw}' (use s/m/h/d)"
            )));
        }
    };

    if secs == 0 {
        return Err(HashdropError::Config(
            "duration must be greater than zero".into(),
        ));
    }

    Ok(Duration::from_secs(secs))
}

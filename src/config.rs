use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::{Error, Result};

/// Smallest retention window accepted, in days.
pub const MIN_AGE_DAYS: u32 = 7;

/// Default size limit of the active segment (10 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Default retention window, in days.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 30;

/// Default capacity of the dispatch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;

/// Parse a size string with an optional unit (K/M/G, case-insensitive).
/// A bare number is a byte count.
fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let Some(last) = s.chars().last() else {
        return Err("empty size string".to_string());
    };

    let (num_str, multiplier) = if last.is_alphabetic() {
        let multiplier = match last.to_ascii_uppercase() {
            'K' => 1024,
            'M' => 1024 * 1024,
            'G' => 1024 * 1024 * 1024,
            unit => return Err(format!("invalid unit: {}, supported: K/M/G", unit)),
        };
        (s[..s.len() - last.len_utf8()].trim_end(), multiplier)
    } else {
        (s, 1)
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| "size too large".to_string())
}

/// Size value that can be a number or string with units.
#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Number(u64),
    String(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Number(n) => Ok(n),
        SizeValue::String(s) => parse_size(&s).map_err(de::Error::custom),
    }
}

/// Rotation and retention settings for one log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Size limit of the active segment. Accepts a byte count or a string
    /// such as `"512K"`, `"10M"`, `"1g"`.
    #[serde(
        default = "default_max_size",
        alias = "max_size",
        deserialize_with = "deserialize_size"
    )]
    pub max_size_bytes: u64,
    /// Finalized segments older than this many days are deleted.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    /// Gzip each segment right after it is rotated away.
    #[serde(default, alias = "compress")]
    pub compress_on_rotate: bool,
}

impl RotationConfig {
    /// Create a new RotationConfig without compression.
    pub fn new(max_size_bytes: u64, max_age_days: u32) -> Self {
        Self {
            max_size_bytes,
            max_age_days,
            compress_on_rotate: false,
        }
    }

    /// Enable or disable compression of rotated segments.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress_on_rotate = compress;
        self
    }

    /// Retention window as a duration.
    pub fn max_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.max_age_days) * 24 * 60 * 60)
    }

    /// Check the invariants a logger relies on.
    pub fn validate(&self) -> Result<()> {
        if self.max_size_bytes == 0 {
            return Err(Error::Config("max_size_bytes must be positive".to_string()));
        }
        if self.max_age_days < MIN_AGE_DAYS {
            return Err(Error::Config(format!(
                "max_age_days must be at least {}, got {}",
                MIN_AGE_DAYS, self.max_age_days
            )));
        }
        Ok(())
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_MAX_AGE_DAYS)
    }
}

fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE
}

fn default_max_age_days() -> u32 {
    DEFAULT_MAX_AGE_DAYS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// Everything needed to start a logger, as supplied by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Directory holding the segments; created if missing.
    pub directory: PathBuf,
    /// File name prefix shared by every segment of this stream.
    pub prefix: String,
    /// Rotation and retention settings.
    #[serde(default)]
    pub rotation: RotationConfig,
    /// Capacity of the dispatch queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl LoggerConfig {
    /// Create a new LoggerConfig with default rotation settings.
    pub fn new<P: Into<PathBuf>, S: Into<String>>(directory: P, prefix: S) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            rotation: RotationConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Set rotation settings
    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Check the whole configuration.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(Error::Config("prefix must not be empty".to_string()));
        }
        if self
            .prefix
            .contains(|c: char| std::path::is_separator(c) || c == '\0')
        {
            return Err(Error::Config(format!(
                "prefix must be a plain file name, got {:?}",
                self.prefix
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be positive".to_string()));
        }
        self.rotation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("100"), Ok(100));
        assert_eq!(parse_size("5K"), Ok(5 * 1024));
        assert_eq!(parse_size("3k"), Ok(3 * 1024));
        assert_eq!(parse_size("2M"), Ok(2 * 1024 * 1024));
        assert_eq!(parse_size(" 4m "), Ok(4 * 1024 * 1024));
        assert_eq!(parse_size("1G"), Ok(1024 * 1024 * 1024));
    }

    #[test]
    fn test_parse_size_errors() {
        assert!(parse_size("").is_err());
        assert!(parse_size("10X").is_err());
        assert!(parse_size("abcK").is_err());
        assert!(parse_size("99999999999999999999G").is_err());
    }

    #[test]
    fn test_rotation_config_default() {
        let config = RotationConfig::default();
        assert_eq!(config.max_size_bytes, DEFAULT_MAX_SIZE);
        assert_eq!(config.max_age_days, DEFAULT_MAX_AGE_DAYS);
        assert!(!config.compress_on_rotate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rotation_config_age_floor() {
        assert!(RotationConfig::new(1024, MIN_AGE_DAYS).validate().is_ok());
        let err = RotationConfig::new(1024, MIN_AGE_DAYS - 1)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rotation_config_zero_size() {
        assert!(RotationConfig::new(0, 30).validate().is_err());
    }

    #[test]
    fn test_rotation_config_max_age() {
        let config = RotationConfig::new(1024, 7);
        assert_eq!(config.max_age().as_secs(), 7 * 86_400);
    }

    #[test]
    fn test_rotation_config_deserialize_yaml() {
        let yaml = r#"
max_size: "2M"
max_age_days: 14
compress: true
"#;
        let config: RotationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config,
            RotationConfig::new(2 * 1024 * 1024, 14).with_compression(true)
        );

        let yaml = "max_size_bytes: 4096";
        let config: RotationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_size_bytes, 4096);
        assert_eq!(config.max_age_days, DEFAULT_MAX_AGE_DAYS);
    }

    #[test]
    fn test_rotation_config_deserialize_bad_size() {
        let yaml = r#"max_size: "12Q""#;
        assert!(serde_yaml::from_str::<RotationConfig>(yaml).is_err());
    }

    #[test]
    fn test_logger_config_deserialize_toml() {
        let text = r#"
directory = "/var/log/app"
prefix = "app"

[rotation]
max_size = "512k"
max_age_days = 7
compress_on_rotate = true
"#;
        let config: LoggerConfig = toml::from_str(text).unwrap();
        assert_eq!(config.directory, PathBuf::from("/var/log/app"));
        assert_eq!(config.prefix, "app");
        assert_eq!(config.rotation.max_size_bytes, 512 * 1024);
        assert!(config.rotation.compress_on_rotate);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logger_config_validate_prefix() {
        assert!(LoggerConfig::new("logs", "").validate().is_err());
        assert!(LoggerConfig::new("logs", "a/b").validate().is_err());
        assert!(LoggerConfig::new("logs", "app").validate().is_ok());
    }

    #[test]
    fn test_logger_config_validate_queue() {
        let config = LoggerConfig::new("logs", "app").with_queue_capacity(0);
        assert!(config.validate().is_err());
    }
}

use std::path::Path;
use std::time::Duration;

use config_file::FromConfigFile;
use serde::Deserialize;
use thiserror::Error;

/// What to do with a reply whose payload is not valid UTF-8.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvalidUtf8 {
    /// Log the reply lossily and keep exchanging.
    #[default]
    Skip,
    /// End the run with a decode failure.
    Abort,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub message: String,
    pub interval_ms: u64,
    pub reply_timeout_ms: Option<u64>,
    pub max_frame_length: Option<u32>,
    pub on_invalid_utf8: InvalidUtf8,
    pub log_dir: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".into(),
            port: 6789,
            message: "Hello, TCP server!".into(),
            interval_ms: 2000,
            reply_timeout_ms: None,
            max_frame_length: None,
            on_invalid_utf8: InvalidUtf8::Skip,
            log_dir: None,
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot load {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Loads `path`, falling back to the defaults when the file does not
    /// exist. The second value tells whether the file was found.
    pub fn load(path: impl AsRef<Path>) -> Result<(Config, bool), ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok((Config::default(), false));
        }
        let config = Config::from_config_file(path).map_err(|e| ConfigError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok((config, true))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host is empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".into()));
        }
        if self.message.is_empty() {
            return Err(ConfigError::Invalid("message is empty".into()));
        }
        if let Some(max) = self.max_frame_length {
            if self.message.len() > max as usize {
                return Err(ConfigError::Invalid(format!(
                    "message is {} bytes but max_frame_length is {max}",
                    self.message.len()
                )));
            }
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("frame-peer-{}-{name}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_match_sample_client() {
        let config = Config::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6789);
        assert_eq!(config.message, "Hello, TCP server!");
        assert_eq!(config.interval(), Duration::from_secs(2));
        assert_eq!(config.reply_timeout(), None);
        assert_eq!(config.on_invalid_utf8, InvalidUtf8::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let (config, found) = Config::load("/nonexistent/frame-peer.toml").unwrap();
        assert!(!found);
        assert_eq!(config.port, 6789);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let path = write_temp(
            "partial",
            r#"
port = 7000
message = "ping"
reply_timeout_ms = 5000
on_invalid_utf8 = "abort"
"#,
        );
        let (config, found) = Config::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(found);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7000);
        assert_eq!(config.message, "ping");
        assert_eq!(config.reply_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.on_invalid_utf8, InvalidUtf8::Abort);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let path = write_temp("unknown", "hots = \"example.org\"\n");
        let result = Config::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(ConfigError::Load { .. })));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            message: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_frame_length: Some(4),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}

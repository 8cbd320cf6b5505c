//! Driver selection and options.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FtsError, Result};

/// Language used when a config names none.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Selects a driver by `engine` name and carries its options.
///
/// ```
/// use fineweb_fts::driver::DriverConfig;
///
/// let config = DriverConfig::new("fts_compact")
///     .with_language("vie_Latn")
///     .with_option("k1", "1.5");
/// assert_eq!(config.option_f32("k1").unwrap(), Some(1.5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub engine: String,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl DriverConfig {
    pub fn new<S: Into<String>>(engine: S) -> Self {
        DriverConfig {
            engine: engine.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| FtsError::invalid_config(format!("driver config: {e}")))
    }

    pub fn with_data_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.data_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Configured language, or [`DEFAULT_LANGUAGE`].
    pub fn language(&self) -> &str {
        self.language
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(|v| v.trim())
    }

    fn parse_option<T: FromStr>(&self, key: &str, expected: &str) -> Result<Option<T>> {
        match self.option_str(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                FtsError::invalid_config(format!(
                    "option '{key}' of {} must be {expected}, got '{raw}'",
                    self.engine
                ))
            }),
        }
    }

    /// Accepts `true/false`, `yes/no`, `on/off` and `1/0`.
    pub fn option_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.option_str(key).map(str::to_ascii_lowercase).as_deref() {
            None => Ok(None),
            Some("true" | "yes" | "on" | "1") => Ok(Some(true)),
            Some("false" | "no" | "off" | "0") => Ok(Some(false)),
            Some(raw) => Err(FtsError::invalid_config(format!(
                "option '{key}' of {} must be a boolean, got '{raw}'",
                self.engine
            ))),
        }
    }

    pub fn option_usize(&self, key: &str) -> Result<Option<usize>> {
        self.parse_option(key, "a non-negative integer")
    }

    pub fn option_f32(&self, key: &str) -> Result<Option<f32>> {
        let value: Option<f32> = self.parse_option(key, "a number")?;
        match value {
            Some(v) if !v.is_finite() => Err(FtsError::invalid_config(format!(
                "option '{key}' of {} must be finite",
                self.engine
            ))),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = DriverConfig::new("fts_speed")
            .with_data_dir("/tmp/data")
            .with_option("workers", "4");
        assert_eq!(config.engine, "fts_speed");
        assert_eq!(config.data_dir.as_deref(), Some(Path::new("/tmp/data")));
        assert_eq!(config.language(), "en");
        assert_eq!(config.option_usize("workers").unwrap(), Some(4));
        assert_eq!(config.option_usize("batch_size").unwrap(), None);
    }

    #[test]
    fn test_from_json() {
        let config = DriverConfig::from_json(
            r#"{"engine": "meilisearch", "language": "fra_Latn", "options": {"host": "http://meili:7700"}}"#,
        )
        .unwrap();
        assert_eq!(config.language(), "fra_Latn");
        assert_eq!(config.option_str("host"), Some("http://meili:7700"));
        assert!(config.data_dir.is_none());

        assert!(matches!(
            DriverConfig::from_json("{\"options\": 3}"),
            Err(FtsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_typed_options() {
        let config = DriverConfig::new("x")
            .with_option("persist", "No")
            .with_option("stem", "maybe")
            .with_option("k1", "1.4")
            .with_option("b", "NaN")
            .with_option("workers", "-1");

        assert_eq!(config.option_bool("persist").unwrap(), Some(false));
        assert!(matches!(config.option_bool("stem"), Err(FtsError::InvalidConfig(_))));
        assert_eq!(config.option_f32("k1").unwrap(), Some(1.4));
        assert!(config.option_f32("b").is_err());
        assert!(config.option_usize("workers").is_err());
    }
}

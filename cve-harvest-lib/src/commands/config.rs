use crate::Result;
use crate::harvest::Facet;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Name of the configuration file looked up in the data directory.
pub const CONFIG_FILE_NAME: &str = "harvest.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Repositories fetched per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Facets fetched for every batch, in order
    #[serde(default = "default_facets")]
    pub facets: Vec<Facet>,

    /// Facet whose output units form the resume ledger
    #[serde(default = "default_ledger_facet")]
    pub ledger_facet: Facet,

    /// Base URL of the GitHub REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Substring a reference URL must contain to be harvested
    #[serde(default = "default_repository_host")]
    pub repository_host: String,

    /// Minimum cooldown once the rate limit is nearly exhausted
    #[serde(default = "default_wait", with = "humantime_serde")]
    pub default_wait: Duration,

    /// Longest single sleep while waiting for the rate limit to reset
    #[serde(default = "default_max_wait_step", with = "humantime_serde")]
    pub max_wait_step: Duration,

    /// Timeout for each HTTP request
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Output unit names tried before dead-lettering a batch
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,

    /// Requests allowed per rate limit window
    #[serde(default = "default_request_ceiling")]
    pub request_ceiling: usize,

    /// Directory for batches that could not be written, relative to the data directory
    #[serde(default = "default_dead_letter_dir")]
    pub dead_letter_dir: Utf8PathBuf,
}

const fn default_batch_size() -> usize {
    25
}

fn default_facets() -> Vec<Facet> {
    vec![Facet::Languages, Facet::Contributors]
}

const fn default_ledger_facet() -> Facet {
    Facet::Contributors
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_repository_host() -> String {
    "github.com".to_string()
}

const fn default_wait() -> Duration {
    Duration::from_secs(3)
}

const fn default_max_wait_step() -> Duration {
    Duration::from_secs(60)
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_max_write_attempts() -> u32 {
    3
}

const fn default_request_ceiling() -> usize {
    5000
}

fn default_dead_letter_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("dead_letter")
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit path, `harvest.toml` in the data directory is used if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation
    pub fn load(data_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading cve-harvest configuration file '{path}'"))?;
            (path.clone(), text)
        } else {
            let path = data_dir.join(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Ok(Self::default());
                }
                Err(e) => return Err(e).into_app_err_with(|| format!("reading cve-harvest configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Absolute location of the dead-letter directory for a data directory.
    #[must_use]
    pub fn dead_letter_path(&self, data_dir: &Utf8Path) -> Utf8PathBuf {
        data_dir.join(&self.dead_letter_dir)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range or the batch could exceed the rate limit window
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(app_err!("batch_size must be greater than 0"));
        }

        if self.facets.is_empty() {
            return Err(app_err!("facets must list at least one facet"));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = self.facets.iter().find(|facet| !seen.insert(**facet)) {
            return Err(app_err!("facet '{duplicate}' is listed more than once"));
        }

        if !self.facets.contains(&self.ledger_facet) {
            return Err(app_err!("ledger_facet '{}' must be one of the configured facets", self.ledger_facet));
        }

        if self.max_wait_step.is_zero() {
            return Err(app_err!("max_wait_step must be greater than zero"));
        }

        if self.max_write_attempts == 0 {
            return Err(app_err!("max_write_attempts must be at least 1"));
        }

        let requests_per_batch = self.batch_size.saturating_mul(self.facets.len());
        if requests_per_batch >= self.request_ceiling {
            return Err(app_err!(
                "batch_size ({}) times the number of facets ({}) must stay below request_ceiling ({})",
                self.batch_size,
                self.facets.len(),
                self.request_ceiling
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.facets, vec![Facet::Languages, Facet::Contributors]);
        assert_eq!(config.ledger_facet, Facet::Contributors);
        assert_eq!(config.default_wait, Duration::from_secs(3));
        assert_eq!(config.max_wait_step, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_file_matches_embedded_defaults() {
        let empty: Config = toml::from_str("").unwrap();
        let defaults = Config::default();
        assert_eq!(empty.batch_size, defaults.batch_size);
        assert_eq!(empty.facets, defaults.facets);
        assert_eq!(empty.api_base_url, defaults.api_base_url);
        assert_eq!(empty.request_timeout, defaults.request_timeout);
        assert_eq!(empty.dead_letter_dir, defaults.dead_letter_dir);
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let config = Config { batch_size: 0, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_no_facets() {
        let config = Config { facets: Vec::new(), ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_facets() {
        let config = Config {
            facets: vec![Facet::Languages, Facet::Contributors, Facet::Languages],
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("languages"));
    }

    #[test]
    fn test_validate_ledger_facet_must_be_fetched() {
        let config = Config {
            facets: vec![Facet::Languages],
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            facets: vec![Facet::Languages],
            ledger_facet: Facet::Languages,
            ..Config::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_zero_wait_step() {
        let config = Config { max_wait_step: Duration::ZERO, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_write_attempts() {
        let config = Config { max_write_attempts: 0, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_batch_must_fit_request_ceiling() {
        let config = Config { batch_size: 2500, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { batch_size: 2499, ..Config::default() };
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_humantime_and_unknown_fields() {
        let config: Config = toml::from_str("batch_size = 10\ndefault_wait = \"1m 30s\"\n").unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.default_wait, Duration::from_secs(90));

        let _ = toml::from_str::<Config>("batch_sise = 10\n").unwrap_err();
        let _ = toml::from_str::<Config>("facets = [\"stargazers\"]\n").unwrap_err();
    }

    #[test]
    fn test_dead_letter_path_is_relative_to_data_dir() {
        let config = Config::default();
        assert_eq!(config.dead_letter_path(Utf8Path::new("data")), Utf8PathBuf::from("data/dead_letter"));
    }

    #[test]
    fn test_config_serializes_back_to_toml() {
        let config = Config {
            dead_letter_dir: Utf8PathBuf::from("rejects"),
            ..Config::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("dead_letter_dir = \"rejects\""));

        let reloaded: Config = toml::from_str(&text).unwrap();
        assert_eq!(reloaded.dead_letter_dir, config.dead_letter_dir);
        assert_eq!(reloaded.default_wait, config.default_wait);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_save_default_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        let output_path = data_dir.join(CONFIG_FILE_NAME);
        Config::save_default(&output_path).unwrap();

        let loaded = Config::load(&data_dir, None).unwrap();
        assert_eq!(loaded.batch_size, 25);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_load_missing_config_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        let config = Config::load(&data_dir, None).unwrap();
        config.validate().unwrap();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_load_missing_explicit_config_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        let _ = Config::load(&data_dir, Some(&data_dir.join("absent.toml"))).unwrap_err();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_load_rejects_invalid_values() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        fs::write(data_dir.join(CONFIG_FILE_NAME), "batch_size = 0\n").unwrap();

        let err = Config::load(&data_dir, None).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }
}

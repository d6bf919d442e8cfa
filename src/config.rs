//! Configuration loader and validator for the sync service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub hubspot: HubSpot,
    pub google: Google,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub listen_addr: String,
    /// Upper bound on any single HubSpot or Sheets call.
    pub call_timeout_secs: u64,
    /// Pages pushed to HubSpot in parallel during sync and revert.
    pub max_concurrency: usize,
}

/// HubSpot CMS API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubSpot {
    pub base_url: String,
    pub page_limit: u32,
}

/// Google Sheets API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Google {
    pub sheets_base_url: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/smuves.db", self.app.data_dir))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.app.call_timeout_secs)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.listen_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid("app.listen_addr must be a socket address"));
    }
    if cfg.app.call_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app.call_timeout_secs must be > 0"));
    }
    if cfg.app.max_concurrency == 0 {
        return Err(ConfigError::Invalid("app.max_concurrency must be > 0"));
    }

    if reqwest::Url::parse(&cfg.hubspot.base_url).is_err() {
        return Err(ConfigError::Invalid("hubspot.base_url must be a valid URL"));
    }
    if cfg.hubspot.page_limit == 0 || cfg.hubspot.page_limit > 100 {
        return Err(ConfigError::Invalid("hubspot.page_limit must be within 1..=100"));
    }

    if reqwest::Url::parse(&cfg.google.sheets_base_url).is_err() {
        return Err(ConfigError::Invalid("google.sheets_base_url must be a valid URL"));
    }

    Ok(())
}

/// Example configuration, also used as the test fixture.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  listen_addr: "127.0.0.1:8080"
  call_timeout_secs: 30
  max_concurrency: 4

hubspot:
  base_url: "https://api.hubapi.com/"
  page_limit: 100

google:
  sheets_base_url: "https://sheets.googleapis.com/"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn invalid_listen_addr() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.listen_addr = "localhost".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("listen_addr")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_limits() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.call_timeout_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.max_concurrency = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.hubspot.page_limit = 500;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("page_limit")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_base_urls() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.hubspot.base_url = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.google.sheets_base_url = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.max_concurrency, 4);
        assert_eq!(cfg.hubspot.page_limit, 100);
    }
}

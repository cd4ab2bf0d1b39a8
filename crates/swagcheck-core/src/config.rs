//! Project configuration for conformance runs
//!
//! Every field is optional: a config file only supplies defaults, and any
//! command-line flag overrides it (see [`Config::overlay`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::auth::Credentials;

/// Project configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Schema location (local path or http(s) URL)
    #[serde(default)]
    pub schema: Option<String>,

    /// Server to test; defaults to the one the schema declares
    #[serde(default)]
    pub base_url: Option<String>,

    /// Trials per operation
    #[serde(default)]
    pub trials: Option<u32>,

    /// Keep testing after a conformance failure
    #[serde(default)]
    pub continue_on_error: Option<bool>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// apiKey token
    #[serde(default)]
    pub token: Option<String>,

    /// apiKey security scheme to use instead of the schema default
    #[serde(default)]
    pub security_name: Option<String>,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Fixed sampling seed
    #[serde(default)]
    pub seed: Option<u64>,

    /// Persisted run log path
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Retries for transient connection errors
    #[serde(default)]
    pub retries: Option<u32>,
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from the first default location found in `dir`
    ///
    /// # Errors
    ///
    /// Returns error if a candidate exists but cannot be read or parsed
    pub fn load_default(dir: &Path) -> Result<Self, ConfigError> {
        let candidates = [".swagcheck.toml", ".swagcheck.json", "swagcheck.toml"];

        for name in candidates {
            let path = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        // No config file
        Ok(Self::default())
    }

    /// Layer `over` on top of `self`: every value `over` sets wins.
    /// Headers merge, with `over` replacing same-named entries.
    #[must_use]
    pub fn overlay(self, over: Self) -> Self {
        let mut headers = self.headers;
        headers.extend(over.headers);
        Self {
            schema: over.schema.or(self.schema),
            base_url: over.base_url.or(self.base_url),
            trials: over.trials.or(self.trials),
            continue_on_error: over.continue_on_error.or(self.continue_on_error),
            username: over.username.or(self.username),
            password: over.password.or(self.password),
            token: over.token.or(self.token),
            security_name: over.security_name.or(self.security_name),
            headers,
            seed: over.seed.or(self.seed),
            log_file: over.log_file.or(self.log_file),
            timeout_secs: over.timeout_secs.or(self.timeout_secs),
            retries: over.retries.or(self.retries),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            token: self.token.clone(),
            security_name: self.security_name.clone(),
        }
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# swagcheck configuration
# Every value here can be overridden on the command line.

# Schema location (local path or URL)
schema = "swagger.json"

# Server to test (default: derived from the schema)
# base_url = "http://localhost:8080"

# Trials per operation (default: 20)
# trials = 20

# Keep testing after a conformance failure (default: stop at the first)
# continue_on_error = true

# Basic auth (used when both are set)
# username = "user"
# password = "secret"

# apiKey auth
# token = "your-api-key"
# security_name = "api_key"

# Reproduce an earlier run
# seed = 1234

# Persist the run log
# log_file = "log.txt"

# timeout_secs = 30
# retries = 2

# Extra headers sent with every request
[headers]
# X-Request-Source = "swagcheck"
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_empty() {
        let config = Config::default();
        assert_eq!(config.schema, None);
        assert_eq!(config.trials, None);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn parse_toml() {
        let toml = r#"
schema = "http://localhost:8080/swagger.json"
trials = 50
continue_on_error = true
token = "abc"
seed = 7

[headers]
X-Tenant = "acme"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.schema.as_deref(),
            Some("http://localhost:8080/swagger.json")
        );
        assert_eq!(config.trials, Some(50));
        assert_eq!(config.continue_on_error, Some(true));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.headers.get("X-Tenant"), Some(&"acme".to_string()));
        assert_eq!(config.credentials().token.as_deref(), Some("abc"));
    }

    #[test]
    fn example_parses() {
        let config: Config = toml::from_str(Config::example()).unwrap();
        assert_eq!(config.schema.as_deref(), Some("swagger.json"));
    }

    #[test]
    fn overlay_prefers_cli_values() {
        let file = Config {
            schema: Some("file.json".into()),
            trials: Some(5),
            token: Some("from-file".into()),
            headers: BTreeMap::from([
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "1".to_string()),
            ]),
            ..Config::default()
        };
        let cli = Config {
            trials: Some(9),
            headers: BTreeMap::from([("B".to_string(), "2".to_string())]),
            ..Config::default()
        };
        let merged = file.overlay(cli);
        assert_eq!(merged.schema.as_deref(), Some("file.json"));
        assert_eq!(merged.trials, Some(9));
        assert_eq!(merged.token.as_deref(), Some("from-file"));
        assert_eq!(merged.headers["A"], "1");
        assert_eq!(merged.headers["B"], "2");
    }

    #[test]
    fn load_default_finds_dotfile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".swagcheck.toml"), "trials = 3\n").unwrap();
        let config = Config::load_default(dir.path()).unwrap();
        assert_eq!(config.trials, Some(3));
    }

    #[test]
    fn load_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_default(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn load_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swagcheck.json");
        std::fs::write(&path, r#"{"retries": 0, "timeout_secs": 5}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.retries, Some(0));
        assert_eq!(config.timeout_secs, Some(5));
    }

    #[test]
    fn load_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "trials = \"many\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(..))
        ));
    }
}

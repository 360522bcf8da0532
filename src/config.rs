//! Configuration loader and validator for the marketing backend.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
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
    pub google: Google,
    pub openai: OpenAi,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub bind_addr: String,
    pub upload_daily_limit: u32,
}

/// Google Cloud settings shared by the Firestore, Storage and Vision clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Google {
    pub credentials_path: String,
    /// Optional; resolved from the service account credentials when empty.
    #[serde(default)]
    pub project_id: String,
    pub bucket: String,
}

/// OpenAI chat-completions settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenAi {
    pub api_key: String,
    pub model: String,
}

impl Config {
    /// Apply environment overrides for secrets. `OPENAI_API_KEY`, when set and
    /// non-empty, replaces the key from the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.openai.api_key = key;
            }
        }
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
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }
    if cfg.app.upload_daily_limit == 0 {
        return Err(ConfigError::Invalid("app.upload_daily_limit must be > 0"));
    }

    if cfg.google.credentials_path.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "google.credentials_path must be non-empty",
        ));
    }
    if cfg.google.bucket.trim().is_empty() {
        return Err(ConfigError::Invalid("google.bucket must be non-empty"));
    }

    if cfg.openai.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("openai.api_key must be non-empty"));
    }
    if cfg.openai.model.trim().is_empty() {
        return Err(ConfigError::Invalid("openai.model must be non-empty"));
    }

    Ok(())
}

/// Returns an example YAML configuration document.
pub fn example() -> &'static str {
    r#"app:
  bind_addr: "0.0.0.0:3000"
  upload_daily_limit: 5

google:
  credentials_path: "./service-account.json"
  project_id: ""
  bucket: "YOUR_BUCKET_NAME"

openai:
  api_key: "YOUR_OPENAI_API_KEY"
  model: "gpt-4o"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_bind_addr() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.bind_addr = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("bind_addr")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_upload_limit() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.upload_daily_limit = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("upload_daily_limit")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_google_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.google.credentials_path = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("credentials_path")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.google.bucket = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_openai_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.openai.api_key = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.openai.model = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn project_id_defaults_to_empty() {
        let yaml = r#"app:
  bind_addr: "127.0.0.1:3000"
  upload_daily_limit: 5
google:
  credentials_path: "./sa.json"
  bucket: "bucket"
openai:
  api_key: "key"
  model: "gpt-4o"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.google.project_id, "");
        validate(&cfg).unwrap();
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.upload_daily_limit, 5);
        assert_eq!(cfg.openai.model, "gpt-4o");
    }
}

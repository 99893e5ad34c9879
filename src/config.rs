use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::ChatId;

/// Environment variable that overrides `telegram_bot_token`.
pub const TOKEN_ENV: &str = "TELEGRAM_TOKEN";
/// Environment variable holding the service-account JSON for the sheet backend.
pub const CREDENTIALS_ENV: &str = "GOOGLE_CREDENTIALS";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read a file (config or credentials).
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    /// Directory for the question file, logs and the trigger image. Defaults to current directory.
    data_dir: Option<String>,
    /// Chat that receives warnings and errors.
    log_chat_id: Option<i64>,
    /// IANA time zone for question timestamps.
    timezone: Option<String>,
    /// Image sent for the special trigger phrase (URL or path).
    trigger_image: Option<String>,
    #[serde(default)]
    storage: StorageFile,
}

#[derive(Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
enum StorageFile {
    File {
        #[serde(default = "default_questions_path")]
        path: String,
        #[serde(default)]
        git_replicate: bool,
    },
    Sheet {
        #[serde(default)]
        spreadsheet_id: String,
        #[serde(default = "default_sheet_name")]
        sheet_name: String,
        credentials_path: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl Default for StorageFile {
    fn default() -> Self {
        StorageFile::File {
            path: default_questions_path(),
            git_replicate: false,
        }
    }
}

fn default_questions_path() -> String {
    "questions.txt".to_string()
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

const DEFAULT_TIMEZONE: &str = "Europe/Tallinn";
const DEFAULT_TRIGGER_IMAGE: &str = "dokole.jpg";

/// Where questions go.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    File {
        path: PathBuf,
        git_replicate: bool,
    },
    Sheet {
        spreadsheet_id: String,
        sheet_name: String,
        /// Service-account JSON blob.
        credentials: String,
        timeout: Duration,
    },
}

pub struct Config {
    /// Path the config was loaded from, if any.
    pub config_path: Option<PathBuf>,
    pub telegram_bot_token: String,
    pub data_dir: PathBuf,
    pub log_chat_id: Option<ChatId>,
    pub timezone: Tz,
    /// http(s) URL or absolute/data_dir-relative path.
    pub trigger_image: String,
    pub storage: StorageConfig,
}

impl Config {
    /// Load from a JSON file, with environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, &|key: &str| std::env::var(key).ok())
    }

    /// Build from the environment alone (no config file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(ConfigFile::default(), None, &|key: &str| std::env::var(key).ok())
    }

    pub fn load_with_env<P: AsRef<Path>>(
        path: P,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;
        Self::resolve(file, Some(config_path), env)
    }

    fn resolve(
        file: ConfigFile,
        config_path: Option<PathBuf>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let telegram_bot_token = env(TOKEN_ENV)
            .filter(|t| !t.is_empty())
            .unwrap_or(file.telegram_bot_token);
        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation(format!(
                "telegram_bot_token is required (or set {TOKEN_ENV})"
            )));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let timezone_name = file.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|_| ConfigError::Validation(format!("unknown timezone '{timezone_name}'")))?;

        let trigger_image = file
            .trigger_image
            .unwrap_or_else(|| DEFAULT_TRIGGER_IMAGE.to_string());
        let trigger_image = if is_url(&trigger_image) {
            trigger_image
        } else {
            data_dir.join(trigger_image).to_string_lossy().into_owned()
        };

        let storage = match file.storage {
            StorageFile::File { path, git_replicate } => StorageConfig::File {
                path: data_dir.join(path),
                git_replicate,
            },
            StorageFile::Sheet { spreadsheet_id, sheet_name, credentials_path, timeout_secs } => {
                if spreadsheet_id.is_empty() {
                    return Err(ConfigError::Validation(
                        "storage.spreadsheet_id is required for the sheet backend".into(),
                    ));
                }
                let credentials = match (env(CREDENTIALS_ENV).filter(|c| !c.is_empty()), credentials_path) {
                    (Some(blob), _) => blob,
                    (None, Some(path)) => {
                        let path = data_dir.join(path);
                        std::fs::read_to_string(&path)
                            .map_err(|e| ConfigError::ReadFile { path, source: e })?
                    }
                    (None, None) => {
                        return Err(ConfigError::Validation(format!(
                            "sheet backend needs storage.credentials_path or {CREDENTIALS_ENV}"
                        )));
                    }
                };
                StorageConfig::Sheet {
                    spreadsheet_id,
                    sheet_name,
                    credentials,
                    timeout: Duration::from_secs(timeout_secs.max(1)),
                }
            }
        };

        Ok(Self {
            config_path,
            telegram_bot_token,
            data_dir,
            log_chat_id: file.log_chat_id.map(ChatId),
            timezone,
            trigger_image,
            storage,
        })
    }
}

pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn load(file: &NamedTempFile) -> Result<Config, ConfigError> {
        Config::load_with_env(file.path(), &no_env)
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config(r#"{ "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz" }"#);
        let config = load(&file).expect("should load valid config");
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert_eq!(config.timezone, chrono_tz::Europe::Tallinn);
        assert_eq!(config.trigger_image, PathBuf::from(".").join("dokole.jpg").to_string_lossy());
        assert_eq!(
            config.storage,
            StorageConfig::File { path: PathBuf::from(".").join("questions.txt"), git_replicate: false }
        );
        assert!(config.log_chat_id.is_none());
        assert_eq!(config.config_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_env_token_overrides_file() {
        let file = write_config(r#"{ "telegram_bot_token": "" }"#);
        let env = |key: &str| (key == TOKEN_ENV).then(|| "42:secret".to_string());
        let config = Config::load_with_env(file.path(), &env).unwrap();
        assert_eq!(config.telegram_bot_token, "42:secret");
    }

    #[test]
    fn test_empty_token() {
        let file = write_config(r#"{ "telegram_bot_token": "" }"#);
        let err = assert_err(load(&file));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("telegram_bot_token"));
    }

    #[test]
    fn test_invalid_token_format() {
        for token in ["invalid_token_no_colon", "notanumber:ABCdef", "123456789:"] {
            let file = write_config(&format!(r#"{{ "telegram_bot_token": "{token}" }}"#));
            let err = assert_err(load(&file));
            assert!(matches!(err, ConfigError::Validation(_)), "{token}");
        }
    }

    #[test]
    fn test_file_storage_relative_to_data_dir() {
        let file = write_config(r#"{
            "telegram_bot_token": "1:x",
            "data_dir": "/srv/intake",
            "trigger_image": "https://example.org/dokole.jpg",
            "storage": { "backend": "file", "path": "q.txt", "git_replicate": true }
        }"#);
        let config = load(&file).unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::File { path: PathBuf::from("/srv/intake/q.txt"), git_replicate: true }
        );
        assert_eq!(config.trigger_image, "https://example.org/dokole.jpg");
    }

    #[test]
    fn test_sheet_storage_from_env_credentials() {
        let file = write_config(r#"{
            "telegram_bot_token": "1:x",
            "storage": { "backend": "sheet", "spreadsheet_id": "abc" }
        }"#);
        let env = |key: &str| (key == CREDENTIALS_ENV).then(|| "{\"client_email\":\"a\"}".to_string());
        let config = Config::load_with_env(file.path(), &env).unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Sheet {
                spreadsheet_id: "abc".to_string(),
                sheet_name: "Sheet1".to_string(),
                credentials: "{\"client_email\":\"a\"}".to_string(),
                timeout: Duration::from_secs(15),
            }
        );
    }

    #[test]
    fn test_sheet_storage_from_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("creds.json"), "{}").unwrap();
        let file = write_config(&format!(
            r#"{{
                "telegram_bot_token": "1:x",
                "data_dir": {:?},
                "storage": {{ "backend": "sheet", "spreadsheet_id": "abc", "sheet_name": "Küsimused", "credentials_path": "creds.json", "timeout_secs": 5 }}
            }}"#,
            dir.path().to_string_lossy()
        ));
        let config = load(&file).unwrap();
        match config.storage {
            StorageConfig::Sheet { sheet_name, credentials, timeout, .. } => {
                assert_eq!(sheet_name, "Küsimused");
                assert_eq!(credentials, "{}");
                assert_eq!(timeout, Duration::from_secs(5));
            }
            other => panic!("expected sheet storage, got {other:?}"),
        }
    }

    #[test]
    fn test_sheet_storage_without_credentials() {
        let file = write_config(r#"{
            "telegram_bot_token": "1:x",
            "storage": { "backend": "sheet", "spreadsheet_id": "abc" }
        }"#);
        let err = assert_err(load(&file));
        assert!(err.to_string().contains(CREDENTIALS_ENV));
    }

    #[test]
    fn test_sheet_storage_without_id() {
        let file = write_config(r#"{
            "telegram_bot_token": "1:x",
            "storage": { "backend": "sheet" }
        }"#);
        let err = assert_err(load(&file));
        assert!(err.to_string().contains("spreadsheet_id"));
    }

    #[test]
    fn test_unknown_timezone() {
        let file = write_config(r#"{ "telegram_bot_token": "1:x", "timezone": "Mars/Olympus" }"#);
        let err = assert_err(load(&file));
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_unknown_backend() {
        let file = write_config(r#"{ "telegram_bot_token": "1:x", "storage": { "backend": "ftp" } }"#);
        let err = assert_err(load(&file));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load_with_env("/nonexistent/path/config.json", &no_env));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(load(&file));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}

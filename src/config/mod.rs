//! Application settings
//!
//! Settings are resolved once at process entry: defaults, then the
//! environment's TOML file (`config/<environment>.toml`), then `VA_*`
//! environment variables. The resolved [`Settings`] value is handed to the
//! orchestrator by `Arc`; nothing reads configuration from a global.

use crate::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Prefix for environment variable overrides, e.g. `VA_API_PORT`
pub const ENV_PREFIX: &str = "VA_";

/// Deployment environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Detect the environment from `VA_ENVIRONMENT` or `ENVIRONMENT`
    pub fn detect() -> Self {
        std::env::var("VA_ENVIRONMENT")
            .or_else(|_| std::env::var("ENVIRONMENT"))
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(AssistantError::Config(format!(
                "unknown environment '{}'",
                other
            ))),
        }
    }
}

/// Resolved application settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: Environment,
    pub debug: bool,

    pub app_name: String,
    pub app_version: String,

    /// Utterances must start with this phrase; empty accepts everything
    pub wake_word: String,
    pub voice_language: String,
    pub voice_recognition_timeout_secs: u64,

    pub api_host: String,
    pub api_port: u16,

    pub log_level: String,
    pub log_file: PathBuf,

    /// Deadline for each subsystem call; `0` disables it
    pub subsystem_timeout_secs: u64,

    pub user_data_path: PathBuf,
    pub temp_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            debug: false,
            app_name: "Virtual Assistant".to_string(),
            app_version: "1.0.0".to_string(),
            wake_word: "hey assistant".to_string(),
            voice_language: "en-US".to_string(),
            voice_recognition_timeout_secs: 5,
            api_host: "localhost".to_string(),
            api_port: 8000,
            log_level: "INFO".to_string(),
            log_file: PathBuf::from("logs/virtual_assistant.log"),
            subsystem_timeout_secs: 30,
            user_data_path: PathBuf::from("data/users"),
            temp_path: PathBuf::from("temp"),
        }
    }
}

const LOG_LEVELS: &[&str] = &["TRACE", "DEBUG", "INFO", "WARN", "WARNING", "ERROR", "CRITICAL"];

impl Settings {
    /// Switch to debug mode with verbose logging
    pub fn enable_debug(&mut self) {
        self.debug = true;
        self.log_level = "DEBUG".to_string();
    }

    /// Per-call subsystem deadline, if any
    pub fn subsystem_timeout(&self) -> Option<Duration> {
        (self.subsystem_timeout_secs > 0).then(|| Duration::from_secs(self.subsystem_timeout_secs))
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.api_host.trim().is_empty() {
            return Err(AssistantError::Config("api_host must not be empty".to_string()));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_uppercase().as_str()) {
            return Err(AssistantError::Config(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }

        if self.log_file.as_os_str().is_empty() {
            return Err(AssistantError::Config("log_file must not be empty".to_string()));
        }

        Ok(())
    }

    /// Look up a setting by field name
    pub fn get(&self, key: &str) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove(key),
            _ => None,
        }
    }

    /// Replace a setting by field name
    ///
    /// The new value must deserialize into the field's type.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut map = match serde_json::to_value(&*self) {
            Ok(Value::Object(map)) => map,
            _ => return Err(AssistantError::Config("settings are not a map".to_string())),
        };

        if !map.contains_key(key) {
            return Err(AssistantError::Config(format!("unknown setting '{}'", key)));
        }
        map.insert(key.to_string(), value);

        *self = serde_json::from_value(Value::Object(map))
            .map_err(|e| AssistantError::Config(format!("invalid value for '{}': {}", key, e)))?;
        Ok(())
    }

    /// Apply `VA_*` overrides from the given variables
    ///
    /// Raw strings are coerced to the type of the current value, so
    /// `VA_API_PORT=9000` becomes a number and `VA_DEBUG=true` a bool.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, raw) in vars {
            let Some(key) = name.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = key.to_lowercase();
            let Some(current) = self.get(&key) else {
                continue;
            };

            let raw = raw.as_ref();
            if key == "environment" {
                let environment: Environment = raw.parse()?;
                self.environment = environment;
                debug!(setting = %key, "Applied environment override");
                continue;
            }
            let value = coerce(&current, raw).ok_or_else(|| {
                AssistantError::Config(format!(
                    "cannot use '{}' for {}{}",
                    raw,
                    ENV_PREFIX,
                    key.to_uppercase()
                ))
            })?;
            debug!(setting = %key, "Applied environment override");
            self.set(&key, value)?;
        }
        Ok(())
    }
}

/// Keep only the environment variables whose name and value are valid UTF-8
fn utf8_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter().filter_map(|(name, value)| {
        match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (Ok(name), Err(_)) => {
                debug!(variable = %name, "Skipping non UTF-8 environment variable");
                None
            }
            _ => None,
        }
    })
}

fn coerce(current: &Value, raw: &str) -> Option<Value> {
    match current {
        Value::Bool(_) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(Value::Bool(true)),
            "0" | "false" | "no" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Number(_) => raw.trim().parse::<u64>().ok().map(Value::from),
        _ => Some(Value::String(raw.to_string())),
    }
}

/// Loads, queries and persists [`Settings`]
#[derive(Debug)]
pub struct ConfigManager {
    settings: Settings,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Default file for an environment
    pub fn default_config_path(environment: Environment) -> PathBuf {
        PathBuf::from("config").join(format!("{}.toml", environment))
    }

    /// Load settings for the detected environment
    ///
    /// An explicit `config_path` must exist; the default path may be absent,
    /// in which case defaults are used.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let environment = Environment::detect();
        let explicit = config_path.is_some();
        let path = config_path.unwrap_or_else(|| Self::default_config_path(environment));

        if explicit && !path.exists() {
            return Err(AssistantError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        Self::load_from_path(path, environment, utf8_vars(std::env::vars_os()))
    }

    /// Load from a specific file with explicit environment variables
    ///
    /// Useful for testing without touching the process environment.
    pub fn load_from_path<I, K, V>(
        path: impl Into<PathBuf>,
        environment: Environment,
        vars: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let config_path = path.into();

        let mut settings = if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let parse_error = |e: toml::de::Error| {
                AssistantError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            };
            let mut table = toml::from_str::<toml::Table>(&content).map_err(parse_error)?;
            table
                .entry("environment")
                .or_insert_with(|| toml::Value::String(environment.as_str().to_string()));
            toml::Value::Table(table)
                .try_into::<Settings>()
                .map_err(parse_error)?
        } else {
            debug!(path = %config_path.display(), "No configuration file, using defaults");
            Settings {
                environment,
                ..Settings::default()
            }
        };

        settings.apply_env_overrides(vars)?;
        settings.validate()?;
        debug!(path = %config_path.display(), "Configuration resolved");

        Ok(Self {
            settings,
            config_path,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Report the resolved configuration; call once logging is installed
    pub fn log_summary(&self) {
        info!(
            environment = %self.settings.environment,
            path = %self.config_path.display(),
            debug = self.settings.debug,
            "Configuration loaded"
        );
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_setting(&self, key: &str) -> Option<Value> {
        self.settings.get(key)
    }

    pub fn update_setting(&mut self, key: &str, value: Value) -> Result<()> {
        self.settings.set(key, value)
    }

    /// Write the current settings back to the configuration file
    pub fn save_settings(&self) -> Result<()> {
        write_settings(&self.config_path, &self.settings)
    }
}

/// Serialize settings as TOML, creating parent directories
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(settings)
        .map_err(|e| AssistantError::Config(format!("failed to serialize settings: {}", e)))?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_VARS: [(&str, &str); 0] = [];

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.api_port, 8000);
        assert_eq!(settings.log_level, "INFO");
        assert_eq!(settings.subsystem_timeout(), Some(Duration::from_secs(30)));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_enable_debug() {
        let mut settings = Settings::default();
        settings.enable_debug();
        assert!(settings.debug);
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ConfigManager::load_from_path(dir.path().join("absent.toml"), Environment::Test, NO_VARS)
                .unwrap();
        assert_eq!(manager.settings().environment, Environment::Test);
        assert_eq!(manager.settings().api_host, "localhost");
    }

    #[test]
    fn test_file_then_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("production.toml");
        fs::write(
            &path,
            "environment = \"production\"\napi_host = \"0.0.0.0\"\napi_port = 8100\n",
        )
        .unwrap();

        let vars = [("VA_API_PORT", "9000"), ("VA_DEBUG", "yes"), ("PATH", "/usr/bin")];
        let manager = ConfigManager::load_from_path(&path, Environment::Development, vars).unwrap();
        let settings = manager.settings();

        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.api_host, "0.0.0.0");
        assert_eq!(settings.api_port, 9000);
        assert!(settings.debug);
        // Untouched fields keep their defaults
        assert_eq!(settings.wake_word, "hey assistant");
    }

    #[test]
    fn test_bad_env_override_is_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env_overrides([("VA_API_PORT", "eighty")])
            .unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));

        let err = settings
            .apply_env_overrides([("VA_API_PORT", "70000")])
            .unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "api_port = \"not a number\"").unwrap();

        let err = ConfigManager::load_from_path(&path, Environment::Test, NO_VARS).unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.log_level = "verbose".to_string();
        assert!(settings.validate().is_err());

        settings.log_level = "warning".to_string();
        assert!(settings.validate().is_ok());

        settings.api_host = " ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_get_update_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("development.toml");
        let mut manager =
            ConfigManager::load_from_path(&path, Environment::Development, NO_VARS).unwrap();

        assert_eq!(manager.get_setting("api_port"), Some(Value::from(8000)));
        assert_eq!(manager.get_setting("nope"), None);

        manager.update_setting("wake_word", Value::from("computer")).unwrap();
        assert!(manager.update_setting("api_port", Value::from("high")).is_err());
        assert!(manager.update_setting("nope", Value::from(1)).is_err());
        assert_eq!(manager.settings().api_port, 8000);

        manager.save_settings().unwrap();
        let reloaded =
            ConfigManager::load_from_path(&path, Environment::Development, NO_VARS).unwrap();
        assert_eq!(reloaded.settings().wake_word, "computer");
    }

    #[test]
    fn test_environment_override_accepts_short_names() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load_from_path(
            dir.path().join("absent.toml"),
            "prod".parse().unwrap(),
            [("VA_ENVIRONMENT", "prod")],
        )
        .unwrap();
        assert_eq!(manager.settings().environment, Environment::Production);

        let mut settings = Settings::default();
        settings.apply_env_overrides([("VA_ENVIRONMENT", " Dev ")]).unwrap();
        assert_eq!(settings.environment, Environment::Development);
        assert!(settings.apply_env_overrides([("VA_ENVIRONMENT", "staging")]).is_err());
    }

    #[test]
    fn test_file_without_environment_uses_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("production.toml");
        fs::write(&path, "api_port = 8100\n").unwrap();

        let manager = ConfigManager::load_from_path(&path, Environment::Production, NO_VARS).unwrap();
        assert_eq!(manager.settings().environment, Environment::Production);
        assert_eq!(manager.settings().api_port, 8100);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("VA_API_PORT"), OsString::from("9000")),
            (OsString::from("VA_WAKE_WORD"), OsString::from_vec(vec![0x68, 0xff, 0x69])),
            (OsString::from_vec(vec![0xfe, 0x41]), OsString::from("x")),
        ];
        let kept: Vec<_> = utf8_vars(vars).collect();
        assert_eq!(kept, [("VA_API_PORT".to_string(), "9000".to_string())]);

        let mut settings = Settings::default();
        settings.apply_env_overrides(kept).unwrap();
        assert_eq!(settings.api_port, 9000);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn test_configuration_loaded_is_reported_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let manager = ConfigManager::load_from_path(
                dir.path().join("absent.toml"),
                Environment::Test,
                NO_VARS,
            )
            .unwrap();
            assert!(!out.text().contains("Configuration loaded"));

            manager.log_summary();
        });

        let logged = out.text();
        assert!(logged.contains("Configuration loaded"));
        assert!(logged.contains("environment=test"));
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!(
            ConfigManager::default_config_path(Environment::Test),
            PathBuf::from("config/test.toml")
        );
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::{ClientSettings, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::error::DataMallError;
use crate::secret_store::{SecretReference, SecretStore, SecretStoreError};

const CONFIG_DIR_NAME: &str = "datamall";
const CONFIG_FILE_NAME: &str = "config.toml";
const CURRENT_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_OUTPUT_DIR: &str = "saved_data";
pub const ACCOUNT_KEY_SECRET_LABEL: &str = "account-key";

pub const ENV_ACCOUNT_KEY: &str = "DATAMALL_ACCOUNT_KEY";
pub const ENV_BASE_URL: &str = "DATAMALL_BASE_URL";
pub const ENV_OUTPUT_DIR: &str = "DATAMALL_OUTPUT_DIR";
pub const ENV_TIMEOUT_SECS: &str = "DATAMALL_TIMEOUT_SECS";

/// Result returned by [`load_config`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: FileConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No usable configuration was found; defaults were synthesized.
    Default,
    /// Configuration was read from `config.toml`.
    File,
}

/// Errors that can occur when persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML serialization error: {0}")]
    Ser(#[from] toml::ser::Error),
    #[error("secret storage error: {0}")]
    Secret(#[from] SecretStoreError),
}

/// An account key kept either inline or behind a secret-store reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SecretValue {
    Plain(String),
    Reference(SecretReference),
}

/// Disk-backed configuration schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "FileConfig::schema_version")]
    pub schema_version: u32,
    #[serde(default = "FileConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "FileConfig::default_output_dir")]
    pub output_dir: String,
    #[serde(default = "FileConfig::default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub account_key: Option<SecretValue>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            base_url: Self::default_base_url(),
            output_dir: Self::default_output_dir(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            account_key: None,
        }
    }
}

impl FileConfig {
    const fn schema_version() -> u32 {
        CURRENT_SCHEMA_VERSION
    }

    fn default_base_url() -> String {
        DEFAULT_BASE_URL.to_string()
    }

    fn default_output_dir() -> String {
        DEFAULT_OUTPUT_DIR.to_string()
    }

    const fn default_timeout_secs() -> u64 {
        DEFAULT_TIMEOUT_SECS
    }
}

/// Values taken from `DATAMALL_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub account_key: Option<String>,
    pub base_url: Option<String>,
    pub output_dir: Option<String>,
    pub timeout_secs: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok().filter(|value| !value.trim().is_empty());
        Self {
            account_key: read(ENV_ACCOUNT_KEY),
            base_url: read(ENV_BASE_URL),
            output_dir: read(ENV_OUTPUT_DIR),
            timeout_secs: read(ENV_TIMEOUT_SECS),
        }
    }
}

/// Command-line overrides; these win over the environment and the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOverrides {
    pub base_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub client: ClientSettings,
    pub output_dir: PathBuf,
}

/// Path to the configuration directory.
pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path to `config.toml`.
pub fn config_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Load the configuration from the default location.
pub fn load_config() -> ConfigLoadResult {
    load_config_from(&config_path())
}

/// Load the configuration, falling back to defaults with warnings when the file is unusable.
pub fn load_config_from(path: &Path) -> ConfigLoadResult {
    let mut warnings = Vec::new();

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<FileConfig>(&raw) {
                Ok(cfg) => {
                    let (cfg, mut sanitize_warnings) = sanitize_config(cfg);
                    warnings.append(&mut sanitize_warnings);
                    return ConfigLoadResult {
                        config: cfg,
                        warnings,
                        source: ConfigSource::File,
                    };
                }
                Err(err) => warnings.push(format!(
                    "Failed to parse {} as TOML: {}. Falling back to defaults.",
                    path.display(),
                    err
                )),
            },
            Err(err) => warnings.push(format!(
                "Failed to read {}: {}. Falling back to defaults.",
                path.display(),
                err
            )),
        }
    }

    ConfigLoadResult {
        config: FileConfig::default(),
        warnings,
        source: ConfigSource::Default,
    }
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config_to(path: &Path, config: &FileConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)?;
    Ok(())
}

/// Move the account key into the secret store and record the reference in `config.toml`.
pub fn store_account_key(config: &mut FileConfig, key: &str) -> Result<(), ConfigError> {
    store_account_key_at(&SecretStore::default_location(), &config_path(), config, key)
}

pub fn store_account_key_at(
    store: &SecretStore,
    path: &Path,
    config: &mut FileConfig,
    key: &str,
) -> Result<(), ConfigError> {
    let reference = store.store(ACCOUNT_KEY_SECRET_LABEL, key)?;
    config.account_key = Some(SecretValue::Reference(reference));
    save_config_to(path, config)
}

/// Forget the stored account key, wherever it lives.
pub fn clear_account_key(config: &mut FileConfig) -> Result<bool, ConfigError> {
    clear_account_key_at(&SecretStore::default_location(), &config_path(), config)
}

pub fn clear_account_key_at(
    store: &SecretStore,
    path: &Path,
    config: &mut FileConfig,
) -> Result<bool, ConfigError> {
    let Some(existing) = config.account_key.take() else {
        return Ok(false);
    };
    if let SecretValue::Reference(reference) = &existing {
        store.delete(reference)?;
    }
    save_config_to(path, config)?;
    Ok(true)
}

fn sanitize_config(mut config: FileConfig) -> (FileConfig, Vec<String>) {
    let mut warnings = Vec::new();

    if config.schema_version != CURRENT_SCHEMA_VERSION {
        warnings.push(format!(
            "Unknown config schema_version {}; treating it as {}.",
            config.schema_version, CURRENT_SCHEMA_VERSION
        ));
        config.schema_version = CURRENT_SCHEMA_VERSION;
    }

    let base_url = config.base_url.trim();
    if base_url.is_empty() || !(base_url.starts_with("http://") || base_url.starts_with("https://"))
    {
        warnings.push(format!(
            "base_url '{}' is not an http(s) URL; using {}.",
            config.base_url, DEFAULT_BASE_URL
        ));
        config.base_url = DEFAULT_BASE_URL.to_string();
    }

    if config.output_dir.trim().is_empty() {
        warnings.push(format!(
            "output_dir is empty; using {}.",
            DEFAULT_OUTPUT_DIR
        ));
        config.output_dir = DEFAULT_OUTPUT_DIR.to_string();
    }

    if config.request_timeout_secs == 0 {
        warnings.push(format!(
            "request_timeout_secs must be positive; using {}.",
            DEFAULT_TIMEOUT_SECS
        ));
        config.request_timeout_secs = DEFAULT_TIMEOUT_SECS;
    }

    if let Some(SecretValue::Plain(key)) = &config.account_key {
        if key.trim().is_empty() {
            config.account_key = None;
        }
    }

    (config, warnings)
}

/// Combine file, environment and command-line values. Precedence: CLI, env, file.
pub fn resolve_settings(
    config: &FileConfig,
    env: &EnvOverrides,
    overrides: &RuntimeOverrides,
) -> Result<ResolvedSettings, DataMallError> {
    resolve_settings_with(&SecretStore::default_location(), config, env, overrides)
}

/// [`resolve_settings`] against an explicit secret store.
pub fn resolve_settings_with(
    store: &SecretStore,
    config: &FileConfig,
    env: &EnvOverrides,
    overrides: &RuntimeOverrides,
) -> Result<ResolvedSettings, DataMallError> {
    let base_url = overrides
        .base_url
        .clone()
        .or_else(|| env.base_url.clone())
        .unwrap_or_else(|| config.base_url.clone());

    let output_dir = overrides
        .output_dir
        .clone()
        .or_else(|| env.output_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(&config.output_dir));

    let timeout_secs = match (overrides.timeout_secs, env.timeout_secs.as_deref()) {
        (Some(secs), _) => secs,
        (None, Some(raw)) => raw.trim().parse::<u64>().map_err(|err| {
            DataMallError::Config(format!("invalid value for {ENV_TIMEOUT_SECS}: {err}"))
        })?,
        (None, None) => config.request_timeout_secs,
    };
    if timeout_secs == 0 {
        return Err(DataMallError::Config(
            "request timeout must be at least one second".into(),
        ));
    }

    let account_key = match &env.account_key {
        Some(key) => key.trim().to_string(),
        None => resolve_file_account_key(store, config)?,
    };

    Ok(ResolvedSettings {
        client: ClientSettings {
            base_url,
            account_key,
            timeout: Duration::from_secs(timeout_secs),
        },
        output_dir,
    })
}

fn resolve_file_account_key(store: &SecretStore, config: &FileConfig) -> Result<String, DataMallError> {
    let missing = || {
        DataMallError::Config(format!(
            "no account key configured; set {ENV_ACCOUNT_KEY} or run `datamall secret set`"
        ))
    };
    match &config.account_key {
        Some(SecretValue::Plain(key)) => Ok(key.trim().to_string()),
        Some(SecretValue::Reference(reference)) => store.load(reference)?
            .map(|key| key.trim().to_string())
            .ok_or_else(missing),
        None => Err(missing()),
    }
}

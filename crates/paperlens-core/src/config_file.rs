use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Config, FailurePolicy, Schema, SchemaError, SchemaField};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api: Option<ApiConfig>,
    pub model: Option<ModelConfig>,
    pub pipeline: Option<PipelineConfig>,
    pub schema: Option<SchemaConfig>,
    pub export: Option<ExportConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: Option<String>,
    pub temperature: Option<f32>,
    pub json_mode: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub failure_policy: Option<FailurePolicy>,
    pub max_retries: Option<u32>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Default export format name (`xlsx`, `csv`, `json`, `md`).
    pub format: Option<String>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid schema in config: {0}")]
    Schema(#[from] SchemaError),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to write config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Platform config directory path: `<config_dir>/paperlens/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("paperlens").join("config.toml"))
}

/// Load config by cascading CWD `.paperlens.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".paperlens.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

fn pick<T: Clone>(overlay: Option<&T>, base: Option<&T>) -> Option<T> {
    overlay.or(base).cloned()
}

/// Merge two configs: `overlay` values take precedence over `base`.
///
/// A schema is replaced as a whole, never merged field by field.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (ba, oa) = (base.api.unwrap_or_default(), overlay.api.unwrap_or_default());
    let (bm, om) = (
        base.model.unwrap_or_default(),
        overlay.model.unwrap_or_default(),
    );
    let (bp, op) = (
        base.pipeline.unwrap_or_default(),
        overlay.pipeline.unwrap_or_default(),
    );
    let (be, oe) = (
        base.export.unwrap_or_default(),
        overlay.export.unwrap_or_default(),
    );

    ConfigFile {
        api: Some(ApiConfig {
            api_key: pick(oa.api_key.as_ref(), ba.api_key.as_ref()),
            base_url: pick(oa.base_url.as_ref(), ba.base_url.as_ref()),
        }),
        model: Some(ModelConfig {
            name: pick(om.name.as_ref(), bm.name.as_ref()),
            temperature: om.temperature.or(bm.temperature),
            json_mode: om.json_mode.or(bm.json_mode),
        }),
        pipeline: Some(PipelineConfig {
            failure_policy: op.failure_policy.or(bp.failure_policy),
            max_retries: op.max_retries.or(bp.max_retries),
            request_timeout_secs: op.request_timeout_secs.or(bp.request_timeout_secs),
        }),
        schema: overlay.schema.or(base.schema),
        export: Some(ExportConfig {
            format: pick(oe.format.as_ref(), be.format.as_ref()),
        }),
    }
}

/// Save the config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to_path(config, &path)?;
    Ok(path)
}

pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// A starter config with the built-in defaults spelled out.
pub fn default_config_file() -> ConfigFile {
    let defaults = Config::default();
    ConfigFile {
        api: Some(ApiConfig::default()),
        model: Some(ModelConfig {
            name: Some(defaults.model),
            temperature: Some(defaults.temperature),
            json_mode: Some(defaults.json_mode),
        }),
        pipeline: Some(PipelineConfig {
            failure_policy: Some(defaults.failure_policy),
            max_retries: Some(defaults.max_retries),
            request_timeout_secs: None,
        }),
        schema: None,
        export: Some(ExportConfig {
            format: Some("xlsx".into()),
        }),
    }
}

/// Resolve a [`Config`] from process environment variables over `file`.
pub fn resolve(file: &ConfigFile) -> Result<Config, ConfigError> {
    resolve_with_env(file, |key| std::env::var(key).ok())
}

/// Resolve a [`Config`]: env vars > file > defaults.
///
/// `env` looks up a variable by name; tests pass a closure instead of
/// touching the process environment.
pub fn resolve_with_env(
    file: &ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let defaults = Config::default();
    let api = file.api.clone().unwrap_or_default();
    let model = file.model.clone().unwrap_or_default();
    let pipeline = file.pipeline.clone().unwrap_or_default();

    let temperature = match env("PAPERLENS_TEMPERATURE") {
        Some(raw) => raw
            .trim()
            .parse::<f32>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "PAPERLENS_TEMPERATURE",
                value: raw.clone(),
            })?,
        None => model.temperature.unwrap_or(defaults.temperature),
    };
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::InvalidValue {
            key: "temperature",
            value: temperature.to_string(),
        });
    }

    let schema = match file.schema.as_ref().filter(|s| !s.fields.is_empty()) {
        Some(s) => Arc::new(Schema::new(
            s.fields
                .iter()
                .map(|f| SchemaField::new(f.name.trim(), f.description.clone()))
                .collect(),
        )?),
        None => defaults.schema,
    };

    Ok(Config {
        api_key: env("OPENAI_API_KEY")
            .filter(|k| !k.is_empty())
            .or(api.api_key),
        base_url: env("OPENAI_BASE_URL")
            .filter(|u| !u.is_empty())
            .or(api.base_url),
        model: env("PAPERLENS_MODEL")
            .filter(|m| !m.is_empty())
            .or(model.name)
            .unwrap_or(defaults.model),
        temperature,
        json_mode: model.json_mode.unwrap_or(defaults.json_mode),
        failure_policy: pipeline.failure_policy.unwrap_or(defaults.failure_policy),
        max_retries: pipeline.max_retries.unwrap_or(defaults.max_retries),
        request_timeout_secs: pipeline.request_timeout_secs.filter(|s| *s > 0),
        schema,
    })
}

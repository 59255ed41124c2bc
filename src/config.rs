use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};

use crate::types::PeriodYear;

const SCHEMA_FILE_NAME: &str = "entitlements.schema.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub claims: ClaimsConfig,
}

fn default_enabled_true() -> bool {
    true
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs/entitlements")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_retention_days() -> usize {
    14
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./state/entitlements.json")
}

pub const DEFAULT_RESERVATION_TTL_SECONDS: u64 = 30;

fn default_reservation_ttl_seconds() -> u64 {
    DEFAULT_RESERVATION_TTL_SECONDS
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    #[default]
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default)]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_enabled_true")]
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: LoggingRotation::default(),
            retention_days: default_logging_retention_days(),
            stderr_warn_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Benefit-year to evaluate when the caller does not name one.
    #[serde(default)]
    pub target_year: Option<PeriodYear>,
}

impl EvaluationConfig {
    pub fn resolve_target_year(&self) -> PeriodYear {
        self.target_year
            .unwrap_or_else(|| OffsetDateTime::now_utc().year())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimsConfig {
    /// `false` writes claims without any balance check.
    #[serde(default = "default_enabled_true")]
    pub guarded: bool,
    #[serde(default = "default_reservation_ttl_seconds")]
    pub reservation_ttl_seconds: u64,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            guarded: true,
            reservation_ttl_seconds: default_reservation_ttl_seconds(),
        }
    }
}

impl ClaimsConfig {
    pub fn reservation_ttl(&self) -> Result<Duration> {
        let seconds = i64::try_from(self.reservation_ttl_seconds).with_context(|| {
            format!(
                "claims.reservation_ttl_seconds {} is out of range",
                self.reservation_ttl_seconds
            )
        })?;
        if seconds <= 0 {
            return Err(anyhow!("claims.reservation_ttl_seconds must be positive"));
        }
        Ok(Duration::seconds(seconds))
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_value: Value = json5::from_str(&config_content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let schema_path = resolve_schema_path(config_base, &config_value)?;
        validate_against_schema(&config_value, &schema_path)?;

        let mut config: Config = serde_json::from_value(config_value)
            .context("failed to deserialize entitlements config")?;

        if !config.store.snapshot_path.is_absolute() {
            config.store.snapshot_path = config_base.join(&config.store.snapshot_path);
        }

        Ok(config)
    }
}

fn resolve_schema_path(config_base: &Path, config_value: &Value) -> Result<PathBuf> {
    if let Some(path_text) = config_value.get("$schema").and_then(|value| value.as_str()) {
        let configured = PathBuf::from(path_text);
        if configured.is_absolute() {
            return Ok(configured);
        }
        return Ok(config_base.join(&configured));
    }

    let local_default = config_base.join(SCHEMA_FILE_NAME);
    if local_default.exists() {
        return Ok(local_default);
    }

    Err(anyhow!(
        "unable to resolve schema path: expected $schema in config or {SCHEMA_FILE_NAME} next to it"
    ))
}

fn validate_against_schema(config_value: &Value, schema_path: &Path) -> Result<()> {
    let schema_content = fs::read_to_string(schema_path)
        .with_context(|| format!("failed to read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_content)
        .with_context(|| format!("failed to parse schema {}", schema_path.display()))?;

    let compiled =
        JSONSchema::compile(&schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    let result = compiled.validate(config_value);
    if let Err(errors_iter) = result {
        let validation_errors: Vec<ValidationError> = errors_iter.collect();
        let messages: Vec<String> = validation_errors
            .into_iter()
            .map(|error| error.to_string())
            .collect();
        return Err(anyhow!("config validation failed: {}", messages.join("; ")));
    }

    Ok(())
}

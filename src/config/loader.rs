//! Configuration Loader
//!
//! Environment-aware layered loading on top of the `config` crate.

use super::error::{ConfigResult, ConfigurationError};
use super::WorkerConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_BASENAME: &str = "worker";
const ENV_PREFIX: &str = "WORKER";

/// Legacy variable name -> configuration key
const LEGACY_OVERRIDES: &[(&str, &str)] = &[
    ("R_WORKER_URL", "r_worker.url"),
    ("API_URL", "api.url"),
    ("EXPERIMENT_ID", "worker.experiment_id"),
    ("CELL_SETS_DIR", "cell_sets.directory"),
];

/// Holds the loaded configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: WorkerConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Tests use this to avoid touching process-wide environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            config_directory = %config_directory.display(),
            "Loading worker configuration"
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            r_worker_url = %config.r_worker.url,
            retry_budget_seconds = config.retry.max_elapsed_seconds,
            cache_enabled = config.cache.enabled,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with sensitive fields masked, safe to log
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self.config);
        sanitize_json_recursive(&mut value, &["password", "secret", "token", "credential", "auth"]);
        value
    }

    /// Detect the environment from WORKER_ENV, then APP_ENV
    pub fn detect_environment() -> String {
        env::var("WORKER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn build(config_directory: &Path, environment: &str) -> ConfigResult<WorkerConfig> {
        let base = config_directory.join(CONFIG_BASENAME);
        let overlay = config_directory.join(format!("{CONFIG_BASENAME}.{environment}"));

        let mut builder = Config::builder()
            .add_source(Config::try_from(&WorkerConfig::default())?)
            .add_source(File::with_name(&base.to_string_lossy()).required(false))
            .add_source(File::with_name(&overlay.to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        for (variable, key) in LEGACY_OVERRIDES {
            builder = builder
                .set_override_option(*key, env::var(variable).ok())
                .map_err(|e| ConfigurationError::load_error(environment, e))?;
        }

        let settings = builder
            .build()
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        Ok(settings.try_deserialize::<WorkerConfig>()?)
    }
}

fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                if sensitive_patterns.iter().any(|p| key_lower.contains(p)) {
                    *val = serde_json::Value::String("[MASKED]".to_string());
                } else {
                    sanitize_json_recursive(val, sensitive_patterns);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                sanitize_json_recursive(item, sensitive_patterns);
            }
        }
        _ => {}
    }
}

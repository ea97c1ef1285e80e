//! # Configuration Loader
//!
//! Layered configuration loading built on the `config` crate. Sources, lowest
//! precedence first:
//!
//! 1. Built-in defaults ([`BatcherConfig::default`])
//! 2. `<config_dir>/batcher.yaml` (optional)
//! 3. `<config_dir>/batcher.<environment>.yaml` (optional)
//! 4. `BATCHER__SECTION__KEY` environment variables

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::BatcherConfig;
use crate::constants::env;

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: BatcherConfig,
    environment: String,
    config_directory: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration using `BATCHER_CONFIG_DIR` (or `./config`) and the detected environment
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_sources(config_dir, environment, None)
    }

    /// Wrap an in-memory configuration, validating it first
    pub fn from_config(config: BatcherConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: None,
        }))
    }

    /// `env_vars` replaces the process environment when given; used by tests
    fn load_with_sources(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_vars: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let explicit_dir = config_dir.is_some();
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);
        if explicit_dir && !config_directory.is_dir() {
            return Err(ConfigurationError::DirectoryNotFound(
                config_directory.display().to_string(),
            ));
        }

        debug!(
            config_dir = %config_directory.display(),
            environment = %environment,
            "CONFIG: Loading batcher configuration"
        );

        let base_file = config_directory.join("batcher.yaml");
        let env_file = config_directory.join(format!("batcher.{environment}.yaml"));

        let environment_source = config::Environment::with_prefix(env::CONFIG_PREFIX)
            .separator(env::CONFIG_SEPARATOR)
            .try_parsing(true)
            .source(env_vars);

        let config: BatcherConfig = config::Config::builder()
            .add_source(config::Config::try_from(&BatcherConfig::default())?)
            .add_source(config::File::from(base_file.as_path()).required(false))
            .add_source(config::File::from(env_file.as_path()).required(false))
            .add_source(environment_source)
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!(
            environment = %environment,
            max_batch_size = config.scheduler.max_batch_size,
            max_wait_ms = config.scheduler.max_wait_ms,
            adaptive = config.adaptive.enabled,
            "✅ CONFIG: Batcher configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Some(config_directory),
        }))
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> Option<&Path> {
        self.config_directory.as_deref()
    }

    fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        std::env::var(env::CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OverflowPolicy, ShutdownPolicy};
    use std::fs;
    use tempfile::TempDir;

    fn setup_config_dir(base: &str, env_override: Option<(&str, &str)>) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("batcher.yaml"), base).unwrap();
        if let Some((environment, contents)) = env_override {
            fs::write(
                dir.path().join(format!("batcher.{environment}.yaml")),
                contents,
            )
            .unwrap();
        }
        dir
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::load_with_sources(
            Some(dir.path().to_path_buf()),
            "test",
            Some(HashMap::new()),
        )
        .unwrap();
        assert_eq!(manager.config(), &BatcherConfig::default());
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_yaml_file_and_environment_overlay() {
        let dir = setup_config_dir(
            r#"
scheduler:
  max_batch_size: 16
  max_wait_ms: 80
queue:
  capacity: 500
  overflow_policy: block
"#,
            Some((
                "production",
                r#"
execution:
  shutdown_policy: fail_pending
scheduler:
  max_wait_ms: 120
"#,
            )),
        );

        let manager = ConfigManager::load_with_sources(
            Some(dir.path().to_path_buf()),
            "production",
            Some(HashMap::new()),
        )
        .unwrap();
        let config = manager.config();
        assert_eq!(config.scheduler.max_batch_size, 16);
        assert_eq!(config.scheduler.max_wait_ms, 120);
        assert_eq!(config.queue.capacity, Some(500));
        assert_eq!(config.queue.overflow_policy, OverflowPolicy::Block);
        assert_eq!(config.execution.shutdown_policy, ShutdownPolicy::FailPending);
        // Untouched sections keep their defaults
        assert_eq!(config.adaptive.window_size, 10);
    }

    #[test]
    fn test_environment_variables_override_files() {
        let dir = setup_config_dir("scheduler:\n  max_batch_size: 16\n", None);
        let vars = HashMap::from([
            (
                "BATCHER__SCHEDULER__MAX_BATCH_SIZE".to_string(),
                "18".to_string(),
            ),
            (
                "BATCHER__ADAPTIVE__ENABLED".to_string(),
                "false".to_string(),
            ),
        ]);

        let manager =
            ConfigManager::load_with_sources(Some(dir.path().to_path_buf()), "test", Some(vars))
                .unwrap();
        assert_eq!(manager.config().scheduler.max_batch_size, 18);
        assert!(!manager.config().adaptive.enabled);
    }

    #[test]
    fn test_invalid_file_values_rejected() {
        let dir = setup_config_dir("scheduler:\n  max_batch_size: 0\n", None);
        let result = ConfigManager::load_with_sources(
            Some(dir.path().to_path_buf()),
            "test",
            Some(HashMap::new()),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_explicit_directory() {
        let result = ConfigManager::load_with_sources(
            Some(PathBuf::from("/definitely/not/a/batcher/dir")),
            "test",
            Some(HashMap::new()),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = BatcherConfig::default();
        config.scheduler.max_in_flight_batches = 0;
        assert!(ConfigManager::from_config(config).is_err());
        assert!(ConfigManager::from_config(BatcherConfig::default()).is_ok());
    }
}

//! Configuration Loader
//!
//! Layers configuration sources with the `config` crate. Later sources win:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `DBM__` (e.g. `DBM__JOBS__RUN_SYNC=true`)
//! 4. Explicit key/value overrides

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::error::ConfigResult;
use super::AsyncCoreConfig;

const ENV_PREFIX: &str = "DBM";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration plus the environment it was loaded for
#[derive(Debug)]
pub struct ConfigManager {
    config: AsyncCoreConfig,
    environment: String,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from defaults and environment variables only
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(None, &[])
    }

    /// Load configuration from a TOML file, then environment variables
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(Some(path.as_ref()), &[])
    }

    /// Load configuration with explicit overrides applied last.
    ///
    /// Override keys use dotted paths such as `jobs.rate_limit`.
    pub fn load_with_overrides(
        path: Option<&Path>,
        overrides: &[(&str, &str)],
    ) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("jobs.expected_db_errors"),
        );
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let config: AsyncCoreConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            environment = %environment,
            source_file = ?path,
            max_workers = config.worker_pool.max_workers,
            run_sync = config.jobs.run_sync,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source_file: path.map(Path::to_path_buf),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &AsyncCoreConfig {
        &self.config
    }

    /// Get the environment name the configuration was loaded under
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    fn detect_environment() -> String {
        env::var("DBM_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}

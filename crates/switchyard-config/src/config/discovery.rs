use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{Config, ConfigSource};
use crate::error::ConfigError;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "SWITCHYARD_CONFIG";

const PROJECT_FILE: &str = "switchyard.toml";
const PROJECT_DIR: &str = ".switchyard";
const CONFIG_FILE: &str = "config.toml";

/// Inputs to configuration discovery, captured up front so tests can drive
/// discovery without touching process-global state.
#[derive(Debug, Clone, Default)]
pub struct SearchPaths {
    /// `--config` from the command line.
    pub explicit: Option<PathBuf>,
    /// Value of `SWITCHYARD_CONFIG`.
    pub env: Option<PathBuf>,
    /// Directory the upward project search starts from.
    pub start_dir: PathBuf,
    /// Per-user configuration directory (`dirs::config_dir()`).
    pub user_config_dir: Option<PathBuf>,
}

impl SearchPaths {
    /// Capture the search inputs from the current process.
    pub fn from_environment(explicit: Option<PathBuf>) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        Ok(Self {
            explicit,
            env: std::env::var_os(CONFIG_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            start_dir,
            user_config_dir: dirs::config_dir(),
        })
    }
}

impl Config {
    /// Discover and load configuration for the current process.
    pub fn discover(explicit: Option<PathBuf>) -> Result<Self> {
        Self::discover_from(&SearchPaths::from_environment(explicit)?)
    }

    /// Discover and load configuration from the given search inputs.
    ///
    /// An explicit or environment-provided path must exist; the project and
    /// user locations are optional and fall through to built-in defaults.
    pub fn discover_from(paths: &SearchPaths) -> Result<Self> {
        match Self::locate(paths)? {
            Some(path) => Self::load(&path),
            None => {
                tracing::debug!("no configuration file found, using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Resolve which configuration file discovery would load.
    pub fn locate(paths: &SearchPaths) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(forced) = paths.explicit.as_ref().or(paths.env.as_ref()) {
            if !forced.is_file() {
                return Err(ConfigError::NotFound {
                    path: forced.clone(),
                });
            }
            return Ok(Some(forced.clone()));
        }

        if let Some(found) = Self::discover_project_file_from(&paths.start_dir) {
            return Ok(Some(found));
        }

        Ok(paths
            .user_config_dir
            .as_ref()
            .map(|dir| dir.join("switchyard").join(CONFIG_FILE))
            .filter(|p| p.is_file()))
    }

    /// Search upward from `start_dir` for `switchyard.toml` or
    /// `.switchyard/config.toml`, stopping at a repository root.
    #[must_use]
    pub fn discover_project_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            for candidate in [
                dir.join(PROJECT_FILE),
                dir.join(PROJECT_DIR).join(CONFIG_FILE),
            ] {
                if candidate.is_file() {
                    return Some(candidate);
                }
            }

            if dir.join(".git").exists() || dir.join(".hg").exists() {
                break;
            }
            current = dir.parent();
        }

        None
    }

    /// Load, parse, and validate one configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        config.source = ConfigSource::File(path.to_path_buf());
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            reason: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

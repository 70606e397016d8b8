//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (platform config dir, e.g. ~/.config/trialsift/config.toml)
//! 3. Project config (.trialsift/config.toml)
//! 4. Environment variables (TRIALSIFT_* prefix, `__` between section and key)
//!
//! The API key additionally falls back to `TRIALSIFT_API_KEY`.

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{Result, SiftError};

/// Environment prefix for all overrides
pub const ENV_PREFIX: &str = "TRIALSIFT_";

/// Shorthand variable holding the API credential
pub const API_KEY_ENV: &str = "TRIALSIFT_API_KEY";

const PROJECT_DIR: &str = ".trialsift";
const CONFIG_FILE: &str = "config.toml";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_layers(
            Self::global_config_path().as_deref(),
            &Self::project_config_path(),
        )
    }

    /// Load configuration from a specific file only (defaults underneath)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(SiftError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| SiftError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn load_layers(global: Option<&Path>, project: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(project));
        }

        // TRIALSIFT_API__MODEL -> api.model
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));

        let mut config: Config = figment
            .extract()
            .map_err(|e| SiftError::Config(format!("Configuration error: {}", e)))?;

        if config.api.api_key.is_none()
            && let Ok(key) = env::var(API_KEY_ENV)
            && !key.trim().is_empty()
        {
            debug!("Using API key from {}", API_KEY_ENV);
            config.api.api_key = Some(key);
        }

        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Platform config directory (e.g. ~/.config/trialsift/)
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "trialsift").map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    pub fn project_dir() -> PathBuf {
        PathBuf::from(PROJECT_DIR)
    }

    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join(CONFIG_FILE)
    }

    /// Render the effective configuration as TOML or JSON
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| SiftError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write the default global config; existing files are kept unless `force`
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            SiftError::Config("Cannot determine global config directory".to_string())
        })?;
        Self::write_template(&global_dir, force)
    }

    /// Write the default project config under `.trialsift/`
    pub fn init_project(force: bool) -> Result<PathBuf> {
        Self::write_template(&Self::project_dir(), force)
    }

    fn write_template(dir: &Path, force: bool) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_config_template())?;
            info!("Created config: {}", config_path.display());
        } else {
            info!("Config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    fn default_config_template() -> &'static str {
        r#"# TrialSift Configuration
# Project settings in .trialsift/config.toml override the global file.
# The API key is read from TRIALSIFT_API_KEY and never written here.

version = "1.0"

[api]
endpoint = "https://open.bigmodel.cn/api/paas/v4/chat/completions"
model = "glm-4-plus"
temperature = 0.1
top_p = 0.7
max_tokens = 4096
timeout_secs = 120

# At most max_requests calls may start in any window_ms interval
[rate_limit]
max_requests = 60
window_ms = 60000

[retry]
max_attempts = 3
base_delay_ms = 1000
max_jitter_ms = 500

[extraction]
max_input_tokens = 30000
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Serializes tests that read the TRIALSIFT_* environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_template_parses_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = ConfigLoader::write_template(temp_dir.path(), false).unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        let defaults = Config::default();
        assert_eq!(config.api.endpoint, defaults.api.endpoint);
        assert_eq!(config.rate_limit.max_requests, defaults.rate_limit.max_requests);
        assert_eq!(config.retry.base_delay_ms, defaults.retry.base_delay_ms);
    }

    #[test]
    fn test_write_template_keeps_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "version = \"custom\"\n").unwrap();

        ConfigLoader::write_template(temp_dir.path(), false).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("custom"));

        ConfigLoader::write_template(temp_dir.path(), true).unwrap();
        assert!(!fs::read_to_string(&path).unwrap().contains("custom"));
    }

    #[test]
    fn test_project_overrides_global() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let global = temp_dir.path().join("global.toml");
        let project = temp_dir.path().join("project.toml");
        fs::write(&global, "[api]\nmodel = \"global-model\"\n[retry]\nmax_attempts = 5\n").unwrap();
        fs::write(&project, "[api]\nmodel = \"project-model\"\n").unwrap();

        let config = ConfigLoader::load_layers(Some(&global), &project).unwrap();
        assert_eq!(config.api.model, "project-model");
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "[rate_limit]\nmax_requests = 0\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(SiftError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        assert!(ConfigLoader::load_from_file(&temp_dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_env_override() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: Writers and readers of TRIALSIFT_* hold ENV_LOCK
        unsafe {
            env::set_var("TRIALSIFT_API__MODEL", "env-model");
            env::set_var(API_KEY_ENV, "id.secret");
        }
        let config =
            ConfigLoader::load_layers(None, &temp_dir.path().join("absent.toml")).unwrap();
        unsafe {
            env::remove_var("TRIALSIFT_API__MODEL");
            env::remove_var(API_KEY_ENV);
        }

        assert_eq!(config.api.model, "env-model");
        assert_eq!(config.api.api_key.as_deref(), Some("id.secret"));
    }

    #[test]
    fn test_render_omits_api_key() {
        let mut config = Config::default();
        config.api.api_key = Some("id.secret".to_string());

        let toml_text = ConfigLoader::render(&config, false).unwrap();
        let json_text = ConfigLoader::render(&config, true).unwrap();
        assert!(!toml_text.contains("id.secret"));
        assert!(!json_text.contains("id.secret"));
        assert!(json_text.contains("\"rate_limit\""));
    }
}

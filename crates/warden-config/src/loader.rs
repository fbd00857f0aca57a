use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::WardenConfig;

/// Loads the warden configuration and holds the live copy.
pub struct ConfigLoader {
    config: Arc<RwLock<WardenConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("warden.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> warden_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<WardenConfig>(&raw).map_err(|e| {
                warden_core::WardenError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate config — log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(warden_core::WardenError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> WardenConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<WardenConfig>> {
        Arc::clone(&self.config)
    }

    /// Path the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (WARDEN_MODE, WARDEN_LOG_LEVEL, etc.)
    fn apply_env_overrides(mut config: WardenConfig) -> WardenConfig {
        if let Ok(v) = std::env::var("WARDEN_MODE") {
            match v.parse() {
                Ok(mode) => config.mode = mode,
                Err(_) => warn!(value = %v, "ignoring unrecognized WARDEN_MODE"),
            }
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("WARDEN_LEDGER_PATH") {
            config.ledger.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("WARDEN_APPROVAL_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.approvals.timeout_secs = secs;
            }
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> warden_core::Result<()> {
        if !self.config_path.exists() {
            return Err(warden_core::WardenError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let raw = std::fs::read_to_string(&self.config_path)?;
        let new_config = toml::from_str::<WardenConfig>(&raw).map_err(|e| {
            warden_core::WardenError::Config(format!(
                "failed to parse {}: {}",
                self.config_path.display(),
                e
            ))
        })?;
        let new_config = Self::apply_env_overrides(new_config);
        new_config
            .validate()
            .map_err(warden_core::WardenError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }
}

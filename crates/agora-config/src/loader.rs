use agora_core::AgoraError;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::AgoraConfig;

/// Loads the Agora configuration and keeps a shared, reloadable copy.
pub struct ConfigLoader {
    config: Arc<RwLock<AgoraConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > AGORA_CONFIG env > ~/.agora/agora.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("AGORA_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agora")
            .join("agora.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> agora_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            AgoraConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Parse a TOML string with the same overrides and validation as `load`.
    pub fn from_toml(raw: &str) -> agora_core::Result<AgoraConfig> {
        let config = toml::from_str::<AgoraConfig>(raw)
            .map_err(|e| AgoraError::Config(format!("failed to parse config: {}", e)))?;
        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;
        Ok(config)
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> AgoraConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<AgoraConfig>> {
        Arc::clone(&self.config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Reload the config from disk. The current config is kept if the new one is invalid.
    pub fn reload(&self) -> agora_core::Result<()> {
        if !self.config_path.exists() {
            return Err(AgoraError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read_file(&self.config_path)?);
        Self::check(&new_config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    fn read_file(path: &Path) -> agora_core::Result<AgoraConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<AgoraConfig>(&raw).map_err(|e| {
            AgoraError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Log warnings, fail on errors.
    fn check(config: &AgoraConfig) -> agora_core::Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(AgoraError::Config(e)),
        }
    }

    /// Apply env var overrides (AGORA_ENGINE_MODEL, AGORA_CRON_SECRET, etc.)
    fn apply_env_overrides(mut config: AgoraConfig) -> AgoraConfig {
        if let Ok(v) = std::env::var("AGORA_ENGINE_MODEL") {
            config.engine.model = v;
        }
        if let Ok(v) = std::env::var("AGORA_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("AGORA_SERVER_LISTEN") {
            config.server.listen = v;
        }
        if let Ok(v) = std::env::var("AGORA_CRON_SECRET") {
            if !v.is_empty() {
                config.scheduler.cron_secret = Some(v);
            }
        }
        if let Ok(v) = std::env::var("AGORA_DAILY_TOKEN_LIMIT") {
            match v.parse::<u64>() {
                Ok(limit) => config.budget.daily_token_limit = limit,
                Err(_) => warn!(value = %v, "ignoring non-numeric AGORA_DAILY_TOKEN_LIMIT"),
            }
        }
        // Keys: the config file wins, env is the fallback.
        if config.services.openai_api_key.is_none() {
            if let Ok(v) = std::env::var("OPENAI_API_KEY") {
                config.services.openai_api_key = Some(v);
            }
        }
        if config.tracing.api_key.is_none() {
            if let Ok(v) = std::env::var("AGORA_TRACING_API_KEY") {
                config.tracing.api_key = Some(v);
            }
        }
        config
    }
}

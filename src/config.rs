use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for paperflow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaperflowConfig {
    /// Staging area settings
    pub storage: StorageConfig,
    /// Session engine settings
    pub engine: EngineConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory for staged input files (one subdirectory per session)
    pub input_root: String,
    /// Root directory for produced output artifacts
    pub output_root: String,
    /// Width of the zero-padded position prefix on staged file names.
    /// Also caps the staged-set size (2 digits = 99 items).
    pub position_prefix_width: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Events queued per session before dispatch applies backpressure
    pub session_queue_depth: usize,
    /// Seconds a session worker waits for the next event before it expires
    /// the session and exits
    pub session_idle_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for PaperflowConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                input_root: ".paperflow/input".to_string(),
                output_root: ".paperflow/output".to_string(),
                position_prefix_width: 2,
            },
            engine: EngineConfig {
                session_queue_depth: 32,
                session_idle_secs: 900,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
            },
        }
    }
}

impl PaperflowConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. paperflow.toml, if present
    /// 3. Environment variables prefixed with PAPERFLOW_
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&PaperflowConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if Path::new("paperflow.toml").exists() {
            builder = builder.add_source(File::with_name("paperflow"));
        }

        builder = builder.add_source(
            Environment::with_prefix("PAPERFLOW")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = PaperflowConfig::default();
        assert_eq!(config.storage.position_prefix_width, 2);
        assert!(config.engine.session_queue_depth > 0);
        assert!(config.engine.session_idle_secs > 0);
        assert_eq!(config.observability.log_level, "info");
    }
}

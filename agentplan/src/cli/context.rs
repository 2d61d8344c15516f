//! CLI context - configuration and kernel construction shared by all commands

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, KernelConfig};
use crate::kernel::{Kernel, KernelError};

/// Shared context for CLI commands
pub struct CliContext {
    /// Path of the loaded configuration file, if any
    pub config_path: Option<PathBuf>,
    /// Configuration after environment overrides
    pub config: KernelConfig,
    pub output_format: super::OutputFormat,
    pub verbose: bool,
}

impl CliContext {
    /// Create a new CLI context from a configuration file
    pub fn new(config_path: PathBuf) -> Result<Self, ConfigError> {
        let mut config = KernelConfig::from_file(&config_path)?;
        config.apply_env()?;
        Ok(Self {
            config_path: Some(config_path),
            config,
            output_format: super::OutputFormat::Text,
            verbose: false,
        })
    }

    /// Create context from the first default config file found, or defaults
    pub fn with_defaults() -> Result<Self, ConfigError> {
        let default_paths = [
            PathBuf::from("agentplan.toml"),
            PathBuf::from("config/agentplan.toml"),
        ];
        for path in &default_paths {
            if path.exists() {
                return Self::new(path.clone());
            }
        }

        Ok(Self {
            config_path: None,
            config: KernelConfig::from_env()?,
            output_format: super::OutputFormat::Text,
            verbose: false,
        })
    }

    /// Kernel with the configured completion client and the built-in plugins
    pub fn kernel(&self) -> Result<Kernel, KernelError> {
        Kernel::from_config(self.config.clone())
    }

    /// Token cancelled when the process receives Ctrl-C
    pub fn cancellation_on_interrupt(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupted, cancelling");
                child.cancel();
            }
        });
        token
    }
}

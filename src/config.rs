use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::rl::config::{AgentSettings, DriverConfig, PublishConfig};
use crate::rl::environment::ChainConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Experiment name, the stem of the checkpoint files
    pub name_exp: String,
    /// Directory holding checkpoints
    pub res_dir: PathBuf,
    /// Persist and resume checkpoints
    pub checkpoint: bool,
    pub driver: DriverConfig,
    pub agent: AgentSettings,
    pub environment: ChainConfig,
    pub publish: PublishConfig,
    pub logging: LoggingConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name_exp: "chain".to_string(),
            res_dir: PathBuf::from("results"),
            checkpoint: true,
            driver: DriverConfig::default(),
            agent: AgentSettings::default(),
            environment: ChainConfig::default(),
            publish: PublishConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    pub level: String,
    /// Emit console logs as JSON
    pub json: bool,
    /// Directory for the daily log file; file logging is off when unset
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info,rl_experiment=debug".to_string()
}

impl ExperimentConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/cluster.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("RLX_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (RLX__DRIVER__TOTAL_EPISODES, etc.)
            .add_source(
                Environment::with_prefix("RLX")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// `<res_dir>/<name_exp>`, the stem of the checkpoint files
    pub fn experiment_path(&self) -> PathBuf {
        self.res_dir.join(&self.name_exp)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name_exp.trim().is_empty() {
            errors.push("name_exp must not be empty".to_string());
        }

        if let Err(driver_errors) = self.driver.validate() {
            errors.extend(driver_errors);
        }
        if let Err(env_errors) = self.environment.validate() {
            errors.extend(env_errors);
        }

        if !(0.0..=1.0).contains(&self.agent.discount) {
            errors.push("agent.discount must be within [0, 1]".to_string());
        }
        if self.agent.scale_reward == 0.0 || !self.agent.scale_reward.is_finite() {
            errors.push("agent.scale_reward must be finite and non-zero".to_string());
        }
        let schedule = &self.agent.schedule;
        if schedule.epsilon_min > schedule.epsilon_start {
            errors.push("agent.schedule.epsilon_min must not exceed epsilon_start".to_string());
        }
        if schedule.learning_rate <= 0.0 {
            errors.push("agent.schedule.learning_rate must be positive".to_string());
        }

        if self.publish.upload_checkpoint && !self.checkpoint {
            errors.push("publish.upload_checkpoint requires checkpointing".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

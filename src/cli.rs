use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ExperimentConfig;
use crate::rl::config::PublishMode;

#[derive(Parser, Debug)]
#[command(name = "rl-experiment")]
#[command(author, version)]
#[command(about = "Resumable episodic reinforcement-learning experiment runner", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and per-environment overrides
    #[arg(long, global = true, default_value = "config", env = "RLX_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train an agent, resuming from the latest checkpoint if present (default)
    Train(TrainArgs),
    /// Show the training state stored in the latest checkpoint
    Inspect {
        /// Experiment name
        #[arg(long)]
        name_exp: Option<String>,
        /// Checkpoint directory
        #[arg(long)]
        res_dir: Option<PathBuf>,
    },
    /// Print the resolved configuration as JSON
    Config,
}

/// Overrides applied on top of the resolved configuration
#[derive(Args, Debug, Default, Clone)]
pub struct TrainArgs {
    /// Experiment name, the stem of the checkpoint files
    #[arg(long)]
    pub name_exp: Option<String>,
    /// Checkpoint directory
    #[arg(long)]
    pub res_dir: Option<PathBuf>,
    /// Episode index at which the run stops
    #[arg(short, long)]
    pub episodes: Option<usize>,
    /// Evaluate every N-th episode
    #[arg(long)]
    pub test_every: Option<usize>,
    /// Number of trailing episodes that are all evaluated
    #[arg(long)]
    pub eval_tail: Option<usize>,
    /// Render evaluation episodes
    #[arg(long)]
    pub render: bool,
    /// Call the agent's plot hook on evaluation episodes
    #[arg(long)]
    pub plot: bool,
    /// Seed the environment and the agent
    #[arg(long)]
    pub seed: Option<u64>,
    /// Disable checkpointing and resume
    #[arg(long)]
    pub no_checkpoint: bool,
    /// Publish results into this directory
    #[arg(long)]
    pub publish_dir: Option<PathBuf>,
    /// Publishing mode
    #[arg(long, value_parser = ["sequential", "parallel"])]
    pub publish_mode: Option<String>,
    /// Also publish checkpoint files
    #[arg(long)]
    pub upload_checkpoint: bool,
    /// Write the final report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl TrainArgs {
    /// Apply the overrides to `config`
    pub fn apply(&self, config: &mut ExperimentConfig) {
        if let Some(name) = &self.name_exp {
            config.name_exp = name.clone();
        }
        if let Some(dir) = &self.res_dir {
            config.res_dir = dir.clone();
        }
        if let Some(episodes) = self.episodes {
            config.driver.total_episodes = episodes;
        }
        if let Some(test_every) = self.test_every {
            config.driver.test_every = test_every;
        }
        if let Some(eval_tail) = self.eval_tail {
            config.driver.eval_tail = eval_tail;
        }
        if self.render {
            config.driver.render = true;
        }
        if self.plot {
            config.driver.plot = true;
        }
        if let Some(seed) = self.seed {
            config.driver.seed = seed;
        }
        if self.no_checkpoint {
            config.checkpoint = false;
        }
        if let Some(dir) = &self.publish_dir {
            config.publish.destination = Some(dir.clone());
        }
        match self.publish_mode.as_deref() {
            Some("sequential") => config.publish.mode = PublishMode::Sequential,
            Some("parallel") => config.publish.mode = PublishMode::Parallel,
            _ => {}
        }
        if self.upload_checkpoint {
            config.publish.upload_checkpoint = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_overrides() {
        let cli = Cli::parse_from([
            "rl-experiment",
            "train",
            "--name-exp",
            "corridor",
            "--episodes",
            "300",
            "--seed",
            "7",
            "--publish-mode",
            "sequential",
            "--no-checkpoint",
        ]);
        let Some(Commands::Train(args)) = cli.command else {
            panic!("expected train command");
        };

        let mut config = ExperimentConfig::default();
        args.apply(&mut config);

        assert_eq!(config.name_exp, "corridor");
        assert_eq!(config.driver.total_episodes, 300);
        assert_eq!(config.driver.seed, 7);
        assert_eq!(config.publish.mode, PublishMode::Sequential);
        assert!(!config.checkpoint);
        // untouched values keep the resolved configuration
        assert_eq!(config.driver.test_every, 25);
    }

    #[test]
    fn test_no_subcommand_defaults() {
        let cli = Cli::parse_from(["rl-experiment"]);
        assert!(cli.command.is_none());
    }
}

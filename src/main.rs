use clap::Parser;
use rl_experiment::cli::{Cli, Commands, TrainArgs};
use rl_experiment::config::ExperimentConfig;
use rl_experiment::error::{ExperimentError, Result};
use rl_experiment::rl::training::CheckpointCoordinator;
use tracing::{error, info, warn};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, run_experiment};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ExperimentConfig::load_from(&cli.config_dir)?;

    match cli.command {
        Some(Commands::Train(args)) => run_train(config, args).await?,
        None => run_train(config, TrainArgs::default()).await?,
        Some(Commands::Inspect { name_exp, res_dir }) => {
            init_logging_simple();
            let mut config = config;
            if let Some(name) = name_exp {
                config.name_exp = name;
            }
            if let Some(dir) = res_dir {
                config.res_dir = dir;
            }
            let coordinator = CheckpointCoordinator::from_experiment_path(config.experiment_path());
            let (state, params) = coordinator.load()?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            println!("parameters: {} bytes", params.len());
        }
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run_train(mut config: ExperimentConfig, args: TrainArgs) -> Result<()> {
    args.apply(&mut config);
    if let Err(errors) = config.validate() {
        return Err(ExperimentError::InvalidConfig(errors.join("; ")));
    }

    init_logging(&config.logging);

    let report = match run_experiment(&config).await {
        Ok(report) => report,
        Err(e) => {
            error!("Experiment {} aborted: {}", config.name_exp, e);
            return Err(e);
        }
    };

    if report.interrupted {
        warn!(
            "Interrupted after {} episodes; resume from episode {}",
            report.episodes_run, report.state.start_episode
        );
    }
    info!(
        "mean reward over last {} episodes: {:?} (threshold {:?}, solved: {})",
        config.driver.eval_tail,
        report.mean_tail_reward,
        report.reward_threshold,
        report.solved()
    );

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_vec_pretty(&report)?)?;
        info!("Report written to {:?}", path);
    }

    Ok(())
}

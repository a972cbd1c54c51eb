use rl_experiment::config::{ExperimentConfig, LoggingConfig};
use rl_experiment::coordination::{install_signal_handlers, ShutdownFlag};
use rl_experiment::error::Result;
use rl_experiment::rl::algorithms::TabularQAgent;
use rl_experiment::rl::environment::{ChainEnvironment, NUM_ACTIONS};
use rl_experiment::rl::training::{
    copy_publisher, AsyncPublisher, CheckpointCoordinator, ExperimentDriver, Report,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Build the bundled chain task and tabular agent and run them to completion
pub async fn run_experiment(config: &ExperimentConfig) -> Result<Report> {
    let env = ChainEnvironment::new(config.environment.clone());
    let mut agent = TabularQAgent::new(env.num_states(), NUM_ACTIONS, config.agent.discount);
    if config.driver.seed > 0 {
        agent = agent.with_seed(config.driver.seed);
    }

    let shutdown = ShutdownFlag::new();
    install_signal_handlers(shutdown.clone());

    let mut driver = ExperimentDriver::new(agent, env, config.agent.clone(), config.driver.clone())
        .with_shutdown(shutdown);

    if config.checkpoint {
        driver = driver.with_checkpoints(CheckpointCoordinator::from_experiment_path(
            config.experiment_path(),
        ));
    }

    if let Some(destination) = &config.publish.destination {
        info!("Publishing results to {:?} ({})", destination, config.publish.mode);
        driver = driver.with_publisher(AsyncPublisher::new(
            copy_publisher(destination.clone()),
            config.publish.mode,
            config.publish.upload_checkpoint,
        ));
    }

    info!(
        "Starting experiment {} (run {})",
        config.name_exp,
        driver.run_id()
    );
    driver.run().await
}

pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // RLX_LOG_DIR wins over the configured directory
    let log_dir = std::env::var("RLX_LOG_DIR")
        .ok()
        .map(std::path::PathBuf::from)
        .or_else(|| config.dir.clone());

    // `tracing_appender::rolling::daily` panics if it can't create the
    // initial log file, so preflight writability.
    let file_layer = log_dir.as_ref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Could not create log directory {:?} ({}), file logging disabled",
                log_dir, e
            );
            return None;
        }

        let test_path = log_dir.join(".rlx_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                // Daily rotating file appender
                let file_appender = tracing_appender::rolling::daily(log_dir, "rl-experiment.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Keep the guard alive for the lifetime of the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {:?} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    // Console layer, plain or JSON
    let (console_plain, console_json) = if config.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_plain)
        .with(console_json)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/rl-experiment.log", dir.display());
    }
}

pub fn init_logging_simple() {
    // Minimal logging for inspection commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

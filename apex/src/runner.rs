use crate::{error::ApexError, logging, services::Services, strategy::Strategy};
use apex_integration::{
    config::Config,
    event_loop::BacktestPeriod,
    time::Time,
    RunMode,
};
use clap::Parser;
use std::{path::PathBuf, str::FromStr, sync::Arc};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(about = "Apex strategy process")]
struct Args {
    /// Path to the strategy JSON config file.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,
}

/// Serve as the `main` for Apex strategy processes: parse arguments, load the config,
/// create services, build the strategy via `factory`, run until complete or interrupted,
/// then stop cleanly. Returns the process exit code.
pub fn strategy_runner(
    factory: impl FnOnce(&Config, &Arc<Services>) -> Result<Strategy, ApexError>,
) -> i32 {
    logging::init_logging();

    let args = Args::parse();
    match run(&args.config, factory) {
        Ok(()) => 0,
        Err(run_error) => {
            error!(error = %run_error, "strategy terminated with error");
            eprintln!("error: {run_error}");
            1
        }
    }
}

fn run(
    config_file: &PathBuf,
    factory: impl FnOnce(&Config, &Arc<Services>) -> Result<Strategy, ApexError>,
) -> Result<(), ApexError> {
    let root_config = Config::from_file(config_file)?;
    info!(config = %config_file.display(), "application config file");

    let run_mode = RunMode::from_str(&root_config.get_string("run_mode")?)
        .map_err(|parse_error| ApexError::BadConfig(parse_error.to_string()))?;

    let backtest_period = if run_mode.is_backtest() {
        let backtest_config = root_config.sub_config("backtest")?;
        let from = Time::from_str(&backtest_config.get_string("from")?)
            .map_err(|parse_error| ApexError::BadConfig(parse_error.to_string()))?;
        let upto = Time::from_str(&backtest_config.get_string("upto")?)
            .map_err(|parse_error| ApexError::BadConfig(parse_error.to_string()))?;
        Some(
            BacktestPeriod::new(from, upto)
                .map_err(|period_error| ApexError::BadConfig(period_error.to_string()))?,
        )
    } else {
        None
    };

    let services = Services::new(
        run_mode,
        root_config.sub_config_or_empty("services"),
        backtest_period,
    )?;

    let strategy_config = root_config.sub_config("strategy")?;
    let strategy = factory(&strategy_config, &services)?;

    strategy.init_bots()?;

    services.run()?;

    info!("*** strategy stopping ***");
    strategy.stop();
    services.stop();
    Ok(())
}

//! The gateway process: one listen port, one venue session per configured exchange.

use apex_gateway::{
    error::GatewayError,
    exchange::{
        binance::{BinanceParams, BinanceSession},
        ExchangeSession,
    },
    server::GatewayServer,
};
use apex_integration::{
    config::Config,
    event_loop::{EventLoop, RealtimeEventLoop},
    reactor::Reactor,
    RunMode,
};
use clap::Parser;
use std::{
    path::PathBuf,
    str::FromStr,
    sync::{mpsc, Arc},
};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "apex-gx", about = "Apex gateway: multiplex venue connections to strategy clients")]
struct Args {
    /// Path to the gateway JSON config file.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    if let Err(error) = run(&args) {
        error!(%error, "gateway terminated with error");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), GatewayError> {
    let config = Config::from_file(&args.config)?;

    let run_mode = RunMode::from_str(&config.get_string("run_mode")?)
        .map_err(|parse_error| GatewayError::Venue(parse_error.to_string()))?;
    let port = config.get_uint("port")? as u16;

    info!(%run_mode, port, "starting apex gateway");

    let reactor = Reactor::new()?;
    let evloop = RealtimeEventLoop::with_default_panic_handler();
    let server = GatewayServer::new(
        run_mode,
        Arc::clone(&evloop) as Arc<dyn EventLoop>,
        Arc::clone(&reactor),
    );

    let exchanges = config.sub_config_or_empty("exchanges");
    for index in 0..exchanges.array_len() {
        let venue_config = exchanges.array_item(index)?;
        let venue_type = venue_config.get_string("type")?;

        match venue_type.as_str() {
            "binance" => {
                let params = BinanceParams {
                    api_key: venue_config.get_string_or("api_key", ""),
                    api_secret: venue_config.get_string_or("api_secret", ""),
                    rest_endpoint: venue_config
                        .get_string_or("rest_endpoint", "https://api.binance.com"),
                    ws_endpoint: venue_config
                        .get_string_or("ws_endpoint", "wss://stream.binance.com:9443"),
                    recv_window: venue_config.get_uint_or("recv_window", 5_000),
                };

                let venue = BinanceSession::new(
                    server.exchange_events(),
                    params,
                    run_mode,
                    Arc::clone(&evloop) as Arc<dyn EventLoop>,
                    Arc::clone(&reactor),
                )?;
                venue.start();
                server.add_venue(venue);
            }
            other => {
                return Err(GatewayError::UnknownExchange(other.to_string()));
            }
        }
    }

    server.start(port)?;

    // block the main thread until interrupted
    let (interrupt_tx, interrupt_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })
    .map_err(|handler_error| GatewayError::Venue(handler_error.to_string()))?;

    let _ = interrupt_rx.recv();
    info!("interrupt received, gateway stopping");

    server.stop();
    reactor.sync_stop();
    evloop.sync_stop();
    Ok(())
}

use anyhow::{Context, Result};
use dotenv::dotenv;
use log::{debug, error, info};
use sonos_control::controller::INPUT_LABEL;
use sonos_control::sonos::SonosPlayer;
use sonos_control::{CommandError, Config, Controller, InputMessage, JsonLinesReporter, OutcomeReporter};
use std::io::Stdout;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Initialize the logging system with environment-based configuration
fn setup_logging() {
    // RUST_LOG controls the level; logs go to stderr, outcomes to stdout
    env_logger::init();
}

async fn process_line<R: OutcomeReporter>(line: &str, config: &Config, controller: &Controller<R>) {
    let msg: InputMessage = match serde_json::from_str(line) {
        Ok(msg) => msg,
        Err(e) => {
            return controller.report_failure(INPUT_LABEL, CommandError::InvalidPayload(e.to_string()));
        }
    };

    let address = match config.locator.resolve().await {
        Ok(address) => address,
        Err(e) => return controller.report_failure(INPUT_LABEL, e),
    };
    debug!("using player at {}", address);

    let player = SonosPlayer::new(&address, config.port);
    controller.handle(msg, &player, &player).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    setup_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            return Err(e);
        }
    };
    info!("Starting sonos-control with {:?}", config.locator);

    let controller: Controller<JsonLinesReporter<Stdout>> = Controller::new(JsonLinesReporter::new(std::io::stdout()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        process_line(&line, &config, &controller).await;
    }

    info!("Input closed, shutting down");
    Ok(())
}

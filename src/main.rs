mod cli;

use clap::Parser;
use cli::Cli;
use entrygate::{logging, Dispatcher, Error, Settings, ShutdownSignal};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => report_fatal(&e),
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init(cli.log_level_override(), std::env::var("LOG_LEVEL").ok().as_deref());
            return Err(e.into());
        }
    };
    logging::init(cli.log_level_override(), settings.log_level.as_deref());
    tracing::debug!(environment = %settings.environment, "Loaded settings");

    let dispatcher = Dispatcher::new(settings, ShutdownSignal::new());
    let code = dispatcher.dispatch(&cli.mode, &cli.args).await?;
    Ok(code)
}

/// Log the one fatal line and pick the exit code.
fn report_fatal(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<Error>() {
        Some(err) => logging::fatal(err),
        None => {
            tracing::error!(kind = "internal", "{:#}", e);
            1
        }
    }
}

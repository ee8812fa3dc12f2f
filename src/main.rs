use bluebandedbee::app::App;
use bluebandedbee::cli::Args;
use bluebandedbee::config::Config;
use bluebandedbee::logging;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    logging::setup_logging(&config, args.tracing);

    let mut app = match App::new(config).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) { "development" } else { "production" },
        "starting blue banded bee"
    );

    app.start_services();
    app.run().await
}

use std::process::ExitCode;

use clap::Parser;
use smartavg::app::App;
use smartavg::cli::Args;
use smartavg::config::Config;
use smartavg::logging::setup_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and setup logging before App::new() so startup logs are
    // never silently dropped.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing.clone());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        year = %args.year,
        quarters = ?args.quarters,
        max_years = args.max_years,
        "starting smartavg"
    );

    let app = match App::new(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = ?e, "failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    match app.run(&args).await {
        Ok(totals) => {
            info!(
                sections = totals.sections,
                rows_written = totals.rows_written,
                "run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = ?e, "run failed");
            ExitCode::FAILURE
        }
    }
}

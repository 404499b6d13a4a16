use std::process::ExitCode;

use autocrop::cli::parse_cli;
use autocrop::run_pipeline;
use autocrop::settings::resolve_settings;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let (cli, sources) = parse_cli();
    let settings = match resolve_settings(&cli, &sources) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };
    if let Some(path) = &settings.config_path {
        info!(config = %path.display(), "using configuration file");
    }

    match run_pipeline(&settings).await {
        Ok(report) => {
            info!(
                commands = report.commands,
                sessions = report.sessions.len(),
                "replay finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "replay failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("autocrop=info,autocrop_engine=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

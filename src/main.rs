//! Camview binary: show a V4L2 camera in a window until the user quits.

use std::process::ExitCode;

use camview::{app, window, Cli, Config, Exit, Session, VideoDevice};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = Config::from(&cli);
    match run(&config) {
        Ok(exit) => exit.into(),
        Err(err) => {
            error!(class = ?err.class(), errno = err.os_code(), "{err}");
            Exit::InitFailed.into()
        }
    }
}

/// `RUST_LOG` wins over `--log-level`.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn run(config: &Config) -> camview::Result<Exit> {
    info!(device = %config.device_path.display(), "opening camera");
    let session = Session::open(&config.device_path, &config.requested_format())?;

    let caps = session.device()?.capabilities();
    info!(
        device = %session.path().display(),
        card = %caps.card,
        driver = %caps.driver,
        format = %session.format(),
        "camera ready"
    );

    let fullscreen = config.fullscreen;
    let summary = app::launch(session, config.buffer_count, |_| Ok(window::open(fullscreen)))?;
    Ok(summary.exit)
}

mod pipeline;

use pedtrack_common::config::Config;
use std::path::PathBuf;
use tracing::{error, info};

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        input = %config.input.dir.display(),
        output = %config.output.dir.display(),
        swap = config.filters.swap.enabled,
        bright_contrast = config.filters.bright_contrast.enabled,
        border = config.filters.border.enabled,
        calib = config.filters.calib.enabled,
        background = config.filters.background.enabled,
        "starting pedtrack runner"
    );

    match pipeline::run(&config) {
        Ok(summary) => info!(
            frames = summary.frames,
            foreground_masks = summary.masks,
            "finished"
        ),
        Err(e) => {
            error!(error = %e, "run failed");
            std::process::exit(1);
        }
    }
}

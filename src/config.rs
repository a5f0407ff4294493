//! Config handling

use std::path::PathBuf;
use std::time::Duration;

use tracing::log::LevelFilter;

use crate::cli::CliOptions;
use crate::constants::{DEFAULT_MAX_PARALLEL_CALLS, RATE_LIMIT_COOLDOWN};
use crate::retry::RetryPolicy;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Knobs for one batch run.
#[derive(Clone, Debug)]
pub struct BatchSettings {
    /// How many items may be inside the network section at once
    pub max_parallel_calls: usize,
    /// Where generated PNGs are written
    pub image_dir: PathBuf,
    /// Where the CSV report is written
    pub report_dir: PathBuf,
    /// How long the rate-limit gate stays closed after a 429
    pub rate_limit_cooldown: Duration,
    /// Per-item retry behaviour
    pub retry: RetryPolicy,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_parallel_calls: DEFAULT_MAX_PARALLEL_CALLS,
            image_dir: PathBuf::from("./images"),
            report_dir: PathBuf::from("."),
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&CliOptions> for BatchSettings {
    fn from(cli: &CliOptions) -> Self {
        Self {
            max_parallel_calls: cli.max_parallel_calls.get(),
            image_dir: cli.image_dir.clone(),
            report_dir: cli.report_dir.clone(),
            ..Default::default()
        }
    }
}

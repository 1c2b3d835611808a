use tracing::Level;
use wsgate_core::config::{AppConfig, LoadOptions, LogFormat};

/// Logs go to stderr; stdout carries the command outcome only.
///
/// Falls back to defaults when the configuration does not load, so the command itself can
/// report the configuration error.
pub fn init() {
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    init_logging(&config);
}

pub fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

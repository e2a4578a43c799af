use log::LevelFilter;

/// Initializes the logger with the `env_logger` crate.
///
/// `RUST_LOG` takes precedence; otherwise the level is `info`, or `debug`
/// when verbose output was requested.
pub fn init_logger(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

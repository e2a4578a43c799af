//! Unit tests for the logging setup of the bridge.

use ams_han_mqtt::logging::init_logger;
use log::{debug, error, info, warn};

/// Tests that the logger can be initialized more than once without panicking.
#[test]
fn test_init_logger() {
    init_logger(false);
    init_logger(true);
}

/// Tests that the log macros work after initialization.
#[test]
fn test_logging() {
    init_logger(true);
    error!("This is an error message");
    warn!("This is a warning message");
    info!("This is an info message");
    debug!("This is a debug message");
}

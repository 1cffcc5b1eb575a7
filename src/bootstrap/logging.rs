//! Setup for the application logging.
//!
//! It redirects the tracing output to the standard output with the level
//! given on the command line (case is ignored):
//!
//! - `off` (i.e. don't load any subscriber)
//! - `error`
//! - `warn`
//! - `info` (the default)
//! - `debug`
//! - `trace`
use std::sync::Once;

use tracing::debug;
use tracing::level_filters::LevelFilter;

static INIT: Once = Once::new();

/// It redirects the tracing output to the standard output with the given
/// level.
///
/// # Panics
///
/// Panics if the level is not one of the recognised names.
pub fn setup(log_level: &str) {
    let filter = level_filter(log_level);

    if filter == LevelFilter::OFF {
        return;
    }

    INIT.call_once(|| {
        tracing_subscriber::fmt().with_max_level(filter).init();
        debug!("logging initialized.");
    });
}

fn level_filter(log_level: &str) -> LevelFilter {
    log_level.parse().unwrap_or_else(|_| {
        panic!(
            "
Error! Unrecognized `log_level`!

           Found:     {log_level:?}

But, the possible values are:
                    - `off`
                    - `error` (strongest)
                    - `warn`
    (default)  ---> - `info`
                    - `debug`
                    - `trace` (weakest)
"
        )
    })
}

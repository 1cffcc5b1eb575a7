//! Process setup shared by the two binaries: logging initialisation.
//!
//! Setup steps:
//!
//! 1. Parse the command line (config path, log level).
//! 2. Initialise logging.
//! 3. Load the configuration; a configuration failure is the only fatal
//!    startup error.
pub mod logging;

//! Stderr logger for the `ballpark` command.

use log::LevelFilter;
use std::io::Write;

/// Initialize logging to stderr.
///
/// The default level is Info (Debug with `verbose`); `RUST_LOG` overrides
/// both.
pub fn init_logger(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .try_init();
}

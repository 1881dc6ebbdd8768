//! Logging setup for the `kiln` binary.
//!
//! Library crates log through the `log` facade; this module installs the
//! `env_logger` backend. `RUST_LOG` takes precedence when set, otherwise the
//! level follows `--quiet` / `--verbose`.

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Initializes logging once at startup.
///
/// Levels: `--quiet` → error, default → info, `-v` → debug, `-vv` → trace.
pub fn init_logging(verbose: u8, quiet: bool) {
    let mut builder = Builder::new();

    if env::var_os("RUST_LOG").is_some() {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{} {}] {}",
            record.level(),
            record.module_path().unwrap_or("kiln"),
            record.args()
        )
    });

    // A second initialization (e.g. from tests) is harmless.
    let _ = builder.try_init();
}

fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

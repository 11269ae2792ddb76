//! Logger setup for binaries and tests embedding the crate.

use env_logger::Builder;
use log::{Level, LevelFilter};
use std::env;
use std::io::Write;

/// Initialize logging. Honors `RUST_LOG` when set, otherwise defaults to
/// `info` for this crate and `warn` for everything else.
pub fn init_logging() {
    let default_level = env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            // File and line only for the levels someone will actually chase down.
            if record.level() <= Level::Warn {
                writeln!(
                    buf,
                    "[{} {} {}:{}] {}",
                    timestamp,
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            } else {
                writeln!(buf, "[{} {}] {}", timestamp, record.level(), record.args())
            }
        })
        .filter_level(LevelFilter::Warn)
        .filter_module("datebook", default_level)
        .filter_module("sqlx", LevelFilter::Warn);

    if builder.try_init().is_err() {
        log::debug!("Logger was already initialized");
    }
}

/// Quiet logger for test binaries. Safe to call from every test.
pub fn init_test_logging() {
    let _ = Builder::new()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

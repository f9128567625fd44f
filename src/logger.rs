use log::{LevelFilter, Metadata, Record};

/// Logger implementation writing to the standard error stream.
struct StderrLogger;

impl log::Log for StderrLogger {
    /// Checks if the given log level is enabled.
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    /// Logs the record by printing it to stderr.
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    /// Flushes the logger (no-op: stderr is unbuffered line by line).
    fn flush(&self) {}
}

/// The logger instance used for all library diagnostics.
static LOGGER: StderrLogger = StderrLogger;

/// Installs the stderr logger at `Info` level.
///
/// Library diagnostics (usage errors, fatal system errors, lifecycle
/// messages) go through the `log` facade; without a logger they are
/// dropped. Host programs that already install their own logger can skip
/// this.
pub fn init() {
    init_with_level(LevelFilter::Info);
}

/// Installs the stderr logger with an explicit level cap.
///
/// Does nothing if some logger is already installed.
pub fn init_with_level(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

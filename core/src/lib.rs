//! Types, wire protocol and logger setup shared by the tilerealm crates.

use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Config, Root},
    encode::{pattern::PatternEncoder, Encode},
    filter::threshold::ThresholdFilter,
};
use std::{backtrace::Backtrace, env};

pub mod byte_operations;
pub mod constants;
pub mod protocol;
pub mod types;

/// Pattern shared by every appender.
const LOGGING_PATTERN: &str = "{d} {l} {f}:{L} - {m}\n";

fn backtraces_requested() -> bool {
    ["RUST_BACKTRACE", "RUST_LIB_BACKTRACE"]
        .iter()
        .any(|var| env::var_os(var).is_some())
}

/// Pattern encoder that appends a captured backtrace to error records when
/// `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE` is set.
#[derive(Debug)]
struct ErrorBacktraceEncoder {
    inner: PatternEncoder,
    capture: bool,
}

impl ErrorBacktraceEncoder {
    fn boxed() -> Box<Self> {
        Box::new(Self {
            inner: PatternEncoder::new(LOGGING_PATTERN),
            capture: backtraces_requested(),
        })
    }
}

impl Encode for ErrorBacktraceEncoder {
    fn encode(
        &self,
        w: &mut dyn log4rs::encode::Write,
        record: &log::Record<'_>,
    ) -> anyhow::Result<()> {
        if !self.capture || record.level() != log::Level::Error {
            return self.inner.encode(w, record);
        }

        let args = record.args();
        let trace = Backtrace::capture();
        // Temporaries from format_args! must live for the whole encode call.
        self.inner.encode(
            w,
            &log::Record::builder()
                .args(format_args!("{args}\nBacktrace:\n{trace}"))
                .level(record.level())
                .target(record.target())
                .module_path(record.module_path())
                .file(record.file())
                .line(record.line())
                .build(),
        )
    }
}

/// Install the process-wide logger.
///
/// Records at or above `log_level` go to stderr. When `file_path` is given
/// the same records are also appended to that file.
///
/// # Arguments
///
/// * `log_level` - Minimum level emitted by every appender.
/// * `file_path` - Optional log file; created if missing.
///
/// # Returns
///
/// * `Ok(())` once the logger is installed.
/// * `Err` if the file cannot be opened, the configuration is invalid, or a
///   logger was already installed.
pub fn initialize_logger(log_level: LevelFilter, file_path: Option<&str>) -> Result<(), String> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(ErrorBacktraceEncoder::boxed())
        .build();

    let mut config_builder = Config::builder().appender(
        Appender::builder()
            .filter(Box::new(ThresholdFilter::new(log_level)))
            .build("stderr", Box::new(stderr)),
    );
    let mut root = Root::builder().appender("stderr");

    if let Some(path) = file_path {
        let logfile = FileAppender::builder()
            .encoder(ErrorBacktraceEncoder::boxed())
            .build(path)
            .map_err(|e| format!("Failed to open log file {path}: {e}"))?;
        config_builder =
            config_builder.appender(Appender::builder().build("logfile", Box::new(logfile)));
        root = root.appender("logfile");
    }

    let config = config_builder
        .build(root.build(log_level))
        .map_err(|e| format!("Invalid logger configuration: {e}"))?;

    log4rs::init_config(config).map_err(|e| format!("Failed to install logger: {e}"))?;
    Ok(())
}

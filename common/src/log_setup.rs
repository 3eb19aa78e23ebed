use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming,
};

/// Starts the file + console logger.
///
/// `base_level` is a `log` spec string such as `"info"` or `"equalizer=debug"`;
/// `RUST_LOG` takes precedence when set. Keep the returned handle alive for the
/// lifetime of the program, dropping it flushes and stops the logger.
pub fn setup_logging(base_level: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str(base_level)?
        .log_to_file(FileSpec::default().directory("logs"))
        .duplicate_to_stderr(Duplicate::Warn)
        .duplicate_to_stdout(Duplicate::All)
        .rotate(
            Criterion::Size(1024 * 1024), //1MB
            Naming::Timestamps,
            Cleanup::KeepLogFiles(5),
        )
        .start()
}

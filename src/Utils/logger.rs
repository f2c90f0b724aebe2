use crate::Tabulation::tab_error::TabulationError;
use log::{LevelFilter, info};
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::File;

/// Terminal logger at `level`. With `log_file` the debug stream (hyperplanes refusing to
/// grow, balancing details) additionally goes to that file.
/// Fails if a logger has already been installed in this process.
pub fn init_logger(level: LevelFilter, log_file: Option<&str>) -> Result<(), TabulationError> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        let config = ConfigBuilder::new().set_time_format_rfc3339().build();
        loggers.push(WriteLogger::new(
            LevelFilter::Debug,
            config,
            File::create(path)?,
        ));
    }
    CombinedLogger::init(loggers)?;
    info!("logger initialized at level {}", level);
    Ok(())
}

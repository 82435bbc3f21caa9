use std::{
    error::Error,
    fs::OpenOptions,
    io,
    sync::Mutex,
};

use tracing::{warn, Level};
use tunnel_relay::args::StartupArguments;

fn max_level(startup_args: &StartupArguments) -> Level {
    if startup_args.silent {
        Level::ERROR
    } else if startup_args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Installs the global log subscriber, writing to the log file if one was requested or to
/// standard error otherwise.
pub fn init(startup_args: &StartupArguments) -> Result<(), Box<dyn Error + Send + Sync>> {
    let builder = tracing_subscriber::fmt().with_max_level(max_level(startup_args)).with_target(false);

    let path = match &startup_args.log_file {
        Some(path) => path,
        None => return builder.with_writer(io::stderr).try_init(),
    };

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).try_init(),
        Err(error) => {
            builder.with_writer(io::stderr).try_init()?;
            warn!("Failed to open log file {}, logging to standard error instead: {error}", path.display());
            Ok(())
        }
    }
}

use std::path::PathBuf;

use crate::config::ServerConfig;

mod parser;
mod values;

pub use parser::*;
pub use values::*;

/// Gets a small string with this program's name and version.
pub fn get_version_string() -> String {
    format!(
        concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"), " ({} {})"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Gets a string with this program's help documentation.
pub fn get_help_string() -> &'static str {
    concat!(
        "Usage: ",
        env!("CARGO_PKG_NAME"),
        " [options...]\n",
        "Options:\n",
        "  -h, --help                 Display this help menu and exit\n",
        "  -V, --version              Display the version number and exit\n",
        "  -v, --verbose              Display additional information while running\n",
        "  -s, --silent               Only display errors while running\n",
        "  -l, --log-file <path>      Append the log to this file instead of standard error\n",
        "  -a, --address <ipv4>       The address to listen at (default 127.0.0.1)\n",
        "  -p, --port <port>          The port to listen at (default 65000)\n",
        "  -n, --nconnections <count> The maximum amount of simultaneous connections (default 60)\n",
        "  --host-buffer <bytes>      The largest frame a host may send (default 150000)\n",
        "  --target-buffer <bytes>    The largest frame a target may send (default 1000)\n",
        "  --write-timeout <ms>       How long a write to a peer may take (default 5000)\n",
        "\n",
        "Examples:\n",
        "  Listen at 0.0.0.0:7000 with room for 200 connections:\n",
        "    tunnel-relay -a 0.0.0.0 -p 7000 -n 200\n",
    )
}

/// The result of parsing the program's arguments.
#[derive(Debug, PartialEq)]
pub enum ArgumentsRequest {
    /// Print the help menu to stdout and exit.
    Help,

    /// Print this program's version to stdout and exit.
    Version,

    /// Run with the provided arguments.
    Run(StartupArguments),
}

/// Specifies the information on how the program should run.
#[derive(Debug, PartialEq)]
pub struct StartupArguments {
    /// Whether to log additional information.
    pub verbose: bool,

    /// Whether to only log errors.
    pub silent: bool,

    /// A file to append the log to, instead of standard error.
    pub log_file: Option<PathBuf>,

    /// How to run the server.
    pub server_config: ServerConfig,
}

impl StartupArguments {
    pub fn new() -> Self {
        Self {
            verbose: false,
            silent: false,
            log_file: None,
            server_config: ServerConfig::default(),
        }
    }
}

impl Default for StartupArguments {
    fn default() -> Self {
        Self::new()
    }
}

use std::{env, process::exit};

use tracing::{debug, error, info, warn};
use tunnel_relay::{
    args::{self, ArgumentsRequest, StartupArguments},
    server::{RelayServer, StartError},
};

mod logging;

fn main() {
    let arguments = match args::parse_arguments(env::args()) {
        Err(err) => {
            eprintln!("{err}\n\nType 'tunnel-relay --help' for a help menu");
            exit(1);
        }
        Ok(arguments) => arguments,
    };

    let startup_args = match arguments {
        ArgumentsRequest::Version => {
            println!("{}", args::get_version_string());
            return;
        }
        ArgumentsRequest::Help => {
            println!("{}", args::get_help_string());
            return;
        }
        ArgumentsRequest::Run(startup_args) => startup_args,
    };

    if let Err(err) = logging::init(&startup_args) {
        eprintln!("Failed to set up logging: {err}");
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start Tokio runtime: {err}");
            exit(1);
        }
    };

    if let Err(error) = runtime.block_on(async_main(startup_args)) {
        error!("{error}");
        exit(1);
    }
}

async fn async_main(startup_args: StartupArguments) -> Result<(), StartError> {
    debug!("Startup arguments: {startup_args:?}");

    let server = RelayServer::bind(&startup_args.server_config)?;
    let handle = server.handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        handle.stop().await;
    });

    server.run().await;
    Ok(())
}

async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {error}");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(error) => {
            warn!("Failed to listen for SIGTERM: {error}");
            ctrl_c().await;
            info!("Received Ctrl-C");
            return;
        }
    };

    tokio::select! {
        _ = ctrl_c() => info!("Received Ctrl-C"),
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
    info!("Received Ctrl-C");
}

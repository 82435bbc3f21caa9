//! The relay server: the accept loop and the per-connection handlers.

mod connection;
mod receive;
mod relay;
mod run;
mod shutdown;

pub use connection::Registry;
pub use run::{RelayServer, ServerHandle, StartError};

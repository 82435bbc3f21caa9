//! A rendezvous relay: a host opens a session, a target joins it by ID, and the server forwards
//! frames between the two until either leaves.

pub mod args;
pub mod config;
pub mod registry;
pub mod server;
pub mod session;
mod utils;

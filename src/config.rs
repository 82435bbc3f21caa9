use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    num::NonZeroU16,
    time::Duration,
};

use tunnel_relay_proto::HEADER_SIZE;

/// The default address to listen at.
pub const DEFAULT_ADDRESS: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// The default port to listen at.
pub const DEFAULT_PORT: u16 = 65000;

/// The default maximum amount of simultaneous client connections.
pub const DEFAULT_MAX_CLIENTS: NonZeroU16 = match NonZeroU16::new(60) {
    Some(value) => value,
    None => panic!("DEFAULT_MAX_CLIENTS must not be zero"),
};

/// The default size of a host leg's receive buffer. This bounds the largest frame a host can send.
pub const DEFAULT_HOST_BUFFER_SIZE: usize = 150000;

/// The default size of a target leg's receive buffer. Targets only send control frames and small
/// payloads, so their buffer is much smaller than a host's.
pub const DEFAULT_TARGET_BUFFER_SIZE: usize = 1000;

/// The default limit on how long a single write to a peer may take.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(5000);

/// The smallest receive buffer allowed. A buffer must hold a full header without being filled by
/// it, as a receive that fills the buffer is taken as truncated.
pub const MIN_BUFFER_SIZE: usize = HEADER_SIZE + 1;

/// Everything the relay server needs to know to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// The IPv4 address to listen at.
    pub address: Ipv4Addr,

    /// The port to listen at. Zero lets the OS pick one.
    pub port: u16,

    /// The maximum amount of simultaneous client connections. This is also the listen backlog and
    /// the capacity of the session registry.
    pub max_clients: NonZeroU16,

    /// The size of a host leg's receive buffer.
    pub host_buffer_size: usize,

    /// The size of a target leg's receive buffer, also used for the first frame of every
    /// connection.
    pub target_buffer_size: usize,

    /// How long a single write to a peer may take before it's given up on.
    pub write_timeout: Duration,
}

impl ServerConfig {
    pub const fn new(address: Ipv4Addr, port: u16, max_clients: NonZeroU16) -> Self {
        Self {
            address,
            port,
            max_clients,
            host_buffer_size: DEFAULT_HOST_BUFFER_SIZE,
            target_buffer_size: DEFAULT_TARGET_BUFFER_SIZE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// The socket address to listen at.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS, DEFAULT_PORT, DEFAULT_MAX_CLIENTS)
    }
}

/// The subset of [`ServerConfig`] the connection handlers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegConfig {
    pub host_buffer_size: usize,
    pub target_buffer_size: usize,
    pub write_timeout: Duration,
}

impl LegConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            host_buffer_size: config.host_buffer_size.max(MIN_BUFFER_SIZE),
            target_buffer_size: config.target_buffer_size.max(MIN_BUFFER_SIZE),
            write_timeout: config.write_timeout,
        }
    }
}

impl Default for LegConfig {
    fn default() -> Self {
        Self::from_server_config(&ServerConfig::default())
    }
}

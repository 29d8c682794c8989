//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use parlor_protocol::DEFAULT_PORT;

/// Where the server listens.
///
/// # Example
///
/// ```rust
/// use parlord::config::ServerConfig;
///
/// let config = ServerConfig {
///     port: 4000,
///     ..Default::default()
/// };
/// assert_eq!(config.socket_addr().port(), 4000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind: IpAddr,

    /// TCP port; 0 lets the OS pick one.
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Loopback on an OS-assigned port.
    pub fn ephemeral() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

/*! Addresses of the services and hop timeout.

Relay `n` listens on `base_relay_port + n`, user `u` listens on
`base_user_port + u`. Identifiers are in range `0..MAX_ID`.
*/

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::Range;
use std::time::Duration;

use thiserror::Error;

/// Upper bound (exclusive) of relay and user identifiers.
pub const MAX_ID: u32 = 1000;

/// Default port of the registry.
pub const DEFAULT_REGISTRY_PORT: u16 = 8080;

/// Default port of relay `0`.
pub const DEFAULT_BASE_RELAY_PORT: u16 = 4000;

/// Default port of user `0`.
pub const DEFAULT_BASE_USER_PORT: u16 = 3000;

/// Default time to wait for the next hop.
pub const DEFAULT_HOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Error that can happen when validating `PortLayout`.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    /// Range of ports doesn't fit `u16`.
    #[error("Port range of {name} starting at {base} doesn't fit {} ids", MAX_ID)]
    RangeOverflow {
        /// Name of the range.
        name: &'static str,
        /// First port of the range.
        base: u16,
    },
    /// Relay and user port ranges overlap.
    #[error("Relay ports {relays:?} overlap user ports {users:?}")]
    Overlap {
        /// Relay port range.
        relays: Range<u32>,
        /// User port range.
        users: Range<u32>,
    },
    /// Registry port is inside relay or user port range.
    #[error("Registry port {0} collides with relay or user ports")]
    RegistryPortCollision(u16),
    /// Hop timeout is zero.
    #[error("Hop timeout must be positive")]
    ZeroHopTimeout,
}

/// Hop a destination port belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Hop {
    /// Relay with this node id.
    Relay(u32),
    /// User with this user id.
    User(u32),
}

/// Ports of the registry, relays and users.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PortLayout {
    /// Port of the registry.
    pub registry_port: u16,
    /// Port of relay `0`.
    pub base_relay_port: u16,
    /// Port of user `0`.
    pub base_user_port: u16,
}

impl Default for PortLayout {
    fn default() -> Self {
        PortLayout {
            registry_port: DEFAULT_REGISTRY_PORT,
            base_relay_port: DEFAULT_BASE_RELAY_PORT,
            base_user_port: DEFAULT_BASE_USER_PORT,
        }
    }
}

fn id_range(base: u16) -> Range<u32> {
    u32::from(base)..u32::from(base) + MAX_ID
}

fn port_for(base: u16, id: u32) -> Option<u16> {
    if id >= MAX_ID {
        return None;
    }
    u16::try_from(u32::from(base) + id).ok()
}

impl PortLayout {
    /** Check that every relay and user id maps to its own port.

    Returns `Error` in case of failure:

    - relay or user range doesn't fit `u16`
    - relay and user ranges overlap
    - registry port is inside one of the ranges
    */
    pub fn validate(&self) -> Result<(), ConfigError> {
        let relays = id_range(self.base_relay_port);
        let users = id_range(self.base_user_port);

        if relays.end > u32::from(u16::MAX) + 1 {
            return Err(ConfigError::RangeOverflow { name: "relays", base: self.base_relay_port });
        }
        if users.end > u32::from(u16::MAX) + 1 {
            return Err(ConfigError::RangeOverflow { name: "users", base: self.base_user_port });
        }
        if relays.start < users.end && users.start < relays.end {
            return Err(ConfigError::Overlap { relays, users });
        }
        let registry_port = u32::from(self.registry_port);
        if relays.contains(&registry_port) || users.contains(&registry_port) {
            return Err(ConfigError::RegistryPortCollision(self.registry_port));
        }
        Ok(())
    }

    /// Port of relay `node_id`.
    pub fn relay_port(&self, node_id: u32) -> Option<u16> {
        port_for(self.base_relay_port, node_id)
    }

    /// Port of user `user_id`.
    pub fn user_port(&self, user_id: u32) -> Option<u16> {
        port_for(self.base_user_port, user_id)
    }

    /// Find out whether `port` belongs to a relay or to a user.
    pub fn classify(&self, port: u16) -> Option<Hop> {
        let port = u32::from(port);
        if id_range(self.base_relay_port).contains(&port) {
            Some(Hop::Relay(port - u32::from(self.base_relay_port)))
        } else if id_range(self.base_user_port).contains(&port) {
            Some(Hop::User(port - u32::from(self.base_user_port)))
        } else {
            None
        }
    }
}

/// Everything a service needs to reach the other ones.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NetworkConfig {
    /// Host all services listen on.
    pub host: IpAddr,
    /// Ports of the services.
    pub ports: PortLayout,
    /// Time to wait for the next hop, the registry or the first relay.
    pub hop_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ports: PortLayout::default(),
            hop_timeout: DEFAULT_HOP_TIMEOUT,
        }
    }
}

impl NetworkConfig {
    /// Validate port layout and timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hop_timeout.is_zero() {
            return Err(ConfigError::ZeroHopTimeout);
        }
        self.ports.validate()
    }

    /// Address of the service listening on `port`.
    pub fn addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.host, port)
    }

    /// Address of the registry.
    pub fn registry_addr(&self) -> SocketAddr {
        self.addr(self.ports.registry_port)
    }

    /// Address of relay `node_id`.
    pub fn relay_addr(&self, node_id: u32) -> Option<SocketAddr> {
        self.ports.relay_port(node_id).map(|port| self.addr(port))
    }

    /// Address of user `user_id`.
    pub fn user_addr(&self, user_id: u32) -> Option<SocketAddr> {
        self.ports.user_port(user_id).map(|port| self.addr(port))
    }

    /// Time a client should wait for a user to answer `SendMessage`: the
    /// user's registry lookup and its call to the entry relay, plus one hop
    /// to reach the user.
    pub fn send_timeout(&self) -> Duration {
        self.hop_timeout * 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid() {
        assert_eq!(NetworkConfig::default().validate(), Ok(()));
    }

    #[test]
    fn ports() {
        let ports = PortLayout::default();
        assert_eq!(ports.relay_port(2), Some(4002));
        assert_eq!(ports.user_port(7), Some(3007));
        assert_eq!(ports.relay_port(MAX_ID), None);
        assert_eq!(ports.user_port(MAX_ID - 1), Some(3999));
    }

    #[test]
    fn classify() {
        let ports = PortLayout::default();
        assert_eq!(ports.classify(4000), Some(Hop::Relay(0)));
        assert_eq!(ports.classify(4999), Some(Hop::Relay(999)));
        assert_eq!(ports.classify(3007), Some(Hop::User(7)));
        assert_eq!(ports.classify(5000), None);
        assert_eq!(ports.classify(2999), None);
        assert_eq!(ports.classify(8080), None);
    }

    #[test]
    fn overlap() {
        let ports = PortLayout { registry_port: 8080, base_relay_port: 3500, base_user_port: 3000 };
        assert!(matches!(ports.validate(), Err(ConfigError::Overlap { .. })));
    }

    #[test]
    fn range_overflow() {
        let ports = PortLayout { registry_port: 8080, base_relay_port: 65000, base_user_port: 3000 };
        assert_eq!(ports.validate(), Err(ConfigError::RangeOverflow { name: "relays", base: 65000 }));
        assert_eq!(ports.relay_port(535), Some(65535));
        assert_eq!(ports.relay_port(536), None);
    }

    #[test]
    fn registry_port_collision() {
        let ports = PortLayout { registry_port: 3500, ..PortLayout::default() };
        assert_eq!(ports.validate(), Err(ConfigError::RegistryPortCollision(3500)));
    }

    #[test]
    fn send_timeout() {
        let config = NetworkConfig {
            hop_timeout: Duration::from_millis(100),
            ..NetworkConfig::default()
        };
        assert_eq!(config.send_timeout(), Duration::from_millis(300));
    }

    #[test]
    fn zero_timeout() {
        let config = NetworkConfig { hop_timeout: Duration::from_secs(0), ..NetworkConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroHopTimeout));
    }

    #[test]
    fn addresses() {
        let config = NetworkConfig::default();
        assert_eq!(config.registry_addr(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.relay_addr(1), Some("127.0.0.1:4001".parse().unwrap()));
        assert_eq!(config.user_addr(1), Some("127.0.0.1:3001".parse().unwrap()));
    }
}

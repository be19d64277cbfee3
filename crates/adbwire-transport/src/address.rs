use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Port a network-attached daemon listens on when none is given.
pub const DEFAULT_DAEMON_PORT: u16 = 5555;

/// Address of a network-attached daemon: `host[:port]`.
///
/// Hosts are kept as written (no resolution at parse time) so two callers
/// naming the same daemon the same way share one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DaemonAddress {
    host: String,
    port: u16,
}

impl DaemonAddress {
    /// Create an address from parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "address must not be empty"));
        }

        if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid(input, "missing closing ']'"))?;
            if host.is_empty() {
                return Err(invalid(input, "empty host"));
            }
            let port = match tail {
                "" => DEFAULT_DAEMON_PORT,
                _ => {
                    let port = tail
                        .strip_prefix(':')
                        .ok_or_else(|| invalid(input, "expected ':' after ']'"))?;
                    parse_port(input, port)?
                }
            };
            return Ok(Self::new(host, port));
        }

        // A bare IPv6 literal has more than one ':' and no brackets.
        if trimmed.matches(':').count() > 1 {
            return Ok(Self::new(trimmed, DEFAULT_DAEMON_PORT));
        }

        match trimmed.split_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(invalid(input, "empty host"));
                }
                Ok(Self::new(host, parse_port(input, port)?))
            }
            None => Ok(Self::new(trimmed, DEFAULT_DAEMON_PORT)),
        }
    }

    /// Host part as written.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to concrete socket addresses.
    pub fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                address: self.to_string(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(TransportError::Resolve {
                address: self.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no socket addresses resolved",
                ),
            });
        }
        Ok(addrs)
    }
}

impl fmt::Display for DaemonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for DaemonAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<SocketAddr> for DaemonAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

fn parse_port(input: &str, port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(0) => Err(invalid(input, "port must be greater than zero")),
        Ok(port) => Ok(port),
        Err(_) => Err(invalid(input, &format!("invalid port '{port}'"))),
    }
}

fn invalid(input: &str, reason: &str) -> TransportError {
    TransportError::InvalidAddress {
        address: input.to_string(),
        reason: reason.to_string(),
    }
}

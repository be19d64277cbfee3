use std::net::TcpStream;
use std::time::Duration;

use tracing::debug;

use crate::address::DaemonAddress;
use crate::error::{Result, TransportError};
use crate::stream::DaemonStream;

/// TCP transport to a network-attached daemon.
pub struct TcpTransport;

impl TcpTransport {
    /// Connect to a daemon (blocking).
    ///
    /// With a timeout, every resolved socket address is tried in turn with
    /// that per-attempt bound; the last failure is reported.
    pub fn connect(address: &DaemonAddress, timeout: Option<Duration>) -> Result<DaemonStream> {
        let candidates = address.resolve()?;

        let mut last_err = None;
        for candidate in candidates {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&candidate, timeout),
                None => TcpStream::connect(candidate),
            };
            match attempt {
                Ok(stream) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!(%address, error = %err, "failed to set TCP_NODELAY");
                    }
                    debug!(%address, resolved = %candidate, "connected to daemon");
                    return Ok(DaemonStream::from_tcp(stream));
                }
                Err(err) => {
                    debug!(%address, resolved = %candidate, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(TransportError::Connect {
            address: address.to_string(),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no address to connect to")
            }),
        })
    }

    /// Transport name for diagnostics.
    pub fn transport_name() -> &'static str {
        "tcp"
    }
}

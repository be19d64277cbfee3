//! TCP transport to a network-attached ADB daemon.
//!
//! This is the lowest layer of adbwire. It knows how to parse a daemon
//! address, open a socket to it and hand out a [`DaemonStream`]; it knows
//! nothing about frames. Everything else builds on the stream type provided
//! here.

pub mod address;
pub mod error;
pub mod stream;
pub mod tcp;

pub use address::{DaemonAddress, DEFAULT_DAEMON_PORT};
pub use error::{Result, TransportError};
pub use stream::DaemonStream;
pub use tcp::TcpTransport;

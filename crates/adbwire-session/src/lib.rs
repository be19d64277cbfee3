//! ADB connections and multiplexed logical streams.
//!
//! This is the stateful layer over the frame codec. A [`Connection`] owns one
//! socket to one daemon, performs the CNXN handshake and runs a single
//! dispatch thread that routes inbound frames to [`LogicalStream`]s. Streams
//! are opened by destination (`shell:ls`, `sync:`) and read and written as
//! ordinary byte streams with one-write-in-flight flow control. A
//! [`Registry`] shares connections between independent callers.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod connection;
pub mod error;
pub mod handshake;
pub mod reader;
pub mod registry;
pub mod shell;
pub mod stream;
pub mod sync;
pub mod writer;

pub use adbwire_transport::{DaemonAddress, DEFAULT_DAEMON_PORT};
pub use connection::{connect_with_timeout, CallbackId, Connection, ConnectionConfig};
pub use error::{Result, SessionError};
pub use handshake::{handshake_client, DeviceBanner, HandshakeConfig, HandshakeResult, HOST_IDENTITY};
pub use reader::{Lines, StreamReader};
pub use registry::{Holder, Registry};
pub use shell::{fold_crlf, png_dimensions};
pub use stream::LogicalStream;
pub use writer::{StreamWriter, DEFAULT_WRITE_CAPACITY};

/// Lock a mutex, recovering the guard if another thread panicked while
/// holding it. Every guarded value here is left consistent between
/// statements, so the data is still valid.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

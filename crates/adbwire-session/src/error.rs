use std::time::Duration;

use adbwire_frame::FrameError;
use adbwire_transport::TransportError;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The connection was closed locally or by the daemon.
    #[error("connection to {address} is closed")]
    ConnectionClosed { address: String },

    /// An operation was attempted on a closed logical stream.
    #[error("stream closed (address {address}, local id {local_id}, remote id {remote_id}, destination '{destination}')")]
    StreamClosed {
        address: String,
        local_id: u32,
        remote_id: u32,
        destination: String,
    },

    /// Writing a frame to the daemon failed.
    #[error("failed to send to {address}: {source}")]
    Send {
        address: String,
        #[source]
        source: FrameError,
    },

    /// Writing a stream's data to the daemon failed.
    #[error("failed to send on stream (address {address}, local id {local_id}, remote id {remote_id}, destination '{destination}'): {source}")]
    StreamSend {
        address: String,
        local_id: u32,
        remote_id: u32,
        destination: String,
        #[source]
        source: FrameError,
    },

    /// A bounded wait expired.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Local I/O outside the wire (source files, output sinks).
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The daemon rejected a file push.
    #[error("push to '{remote_path}' failed: {message}")]
    SyncFailed {
        remote_path: String,
        message: String,
    },

    /// A screenshot had different dimensions than required.
    #[error("unexpected screen size: expected {expected_width}x{expected_height}, got {width}x{height}")]
    UnexpectedScreenSize {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    /// Screenshot bytes were not a PNG image.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A shell command produced output that could not be interpreted.
    #[error("unexpected output from '{command}': {output:?}")]
    UnexpectedOutput { command: String, output: String },

    /// A background worker ended without reporting a result.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl SessionError {
    /// True for failures that end the whole connection, as opposed to one
    /// stream or one operation.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Transport(_)
                | SessionError::Frame(_)
                | SessionError::HandshakeFailed(_)
                | SessionError::ConnectionClosed { .. }
                | SessionError::Send { .. }
                | SessionError::StreamSend { .. }
        )
    }
}

impl From<SessionError> for std::io::Error {
    fn from(err: SessionError) -> Self {
        let kind = match &err {
            SessionError::StreamClosed { .. } | SessionError::ConnectionClosed { .. } => {
                std::io::ErrorKind::BrokenPipe
            }
            SessionError::Timeout { .. } => std::io::ErrorKind::TimedOut,
            SessionError::Io { source, .. } => source.kind(),
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

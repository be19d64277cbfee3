use std::fmt;
use std::io;

use adbwire_frame::FrameError;
use adbwire_session::SessionError;
use adbwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::InvalidAddress { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Connect { ref source, .. } if source.kind() == io::ErrorKind::TimedOut => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed | FrameError::Truncated { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::Send { source, .. } => frame_error(context, source),
        SessionError::StreamSend {
            local_id,
            destination,
            source,
            ..
        } => frame_error(&format!("{context} (stream {local_id} '{destination}')"), source),
        SessionError::Io { context: inner, source } => io_error(&format!("{context}: {inner}"), source),
        SessionError::HandshakeFailed(_)
        | SessionError::ConnectionClosed { .. }
        | SessionError::StreamClosed { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        SessionError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        SessionError::UnexpectedScreenSize { .. }
        | SessionError::InvalidImage(_)
        | SessionError::UnexpectedOutput { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SessionError::SyncFailed { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The input ended in the middle of a frame.
    #[error("truncated frame ({received} of {expected} bytes)")]
    Truncated { expected: usize, received: usize },
}

impl FrameError {
    /// True when the peer went away between frames (no data lost).
    pub fn is_clean_close(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

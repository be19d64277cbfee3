/// Errors that can occur in daemon transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The daemon address string could not be parsed.
    #[error("invalid daemon address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The daemon address did not resolve to any socket address.
    #[error("failed to resolve {address}: {source}")]
    Resolve {
        address: String,
        source: std::io::Error,
    },

    /// Failed to connect to the daemon.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

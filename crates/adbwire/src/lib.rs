//! ADB wire-protocol client.
//!
//! adbwire talks to an Android debug daemon over TCP without the `adb`
//! host server: it frames and unframes ADB messages, multiplexes logical
//! streams over one connection with per-stream flow control, and builds
//! device operations (shell, screencap, push, input) on top.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP transport and daemon addresses
//! - [`frame`]: the 24-byte-header ADB frame codec
//! - [`session`]: connections, logical streams, the shared registry and
//!   device operations (behind the `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use adbwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use adbwire_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use adbwire_session::*;
}

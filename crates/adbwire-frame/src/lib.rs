//! ADB wire frame codec.
//!
//! Every message on the wire is a 24-byte header of six little-endian
//! 32-bit words followed by the payload:
//! - command tag (packed 4-byte ASCII such as `CNXN`, `OPEN`, `WRTE`)
//! - two command arguments
//! - payload length
//! - additive payload checksum
//! - magic, the bitwise complement of the command
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod command;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    checksum, decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_INBOUND_PAYLOAD,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use command::{
    Command, A_AUTH, A_CLSE, A_CNXN, A_OKAY, A_OPEN, A_SYNC, A_VERSION, A_WRTE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

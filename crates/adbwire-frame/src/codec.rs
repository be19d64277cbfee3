use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::command::{Command, A_AUTH, A_CLSE, A_CNXN, A_OKAY, A_OPEN, A_WRTE};
use crate::error::{FrameError, Result};

/// Frame header: six little-endian u32 words.
pub const HEADER_SIZE: usize = 24;

/// Maximum payload this engine declares in CNXN and emits per frame.
pub const DEFAULT_MAX_PAYLOAD: usize = 4096;

/// Largest inbound payload accepted before the stream is considered corrupt.
pub const DEFAULT_MAX_INBOUND_PAYLOAD: usize = 1024 * 1024;

/// Short text payloads are previewed inline in `Display` output.
const PREVIEW_LIMIT: usize = 48;

/// One header-plus-payload unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw command tag (see [`Command`]).
    pub command: u32,
    /// First argument.
    pub arg0: u32,
    /// Second argument.
    pub arg1: u32,
    /// Additive checksum as carried on the wire.
    pub checksum: u32,
    /// Magic as carried on the wire.
    pub magic: u32,
    /// The payload; its length is the header's length field.
    pub payload: Bytes,
}

/// Sum of payload bytes, truncated to 32 bits.
///
/// This is the daemon's historical "crc32" field: an additive sum, not a
/// CRC. It is emitted on every frame and never checked on receive.
pub fn checksum(payload: &[u8]) -> u32 {
    payload
        .iter()
        .fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
}

impl Frame {
    /// Create a frame with checksum and magic derived from the payload.
    pub fn new(command: u32, arg0: u32, arg1: u32, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            command,
            arg0,
            arg1,
            checksum: checksum(&payload),
            magic: !command,
            payload,
        }
    }

    /// `CNXN(version, maxdata, identity)`.
    pub fn cnxn(version: u32, max_payload: u32, identity: impl Into<Bytes>) -> Self {
        Self::new(A_CNXN, version, max_payload, identity)
    }

    /// `AUTH(kind, 0, data)`.
    pub fn auth(kind: u32, data: impl Into<Bytes>) -> Self {
        Self::new(A_AUTH, kind, 0, data)
    }

    /// `OPEN(local-id, 0, "destination\0")`.
    ///
    /// The destination is NUL-terminated if it is not already.
    pub fn open(local_id: u32, destination: &str) -> Self {
        let mut payload = BytesMut::with_capacity(destination.len() + 1);
        payload.put_slice(destination.as_bytes());
        if !destination.ends_with('\0') {
            payload.put_u8(0);
        }
        Self::new(A_OPEN, local_id, 0, payload.freeze())
    }

    /// `OKAY(local-id, remote-id)`.
    pub fn okay(local_id: u32, remote_id: u32) -> Self {
        Self::new(A_OKAY, local_id, remote_id, Bytes::new())
    }

    /// `WRTE(local-id, remote-id, data)`.
    pub fn wrte(local_id: u32, remote_id: u32, data: impl Into<Bytes>) -> Self {
        Self::new(A_WRTE, local_id, remote_id, data)
    }

    /// `CLSE(local-id, remote-id)`.
    pub fn clse(local_id: u32, remote_id: u32) -> Self {
        Self::new(A_CLSE, local_id, remote_id, Bytes::new())
    }

    /// The known command, if the tag is one.
    pub fn kind(&self) -> Option<Command> {
        Command::from_u32(self.command)
    }

    /// Payload length as carried in the header.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True if the frame has no payload.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Whether `magic` is the complement of `command`.
    pub fn has_valid_magic(&self) -> bool {
        self.magic == !self.command
    }

    /// Whether `checksum` matches the payload.
    pub fn has_valid_checksum(&self) -> bool {
        self.checksum == checksum(&self.payload)
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all words little-endian):
/// ```text
/// ┌─────────┬──────┬──────┬────────┬──────────┬───────┬──────────────────┐
/// │ command │ arg0 │ arg1 │ length │ checksum │ magic │ payload (length) │
/// │  (4B)   │ (4B) │ (4B) │  (4B)  │   (4B)   │ (4B)  │                  │
/// └─────────┴──────┴──────┴────────┴──────────┴───────┴──────────────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let len = frame.payload.len();
    if len > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + len);
    dst.put_u32_le(frame.command);
    dst.put_u32_le(frame.arg0);
    dst.put_u32_le(frame.arg1);
    dst.put_u32_le(len as u32);
    dst.put_u32_le(frame.checksum);
    dst.put_u32_le(frame.magic);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. Checksum and magic
/// are carried through as received, not validated.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let mut header = &src[..HEADER_SIZE];
    let command = header.get_u32_le();
    let arg0 = header.get_u32_le();
    let arg1 = header.get_u32_le();
    let payload_len = header.get_u32_le() as usize;
    let checksum = header.get_u32_le();
    let magic = header.get_u32_le();

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        command,
        arg0,
        arg1,
        checksum,
        magic,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload the writer emits. Default: 4096.
    pub max_payload_size: usize,
    /// Largest payload the reader accepts. Default: 1 MiB.
    pub max_inbound_payload: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_inbound_payload: DEFAULT_MAX_INBOUND_PAYLOAD,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(Command::Cnxn) => write!(
                f,
                "CNXN(version={:#010x}, maxdata={}, identity={})",
                self.arg0,
                self.arg1,
                Preview(&self.payload)
            ),
            Some(Command::Auth) => write!(f, "AUTH(type={}, len={})", self.arg0, self.len()),
            Some(Command::Open) => write!(
                f,
                "OPEN(local={}, destination={})",
                self.arg0,
                Preview(&self.payload)
            ),
            Some(Command::Okay) => write!(f, "OKAY(local={}, remote={})", self.arg0, self.arg1),
            Some(Command::Clse) => write!(f, "CLSE(local={}, remote={})", self.arg0, self.arg1),
            Some(Command::Wrte) if self.len() <= PREVIEW_LIMIT => write!(
                f,
                "WRTE(remote={}, data={})",
                self.arg1,
                Preview(&self.payload)
            ),
            Some(Command::Wrte) => write!(f, "WRTE(remote={}, len={})", self.arg1, self.len()),
            Some(Command::Sync) => write!(f, "SYNC(online={}, sequence={})", self.arg0, self.arg1),
            None => write!(
                f,
                "{:#010x}(arg0={}, arg1={}, len={})",
                self.command,
                self.arg0,
                self.arg1,
                self.len()
            ),
        }
    }
}

/// Quoted, escaped rendering of a short payload.
struct Preview<'a>(&'a [u8]);

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(PREVIEW_LIMIT)];
        write!(f, "\"{}\"", shown.escape_ascii())?;
        if self.0.len() > PREVIEW_LIMIT {
            write!(f, "…+{}", self.0.len() - PREVIEW_LIMIT)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::A_VERSION;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let frame = Frame::wrte(3, 9, Bytes::from_static(b"hello, adb!"));

        encode_frame(&frame, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + frame.len());

        let decoded = decode_frame(&mut buf, DEFAULT_MAX_INBOUND_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_layout_is_little_endian() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::okay(7, 1), &mut buf).unwrap();

        assert_eq!(&buf[0..4], b"OKAY");
        assert_eq!(&buf[4..8], &7u32.to_le_bytes());
        assert_eq!(&buf[8..12], &1u32.to_le_bytes());
        assert_eq!(&buf[12..16], &0u32.to_le_bytes());
        assert_eq!(&buf[16..20], &0u32.to_le_bytes());
        assert_eq!(&buf[20..24], &(!A_OKAY).to_le_bytes());
    }

    #[test]
    fn test_checksum_and_magic_invariants() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let frame = Frame::wrte(1, 2, payload.clone());

        let expected: u32 = payload.iter().map(|&b| u32::from(b)).sum();
        assert_eq!(frame.checksum, expected);
        assert_eq!(frame.magic, !A_WRTE);
        assert!(frame.has_valid_checksum());
        assert!(frame.has_valid_magic());
    }

    #[test]
    fn test_checksum_wraps() {
        // 0xff * 16_843_010 overflows u32 once.
        let len = 16_843_010usize;
        let sum = checksum(&vec![0xff; len]);
        assert_eq!(sum, (0xffu64 * len as u64 % (1u64 << 32)) as u32);
    }

    #[test]
    fn test_cnxn_constructor() {
        let frame = Frame::cnxn(A_VERSION, DEFAULT_MAX_PAYLOAD as u32, "host::\0");
        assert_eq!(frame.kind(), Some(Command::Cnxn));
        assert_eq!(frame.arg0, 0x0100_0000);
        assert_eq!(frame.arg1, 4096);
        assert_eq!(frame.payload.as_ref(), b"host::\0");
    }

    #[test]
    fn test_open_terminates_destination() {
        let frame = Frame::open(1, "shell:echo hi");
        assert_eq!(frame.payload.as_ref(), b"shell:echo hi\0");
        assert_eq!(frame.arg1, 0);

        let frame = Frame::open(2, "sync:\0");
        assert_eq!(frame.payload.as_ref(), b"sync:\0");
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&b"CNXN\x00"[..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_INBOUND_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::wrte(1, 1, "hello"), &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2); // Truncate payload

        let result = decode_frame(&mut buf, DEFAULT_MAX_INBOUND_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_does_not_validate_checksum_or_magic() {
        let mut frame = Frame::wrte(1, 1, "data");
        frame.checksum = 0;
        frame.magic = 0;
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();

        let decoded = decode_frame(&mut buf, DEFAULT_MAX_INBOUND_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.checksum, 0);
        assert_eq!(decoded.magic, 0);
        assert_eq!(decoded.payload.as_ref(), b"data");
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(A_WRTE);
        buf.put_u32_le(0);
        buf.put_u32_le(1);
        buf.put_u32_le(64 * 1024 * 1024);
        buf.put_u32_le(0);
        buf.put_u32_le(!A_WRTE);

        let result = decode_frame(&mut buf, DEFAULT_MAX_INBOUND_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::okay(7, 1), &mut buf).unwrap();
        encode_frame(&Frame::wrte(7, 1, "hi\n"), &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_INBOUND_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f1.kind(), Some(Command::Okay));

        let f2 = decode_frame(&mut buf, DEFAULT_MAX_INBOUND_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f2.kind(), Some(Command::Wrte));
        assert_eq!(f2.payload.as_ref(), b"hi\n");

        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_command_is_preserved() {
        let frame = Frame::new(0x1234_5678, 1, 2, Bytes::new());
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();

        let decoded = decode_frame(&mut buf, DEFAULT_MAX_INBOUND_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.command, 0x1234_5678);
        assert_eq!(decoded.kind(), None);
    }

    #[test]
    fn test_display_summaries() {
        assert_eq!(Frame::okay(7, 1).to_string(), "OKAY(local=7, remote=1)");
        assert_eq!(
            Frame::wrte(1, 7, "hi\n").to_string(),
            "WRTE(remote=7, data=\"hi\\n\")"
        );
        assert_eq!(
            Frame::wrte(1, 7, vec![0u8; 4096]).to_string(),
            "WRTE(remote=7, len=4096)"
        );
        assert_eq!(
            Frame::open(3, "shell:ls").to_string(),
            "OPEN(local=3, destination=\"shell:ls\\x00\")"
        );
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::wrte(1, 1, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4);
    }
}

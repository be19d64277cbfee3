use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached on a
    /// frame boundary and `Err(FrameError::Truncated)` when it is reached
    /// mid-frame.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_inbound_payload)? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(self.eof_error());
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn eof_error(&self) -> FrameError {
        let received = self.buf.len();
        if received == 0 {
            return FrameError::ConnectionClosed;
        }
        let expected = if received < HEADER_SIZE {
            HEADER_SIZE
        } else {
            let len = u32::from_le_bytes([self.buf[12], self.buf[13], self.buf[14], self.buf[15]]);
            HEADER_SIZE + len as usize
        };
        FrameError::Truncated { expected, received }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum inbound payload size for subsequent frame decoding.
    pub fn set_max_inbound_payload(&mut self, max_inbound_payload: usize) {
        self.config.max_inbound_payload = max_inbound_payload;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::encode_frame;
    use crate::command::{Command, A_WRTE};

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[Frame::wrte(1, 2, "hello")])));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.kind(), Some(Command::Wrte));
        assert_eq!((frame.arg0, frame.arg1), (1, 2));
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_frames() {
        let bytes = wire(&[
            Frame::okay(7, 1),
            Frame::wrte(7, 1, "two"),
            Frame::clse(7, 1),
        ]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!(f1.kind(), Some(Command::Okay));
        assert_eq!(f2.payload.as_ref(), b"two");
        assert_eq!(f3.kind(), Some(Command::Clse));
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![0xAB; 64 * 1024];
        let mut reader = FrameReader::new(Cursor::new(wire(&[Frame::wrte(1, 9, payload.clone())])));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.arg1, 9);
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[Frame::wrte(4, 4, "slow")]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.arg0, 4);
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert!(err.is_clean_close());
    }

    #[test]
    fn truncated_header() {
        let mut reader = FrameReader::new(Cursor::new(b"WRTE\x01\x00".to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: HEADER_SIZE,
                received: 6
            }
        ));
    }

    #[test]
    fn truncated_payload() {
        let mut partial = BytesMut::new();
        partial.put_u32_le(A_WRTE);
        partial.put_u32_le(0);
        partial.put_u32_le(1);
        partial.put_u32_le(16);
        partial.put_u32_le(0);
        partial.put_u32_le(!A_WRTE);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 40,
                received: 33
            }
        ));
        assert!(!err.is_clean_close());
    }

    #[test]
    fn oversized_frame_in_stream() {
        let cfg = FrameConfig {
            max_inbound_payload: 16,
            ..FrameConfig::default()
        };
        let bytes = wire(&[Frame::wrte(1, 1, vec![0u8; 1024])]);
        let mut reader = FrameReader::with_config(Cursor::new(bytes), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn roundtrip_over_tcp() {
        let (left, right) = tcp_pair();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.write_frame(&Frame::open(1, "shell:id")).unwrap();
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.kind(), Some(Command::Open));
        assert_eq!(frame.payload.as_ref(), b"shell:id\0");
    }

    #[test]
    fn concurrent_reader_writer_threads() {
        let (left, right) = tcp_pair();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let reader_thread = std::thread::spawn(move || {
            for expected in 1..=64u32 {
                let frame = reader.read_frame().unwrap();
                assert_eq!(frame.arg0, expected);
                assert_eq!(frame.payload.as_ref(), format!("msg-{expected}").as_bytes());
            }
        });

        for i in 1..=64u32 {
            writer
                .write_frame(&Frame::wrte(i, 1, format!("msg-{i}")))
                .unwrap();
        }

        reader_thread.join().unwrap();
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[Frame::okay(8, 1)])),
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();

        assert_eq!(frame.arg0, 8);
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn other_io_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::ConnectionReset))
            }
        }

        let mut framed = FrameReader::new(Broken);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::ConnectionReset));
    }
}

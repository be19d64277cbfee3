use std::io::{Read, Write};
use std::sync::Arc;

use bytes::{Buf, Bytes};

use crate::error::{Result, SessionError};
use crate::stream::StreamShared;

/// Inbound side of a logical stream.
///
/// Bytes come from the chunks the dispatch loop queued, in wire order. A
/// read on an empty queue blocks until a chunk arrives or the stream closes;
/// once the stream is closed and drained every read reports end-of-stream.
///
/// Lines end at `\n` or `\r`. After a `\r` a following `\n` is swallowed,
/// even when it arrives in the next chunk, so `\r\n` is one terminator.
pub struct StreamReader {
    shared: Arc<StreamShared>,
    current: Bytes,
    skip_lf: bool,
}

impl StreamReader {
    pub(crate) fn new(shared: Arc<StreamShared>) -> Self {
        Self {
            shared,
            current: Bytes::new(),
            skip_lf: false,
        }
    }

    /// Make `current` non-empty, blocking if needed. `false` at end-of-stream.
    fn fill(&mut self) -> bool {
        loop {
            if self.current.is_empty() {
                match self.shared.next_chunk() {
                    Some(chunk) => self.current = chunk,
                    None => return false,
                }
                continue;
            }
            if self.skip_lf {
                self.skip_lf = false;
                if self.current[0] == b'\n' {
                    self.current.advance(1);
                    continue;
                }
            }
            return true;
        }
    }

    /// Read one byte.
    pub fn read_byte(&mut self) -> Option<u8> {
        if !self.fill() {
            return None;
        }
        let byte = self.current[0];
        self.current.advance(1);
        Some(byte)
    }

    /// Look at the next byte without consuming it.
    pub fn peek(&mut self) -> Option<u8> {
        if !self.fill() {
            return None;
        }
        Some(self.current[0])
    }

    /// Read one line without its terminator.
    ///
    /// Returns `None` at end-of-stream. A final line without a terminator is
    /// still returned.
    pub fn read_line(&mut self) -> Option<String> {
        if !self.fill() {
            return None;
        }

        let mut line = Vec::new();
        loop {
            if let Some(pos) = self.current.iter().position(|&b| b == b'\n' || b == b'\r') {
                line.extend_from_slice(&self.current[..pos]);
                self.skip_lf = self.current[pos] == b'\r';
                self.current.advance(pos + 1);
                break;
            }
            line.extend_from_slice(&self.current);
            self.current.clear();
            if !self.fill() {
                break;
            }
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Iterate over the remaining lines.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { reader: self }
    }

    /// All remaining lines joined with `\n`, without a trailing terminator.
    pub fn read_all_text(&mut self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }

    /// Everything up to end-of-stream.
    pub fn read_all(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while self.fill() {
            out.extend_from_slice(&self.current);
            self.current.clear();
        }
        out
    }

    /// Up to `len` bytes, fewer only at end-of-stream.
    pub fn read_up_to(&mut self, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len.min(64 * 1024));
        while out.len() < len && self.fill() {
            let take = (len - out.len()).min(self.current.len());
            out.extend_from_slice(&self.current[..take]);
            self.current.advance(take);
        }
        out
    }

    /// Discard up to `len` bytes; returns how many were discarded.
    pub fn skip(&mut self, len: u64) -> u64 {
        let mut skipped = 0u64;
        while skipped < len && self.fill() {
            let take = (len - skipped).min(self.current.len() as u64) as usize;
            self.current.advance(take);
            skipped += take as u64;
        }
        skipped
    }

    /// Discard everything up to end-of-stream.
    pub fn skip_all(&mut self) -> u64 {
        self.skip(u64::MAX)
    }

    /// Discard exactly `len` bytes, failing if the stream ends first.
    pub fn skip_exact(&mut self, len: u64) -> Result<()> {
        if self.skip(len) < len {
            return Err(self.shared.closed_error());
        }
        Ok(())
    }

    /// Copy everything up to end-of-stream into `sink`.
    pub fn transfer_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64> {
        let mut total = 0u64;
        while self.fill() {
            sink.write_all(&self.current).map_err(|source| SessionError::Io {
                context: format!("copying output of '{}'", self.shared.destination()),
                source,
            })?;
            total += self.current.len() as u64;
            self.current.clear();
        }
        Ok(total)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

/// Spans chunks that are already queued, but blocks only for the first byte.
impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() || !self.fill() {
            return Ok(0);
        }

        let mut filled = 0;
        loop {
            let take = (buf.len() - filled).min(self.current.len());
            buf[filled..filled + take].copy_from_slice(&self.current[..take]);
            self.current.advance(take);
            filled += take;

            if filled == buf.len() {
                break;
            }
            match self.shared.try_next_chunk() {
                Some(chunk) => self.current = chunk,
                None => break,
            }
        }
        Ok(filled)
    }
}

/// Iterator returned by [`StreamReader::lines`].
pub struct Lines<'a> {
    reader: &'a mut StreamReader,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.reader.read_line()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use adbwire_transport::DaemonAddress;

    use super::*;

    fn reader_with(chunks: &[&'static [u8]]) -> StreamReader {
        let shared = Arc::new(StreamShared::new(DaemonAddress::new("127.0.0.1", 5555), 1, "shell:"));
        for chunk in chunks {
            shared.push_chunk(Bytes::from_static(chunk));
        }
        shared.mark_closed();
        StreamReader::new(shared)
    }

    #[test]
    fn lines_split_on_any_terminator() {
        let mut reader = reader_with(&[b"one\ntwo\rthree\r\nfour"]);
        let lines: Vec<String> = reader.lines().collect();
        assert_eq!(lines, vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn crlf_split_across_chunks_is_one_terminator() {
        let mut reader = reader_with(&[b"first\r", b"\nsecond\r", b"\n"]);
        assert_eq!(reader.read_line().as_deref(), Some("first"));
        assert_eq!(reader.read_line().as_deref(), Some("second"));
        assert_eq!(reader.read_line(), None);
    }

    #[test]
    fn pending_lf_skip_applies_to_byte_reads() {
        let mut reader = reader_with(&[b"a\r", b"\nb"]);
        assert_eq!(reader.read_line().as_deref(), Some("a"));
        assert_eq!(reader.peek(), Some(b'b'));
        assert_eq!(reader.read_byte(), Some(b'b'));
        assert_eq!(reader.read_byte(), None);
    }

    #[test]
    fn empty_lines_are_kept() {
        let mut reader = reader_with(&[b"a\n\nb\n"]);
        assert_eq!(reader.read_all_text(), "a\n\nb");
    }

    #[test]
    fn line_spanning_chunks() {
        let mut reader = reader_with(&[b"hel", b"lo wo", b"rld\nnext"]);
        assert_eq!(reader.read_line().as_deref(), Some("hello world"));
        assert_eq!(reader.read_line().as_deref(), Some("next"));
    }

    #[test]
    fn read_all_text_normalises_terminators() {
        let mut reader = reader_with(&[b"x\r\ny\r\n"]);
        assert_eq!(reader.read_all_text(), "x\ny");
    }

    #[test]
    fn read_all_concatenates_chunks() {
        let mut reader = reader_with(&[b"ab", b"cd", b"e"]);
        assert_eq!(reader.read_all(), b"abcde");
        assert!(reader.read_all().is_empty());
    }

    #[test]
    fn read_up_to_spans_chunks() {
        let mut reader = reader_with(&[b"abc", b"defg"]);
        assert_eq!(reader.read_up_to(5), b"abcde");
        assert_eq!(reader.read_up_to(10), b"fg");
        assert!(reader.read_up_to(1).is_empty());
    }

    #[test]
    fn skip_counts_and_skip_exact_fails_short() {
        let mut reader = reader_with(&[b"1234", b"5678"]);
        assert_eq!(reader.skip(6), 6);
        assert_eq!(reader.read_byte(), Some(b'7'));
        let err = reader.skip_exact(5).unwrap_err();
        assert!(matches!(err, SessionError::StreamClosed { local_id: 1, .. }));
    }

    #[test]
    fn skip_all_drains() {
        let mut reader = reader_with(&[b"abc", b"de"]);
        assert_eq!(reader.skip_all(), 5);
        assert_eq!(reader.peek(), None);
    }

    #[test]
    fn transfer_to_copies_everything() {
        let mut reader = reader_with(&[b"png", b"-bytes"]);
        let mut sink = Vec::new();
        assert_eq!(reader.transfer_to(&mut sink).unwrap(), 9);
        assert_eq!(sink, b"png-bytes");
    }

    #[test]
    fn io_read_spans_queued_chunks() {
        let mut reader = reader_with(&[b"ab", b"cd", b"ef"]);
        let mut buf = [0u8; 5];
        assert_eq!(reader.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"abcde");
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn io_read_returns_what_is_available() {
        let shared = Arc::new(StreamShared::new(DaemonAddress::new("127.0.0.1", 5555), 2, "shell:"));
        shared.push_chunk(Bytes::from_static(b"abc"));
        let mut reader = StreamReader::new(Arc::clone(&shared));

        let mut buf = [0u8; 16];
        // Stream still open: the read must not wait for 16 bytes.
        assert_eq!(reader.read(&mut buf).unwrap(), 3);

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = [0u8; 16];
            tx.send(reader.read(&mut buf).unwrap()).unwrap();
        });
        thread::sleep(Duration::from_millis(50));
        shared.mark_closed();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
    }
}

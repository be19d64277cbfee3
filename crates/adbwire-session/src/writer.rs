use std::io::Write;
use std::sync::Arc;

use adbwire_frame::Frame;
use bytes::{BufMut, BytesMut};
use tracing::{trace, warn};

use crate::connection::ConnectionInner;
use crate::error::Result;
use crate::stream::StreamShared;

/// Buffer size of a stream opened with [`Connection::open`].
///
/// [`Connection::open`]: crate::Connection::open
pub const DEFAULT_WRITE_CAPACITY: usize = 64 * 1024;

/// Outbound side of a logical stream.
///
/// Writes fill a buffer of fixed capacity. [`flush`](Self::flush) sends it as
/// WRTE frames of at most the negotiated max payload, waiting for the
/// daemon's OKAY before each one. A write that would overflow the buffer
/// flushes it first, so memory stays bounded by the capacity.
pub struct StreamWriter {
    shared: Arc<StreamShared>,
    link: Arc<ConnectionInner>,
    buf: BytesMut,
    capacity: usize,
    max_payload: usize,
}

impl StreamWriter {
    pub(crate) fn new(
        shared: Arc<StreamShared>,
        link: Arc<ConnectionInner>,
        max_payload: usize,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared,
            link,
            buf: BytesMut::with_capacity(capacity),
            capacity,
            max_payload: max_payload.max(1),
        }
    }

    /// Append raw bytes.
    pub fn put_slice(&mut self, data: &[u8]) -> Result<&mut Self> {
        self.append(data)?;
        Ok(self)
    }

    /// Append a little-endian u32.
    pub fn put_u32_le(&mut self, value: u32) -> Result<&mut Self> {
        self.append(&value.to_le_bytes())?;
        Ok(self)
    }

    /// Append the bytes of a string (record tags, paths).
    pub fn put_str(&mut self, value: &str) -> Result<&mut Self> {
        self.append(value.as_bytes())?;
        Ok(self)
    }

    /// Bytes buffered and not yet sent.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Bytes the buffer holds before a write forces a flush.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest payload of one WRTE.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn append(&mut self, data: &[u8]) -> Result<()> {
        if self.shared.is_closed() {
            return Err(self.shared.closed_error());
        }
        if !self.buf.is_empty() && self.buf.len() + data.len() > self.capacity {
            self.flush()?;
        }
        self.buf.put_slice(data);
        if self.buf.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    /// Send everything buffered.
    ///
    /// Each chunk consumes the stream's single write credit. Fails with
    /// `StreamClosed` on a closed stream, even with nothing buffered; if the
    /// stream closes while waiting, the unsent remainder is dropped.
    pub fn flush(&mut self) -> Result<()> {
        if self.shared.is_closed() {
            self.buf.clear();
            return Err(self.shared.closed_error());
        }
        if self.buf.is_empty() {
            return Ok(());
        }
        let data = self.buf.split().freeze();

        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + self.max_payload).min(data.len());
            self.shared.take_credit()?;
            let frame = Frame::wrte(self.shared.local_id(), self.shared.remote_id(), data.slice(offset..end));
            trace!(local_id = self.shared.local_id(), len = end - offset, "flushing chunk");
            self.link
                .send(&frame)
                .map_err(|err| self.shared.send_error(err))?;
            offset = end;
        }
        Ok(())
    }

    /// Flush what is still buffered, then send CLSE.
    pub(crate) fn close(&mut self) -> Result<()> {
        if !self.buf.is_empty() && !self.shared.is_closed() {
            let pending = self.buf.len();
            if let Err(err) = self.flush() {
                warn!(
                    local_id = self.shared.local_id(),
                    destination = self.shared.destination(),
                    discarded = pending,
                    error = %err,
                    "unsent bytes dropped on close"
                );
            }
        }
        self.buf.clear();
        self.link.close_stream(&self.shared)
    }
}

impl Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        StreamWriter::flush(self).map_err(Into::into)
    }
}

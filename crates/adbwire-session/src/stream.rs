use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use adbwire_transport::DaemonAddress;
use bytes::Bytes;
use tracing::debug;

use crate::connection::ConnectionInner;
use crate::error::{Result, SessionError};
use crate::lock;
use crate::reader::StreamReader;
use crate::writer::StreamWriter;

/// State of one logical stream shared between its owner and the dispatch
/// loop.
///
/// The inbox is filled only by the dispatch loop and drained only by the
/// stream's reader. The credit flag is raised by the dispatch loop on OKAY
/// and lowered by the writer before each WRTE.
pub(crate) struct StreamShared {
    address: DaemonAddress,
    local_id: u32,
    destination: String,
    remote_id: AtomicU32,
    closed: AtomicBool,
    inbox: Mutex<VecDeque<Bytes>>,
    readable: Condvar,
    credit: Mutex<bool>,
    writable: Condvar,
}

impl StreamShared {
    pub(crate) fn new(address: DaemonAddress, local_id: u32, destination: &str) -> Self {
        Self {
            address,
            local_id,
            destination: destination.trim_end_matches('\0').to_string(),
            remote_id: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            inbox: Mutex::new(VecDeque::new()),
            readable: Condvar::new(),
            credit: Mutex::new(false),
            writable: Condvar::new(),
        }
    }

    pub(crate) fn local_id(&self) -> u32 {
        self.local_id
    }

    pub(crate) fn remote_id(&self) -> u32 {
        self.remote_id.load(Ordering::Acquire)
    }

    pub(crate) fn destination(&self) -> &str {
        &self.destination
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue a received payload and wake a blocked reader.
    pub(crate) fn push_chunk(&self, chunk: Bytes) {
        let mut inbox = lock(&self.inbox);
        inbox.push_back(chunk);
        self.readable.notify_one();
    }

    /// Record the daemon's id for this stream and grant one write.
    pub(crate) fn grant_credit(&self, remote_id: u32) {
        self.remote_id.store(remote_id, Ordering::Release);
        let mut credit = lock(&self.credit);
        *credit = true;
        self.writable.notify_one();
    }

    /// Mark the stream closed and wake every waiter.
    ///
    /// Returns `false` if the stream was already closed, so exactly one
    /// caller performs the close side effects.
    pub(crate) fn mark_closed(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Taking each lock orders the flag before any waiter's next check.
        {
            let _inbox = lock(&self.inbox);
            self.readable.notify_all();
        }
        {
            let _credit = lock(&self.credit);
            self.writable.notify_all();
        }
        true
    }

    /// Next queued chunk, blocking while the inbox is empty and the stream
    /// open. `None` once closed and drained.
    pub(crate) fn next_chunk(&self) -> Option<Bytes> {
        let mut inbox = lock(&self.inbox);
        loop {
            if let Some(chunk) = inbox.pop_front() {
                return Some(chunk);
            }
            if self.is_closed() {
                return None;
            }
            inbox = self
                .readable
                .wait(inbox)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Next queued chunk if one is already available.
    pub(crate) fn try_next_chunk(&self) -> Option<Bytes> {
        lock(&self.inbox).pop_front()
    }

    /// Consume the write credit, blocking until an OKAY grants it.
    pub(crate) fn take_credit(&self) -> Result<()> {
        let mut credit = lock(&self.credit);
        loop {
            if self.is_closed() {
                return Err(self.closed_error());
            }
            if *credit {
                *credit = false;
                return Ok(());
            }
            credit = self
                .writable
                .wait(credit)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    pub(crate) fn closed_error(&self) -> SessionError {
        SessionError::StreamClosed {
            address: self.address.to_string(),
            local_id: self.local_id,
            remote_id: self.remote_id(),
            destination: self.destination.clone(),
        }
    }

    /// Attach this stream's ids and destination to a failed send.
    pub(crate) fn send_error(&self, err: SessionError) -> SessionError {
        match err {
            SessionError::Send { source, .. } => SessionError::StreamSend {
                address: self.address.to_string(),
                local_id: self.local_id,
                remote_id: self.remote_id(),
                destination: self.destination.clone(),
                source,
            },
            SessionError::ConnectionClosed { .. } => self.closed_error(),
            other => other,
        }
    }
}

/// One bidirectional channel multiplexed over a [`Connection`].
///
/// Reading and writing go through [`input`](Self::input) and
/// [`output`](Self::output), or through the `Read`/`Write` impls on the
/// stream itself. Dropping the stream closes it, flushing buffered output
/// first.
///
/// [`Connection`]: crate::Connection
pub struct LogicalStream {
    shared: Arc<StreamShared>,
    reader: StreamReader,
    writer: StreamWriter,
}

impl LogicalStream {
    pub(crate) fn new(
        shared: Arc<StreamShared>,
        link: Arc<ConnectionInner>,
        max_payload: usize,
        write_capacity: usize,
    ) -> Self {
        Self {
            reader: StreamReader::new(Arc::clone(&shared)),
            writer: StreamWriter::new(Arc::clone(&shared), link, max_payload, write_capacity),
            shared,
        }
    }

    /// Id this side assigned at open; never 0.
    pub fn local_id(&self) -> u32 {
        self.shared.local_id()
    }

    /// Id the daemon assigned, 0 until its first OKAY.
    pub fn remote_id(&self) -> u32 {
        self.shared.remote_id()
    }

    /// Destination this stream was opened with, without the trailing NUL.
    pub fn destination(&self) -> &str {
        self.shared.destination()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Inbound side.
    pub fn input(&mut self) -> &mut StreamReader {
        &mut self.reader
    }

    /// Outbound side.
    pub fn output(&mut self) -> &mut StreamWriter {
        &mut self.writer
    }

    /// Close the stream, sending CLSE unless the daemon closed it first.
    /// Buffered output is flushed before the CLSE. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.writer.close()
    }
}

impl Read for LogicalStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Write for LogicalStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Write::flush(&mut self.writer)
    }
}

impl Drop for LogicalStream {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(
                local_id = self.shared.local_id(),
                error = %err,
                "failed to close stream on drop"
            );
        }
    }
}

impl std::fmt::Debug for LogicalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalStream")
            .field("address", &self.shared.address.to_string())
            .field("local_id", &self.shared.local_id())
            .field("remote_id", &self.shared.remote_id())
            .field("destination", &self.shared.destination())
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use adbwire_frame::{
    Command, Frame, FrameConfig, FrameError, FrameReader, FrameWriter, DEFAULT_MAX_INBOUND_PAYLOAD,
};
use adbwire_transport::{DaemonAddress, DaemonStream, TcpTransport};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, SessionError};
use crate::handshake::{handshake_client, HandshakeConfig, HandshakeResult};
use crate::lock;
use crate::registry::Holder;
use crate::stream::{LogicalStream, StreamShared};
use crate::writer::DEFAULT_WRITE_CAPACITY;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration for opening a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// CNXN parameters.
    pub handshake: HandshakeConfig,
    /// Bound on the TCP connect; `None` waits as long as the OS does.
    pub connect_timeout: Option<Duration>,
    /// How long `close` waits for the dispatch thread before detaching it.
    pub shutdown_timeout: Duration,
    /// Largest inbound payload accepted before the connection is failed.
    pub max_inbound_payload: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            connect_timeout: None,
            shutdown_timeout: Duration::from_secs(5),
            max_inbound_payload: DEFAULT_MAX_INBOUND_PAYLOAD,
        }
    }
}

/// Handle returned by [`Connection::on_before_close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type BeforeClose = Box<dyn FnOnce() + Send + 'static>;

/// One handshaken socket to one daemon, shared by cheap clones.
///
/// A dispatch thread owns the read half and routes every inbound frame to
/// its stream. All outbound frames go through one send lock. The connection
/// stays open until [`close`](Self::close) is called, the last holder
/// releases it, or the daemon hangs up.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    id: u64,
    address: DaemonAddress,
    handshake: HandshakeResult,
    shutdown_timeout: Duration,
    socket: DaemonStream,
    writer: Mutex<FrameWriter<DaemonStream>>,
    streams: Mutex<HashMap<u32, Arc<StreamShared>>>,
    next_local_id: AtomicU32,
    holders: Mutex<HashMap<Holder, usize>>,
    callbacks: Mutex<Vec<(CallbackId, BeforeClose)>>,
    next_callback_id: AtomicU64,
    closed: AtomicBool,
    cancelled: AtomicBool,
    failure: Mutex<Option<String>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    stopped: Mutex<bool>,
    stopped_signal: Condvar,
    pub(crate) line_separator: OnceLock<String>,
}

impl Connection {
    /// Connect, handshake and start the dispatch thread (blocking).
    pub fn connect(address: &DaemonAddress, config: &ConnectionConfig) -> Result<Self> {
        info!(%address, "connecting to daemon");
        let stream = TcpTransport::connect(address, config.connect_timeout)?;
        let read_half = stream.try_clone()?;
        let socket = stream.try_clone()?;

        let frame_config = FrameConfig {
            max_payload_size: config.handshake.max_payload as usize,
            max_inbound_payload: config.max_inbound_payload,
        };
        let mut reader = FrameReader::with_config(read_half, frame_config.clone());
        let mut writer = FrameWriter::with_config(stream, frame_config);

        let handshake = handshake_client(&mut reader, &mut writer, &config.handshake)
            .map_err(|err| match err {
                SessionError::HandshakeFailed(reason) => {
                    SessionError::HandshakeFailed(format!("{address}: {reason}"))
                }
                other => other,
            })?;
        writer.set_max_payload_size(handshake.max_payload);
        info!(
            %address,
            version = %format!("{:#010x}", handshake.version),
            max_payload = handshake.max_payload,
            banner = %handshake.banner,
            "handshake complete"
        );

        let inner = Arc::new(ConnectionInner::new(
            address.clone(),
            handshake,
            config.shutdown_timeout,
            socket,
            writer,
        ));
        inner.spawn_dispatcher(reader)?;

        Ok(Self { inner })
    }

    /// Open a logical stream to `destination` (`shell:ls`, `sync:`).
    ///
    /// Returns as soon as OPEN is sent. The daemon's OKAY grants the first
    /// write; a daemon that refuses the destination answers with CLSE, which
    /// the stream observes as end-of-stream.
    pub fn open(&self, destination: &str) -> Result<LogicalStream> {
        self.open_with_capacity(destination, DEFAULT_WRITE_CAPACITY)
    }

    /// Like [`open`](Self::open), with a write buffer of `capacity` bytes.
    pub fn open_with_capacity(&self, destination: &str, capacity: usize) -> Result<LogicalStream> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(inner.closed_error());
        }

        let local_id = inner.allocate_local_id();
        let shared = Arc::new(StreamShared::new(inner.address.clone(), local_id, destination));
        lock(&inner.streams).insert(local_id, Arc::clone(&shared));

        if let Err(err) = inner.send(&Frame::open(local_id, destination)) {
            inner.remove_stream(local_id);
            shared.mark_closed();
            return Err(err);
        }
        debug!(address = %inner.address, local_id, destination = shared.destination(), "opened stream");

        Ok(LogicalStream::new(
            shared,
            Arc::clone(inner),
            inner.handshake.max_payload,
            capacity,
        ))
    }

    /// Close the connection. Idempotent.
    ///
    /// Runs the before-close callbacks, ends every open stream, shuts the
    /// socket down and waits up to the configured shutdown timeout for the
    /// dispatch thread.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn address(&self) -> &DaemonAddress {
        &self.inner.address
    }

    pub fn handshake(&self) -> &HandshakeResult {
        &self.inner.handshake
    }

    /// Largest payload of any frame this side emits.
    pub fn max_payload(&self) -> usize {
        self.inner.handshake.max_payload
    }

    pub(crate) fn inner(&self) -> &ConnectionInner {
        &self.inner
    }

    /// Process-unique id of this connection.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether two handles refer to the same connection.
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The dispatch loop's terminal error, if it stopped on an I/O failure
    /// rather than a clean hang-up or a local close.
    pub fn failure(&self) -> Option<String> {
        lock(&self.inner.failure).clone()
    }

    /// Number of streams currently open.
    pub fn open_streams(&self) -> usize {
        lock(&self.inner.streams).len()
    }

    /// Count one acquisition by `holder`. Returns how many acquisitions that
    /// holder now has outstanding; each needs its own [`release`](Self::release).
    pub fn hold(&self, holder: Holder) -> usize {
        let mut holders = lock(&self.inner.holders);
        let count = holders.entry(holder).or_insert(0);
        *count += 1;
        *count
    }

    /// Undo one acquisition by `holder`; the connection closes when no
    /// acquisitions remain. Releasing a holder with nothing outstanding is a
    /// no-op.
    ///
    /// Returns `true` if this release closed the connection.
    pub fn release(&self, holder: Holder) -> bool {
        let now_empty = {
            let mut holders = lock(&self.inner.holders);
            let Some(count) = holders.get_mut(&holder) else {
                return false;
            };
            *count -= 1;
            if *count == 0 {
                holders.remove(&holder);
            }
            holders.is_empty()
        };
        if now_empty {
            debug!(address = %self.inner.address, "last holder released");
            self.close();
        }
        now_empty
    }

    /// Outstanding acquisitions across all holders.
    pub fn holders(&self) -> usize {
        lock(&self.inner.holders).values().sum()
    }

    /// Run `callback` once when the connection starts closing.
    ///
    /// A callback registered after close has begun is dropped unrun.
    pub fn on_before_close<F>(&self, callback: F) -> CallbackId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = CallbackId(self.inner.next_callback_id.fetch_add(1, Ordering::Relaxed));
        let mut callbacks = lock(&self.inner.callbacks);
        if !self.inner.is_closed() {
            callbacks.push((id, Box::new(callback)));
        }
        id
    }

    /// Unregister a before-close callback. Returns `false` if it was not
    /// registered or has already run.
    pub fn remove_before_close(&self, id: CallbackId) -> bool {
        let mut callbacks = lock(&self.inner.callbacks);
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != id);
        callbacks.len() != before
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("address", &self.inner.address.to_string())
            .field("max_payload", &self.inner.handshake.max_payload)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl ConnectionInner {
    fn new(
        address: DaemonAddress,
        handshake: HandshakeResult,
        shutdown_timeout: Duration,
        socket: DaemonStream,
        writer: FrameWriter<DaemonStream>,
    ) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            address,
            handshake,
            shutdown_timeout,
            socket,
            writer: Mutex::new(writer),
            streams: Mutex::new(HashMap::new()),
            next_local_id: AtomicU32::new(1),
            holders: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            failure: Mutex::new(None),
            dispatcher: Mutex::new(None),
            stopped: Mutex::new(false),
            stopped_signal: Condvar::new(),
            line_separator: OnceLock::new(),
        }
    }

    fn spawn_dispatcher(self: &Arc<Self>, reader: FrameReader<DaemonStream>) -> Result<()> {
        let inner = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("adbwire-dispatch-{}", self.address))
            .spawn(move || dispatch_loop(inner, reader))
            .map_err(|source| SessionError::Io {
                context: "spawning dispatch thread".to_string(),
                source,
            })?;
        *lock(&self.dispatcher) = Some(handle);
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn closed_error(&self) -> SessionError {
        SessionError::ConnectionClosed {
            address: self.address.to_string(),
        }
    }

    fn allocate_local_id(&self) -> u32 {
        loop {
            let id = self.next_local_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    fn stream(&self, local_id: u32) -> Option<Arc<StreamShared>> {
        lock(&self.streams).get(&local_id).cloned()
    }

    fn remove_stream(&self, local_id: u32) -> Option<Arc<StreamShared>> {
        lock(&self.streams).remove(&local_id)
    }

    /// Write one frame under the connection-wide send lock.
    pub(crate) fn send(&self, frame: &Frame) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let mut writer = lock(&self.writer);
        trace!(address = %self.address, frame = %frame, "send");
        writer.write_frame(frame).map_err(|source| SessionError::Send {
            address: self.address.to_string(),
            source,
        })
    }

    /// Close one stream from this side. Sends CLSE only if neither side has
    /// closed it yet.
    pub(crate) fn close_stream(&self, stream: &StreamShared) -> Result<()> {
        if !stream.mark_closed() {
            return Ok(());
        }
        self.remove_stream(stream.local_id());
        if self.is_closed() {
            return Ok(());
        }
        debug!(
            address = %self.address,
            local_id = stream.local_id(),
            remote_id = stream.remote_id(),
            "closing stream"
        );
        self.send(&Frame::clse(stream.local_id(), stream.remote_id()))
    }

    fn dispatch(&self, frame: Frame) -> Result<()> {
        match frame.kind() {
            Some(Command::Auth) => {
                trace!(address = %self.address, "ignoring AUTH");
            }
            Some(Command::Okay) => {
                if let Some(stream) = self.stream(frame.arg1) {
                    stream.grant_credit(frame.arg0);
                }
            }
            Some(Command::Wrte) => {
                if let Some(stream) = self.stream(frame.arg1) {
                    let (local_id, remote_id) = (stream.local_id(), stream.remote_id());
                    if !frame.payload.is_empty() {
                        stream.push_chunk(frame.payload);
                    }
                    self.send(&Frame::okay(local_id, remote_id))?;
                }
            }
            Some(Command::Clse) => {
                if let Some(stream) = self.remove_stream(frame.arg1) {
                    stream.mark_closed();
                    debug!(
                        address = %self.address,
                        local_id = stream.local_id(),
                        remote_id = frame.arg0,
                        "stream closed by daemon"
                    );
                }
            }
            _ => {
                debug!(address = %self.address, frame = %frame, "ignoring frame");
            }
        }
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(address = %self.address, "closing connection");

        let callbacks = std::mem::take(&mut *lock(&self.callbacks));
        for (_, callback) in callbacks {
            callback();
        }
        lock(&self.holders).clear();

        let streams: Vec<_> = lock(&self.streams).drain().map(|(_, stream)| stream).collect();
        for stream in streams {
            stream.mark_closed();
        }

        if let Err(err) = self.socket.shutdown() {
            warn!(address = %self.address, error = %err, "socket shutdown failed");
        }
        self.await_dispatcher();
        info!(address = %self.address, "connection closed");
    }

    fn await_dispatcher(&self) {
        let handle = {
            let mut slot = lock(&self.dispatcher);
            let on_dispatch_thread = slot
                .as_ref()
                .is_some_and(|handle| handle.thread().id() == thread::current().id());
            // Closing from inside the dispatch loop: it exits right after.
            if on_dispatch_thread {
                return;
            }
            slot.take()
        };
        let Some(handle) = handle else {
            return;
        };

        let stopped = lock(&self.stopped);
        let (stopped, wait) = self
            .stopped_signal
            .wait_timeout_while(stopped, self.shutdown_timeout, |stopped| !*stopped)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        drop(stopped);

        if wait.timed_out() {
            self.cancelled.store(true, Ordering::Release);
            warn!(
                address = %self.address,
                timeout = ?self.shutdown_timeout,
                "dispatch loop did not stop in time; detaching it"
            );
            return;
        }
        if handle.join().is_err() {
            warn!(address = %self.address, "dispatch loop panicked");
        }
    }

    fn mark_stopped(&self) {
        let mut stopped = lock(&self.stopped);
        *stopped = true;
        self.stopped_signal.notify_all();
    }
}

fn dispatch_loop(inner: Arc<ConnectionInner>, mut reader: FrameReader<DaemonStream>) {
    debug!(address = %inner.address, "dispatch loop started");

    let outcome = loop {
        if inner.cancelled.load(Ordering::Acquire) {
            break Ok(());
        }
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(err) => break Err(SessionError::Frame(err)),
        };
        trace!(address = %inner.address, frame = %frame, "recv");
        if let Err(err) = inner.dispatch(frame) {
            break Err(err);
        }
    };

    match outcome {
        Ok(()) => debug!(address = %inner.address, "dispatch loop cancelled"),
        Err(SessionError::Frame(FrameError::ConnectionClosed)) => {
            info!(address = %inner.address, "daemon closed the connection");
        }
        Err(err) if inner.is_closed() => {
            debug!(address = %inner.address, error = %err, "dispatch loop stopped after close");
        }
        Err(err) => {
            error!(address = %inner.address, error = %err, "dispatch loop failed");
            *lock(&inner.failure) = Some(err.to_string());
        }
    }

    inner.close();
    inner.mark_stopped();
    debug!(address = %inner.address, "dispatch loop stopped");
}

/// Connect and handshake on a worker thread, giving up after `timeout`.
///
/// If the worker finishes after the caller has given up, the connection it
/// made is closed.
pub fn connect_with_timeout(
    address: &DaemonAddress,
    config: &ConnectionConfig,
    timeout: Duration,
) -> Result<Connection> {
    let (tx, rx) = mpsc::channel();
    let worker_address = address.clone();
    let worker_config = config.clone();

    thread::Builder::new()
        .name(format!("adbwire-connect-{address}"))
        .spawn(move || {
            let result = Connection::connect(&worker_address, &worker_config);
            if let Err(mpsc::SendError(Ok(late))) = tx.send(result) {
                debug!(address = %worker_address, "connect finished after timeout; closing");
                late.close();
            }
        })
        .map_err(|source| SessionError::Io {
            context: "spawning connect worker".to_string(),
            source,
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(SessionError::Timeout {
            operation: format!("connecting to {address}"),
            duration: timeout,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(SessionError::Worker(
            "connect worker exited without a result".to_string(),
        )),
    }
}

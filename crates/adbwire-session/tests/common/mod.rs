//! Scripted fake daemon over loopback TCP.

#![allow(dead_code)]

use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use adbwire_frame::{Command, Frame, FrameError, FrameReader, FrameWriter, A_VERSION};
use adbwire_session::DaemonAddress;

pub const BANNER: &str = "device::ro.product.name=sdk_phone;ro.product.model=Pixel Test;ro.product.device=emu;features=shell_v2,cmd\0";

/// Generous bound for anything that should happen "immediately".
pub const WAIT: Duration = Duration::from_secs(10);

pub struct FakeDaemon {
    listener: TcpListener,
}

impl FakeDaemon {
    pub fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").expect("loopback bind should succeed"),
        }
    }

    pub fn address(&self) -> DaemonAddress {
        DaemonAddress::from(self.listener.local_addr().expect("listener has an address"))
    }

    /// Accept one client without answering anything.
    pub fn accept_raw(&self) -> DaemonSide {
        let (stream, _) = self.listener.accept().expect("client should connect");
        DaemonSide::new(stream)
    }

    /// Accept one client and complete the CNXN exchange with a 4096 max payload.
    pub fn accept(&self) -> DaemonSide {
        self.accept_with_max_payload(4096)
    }

    pub fn accept_with_max_payload(&self, max_payload: u32) -> DaemonSide {
        let mut side = self.accept_raw();
        let cnxn = side.expect(Command::Cnxn);
        assert_eq!(cnxn.arg0, A_VERSION);
        assert_eq!(cnxn.payload.as_ref(), b"host::\0");
        side.send(Frame::cnxn(A_VERSION, max_payload, BANNER));
        side
    }
}

/// A stream as the daemon sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opened {
    /// The client's id for the stream.
    pub local_id: u32,
    /// The daemon's id for the stream.
    pub remote_id: u32,
}

pub struct DaemonSide {
    socket: TcpStream,
    reader: FrameReader<TcpStream>,
    writer: FrameWriter<TcpStream>,
    next_remote_id: u32,
}

impl DaemonSide {
    fn new(socket: TcpStream) -> Self {
        socket
            .set_read_timeout(Some(WAIT))
            .expect("read timeout should apply");
        let reader = FrameReader::new(socket.try_clone().expect("socket should clone"));
        let writer = FrameWriter::new(socket.try_clone().expect("socket should clone"));
        Self {
            socket,
            reader,
            writer,
            next_remote_id: 100,
        }
    }

    pub fn recv(&mut self) -> Frame {
        let frame = self.reader.read_frame().expect("client frame should arrive");
        assert!(frame.has_valid_magic(), "bad magic on {frame}");
        assert!(frame.has_valid_checksum(), "bad checksum on {frame}");
        frame
    }

    /// Assert that nothing arrives for `quiet`.
    pub fn expect_silence(&mut self, quiet: Duration) {
        self.socket
            .set_read_timeout(Some(quiet))
            .expect("read timeout should apply");
        let result = self.reader.read_frame();
        self.socket
            .set_read_timeout(Some(WAIT))
            .expect("read timeout should apply");
        match result {
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Ok(frame) => panic!("expected silence, got {frame}"),
            Err(err) => panic!("expected silence, got error {err}"),
        }
    }

    /// Wait for the client to go away.
    pub fn expect_hangup(&mut self) {
        match self.reader.read_frame() {
            Err(FrameError::ConnectionClosed) | Err(FrameError::Io(_)) => {}
            Ok(frame) => panic!("expected hang-up, got {frame}"),
            Err(err) => panic!("expected hang-up, got error {err}"),
        }
    }

    pub fn expect(&mut self, command: Command) -> Frame {
        let frame = self.recv();
        assert_eq!(frame.kind(), Some(command), "unexpected frame {frame}");
        frame
    }

    pub fn send(&mut self, frame: Frame) {
        self.writer.write_frame(&frame).expect("daemon send should succeed");
    }

    /// Read OPEN and acknowledge it. Returns the destination without NUL.
    pub fn accept_open(&mut self) -> (Opened, String) {
        let open = self.expect(Command::Open);
        assert_eq!(open.arg1, 0);
        assert_eq!(open.payload.last(), Some(&0u8), "destination must be NUL-terminated");
        let destination = String::from_utf8_lossy(&open.payload[..open.payload.len() - 1]).into_owned();

        let opened = Opened {
            local_id: open.arg0,
            remote_id: self.next_remote_id,
        };
        self.next_remote_id += 1;
        self.send(Frame::okay(opened.remote_id, opened.local_id));
        (opened, destination)
    }

    /// Send data to the client and wait for its acknowledgement.
    pub fn write(&mut self, stream: Opened, data: &[u8]) {
        self.send(Frame::wrte(stream.remote_id, stream.local_id, data.to_vec()));
        let ack = self.expect(Command::Okay);
        assert_eq!((ack.arg0, ack.arg1), (stream.local_id, stream.remote_id));
    }

    pub fn close(&mut self, stream: Opened) {
        self.send(Frame::clse(stream.remote_id, stream.local_id));
    }

    /// Receive one WRTE from the client and grant the next write.
    pub fn read_write(&mut self, stream: Opened) -> Frame {
        let frame = self.expect(Command::Wrte);
        assert_eq!((frame.arg0, frame.arg1), (stream.local_id, stream.remote_id));
        assert!(frame.len() <= 4096, "WRTE over max payload: {}", frame.len());
        self.send(Frame::okay(stream.remote_id, stream.local_id));
        frame
    }

    /// Serve one `shell:` request: open, write `output` in `chunk` sized
    /// pieces, close. Returns the command.
    pub fn serve_shell(&mut self, output: &[u8], chunk: usize) -> String {
        let (opened, destination) = self.accept_open();
        let command = destination
            .strip_prefix("shell:")
            .unwrap_or_else(|| panic!("expected shell destination, got {destination}"))
            .to_string();
        for piece in output.chunks(chunk.max(1)) {
            self.write(opened, piece);
        }
        self.close(opened);
        command
    }

    /// Answer the line-separator probe.
    pub fn serve_echo_probe(&mut self, separator: &[u8]) {
        let command = self.serve_shell(separator, 16);
        assert_eq!(command, "echo");
    }

    pub fn raw_socket(&self) -> &TcpStream {
        &self.socket
    }

    pub fn hang_up(self) {
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
    }
}

/// Receive with the shared bound, panicking on timeout.
pub fn recv_within<T>(rx: &Receiver<T>, what: &str) -> T {
    rx.recv_timeout(WAIT)
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

//! One-way file push over a `sync:` stream.
//!
//! The sync service speaks in records of a four-byte tag and a
//! little-endian u32: `SEND` + length + `"<path>,<mode>"`, then `DATA` +
//! length + bytes per chunk, then `DONE` + mtime. The daemon answers with
//! `OKAY` + 0 or `FAIL` + length + message.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::connection::Connection;
use crate::error::{Result, SessionError};
use crate::reader::StreamReader;

const SYNC_DESTINATION: &str = "sync:";

/// Largest FAIL message read back from the daemon.
const MAX_FAIL_MESSAGE: usize = 64 * 1024;

impl Connection {
    /// Push a local file to `remote` with permission bits `mode`
    /// (for example `0o100644`). Returns the number of bytes sent.
    pub fn push(&self, local: impl AsRef<Path>, remote: &str, mode: u32) -> Result<u64> {
        let local = local.as_ref();
        let file = File::open(local).map_err(|source| SessionError::Io {
            context: format!("opening {}", local.display()),
            source,
        })?;
        let mtime = file
            .metadata()
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map_or_else(unix_now, |since| since.as_secs() as u32);

        self.push_reader(file, remote, mode, mtime)
    }

    /// Push everything `source` yields to `remote`.
    ///
    /// Each DATA record carries at most the connection's max payload. Its
    /// eight-byte header goes out in its own WRTE so that the file bytes
    /// travel as whole payload-sized WRTEs.
    pub fn push_reader<R: Read>(&self, mut source: R, remote: &str, mode: u32, mtime: u32) -> Result<u64> {
        let mut stream = self.open(SYNC_DESTINATION)?;
        let chunk_size = self.max_payload();

        let target = format!("{remote},{mode}");
        stream
            .output()
            .put_str("SEND")?
            .put_u32_le(target.len() as u32)?
            .put_str(&target)?;
        stream.output().flush()?;

        let mut chunk = vec![0u8; chunk_size];
        let mut total = 0u64;
        loop {
            let n = read_chunk(&mut source, &mut chunk).map_err(|source| SessionError::Io {
                context: format!("reading data for {remote}"),
                source,
            })?;
            if n == 0 {
                break;
            }
            let output = stream.output();
            output.put_str("DATA")?.put_u32_le(n as u32)?;
            output.flush()?;
            output.put_slice(&chunk[..n])?;
            output.flush()?;
            total += n as u64;
        }

        stream.output().put_str("DONE")?.put_u32_le(mtime)?;
        stream.output().flush()?;

        read_status(stream.input(), remote)?;
        debug!(address = %self.address(), remote, bytes = total, "push complete");
        stream.close()?;
        Ok(total)
    }
}

/// Fill `buf` unless the source ends first.
fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn read_status(input: &mut StreamReader, remote: &str) -> Result<()> {
    let failed = |message: String| SessionError::SyncFailed {
        remote_path: remote.to_string(),
        message,
    };

    let header = input.read_up_to(8);
    if header.len() < 8 {
        return Err(failed("daemon closed the sync stream without a status".to_string()));
    }
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    match &header[..4] {
        b"OKAY" => Ok(()),
        b"FAIL" => {
            let message = input.read_up_to(len.min(MAX_FAIL_MESSAGE));
            Err(failed(String::from_utf8_lossy(&message).into_owned()))
        }
        other => Err(failed(format!(
            "unexpected status record '{}'",
            other.escape_ascii()
        ))),
    }
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs() as u32)
        .unwrap_or_default()
}

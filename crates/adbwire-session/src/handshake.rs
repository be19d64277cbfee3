use std::collections::BTreeMap;
use std::io::{Read, Write};

use adbwire_frame::{Command, Frame, FrameError, FrameReader, FrameWriter, A_VERSION, DEFAULT_MAX_PAYLOAD};
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, SessionError};

/// Identity a host-side client announces in CNXN.
pub const HOST_IDENTITY: &str = "host::\0";

/// Configuration for the CNXN exchange.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Identity payload sent in CNXN, NUL included.
    pub identity: String,
    /// Protocol version sent in CNXN.
    pub version: u32,
    /// Largest payload this side accepts and emits.
    pub max_payload: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            identity: HOST_IDENTITY.to_string(),
            version: A_VERSION,
            max_payload: DEFAULT_MAX_PAYLOAD as u32,
        }
    }
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandshakeResult {
    /// Protocol version the daemon declared.
    pub version: u32,
    /// Largest payload either side may emit: the smaller declaration wins.
    pub max_payload: usize,
    /// The daemon's identity string, trailing NULs removed.
    pub banner: String,
}

impl HandshakeResult {
    /// Structured view of the daemon banner.
    pub fn device(&self) -> DeviceBanner {
        DeviceBanner::parse(&self.banner)
    }
}

/// A daemon banner: `<systemtype>:<serial>:<key=value;...>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceBanner {
    pub system_type: String,
    pub serial: String,
    pub properties: BTreeMap<String, String>,
}

impl DeviceBanner {
    /// Parse a banner. Missing parts are left empty; malformed properties
    /// are skipped.
    pub fn parse(banner: &str) -> Self {
        let banner = banner.trim_end_matches('\0');
        let mut parts = banner.splitn(3, ':');
        let system_type = parts.next().unwrap_or_default().to_string();
        let serial = parts.next().unwrap_or_default().to_string();
        let properties = parts
            .next()
            .unwrap_or_default()
            .split(';')
            .filter_map(|entry| entry.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();

        Self {
            system_type,
            serial,
            properties,
        }
    }

    /// Look up a banner property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn product_name(&self) -> Option<&str> {
        self.property("ro.product.name")
    }

    pub fn model(&self) -> Option<&str> {
        self.property("ro.product.model")
    }

    pub fn device(&self) -> Option<&str> {
        self.property("ro.product.device")
    }

    /// Comma-separated `features` property.
    pub fn features(&self) -> Vec<&str> {
        self.property("features")
            .map(|list| list.split(',').filter(|f| !f.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// Perform the client side of the CNXN exchange.
///
/// Sends CNXN, then drops every frame until the daemon's CNXN arrives. AUTH
/// is not answered, so a daemon that insists on authentication leaves this
/// call blocked until the socket is closed or times out.
pub fn handshake_client<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    config: &HandshakeConfig,
) -> Result<HandshakeResult> {
    if config.max_payload == 0 {
        return Err(SessionError::HandshakeFailed(
            "local max payload must be non-zero".to_string(),
        ));
    }

    writer.write_frame(&Frame::cnxn(
        config.version,
        config.max_payload,
        config.identity.clone().into_bytes(),
    ))?;

    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                return Err(SessionError::HandshakeFailed(
                    "daemon closed the connection before CNXN".to_string(),
                ));
            }
            Err(err @ FrameError::Truncated { .. }) => {
                return Err(SessionError::HandshakeFailed(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        if frame.kind() != Some(Command::Cnxn) {
            debug!(frame = %frame, "dropping frame received before CNXN");
            continue;
        }

        if frame.arg1 == 0 {
            return Err(SessionError::HandshakeFailed(
                "daemon declared a zero max payload".to_string(),
            ));
        }

        let banner = String::from_utf8_lossy(&frame.payload)
            .trim_end_matches('\0')
            .to_string();
        let max_payload = config.max_payload.min(frame.arg1) as usize;
        debug!(version = frame.arg0, max_payload, banner = %banner, "received CNXN");

        return Ok(HandshakeResult {
            version: frame.arg0,
            max_payload,
            banner,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use adbwire_frame::{encode_frame, A_AUTH, A_CNXN};
    use bytes::BytesMut;

    use super::*;

    fn daemon_bytes(frames: &[Frame]) -> Cursor<Vec<u8>> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        Cursor::new(buf.to_vec())
    }

    fn sent_frames(writer: FrameWriter<Cursor<Vec<u8>>>) -> Vec<Frame> {
        let bytes = writer.into_inner().into_inner();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let mut frames = Vec::new();
        while let Ok(frame) = reader.read_frame() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn successful_handshake() {
        let banner = "device::ro.product.name=sdk;ro.product.model=Pixel 7;ro.product.device=panther;features=shell_v2,cmd\0";
        let mut reader = FrameReader::new(daemon_bytes(&[Frame::cnxn(A_VERSION, 256 * 1024, banner)]));
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));

        let result = handshake_client(&mut reader, &mut writer, &HandshakeConfig::default()).unwrap();

        assert_eq!(result.version, A_VERSION);
        assert_eq!(result.max_payload, 4096);
        assert_eq!(result.device().model(), Some("Pixel 7"));

        let sent = sent_frames(writer);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].command, A_CNXN);
        assert_eq!((sent[0].arg0, sent[0].arg1), (0x0100_0000, 4096));
        assert_eq!(sent[0].payload.as_ref(), b"host::\0");
    }

    #[test]
    fn frames_before_cnxn_are_dropped() {
        let mut reader = FrameReader::new(daemon_bytes(&[
            Frame::auth(1, vec![7u8; 20]),
            Frame::okay(9, 9),
            Frame::cnxn(A_VERSION, 4096, "device::\0"),
        ]));
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));

        let result = handshake_client(&mut reader, &mut writer, &HandshakeConfig::default()).unwrap();

        assert_eq!(result.banner, "device::");
        // AUTH is never answered.
        assert!(sent_frames(writer).iter().all(|f| f.command != A_AUTH));
    }

    #[test]
    fn smaller_peer_payload_wins() {
        let mut reader = FrameReader::new(daemon_bytes(&[Frame::cnxn(A_VERSION, 1024, "device::\0")]));
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));

        let result = handshake_client(&mut reader, &mut writer, &HandshakeConfig::default()).unwrap();
        assert_eq!(result.max_payload, 1024);
    }

    #[test]
    fn eof_before_cnxn_fails() {
        let mut reader = FrameReader::new(daemon_bytes(&[Frame::auth(1, "token")]));
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));

        let err = handshake_client(&mut reader, &mut writer, &HandshakeConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::HandshakeFailed(_)));
        assert!(err.is_connection_fatal());
    }

    #[test]
    fn truncated_cnxn_fails() {
        let mut bytes = daemon_bytes(&[Frame::cnxn(A_VERSION, 4096, "device::\0")]).into_inner();
        bytes.truncate(bytes.len() - 3);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));

        let err = handshake_client(&mut reader, &mut writer, &HandshakeConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::HandshakeFailed(reason) if reason.contains("truncated")));
    }

    #[test]
    fn zero_max_payload_rejected() {
        let mut reader = FrameReader::new(daemon_bytes(&[Frame::cnxn(A_VERSION, 0, "device::\0")]));
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let err = handshake_client(&mut reader, &mut writer, &HandshakeConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::HandshakeFailed(_)));

        let cfg = HandshakeConfig {
            max_payload: 0,
            ..HandshakeConfig::default()
        };
        let mut reader = FrameReader::new(daemon_bytes(&[]));
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let err = handshake_client(&mut reader, &mut writer, &cfg).unwrap_err();
        assert!(matches!(err, SessionError::HandshakeFailed(_)));
    }

    #[test]
    fn banner_parsing() {
        let banner = DeviceBanner::parse(
            "device:emulator-5554:ro.product.name=sdk_gphone;ro.product.model=sdk;ro.product.device=generic;features=cmd,stat_v2,",
        );
        assert_eq!(banner.system_type, "device");
        assert_eq!(banner.serial, "emulator-5554");
        assert_eq!(banner.product_name(), Some("sdk_gphone"));
        assert_eq!(banner.device(), Some("generic"));
        assert_eq!(banner.features(), vec!["cmd", "stat_v2"]);
    }

    #[test]
    fn partial_banner_parsing() {
        let banner = DeviceBanner::parse("recovery");
        assert_eq!(banner.system_type, "recovery");
        assert!(banner.serial.is_empty());
        assert!(banner.properties.is_empty());
        assert!(banner.features().is_empty());

        let banner = DeviceBanner::parse("device::junk;key=value;=nokey;");
        assert_eq!(banner.properties.len(), 1);
        assert_eq!(banner.property("key"), Some("value"));
    }
}

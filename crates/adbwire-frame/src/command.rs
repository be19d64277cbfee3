//! Command tags.
//!
//! Each tag is four ASCII bytes read as a little-endian `u32`, so `CNXN` on
//! the wire is the bytes `b"CNXN"` and the constant `0x4e584e43`.

/// Protocol version sent in CNXN.
pub const A_VERSION: u32 = 0x0100_0000;

/// Connection handshake.
pub const A_CNXN: u32 = tag(b"CNXN");
/// Authentication exchange (acknowledged, not implemented).
pub const A_AUTH: u32 = tag(b"AUTH");
/// Open a logical stream to a named destination.
pub const A_OPEN: u32 = tag(b"OPEN");
/// Stream ready / write acknowledgement.
pub const A_OKAY: u32 = tag(b"OKAY");
/// Stream data.
pub const A_WRTE: u32 = tag(b"WRTE");
/// Stream close.
pub const A_CLSE: u32 = tag(b"CLSE");
/// Legacy transport sync.
pub const A_SYNC: u32 = tag(b"SYNC");

const fn tag(name: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*name)
}

/// Known frame commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Cnxn,
    Auth,
    Open,
    Okay,
    Wrte,
    Clse,
    Sync,
}

impl Command {
    /// Map a raw wire tag to a known command.
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            A_CNXN => Some(Command::Cnxn),
            A_AUTH => Some(Command::Auth),
            A_OPEN => Some(Command::Open),
            A_OKAY => Some(Command::Okay),
            A_WRTE => Some(Command::Wrte),
            A_CLSE => Some(Command::Clse),
            A_SYNC => Some(Command::Sync),
            _ => None,
        }
    }

    /// Raw wire tag.
    pub fn as_u32(self) -> u32 {
        match self {
            Command::Cnxn => A_CNXN,
            Command::Auth => A_AUTH,
            Command::Open => A_OPEN,
            Command::Okay => A_OKAY,
            Command::Wrte => A_WRTE,
            Command::Clse => A_CLSE,
            Command::Sync => A_SYNC,
        }
    }

    /// Four-letter name as it appears on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Command::Cnxn => "CNXN",
            Command::Auth => "AUTH",
            Command::Open => "OPEN",
            Command::Okay => "OKAY",
            Command::Wrte => "WRTE",
            Command::Clse => "CLSE",
            Command::Sync => "SYNC",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

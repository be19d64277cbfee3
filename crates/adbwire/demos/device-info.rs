//! Connect to a device daemon, print what it reports and read a few
//! properties over a shell stream.
//!
//! Run with:
//!   cargo run --example device-info -- 192.168.1.40:5555

use adbwire::session::{Connection, ConnectionConfig, DaemonAddress};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = DaemonAddress::parse(
        &std::env::args()
            .nth(1)
            .unwrap_or_else(|| "127.0.0.1:5555".to_string()),
    )?;

    let connection = Connection::connect(&address, &ConnectionConfig::default())?;
    let handshake = connection.handshake();
    let device = handshake.device();
    eprintln!("Connected to {address}");
    eprintln!("  protocol:    {:#010x}", handshake.version);
    eprintln!("  max payload: {}", handshake.max_payload);
    eprintln!("  model:       {}", device.model().unwrap_or("unknown"));

    eprintln!("  abi:         {}", connection.cpu_abi()?);
    eprintln!("  sdk:         {}", connection.sdk_version()?);

    // Streams are plain byte streams too.
    let mut stream = connection.open("shell:uptime")?;
    for line in stream.input().lines() {
        eprintln!("  uptime:      {line}");
    }

    connection.close();
    Ok(())
}

use std::path::PathBuf;
use std::time::Duration;

use adbwire_session::{connect_with_timeout, Connection, ConnectionConfig, DaemonAddress};
use clap::{Args, Subcommand};
use tracing::debug;

use crate::exit::{session_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod getprop;
pub mod info;
pub mod input;
pub mod push;
pub mod screencap;
pub mod shell;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a shell command on the device.
    Shell(ShellArgs),
    /// Capture the screen as PNG.
    Screencap(ScreencapArgs),
    /// Copy a local file to the device.
    Push(PushArgs),
    /// Inject a tap.
    Tap(TapArgs),
    /// Inject a swipe.
    Swipe(SwipeArgs),
    /// Read one system property, or all of them.
    Getprop(GetpropArgs),
    /// Handshake with the daemon and print what it reports.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Where and how to connect; shared by every device command.
#[derive(Debug, Clone)]
pub struct Target {
    pub address: String,
    pub timeout: String,
}

impl Target {
    /// Connect and handshake within the configured timeout.
    pub fn connect(&self) -> CliResult<Connection> {
        let address = DaemonAddress::parse(&self.address)
            .map_err(|err| transport_error("invalid --address", err))?;
        let timeout = parse_duration(&self.timeout)?;
        debug!(%address, ?timeout, "connecting");

        let config = ConnectionConfig {
            connect_timeout: Some(timeout),
            ..ConnectionConfig::default()
        };
        connect_with_timeout(&address, &config, timeout)
            .map_err(|err| session_error(&format!("connect to {address} failed"), err))
    }
}

pub fn run(command: Command, target: &Target, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Shell(args) => shell::run(args, target, format),
        Command::Screencap(args) => screencap::run(args, target, format),
        Command::Push(args) => push::run(args, target, format),
        Command::Tap(args) => input::tap(args, target, format),
        Command::Swipe(args) => input::swipe(args, target, format),
        Command::Getprop(args) => getprop::run(args, target, format),
        Command::Info(args) => info::run(args, target, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ShellArgs {
    /// Command line to run.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
    /// Stream output as it arrives until the command ends or Ctrl-C.
    #[arg(long, short = 'f')]
    pub follow: bool,
}

#[derive(Args, Debug)]
pub struct ScreencapArgs {
    /// File to write the PNG to.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: PathBuf,
    /// Fail unless the screen is exactly this size (e.g. 1080x2400).
    #[arg(long, value_name = "WxH")]
    pub expect: Option<String>,
}

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Local file to send.
    pub local: PathBuf,
    /// Destination path on the device.
    pub remote: String,
    /// Permission bits in octal.
    #[arg(long, default_value = "0644")]
    pub mode: String,
}

#[derive(Args, Debug)]
pub struct TapArgs {
    pub x: i32,
    pub y: i32,
}

#[derive(Args, Debug)]
pub struct SwipeArgs {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    /// Swipe duration in milliseconds.
    #[arg(long, short = 'd', default_value = "300")]
    pub duration: u32,
}

#[derive(Args, Debug)]
pub struct GetpropArgs {
    /// Property name. Omit to list every property.
    pub name: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

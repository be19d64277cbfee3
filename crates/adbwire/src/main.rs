mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, Target};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "adbwire", version, about = "ADB wire-protocol client")]
struct Cli {
    /// Daemon address (host[:port]).
    #[arg(
        long,
        short = 'a',
        value_name = "ADDRESS",
        env = "ADBWIRE_ADDRESS",
        default_value = "127.0.0.1:5555",
        global = true
    )]
    address: String,

    /// Connect and handshake timeout (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", env = "ADBWIRE_TIMEOUT", default_value = "5s", global = true)]
    timeout: String,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let target = Target {
        address: cli.address,
        timeout: cli.timeout,
    };
    let result = cmd::run(cli.command, &target, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

use std::io::Write;

use adbwire_session::Connection;
use serde::Serialize;

use crate::cmd::{ShellArgs, Target};
use crate::exit::{io_error, session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_raw, OutputFormat};

#[derive(Serialize)]
struct ShellOutput<'a> {
    command: &'a str,
    output: String,
    bytes: usize,
}

#[derive(Serialize)]
struct ShellLine<'a> {
    command: &'a str,
    line: String,
}

pub fn run(args: ShellArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    let command = args.command.join(" ");
    let connection = target.connect()?;

    let result = if args.follow {
        follow(&connection, &command, format)
    } else {
        once(&connection, &command, format)
    };
    connection.close();
    result
}

fn once(connection: &Connection, command: &str, format: OutputFormat) -> CliResult<i32> {
    let output = connection
        .shell_bytes(command)
        .map_err(|err| session_error("shell failed", err))?;

    match format {
        OutputFormat::Json => {
            let out = ShellOutput {
                command,
                output: String::from_utf8_lossy(&output).into_owned(),
                bytes: output.len(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => print_raw(&output),
    }
    Ok(SUCCESS)
}

/// Stream output until the command exits. Ctrl-C closes the connection,
/// which ends the stream.
fn follow(connection: &Connection, command: &str, format: OutputFormat) -> CliResult<i32> {
    let mut stream = connection
        .open(&format!("shell:{command}"))
        .map_err(|err| session_error("shell failed", err))?;
    install_ctrlc_handler(connection.clone())?;

    match format {
        OutputFormat::Json => {
            for line in stream.input().lines() {
                let out = ShellLine { command, line };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => {
            let mut stdout = std::io::stdout().lock();
            stream
                .input()
                .transfer_to(&mut stdout)
                .map_err(|err| session_error("writing output failed", err))?;
            stdout
                .flush()
                .map_err(|err| io_error("writing output failed", err))?;
        }
    }
    Ok(SUCCESS)
}

fn install_ctrlc_handler(connection: Connection) -> CliResult<()> {
    ctrlc::set_handler(move || {
        connection.close();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

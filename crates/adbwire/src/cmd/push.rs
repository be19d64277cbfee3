use std::time::Instant;

use serde::Serialize;

use crate::cmd::{PushArgs, Target};
use crate::exit::{session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_result, Field, OutputFormat};

const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;

#[derive(Serialize)]
struct PushOutput {
    local: String,
    remote: String,
    mode: String,
    bytes: u64,
    elapsed_ms: f64,
}

pub fn run(args: PushArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    let mode = parse_mode(&args.mode)?;
    let connection = target.connect()?;

    let started = Instant::now();
    let pushed = connection.push(&args.local, &args.remote, mode);
    connection.close();
    let bytes = pushed.map_err(|err| session_error("push failed", err))?;

    let out = PushOutput {
        local: args.local.display().to_string(),
        remote: args.remote,
        mode: format!("{mode:o}"),
        bytes,
        elapsed_ms: (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
    };
    print_result(
        &out,
        &[
            Field::new("Local", &out.local),
            Field::new("Remote", &out.remote),
            Field::new("Mode", &out.mode),
            Field::new("Bytes", out.bytes),
            Field::new("Elapsed", format!("{:.2}ms", out.elapsed_ms)),
        ],
        &out.bytes.to_string(),
        format,
    );
    Ok(SUCCESS)
}

/// Octal permission bits; a regular-file type is added when none is given.
fn parse_mode(input: &str) -> CliResult<u32> {
    let digits = input.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| CliError::new(USAGE, format!("invalid octal mode: {input}")))?;
    if mode > 0o177777 {
        return Err(CliError::new(USAGE, format!("mode out of range: {input}")));
    }
    Ok(if mode & S_IFMT == 0 { mode | S_IFREG } else { mode })
}

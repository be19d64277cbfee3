use adbwire_session::png_dimensions;
use serde::Serialize;

use crate::cmd::{ScreencapArgs, Target};
use crate::exit::{io_error, session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_result, Field, OutputFormat};

#[derive(Serialize)]
struct ScreencapOutput {
    path: String,
    bytes: usize,
    width: Option<u32>,
    height: Option<u32>,
}

pub fn run(args: ScreencapArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    let expected = args.expect.as_deref().map(parse_size).transpose()?;
    let connection = target.connect()?;

    let png = match expected {
        Some((width, height)) => connection.screencap_expecting(width, height),
        None => connection.screencap(),
    };
    connection.close();
    let png = png.map_err(|err| session_error("screencap failed", err))?;

    std::fs::write(&args.output, &png)
        .map_err(|err| io_error(&format!("failed writing {}", args.output.display()), err))?;

    let size = png_dimensions(&png).ok();
    let out = ScreencapOutput {
        path: args.output.display().to_string(),
        bytes: png.len(),
        width: size.map(|(w, _)| w),
        height: size.map(|(_, h)| h),
    };
    let dimensions = size.map_or_else(|| "unknown".to_string(), |(w, h)| format!("{w}x{h}"));
    print_result(
        &out,
        &[
            Field::new("Path", &out.path),
            Field::new("Bytes", out.bytes),
            Field::new("Size", &dimensions),
        ],
        &out.path,
        format,
    );
    Ok(SUCCESS)
}

/// Parse `WIDTHxHEIGHT`.
fn parse_size(input: &str) -> CliResult<(u32, u32)> {
    let invalid = || CliError::new(USAGE, format!("invalid size '{input}', expected WIDTHxHEIGHT"));
    let (width, height) = input
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(invalid)?;
    let width: u32 = width.parse().map_err(|_| invalid())?;
    let height: u32 = height.parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

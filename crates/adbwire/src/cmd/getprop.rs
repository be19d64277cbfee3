use serde::Serialize;

use crate::cmd::{GetpropArgs, Target};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_pairs, print_result, Field, OutputFormat};

#[derive(Serialize)]
struct PropOutput<'a> {
    name: &'a str,
    value: &'a str,
}

pub fn run(args: GetpropArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    let connection = target.connect()?;

    let result = match &args.name {
        Some(name) => connection.getprop(name),
        None => connection.getprop_all(),
    };
    connection.close();
    let output = result.map_err(|err| session_error("getprop failed", err))?;

    match &args.name {
        Some(name) => {
            let out = PropOutput {
                name,
                value: &output,
            };
            print_result(
                &out,
                &[Field::new("Name", name), Field::new("Value", &output)],
                &output,
                format,
            );
        }
        None => print_pairs(&parse_listing(&output), ["PROPERTY", "VALUE"], format),
    }
    Ok(SUCCESS)
}

/// Parse `getprop` listing lines of the form `[name]: [value]`.
fn parse_listing(listing: &str) -> Vec<(String, String)> {
    listing
        .lines()
        .filter_map(|line| {
            let (name, value) = line.trim().split_once("]: [")?;
            let name = name.strip_prefix('[')?;
            let value = value.strip_suffix(']')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

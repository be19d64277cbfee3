use adbwire_frame::{A_VERSION, DEFAULT_MAX_PAYLOAD};
use adbwire_session::DEFAULT_DAEMON_PORT;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("adbwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: adbwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", option_env!("ADBWIRE_BUILD_TARGET").unwrap_or("unknown"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("protocol_version: {A_VERSION:#010x}");
    println!("max_payload: {DEFAULT_MAX_PAYLOAD}");
    println!("default_port: {DEFAULT_DAEMON_PORT}");
    println!("features: session={}, cli=true", cfg!(feature = "session"));

    Ok(SUCCESS)
}

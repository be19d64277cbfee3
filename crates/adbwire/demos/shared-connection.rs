//! Two independent workers share one daemon connection through a registry.
//! The connection closes when the last of them releases it.
//!
//! Run with:
//!   cargo run --example shared-connection -- 192.168.1.40:5555

use std::sync::Arc;
use std::thread;

use adbwire::session::{DaemonAddress, Holder, Registry};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = DaemonAddress::parse(
        &std::env::args()
            .nth(1)
            .unwrap_or_else(|| "127.0.0.1:5555".to_string()),
    )?;
    let registry = Arc::new(Registry::new());

    let workers: Vec<_> = ["getprop ro.product.model", "getprop ro.build.version.release"]
        .into_iter()
        .map(|command| {
            let registry = Arc::clone(&registry);
            let address = address.clone();
            thread::spawn(move || -> Result<String, adbwire::session::SessionError> {
                let holder = Holder::new();
                let connection = registry.acquire(holder, &address)?;
                let output = connection.shell(command);
                registry.release(holder, &address);
                output
            })
        })
        .collect();

    for worker in workers {
        match worker.join() {
            Ok(Ok(output)) => eprintln!("{output}"),
            Ok(Err(err)) => eprintln!("worker failed: {err}"),
            Err(_) => eprintln!("worker panicked"),
        }
    }
    eprintln!("connections left open: {}", registry.len());
    Ok(())
}

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::cmd::{InfoArgs, Target};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_result, Field, OutputFormat};

#[derive(Serialize)]
struct InfoOutput {
    address: String,
    protocol_version: String,
    max_payload: usize,
    banner: String,
    system_type: String,
    serial: String,
    properties: BTreeMap<String, String>,
    features: Vec<String>,
    handshake_ms: f64,
    connected: bool,
}

pub fn run(_args: InfoArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    let started = Instant::now();
    let connection = target.connect()?;
    let handshake_ms = (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0;

    let handshake = connection.handshake().clone();
    let device = handshake.device();
    let out = InfoOutput {
        address: connection.address().to_string(),
        protocol_version: format!("{:#010x}", handshake.version),
        max_payload: handshake.max_payload,
        features: device.features().into_iter().map(str::to_string).collect(),
        banner: handshake.banner,
        system_type: device.system_type,
        serial: device.serial,
        properties: device.properties,
        handshake_ms,
        connected: !connection.is_closed(),
    };
    connection.close();

    let mut fields = vec![
        Field::new("Address", &out.address),
        Field::new("Protocol", &out.protocol_version),
        Field::new("Max payload", out.max_payload),
        Field::new("System type", &out.system_type),
    ];
    for (key, label) in [
        ("ro.product.model", "Model"),
        ("ro.product.name", "Product"),
        ("ro.product.device", "Device"),
    ] {
        if let Some(value) = out.properties.get(key) {
            fields.push(Field::new(label, value));
        }
    }
    if !out.features.is_empty() {
        fields.push(Field::new("Features", out.features.join(", ")));
    }
    fields.push(Field::new("Handshake", format!("{:.2}ms", out.handshake_ms)));

    print_result(&out, &fields, &out.banner, format);
    Ok(SUCCESS)
}

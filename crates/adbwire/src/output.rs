use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One labelled value of a command result, for the table and pretty forms.
pub struct Field {
    pub label: &'static str,
    pub value: String,
}

impl Field {
    pub fn new(label: &'static str, value: impl ToString) -> Self {
        Self {
            label,
            value: value.to_string(),
        }
    }
}

/// Print a command result. `json` is serialized as-is; `raw` is the bare
/// value a script would want.
pub fn print_result<T: Serialize>(json: &T, fields: &[Field], raw: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(json).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for field in fields {
                table.add_row(vec![field.label.to_string(), field.value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let width = fields.iter().map(|f| f.label.len()).max().unwrap_or(0) + 1;
            for field in fields {
                println!("  {:<width$} {}", format!("{}:", field.label), field.value);
            }
        }
        OutputFormat::Raw => {
            println!("{raw}");
        }
    }
}

/// Print rows of key/value pairs, e.g. properties.
pub fn print_pairs(pairs: &[(String, String)], headers: [&str; 2], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = pairs
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            println!(
                "{}",
                serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(headers.to_vec());
            for (key, value) in pairs {
                table.add_row(vec![key.clone(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for (key, value) in pairs {
                println!("[{key}]: [{value}]");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

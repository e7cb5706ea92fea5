use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use discord_ipc_frame::{opcode_name, Message};
use serde::Serialize;
use serde_json::Value;

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

#[derive(Serialize)]
struct FrameOutput<'a> {
    kind: &'a str,
    opcode: Option<u32>,
    opcode_name: Option<&'a str>,
    endpoint: &'a str,
    cmd: Option<&'a str>,
    evt: Option<&'a str>,
    body: &'a Value,
    timestamp: String,
}

/// Print a frame received on an established session.
pub fn print_message(message: &Message, endpoint: &str, format: OutputFormat) {
    print_body(
        "frame",
        Some(message.opcode),
        &message.body,
        endpoint,
        format,
    );
}

/// Print the body the server accepted the handshake with.
pub fn print_handshake(reply: &Value, endpoint: &str, format: OutputFormat) {
    print_body("handshake", None, reply, endpoint, format);
}

fn print_body(
    kind: &str,
    opcode: Option<u32>,
    body: &Value,
    endpoint: &str,
    format: OutputFormat,
) {
    let cmd = body.get("cmd").and_then(Value::as_str);
    let evt = body.get("evt").and_then(Value::as_str);

    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                kind,
                opcode,
                opcode_name: opcode.map(opcode_name),
                endpoint,
                cmd,
                evt,
                body,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OPCODE", "CMD", "EVT", "BODY"])
                .add_row(vec![
                    opcode_label(opcode),
                    cmd.unwrap_or("-").to_string(),
                    evt.unwrap_or("-").to_string(),
                    body.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{kind} opcode={} cmd={} evt={} endpoint={endpoint}",
                opcode_label(opcode),
                cmd.unwrap_or("-"),
                evt.unwrap_or("-"),
            );
            println!(
                "{}",
                serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
            );
        }
        OutputFormat::Raw => {
            print_raw(format!("{body}\n").as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn opcode_label(opcode: Option<u32>) -> String {
    match opcode {
        Some(op) => format!("{op} ({})", opcode_name(op)),
        None => "-".to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

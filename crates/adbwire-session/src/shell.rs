//! Device operations over `shell:` streams.

use tracing::debug;

use crate::connection::Connection;
use crate::error::{Result, SessionError};

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

impl Connection {
    /// Run `command` and return its output lines joined with `\n`.
    pub fn shell(&self, command: &str) -> Result<String> {
        Ok(self.open(&format!("shell:{command}"))?.input().read_all_text())
    }

    /// Run `command` and return its raw output.
    pub fn shell_bytes(&self, command: &str) -> Result<Vec<u8>> {
        Ok(self.open(&format!("shell:{command}"))?.input().read_all())
    }

    /// Run `command`, discarding output, and wait for it to finish.
    pub fn shell_discard(&self, command: &str) -> Result<()> {
        self.open(&format!("shell:{command}"))?.input().skip_all();
        Ok(())
    }

    /// Line separator the device shell emits: `"\n"`, or `"\r\n"` on
    /// daemons whose shell runs through a terminal. Probed once with `echo`.
    pub fn line_separator(&self) -> Result<String> {
        if let Some(separator) = self.inner().line_separator.get() {
            return Ok(separator.clone());
        }
        let probe = self.shell_bytes("echo")?;
        let separator = match probe.as_slice() {
            b"\r\n" => "\r\n",
            _ => "\n",
        };
        debug!(address = %self.address(), separator = ?separator, "probed shell line separator");
        Ok(self.inner().line_separator.get_or_init(|| separator.to_string()).clone())
    }

    /// Value of a system property, trimmed. Empty if unset.
    pub fn getprop(&self, name: &str) -> Result<String> {
        Ok(self.shell(&format!("getprop {name}"))?.trim().to_string())
    }

    /// All system properties as printed by `getprop`.
    pub fn getprop_all(&self) -> Result<String> {
        self.shell("getprop")
    }

    pub fn cpu_abi(&self) -> Result<String> {
        self.getprop("ro.product.cpu.abi")
    }

    /// Android API level.
    pub fn sdk_version(&self) -> Result<u32> {
        let command = "getprop ro.build.version.sdk";
        let output = self.shell(command)?;
        output
            .trim()
            .parse()
            .map_err(|_| SessionError::UnexpectedOutput {
                command: command.to_string(),
                output,
            })
    }

    /// Inject a tap.
    pub fn tap(&self, x: i32, y: i32) -> Result<()> {
        self.shell_discard(&format!("input tap {x} {y}"))
    }

    /// Inject a swipe lasting `duration_ms`.
    pub fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32) -> Result<()> {
        self.shell_discard(&format!("input swipe {x1} {y1} {x2} {y2} {duration_ms}"))
    }

    pub fn is_app_running(&self, package: &str) -> Result<bool> {
        Ok(!self.shell(&format!("pidof -s {package}"))?.trim().is_empty())
    }

    pub fn start_app(&self, package: &str, activity: &str) -> Result<()> {
        self.shell_discard(&format!("am start {package}/{activity}"))
    }

    pub fn force_stop_app(&self, package: &str) -> Result<()> {
        self.shell_discard(&format!("am force-stop {package}"))
    }

    /// Capture the screen as PNG bytes.
    pub fn screencap(&self) -> Result<Vec<u8>> {
        let translate = self.line_separator()? == "\r\n";
        let raw = self.shell_bytes("screencap -p")?;
        Ok(if translate { fold_crlf(&raw) } else { raw })
    }

    /// Capture the screen and require the given dimensions.
    pub fn screencap_expecting(&self, width: u32, height: u32) -> Result<Vec<u8>> {
        let png = self.screencap()?;
        let (actual_width, actual_height) = png_dimensions(&png)?;
        if (actual_width, actual_height) != (width, height) {
            return Err(SessionError::UnexpectedScreenSize {
                expected_width: width,
                expected_height: height,
                width: actual_width,
                height: actual_height,
            });
        }
        Ok(png)
    }
}

/// Undo a terminal's `\n` to `\r\n` translation.
pub fn fold_crlf(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        if byte == b'\r' && bytes.peek() == Some(&b'\n') {
            continue;
        }
        out.push(byte);
    }
    out
}

/// Width and height from a PNG's IHDR chunk.
pub fn png_dimensions(data: &[u8]) -> Result<(u32, u32)> {
    if data.len() < 24 || &data[..8] != PNG_SIGNATURE {
        return Err(SessionError::InvalidImage(format!(
            "not a PNG image ({} bytes)",
            data.len()
        )));
    }
    if &data[12..16] != b"IHDR" {
        return Err(SessionError::InvalidImage(
            "PNG does not start with IHDR".to_string(),
        ));
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Ok((width, height))
}

//! Subprocess probing for environment facts
//!
//! Runs a short-lived command and captures its output. Each output stream is
//! drained on its own thread so a chatty child cannot block on a full pipe. The
//! call blocks until the child exits and both drains finish; there is no timeout.

use crate::error::{EngineError, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, instrument, warn};

/// Output of a finished probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutput {
    /// Exit status code
    pub exit_code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Whether the process was successful
    pub success: bool,
}

/// Runs probe commands with one drain thread per output stream
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessProbe;

impl ProcessProbe {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Run `command` and wait for it and both drain threads
    #[instrument(skip(self))]
    pub fn run(&self, command: &str, args: &[&str]) -> Result<ProbeOutput> {
        let cmd_str = format!("{} {}", command, args.join(" "));
        debug!("Probing with: {}", cmd_str);

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EngineError::process(
                    cmd_str.clone(),
                    None,
                    String::new(),
                    format!("Failed to execute command: {e}"),
                )
            })?;

        let stdout_drain = child.stdout.take().map(|stream| thread::spawn(move || drain(stream)));
        let stderr_drain = child.stderr.take().map(|stream| thread::spawn(move || drain(stream)));

        let status = child.wait().map_err(|e| {
            EngineError::process(
                cmd_str.clone(),
                None,
                String::new(),
                format!("Failed to wait for command: {e}"),
            )
        })?;

        let stdout = join_drain(stdout_drain);
        let stderr = join_drain(stderr_drain);
        let success = status.success();
        let exit_code = status.code();

        debug!(
            "Probe finished: success={}, exit_code={:?}, stdout_len={}, stderr_len={}",
            success,
            exit_code,
            stdout.len(),
            stderr.len()
        );

        if !success {
            return Err(EngineError::process(cmd_str, exit_code, stdout, stderr));
        }

        Ok(ProbeOutput {
            exit_code,
            stdout,
            stderr,
            success,
        })
    }

    /// Terminal width in columns, if it can be determined
    #[instrument(skip(self))]
    pub fn terminal_width(&self) -> Option<u16> {
        match self.run("tput", &["cols"]) {
            Ok(output) => {
                if let Ok(width) = output.stdout.trim().parse::<u16>() {
                    return Some(width);
                }
                warn!("Unexpected tput output: {:?}", output.stdout);
            }
            Err(e) => debug!("tput probe failed: {}", e),
        }

        std::env::var("COLUMNS")
            .ok()
            .and_then(|cols| cols.trim().parse().ok())
    }
}

fn drain<R: Read>(mut stream: R) -> String {
    let mut buffer = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buffer) {
        warn!("Failed to drain probe output: {}", e);
    }
    String::from_utf8_lossy(&buffer).to_string()
}

fn join_drain(handle: Option<thread::JoinHandle<String>>) -> String {
    match handle.map(thread::JoinHandle::join) {
        Some(Ok(text)) => text,
        Some(Err(_)) => {
            warn!("Probe drain thread panicked");
            String::new()
        }
        None => String::new(),
    }
}

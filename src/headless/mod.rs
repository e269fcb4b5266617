//! Headless session output
//!
//! With `--json` every front-end notification is written to stdout as NDJSON
//! (newline-delimited JSON), one event per line, tagged by an `event` field
//! and stamped with the session id and a millisecond timestamp. Without it,
//! output is printed as plain text: debuggee output on stdout, everything
//! else on stderr.
//!
//! # Example Output
//!
//! ```json
//! {"event":"session_created","session_id":1,"device":"localhost","executable":"/apps/demo/bin/demo","timestamp":1704700001000}
//! {"event":"setup_result","session_id":1,"success":true,"reason":null,"debug_port":10000,"aux_port":null,"timestamp":1704700002000}
//! {"event":"output","session_id":1,"channel":"app_output","text":"hello","timestamp":1704700003000}
//! ```

pub mod runner;

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use tracing::error;

use rdemon_app::{FrontEndEvent, SessionId};
use rdemon_core::OutputChannel;

/// Events emitted in headless mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Session created, nothing reserved yet
    SessionCreated {
        session_id: SessionId,
        device: String,
        executable: String,
        timestamp: i64,
    },

    /// Setup phase finished
    SetupResult {
        session_id: SessionId,
        success: bool,
        reason: Option<String>,
        debug_port: Option<u16>,
        aux_port: Option<u16>,
        timestamp: i64,
    },

    /// Relayed output
    Output {
        session_id: SessionId,
        channel: OutputChannel,
        text: String,
        timestamp: i64,
    },

    /// Non-fatal condition
    Warning {
        session_id: SessionId,
        message: String,
        timestamp: i64,
    },

    /// Debuggee died without being asked to
    InferiorIll { session_id: SessionId, timestamp: i64 },

    /// Session is Inactive again
    SessionEnded {
        session_id: SessionId,
        reason: Option<String>,
        timestamp: i64,
    },

    /// Error outside the session itself
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Print this event as plain text
    pub fn print(&self) {
        match self {
            HeadlessEvent::Output {
                channel: OutputChannel::AppOutput,
                text,
                ..
            } => println!("{}", text),
            HeadlessEvent::Output { channel, text, .. } => {
                eprintln!("[{}] {}", channel.label(), text)
            }
            HeadlessEvent::SetupResult {
                success: true,
                debug_port,
                aux_port,
                ..
            } => {
                let ports: Vec<String> = debug_port
                    .iter()
                    .map(|p| format!("debug port {}", p))
                    .chain(aux_port.iter().map(|p| format!("script port {}", p)))
                    .collect();
                if ports.is_empty() {
                    eprintln!("Remote process started");
                } else {
                    eprintln!("Remote process started ({})", ports.join(", "));
                }
            }
            HeadlessEvent::SetupResult { reason, .. } => {
                eprintln!(
                    "Setup failed: {}",
                    reason.as_deref().unwrap_or("unknown reason")
                )
            }
            HeadlessEvent::Warning { message, .. } => eprintln!("{}", message),
            HeadlessEvent::InferiorIll { .. } => {
                eprintln!("The remote process finished unexpectedly")
            }
            HeadlessEvent::SessionEnded { reason, .. } => match reason {
                Some(reason) => eprintln!("Session ended: {}", reason),
                None => eprintln!("Session ended"),
            },
            HeadlessEvent::SessionCreated { .. } => {}
            HeadlessEvent::Error { message, .. } => eprintln!("Error: {}", message),
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn session_created(session_id: SessionId, device: &str, executable: &str) -> Self {
        Self::SessionCreated {
            session_id,
            device: device.to_string(),
            executable: executable.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn session_ended(session_id: SessionId, reason: Option<String>) -> Self {
        Self::SessionEnded {
            session_id,
            reason,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }

    /// Stamp a front-end notification with the session and time
    pub fn from_front_end(session_id: SessionId, event: FrontEndEvent) -> Self {
        let timestamp = Self::now();
        match event {
            FrontEndEvent::SetupResult {
                success,
                reason,
                debug_port,
                aux_port,
            } => Self::SetupResult {
                session_id,
                success,
                reason,
                debug_port,
                aux_port,
                timestamp,
            },
            FrontEndEvent::Output { text, channel } => Self::Output {
                session_id,
                channel,
                text,
                timestamp,
            },
            FrontEndEvent::InferiorIll => Self::InferiorIll {
                session_id,
                timestamp,
            },
            FrontEndEvent::Warning { text } => Self::Warning {
                session_id,
                message: text,
                timestamp,
            },
        }
    }
}

//! Debugger front-end contract
//!
//! The orchestrator reports to a [`DebuggerFrontEnd`]; it never learns who is
//! listening. [`ChannelFrontEnd`] forwards every notification as a
//! [`FrontEndEvent`] for consumers living on another task.

use serde::Serialize;
use tokio::sync::mpsc;

use rdemon_core::prelude::*;
use rdemon_core::OutputChannel;

/// Outcome of the setup phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupResult {
    pub success: bool,
    pub reason: Option<String>,
    pub debug_port: Option<u16>,
    pub aux_port: Option<u16>,
}

impl SetupResult {
    pub fn succeeded(debug_port: Option<u16>, aux_port: Option<u16>) -> Self {
        Self {
            success: true,
            reason: None,
            debug_port,
            aux_port,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            debug_port: None,
            aux_port: None,
        }
    }
}

/// Receives session notifications.
///
/// Calls come from the orchestrator's dispatch and, for kill failures, from a
/// background task, so implementations must not block.
pub trait DebuggerFrontEnd: Send + Sync {
    /// Exactly once per session that began
    fn notify_setup_result(&self, result: SetupResult);

    fn notify_output(&self, text: &str, channel: OutputChannel);

    /// The debuggee died without being asked to. At most once per session.
    fn notify_inferior_ill(&self);

    /// Non-fatal condition the operator should know about
    fn notify_warning(&self, text: &str);
}

/// A front-end notification as data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FrontEndEvent {
    SetupResult {
        success: bool,
        reason: Option<String>,
        debug_port: Option<u16>,
        aux_port: Option<u16>,
    },
    Output {
        text: String,
        channel: OutputChannel,
    },
    InferiorIll,
    Warning {
        text: String,
    },
}

impl From<SetupResult> for FrontEndEvent {
    fn from(result: SetupResult) -> Self {
        FrontEndEvent::SetupResult {
            success: result.success,
            reason: result.reason,
            debug_port: result.debug_port,
            aux_port: result.aux_port,
        }
    }
}

impl FrontEndEvent {
    pub fn output(text: impl Into<String>, channel: OutputChannel) -> Self {
        FrontEndEvent::Output {
            text: text.into(),
            channel,
        }
    }
}

/// Forwards notifications over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelFrontEnd {
    tx: mpsc::UnboundedSender<FrontEndEvent>,
}

impl ChannelFrontEnd {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FrontEndEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: FrontEndEvent) {
        if self.tx.send(event).is_err() {
            trace!("Front-end receiver dropped, notification discarded");
        }
    }
}

impl DebuggerFrontEnd for ChannelFrontEnd {
    fn notify_setup_result(&self, result: SetupResult) {
        self.forward(result.into());
    }

    fn notify_output(&self, text: &str, channel: OutputChannel) {
        self.forward(FrontEndEvent::output(text, channel));
    }

    fn notify_inferior_ill(&self) {
        self.forward(FrontEndEvent::InferiorIll);
    }

    fn notify_warning(&self, text: &str) {
        self.forward(FrontEndEvent::Warning {
            text: text.to_string(),
        });
    }
}

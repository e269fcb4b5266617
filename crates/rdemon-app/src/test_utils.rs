//! Test utilities for orchestrator consumers
//!
//! [`RecordingFrontEnd`] keeps every notification it receives so tests can
//! assert on their order and content.

use std::sync::{Mutex, MutexGuard};

use rdemon_core::OutputChannel;

use crate::front_end::{DebuggerFrontEnd, FrontEndEvent, SetupResult};

/// Front-end that records notifications
#[derive(Debug, Default)]
pub struct RecordingFrontEnd {
    events: Mutex<Vec<FrontEndEvent>>,
}

impl RecordingFrontEnd {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FrontEndEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every notification, in delivery order
    pub fn events(&self) -> Vec<FrontEndEvent> {
        self.lock().clone()
    }

    pub fn setup_results(&self) -> Vec<SetupResult> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                FrontEndEvent::SetupResult {
                    success,
                    reason,
                    debug_port,
                    aux_port,
                } => Some(SetupResult {
                    success: *success,
                    reason: reason.clone(),
                    debug_port: *debug_port,
                    aux_port: *aux_port,
                }),
                _ => None,
            })
            .collect()
    }

    /// Output texts relayed on `channel`
    pub fn outputs(&self, channel: OutputChannel) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                FrontEndEvent::Output { text, channel: c } if *c == channel => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                FrontEndEvent::Warning { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn inferior_ill_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|event| matches!(event, FrontEndEvent::InferiorIll))
            .count()
    }
}

impl DebuggerFrontEnd for RecordingFrontEnd {
    fn notify_setup_result(&self, result: SetupResult) {
        self.lock().push(result.into());
    }

    fn notify_output(&self, text: &str, channel: OutputChannel) {
        self.lock().push(FrontEndEvent::output(text, channel));
    }

    fn notify_inferior_ill(&self) {
        self.lock().push(FrontEndEvent::InferiorIll);
    }

    fn notify_warning(&self, text: &str) {
        self.lock().push(FrontEndEvent::Warning {
            text: text.to_string(),
        });
    }
}

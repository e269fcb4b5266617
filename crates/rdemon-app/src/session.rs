//! Per-run debug session state

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use serde::Serialize;

use rdemon_core::{LogHelperAvailability, Runnable, SessionState};

/// Unique identifier for a session
pub type SessionId = u64;

static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique session ID
pub fn next_session_id() -> SessionId {
    SESSION_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Which debuggers a session attaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DebugCapabilities {
    /// Native debugger through the device helper
    pub native: bool,
    /// Script (QML/JS) debugger injected into the command line
    pub script: bool,
}

impl DebugCapabilities {
    pub fn native() -> Self {
        Self {
            native: true,
            script: false,
        }
    }

    pub fn script() -> Self {
        Self {
            native: false,
            script: true,
        }
    }

    /// Number of ports a session with these capabilities reserves
    pub fn ports_needed(&self) -> usize {
        usize::from(self.native) + usize::from(self.script)
    }
}

/// Ports reserved for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionPorts {
    pub debug: Option<u16>,
    pub aux: Option<u16>,
}

impl SessionPorts {
    /// Map reserved ports onto the debuggers that asked for them, debug first
    pub fn assign(capabilities: DebugCapabilities, reserved: &[u16]) -> Self {
        let mut ports = reserved.iter().copied();
        let debug = if capabilities.native {
            ports.next()
        } else {
            None
        };
        let aux = if capabilities.script {
            ports.next()
        } else {
            None
        };
        Self { debug, aux }
    }

    pub fn to_vec(&self) -> Vec<u16> {
        self.debug.into_iter().chain(self.aux).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.debug.is_none() && self.aux.is_none()
    }
}

/// One debug run
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,

    pub state: SessionState,

    /// What to run; never changes after creation
    pub runnable: Runnable,

    pub ports: SessionPorts,

    /// Base name of the executable; scopes the device log
    pub application_id: String,

    pub capabilities: DebugCapabilities,

    pub log_helper: LogHelperAvailability,

    /// When the remote process was confirmed started
    pub started_at: Option<DateTime<Local>>,

    /// An "end session" request was accepted
    pub end_requested: bool,

    /// `notify_setup_result` has been delivered
    pub setup_reported: bool,

    /// `notify_inferior_ill` has been delivered
    pub inferior_ill_reported: bool,
}

impl Session {
    pub fn new(runnable: Runnable, capabilities: DebugCapabilities) -> Self {
        let application_id = runnable.application_id();
        Self {
            id: next_session_id(),
            state: SessionState::Inactive,
            runnable,
            ports: SessionPorts::default(),
            application_id,
            capabilities,
            log_helper: LogHelperAvailability::Unknown,
            started_at: None,
            end_requested: false,
            setup_reported: false,
            inferior_ill_reported: false,
        }
    }

    pub fn mark_started(&mut self) {
        self.state = SessionState::Running;
        self.started_at = Some(Local::now());
    }

    pub fn is_active(&self) -> bool {
        self.state != SessionState::Inactive
    }

    /// Drop every identifier the session acquired
    pub fn clear_identifiers(&mut self) {
        self.ports = SessionPorts::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_increase() {
        let a = Session::new(Runnable::new("/bin/a"), DebugCapabilities::default());
        let b = Session::new(Runnable::new("/bin/a"), DebugCapabilities::default());
        assert!(b.id > a.id);
    }

    #[test]
    fn test_new_session_is_inactive_with_application_id() {
        let session = Session::new(
            Runnable::new("/apps/demo/bin/demo-app"),
            DebugCapabilities::native(),
        );
        assert_eq!(session.state, SessionState::Inactive);
        assert_eq!(session.application_id, "demo-app");
        assert_eq!(session.log_helper, LogHelperAvailability::Unknown);
        assert!(session.ports.is_empty());
        assert!(session.started_at.is_none());
    }

    #[test]
    fn test_ports_needed() {
        assert_eq!(DebugCapabilities::default().ports_needed(), 0);
        assert_eq!(DebugCapabilities::native().ports_needed(), 1);
        assert_eq!(DebugCapabilities::script().ports_needed(), 1);
        let both = DebugCapabilities {
            native: true,
            script: true,
        };
        assert_eq!(both.ports_needed(), 2);
    }

    #[test]
    fn test_assign_ports_debug_first() {
        let both = DebugCapabilities {
            native: true,
            script: true,
        };
        let ports = SessionPorts::assign(both, &[10000, 10001]);
        assert_eq!(ports.debug, Some(10000));
        assert_eq!(ports.aux, Some(10001));
        assert_eq!(ports.to_vec(), vec![10000, 10001]);

        let script_only = SessionPorts::assign(DebugCapabilities::script(), &[10005]);
        assert_eq!(script_only.debug, None);
        assert_eq!(script_only.aux, Some(10005));
    }

    #[test]
    fn test_mark_started_sets_timestamp() {
        let mut session = Session::new(Runnable::new("/bin/a"), DebugCapabilities::default());
        session.mark_started();
        assert_eq!(session.state, SessionState::Running);
        assert!(session.started_at.is_some());
    }
}

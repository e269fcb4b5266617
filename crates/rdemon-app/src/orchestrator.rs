//! Debug session orchestrator
//!
//! Drives one [`Session`] through
//! `Inactive → StartingRemoteProcess → Running → Finishing → Inactive`.
//!
//! Every launcher, log streamer and end-request event arrives on one channel
//! and is handled by [`SessionOrchestrator::handle_event`], one at a time.
//! Because of that ordering, a "finished" event that arrives after an end
//! request is a clean stop, and one that arrives before it makes the
//! debuggee ill.

use std::sync::Arc;

use tokio::sync::mpsc;

use rdemon_core::prelude::*;
use rdemon_core::{
    LauncherEvent, LogHelperAvailability, LogStreamEvent, OutputChannel, Runnable, SessionEvent,
    SessionState,
};
use rdemon_device::{Device, LogStreamConfig, LogStreamer, PortAllocator, ProcessLauncher};

use crate::command_line::build_remote_command;
use crate::config::{DebugSettings, RunConfiguration};
use crate::front_end::{DebuggerFrontEnd, SetupResult};
use crate::session::{DebugCapabilities, Session, SessionId, SessionPorts};

/// Capacity of the per-session event channel
pub const SESSION_CHANNEL_CAPACITY: usize = 256;

const PREPARING_MESSAGE: &str = "Preparing remote side...";

/// Cloneable handle for ending a session from another task
#[derive(Debug, Clone)]
pub struct SessionControl {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionControl {
    /// Queue an end request behind any events already delivered
    pub async fn end_session(&self) -> Result<()> {
        self.tx
            .send(SessionEvent::EndRequested)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Non-async variant, for signal handlers and drop paths.
    ///
    /// A full queue is recoverable (retry with [`Self::end_session`]); a
    /// closed one means the session is already gone.
    pub fn try_end_session(&self) -> Result<()> {
        self.tx
            .try_send(SessionEvent::EndRequested)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    Error::channel_send("session event queue is full")
                }
                mpsc::error::TrySendError::Closed(_) => Error::ChannelClosed,
            })
    }
}

/// What one teardown pass did
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// State the session was in when teardown began
    pub previous_state: SessionState,

    /// Ports returned to the allocator
    pub released_ports: Vec<u16>,

    /// A kill request for the remote executable was dispatched
    pub kill_requested: bool,

    /// Steps that did not complete; never stops the remaining steps
    pub failures: Vec<Error>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs one debug session against a device
pub struct SessionOrchestrator<D, F: ?Sized> {
    device: Arc<D>,
    front_end: Arc<F>,
    ports: PortAllocator,
    settings: DebugSettings,
    session: Session,
    launcher: ProcessLauncher<D>,
    streamer: Option<LogStreamer<D>>,
    /// Executable of the command handed to the launcher
    spawned_executable: Option<String>,
    began: bool,
    kill_sent: bool,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: mpsc::Receiver<SessionEvent>,
}

impl<D, F> SessionOrchestrator<D, F>
where
    D: Device + Send + Sync + 'static,
    F: DebuggerFrontEnd + ?Sized + 'static,
{
    pub fn new(
        device: Arc<D>,
        front_end: Arc<F>,
        ports: PortAllocator,
        settings: DebugSettings,
        runnable: Runnable,
        capabilities: DebugCapabilities,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let session = Session::new(runnable, capabilities);
        debug!(
            "Session {} created for {} (native: {}, script: {})",
            session.id, session.runnable.executable, capabilities.native, capabilities.script
        );

        Self {
            launcher: ProcessLauncher::new(Arc::clone(&device)),
            device,
            front_end,
            ports,
            settings,
            session,
            streamer: None,
            spawned_executable: None,
            began: false,
            kill_sent: false,
            event_tx,
            event_rx,
        }
    }

    /// Orchestrator for a run configuration snapshot
    pub fn from_configuration(
        device: Arc<D>,
        front_end: Arc<F>,
        ports: PortAllocator,
        settings: DebugSettings,
        configuration: &RunConfiguration,
    ) -> Self {
        Self::new(
            device,
            front_end,
            ports,
            settings,
            configuration.runnable(),
            configuration.capabilities(),
        )
    }

    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Ports currently held by the session
    pub fn ports(&self) -> SessionPorts {
        self.session.ports
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn control(&self) -> SessionControl {
        SessionControl {
            tx: self.event_tx.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Setup
    // ─────────────────────────────────────────────────────────

    /// Reserve ports and start the remote process.
    ///
    /// Returns once the start request is in flight; the outcome arrives as
    /// events. On failure the front-end has already been told, every
    /// reserved port is released and the session is Inactive again.
    pub async fn begin_session(&mut self) -> Result<()> {
        if self.began {
            return Err(Error::invalid_state(format!(
                "session {} already began",
                self.session.id
            )));
        }
        self.began = true;

        info!(
            "Session {}: starting {}",
            self.session.id, self.session.runnable.executable
        );
        self.front_end
            .notify_output(PREPARING_MESSAGE, OutputChannel::Diagnostic);

        let capabilities = self.session.capabilities;
        let needed = capabilities.ports_needed();
        if needed > 0 {
            match self.device.used_ports(self.ports.candidates()).await {
                Ok(used) => self.ports.set_device_used_ports(used),
                Err(e) => return Err(self.fail_setup(format!("Initial setup failed: {}", e), e)),
            }

            match self.ports.reserve(needed) {
                Ok(reserved) => {
                    self.session.ports = SessionPorts::assign(capabilities, &reserved);
                }
                Err(e) => return Err(self.fail_setup(e.to_string(), e)),
            }
        }

        self.session.state = SessionState::StartingRemoteProcess;

        let command = match build_remote_command(
            &self.session.runnable,
            capabilities,
            self.session.ports,
            &self.settings,
        ) {
            Ok(command) => command,
            Err(e) => return Err(self.fail_setup(format!("Initial setup failed: {}", e), e)),
        };

        self.spawned_executable = Some(command.executable.clone());
        if let Err(e) = self.launcher.start(command, self.event_tx.clone()) {
            return Err(self.fail_setup(format!("Initial setup failed: {}", e), e));
        }
        Ok(())
    }

    /// Report setup failure and return the session to Inactive
    fn fail_setup(&mut self, reason: String, error: Error) -> Error {
        warn!("Session {} setup failed: {}", self.session.id, reason);
        self.report_setup(SetupResult::failed(reason));
        let report = self.teardown();
        if !report.is_clean() {
            debug!("Teardown after failed setup: {:?}", report.failures);
        }
        error
    }

    fn report_setup(&mut self, result: SetupResult) {
        if self.session.setup_reported {
            return;
        }
        self.session.setup_reported = true;
        self.front_end.notify_setup_result(result);
    }

    // ─────────────────────────────────────────────────────────
    // Event dispatch
    // ─────────────────────────────────────────────────────────

    /// Wait for the next session event
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// Handle events until the session is Inactive
    pub async fn run(&mut self) {
        while self.session.is_active() {
            match self.event_rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
        debug!("Session {} finished", self.session.id);
    }

    /// Apply one event to the state machine
    pub fn handle_event(&mut self, event: SessionEvent) {
        trace!(
            "Session {} [{}] <- {}",
            self.session.id,
            self.session.state,
            event.event_type()
        );

        match event {
            SessionEvent::Launcher(event) => self.handle_launcher_event(event),
            SessionEvent::LogStream(event) => self.handle_log_event(event),
            SessionEvent::EndRequested => {
                self.end_session();
            }
        }
    }

    fn handle_launcher_event(&mut self, event: LauncherEvent) {
        let state = self.session.state;
        match event {
            LauncherEvent::Started { pid } => {
                if state == SessionState::StartingRemoteProcess {
                    self.handle_started(pid);
                } else {
                    debug!("Ignoring start confirmation in state {}", state);
                }
            }
            LauncherEvent::Progress(text) => {
                if matches!(
                    state,
                    SessionState::StartingRemoteProcess | SessionState::Running
                ) {
                    self.front_end
                        .notify_output(&text, OutputChannel::Diagnostic);
                }
            }
            LauncherEvent::Stdout(text) => {
                if state == SessionState::Running {
                    self.front_end.notify_output(&text, OutputChannel::AppOutput);
                }
            }
            LauncherEvent::Stderr(text) => {
                if state == SessionState::Running {
                    self.front_end.notify_output(&text, OutputChannel::AppError);
                }
            }
            LauncherEvent::Error(message) => match state {
                SessionState::StartingRemoteProcess => {
                    let reason = format!("Initial setup failed: {}", message);
                    self.fail_setup(reason, Error::launch_failure(message));
                }
                SessionState::Running => {
                    self.front_end
                        .notify_output(&message, OutputChannel::AppError);
                    self.handle_unexpected_finish();
                }
                _ => debug!("Ignoring launcher error in state {}: {}", state, message),
            },
            LauncherEvent::Finished { success } => match state {
                SessionState::StartingRemoteProcess => {
                    let executable = self
                        .spawned_executable
                        .clone()
                        .unwrap_or_else(|| self.session.runnable.executable.clone());
                    let reason = format!("The {} process closed unexpectedly.", executable);
                    self.fail_setup(reason.clone(), Error::launch_failure(reason));
                }
                SessionState::Running if success => {
                    info!("Session {}: remote process exited cleanly", self.session.id);
                    self.teardown();
                }
                SessionState::Running => self.handle_unexpected_finish(),
                _ => debug!("Ignoring finish in state {}", state),
            },
        }
    }

    fn handle_started(&mut self, pid: Option<u32>) {
        self.session.mark_started();
        info!(
            "Session {}: remote process running (pid {:?}, ports {:?})",
            self.session.id,
            pid,
            self.session.ports.to_vec()
        );

        self.report_setup(SetupResult::succeeded(
            self.session.ports.debug,
            self.session.ports.aux,
        ));
        self.start_log_streamer();
    }

    fn start_log_streamer(&mut self) {
        let os_version = self.device.os_version();
        let probe_for_tool = os_version > self.settings.log_min_os_version;
        if !probe_for_tool {
            debug!(
                "Device OS {} not above {}, starting {} without probing",
                os_version, self.settings.log_min_os_version, self.settings.log_tool
            );
        }

        let mut streamer = LogStreamer::new(
            Arc::clone(&self.device),
            self.session.application_id.clone(),
            LogStreamConfig {
                tool: self.settings.log_tool.clone(),
                probe_for_tool,
            },
        );
        streamer.start(self.event_tx.clone());
        self.streamer = Some(streamer);
    }

    fn handle_log_event(&mut self, event: LogStreamEvent) {
        if self.session.state != SessionState::Running {
            return;
        }

        match event {
            LogStreamEvent::Started => {
                debug!("Session {}: {} running", self.session.id, self.settings.log_tool);
                self.session.log_helper = LogHelperAvailability::Yes;
            }
            LogStreamEvent::Line(line) => {
                self.front_end.notify_output(&line, OutputChannel::AppOutput);
            }
            LogStreamEvent::ToolMissing => {
                if self.session.log_helper == LogHelperAvailability::No {
                    return;
                }
                self.session.log_helper = LogHelperAvailability::No;
                let warning = Error::tool_missing(&self.settings.log_tool);
                warn!("Session {}: {}", self.session.id, warning);
                self.front_end.notify_warning(&format!(
                    "Warning: \"{}\" is not found on the device, debug output not available.",
                    self.settings.log_tool
                ));
            }
        }
    }

    fn handle_unexpected_finish(&mut self) {
        warn!(
            "Session {}: remote process finished unexpectedly",
            self.session.id
        );
        if !self.session.inferior_ill_reported {
            self.session.inferior_ill_reported = true;
            self.front_end.notify_inferior_ill();
        }
        self.teardown();
    }

    // ─────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────

    /// Accept an end request and tear the session down.
    ///
    /// Outside StartingRemoteProcess/Running the request is not recorded, but
    /// teardown still runs; it is a no-op on an already torn-down session.
    pub fn end_session(&mut self) -> TeardownReport {
        if self.session.state.accepts_end() {
            info!(
                "Session {}: end requested in state {}",
                self.session.id, self.session.state
            );
            self.session.end_requested = true;
        } else {
            debug!(
                "Session {}: end request in state {}",
                self.session.id, self.session.state
            );
        }
        self.teardown()
    }

    /// Best-effort release of every session resource. Idempotent.
    ///
    /// Each step runs regardless of the others: stop the log streamer, stop
    /// the launched process and ask the device to kill the executable,
    /// release the ports, clear the session identifiers. The remote kill is
    /// not awaited.
    pub fn teardown(&mut self) -> TeardownReport {
        let previous_state = self.session.state;
        let mut report = TeardownReport {
            previous_state,
            ..TeardownReport::default()
        };
        if previous_state != SessionState::Inactive {
            self.session.state = SessionState::Finishing;
        }

        // (a) log streamer
        if let Some(mut streamer) = self.streamer.take() {
            streamer.stop();
        }

        // (b) remote process
        self.launcher.stop();
        let process_may_run = self.session.started_at.is_some() || self.session.end_requested;
        if previous_state != SessionState::Inactive && process_may_run && !self.kill_sent {
            self.kill_sent = true;
            report.kill_requested = true;
            self.spawn_remote_kill();
        }

        // (c) ports
        let held = self.session.ports.to_vec();
        if !held.is_empty() {
            let released = self.ports.release(&held);
            if released != held.len() {
                report.failures.push(Error::teardown(
                    "release ports",
                    format!(
                        "{} of {:?} were no longer reserved on {}",
                        held.len() - released,
                        held,
                        self.ports.device_id()
                    ),
                ));
            }
            report.released_ports = held;
        }

        // (d) identifiers
        self.session.clear_identifiers();
        self.spawned_executable = None;
        self.session.state = SessionState::Inactive;

        if previous_state == SessionState::StartingRemoteProcess {
            self.report_setup(SetupResult::failed(
                "Session ended before the remote process started",
            ));
        }

        for failure in &report.failures {
            warn!("Session {}: {}", self.session.id, failure);
        }
        if previous_state != SessionState::Inactive {
            info!(
                "Session {}: torn down from {} (released {:?})",
                self.session.id, previous_state, report.released_ports
            );
        }
        report
    }

    fn spawn_remote_kill(&self) {
        let device = Arc::clone(&self.device);
        let front_end = Arc::clone(&self.front_end);
        let executable = self.session.runnable.executable.clone();
        let session_id = self.session.id;

        tokio::spawn(async move {
            if let Err(e) = device.kill_process(&executable).await {
                let failure = Error::teardown("kill", e.to_string());
                warn!("Session {}: {}", session_id, failure);
                front_end.notify_warning(&format!("Failed to stop {}: {}", executable, e));
            }
        });
    }
}

impl<D, F: ?Sized> std::fmt::Debug for SessionOrchestrator<D, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("session", &self.session)
            .field("began", &self.began)
            .field("kill_sent", &self.kill_sent)
            .finish()
    }
}

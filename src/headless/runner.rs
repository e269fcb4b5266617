//! Session runner - one debug session against the local device
//!
//! Builds the device, port allocator and orchestrator from the project's
//! settings, relays front-end notifications to stdout and ends the session
//! on Ctrl-C or when the timeout expires.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use rdemon_app::config::{self, RunConfiguration};
use rdemon_app::{ChannelFrontEnd, FrontEndEvent, SessionId, SessionOrchestrator};
use rdemon_core::prelude::*;
use rdemon_device::{Device, HostDevice, PortAllocator};

use super::HeadlessEvent;

/// Name given to a configuration built from the command line
pub const COMMAND_LINE_CONFIGURATION: &str = "command line";

/// What to run and how to report it
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub project_path: PathBuf,
    pub configuration: RunConfiguration,
    pub timeout: Option<Duration>,
    /// NDJSON events instead of plain text
    pub json: bool,
}

/// Why the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The remote process finished on its own
    ProcessExited,
    /// Ctrl-C
    Interrupted,
    TimedOut,
    SetupFailed,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::ProcessExited => write!(f, "process exited"),
            EndReason::Interrupted => write!(f, "interrupted"),
            EndReason::TimedOut => write!(f, "timed out"),
            EndReason::SetupFailed => write!(f, "setup failed"),
        }
    }
}

/// Result of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub setup_succeeded: bool,
    pub inferior_ill: bool,
    pub ended_by: EndReason,
}

impl SessionOutcome {
    /// Setup succeeded and the debuggee did not die on its own
    pub fn is_success(&self) -> bool {
        self.setup_succeeded && !self.inferior_ill
    }
}

/// What the relay task saw
#[derive(Debug, Default)]
struct RelayedOutcome {
    setup_succeeded: bool,
    inferior_ill: bool,
}

/// Write one event in the selected format
pub fn output(event: &HeadlessEvent, json: bool) {
    if json {
        event.emit();
    } else {
        event.print();
    }
}

/// Pick the run configuration for this invocation.
///
/// A named configuration comes from `.rdemon/launch.toml`; a command after
/// `--` replaces its executable and arguments, or stands alone when no name
/// is given. Without either, the first configuration in the launch file is
/// used. `--native`/`--script` only ever switch debuggers on.
pub fn resolve_configuration(
    project_path: &Path,
    name: Option<&str>,
    command: &[String],
    native: bool,
    script: bool,
) -> Result<RunConfiguration> {
    let configs = config::launch::load_launch_configs(project_path);

    let mut configuration = match (name, command.split_first()) {
        (Some(name), _) => config::launch::require_config(&configs, name)?,
        (None, Some((executable, _))) => {
            RunConfiguration::new(COMMAND_LINE_CONFIGURATION, executable.clone())
        }
        (None, None) => configs.into_iter().next().ok_or_else(|| {
            Error::config(
                "nothing to run: pass an executable after `--` or add a configuration to .rdemon/launch.toml",
            )
        })?,
    };

    if let Some((executable, arguments)) = command.split_first() {
        configuration.executable = executable.clone();
        configuration.arguments = arguments.to_vec();
    }

    configuration.native_debugger |= native;
    configuration.script_debugger |= script;
    Ok(configuration)
}

/// Run one session to completion
pub async fn run_session(options: RunOptions) -> Result<SessionOutcome> {
    let settings = config::settings::load_settings(&options.project_path);

    let device = Arc::new(HostDevice::new(
        settings.device.id.clone(),
        settings.device.os_version,
    ));
    let ports = PortAllocator::new(device.id(), settings.ports.range());

    let (front_end, events) = ChannelFrontEnd::new();
    let mut orchestrator = SessionOrchestrator::from_configuration(
        Arc::clone(&device),
        Arc::new(front_end),
        ports,
        settings.debug_settings(),
        &options.configuration,
    );
    let session_id = orchestrator.id();

    info!("═══════════════════════════════════════════════════════");
    info!("Session {}: {}", session_id, options.configuration.name);
    info!("Project: {}", options.project_path.display());
    info!("═══════════════════════════════════════════════════════");

    output(
        &HeadlessEvent::session_created(
            session_id,
            device.id(),
            &options.configuration.executable,
        ),
        options.json,
    );

    let relay = tokio::spawn(relay_events(session_id, events, options.json));

    let ended_by = match orchestrator.begin_session().await {
        Ok(()) => drive(&mut orchestrator, options.timeout).await,
        Err(e) => {
            if e.is_fatal() {
                error!("Session {} did not start: {}", session_id, e);
            } else {
                debug!("Session {} did not start: {}", session_id, e);
            }
            EndReason::SetupFailed
        }
    };

    // The relay ends once every front-end handle is gone
    drop(orchestrator);
    let relayed = relay.await.unwrap_or_else(|e| {
        error!("Output relay task failed: {}", e);
        RelayedOutcome::default()
    });

    output(
        &HeadlessEvent::session_ended(session_id, Some(ended_by.to_string())),
        options.json,
    );
    info!("Session {} ended: {}", session_id, ended_by);

    Ok(SessionOutcome {
        session_id,
        setup_succeeded: relayed.setup_succeeded,
        inferior_ill: relayed.inferior_ill,
        ended_by,
    })
}

/// Handle session events until Inactive, ending early on Ctrl-C or timeout
async fn drive<D, F>(
    orchestrator: &mut SessionOrchestrator<D, F>,
    timeout: Option<Duration>,
) -> EndReason
where
    D: Device + Send + Sync + 'static,
    F: rdemon_app::DebuggerFrontEnd + ?Sized + 'static,
{
    let control = orchestrator.control();
    let (reason_tx, mut reason_rx) = oneshot::channel();
    let stop: JoinHandle<()> = tokio::spawn(async move {
        let reason = wait_for_stop(timeout).await;
        info!("Ending session: {}", reason);
        // Must be recorded before the end request is queued
        let _ = reason_tx.send(reason);
        match control.try_end_session() {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                if let Err(e) = control.end_session().await {
                    debug!("End request not delivered: {}", e);
                }
            }
            Err(e) => debug!("End request not delivered: {}", e),
        }
    });

    orchestrator.run().await;
    stop.abort();

    reason_rx.try_recv().unwrap_or(EndReason::ProcessExited)
}

async fn wait_for_stop(timeout: Option<Duration>) -> EndReason {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let deadline = async {
        match timeout {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = interrupt => EndReason::Interrupted,
        _ = deadline => EndReason::TimedOut,
    }
}

async fn relay_events(
    session_id: SessionId,
    mut events: mpsc::UnboundedReceiver<FrontEndEvent>,
    json: bool,
) -> RelayedOutcome {
    let mut outcome = RelayedOutcome::default();

    while let Some(event) = events.recv().await {
        match &event {
            FrontEndEvent::SetupResult { success, .. } => outcome.setup_succeeded = *success,
            FrontEndEvent::InferiorIll => outcome.inferior_ill = true,
            _ => {}
        }
        output(&HeadlessEvent::from_front_end(session_id, event), json);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_launch_file(dir: &Path, content: &str) {
        let rdemon_dir = dir.join(".rdemon");
        fs::create_dir_all(&rdemon_dir).unwrap();
        fs::write(rdemon_dir.join("launch.toml"), content).unwrap();
    }

    const LAUNCH: &str = r#"
[[configurations]]
name = "demo"
executable = "/apps/demo/bin/demo"
arguments = ["-platform", "qnx"]
working_directory = "/apps/demo"
script_debugger = true

[configurations.environment]
QT_DEBUG_PLUGINS = "1"

[[configurations]]
name = "other"
executable = "/apps/other"
"#;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_command_line_only() {
        let temp = tempdir().unwrap();
        let configuration =
            resolve_configuration(temp.path(), None, &args(&["./app", "-v"]), true, false)
                .unwrap();

        assert_eq!(configuration.name, COMMAND_LINE_CONFIGURATION);
        assert_eq!(configuration.executable, "./app");
        assert_eq!(configuration.arguments, vec!["-v"]);
        assert!(configuration.native_debugger);
        assert!(!configuration.script_debugger);
    }

    #[test]
    fn test_named_configuration() {
        let temp = tempdir().unwrap();
        write_launch_file(temp.path(), LAUNCH);

        let configuration =
            resolve_configuration(temp.path(), Some("demo"), &[], false, false).unwrap();
        assert_eq!(configuration.executable, "/apps/demo/bin/demo");
        assert!(configuration.script_debugger);
        assert_eq!(
            configuration.environment.get("QT_DEBUG_PLUGINS").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_command_overrides_named_configuration() {
        let temp = tempdir().unwrap();
        write_launch_file(temp.path(), LAUNCH);

        let configuration =
            resolve_configuration(temp.path(), Some("demo"), &args(&["/bin/alt"]), false, false)
                .unwrap();
        assert_eq!(configuration.name, "demo");
        assert_eq!(configuration.executable, "/bin/alt");
        assert!(configuration.arguments.is_empty());
        assert_eq!(
            configuration.working_directory,
            Some(PathBuf::from("/apps/demo"))
        );
    }

    #[test]
    fn test_first_configuration_by_default() {
        let temp = tempdir().unwrap();
        write_launch_file(temp.path(), LAUNCH);

        let configuration = resolve_configuration(temp.path(), None, &[], false, false).unwrap();
        assert_eq!(configuration.name, "demo");
    }

    #[test]
    fn test_nothing_to_run() {
        let temp = tempdir().unwrap();
        let result = resolve_configuration(temp.path(), None, &[], false, false);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        let temp = tempdir().unwrap();
        write_launch_file(temp.path(), LAUNCH);

        let result = resolve_configuration(temp.path(), Some("missing"), &[], false, false);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_outcome_success() {
        let outcome = SessionOutcome {
            session_id: 1,
            setup_succeeded: true,
            inferior_ill: false,
            ended_by: EndReason::ProcessExited,
        };
        assert!(outcome.is_success());

        let ill = SessionOutcome {
            inferior_ill: true,
            ..outcome.clone()
        };
        assert!(!ill.is_success());

        let failed = SessionOutcome {
            setup_succeeded: false,
            ended_by: EndReason::SetupFailed,
            ..outcome
        };
        assert!(!failed.is_success());
    }

    #[tokio::test]
    async fn test_wait_for_stop_times_out() {
        let reason = wait_for_stop(Some(Duration::from_millis(10))).await;
        assert_eq!(reason, EndReason::TimedOut);
    }

    #[tokio::test]
    async fn test_relay_tracks_outcome() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(rdemon_app::SetupResult::succeeded(None, None).into())
            .unwrap();
        tx.send(FrontEndEvent::InferiorIll).unwrap();
        drop(tx);

        let outcome = relay_events(1, rx, true).await;
        assert!(outcome.setup_succeeded);
        assert!(outcome.inferior_ill);
    }
}

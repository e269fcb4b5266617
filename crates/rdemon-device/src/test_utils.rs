//! Test utilities for device consumers
//!
//! [`MockDevice`] is a scriptable in-memory [`Device`]. Tests configure it
//! with builder methods, then drive spawned processes with `emit_*` and
//! inspect what the code under test asked the device to do.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};

use rdemon_core::prelude::*;
use rdemon_core::{OsVersion, ProcessEvent, RemoteCommand};

use crate::device::Device;
use crate::process::RemoteProcess;

#[derive(Debug)]
struct MockProcess {
    executable: String,
    event_tx: mpsc::Sender<ProcessEvent>,
    exited: Arc<AtomicBool>,
}

impl MockProcess {
    /// Mark the process gone. Returns `false` if it already was.
    fn finish(&self) -> bool {
        !self.exited.swap(true, Ordering::AcqRel)
    }
}

#[derive(Debug, Default)]
struct MockState {
    spawned: Vec<RemoteCommand>,
    killed: Vec<String>,
    processes: Vec<MockProcess>,
}

/// Scriptable device for tests
#[derive(Debug)]
pub struct MockDevice {
    id: String,
    os_version: OsVersion,
    commands: HashSet<String>,
    run_outputs: HashMap<String, String>,
    process_output: HashMap<String, Vec<String>>,
    spawn_failures: HashMap<String, String>,
    spawn_failure_all: Option<String>,
    used_ports: BTreeSet<u16>,
    used_ports_failure: Option<String>,
    kill_failure: Option<String>,
    next_pid: AtomicU32,
    state: Mutex<MockState>,
}

impl MockDevice {
    /// Device reporting OS 7.0.0 with no extra commands
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            os_version: OsVersion::new(7, 0, 0),
            commands: HashSet::new(),
            run_outputs: HashMap::new(),
            process_output: HashMap::new(),
            spawn_failures: HashMap::new(),
            spawn_failure_all: None,
            used_ports: BTreeSet::new(),
            used_ports_failure: None,
            kill_failure: None,
            next_pid: AtomicU32::new(1000),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_os_version(mut self, version: OsVersion) -> Self {
        self.os_version = version;
        self
    }

    /// `has_command(name)` answers `true`
    pub fn with_command(mut self, name: &str) -> Self {
        self.commands.insert(name.to_string());
        self
    }

    /// `run()` of `executable` returns `output`
    pub fn with_run_output(mut self, executable: &str, output: &str) -> Self {
        self.run_outputs
            .insert(executable.to_string(), output.to_string());
        self
    }

    /// Stdout lines emitted right after `executable` is spawned
    pub fn with_process_output<I, S>(mut self, executable: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.process_output.insert(
            executable.to_string(),
            lines.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Every spawn fails with `reason`
    pub fn with_spawn_failure(mut self, reason: &str) -> Self {
        self.spawn_failure_all = Some(reason.to_string());
        self
    }

    /// Spawning `executable` fails with `reason`
    pub fn with_spawn_failure_for(mut self, executable: &str, reason: &str) -> Self {
        self.spawn_failures
            .insert(executable.to_string(), reason.to_string());
        self
    }

    pub fn with_used_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.used_ports = ports.into_iter().collect();
        self
    }

    /// Gathering used ports fails with `reason`
    pub fn with_used_ports_failure(mut self, reason: &str) -> Self {
        self.used_ports_failure = Some(reason.to_string());
        self
    }

    /// The signal operation fails with `reason`
    pub fn with_kill_failure(mut self, reason: &str) -> Self {
        self.kill_failure = Some(reason.to_string());
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every command passed to `spawn()`, in order
    pub fn spawned_commands(&self) -> Vec<RemoteCommand> {
        self.state().spawned.clone()
    }

    pub fn has_spawned(&self, executable: &str) -> bool {
        self.state()
            .spawned
            .iter()
            .any(|c| c.executable == executable)
    }

    /// Executables passed to the signal operation, in order
    pub fn killed_executables(&self) -> Vec<String> {
        self.state().killed.clone()
    }

    /// Processes of `executable` that have not exited
    pub fn running_count(&self, executable: &str) -> usize {
        self.state()
            .processes
            .iter()
            .filter(|p| p.executable == executable && !p.exited.load(Ordering::Acquire))
            .count()
    }

    fn live_sender(&self, executable: &str) -> Option<mpsc::Sender<ProcessEvent>> {
        self.state()
            .processes
            .iter()
            .rev()
            .find(|p| p.executable == executable && !p.exited.load(Ordering::Acquire))
            .map(|p| p.event_tx.clone())
    }

    /// Emit a stdout line from the newest live `executable` process
    pub async fn emit_stdout(&self, executable: &str, line: &str) {
        if let Some(tx) = self.live_sender(executable) {
            let _ = tx.send(ProcessEvent::Stdout(line.to_string())).await;
        }
    }

    /// Emit a stderr line from the newest live `executable` process
    pub async fn emit_stderr(&self, executable: &str, line: &str) {
        if let Some(tx) = self.live_sender(executable) {
            let _ = tx.send(ProcessEvent::Stderr(line.to_string())).await;
        }
    }

    /// Make the newest live `executable` process exit with `code`
    pub async fn emit_exit(&self, executable: &str, code: Option<i32>) {
        let tx = {
            let state = self.state();
            state
                .processes
                .iter()
                .rev()
                .find(|p| p.executable == executable && p.finish())
                .map(|p| p.event_tx.clone())
        };
        if let Some(tx) = tx {
            let _ = tx.send(ProcessEvent::Exited { code }).await;
        }
    }
}

impl Device for MockDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn os_version(&self) -> OsVersion {
        self.os_version
    }

    async fn spawn(
        &self,
        command: &RemoteCommand,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<RemoteProcess> {
        self.state().spawned.push(command.clone());

        if let Some(reason) = self
            .spawn_failure_all
            .as_ref()
            .or_else(|| self.spawn_failures.get(&command.executable))
        {
            return Err(Error::launch_failure(reason.clone()));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let exited = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        self.state().processes.push(MockProcess {
            executable: command.executable.clone(),
            event_tx: event_tx.clone(),
            exited: Arc::clone(&exited),
        });

        let lines = self
            .process_output
            .get(&command.executable)
            .cloned()
            .unwrap_or_default();
        let task_exited = Arc::clone(&exited);
        tokio::spawn(async move {
            for line in lines {
                if event_tx.send(ProcessEvent::Stdout(line)).await.is_err() {
                    break;
                }
            }
            if kill_rx.await.is_ok() && !task_exited.swap(true, Ordering::AcqRel) {
                let _ = event_tx.send(ProcessEvent::Exited { code: None }).await;
            }
        });

        Ok(RemoteProcess::from_parts(Some(pid), kill_tx, exited))
    }

    async fn kill_process(&self, executable: &str) -> Result<()> {
        let senders: Vec<_> = {
            let mut state = self.state();
            state.killed.push(executable.to_string());
            if let Some(reason) = &self.kill_failure {
                return Err(Error::device(reason.clone()));
            }
            state
                .processes
                .iter()
                .filter(|p| p.executable == executable && p.finish())
                .map(|p| p.event_tx.clone())
                .collect()
        };
        for tx in senders {
            let _ = tx.send(ProcessEvent::Exited { code: None }).await;
        }
        Ok(())
    }

    async fn used_ports(&self, candidates: RangeInclusive<u16>) -> Result<Vec<u16>> {
        if let Some(reason) = &self.used_ports_failure {
            return Err(Error::device(reason.clone()));
        }
        Ok(self
            .used_ports
            .iter()
            .copied()
            .filter(|port| candidates.contains(port))
            .collect())
    }

    async fn has_command(&self, name: &str) -> bool {
        self.commands.contains(name)
    }

    async fn run(&self, command: &RemoteCommand) -> Result<String> {
        self.run_outputs
            .get(&command.executable)
            .cloned()
            .ok_or_else(|| Error::device(format!("'{}' not available", command)))
    }
}

//! The host machine used as a debug target
//!
//! Useful for exercising the full session flow without hardware: processes are
//! spawned locally, the signal operation kills what this device spawned, and
//! port usage is probed with a localhost bind.

use std::ops::RangeInclusive;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::process::Command;
use tokio::sync::mpsc;

use rdemon_core::prelude::*;
use rdemon_core::{OsVersion, ProcessEvent, RemoteCommand};

use crate::device::Device;
use crate::process::RemoteProcess;

/// Returns `true` when `port` can be bound on localhost.
pub fn port_available(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// A process this device started, remembered for the signal operation
#[derive(Debug, Clone)]
struct SpawnedProcess {
    pid: u32,
    executable: String,
}

/// The local machine, reporting a configurable OS version
#[derive(Debug, Clone)]
pub struct HostDevice {
    id: String,
    os_version: OsVersion,
    spawned: Arc<Mutex<Vec<SpawnedProcess>>>,
}

impl HostDevice {
    pub fn new(id: impl Into<String>, os_version: OsVersion) -> Self {
        Self {
            id: id.into(),
            os_version,
            spawned: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn pids_for(&self, executable: &str) -> Vec<u32> {
        let spawned = self.spawned.lock().unwrap_or_else(|e| e.into_inner());
        spawned
            .iter()
            .filter(|p| p.executable == executable)
            .map(|p| p.pid)
            .collect()
    }

    fn forget(&self, pids: &[u32]) {
        let mut spawned = self.spawned.lock().unwrap_or_else(|e| e.into_inner());
        spawned.retain(|p| !pids.contains(&p.pid));
    }
}

impl Device for HostDevice {
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
        let process = RemoteProcess::spawn_local(command, event_tx)?;
        if let Some(pid) = process.id() {
            let mut spawned = self.spawned.lock().unwrap_or_else(|e| e.into_inner());
            spawned.push(SpawnedProcess {
                pid,
                executable: command.executable.clone(),
            });
        }
        Ok(process)
    }

    async fn kill_process(&self, executable: &str) -> Result<()> {
        let pids = self.pids_for(executable);
        if pids.is_empty() {
            debug!("No processes for {} on {}", executable, self.id);
            return Ok(());
        }

        info!("Killing {} ({:?}) on {}", executable, pids, self.id);
        let status = Command::new("kill")
            .arg("-TERM")
            .args(pids.iter().map(u32::to_string))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        self.forget(&pids);

        // `kill` also fails when the processes are already gone
        if !status.success() {
            debug!("kill exited with {:?} for {}", status.code(), executable);
        }
        Ok(())
    }

    async fn used_ports(&self, candidates: RangeInclusive<u16>) -> Result<Vec<u16>> {
        Ok(candidates.filter(|port| !port_available(*port)).collect())
    }

    async fn has_command(&self, name: &str) -> bool {
        which::which(name)
            .inspect_err(|e| debug!("{} not found on {}: {}", name, self.id, e))
            .is_ok()
    }

    async fn run(&self, command: &RemoteCommand) -> Result<String> {
        let mut cmd = Command::new(&command.executable);
        cmd.args(&command.arguments)
            .envs(&command.environment)
            .stdin(Stdio::null());
        if let Some(dir) = &command.working_directory {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(Error::device(format!(
                "'{}' exited with {:?}: {}",
                command,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

//! Device abstraction consumed by the session orchestrator

use std::ops::RangeInclusive;

use tokio::sync::mpsc;

use rdemon_core::prelude::*;
use rdemon_core::{OsVersion, ProcessEvent, RemoteCommand};

use crate::process::RemoteProcess;

/// A target device that can run processes and answer queries about itself.
///
/// One device connection is shared by every session running against it, so
/// implementations must tolerate concurrent, independent calls.
#[trait_variant::make(Device: Send)]
pub trait LocalDevice {
    /// Stable identifier, used to scope port reservations
    fn id(&self) -> &str;

    /// OS/firmware version of the target
    fn os_version(&self) -> OsVersion;

    /// Start `command`. Output and the final exit are sent on `event_tx`.
    async fn spawn(
        &self,
        command: &RemoteCommand,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<RemoteProcess>;

    /// Signal operation: kill every process running `executable`
    async fn kill_process(&self, executable: &str) -> Result<()>;

    /// Ports within `candidates` that are already in use on the device
    async fn used_ports(&self, candidates: RangeInclusive<u16>) -> Result<Vec<u16>>;

    /// Whether `name` resolves to an executable on the device
    async fn has_command(&self, name: &str) -> bool;

    /// Run a short-lived command and return its stdout
    async fn run(&self, command: &RemoteCommand) -> Result<String>;
}

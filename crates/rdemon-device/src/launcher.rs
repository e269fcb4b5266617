//! Remote process launcher
//!
//! Adapts a device's process control into the launcher event contract:
//! exactly one `Started` or `Error` per start attempt, then (only after
//! `Started`) output events and exactly one `Finished`.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use rdemon_core::prelude::*;
use rdemon_core::{LauncherEvent, ProcessEvent, RemoteCommand, SessionEvent};

use crate::device::Device;

/// Runs one remote command per session on a device
#[derive(Debug)]
pub struct ProcessLauncher<D> {
    device: Arc<D>,
    /// Tells the running task to kill the process. Consumed by `stop()`.
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<D> ProcessLauncher<D>
where
    D: Device + Send + Sync + 'static,
{
    pub fn new(device: Arc<D>) -> Self {
        Self {
            device,
            stop_tx: None,
            task: None,
        }
    }

    /// Start `command` without blocking. Events are delivered on `event_tx`.
    ///
    /// Fails with `InvalidState` if a previous start attempt is still alive.
    pub fn start(
        &mut self,
        command: RemoteCommand,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Result<()> {
        if self.is_active() {
            return Err(Error::invalid_state("launcher already started"));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_tx = Some(stop_tx);
        self.task = Some(tokio::spawn(run_remote_process(
            Arc::clone(&self.device),
            command,
            event_tx,
            stop_rx,
        )));
        Ok(())
    }

    /// Best-effort kill of whatever this launcher started. Never blocks; a
    /// no-op if nothing was started or the process already finished.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            debug!("Stopping remote process on {}", self.device.id());
            let _ = tx.send(());
        }
    }

    /// Whether the launcher task is still running
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// Task body: spawn, confirm, forward output until the process exits.
async fn run_remote_process<D>(
    device: Arc<D>,
    command: RemoteCommand,
    event_tx: mpsc::Sender<SessionEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) where
    D: Device + Send + Sync + 'static,
{
    let send = |event: LauncherEvent| {
        let tx = event_tx.clone();
        async move { tx.send(SessionEvent::Launcher(event)).await.is_ok() }
    };

    send(LauncherEvent::Progress(format!(
        "Starting remote process {}...",
        command
    )))
    .await;

    let (process_tx, mut process_rx) = mpsc::channel::<ProcessEvent>(256);
    let mut process = match device.spawn(&command, process_tx).await {
        Ok(process) => process,
        Err(e) => {
            warn!("Failed to start {} on {}: {}", command, device.id(), e);
            send(LauncherEvent::Error(e.to_string())).await;
            return;
        }
    };

    if !send(LauncherEvent::Started { pid: process.id() }).await {
        debug!("Session gone before start was confirmed, killing process");
        process.kill();
        return;
    }

    let mut stop_requested = false;
    loop {
        tokio::select! {
            event = process_rx.recv() => {
                let forwarded = match event {
                    Some(ProcessEvent::Stdout(line)) => send(LauncherEvent::Stdout(line)).await,
                    Some(ProcessEvent::Stderr(line)) => send(LauncherEvent::Stderr(line)).await,
                    Some(ProcessEvent::Exited { code }) => {
                        info!("Remote process {} finished with code {:?}", command.executable, code);
                        send(LauncherEvent::Finished {
                            success: ProcessEvent::exit_success(code),
                        })
                        .await;
                        break;
                    }
                    None => {
                        warn!("Device closed the process channel without an exit status");
                        send(LauncherEvent::Finished { success: false }).await;
                        break;
                    }
                };
                if !forwarded {
                    debug!("Session channel closed, killing remote process");
                    process.kill();
                    break;
                }
            }
            _ = &mut stop_rx, if !stop_requested => {
                stop_requested = true;
                process.kill();
            }
        }
    }
}

//! Device log tail for one application launch
//!
//! Runs `<tool> -w` on the device and relays the lines that belong to the
//! session's application. A probe for the tool, when enabled, reports a
//! missing tool once instead of failing silently.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use rdemon_core::prelude::*;
use rdemon_core::{LogStreamEvent, ProcessEvent, RemoteCommand, SessionEvent};

use crate::device::Device;
use crate::slog2::{LogTimestamp, Slog2Filter, DATE_FORMAT_ARG};

/// What to run and whether to look for it first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamConfig {
    /// Log tool name on the device
    pub tool: String,

    /// Check the tool exists before starting it
    pub probe_for_tool: bool,
}

impl Default for LogStreamConfig {
    fn default() -> Self {
        Self {
            tool: "slog2info".to_string(),
            probe_for_tool: true,
        }
    }
}

/// Streams device log lines for one application id
#[derive(Debug)]
pub struct LogStreamer<D> {
    device: Arc<D>,
    application_id: String,
    config: LogStreamConfig,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl<D> LogStreamer<D>
where
    D: Device + Send + Sync + 'static,
{
    pub fn new(device: Arc<D>, application_id: impl Into<String>, config: LogStreamConfig) -> Self {
        Self {
            device,
            application_id: application_id.into(),
            config,
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Begin streaming. A second call while started is a no-op.
    pub fn start(&mut self, event_tx: mpsc::Sender<SessionEvent>) {
        if self.shutdown_tx.is_some() {
            debug!("Log streamer for {} already started", self.application_id);
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(tokio::spawn(stream_device_log(
            Arc::clone(&self.device),
            self.application_id.clone(),
            self.config.clone(),
            event_tx,
            shutdown_rx,
        )));
    }

    /// Stop streaming. Idempotent; safe before `start()`.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            debug!("Stopping log streamer for {}", self.application_id);
            let _ = tx.send(true);
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

async fn stream_device_log<D>(
    device: Arc<D>,
    application_id: String,
    config: LogStreamConfig,
    event_tx: mpsc::Sender<SessionEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    D: Device + Send + Sync + 'static,
{
    if config.probe_for_tool && !device.has_command(&config.tool).await {
        info!("{} not found on {}", config.tool, device.id());
        let _ = event_tx
            .send(SessionEvent::LogStream(LogStreamEvent::ToolMissing))
            .await;
        return;
    }
    if *shutdown_rx.borrow() {
        return;
    }

    // Lines logged before this moment belong to earlier runs of the app
    let launch_time = match device
        .run(&RemoteCommand::new("date").arg(DATE_FORMAT_ARG))
        .await
    {
        Ok(output) => LogTimestamp::parse(&output),
        Err(e) => {
            debug!("Could not read device time, relaying all log lines: {}", e);
            None
        }
    };
    if *shutdown_rx.borrow() {
        return;
    }

    let (process_tx, mut process_rx) = mpsc::channel::<ProcessEvent>(256);
    let command = RemoteCommand::new(&config.tool).arg("-w");
    let mut process = match device.spawn(&command, process_tx).await {
        Ok(process) => process,
        Err(e) => {
            debug!("Log tail '{}' not started: {}", command, e);
            return;
        }
    };

    if event_tx
        .send(SessionEvent::LogStream(LogStreamEvent::Started))
        .await
        .is_err()
    {
        process.kill();
        return;
    }

    let mut filter = Slog2Filter::new(&application_id, launch_time);
    debug!(
        "Streaming {} for {} since {:?}",
        config.tool,
        filter.application_id(),
        launch_time
    );

    loop {
        tokio::select! {
            event = process_rx.recv() => match event {
                Some(ProcessEvent::Stdout(line)) => {
                    let Some(message) = filter.accept(&line) else {
                        continue;
                    };
                    if event_tx
                        .send(SessionEvent::LogStream(LogStreamEvent::Line(message)))
                        .await
                        .is_err()
                    {
                        process.kill();
                        break;
                    }
                }
                Some(ProcessEvent::Stderr(line)) => {
                    trace!("{} stderr: {}", config.tool, line);
                }
                Some(ProcessEvent::Exited { code }) => {
                    debug!("{} exited with {:?}", config.tool, code);
                    break;
                }
                None => break,
            },
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    process.kill();
                    break;
                }
            }
        }
    }
}

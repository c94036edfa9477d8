use std::sync::{Arc, Mutex as SyncMutex, PoisonError};

use nv40::{Channel, ErrorReport, Nv40Command};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use utilities::motor_controller::AxisStatus;

use crate::command_executor::command_sender::{LinkError, Nv40CommandSender};

/// Last values read back for one axis.
pub struct AxisReadback {
    raw_position: SyncMutex<f64>,
    status: watch::Sender<AxisStatus>,
}

impl AxisReadback {
    fn new() -> Self {
        let (status, _) = watch::channel(AxisStatus::default());
        Self {
            raw_position: SyncMutex::new(0.0),
            status,
        }
    }

    /// Cached encoder position in device units.
    pub fn raw_position(&self) -> f64 {
        *self
            .raw_position
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> AxisStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AxisStatus> {
        self.status.subscribe()
    }

    pub(crate) fn publish_position(&self, raw: f64, unit_scale: f64) {
        *self
            .raw_position
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = raw;

        let position = raw * unit_scale;
        self.status.send_modify(|status| {
            status.position = position;
            status.encoder_position = position;
        });
    }

    pub(crate) fn publish_motion(&self, moving: bool, done: bool) {
        self.status.send_modify(|status| {
            status.moving = moving;
            status.done = done;
        });
    }
}

/// What a controller shares with its axes: the command queue, the unit
/// scale, the status string and the per-axis readbacks.
#[derive(Clone)]
pub struct ControllerHandle {
    port_name: Arc<str>,
    sender: Nv40CommandSender,
    unit_scale: f64,
    status: Arc<Mutex<String>>,
    readbacks: Arc<Vec<Arc<AxisReadback>>>,
}

impl ControllerHandle {
    pub fn new(port_name: &str, sender: Nv40CommandSender, unit_scale: f64, num_axes: usize) -> Self {
        Self {
            port_name: Arc::from(port_name),
            sender,
            unit_scale,
            status: Arc::new(Mutex::new(String::new())),
            readbacks: Arc::new((0..num_axes).map(|_| Arc::new(AxisReadback::new())).collect()),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn unit_scale(&self) -> f64 {
        self.unit_scale
    }

    pub fn num_axes(&self) -> usize {
        self.readbacks.len()
    }

    pub fn readback(&self, channel: Channel) -> Option<Arc<AxisReadback>> {
        self.readbacks.get(channel.index()).cloned()
    }

    pub async fn status_string(&self) -> String {
        self.status.lock().await.clone()
    }

    pub async fn set_status(&self, text: &str) {
        *self.status.lock().await = text.to_string();
    }

    pub(crate) fn stop_executor(&self) {
        self.sender.stop();
    }

    pub async fn write(&self, command: Nv40Command) -> Result<(), LinkError> {
        self.sender.write(command).await
    }

    pub async fn write_read(&self, command: Nv40Command) -> Result<String, LinkError> {
        self.sender.write_read(command).await
    }

    pub async fn read_position(&self, channel: Channel) -> Result<f64, LinkError> {
        self.sender.read_position(channel).await
    }

    pub async fn query_version(&self) -> Result<String, LinkError> {
        let version = self.write_read(Nv40Command::Version).await?;
        info!(port = %self.port_name, %version, "NV40 version");
        Ok(version)
    }

    /// Asks the controller for its last error and mirrors it into the status
    /// string. Returns whether an error was reported.
    pub async fn check_error(&self) -> Result<bool, LinkError> {
        let report = self.sender.query_error().await?;

        match &report {
            ErrorReport::NoError => debug!(port = %self.port_name, "no device error"),
            ErrorReport::Device(message) => {
                warn!(port = %self.port_name, %message, "device error")
            }
            ErrorReport::Unrecognized(reply) => {
                warn!(port = %self.port_name, %reply, "unrecognized error reply")
            }
        }

        if let Some(text) = report.status_text() {
            self.set_status(text).await;
        }

        Ok(report.is_error())
    }

    /// Reads every channel with one `measure` and publishes the positions of
    /// the configured axes. Nothing is published if the exchange fails.
    pub async fn query_positions(&self) -> Result<(), LinkError> {
        let positions = self.sender.measure().await?;

        for (readback, raw) in self.readbacks.iter().zip(positions) {
            readback.publish_position(raw, self.unit_scale);
        }

        debug!(port = %self.port_name, ?positions, "positions");
        Ok(())
    }
}

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use bitflags::bitflags;
use nv40::{Channel, Nv40Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use utilities::motor_controller::{Axis, AxisError, AxisStatus, MoveParams};

use crate::{
    command_executor::command_sender::LinkError,
    controllers::nv40::handle::{AxisReadback, ControllerHandle},
};

/// Consecutive failed status queries before it is reported loudly.
pub const NV40_STATUS_FAILED_THRESHOLD: u32 = 100;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AxisFlags: u32 {
        const REMOTE_CONTROL = 0b0001;
        const CLOSED_LOOP = 0b0010;
        const DEVICE_ERROR = 0b0100;
    }
}

fn link_error(e: LinkError) -> AxisError {
    AxisError::Link(e.to_string())
}

pub struct Nv40Axis {
    name: String,
    channel: Channel,
    handle: ControllerHandle,
    readback: Arc<AxisReadback>,

    status_failed: AtomicU32,
    flags: AtomicU32,
}

impl Nv40Axis {
    /// `None` when the controller was not set up with this many axes.
    pub fn new(handle: ControllerHandle, channel: Channel) -> Option<Self> {
        let readback = handle.readback(channel)?;

        Some(Self {
            name: format!("{}:{}", handle.port_name(), channel),
            channel,
            handle,
            readback,
            status_failed: AtomicU32::new(0),
            flags: AtomicU32::new(0),
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn flags(&self) -> AxisFlags {
        AxisFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    pub fn is_flag_set(&self, flag: AxisFlags) -> bool {
        self.flags().contains(flag)
    }

    pub fn set_flag(&self, flag: AxisFlags, set: bool) {
        if set {
            self.flags.fetch_or(flag.bits(), Ordering::Relaxed);
        } else {
            self.flags.fetch_and(!flag.bits(), Ordering::Relaxed);
        }
    }

    pub fn failed_status_queries(&self) -> u32 {
        self.status_failed.load(Ordering::Relaxed)
    }

    /// Cached encoder position in device units.
    pub fn encoder_position(&self) -> f64 {
        self.readback.raw_position()
    }

    fn record_failure(&self, e: &LinkError) {
        let failures = self.status_failed.fetch_add(1, Ordering::Relaxed) + 1;

        if failures == NV40_STATUS_FAILED_THRESHOLD {
            warn!(
                axis = %self.name,
                failures,
                error = %e,
                "status queries keep failing"
            );
        } else {
            debug!(axis = %self.name, failures, error = %e, "status query failed");
        }
    }

    async fn confirm(&self, flag: AxisFlags, enabled: bool) -> Result<(), AxisError> {
        let errored = self.handle.check_error().await.map_err(link_error)?;
        self.set_flag(AxisFlags::DEVICE_ERROR, errored);

        if errored {
            return Err(AxisError::Device(self.handle.status_string().await));
        }

        self.set_flag(flag, enabled);
        Ok(())
    }

    pub async fn set_remote_control(&self, enabled: bool) -> Result<(), AxisError> {
        self.handle
            .write(Nv40Command::SetRemoteControl {
                channel: self.channel,
                enabled,
            })
            .await
            .map_err(link_error)?;

        self.confirm(AxisFlags::REMOTE_CONTROL, enabled).await
    }

    pub async fn set_closed_loop(&self, enabled: bool) -> Result<(), AxisError> {
        self.handle
            .write(Nv40Command::SetClosedLoop {
                channel: self.channel,
                enabled,
            })
            .await
            .map_err(link_error)?;

        self.confirm(AxisFlags::CLOSED_LOOP, enabled).await
    }

    /// Reads this channel alone with `rk`; returns the position in host units.
    pub async fn query_position(&self) -> Result<f64, AxisError> {
        match self.handle.read_position(self.channel).await {
            Ok(raw) => {
                self.status_failed.store(0, Ordering::Relaxed);
                self.readback.publish_position(raw, self.handle.unit_scale());
                Ok(raw * self.handle.unit_scale())
            }
            Err(e) => {
                self.record_failure(&e);
                Err(link_error(e))
            }
        }
    }
}

#[async_trait::async_trait]
impl Axis for Nv40Axis {
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> usize {
        self.channel.index()
    }

    async fn move_to(
        &self,
        position: f64,
        relative: bool,
        _params: MoveParams,
    ) -> Result<(), AxisError> {
        let target = if relative {
            self.readback.status().position + position
        } else {
            position
        };
        let raw = target / self.handle.unit_scale();

        info!(axis = %self.name, position = raw, "move");

        let result = self
            .handle
            .write(Nv40Command::Set {
                channel: self.channel,
                position: raw,
            })
            .await;

        // The move already went out; the error check is informational.
        match self.handle.check_error().await {
            Ok(errored) => self.set_flag(AxisFlags::DEVICE_ERROR, errored),
            Err(e) => warn!(axis = %self.name, error = %e, "error check after move failed"),
        }

        result.map_err(link_error)
    }

    async fn move_velocity(&self, _params: MoveParams) -> Result<(), AxisError> {
        Err(AxisError::Unsupported("velocity move"))
    }

    async fn home(&self, _params: MoveParams, _forwards: bool) -> Result<(), AxisError> {
        Err(AxisError::Unsupported("homing"))
    }

    async fn stop(&self, _acceleration: f64) -> Result<(), AxisError> {
        // Moves complete immediately; there is nothing to halt.
        Ok(())
    }

    async fn poll(&self) -> Result<bool, AxisError> {
        if self.channel.index() == 0 {
            match self.handle.query_positions().await {
                Ok(()) => self.status_failed.store(0, Ordering::Relaxed),
                Err(e) => self.record_failure(&e),
            }
        }

        // The NV40 has no motion-in-progress signal.
        self.readback.publish_motion(false, true);

        Ok(false)
    }

    fn status(&self) -> AxisStatus {
        self.readback.status()
    }

    fn subscribe(&self) -> watch::Receiver<AxisStatus> {
        self.readback.subscribe()
    }
}

use std::sync::Arc;

use tokio::sync::watch;

/// Readback an axis publishes to the host side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisStatus {
    pub position: f64,
    pub encoder_position: f64,
    pub moving: bool,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveParams {
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub acceleration: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum AxisError {
    #[error("{0} is not supported by this axis")]
    Unsupported(&'static str),
    #[error("link error: {0}")]
    Link(String),
    #[error("device reported an error: {0}")]
    Device(String),
}

#[async_trait::async_trait]
pub trait Axis: Send + Sync {
    fn name(&self) -> &str;
    fn index(&self) -> usize;

    async fn move_to(
        &self,
        position: f64,
        relative: bool,
        params: MoveParams,
    ) -> Result<(), AxisError>;
    async fn move_velocity(&self, params: MoveParams) -> Result<(), AxisError>;
    async fn home(&self, params: MoveParams, forwards: bool) -> Result<(), AxisError>;
    async fn stop(&self, acceleration: f64) -> Result<(), AxisError>;

    /// Refreshes the readback; returns whether the axis is moving.
    async fn poll(&self) -> Result<bool, AxisError>;

    fn status(&self) -> AxisStatus;
    fn subscribe(&self) -> watch::Receiver<AxisStatus>;
}

#[async_trait::async_trait]
pub trait MotorController: Send + Sync {
    fn name(&self) -> &str;
    fn axes(&self) -> Vec<Arc<dyn Axis>>;

    async fn shutdown(&self) -> anyhow::Result<()>;
}

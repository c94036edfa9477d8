use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{info, warn};
use utilities::motor_controller::{Axis, MotorController};

use crate::{
    command_executor::{Nv40Handler, command_sender::LinkError},
    controllers::nv40::{
        axis::Nv40Axis,
        handle::ControllerHandle,
        poller::{spawn_poller, spawn_status_logger},
    },
};

pub struct Nv40Controller {
    handle: ControllerHandle,
    axes: Vec<Arc<Nv40Axis>>,

    executor_join_handle: Mutex<Option<JoinHandle<Nv40Handler>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Nv40Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nv40Controller")
            .field("port_name", &self.port_name())
            .finish_non_exhaustive()
    }
}

impl Nv40Controller {
    pub fn new(
        handle: ControllerHandle,
        axes: Vec<Arc<Nv40Axis>>,
        executor_join_handle: JoinHandle<Nv40Handler>,
    ) -> Self {
        Self {
            handle,
            axes,
            executor_join_handle: Mutex::new(Some(executor_join_handle)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn port_name(&self) -> &str {
        self.handle.port_name()
    }

    pub fn unit_scale(&self) -> f64 {
        self.handle.unit_scale()
    }

    pub fn axis(&self, index: usize) -> Option<Arc<Nv40Axis>> {
        self.axes.get(index).cloned()
    }

    pub fn num_axes(&self) -> usize {
        self.axes.len()
    }

    pub async fn status_string(&self) -> String {
        self.handle.status_string().await
    }

    pub async fn query_positions(&self) -> Result<(), LinkError> {
        self.handle.query_positions().await
    }

    pub async fn query_version(&self) -> Result<String, LinkError> {
        self.handle.query_version().await
    }

    pub async fn check_error(&self) -> Result<bool, LinkError> {
        self.handle.check_error().await
    }

    /// Starts the poll loop. Moving and idle poll periods are the same.
    pub async fn start_polling(&self, period: Duration) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }

        tasks.push(spawn_poller(
            self.port_name().to_string(),
            self.axes(),
            period,
        ));
        tasks.extend(self.axes().into_iter().map(spawn_status_logger));

        info!(port = self.port_name(), ?period, "polling started");
    }
}

#[async_trait::async_trait]
impl MotorController for Nv40Controller {
    fn name(&self) -> &str {
        self.port_name()
    }

    fn axes(&self) -> Vec<Arc<dyn Axis>> {
        self.axes
            .iter()
            .map(|axis| axis.clone() as Arc<dyn Axis>)
            .collect()
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        for axis in self.axes() {
            if let Err(e) = axis.stop(0.0).await {
                warn!(axis = axis.name(), error = %e, "stop failed");
            }
        }

        self.handle.stop_executor();
        if let Some(executor) = self.executor_join_handle.lock().await.take() {
            executor.await?;
        }

        info!(port = self.port_name(), "controller shut down");
        Ok(())
    }
}

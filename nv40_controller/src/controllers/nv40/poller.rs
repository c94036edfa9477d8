use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, warn};
use utilities::motor_controller::Axis;

pub async fn poll_axes(port_name: &str, axes: &[Arc<dyn Axis>]) {
    for axis in axes {
        if let Err(e) = axis.poll().await {
            warn!(port = port_name, axis = axis.name(), error = %e, "poll failed");
        }
    }
}

/// Polls every axis in index order once per `period` until aborted.
pub fn spawn_poller(port_name: String, axes: Vec<Arc<dyn Axis>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(port = %port_name, ?period, "poller started");

        loop {
            interval.tick().await;
            poll_axes(&port_name, &axes).await;
        }
    })
}

/// Logs readback changes of `axis` until aborted.
pub fn spawn_status_logger(axis: Arc<dyn Axis>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut status_rx = axis.subscribe();
        let mut last = *status_rx.borrow_and_update();

        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow_and_update();
            if status.position != last.position {
                debug!(
                    axis = axis.name(),
                    position = status.position,
                    "position changed"
                );
            }
            last = status;
        }
    })
}

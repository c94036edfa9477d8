pub mod axis;
pub mod config;
pub mod controller;
pub mod handle;
pub mod poller;

use std::sync::Arc;

use nv40::{Channel, Nv40};
use tracing::warn;
use utilities::{command_executor::CommandExecutor, transport::Transport};

use crate::{
    command_executor::{Nv40Handler, command_sender::Nv40CommandSender},
    controllers::nv40::{
        axis::Nv40Axis, config::Nv40ControllerConfig, controller::Nv40Controller,
        handle::ControllerHandle,
    },
};

pub fn create_executor(
    config: &Nv40ControllerConfig,
    link: Option<Box<dyn Transport>>,
) -> (CommandExecutor<Nv40Handler>, Nv40CommandSender) {
    let nv40 = Nv40::new(config.timeout());

    let handler = match link {
        Some(link) => Nv40Handler::new(link, nv40),
        None => Nv40Handler::disconnected(nv40),
    };

    let command_executor = CommandExecutor::new(handler);
    let command_sender = Nv40CommandSender::new(command_executor.sender());

    (command_executor, command_sender)
}

/// Brings up one NV40: starts its I/O worker, reads the firmware version and
/// puts every configured channel under remote control.
///
/// With no link the controller still comes up, but every transaction fails.
/// Polling is not started here.
pub async fn create_controller(
    config: &Nv40ControllerConfig,
    link: Option<Box<dyn Transport>>,
) -> Nv40Controller {
    let (command_executor, command_sender) = create_executor(config, link);
    let executor_join_handle = command_executor.spawn();

    let handle = ControllerHandle::new(
        &config.port_name,
        command_sender,
        config.unit_scale,
        config.num_axes.min(nv40::NV40_AXES),
    );
    handle.set_status("Startup").await;

    if let Err(e) = handle.query_version().await {
        warn!(port = %config.port_name, error = %e, "cannot read NV40 version");
    }

    let axes: Vec<Arc<Nv40Axis>> = (0..handle.num_axes())
        .filter_map(Channel::from_index)
        .filter_map(|channel| Nv40Axis::new(handle.clone(), channel))
        .map(Arc::new)
        .collect();

    for axis in &axes {
        if let Err(e) = axis.set_remote_control(true).await {
            warn!(port = %config.port_name, channel = %axis.channel(), error = %e, "cannot enable remote control");
        }
    }

    Nv40Controller::new(handle, axes, executor_join_handle)
}

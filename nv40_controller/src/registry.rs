use std::{collections::BTreeMap, sync::Arc};

use tracing::warn;
use utilities::motor_controller::MotorController;

use crate::controllers::nv40::controller::Nv40Controller;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("port name {0} is already in use")]
    DuplicatePort(String),
}

/// Controllers by port name, owned by the process entry point.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: BTreeMap<String, Arc<Nv40Controller>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, port_name: &str) -> bool {
        self.controllers.contains_key(port_name)
    }

    pub fn register(&mut self, controller: Arc<Nv40Controller>) -> Result<(), RegistryError> {
        let port_name = controller.port_name().to_string();
        if self.contains(&port_name) {
            return Err(RegistryError::DuplicatePort(port_name));
        }

        self.controllers.insert(port_name, controller);
        Ok(())
    }

    pub fn find(&self, port_name: &str) -> Option<Arc<Nv40Controller>> {
        let controller = self.controllers.get(port_name).cloned();
        if controller.is_none() {
            warn!(port = port_name, "no NV40 controller on this port");
        }
        controller
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Arc<Nv40Controller>> {
        self.controllers.values()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub async fn shutdown_all(&self) {
        for controller in self.controllers() {
            if let Err(e) = controller.shutdown().await {
                warn!(port = controller.port_name(), error = %e, "shutdown failed");
            }
        }
    }
}

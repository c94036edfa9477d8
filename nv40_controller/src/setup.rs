use std::sync::Arc;

use tracing::{error, info, warn};
use utilities::{
    lazy_tcp::{LazyTcpStream, LinkTimeouts},
    transport::{Transport, open_serial},
};

use crate::{
    config::{Config, PortConfig},
    controllers::nv40::{config::Nv40ControllerConfig, controller::Nv40Controller, create_controller},
    registry::{ControllerRegistry, RegistryError},
};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("invalid controller configuration: {0}")]
    Invalid(String),

    #[error("unknown transport port {0}")]
    UnknownPort(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Opens the link described by `port`. TCP links connect lazily; a serial
/// port that cannot be opened leaves the controller without a link.
pub fn open_link(port: &PortConfig, config: &Nv40ControllerConfig) -> Option<Box<dyn Transport>> {
    match port {
        PortConfig::Tcp {
            address,
            max_retries,
        } => {
            let stream = LazyTcpStream::new(
                address.as_str(),
                *max_retries,
                LinkTimeouts::uniform(config.timeout()),
            );
            Some(Box::new(stream))
        }
        PortConfig::Serial { path, baud_rate } => {
            match open_serial(path, *baud_rate, config.timeout()) {
                Ok(link) => Some(link),
                Err(e) => {
                    error!(port = %config.port_name, path, error = %e, "cannot open serial port");
                    None
                }
            }
        }
    }
}

/// Builds, starts and registers one controller over an already opened link.
pub async fn setup_controller(
    registry: &mut ControllerRegistry,
    config: &Nv40ControllerConfig,
    link: Option<Box<dyn Transport>>,
) -> Result<Arc<Nv40Controller>, SetupError> {
    config.validate().map_err(SetupError::Invalid)?;
    if registry.contains(&config.port_name) {
        return Err(RegistryError::DuplicatePort(config.port_name.clone()).into());
    }

    let controller = Arc::new(create_controller(config, link).await);
    controller.start_polling(config.poll_period()).await;
    registry.register(controller.clone())?;

    info!(
        port = %config.port_name,
        transport = %config.transport_port,
        num_axes = config.num_axes,
        "NV40 controller ready"
    );
    Ok(controller)
}

/// Console-style setup: resolves the transport port by name, opens it and
/// brings the controller up.
pub async fn create_controller_command(
    registry: &mut ControllerRegistry,
    ports: &Config,
    config: &Nv40ControllerConfig,
) -> Result<Arc<Nv40Controller>, SetupError> {
    config.validate().map_err(SetupError::Invalid)?;
    if registry.contains(&config.port_name) {
        return Err(RegistryError::DuplicatePort(config.port_name.clone()).into());
    }

    let port = ports
        .port(&config.transport_port)
        .ok_or_else(|| SetupError::UnknownPort(config.transport_port.clone()))?;
    let link = open_link(port, config);

    setup_controller(registry, config, link).await
}

/// Sets up every configured controller. Failures are logged and skipped.
pub async fn setup_all(registry: &mut ControllerRegistry, config: &Config) -> usize {
    let mut started = 0;
    for controller_config in &config.controllers {
        match create_controller_command(registry, config, controller_config).await {
            Ok(_) => started += 1,
            Err(e) => {
                warn!(port = %controller_config.port_name, error = %e, "controller not created");
            }
        }
    }
    started
}

#[cfg(test)]
mod tests {
    use super::*;
    use nv40::reply::NO_ERROR_REPLY;
    use utilities::{motor_controller::MotorController, testing::ScriptedLink};

    fn controller_config(port_name: &str, transport_port: &str) -> Nv40ControllerConfig {
        Nv40ControllerConfig {
            port_name: port_name.to_string(),
            transport_port: transport_port.to_string(),
            num_axes: 1,
            poll_period_ms: 1000,
            timeout_ms: 20,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn setup_registers_controller() {
        let link = ScriptedLink::new();
        link.respond("ver", "NV40/3CLE V1.05")
            .respond("ERR?", NO_ERROR_REPLY);

        let mut registry = ControllerRegistry::new();
        let config = controller_config("NV40_1", "bench");
        let controller = setup_controller(&mut registry, &config, Some(Box::new(link.clone())))
            .await
            .unwrap();

        assert!(registry.contains("NV40_1"));
        assert_eq!(controller.status_string().await, "");
        assert_eq!(link.written()[..3], ["ver", "setk,0,1", "ERR?"]);

        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn duplicate_setup_does_not_touch_the_link() {
        let mut registry = ControllerRegistry::new();
        let config = controller_config("NV40_1", "bench");
        setup_controller(&mut registry, &config, None).await.unwrap();

        let link = ScriptedLink::new();
        let err = setup_controller(&mut registry, &config, Some(Box::new(link.clone())))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SetupError::Registry(RegistryError::DuplicatePort(_))
        ));
        assert!(link.written().is_empty());
        assert_eq!(registry.len(), 1);

        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn unknown_transport_port_is_rejected() {
        let mut registry = ControllerRegistry::new();
        let err = create_controller_command(
            &mut registry,
            &Config::default(),
            &controller_config("NV40_1", "missing"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SetupError::UnknownPort(ref name) if name == "missing"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unopenable_serial_port_leaves_controller_without_link() {
        let mut config = Config::default();
        config.ports.insert(
            "bad_serial".to_string(),
            PortConfig::Serial {
                path: "/nonexistent/tty".to_string(),
                baud_rate: 9600,
            },
        );
        config.controllers = vec![
            controller_config("NV40_1", "bad_serial"),
            controller_config("NV40_2", "missing"),
        ];

        let mut registry = ControllerRegistry::new();
        assert_eq!(setup_all(&mut registry, &config).await, 1);

        let controller = registry.find("NV40_1").unwrap();
        assert_eq!(controller.status_string().await, "Startup");
        assert!(controller.query_positions().await.is_err());
        assert!(registry.find("NV40_2").is_none());

        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut registry = ControllerRegistry::new();
        let config = Nv40ControllerConfig {
            num_axes: 0,
            ..controller_config("NV40_1", "bench")
        };

        let err = setup_controller(&mut registry, &config, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::Invalid(_)));
    }
}

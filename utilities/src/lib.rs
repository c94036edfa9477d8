pub mod command_executor;
pub mod lazy_tcp;
pub mod motor_controller;
pub mod testing;
pub mod transport;

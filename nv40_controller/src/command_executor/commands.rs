use nv40::{Channel, ErrorReport, NV40_AXES, Nv40Command, Nv40Error};
use utilities::command_executor::Command;

use crate::command_executor::Nv40Handler;

#[derive(Debug, Clone)]
pub enum ControllerCommand {
    Write(Nv40Command),
    WriteRead(Nv40Command),
    ReadPosition { channel: Channel },
    Measure,
    QueryError,
}

#[derive(Debug)]
pub enum CommandResponse {
    Ok,
    Reply(String),
    Position(f64),
    Positions([f64; NV40_AXES]),
    Error(ErrorReport),
}

impl Command for ControllerCommand {
    type Response = CommandResponse;
    type Error = Nv40Error;
    type Handler = Nv40Handler;

    fn execute(self, handler: &mut Self::Handler) -> Result<Self::Response, Self::Error> {
        match self {
            ControllerCommand::Write(command) => handler.write(&command),
            ControllerCommand::WriteRead(command) => handler.write_read(&command),
            ControllerCommand::ReadPosition { channel } => handler.read_position(channel),
            ControllerCommand::Measure => handler.measure(),
            ControllerCommand::QueryError => handler.query_error(),
        }
    }
}

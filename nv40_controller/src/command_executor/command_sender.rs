use std::io;

use nv40::{Channel, ErrorReport, NV40_AXES, Nv40Command, Nv40Error};
use utilities::command_executor::{CommandSender, ExecutorError};

use crate::command_executor::commands::{CommandResponse, ControllerCommand};

pub type LinkError = ExecutorError<Nv40Error>;

fn unexpected_response() -> LinkError {
    ExecutorError::Command(Nv40Error::Io(io::Error::other("Unexpected response type")))
}

#[derive(Clone)]
pub struct Nv40CommandSender {
    sender: CommandSender<ControllerCommand>,
}

impl Nv40CommandSender {
    pub fn new(sender: CommandSender<ControllerCommand>) -> Self {
        Self { sender }
    }

    pub fn stop(&self) {
        self.sender.stop();
    }

    pub async fn write(&self, command: Nv40Command) -> Result<(), LinkError> {
        match self
            .sender
            .send_command(ControllerCommand::Write(command))
            .await?
        {
            CommandResponse::Ok => Ok(()),
            _ => Err(unexpected_response()),
        }
    }

    pub async fn write_read(&self, command: Nv40Command) -> Result<String, LinkError> {
        match self
            .sender
            .send_command(ControllerCommand::WriteRead(command))
            .await?
        {
            CommandResponse::Reply(reply) => Ok(reply),
            _ => Err(unexpected_response()),
        }
    }

    pub async fn read_position(&self, channel: Channel) -> Result<f64, LinkError> {
        match self
            .sender
            .send_command(ControllerCommand::ReadPosition { channel })
            .await?
        {
            CommandResponse::Position(position) => Ok(position),
            _ => Err(unexpected_response()),
        }
    }

    pub async fn measure(&self) -> Result<[f64; NV40_AXES], LinkError> {
        match self.sender.send_command(ControllerCommand::Measure).await? {
            CommandResponse::Positions(positions) => Ok(positions),
            _ => Err(unexpected_response()),
        }
    }

    pub async fn query_error(&self) -> Result<ErrorReport, LinkError> {
        match self.sender.send_command(ControllerCommand::QueryError).await? {
            CommandResponse::Error(report) => Ok(report),
            _ => Err(unexpected_response()),
        }
    }
}

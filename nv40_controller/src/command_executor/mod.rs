use nv40::{Channel, Nv40, Nv40Command, Nv40Error};
use utilities::{command_executor::DeviceHandler, transport::Transport};

use crate::command_executor::commands::{CommandResponse, ControllerCommand};

pub mod command_sender;
pub mod commands;

/// Owns the link to one NV40. Only the executor thread touches it.
pub struct Nv40Handler {
    link: Option<Box<dyn Transport>>,
    nv40: Nv40,
}

impl DeviceHandler for Nv40Handler {
    type Command = ControllerCommand;
}

impl Nv40Handler {
    pub fn new(link: Box<dyn Transport>, nv40: Nv40) -> Self {
        Self {
            link: Some(link),
            nv40,
        }
    }

    /// Handler for a link that could not be opened; every command fails.
    pub fn disconnected(nv40: Nv40) -> Self {
        Self { link: None, nv40 }
    }

    fn link(&mut self) -> Result<&mut Box<dyn Transport>, Nv40Error> {
        self.link.as_mut().ok_or(Nv40Error::NotConnected)
    }

    pub fn write(&mut self, command: &Nv40Command) -> Result<CommandResponse, Nv40Error> {
        let nv40 = self.nv40;
        nv40.write(self.link()?, command)?;
        Ok(CommandResponse::Ok)
    }

    pub fn write_read(&mut self, command: &Nv40Command) -> Result<CommandResponse, Nv40Error> {
        let nv40 = self.nv40;
        let reply = nv40.write_read(self.link()?, command)?;
        Ok(CommandResponse::Reply(reply))
    }

    pub fn read_position(&mut self, channel: Channel) -> Result<CommandResponse, Nv40Error> {
        let nv40 = self.nv40;
        let position = nv40.read_position(self.link()?, channel)?;
        Ok(CommandResponse::Position(position))
    }

    pub fn measure(&mut self) -> Result<CommandResponse, Nv40Error> {
        let nv40 = self.nv40;
        let positions = nv40.measure(self.link()?)?;
        Ok(CommandResponse::Positions(positions))
    }

    pub fn query_error(&mut self) -> Result<CommandResponse, Nv40Error> {
        let nv40 = self.nv40;
        let report = nv40.query_error(self.link()?)?;
        Ok(CommandResponse::Error(report))
    }
}

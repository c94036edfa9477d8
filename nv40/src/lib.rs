//! Protocol driver for the NV40/3 three-channel piezo amplifier.
//!
//! Commands and replies are ASCII lines terminated by a carriage return. Every
//! call is a single synchronous transaction over a caller-supplied link; the
//! caller is responsible for keeping transactions exclusive.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use utilities::transport::Transport;

pub mod command;
pub mod reply;

pub use command::{Channel, NV40_AXES, Nv40Command};
pub use reply::{ErrorReport, ParseError};

pub const EOS: u8 = b'\r';
/// Size of the controller's command and reply buffers.
pub const NV40_STRING_SIZE: usize = 160;
pub const NV40_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum Nv40Error {
    #[error("I/O error: {0}")]
    Io(io::Error),
    #[error("timed out waiting for reply")]
    Timeout,
    #[error("link closed by peer")]
    Disconnected,
    #[error("no reply terminator within {0} bytes")]
    ReplyTooLong(usize),
    #[error("command longer than {0} bytes")]
    CommandTooLong(usize),
    #[error("malformed reply {reply:?}: {source}")]
    Parse {
        reply: String,
        #[source]
        source: ParseError,
    },
    #[error("controller link is not open")]
    NotConnected,
}

impl From<io::Error> for Nv40Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Nv40Error::Timeout,
            io::ErrorKind::NotConnected => Nv40Error::NotConnected,
            _ => Nv40Error::Io(e),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Nv40 {
    timeout: Duration,
}

impl Default for Nv40 {
    fn default() -> Self {
        Self::new(NV40_TIMEOUT)
    }
}

impl Nv40 {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn write(
        &self,
        client: &mut impl Transport,
        command: &Nv40Command,
    ) -> Result<(), Nv40Error> {
        let mut frame = command.to_string().into_bytes();
        if frame.len() >= NV40_STRING_SIZE {
            return Err(Nv40Error::CommandTooLong(NV40_STRING_SIZE));
        }

        debug!(%command, "write");
        frame.push(EOS);
        client.write_all(&frame)?;
        client.flush()?;
        Ok(())
    }

    pub fn write_read(
        &self,
        client: &mut impl Transport,
        command: &Nv40Command,
    ) -> Result<String, Nv40Error> {
        // A reply that missed an earlier deadline must not answer this command.
        client.clear_input()?;
        self.write(client, command)?;
        let reply = self.read_reply(client)?;
        trace!(%command, %reply, "read");
        Ok(reply)
    }

    fn read_reply(&self, client: &mut impl Transport) -> Result<String, Nv40Error> {
        let started = Instant::now();
        let mut reply = Vec::with_capacity(NV40_STRING_SIZE);
        let mut byte = [0u8; 1];

        loop {
            match client.read(&mut byte) {
                Ok(0) => return Err(Nv40Error::Disconnected),
                Ok(_) if byte[0] == EOS => break,
                Ok(_) => {
                    if reply.len() == NV40_STRING_SIZE {
                        return Err(Nv40Error::ReplyTooLong(NV40_STRING_SIZE));
                    }
                    reply.push(byte[0]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }

            if started.elapsed() > self.timeout {
                return Err(Nv40Error::Timeout);
            }
        }

        let reply = String::from_utf8_lossy(&reply);
        Ok(reply::strip_prompt(&reply).to_string())
    }

    pub fn query_version(&self, client: &mut impl Transport) -> Result<String, Nv40Error> {
        self.write_read(client, &Nv40Command::Version)
    }

    pub fn set_remote_control(
        &self,
        client: &mut impl Transport,
        channel: Channel,
        enabled: bool,
    ) -> Result<(), Nv40Error> {
        self.write(client, &Nv40Command::SetRemoteControl { channel, enabled })
    }

    pub fn set_closed_loop(
        &self,
        client: &mut impl Transport,
        channel: Channel,
        enabled: bool,
    ) -> Result<(), Nv40Error> {
        self.write(client, &Nv40Command::SetClosedLoop { channel, enabled })
    }

    /// `position` is in device units.
    pub fn set_position(
        &self,
        client: &mut impl Transport,
        channel: Channel,
        position: f64,
    ) -> Result<(), Nv40Error> {
        self.write(client, &Nv40Command::Set { channel, position })
    }

    pub fn read_position(
        &self,
        client: &mut impl Transport,
        channel: Channel,
    ) -> Result<f64, Nv40Error> {
        let reply = self.write_read(client, &Nv40Command::ReadPosition { channel })?;
        reply::parse_position(&reply, channel).map_err(|source| Nv40Error::Parse { reply, source })
    }

    pub fn measure(&self, client: &mut impl Transport) -> Result<[f64; NV40_AXES], Nv40Error> {
        let reply = self.write_read(client, &Nv40Command::Measure)?;
        reply::parse_measure(&reply).map_err(|source| Nv40Error::Parse { reply, source })
    }

    pub fn query_error(&self, client: &mut impl Transport) -> Result<ErrorReport, Nv40Error> {
        let reply = self.write_read(client, &Nv40Command::ErrorQuery)?;
        Ok(reply::parse_error_reply(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utilities::testing::ScriptedLink;

    fn ch(index: usize) -> Channel {
        Channel::from_index(index).unwrap()
    }

    #[test]
    fn write_appends_carriage_return() {
        let mut link = ScriptedLink::new();
        let nv40 = Nv40::default();

        nv40.set_position(&mut link, ch(1), 2.5).unwrap();
        nv40.set_remote_control(&mut link, ch(0), true).unwrap();

        assert_eq!(link.written(), vec!["set,1,2.500", "setk,0,1"]);
    }

    #[test]
    fn version_reply() {
        let mut link = ScriptedLink::new();
        link.respond("ver", "NV40/3CLE V1.05");

        let version = Nv40::default().query_version(&mut link).unwrap();
        assert_eq!(version, "NV40/3CLE V1.05");
    }

    #[test]
    fn read_position_checks_axis() {
        let mut link = ScriptedLink::new();
        link.respond("rk,1", "rk,1,42.125").respond("rk,2", "rk,1,42.125");
        let nv40 = Nv40::default();

        assert_eq!(nv40.read_position(&mut link, ch(1)).unwrap(), 42.125);

        let err = nv40.read_position(&mut link, ch(2)).unwrap_err();
        assert!(matches!(
            err,
            Nv40Error::Parse {
                source: ParseError::AxisMismatch {
                    expected: 2,
                    received: 1
                },
                ..
            }
        ));
    }

    #[test]
    fn measure_after_prompt() {
        let mut link = ScriptedLink::new();
        link.respond("measure", "NV403CL>aw,1.5,2.5,3.5");

        let positions = Nv40::default().measure(&mut link).unwrap();
        assert_eq!(positions, [1.5, 2.5, 3.5]);
    }

    #[test]
    fn silent_device_times_out() {
        let mut link = ScriptedLink::new();

        let err = Nv40::default().measure(&mut link).unwrap_err();
        assert!(matches!(err, Nv40Error::Timeout));
        assert_eq!(link.written(), vec!["measure"]);
    }

    #[test]
    fn late_reply_is_not_taken_for_the_next_one() {
        let mut link = ScriptedLink::new();
        let nv40 = Nv40::default();

        let err = nv40.measure(&mut link).unwrap_err();
        assert!(matches!(err, Nv40Error::Timeout));

        link.deliver_late(b"aw,1.0,1.0,1.0\r");
        link.respond("measure", "aw,2.0,2.0,2.0")
            .respond("ERR?", reply::NO_ERROR_REPLY);

        assert_eq!(nv40.measure(&mut link).unwrap(), [2.0, 2.0, 2.0]);
        assert_eq!(nv40.query_error(&mut link).unwrap(), ErrorReport::NoError);
    }

    #[test]
    fn leftover_of_overlong_reply_is_discarded() {
        let mut link = ScriptedLink::new();
        let mut overlong = vec![b'x'; NV40_STRING_SIZE + 10];
        overlong.extend_from_slice(b"aw,9,9,9\r");
        link.respond_raw("measure", overlong)
            .respond("rk,0", "rk,0,1.5");
        let nv40 = Nv40::default();

        assert!(matches!(
            nv40.measure(&mut link),
            Err(Nv40Error::ReplyTooLong(_))
        ));
        assert_eq!(nv40.read_position(&mut link, ch(0)).unwrap(), 1.5);
    }

    #[test]
    fn unterminated_reply_is_bounded() {
        let mut link = ScriptedLink::new();
        link.respond_raw("ver", vec![b'x'; NV40_STRING_SIZE + 10]);

        let err = Nv40::default().query_version(&mut link).unwrap_err();
        assert!(matches!(err, Nv40Error::ReplyTooLong(NV40_STRING_SIZE)));
    }

    #[test]
    fn broken_link_is_io_error() {
        let mut link = ScriptedLink::new();
        link.break_link();

        let err = Nv40::default()
            .set_closed_loop(&mut link, ch(0), true)
            .unwrap_err();
        assert!(matches!(err, Nv40Error::Io(_)));
    }

    #[test]
    fn oversized_command_is_refused() {
        let mut link = ScriptedLink::new();

        let err = Nv40::default()
            .set_position(&mut link, ch(0), 1.0e200)
            .unwrap_err();
        assert!(matches!(err, Nv40Error::CommandTooLong(_)));
        assert!(link.written().is_empty());
    }

    #[test]
    fn error_query() {
        let mut link = ScriptedLink::new();
        link.respond("ERR?", reply::NO_ERROR_REPLY)
            .respond("ERR?", "ERROR,\"Parameter error in command: bad axis\"");
        let nv40 = Nv40::default();

        assert_eq!(nv40.query_error(&mut link).unwrap(), ErrorReport::NoError);
        assert_eq!(
            nv40.query_error(&mut link).unwrap(),
            ErrorReport::Device("bad axis".to_string())
        );
    }
}

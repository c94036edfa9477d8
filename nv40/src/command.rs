use std::fmt;

/// Number of channels on an NV40/3 controller.
pub const NV40_AXES: usize = 3;

/// Device-side channel number.
///
/// The controller numbers channels from 0, the same as host axis indices, and
/// echoes that number back in `rk` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel(u8);

impl Channel {
    pub fn from_index(index: usize) -> Option<Self> {
        (index < NV40_AXES).then_some(Channel(index as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Nv40Command {
    Version,
    SetRemoteControl { channel: Channel, enabled: bool },
    SetClosedLoop { channel: Channel, enabled: bool },
    /// Absolute position in device units.
    Set { channel: Channel, position: f64 },
    ReadPosition { channel: Channel },
    Measure,
    ErrorQuery,
}

impl Nv40Command {
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            Nv40Command::Version
                | Nv40Command::ReadPosition { .. }
                | Nv40Command::Measure
                | Nv40Command::ErrorQuery
        )
    }
}

impl fmt::Display for Nv40Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nv40Command::Version => f.write_str("ver"),
            Nv40Command::SetRemoteControl { channel, enabled } => {
                write!(f, "setk,{},{}", channel, u8::from(*enabled))
            }
            Nv40Command::SetClosedLoop { channel, enabled } => {
                write!(f, "chloop,{},{}", channel, u8::from(*enabled))
            }
            Nv40Command::Set { channel, position } => write!(f, "set,{},{:.3}", channel, position),
            Nv40Command::ReadPosition { channel } => write!(f, "rk,{}", channel),
            Nv40Command::Measure => f.write_str("measure"),
            Nv40Command::ErrorQuery => f.write_str("ERR?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(index: usize) -> Channel {
        Channel::from_index(index).unwrap()
    }

    #[test]
    fn channels_stop_at_axis_count() {
        assert_eq!(ch(2).number(), 2);
        assert!(Channel::from_index(NV40_AXES).is_none());
    }

    #[test]
    fn renders_wire_text() {
        let cases = [
            (Nv40Command::Version, "ver"),
            (
                Nv40Command::SetRemoteControl {
                    channel: ch(1),
                    enabled: true,
                },
                "setk,1,1",
            ),
            (
                Nv40Command::SetClosedLoop {
                    channel: ch(0),
                    enabled: false,
                },
                "chloop,0,0",
            ),
            (Nv40Command::ReadPosition { channel: ch(2) }, "rk,2"),
            (Nv40Command::Measure, "measure"),
            (Nv40Command::ErrorQuery, "ERR?"),
        ];

        for (command, text) in cases {
            assert_eq!(command.to_string(), text);
        }
    }

    #[test]
    fn set_uses_three_decimals() {
        let set = |position| Nv40Command::Set {
            channel: ch(0),
            position,
        };

        assert_eq!(set(5.0 / 1.0e6).to_string(), "set,0,0.000");
        assert_eq!(set(12.34567).to_string(), "set,0,12.346");
        assert_eq!(set(-3.5).to_string(), "set,0,-3.500");
    }

    #[test]
    fn only_queries_expect_replies() {
        assert!(Nv40Command::Measure.expects_reply());
        assert!(Nv40Command::ReadPosition { channel: ch(0) }.expects_reply());
        assert!(
            !Nv40Command::Set {
                channel: ch(0),
                position: 1.0
            }
            .expects_reply()
        );
    }
}

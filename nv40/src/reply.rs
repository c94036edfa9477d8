use crate::command::{Channel, NV40_AXES};

pub const NO_ERROR_REPLY: &str = "ERROR,\"OK. No error.\"";
pub const PARAMETER_ERROR_PREFIX: &str = "Parameter error in command: ";
/// Console prompt the controller sometimes puts in front of a reply.
pub const PROMPT: &str = "NV403CL>";

const ERROR_PREFIX: &str = "ERROR,";
const STATUS_MAX_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("field {index} is missing")]
    MissingField { index: usize },
    #[error("reply is for axis {received}, expected {expected}")]
    AxisMismatch { expected: u8, received: u8 },
    #[error("{0:?} is not a number")]
    InvalidNumber(String),
    #[error("unexpected extra field {0:?}")]
    UnexpectedField(String),
}

fn parse_number(field: &str) -> Result<f64, ParseError> {
    field
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidNumber(field.to_string()))
}

/// Parses `rk,<axis>,<value>` for `channel`.
pub fn parse_position(reply: &str, channel: Channel) -> Result<f64, ParseError> {
    let mut fields = reply.splitn(3, ',').skip(1);

    let axis = fields.next().ok_or(ParseError::MissingField { index: 1 })?;
    let value = fields.next().ok_or(ParseError::MissingField { index: 2 })?;

    let received: u8 = axis
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidNumber(axis.to_string()))?;
    if received != channel.number() {
        return Err(ParseError::AxisMismatch {
            expected: channel.number(),
            received,
        });
    }

    parse_number(value)
}

/// Parses `<tag>,<v0>,<v1>,<v2>`.
pub fn parse_measure(reply: &str) -> Result<[f64; NV40_AXES], ParseError> {
    let mut fields = reply.split(',').skip(1);
    let mut positions = [0.0; NV40_AXES];

    for (i, position) in positions.iter_mut().enumerate() {
        let field = fields
            .next()
            .ok_or(ParseError::MissingField { index: i + 1 })?;
        *position = parse_number(field)?;
    }

    match fields.next() {
        Some(extra) => Err(ParseError::UnexpectedField(extra.to_string())),
        None => Ok(positions),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorReport {
    NoError,
    /// Message from an `ERROR,"..."` reply, cleaned up for display.
    Device(String),
    Unrecognized(String),
}

impl ErrorReport {
    pub fn is_error(&self) -> bool {
        !matches!(self, ErrorReport::NoError)
    }

    /// Text for the controller status string; `None` leaves it as it was.
    pub fn status_text(&self) -> Option<&str> {
        match self {
            ErrorReport::NoError => Some(""),
            ErrorReport::Device(message) => Some(message.as_str()),
            ErrorReport::Unrecognized(_) => None,
        }
    }
}

/// Interprets the reply to `ERR?`.
pub fn parse_error_reply(reply: &str) -> ErrorReport {
    if reply.starts_with(NO_ERROR_REPLY) {
        return ErrorReport::NoError;
    }

    let Some(message) = reply.strip_prefix(ERROR_PREFIX) else {
        return ErrorReport::Unrecognized(reply.to_string());
    };

    let message = message.strip_prefix('"').unwrap_or(message);
    let message = message.strip_suffix('"').unwrap_or(message);
    let message = message
        .strip_prefix(PARAMETER_ERROR_PREFIX)
        .unwrap_or(message);

    let message = if message.chars().count() > STATUS_MAX_LEN {
        message.chars().take(STATUS_MAX_LEN - 1).collect()
    } else {
        message.to_string()
    };

    ErrorReport::Device(message)
}

pub fn strip_prompt(reply: &str) -> &str {
    let reply = reply.trim_start_matches(['\r', '\n']);
    match reply.strip_prefix(PROMPT) {
        Some(rest) => rest.trim_start(),
        None => reply,
    }
}

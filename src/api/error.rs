use std::error::Error;
use std::fmt::Display;

/// Errors of the wire layer itself, before a message reaches a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    DeserializationFailure,
    UnsupportedFrame,
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeserializationFailure => f.write_str("message could not be decoded"),
            Self::UnsupportedFrame => f.write_str("unsupported transport frame"),
        }
    }
}

impl Error for ProtocolError {}

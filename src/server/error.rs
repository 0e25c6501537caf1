use std::error::Error;
use std::fmt::Display;

use crate::api::message::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerError {
    StartFailure,
    NotConnected,
    AlreadyConnected,
    RoomNotFound,
    RoomFull,
    RoomClosed,
    GameAlreadyStarted,
    NameTaken,
    CodesExhausted,
    InvalidInput,
    DeserializationFailure,
}

impl Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            Self::StartFailure => "The server failed to start",
            Self::NotConnected => "Send a connect message before anything else",
            Self::AlreadyConnected => "This socket already completed its handshake",
            Self::RoomNotFound => "No game with that code",
            Self::RoomFull => "That game is full",
            Self::RoomClosed => "That game is no longer running",
            Self::GameAlreadyStarted => "That game already started",
            Self::NameTaken => "That name is already taken in this game",
            Self::CodesExhausted => "No free game codes; try again later",
            Self::InvalidInput => "The request was malformed",
            Self::DeserializationFailure => "The message could not be decoded",
        };
        f.write_str(description)
    }
}

impl Error for ServerError {}

impl From<ServerError> for ServerMessage {
    fn from(error: ServerError) -> Self {
        ServerMessage::ErrorMessage {
            message: error.to_string(),
        }
    }
}

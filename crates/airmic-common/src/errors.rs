use std::path::PathBuf;

use crate::protocol::FailureCode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures of request/response operations (create, join, check).
///
/// These are the only coordinator errors that travel back over the wire,
/// and only to the connection that issued the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("room {room_id} is full ({max_mics} mics)")]
    RoomFull { room_id: String, max_mics: usize },

    #[error("connection is already in room {0}")]
    AlreadyInRoom(String),

    #[error("could not allocate a free room code after {0} attempts")]
    RoomCodeExhausted(u32),

    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

impl SessionError {
    pub fn code(&self) -> FailureCode {
        match self {
            SessionError::RoomNotFound(_) => FailureCode::RoomNotFound,
            SessionError::RoomFull { .. } => FailureCode::RoomFull,
            SessionError::AlreadyInRoom(_) => FailureCode::AlreadyInRoom,
            SessionError::RoomCodeExhausted(_) | SessionError::Collaborator(_) => {
                FailureCode::CollaboratorFailure
            }
        }
    }
}

/// Reasons a fire-and-forget control write was ignored.
///
/// Never sent to the requesting peer; the dispatcher logs and drops them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("connection {0} is not authorized for this operation")]
    Unauthorized(String),

    #[error("unknown room: {0}")]
    UnknownRoom(String),

    #[error("unknown mic {mic_id} in room {room_id}")]
    UnknownMic { room_id: String, mic_id: String },

    #[error("invalid value for {field}")]
    InvalidValue { field: &'static str },
}

/// Reasons a signaling payload was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("sender {0} is not in any room")]
    SenderUnresolved(String),

    #[error("recipient {0} is not in any room")]
    RecipientUnresolved(String),

    #[error("sender and recipient are in different rooms")]
    DifferentRooms,

    #[error("recipient {0} has no open channel")]
    RecipientGone(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("request rejected ({code:?}): {message}")]
    Rejected { code: FailureCode, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum AirmicError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

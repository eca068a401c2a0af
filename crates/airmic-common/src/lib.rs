pub mod errors;
pub mod id;
pub mod protocol;

pub use errors::{
    AirmicError, ClientError, ConfigError, ControlError, RelayError, SessionError,
};
pub use id::{new_id, ConnId, RoomCode, ROOM_CODE_ALPHABET};
pub use protocol::{ClientMessage, FailureCode, ServerMessage};

pub type Result<T> = std::result::Result<T, AirmicError>;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters a room code may contain. `I`, `O`, `0` and `1` are left out
/// because they are easy to confuse when read aloud or off a screen.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Identifier of one control-channel connection.
///
/// Assigned by the coordinator when the socket is accepted. A reconnect gets
/// a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(String);

impl ConnId {
    pub fn new() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConnId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConnId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short human-typable room identifier.
///
/// Input is case-insensitive: anything converted into a `RoomCode` is
/// trimmed and upper-cased, so `"abc234"` and `" ABC234 "` name the same
/// room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Draw a code of `len` characters uniformly from [`ROOM_CODE_ALPHABET`].
    pub fn generate<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let code = (0..len)
            .map(|_| {
                let idx = rng.gen_range(0..ROOM_CODE_ALPHABET.len());
                ROOM_CODE_ALPHABET[idx] as char
            })
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when every character comes from the room-code alphabet and the
    /// length matches.
    pub fn is_well_formed(&self, len: usize) -> bool {
        self.0.len() == len && self.0.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
    }
}

impl From<&str> for RoomCode {
    fn from(s: &str) -> Self {
        Self(s.trim().to_ascii_uppercase())
    }
}

impl From<String> for RoomCode {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

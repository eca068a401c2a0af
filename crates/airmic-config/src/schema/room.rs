//! Room membership and QR settings.

use serde::{Deserialize, Serialize};

/// Room registry limits and naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Maximum mics per room (valid range: 1-64).
    pub max_mics: u32,
    /// Room code length (valid range: 4-12).
    pub code_length: u32,
    /// Prefix for rooms created without a name; the code is appended.
    pub default_name: String,
    /// Draws before room creation gives up on finding a free code.
    pub max_code_attempts: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_mics: 15,
            code_length: 6,
            default_name: "Room".into(),
            max_code_attempts: 32,
        }
    }
}

/// Join-link QR rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    /// Path of the mic page, appended to the base URL.
    pub path: String,
    /// Minimum rendered width/height in pixels.
    pub min_dimension: u32,
    pub quiet_zone: bool,
    /// Give up on rendering after this many milliseconds.
    pub timeout_ms: u32,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            path: "/mic".into(),
            min_dimension: 300,
            quiet_zone: true,
            timeout_ms: 5000,
        }
    }
}

//! Default TOML config template with inline documentation comments.

use crate::schema::CONFIG_SCHEMA_VERSION;

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    format!(
        "# airmic configuration\n# Schema version {CONFIG_SCHEMA_VERSION}\n{SECTIONS}"
    )
}

/// Every section, commented out at its default value.
const SECTIONS: &str = r##"# Only override what you want to change -- missing fields use defaults.

[server]
# host = "0.0.0.0"
# ws_port = 3001                # control channel (WebSocket)
# http_port = 3000              # health, stats, room lookup, QR
# base_url = "http://localhost:3000"   # bare hostnames get https://
# handshake_timeout_secs = 10
# outbound_queue = 256

[room]
# max_mics = 15                 # 1-64
# code_length = 6               # 4-12
# default_name = "Room"
# max_code_attempts = 32

[qr]
# path = "/mic"
# min_dimension = 300
# quiet_zone = true
# timeout_ms = 5000

[audio]
# default_volume = 1.0          # 0.0-1.0

[audio.effects]
# reverb = 0.0
# echo = 0.0
# eq_bass = 0.0
# eq_mid = 0.0
# eq_treble = 0.0

[gate]
# enabled = true
# threshold_db = -50.0          # dBFS
# hold_ms = 250
# attack_ms = 10
# release_ms = 120

[ducking]
# enabled = true
# threshold_db = -35.0          # host output level, dBFS
# attenuation = 0.3             # mic gain while ducked
# attack_ms = 50
# release_ms = 400

[endpoint]
# poll_interval_ms = 50         # 10-200
# connect_timeout_secs = 10
# request_timeout_secs = 10
# level_report_every = 4        # polls between mic level reports
# signal_queue = 64

[logging]
# level = "airmic=info"
"##;

//! Per-section validators: server, room, qr, audio, gate, ducking, endpoint,
//! and logging.

use crate::schema::AirmicConfig;

use super::helpers::{check_non_empty, check_range};

pub(crate) fn validate_server(errors: &mut Vec<String>, config: &AirmicConfig) {
    let server = &config.server;
    check_non_empty(errors, "server.host", &server.host);
    check_non_empty(errors, "server.base_url", &server.base_url);
    if server.ws_port == 0 {
        errors.push("server.ws_port must not be 0".into());
    }
    if server.http_port == 0 {
        errors.push("server.http_port must not be 0".into());
    }
    if server.ws_port == server.http_port {
        errors.push(format!(
            "server.ws_port and server.http_port must differ (both {})",
            server.ws_port
        ));
    }
    check_range(
        errors,
        "server.handshake_timeout_secs",
        server.handshake_timeout_secs,
        1,
        120,
    );
    check_range(errors, "server.outbound_queue", server.outbound_queue, 8, 65536);
}

pub(crate) fn validate_room(errors: &mut Vec<String>, config: &AirmicConfig) {
    check_range(errors, "room.max_mics", config.room.max_mics, 1, 64);
    check_range(errors, "room.code_length", config.room.code_length, 4, 12);
    check_range(
        errors,
        "room.max_code_attempts",
        config.room.max_code_attempts,
        1,
        1024,
    );
}

pub(crate) fn validate_qr(errors: &mut Vec<String>, config: &AirmicConfig) {
    if !config.qr.path.starts_with('/') {
        errors.push(format!("qr.path = {:?} must start with '/'", config.qr.path));
    }
    check_range(errors, "qr.min_dimension", config.qr.min_dimension, 64, 4096);
    check_range(errors, "qr.timeout_ms", config.qr.timeout_ms, 100, 60_000);
}

pub(crate) fn validate_audio(errors: &mut Vec<String>, config: &AirmicConfig) {
    check_range(
        errors,
        "audio.default_volume",
        config.audio.default_volume,
        0.0,
        1.0,
    );
    let fx = &config.audio.effects;
    for (name, value) in [
        ("audio.effects.reverb", fx.reverb),
        ("audio.effects.echo", fx.echo),
    ] {
        check_range(errors, name, value, 0.0, 1.0);
    }
    for (name, value) in [
        ("audio.effects.eq_bass", fx.eq_bass),
        ("audio.effects.eq_mid", fx.eq_mid),
        ("audio.effects.eq_treble", fx.eq_treble),
    ] {
        check_range(errors, name, value, -24.0, 24.0);
    }
}

pub(crate) fn validate_gate(errors: &mut Vec<String>, config: &AirmicConfig) {
    check_range(
        errors,
        "gate.threshold_db",
        config.gate.threshold_db,
        -100.0,
        0.0,
    );
    check_range(errors, "gate.hold_ms", config.gate.hold_ms, 0, 5000);
    check_range(errors, "gate.attack_ms", config.gate.attack_ms, 1, 1000);
    check_range(errors, "gate.release_ms", config.gate.release_ms, 1, 5000);
}

pub(crate) fn validate_ducking(errors: &mut Vec<String>, config: &AirmicConfig) {
    check_range(
        errors,
        "ducking.threshold_db",
        config.ducking.threshold_db,
        -100.0,
        0.0,
    );
    let attenuation = config.ducking.attenuation;
    if !(0.0..1.0).contains(&attenuation) {
        errors.push(format!(
            "ducking.attenuation = {attenuation} is out of range [0, 1)"
        ));
    }
    check_range(errors, "ducking.attack_ms", config.ducking.attack_ms, 1, 1000);
    check_range(errors, "ducking.release_ms", config.ducking.release_ms, 1, 5000);
    // Releasing faster than attacking makes the mics pump.
    if config.ducking.attack_ms >= config.ducking.release_ms {
        errors.push(format!(
            "ducking.attack_ms ({}) must be shorter than ducking.release_ms ({})",
            config.ducking.attack_ms, config.ducking.release_ms
        ));
    }
}

pub(crate) fn validate_endpoint(errors: &mut Vec<String>, config: &AirmicConfig) {
    check_range(
        errors,
        "endpoint.poll_interval_ms",
        config.endpoint.poll_interval_ms,
        10,
        200,
    );
    check_range(
        errors,
        "endpoint.connect_timeout_secs",
        config.endpoint.connect_timeout_secs,
        1,
        120,
    );
    check_range(
        errors,
        "endpoint.request_timeout_secs",
        config.endpoint.request_timeout_secs,
        1,
        120,
    );
    check_range(
        errors,
        "endpoint.level_report_every",
        config.endpoint.level_report_every,
        1,
        100,
    );
    check_range(
        errors,
        "endpoint.signal_queue",
        config.endpoint.signal_queue,
        1,
        4096,
    );
}

pub(crate) fn validate_logging(errors: &mut Vec<String>, config: &AirmicConfig) {
    check_non_empty(errors, "logging.level", &config.logging.level);
}

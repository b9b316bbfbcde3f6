//! Centralized configuration for tdlink.
//!
//! Constants for call timeouts, admission control, the login handshake, the
//! framed transport and diagnostics parsing.

use std::time::Duration;

/// Correlation and dispatch configuration.
pub struct ClientConfig;

impl ClientConfig {
    /// Upper bound a `send` waits for its response when the caller never cancels.
    pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(60);
    /// Inbound queue depth between the transport reader and the dispatcher.
    pub const INBOUND_QUEUE_SIZE: usize = 1000;
    pub const TYPE_FIELD: &'static str = "@type";
    pub const EXTRA_FIELD: &'static str = "@extra";
}

/// Wind-up admission defaults.
pub struct AdmissionConfig;

impl AdmissionConfig {
    /// Operations per second before any history exists.
    pub const START_RATE: f64 = 2.0;
    /// Admitted requests between two wind-up steps.
    pub const UPDATE_EVERY: u32 = 2;
    pub const WIND_UP_FACTOR: f64 = 1.05;
    /// Operations per second the wind-up never exceeds.
    pub const MAX_RATE: f64 = 10.0;
}

/// Login handshake configuration.
pub struct AuthConfig;

impl AuthConfig {
    /// Pause after reaching Ready so the engine can flush its session database.
    pub const READY_SETTLE_DELAY: Duration = Duration::from_secs(1);
    pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;
    /// Longest wait for a state push before polling the state again.
    pub const STATE_POLL_INTERVAL: Duration = Duration::from_secs(1);
    /// Buffer of each interactive input and of the state feed.
    pub const INPUT_QUEUE_SIZE: usize = 16;
}

/// Length-prefixed TCP transport configuration.
pub struct TransportConfig;

impl TransportConfig {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB
}

/// Engine diagnostics parsing.
pub struct DiagnosticsConfig;

impl DiagnosticsConfig {
    /// Only lines emitted at this verbosity carry penalty notices.
    pub const PENALTY_VERBOSITY: i32 = 2;
    pub const PENALTY_PATTERN: &'static str = r"FLOOD_WAIT_(\d+)";
    /// Penalties at or above this many seconds are logged as errors.
    pub const PENALTY_ALERT_SECS: u64 = 120;
    /// Longest penalty honored; anything larger is treated as garbage.
    pub const MAX_PENALTY_SECS: u64 = i16::MAX as u64;
    /// Discriminant of diagnostics frames interleaved with engine messages.
    pub const LOG_MESSAGE_TYPE: &'static str = "logMessage";
    /// Diagnostics lines buffered ahead of the admission limiter.
    pub const QUEUE_SIZE: usize = 64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_defaults_are_consistent() {
        assert!(AdmissionConfig::START_RATE > 0.0);
        assert!(AdmissionConfig::START_RATE <= AdmissionConfig::MAX_RATE);
        assert!(AdmissionConfig::WIND_UP_FACTOR > 1.0);
        assert!(AdmissionConfig::UPDATE_EVERY > 0);
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(ClientConfig::FALLBACK_TIMEOUT > Duration::from_secs(1));
        assert!(AuthConfig::READY_SETTLE_DELAY < ClientConfig::FALLBACK_TIMEOUT);
        assert!(TransportConfig::CONNECT_TIMEOUT > Duration::ZERO);
    }
}

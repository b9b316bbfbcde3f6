//! Admission control for outgoing requests.
//!
//! Every request passes through [`RateLimiter::wait`] before it reaches the
//! transport. The limiter delegates to a pluggable [`AdmissionStrategy`]; the
//! default [`WindUp`] strategy raises throughput in small steps and
//! drops hard when the engine reports a rate penalty on its diagnostics stream.

mod windup;

pub use windup::{WindUp, WindUpConfig};

use crate::config::DiagnosticsConfig;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

static PENALTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DiagnosticsConfig::PENALTY_PATTERN).expect("penalty pattern must compile")
});

/// A rate-gating strategy shared by all senders of one client.
#[async_trait]
pub trait AdmissionStrategy: Send + Sync {
    /// Current target rate in operations per second.
    fn current_rate(&self) -> f64;

    /// Block until one more request may be sent.
    async fn wait(&self);

    /// React to an engine-imposed penalty of `secs` seconds.
    async fn on_penalty(&self, secs: u64);
}

/// Strategy that admits everything immediately and ignores penalties.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unthrottled;

#[async_trait]
impl AdmissionStrategy for Unthrottled {
    fn current_rate(&self) -> f64 {
        f64::INFINITY
    }

    async fn wait(&self) {}

    async fn on_penalty(&self, secs: u64) {
        debug!("Ignoring {}s penalty: admission is unthrottled", secs);
    }
}

/// One line of engine diagnostics.
///
/// On the wire this is a `logMessage` object with `verbosity_level` and `text`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogMessage {
    #[serde(rename = "verbosity_level")]
    pub verbosity: i32,
    #[serde(rename = "text")]
    pub message: String,
}

impl LogMessage {
    pub fn new(verbosity: i32, message: impl Into<String>) -> Self {
        Self {
            verbosity,
            message: message.into(),
        }
    }
}

/// Extract a penalty duration from a diagnostics line.
///
/// Only lines at [`DiagnosticsConfig::PENALTY_VERBOSITY`] are considered; the
/// text must contain `FLOOD_WAIT_<secs>`. Durations above
/// [`DiagnosticsConfig::MAX_PENALTY_SECS`] are ignored.
pub fn parse_penalty(verbosity: i32, message: &str) -> Option<u64> {
    if verbosity != DiagnosticsConfig::PENALTY_VERBOSITY {
        return None;
    }
    let captures = PENALTY_RE.captures(message)?;
    let secs: u64 = captures.get(1)?.as_str().parse().ok()?;
    if secs > DiagnosticsConfig::MAX_PENALTY_SECS {
        warn!("Ignoring out of range FLOOD_WAIT of {} secs", secs);
        return None;
    }
    Some(secs)
}

/// Admission front-end: owns the strategy and listens to diagnostics.
#[derive(Clone)]
pub struct RateLimiter {
    strategy: Arc<dyn AdmissionStrategy>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("current_rate", &self.current_rate())
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(WindUp::default()))
    }
}

impl RateLimiter {
    pub fn new(strategy: Arc<dyn AdmissionStrategy>) -> Self {
        Self { strategy }
    }

    pub fn current_rate(&self) -> f64 {
        self.strategy.current_rate()
    }

    pub async fn wait(&self) {
        self.strategy.wait().await
    }

    /// Handle one diagnostics line, applying any penalty it reports.
    ///
    /// Returns the penalty in seconds when the line carried one. The call
    /// blocks for the penalty's cooldown unless one is already being served.
    pub async fn on_log_message(&self, verbosity: i32, message: &str) -> Option<u64> {
        let secs = parse_penalty(verbosity, message)?;
        if secs >= DiagnosticsConfig::PENALTY_ALERT_SECS {
            error!("FLOOD_WAIT is too big: {} secs", secs);
        } else {
            warn!("Engine reported FLOOD_WAIT of {} secs", secs);
        }
        self.strategy.on_penalty(secs).await;
        Some(secs)
    }

    /// Consume a diagnostics stream until it closes.
    ///
    /// Each penalty runs in its own task so that a second notice arriving
    /// during a cooldown reaches the strategy's single-flight guard instead of
    /// queueing behind the first.
    pub fn subscribe(&self, mut diagnostics: mpsc::Receiver<LogMessage>) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            while let Some(line) = diagnostics.recv().await {
                if parse_penalty(line.verbosity, &line.message).is_none() {
                    continue;
                }
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.on_log_message(line.verbosity, &line.message).await;
                });
            }
            debug!("Diagnostics stream closed");
        })
    }
}

//! Wind-up admission strategy.
//!
//! Starts at a conservative rate and multiplies it by a small factor every few
//! admitted requests, up to a ceiling. When the engine imposes a penalty, the
//! rate snaps to the throughput actually observed since the previous penalty,
//! stretched over the penalty window:
//!
//! ```text
//! rate = requests_since_penalty / (elapsed_since_first_request + penalty_secs)
//! ```
//!
//! All senders and the penalty handler share one async mutex. The mutex is held
//! while waiting for a token and for the whole penalty cooldown, so no request
//! is admitted while a penalty is being served.

use super::AdmissionStrategy;
use crate::config::AdmissionConfig;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tuning for the wind-up strategy.
#[derive(Debug, Clone)]
pub struct WindUpConfig {
    /// Rate used before any history exists, in operations per second.
    pub start_rate: f64,
    /// Admitted requests between two wind-up steps.
    pub update_every: u32,
    /// Multiplier applied at each wind-up step.
    pub wind_up_factor: f64,
    /// Ceiling for every rate this strategy programs.
    pub max_rate: f64,
}

impl Default for WindUpConfig {
    fn default() -> Self {
        Self {
            start_rate: AdmissionConfig::START_RATE,
            update_every: AdmissionConfig::UPDATE_EVERY,
            wind_up_factor: AdmissionConfig::WIND_UP_FACTOR,
            max_rate: AdmissionConfig::MAX_RATE,
        }
    }
}

impl WindUpConfig {
    pub fn with_start_rate(mut self, rate: f64) -> Self {
        self.start_rate = rate;
        self
    }

    pub fn with_update_every(mut self, requests: u32) -> Self {
        self.update_every = requests;
        self
    }

    pub fn with_wind_up_factor(mut self, factor: f64) -> Self {
        self.wind_up_factor = factor;
        self
    }

    pub fn with_max_rate(mut self, rate: f64) -> Self {
        self.max_rate = rate;
        self
    }
}

struct RateState {
    limiter: DefaultDirectRateLimiter,
    reqs_since_update: u32,
    reqs_since_penalty: u32,
    first_req_since_penalty: Option<Instant>,
}

/// Adaptive admission strategy.
pub struct WindUp {
    config: WindUpConfig,
    state: Mutex<RateState>,
    /// `f64` bits of the programmed rate, readable without the lock.
    current_rate: AtomicU64,
    /// Set for the duration of a penalty cooldown.
    serving_penalty: AtomicBool,
}

impl Default for WindUp {
    fn default() -> Self {
        Self::new(WindUpConfig::default())
    }
}

impl std::fmt::Debug for WindUp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindUp")
            .field("config", &self.config)
            .field("current_rate", &self.current_rate())
            .field("serving_penalty", &self.is_serving_penalty())
            .finish()
    }
}

impl WindUp {
    pub fn new(config: WindUpConfig) -> Self {
        let rate = sanitize_rate(config.start_rate, &config);
        Self {
            state: Mutex::new(RateState {
                limiter: limiter_for(rate),
                reqs_since_update: 0,
                reqs_since_penalty: 0,
                first_req_since_penalty: None,
            }),
            current_rate: AtomicU64::new(rate.to_bits()),
            serving_penalty: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &WindUpConfig {
        &self.config
    }

    pub fn is_serving_penalty(&self) -> bool {
        self.serving_penalty.load(Ordering::SeqCst)
    }

    /// Reprogram the bucket, carrying its fill level over.
    ///
    /// A fresh limiter starts with its burst token available. When the old
    /// bucket was empty that token is taken right away, so a rate change never
    /// grants an admission the old bucket would not have.
    fn update_rate(&self, state: &mut RateState, new_rate: f64) {
        let rate = sanitize_rate(new_rate, &self.config);
        let limiter = limiter_for(rate);
        if state.limiter.check().is_err() {
            let _ = limiter.check();
        }
        state.reqs_since_update = 0;
        state.limiter = limiter;
        self.current_rate.store(rate.to_bits(), Ordering::SeqCst);
    }
}

#[async_trait]
impl AdmissionStrategy for WindUp {
    fn current_rate(&self) -> f64 {
        f64::from_bits(self.current_rate.load(Ordering::SeqCst))
    }

    async fn wait(&self) {
        let mut state = self.state.lock().await;

        if state.reqs_since_update >= self.config.update_every {
            let next = self.current_rate() * self.config.wind_up_factor;
            self.update_rate(&mut state, next);
            debug!("Admission rate wound up to {:.3}/s", self.current_rate());
        }
        if state.first_req_since_penalty.is_none() {
            state.first_req_since_penalty = Some(Instant::now());
        }

        state.limiter.until_ready().await;

        state.reqs_since_update += 1;
        state.reqs_since_penalty += 1;
    }

    async fn on_penalty(&self, secs: u64) {
        if self
            .serving_penalty
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Penalty of {}s ignored: a cooldown is already running", secs);
            return;
        }

        let mut state = self.state.lock().await;

        let new_rate = match state.first_req_since_penalty {
            Some(first) if state.reqs_since_penalty > 0 => {
                let elapsed = first.elapsed().as_secs_f64();
                state.reqs_since_penalty as f64 / (elapsed + secs as f64)
            }
            _ => self.config.start_rate,
        };
        self.update_rate(&mut state, new_rate);
        warn!(
            "Serving {}s penalty, admission rate set to {:.3}/s",
            secs,
            self.current_rate()
        );

        tokio::time::sleep(Duration::from_secs(secs)).await;

        state.reqs_since_penalty = 0;
        state.first_req_since_penalty = None;
        self.serving_penalty.store(false, Ordering::SeqCst);
        info!("Penalty served, resuming at {:.3}/s", self.current_rate());
    }
}

/// Cap at the ceiling; non-positive or non-finite rates fall back to the start rate.
fn sanitize_rate(rate: f64, config: &WindUpConfig) -> f64 {
    let rate = if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        config.start_rate
    };
    rate.min(config.max_rate)
}

/// Token bucket emitting one token every `1 / rate` seconds, burst of one.
fn limiter_for(rate: f64) -> DefaultDirectRateLimiter {
    let quota = Duration::try_from_secs_f64(1.0 / rate)
        .ok()
        .and_then(Quota::with_period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
    DefaultDirectRateLimiter::direct(quota)
}

//! Active liveness challenge: the subject has to blink.
//!
//! A printed photo or a still image on a phone screen never closes its
//! eyes. The challenge samples frames at a fixed cadence and asks the
//! backend about each one, until a blink is confirmed or the attempt
//! budget runs out.
//!
//! Backends answer a tick in one of two shapes:
//!
//! - **`Detected(bool)`**: the backend already decided whether the eyes
//!   are closed in this frame. A `true` counts as one blink.
//! - **`Openness(metric)`**: the backend returns an eye-openness metric
//!   in `[0, 1]` and the blink is decided client side by the
//!   [`HysteresisRule`]: the metric must *drop* sharply from the previous
//!   sample *and* land below an absolute ceiling. A single low reading
//!   (squinting, noisy landmarks) never counts on its own.
//!
//! # Cancellation
//!
//! The loop checks an external "still active" predicate before every tick
//! and again when each response arrives. Once the session has been
//! superseded the loop stops without firing another request and without
//! applying the late response.

use std::time::Duration;

use crate::backend::{ActionSample, RecognitionBackend, RecognitionClient};
use crate::capture::{CameraDevice, SharedCapture};
use crate::error::VerifyError;
use crate::session::SessionToken;
use crate::sink::PresentationSink;

/// Default minimum drop in openness between consecutive samples.
pub const DEFAULT_MIN_DROP: f32 = 0.1;
/// Default ceiling the current openness must fall below.
pub const DEFAULT_CLOSED_BELOW: f32 = 0.19;
/// Default attempt budget. One page variant used 100.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;
/// Default pause between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Two-sample blink rule over the openness metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HysteresisRule {
    pub min_drop: f32,
    pub closed_below: f32,
}

impl Default for HysteresisRule {
    fn default() -> Self {
        Self {
            min_drop: DEFAULT_MIN_DROP,
            closed_below: DEFAULT_CLOSED_BELOW,
        }
    }
}

impl HysteresisRule {
    pub fn is_blink(&self, previous: f32, current: f32) -> bool {
        previous - current > self.min_drop && current < self.closed_below
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessConfig {
    pub max_attempts: u32,
    pub tick_interval: Duration,
    pub rule: HysteresisRule,
    /// Confirmed blink events needed to pass.
    pub required_blinks: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            tick_interval: DEFAULT_TICK_INTERVAL,
            rule: HysteresisRule::default(),
            required_blinks: 1,
        }
    }
}

/// Folds liveness samples into blink events.
#[derive(Debug, Clone)]
pub struct BlinkDetector {
    rule: HysteresisRule,
    required: u32,
    confirmed: u32,
    previous: Option<f32>,
}

impl BlinkDetector {
    pub fn new(rule: HysteresisRule, required: u32) -> Self {
        Self {
            rule,
            required: required.max(1),
            confirmed: 0,
            previous: None,
        }
    }

    /// Feed one sample. Returns `true` once enough blinks have been seen.
    pub fn observe(&mut self, sample: ActionSample) -> bool {
        let blink = match sample {
            ActionSample::Detected(detected) => detected,
            ActionSample::Openness(current) => {
                let blink = self
                    .previous
                    .is_some_and(|previous| self.rule.is_blink(previous, current));
                self.previous = Some(current);
                blink
            }
        };
        if blink {
            self.confirmed += 1;
        }
        self.confirmed >= self.required
    }

    pub fn confirmed(&self) -> u32 {
        self.confirmed
    }

    /// Openness metric of the last metric-shaped sample.
    pub fn previous(&self) -> Option<f32> {
        self.previous
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Idle,
    Sampling,
    BlinkConfirmed,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LivenessOutcome {
    Confirmed {
        attempts: u32,
        last_openness: Option<f32>,
    },
    /// The session moved on; nothing is reported to the user.
    Cancelled { attempts: u32 },
}

pub struct LivenessChallenge {
    config: LivenessConfig,
    state: LivenessState,
    attempts: u32,
}

impl LivenessChallenge {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            state: LivenessState::Idle,
            attempts: 0,
        }
    }

    pub fn state(&self) -> LivenessState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sample frames until a blink is confirmed, the budget is exhausted,
    /// a tick fails, or `is_active` reports the session is gone.
    ///
    /// The timeout is reported exactly once, on tick `max_attempts`. A
    /// network or server error on any tick ends the loop immediately.
    /// `on_attempt` receives the running attempt count as each tick is sent.
    pub async fn run<D, B, S, F, A>(
        &mut self,
        capture: &SharedCapture<D>,
        client: &RecognitionClient<B>,
        sink: &S,
        token: SessionToken,
        is_active: F,
        on_attempt: A,
    ) -> Result<LivenessOutcome, VerifyError>
    where
        D: CameraDevice,
        B: RecognitionBackend + ?Sized,
        S: PresentationSink + ?Sized,
        F: Fn() -> bool + Send + Sync,
        A: Fn(u32) + Send + Sync,
    {
        let max_attempts = self.config.max_attempts;
        let mut detector = BlinkDetector::new(self.config.rule, self.config.required_blinks);
        self.attempts = 0;

        if max_attempts == 0 {
            self.state = LivenessState::Exhausted;
            return Err(VerifyError::LivenessTimeout { attempts: 0 });
        }

        if !is_active() {
            return Ok(self.cancel(token));
        }

        self.state = LivenessState::Sampling;
        sink.status("Please blink");
        tracing::info!(%token, max_attempts, "liveness challenge started");

        loop {
            let image = match capture.lock().await.snapshot() {
                Ok(image) => image,
                Err(e) => {
                    self.state = LivenessState::Idle;
                    return Err(e.into());
                }
            };

            self.attempts += 1;
            on_attempt(self.attempts);
            let response = client.detect_action(token, &image).await;

            if !is_active() {
                tracing::debug!(%token, attempt = self.attempts, "discarding late liveness sample");
                return Ok(self.cancel(token));
            }

            let sample = match response.value {
                Ok(sample) => sample,
                Err(e) => {
                    tracing::warn!(%token, attempt = self.attempts, error = %e, "liveness tick failed");
                    self.state = LivenessState::Idle;
                    return Err(e.into());
                }
            };

            let before = detector.confirmed();
            let passed = detector.observe(sample);
            tracing::debug!(
                %token,
                attempt = self.attempts,
                sample = ?sample,
                blinks = detector.confirmed(),
                "liveness tick"
            );

            if passed {
                self.state = LivenessState::BlinkConfirmed;
                tracing::info!(%token, attempts = self.attempts, "blink confirmed");
                return Ok(LivenessOutcome::Confirmed {
                    attempts: self.attempts,
                    last_openness: detector.previous(),
                });
            }

            if detector.confirmed() > before {
                sink.status(&format!(
                    "Blink detected {} of {}",
                    detector.confirmed(),
                    self.config.required_blinks
                ));
            }

            if self.attempts >= max_attempts {
                self.state = LivenessState::Exhausted;
                tracing::warn!(%token, attempts = self.attempts, "liveness budget exhausted");
                return Err(VerifyError::LivenessTimeout {
                    attempts: self.attempts,
                });
            }

            tokio::time::sleep(self.config.tick_interval).await;
            if !is_active() {
                return Ok(self.cancel(token));
            }
        }
    }

    fn cancel(&mut self, token: SessionToken) -> LivenessOutcome {
        tracing::debug!(%token, attempts = self.attempts, "liveness challenge cancelled");
        self.state = LivenessState::Idle;
        LivenessOutcome::Cancelled {
            attempts: self.attempts,
        }
    }
}

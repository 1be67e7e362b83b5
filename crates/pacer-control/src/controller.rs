//! Load controller: turns completion latencies into resize requests.
//!
//! The controller is a plain state machine owned by a single writer
//! (the supervisor's event loop). It consumes one latency per finished
//! unit, and returns a `ScaleDecision` that the pool owner applies and
//! confirms through `set_thread_count` / `update_system_state`.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use pacer_core::{ControlConfig, Envelope, ScaleDirection};

use crate::average::RunningAverage;
use crate::envelope::EnvelopeStore;
use crate::error::{ControlError, ControlResult};
use crate::event::{EventCallback, PacerEvent};
use crate::hysteresis::{GuardOutcome, HysteresisGuard};

/// Outcome of evaluating one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Add one worker.
    ScaleUp,
    /// Remove one worker; `overload_ms` is the latency that exceeded the envelope.
    ScaleDown { overload_ms: u64 },
    /// No change needed.
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    /// Discarding warm-up samples after a resize.
    Collecting,
    /// Accumulating the running average.
    Averaging,
}

/// A latency that triggered a scale-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverloadSample {
    pub size: usize,
    pub latency_ms: u64,
}

pub struct LoadController {
    config: ControlConfig,
    running: bool,
    /// When false, statistics are still learned but no resize is requested.
    auto_control: bool,
    pool_size: usize,
    average: RunningAverage,
    envelopes: EnvelopeStore,
    guard: HysteresisGuard,
    overloads: VecDeque<OverloadSample>,
    on_event: Option<EventCallback>,
}

impl LoadController {
    pub fn new(config: ControlConfig) -> Self {
        let envelopes = EnvelopeStore::new(config.data_depth, config.window());
        Self {
            running: false,
            auto_control: true,
            pool_size: 0,
            average: RunningAverage::collecting(0),
            envelopes,
            guard: HysteresisGuard::new(),
            overloads: VecDeque::new(),
            on_event: None,
            config,
        }
    }

    /// Set the observer for scale requests and envelope changes.
    pub fn with_callback(mut self, callback: EventCallback) -> Self {
        self.set_callback(callback);
        self
    }

    pub fn set_callback(&mut self, callback: EventCallback) {
        self.on_event = Some(callback);
    }

    /// Begin a session at `size` workers. Forgets everything learned before.
    pub fn start(&mut self, size: usize) -> ControlResult<()> {
        self.check_size(size)?;
        self.running = true;
        self.pool_size = size;
        self.average.reset(size);
        self.envelopes.reset();
        self.guard.reset();
        self.overloads.clear();
        info!(size, max = self.config.max_workers, "load control started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            info!("load control stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_auto_control(&mut self, enabled: bool) {
        if self.auto_control != enabled {
            self.auto_control = enabled;
            info!(enabled, "automatic load control toggled");
        }
    }

    pub fn auto_control(&self) -> bool {
        self.auto_control
    }

    pub fn finished_task(&mut self, latency_ms: u64) -> ScaleDecision {
        self.finished_task_at(latency_ms, Instant::now())
    }

    /// Process the completion of one unit observed at `now`.
    pub fn finished_task_at(&mut self, latency_ms: u64, now: Instant) -> ScaleDecision {
        if !self.running {
            return ScaleDecision::NoChange;
        }
        if latency_ms == 0 {
            warn!("ignored completion with zero latency");
            return ScaleDecision::NoChange;
        }

        let decision = self.evaluate(latency_ms, now);
        match decision {
            ScaleDecision::ScaleUp => {
                debug!(size = self.pool_size, latency_ms, "requesting scale up");
                self.average.reset(self.pool_size + 1);
                self.emit(PacerEvent::ScaleUpRequested {
                    size: self.pool_size,
                });
            }
            ScaleDecision::ScaleDown { overload_ms } => {
                debug!(size = self.pool_size, overload_ms, "requesting scale down");
                self.record_overload(OverloadSample {
                    size: self.pool_size + 1,
                    latency_ms: overload_ms,
                });
                self.average.reset(self.pool_size - 1);
                self.emit(PacerEvent::ScaleDownRequested {
                    size: self.pool_size,
                    overload_ms,
                });
            }
            ScaleDecision::NoChange => self.accumulate(latency_ms),
        }
        decision
    }

    /// Confirm the pool size after the owner applied a resize.
    pub fn set_thread_count(&mut self, size: usize) -> ControlResult<()> {
        self.check_size(size)?;
        if size != self.pool_size {
            debug!(from = self.pool_size, to = size, "pool size confirmed");
            self.pool_size = size;
            self.average.reset(size);
        }
        Ok(())
    }

    pub fn update_system_state(&mut self, direction: ScaleDirection) -> GuardOutcome {
        self.update_system_state_at(direction, Instant::now())
    }

    /// Record an applied resize in the oscillation history.
    pub fn update_system_state_at(&mut self, direction: ScaleDirection, now: Instant) -> GuardOutcome {
        let outcome = self.guard.record_at(direction, now);
        if let GuardOutcome::Locked {
            escalation,
            cooldown,
        } = outcome
        {
            self.emit(PacerEvent::HysteresisLocked {
                escalation,
                cooldown_ms: cooldown.as_millis() as u64,
            });
        }
        outcome
    }

    /// Externally edit an envelope. Zero leaves the matching bound alone.
    ///
    /// Each bound is applied on its own: a rejected lower bound does not
    /// block a valid upper bound. The first rejection is returned.
    pub fn adjust_envelope(&mut self, size: usize, lower: f64, upper: f64) -> ControlResult<()> {
        let lower_result = if lower != 0.0 {
            self.set_lower(size, lower)
        } else {
            Ok(())
        };
        let upper_result = if upper != 0.0 {
            self.set_upper(size, upper)
        } else {
            Ok(())
        };
        lower_result.and(upper_result)
    }

    pub fn envelope(&self, size: usize) -> Envelope {
        self.envelopes.get(size)
    }

    pub fn envelopes(&self) -> &EnvelopeStore {
        &self.envelopes
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn phase(&self) -> Phase {
        if !self.running {
            Phase::Stopped
        } else if self.average.is_collecting() {
            Phase::Collecting
        } else {
            Phase::Averaging
        }
    }

    pub fn average(&self) -> &RunningAverage {
        &self.average
    }

    pub fn guard(&self) -> &HysteresisGuard {
        &self.guard
    }

    pub fn is_up_locked(&self) -> bool {
        self.guard.is_locked()
    }

    /// Most recent overload samples, oldest first.
    pub fn overload_samples(&self) -> impl Iterator<Item = &OverloadSample> {
        self.overloads.iter()
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    fn evaluate(&mut self, latency_ms: u64, now: Instant) -> ScaleDecision {
        let envelope = self.envelopes.get(self.pool_size);
        if !envelope.has_lower() {
            return ScaleDecision::NoChange;
        }

        if latency_ms as f64 > envelope.upper {
            if self.pool_size > 1 && self.auto_control {
                return ScaleDecision::ScaleDown {
                    overload_ms: latency_ms,
                };
            }
            return ScaleDecision::NoChange;
        }

        if self.is_underloaded() && self.pool_size < self.config.max_workers && self.auto_control {
            if self.guard.check_at(now) {
                debug!(size = self.pool_size, "scale up suppressed by hysteresis lock");
                return ScaleDecision::NoChange;
            }
            return ScaleDecision::ScaleUp;
        }

        ScaleDecision::NoChange
    }

    fn is_underloaded(&self) -> bool {
        let size = self.pool_size;
        let neighbours_known = self.envelopes.get(size - 1).has_lower()
            && self.envelopes.get(size + 1).has_lower();
        neighbours_known || self.average.count() >= i64::from(self.config.wait_count)
    }

    fn accumulate(&mut self, latency_ms: u64) {
        if let Some(average) = self.average.record(latency_ms as f64, self.config.window()) {
            let size = self.pool_size;
            if let Err(e) = self.set_lower(size, average) {
                debug!(size, error = %e, "average not committed");
            }
        }
    }

    fn set_lower(&mut self, size: usize, ms: f64) -> ControlResult<()> {
        let changed = self.envelopes.set_lower(size, ms).inspect_err(|e| {
            warn!(size, lower = ms, error = %e, "rejected envelope lower bound");
        })?;
        if let Some(envelope) = changed {
            self.emit(PacerEvent::EnvelopeChanged { size, envelope });
        }
        Ok(())
    }

    fn set_upper(&mut self, size: usize, ms: f64) -> ControlResult<()> {
        let changed = self.envelopes.set_upper(size, ms).inspect_err(|e| {
            warn!(size, upper = ms, error = %e, "rejected envelope upper bound");
        })?;
        if let Some(envelope) = changed {
            self.emit(PacerEvent::EnvelopeChanged { size, envelope });
        }
        Ok(())
    }

    fn record_overload(&mut self, sample: OverloadSample) {
        if self.config.overload_history == 0 {
            return;
        }
        if self.overloads.len() == self.config.overload_history {
            self.overloads.pop_front();
        }
        self.overloads.push_back(sample);
    }

    fn check_size(&self, size: usize) -> ControlResult<()> {
        if size == 0 || size > self.config.max_workers {
            warn!(size, max = self.config.max_workers, "rejected pool size");
            return Err(ControlError::PoolSizeOutOfRange {
                size,
                max: self.config.max_workers,
            });
        }
        Ok(())
    }

    fn emit(&self, event: PacerEvent) {
        if let Some(ref callback) = self.on_event {
            callback(event);
        }
    }
}

//! pacer-control — latency-driven worker-count decisions.
//!
//! Consumes the completion latency of every finished unit, learns a
//! latency envelope per pool size, and requests one-step resizes of the
//! worker pool. The controller never resizes anything itself: the pool
//! owner applies the request and confirms it with `set_thread_count`
//! and `update_system_state`.
//!
//! # Decision Algorithm
//!
//! ```text
//! envelope = envelopes[pool_size]
//!
//! if envelope.lower unset:             wait (learn)
//! elif latency > envelope.upper:       ScaleDown   (never suppressed)
//! elif underloaded and size < max:     ScaleUp     (unless hysteresis lock)
//! else:                                wait (learn)
//!
//! underloaded = lower(size-1) and lower(size+1) known
//!               or samples at this size >= wait_count
//! ```
//!
//! While waiting, latencies feed a running average that is committed to
//! `envelopes[pool_size].lower` every `wait_count × scale` samples.
//!
//! Alternating up/down confirmations (`1010`, `10011001`, `11001100`)
//! engage an escalating scale-up lock of 1..=10 seconds.

pub mod average;
pub mod controller;
pub mod envelope;
pub mod error;
pub mod event;
pub mod hysteresis;

pub use average::RunningAverage;
pub use controller::{LoadController, OverloadSample, Phase, ScaleDecision};
pub use envelope::EnvelopeStore;
pub use error::{ControlError, ControlResult};
pub use event::{EventCallback, PacerEvent};
pub use hysteresis::{GuardOutcome, HysteresisGuard};

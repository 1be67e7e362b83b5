//! Events published to observers of a running session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use pacer_core::{Envelope, ScaleDirection};
use pacer_perf::WorkerSnapshot;

/// Callback invoked synchronously for every published event.
///
/// Observers (renderers, loggers, tests) must return quickly; they run
/// on the controller's writer.
pub type EventCallback = Arc<dyn Fn(PacerEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PacerEvent {
    /// The controller asks the pool owner for one more worker.
    ScaleUpRequested { size: usize },
    /// The controller asks for one fewer worker after an overloaded unit.
    ScaleDownRequested { size: usize, overload_ms: u64 },
    EnvelopeChanged { size: usize, envelope: Envelope },
    /// Alternating resizes engaged the scale-up lock.
    HysteresisLocked { escalation: u32, cooldown_ms: u64 },
    /// The pool owner applied a resize.
    PoolResized {
        from: usize,
        to: usize,
        direction: ScaleDirection,
    },
    WorkerPerformanceUpdated { worker: WorkerSnapshot },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let event = PacerEvent::EnvelopeChanged {
            size: 4,
            envelope: Envelope::new(120.0, 240.0),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "envelope_changed");
        assert_eq!(json["size"], 4);
        assert_eq!(json["envelope"]["upper"], 240.0);

        let back: PacerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}

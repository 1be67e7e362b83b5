//! Learned (lower, upper) latency bounds per pool size.

use tracing::debug;

use pacer_core::Envelope;

use crate::error::{ControlError, ControlResult};

/// Bounded table of envelopes for pool sizes `1..=depth`.
///
/// Setters return the updated envelope when it changed, so the caller can
/// publish an `EnvelopeChanged` event.
#[derive(Debug, Clone)]
pub struct EnvelopeStore {
    entries: Vec<Envelope>,
    /// `wait_count × scale`: smoothing weight and tolerance denominator.
    window: u32,
}

impl EnvelopeStore {
    pub fn new(depth: usize, window: u32) -> Self {
        Self {
            entries: vec![Envelope::UNSET; depth],
            window,
        }
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Envelope for `size`; unset for sizes without a slot.
    pub fn get(&self, size: usize) -> Envelope {
        size.checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .copied()
            .unwrap_or(Envelope::UNSET)
    }

    /// Offer a stable latency measurement for `size`.
    ///
    /// An unset or larger lower bound is replaced outright (seeding the
    /// upper bound at twice the value). A measurement more than
    /// `1 / window` above the current bound pulls it up by one weighted
    /// step. Anything inside that band is ignored.
    pub fn set_lower(&mut self, size: usize, ms: f64) -> ControlResult<Option<Envelope>> {
        check_latency(ms)?;
        let index = self.index(size)?;
        let current = self.entries[index];

        if !current.has_lower() || ms < current.lower {
            // A report for the next size may land before this size has its
            // own bound; never start out slower than the larger pool.
            let next = self.get(size + 1);
            let lower = if !current.has_lower() && next.has_lower() && next.lower < ms {
                next.lower
            } else {
                ms
            };

            let entry = &mut self.entries[index];
            entry.lower = lower;
            if !entry.has_upper() {
                entry.upper = lower * 2.0;
            }
            debug!(size, lower, upper = entry.upper, "envelope lower bound set");
            Ok(Some(*entry))
        } else if ms / current.lower - 1.0 > 1.0 / f64::from(self.window) {
            let weight = f64::from(self.window);
            let entry = &mut self.entries[index];
            entry.lower = (weight * current.lower + ms) / (weight + 1.0);
            debug!(size, lower = entry.lower, sample = ms, "envelope lower bound pulled up");
            Ok(Some(*entry))
        } else {
            debug!(size, lower = current.lower, sample = ms, "envelope lower bound within tolerance");
            Ok(None)
        }
    }

    /// Raise the overload threshold for `size`. Ignored unless above the lower bound.
    pub fn set_upper(&mut self, size: usize, ms: f64) -> ControlResult<Option<Envelope>> {
        check_latency(ms)?;
        let index = self.index(size)?;
        let entry = &mut self.entries[index];
        if ms <= entry.lower {
            return Ok(None);
        }
        entry.upper = ms;
        debug!(size, upper = ms, "envelope upper bound set");
        Ok(Some(*entry))
    }

    /// Forget every learned envelope.
    pub fn reset(&mut self) {
        self.entries.fill(Envelope::UNSET);
    }

    /// All `(size, envelope)` pairs, unset ones included.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Envelope)> + '_ {
        self.entries.iter().enumerate().map(|(i, e)| (i + 1, *e))
    }

    fn index(&self, size: usize) -> ControlResult<usize> {
        if size == 0 || size > self.entries.len() {
            return Err(ControlError::NoEnvelopeSlot {
                size,
                depth: self.entries.len(),
            });
        }
        Ok(size - 1)
    }
}

fn check_latency(ms: f64) -> ControlResult<()> {
    if ms.is_finite() && ms > 0.0 {
        Ok(())
    } else {
        Err(ControlError::InvalidLatency(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EnvelopeStore {
        EnvelopeStore::new(20, 18)
    }

    #[test]
    fn unset_by_default() {
        let store = store();
        assert_eq!(store.get(4), Envelope::UNSET);
        assert_eq!(store.get(0), Envelope::UNSET);
        assert_eq!(store.get(21), Envelope::UNSET);
    }

    #[test]
    fn first_lower_seeds_upper() {
        let mut store = store();
        let changed = store.set_lower(4, 120.0).unwrap();
        assert_eq!(changed, Some(Envelope::new(120.0, 240.0)));
        assert_eq!(store.get(4), Envelope::new(120.0, 240.0));
    }

    #[test]
    fn smaller_sample_replaces_lower_keeps_upper() {
        let mut store = store();
        store.set_lower(4, 120.0).unwrap();
        let changed = store.set_lower(4, 90.0).unwrap();
        assert_eq!(changed, Some(Envelope::new(90.0, 240.0)));
    }

    #[test]
    fn larger_sample_pulls_lower_up() {
        let mut store = store();
        store.set_lower(4, 100.0).unwrap();
        let changed = store.set_lower(4, 130.0).unwrap().unwrap();
        let expected = (18.0 * 100.0 + 130.0) / 19.0;
        assert!((changed.lower - expected).abs() < 1e-9);
        assert!((changed.lower - 101.58).abs() < 0.01);
        assert_eq!(changed.upper, 200.0);
    }

    #[test]
    fn sample_within_tolerance_is_ignored() {
        let mut store = store();
        store.set_lower(4, 100.0).unwrap();
        // 105 / 100 - 1 = 0.05 < 1/18
        assert_eq!(store.set_lower(4, 105.0).unwrap(), None);
        assert_eq!(store.get(4).lower, 100.0);
    }

    #[test]
    fn early_report_borrows_larger_pool_bound() {
        let mut store = store();
        store.set_lower(5, 80.0).unwrap();
        let changed = store.set_lower(4, 150.0).unwrap().unwrap();
        assert_eq!(changed.lower, 80.0);
        assert_eq!(changed.upper, 160.0);
    }

    #[test]
    fn faster_report_ignores_larger_pool_bound() {
        let mut store = store();
        store.set_lower(5, 80.0).unwrap();
        let changed = store.set_lower(4, 60.0).unwrap().unwrap();
        assert_eq!(changed.lower, 60.0);
    }

    #[test]
    fn upper_only_above_lower() {
        let mut store = store();
        store.set_lower(3, 100.0).unwrap();
        assert_eq!(store.set_upper(3, 90.0).unwrap(), None);
        assert_eq!(store.set_upper(3, 100.0).unwrap(), None);
        assert_eq!(
            store.set_upper(3, 350.0).unwrap(),
            Some(Envelope::new(100.0, 350.0))
        );
    }

    #[test]
    fn rejects_out_of_range_sizes_and_bad_latency() {
        let mut store = store();
        assert!(matches!(
            store.set_lower(0, 10.0),
            Err(ControlError::NoEnvelopeSlot { .. })
        ));
        assert!(matches!(
            store.set_upper(21, 10.0),
            Err(ControlError::NoEnvelopeSlot { .. })
        ));
        assert_eq!(store.set_lower(2, 0.0), Err(ControlError::InvalidLatency(0.0)));
        assert!(store.set_lower(2, f64::NAN).is_err());
        assert_eq!(store.get(2), Envelope::UNSET);
    }

    #[test]
    fn reset_clears_every_entry() {
        let mut store = store();
        store.set_lower(1, 10.0).unwrap();
        store.set_lower(20, 10.0).unwrap();
        store.reset();
        assert!(store.iter().all(|(_, e)| e == Envelope::UNSET));
        assert_eq!(store.iter().count(), 20);
    }
}

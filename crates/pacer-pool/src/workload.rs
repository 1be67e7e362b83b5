//! The opaque unit of work executed by pool workers.

/// A homogeneous, CPU-bound unit of work.
///
/// `ticket` is a pool-wide sequence number a workload may use to vary
/// its input. The pool measures the elapsed time itself.
pub trait Workload: Send + Sync + 'static {
    fn execute(&self, ticket: u64);
}

impl<F> Workload for F
where
    F: Fn(u64) + Send + Sync + 'static,
{
    fn execute(&self, ticket: u64) {
        self(ticket)
    }
}

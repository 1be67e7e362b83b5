//! Self-replenishing execution of an opaque workload.
//!
//! Workers are long-lived loops on tokio's blocking thread pool. After
//! each unit a worker reports its latency and re-checks admission; the
//! pool therefore never runs dry while running, and shrinking or
//! stopping only takes effect between units.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pacer_core::{WorkerId, WorkerIdentity, WorkerPriority};

use crate::admission::Admission;
use crate::error::{PoolError, PoolResult};
use crate::workload::Workload;

/// Reports sent from workers to the pool owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// A unit finished after `elapsed_ms` (rounded up to whole milliseconds).
    Completed {
        worker: WorkerIdentity,
        elapsed_ms: u64,
    },
    /// A worker retired and will report nothing further.
    Exited { worker: WorkerId },
}

struct Shared {
    admission: Mutex<Admission>,
    workload: Arc<dyn Workload>,
    events: mpsc::UnboundedSender<PoolEvent>,
    next_worker: AtomicU64,
    next_ticket: AtomicU64,
    /// Ticket of the first unit of the current session.
    session_start: AtomicU64,
}

impl Shared {
    fn admission(&self) -> MutexGuard<'_, Admission> {
        // Admission is plain counters; a poisoned guard still holds consistent values.
        self.admission.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A resizable pool of identical workers.
pub struct WorkerPool {
    shared: Arc<Shared>,
    max_workers: usize,
    runtime: Handle,
}

impl WorkerPool {
    /// Create a stopped pool. Completions arrive on the returned receiver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        workload: Arc<dyn Workload>,
        max_workers: usize,
    ) -> PoolResult<(Self, mpsc::UnboundedReceiver<PoolEvent>)> {
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            admission: Mutex::new(Admission::new()),
            workload,
            events,
            next_worker: AtomicU64::new(0),
            next_ticket: AtomicU64::new(0),
            session_start: AtomicU64::new(0),
        });
        Ok((
            Self {
                shared,
                max_workers,
                runtime,
            },
            rx,
        ))
    }

    /// Launch `workers` self-replenishing workers.
    ///
    /// The worker that picks up the session's first unit runs at
    /// `WorkerPriority::Low` from then on.
    pub fn start(&self, workers: usize) -> PoolResult<()> {
        self.check_range(workers)?;
        let mut admission = self.shared.admission();
        self.shared
            .session_start
            .store(self.shared.next_ticket.load(Ordering::Relaxed), Ordering::Relaxed);
        let spawn = admission.start(workers);
        drop(admission);
        self.spawn_workers(spawn);
        info!(workers, spawned = spawn, "worker pool started");
        Ok(())
    }

    /// Change the admission ceiling without interrupting in-flight units.
    pub fn set_concurrency(&self, workers: usize) -> PoolResult<()> {
        self.check_range(workers)?;
        let spawn = self.shared.admission().resize(workers);
        self.spawn_workers(spawn);
        debug!(workers, spawned = spawn, "worker pool concurrency set");
        Ok(())
    }

    /// Stop admitting units. In-flight units complete but are not replaced.
    pub fn stop(&self) {
        self.shared.admission().stop();
        info!("worker pool stopping");
    }

    /// Current admission ceiling.
    pub fn concurrency(&self) -> usize {
        self.shared.admission().ceiling()
    }

    /// Workers currently alive, including those about to retire.
    pub fn admitted(&self) -> usize {
        self.shared.admission().admitted()
    }

    pub fn is_running(&self) -> bool {
        self.shared.admission().is_running()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    fn check_range(&self, workers: usize) -> PoolResult<()> {
        if workers == 0 || workers > self.max_workers {
            warn!(workers, max = self.max_workers, "rejected pool concurrency");
            return Err(PoolError::OutOfRange {
                requested: workers,
                max: self.max_workers,
            });
        }
        Ok(())
    }

    fn spawn_workers(&self, count: usize) {
        for _ in 0..count {
            let id = WorkerId(self.shared.next_worker.fetch_add(1, Ordering::Relaxed));
            let shared = self.shared.clone();
            self.runtime
                .spawn_blocking(move || run_worker(shared, WorkerIdentity::new(id)));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.admission().stop();
    }
}

fn run_worker(shared: Arc<Shared>, mut identity: WorkerIdentity) {
    debug!(worker = %identity.id, "worker started");
    loop {
        let ticket = shared.next_ticket.fetch_add(1, Ordering::Relaxed);
        if ticket == shared.session_start.load(Ordering::Relaxed) {
            identity.priority = WorkerPriority::Low;
            debug!(worker = %identity.id, ticket, "worker took the first unit, priority lowered");
        }
        let started = Instant::now();
        shared.workload.execute(ticket);
        let elapsed_ms = elapsed_ms(started.elapsed());

        let delivered = shared
            .events
            .send(PoolEvent::Completed {
                worker: identity.clone(),
                elapsed_ms,
            })
            .is_ok();

        let mut admission = shared.admission();
        if !delivered {
            // Nobody is listening any more.
            admission.release();
            return;
        }
        if admission.should_retire() {
            drop(admission);
            let _ = shared.events.send(PoolEvent::Exited {
                worker: identity.id,
            });
            debug!(worker = %identity.id, "worker retired");
            return;
        }
    }
}

/// Whole milliseconds, rounded up. Every executed unit costs at least 1 ms.
fn elapsed_ms(elapsed: Duration) -> u64 {
    let ms = elapsed.as_nanos().div_ceil(1_000_000).max(1);
    u64::try_from(ms).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use tokio::time::timeout;

    fn sleepy(ms: u64) -> Arc<dyn Workload> {
        Arc::new(move |_ticket: u64| std::thread::sleep(Duration::from_millis(ms)))
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<PoolEvent>) -> PoolEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for pool event")
            .expect("pool channel closed")
    }

    async fn wait_for_admitted(pool: &WorkerPool, rx: &mut mpsc::UnboundedReceiver<PoolEvent>, target: usize) {
        while pool.admitted() != target {
            next_event(rx).await;
        }
    }

    #[test]
    fn new_requires_runtime() {
        assert!(matches!(
            WorkerPool::new(sleepy(1), 4),
            Err(PoolError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn rejects_out_of_range_concurrency() {
        let (pool, _rx) = WorkerPool::new(sleepy(1), 4).unwrap();
        assert_eq!(
            pool.start(0),
            Err(PoolError::OutOfRange {
                requested: 0,
                max: 4
            })
        );
        assert!(pool.set_concurrency(5).is_err());
        assert!(!pool.is_running());
        assert_eq!(pool.admitted(), 0);
    }

    #[tokio::test]
    async fn workers_report_completions_and_replenish() {
        let (pool, mut rx) = WorkerPool::new(sleepy(2), 4).unwrap();
        pool.start(2).unwrap();

        let mut workers = HashSet::new();
        let mut completions = 0;
        while completions < 20 {
            if let PoolEvent::Completed { worker, elapsed_ms } = next_event(&mut rx).await {
                assert!(elapsed_ms >= 2);
                workers.insert(worker.id);
                completions += 1;
            }
        }
        assert_eq!(workers.len(), 2);
        assert_eq!(pool.admitted(), 2);
        pool.stop();
    }

    #[test]
    fn elapsed_rounds_up_to_whole_milliseconds() {
        assert_eq!(elapsed_ms(Duration::ZERO), 1);
        assert_eq!(elapsed_ms(Duration::from_nanos(300)), 1);
        assert_eq!(elapsed_ms(Duration::from_millis(2)), 2);
        assert_eq!(elapsed_ms(Duration::from_micros(2001)), 3);
    }

    #[tokio::test]
    async fn instant_units_still_report_a_latency() {
        let noop: Arc<dyn Workload> = Arc::new(|_ticket: u64| {});
        let (pool, mut rx) = WorkerPool::new(noop, 2).unwrap();
        pool.start(2).unwrap();

        let mut completions = 0;
        while completions < 200 {
            if let PoolEvent::Completed { elapsed_ms, .. } = next_event(&mut rx).await {
                assert!(elapsed_ms >= 1);
                completions += 1;
            }
        }
        pool.stop();
    }

    #[tokio::test]
    async fn first_unit_of_a_session_runs_at_low_priority() {
        let (pool, mut rx) = WorkerPool::new(sleepy(2), 3).unwrap();
        pool.start(3).unwrap();

        let mut low = HashSet::new();
        let mut completions = 0;
        while completions < 30 {
            if let PoolEvent::Completed { worker, .. } = next_event(&mut rx).await {
                if worker.priority == WorkerPriority::Low {
                    low.insert(worker.id);
                }
                completions += 1;
            }
        }
        assert_eq!(low.len(), 1);
        pool.stop();
    }

    #[tokio::test]
    async fn shrinking_retires_surplus_after_current_unit() {
        let (pool, mut rx) = WorkerPool::new(sleepy(2), 4).unwrap();
        pool.start(3).unwrap();
        pool.set_concurrency(1).unwrap();
        assert_eq!(pool.concurrency(), 1);

        let mut exited = 0;
        while exited < 2 {
            if let PoolEvent::Exited { .. } = next_event(&mut rx).await {
                exited += 1;
            }
        }
        assert_eq!(pool.admitted(), 1);

        pool.set_concurrency(3).unwrap();
        assert_eq!(pool.admitted(), 3);
        pool.stop();
    }

    #[tokio::test]
    async fn stop_lets_in_flight_units_finish() {
        let (pool, mut rx) = WorkerPool::new(sleepy(5), 4).unwrap();
        pool.start(2).unwrap();
        pool.stop();

        let mut completed = 0;
        let mut exited = 0;
        while exited < 2 {
            match next_event(&mut rx).await {
                PoolEvent::Completed { .. } => completed += 1,
                PoolEvent::Exited { .. } => exited += 1,
            }
        }
        assert_eq!(completed, 2);
        assert_eq!(pool.admitted(), 0);
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resizes_keep_admission_consistent() {
        let (pool, mut rx) = WorkerPool::new(sleepy(1), 8).unwrap();
        let pool = Arc::new(pool);
        pool.start(4).unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                for j in 0..20 {
                    pool.set_concurrency(1 + (i + j) % 8).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        pool.set_concurrency(3).unwrap();
        wait_for_admitted(&pool, &mut rx, 3).await;
        assert_eq!(pool.admitted(), 3);
        pool.stop();
        wait_for_admitted(&pool, &mut rx, 0).await;
    }
}

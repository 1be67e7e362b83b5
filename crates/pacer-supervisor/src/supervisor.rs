//! The supervisor owns the pool and is the controller's only writer.
//!
//! Completions, manual commands and shutdown all arrive on one task, so
//! the controller, the registry and the pool ceiling never race each
//! other. Observers are notified through an optional callback.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use pacer_control::{EventCallback, LoadController, OverloadSample, PacerEvent, ScaleDecision};
use pacer_core::{Envelope, PacerConfig, ScaleDirection};
use pacer_perf::{WorkerRegistry, WorkerSnapshot};
use pacer_pool::{PoolEvent, WorkerPool, Workload};

use crate::command::{Command, SupervisorHandle};
use crate::error::SupervisorResult;

/// A learned envelope together with the pool size it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvelopeRow {
    pub size: usize,
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// What a session learned, for reporting after shutdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub pool_size: usize,
    /// Sum of the recent performance of all live workers, tasks/s.
    pub overall_performance: f64,
    /// Whether the oscillation guard was suppressing scale-ups.
    pub scale_up_locked: bool,
    pub envelopes: Vec<EnvelopeRow>,
    pub overloads: Vec<OverloadSample>,
    pub workers: Vec<WorkerSnapshot>,
}

pub struct Supervisor {
    config: PacerConfig,
    pool: WorkerPool,
    pool_events: mpsc::UnboundedReceiver<PoolEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    handle: SupervisorHandle,
    controller: LoadController,
    registry: WorkerRegistry,
    on_event: Option<EventCallback>,
}

impl Supervisor {
    /// Validate `config` and build a stopped supervisor around `workload`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: PacerConfig, workload: Arc<dyn Workload>) -> SupervisorResult<Self> {
        config.validate()?;
        let (pool, pool_events) = WorkerPool::new(workload, config.control.max_workers)?;
        let (tx, commands) = mpsc::unbounded_channel();
        Ok(Self {
            pool,
            pool_events,
            commands,
            handle: SupervisorHandle::new(tx),
            controller: LoadController::new(config.control.clone()),
            registry: WorkerRegistry::new(&config.workers),
            on_event: None,
            config,
        })
    }

    /// Publish controller and pool events to `callback`.
    pub fn with_callback(mut self, callback: EventCallback) -> Self {
        self.controller.set_callback(callback.clone());
        self.on_event = Some(callback);
        self
    }

    /// A sender for manual commands, usable while `run` owns the supervisor.
    pub fn handle(&self) -> SupervisorHandle {
        self.handle.clone()
    }

    /// Start a session at the configured initial pool size.
    pub fn start(&mut self) -> SupervisorResult<()> {
        self.start_with(self.config.pool.initial_workers)
    }

    /// Start a session at `workers`. Statistics from earlier sessions are dropped.
    pub fn start_with(&mut self, workers: usize) -> SupervisorResult<()> {
        self.controller.start(workers)?;
        self.registry.clear();
        self.pool.start(workers)?;
        info!(workers, "session started");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.pool.stop();
        self.controller.stop();
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// Process events and commands until `shutdown` fires, then stop the session.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(pool_size = self.controller.pool_size(), "supervisor started");

        loop {
            tokio::select! {
                Some(event) = self.pool_events.recv() => self.handle_pool_event(event),
                Some(command) = self.commands.recv() => self.handle_command(command),
                _ = shutdown.changed() => {
                    info!("supervisor shutting down");
                    break;
                }
            }
        }

        self.stop();
    }

    /// Feed one worker report into the registry and the controller.
    pub fn handle_pool_event(&mut self, event: PoolEvent) {
        match event {
            PoolEvent::Completed { worker, elapsed_ms } => {
                match self.registry.record(&worker, elapsed_ms) {
                    Ok(snapshot) => self.emit(PacerEvent::WorkerPerformanceUpdated { worker: snapshot }),
                    Err(e) => debug!(worker = %worker.id, error = %e, "completion not recorded"),
                }
                match self.controller.finished_task(elapsed_ms) {
                    ScaleDecision::ScaleUp => {
                        self.resize(ScaleDirection::Up);
                    }
                    ScaleDecision::ScaleDown { .. } => {
                        self.resize(ScaleDirection::Down);
                    }
                    ScaleDecision::NoChange => {}
                }
            }
            PoolEvent::Exited { worker } => {
                if self.registry.retire(worker) {
                    debug!(worker = %worker, "worker retired from registry");
                }
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) {
        debug!(?command, "supervisor command");
        match command {
            Command::ScaleUp => {
                self.manual_resize(ScaleDirection::Up);
            }
            Command::ScaleDown => {
                self.manual_resize(ScaleDirection::Down);
            }
            Command::SetAutoControl(enabled) => self.controller.set_auto_control(enabled),
            Command::AdjustEnvelope { size, lower, upper } => {
                if let Err(e) = self.controller.adjust_envelope(size, lower, upper) {
                    warn!(size, error = %e, "envelope adjustment rejected");
                }
            }
        }
    }

    /// Move the pool one step in `direction` and confirm it to the controller.
    ///
    /// Returns the new size, or `None` when the step would leave
    /// `[1, max_workers]` or the pool refused it.
    pub fn resize(&mut self, direction: ScaleDirection) -> Option<usize> {
        let from = self.controller.pool_size();
        let Some(to) = direction.apply(from, self.config.control.max_workers) else {
            debug!(from, ?direction, "resize out of range, ignored");
            return None;
        };

        if let Err(e) = self.pool.set_concurrency(to) {
            warn!(from, to, error = %e, "pool refused resize");
            return None;
        }
        if let Err(e) = self.controller.set_thread_count(to) {
            warn!(from, to, error = %e, "controller refused pool size");
            return None;
        }
        self.controller.update_system_state(direction);

        info!(from, to, ?direction, "pool resized");
        self.emit(PacerEvent::PoolResized { from, to, direction });
        Some(to)
    }

    fn manual_resize(&mut self, direction: ScaleDirection) -> Option<usize> {
        if !self.controller.is_running() {
            debug!(?direction, "no session running, manual resize ignored");
            return None;
        }
        self.resize(direction)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            pool_size: self.controller.pool_size(),
            overall_performance: self.registry.overall_performance(),
            scale_up_locked: self.controller.is_up_locked(),
            envelopes: self
                .controller
                .envelopes()
                .iter()
                .filter(|(_, env)| env.has_lower() || env.has_upper())
                .map(|(size, envelope)| EnvelopeRow { size, envelope })
                .collect(),
            overloads: self.controller.overload_samples().copied().collect(),
            workers: self.registry.snapshots(),
        }
    }

    pub fn controller(&self) -> &LoadController {
        &self.controller
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn config(&self) -> &PacerConfig {
        &self.config
    }

    fn emit(&self, event: PacerEvent) {
        if let Some(cb) = &self.on_event {
            cb(event);
        }
    }
}

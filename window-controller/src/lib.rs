// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Debounced, bounded-concurrency hydration of the leading window of a ledger's id list.
//!
//! [`WindowController`] owns a [`WindowState`] for one module and a background driver
//! task. The driver watches the [`LedgerRegistry`] for changes, grows the window, and
//! fetches missing rows in ordered chunks through a [`RowFetcher`]. Failed ids are
//! retried on later cycles until they reach the orphan cap.

pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod plan;

use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use core_types::{
    config::WindowConfig,
    status::{OverallStatus, ServiceStatusHandle, StatusGauge},
};
use futures::{future::BoxFuture, stream::FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use record_ledger::{IdKey, LedgerRegistry, RecordId, RecordRow};
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;

pub use error::{ControllerError, Result};
pub use fetcher::{FetchError, HttpRowFetcher, RowFetcher};
pub use metrics::{HydrationMetrics, HydrationMetricsSnapshot};
pub use plan::{ChunkSettlement, CyclePlan, Phase, WindowSnapshot, WindowState};

struct ChunkOutcome<R> {
    epoch: u64,
    chunk: Vec<RecordId>,
    result: std::result::Result<Vec<R>, FetchError>,
    elapsed: Duration,
}

/// Lock order: registry read, then `state`. Never take the registry while holding `state`.
struct Shared<R> {
    module: String,
    registry: LedgerRegistry<R>,
    state: Mutex<WindowState>,
    fetcher: Arc<dyn RowFetcher<R>>,
    metrics: HydrationMetrics,
    status: ServiceStatusHandle,
    nudge: Notify,
}

struct DriverHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Window controller for a single module.
pub struct WindowController<R> {
    shared: Arc<Shared<R>>,
    driver: Mutex<Option<DriverHandle>>,
}

impl<R: RecordRow> WindowController<R> {
    pub fn new(
        module: impl Into<String>,
        config: WindowConfig,
        registry: LedgerRegistry<R>,
        fetcher: Arc<dyn RowFetcher<R>>,
    ) -> Self {
        let module = module.into();
        let status = ServiceStatusHandle::new(format!("window_controller:{module}"));
        status.set_overall(OverallStatus::Ok);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(WindowState::new(module.clone(), config)),
                module,
                registry,
                fetcher,
                metrics: HydrationMetrics::new(),
                status,
                nudge: Notify::new(),
            }),
            driver: Mutex::new(None),
        }
    }

    pub fn module(&self) -> &str {
        &self.shared.module
    }

    /// Spawns the driver on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;
        let mut driver = self.driver.lock();
        if driver.as_ref().is_some_and(|d| !d.join.is_finished()) {
            return Err(ControllerError::AlreadyRunning(self.shared.module.clone()));
        }
        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        let join = runtime.spawn(async move { shared.drive(token).await });
        info!("[window_controller] started for '{}'", self.shared.module);
        *driver = Some(DriverHandle { cancel, join });
        Ok(())
    }

    /// Signals the driver to stop. Outstanding fetches finish in the background and their
    /// results are discarded.
    pub fn stop(&self) -> Result<()> {
        let driver = self.driver.lock();
        match driver.as_ref() {
            Some(handle) => {
                handle.cancel.cancel();
                Ok(())
            }
            None => Err(ControllerError::NotRunning(self.shared.module.clone())),
        }
    }

    /// Stops the driver and waits for it to exit.
    pub async fn shutdown(&self) -> Result<()> {
        let handle = self
            .driver
            .lock()
            .take()
            .ok_or_else(|| ControllerError::NotRunning(self.shared.module.clone()))?;
        handle.cancel.cancel();
        if let Err(err) = handle.join.await {
            warn!("[window_controller] driver for '{}' ended abnormally: {}", self.shared.module, err);
        }
        Ok(())
    }

    /// Applies the growth and jump rules against the current ledger and selection.
    pub fn refresh(&self) -> bool {
        let (grew, _) = self.shared.evaluate();
        if grew {
            self.shared.nudge.notify_one();
        }
        grew
    }

    /// Widens the window so `index` is active.
    pub fn ensure_covers(&self, index: usize) -> bool {
        let total = self
            .shared
            .registry
            .with_ledger(&self.shared.module, |ledger| ledger.id_list().map(<[RecordId]>::len))
            .flatten();
        let Some(total) = total else {
            return false;
        };
        let grew = self.shared.state.lock().ensure_covers(index, total);
        if grew {
            self.shared.metrics.record_window_growth();
            self.shared.nudge.notify_one();
        }
        grew
    }

    pub fn window_size(&self) -> usize {
        self.shared.state.lock().window_size()
    }

    pub fn is_fetching(&self) -> bool {
        self.shared.state.lock().phase() != Phase::Idle
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        let state = self.shared.state.lock();
        state.snapshot(state.phase() != Phase::Idle)
    }

    pub fn orphan_count(&self, id: &RecordId) -> u32 {
        self.shared.state.lock().orphan_count(id)
    }

    pub fn metrics(&self) -> HydrationMetrics {
        self.shared.metrics.clone()
    }

    pub fn status_handle(&self) -> ServiceStatusHandle {
        self.shared.status.clone()
    }
}

impl<R> Drop for WindowController<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}

impl<R: RecordRow> Shared<R> {
    async fn drive(self: Arc<Self>, cancel: CancellationToken) {
        let mut changes = self.registry.subscribe();
        let mut active: FuturesUnordered<BoxFuture<'static, ChunkOutcome<R>>> = FuturesUnordered::new();
        let mut pending: VecDeque<(u64, Vec<RecordId>)> = VecDeque::new();
        let mut deadline: Option<Instant> = None;
        let debounce = self.state.lock().config().debounce();

        if self.evaluate().1 {
            deadline = Some(Instant::now() + debounce);
        }
        self.publish(&active, &pending, deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(outcome) = active.next(), if !active.is_empty() => {
                    self.finish_chunk(outcome);
                    self.pump(&mut active, &mut pending);
                    let missing = self.evaluate().1;
                    if missing && deadline.is_none() {
                        deadline = Some(Instant::now() + debounce);
                    }
                    if active.is_empty() && pending.is_empty() {
                        self.metrics.record_cycle_completed();
                    }
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    deadline = self.evaluate().1.then(|| Instant::now() + debounce);
                    self.drop_stale(&mut pending);
                }
                _ = self.nudge.notified() => {
                    deadline = self.evaluate().1.then(|| Instant::now() + debounce);
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.start_cycle(&mut pending);
                    self.pump(&mut active, &mut pending);
                }
            }
            self.publish(&active, &pending, deadline);
        }

        {
            let mut state = self.state.lock();
            for (_, chunk) in pending.drain(..) {
                state.release(&chunk);
            }
            state.set_phase(Phase::Idle);
        }
        if !active.is_empty() {
            debug!(
                "[window_controller] '{}' stopping with {} fetch(es) outstanding; results will be discarded",
                self.module,
                active.len()
            );
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                while active.next().await.is_some() {
                    metrics.record_chunk_discarded();
                }
            });
        }
        self.status.set_overall(OverallStatus::Ok);
        info!("[window_controller] stopped for '{}'", self.module);
    }

    /// Re-applies growth rules. Returns `(grew, has_missing)`.
    fn evaluate(&self) -> (bool, bool) {
        let selection = self.registry.current_id(&self.module);
        let evaluated = self.registry.with_ledger(&self.module, |ledger| {
            let mut state = self.state.lock();
            let grew = state.refresh(Some(ledger), selection.as_ref());
            (grew, !state.missing_ids(ledger).is_empty(), state.window_size())
        });
        let Some((grew, missing, window_size)) = evaluated else {
            self.state.lock().refresh::<R>(None, None);
            return (false, false);
        };
        if grew {
            self.metrics.record_window_growth();
            debug!(
                "[window_controller] '{}' window grew to {}",
                self.module, window_size
            );
        }
        (grew, missing)
    }

    fn start_cycle(&self, pending: &mut VecDeque<(u64, Vec<RecordId>)>) {
        let plan = self
            .registry
            .with_ledger(&self.module, |ledger| self.state.lock().reserve_cycle(ledger))
            .flatten();
        let Some(plan) = plan else {
            return;
        };
        self.metrics.record_cycle_started();
        debug!(
            "[window_controller] '{}' cycle reserving {} id(s) in {} chunk(s)",
            self.module,
            plan.id_count(),
            plan.chunks.len()
        );
        let epoch = plan.epoch;
        pending.extend(plan.chunks.into_iter().map(|chunk| (epoch, chunk)));
    }

    fn pump(
        &self,
        active: &mut FuturesUnordered<BoxFuture<'static, ChunkOutcome<R>>>,
        pending: &mut VecDeque<(u64, Vec<RecordId>)>,
    ) {
        let max_concurrent = self.state.lock().config().max_concurrent.max(1);
        let live_epoch = self.registry.epoch(&self.module);
        while active.len() < max_concurrent {
            let Some((epoch, chunk)) = pending.pop_front() else {
                break;
            };
            if live_epoch != Some(epoch) {
                continue;
            }
            self.state.lock().dispatch(&chunk);
            self.metrics.record_dispatch();
            let fetcher = Arc::clone(&self.fetcher);
            let module = self.module.clone();
            active.push(Box::pin(async move {
                let started = Instant::now();
                let result = fetcher.fetch_rows(&module, &chunk).await;
                ChunkOutcome {
                    epoch,
                    chunk,
                    result,
                    elapsed: started.elapsed(),
                }
            }));
        }
    }

    /// Drops queued chunks whose ledger instance is gone.
    fn drop_stale(&self, pending: &mut VecDeque<(u64, Vec<RecordId>)>) {
        let live_epoch = self.registry.epoch(&self.module);
        pending.retain(|(epoch, _)| Some(*epoch) == live_epoch);
    }

    fn finish_chunk(&self, outcome: ChunkOutcome<R>) {
        let ChunkOutcome {
            epoch,
            chunk,
            result,
            elapsed,
        } = outcome;
        let range = id_range(&chunk);
        let settlement = match result {
            Ok(rows) => {
                let wanted: HashSet<IdKey> = chunk.iter().map(RecordId::key).collect();
                let delivered = self
                    .registry
                    .with_ledger(&self.module, |ledger| {
                        rows.iter()
                            .filter_map(|row| ledger.id_of(row))
                            .map(|id| id.key())
                            .filter(|key| wanted.contains(key))
                            .collect::<HashSet<IdKey>>()
                    })
                    .unwrap_or_default();
                if self.registry.add_rows_at_epoch(&self.module, epoch, rows).is_none() {
                    debug!(
                        "[window_controller] '{}' discarding chunk {} from replaced ledger",
                        self.module, range
                    );
                    self.metrics.record_chunk_discarded();
                    return;
                }
                let settlement = self.state.lock().settle(&chunk, Some(&delivered));
                if settlement.orphaned > 0 {
                    warn!(
                        "[window_controller] '{}' chunk {} returned no row for {} id(s)",
                        self.module, range, settlement.orphaned
                    );
                }
                self.metrics
                    .record_chunk_success(settlement.hydrated, settlement.orphaned, elapsed);
                settlement
            }
            Err(err) => {
                if self.registry.epoch(&self.module) != Some(epoch) {
                    self.metrics.record_chunk_discarded();
                    return;
                }
                warn!(
                    "[window_controller] '{}' chunk {} failed: {}",
                    self.module, range, err
                );
                self.status
                    .push_error(format!("{} chunk {} failed: {}", self.module, range, err));
                let settlement = self.state.lock().settle(&chunk, None);
                self.metrics.record_chunk_failure(settlement.orphaned, elapsed);
                settlement
            }
        };
        if settlement.newly_capped > 0 {
            warn!(
                "[window_controller] '{}' giving up on {} id(s) in {}",
                self.module, settlement.newly_capped, range
            );
            self.metrics.record_capped(settlement.newly_capped);
        }
    }

    fn publish(
        &self,
        active: &FuturesUnordered<BoxFuture<'static, ChunkOutcome<R>>>,
        pending: &VecDeque<(u64, Vec<RecordId>)>,
        deadline: Option<Instant>,
    ) {
        let phase = if !active.is_empty() || !pending.is_empty() {
            Phase::Fetching
        } else if deadline.is_some() {
            Phase::Debouncing
        } else {
            Phase::Idle
        };
        let snapshot = {
            let mut state = self.state.lock();
            state.set_phase(phase);
            state.snapshot(phase != Phase::Idle)
        };
        let overall = if phase == Phase::Idle && snapshot.permanently_orphaned == 0 {
            OverallStatus::Ok
        } else {
            OverallStatus::Warn
        };
        self.status.set_overall(overall);
        self.status.clear_warnings_matching(|_| true);
        if snapshot.permanently_orphaned > 0 {
            self.status.push_warning(format!(
                "{} id(s) permanently orphaned",
                snapshot.permanently_orphaned
            ));
        }
        if phase == Phase::Idle && snapshot.orphaned == 0 {
            self.status.clear_errors_matching(|_| true);
        }
        self.status.set_gauges(vec![
            StatusGauge::new("window", snapshot.window_size as f64, None),
            StatusGauge::new("inflight", snapshot.inflight as f64, None),
            StatusGauge::new("queued", snapshot.queued as f64, None),
            StatusGauge::new("orphaned", snapshot.permanently_orphaned as f64, None),
        ]);
    }
}

fn id_range(chunk: &[RecordId]) -> String {
    match (chunk.first(), chunk.last()) {
        (Some(first), Some(last)) if chunk.len() > 1 => format!("[{first}..{last}]"),
        (Some(only), _) => format!("[{only}]"),
        _ => "[]".to_string(),
    }
}

// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::collections::{HashMap, HashSet, VecDeque};

use core_types::config::WindowConfig;
use record_ledger::{IdKey, LedgerMode, RecordId, RecordLedger, RecordRow};

/// Driver phase; `Idle -> Debouncing -> Fetching -> Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Debouncing,
    Fetching,
}

/// Ids reserved by one fetch cycle, split into dispatch-ordered chunks.
#[derive(Clone, Debug)]
pub struct CyclePlan {
    pub epoch: u64,
    pub chunks: VecDeque<Vec<RecordId>>,
}

impl CyclePlan {
    pub fn id_count(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

/// Result of settling one chunk against the window state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkSettlement {
    pub hydrated: usize,
    pub orphaned: usize,
    /// Ids whose orphan count reached the cap with this settlement.
    pub newly_capped: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WindowSnapshot {
    pub module: String,
    pub window_size: usize,
    pub phase: Phase,
    pub inflight: usize,
    pub queued: usize,
    pub orphaned: usize,
    pub permanently_orphaned: usize,
    pub fetching: bool,
}

/// Per-module window bookkeeping. Pure state; the driver feeds it ledger views.
#[derive(Debug)]
pub struct WindowState {
    module: String,
    config: WindowConfig,
    window_size: usize,
    epoch: Option<u64>,
    list_revision: u64,
    inflight: HashSet<IdKey>,
    queued: HashSet<IdKey>,
    orphan_counts: HashMap<IdKey, u32>,
    phase: Phase,
}

impl WindowState {
    pub fn new(module: impl Into<String>, config: WindowConfig) -> Self {
        let window_size = config.initial_window.max(1);
        Self {
            module: module.into(),
            config,
            window_size,
            epoch: None,
            list_revision: 0,
            inflight: HashSet::new(),
            queued: HashSet::new(),
            orphan_counts: HashMap::new(),
            phase: Phase::Idle,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_inflight(&self, key: &IdKey) -> bool {
        self.inflight.contains(key)
    }

    pub fn orphan_count(&self, id: &RecordId) -> u32 {
        self.orphan_counts.get(&id.key()).copied().unwrap_or(0)
    }

    pub fn is_orphaned(&self, id: &RecordId) -> bool {
        self.orphan_count(id) >= self.config.orphan_cap
    }

    /// Realigns with the ledger: a new ledger instance drops all bookkeeping, a replaced
    /// id list resets the window to its initial size.
    pub fn sync<R: RecordRow>(&mut self, ledger: Option<&RecordLedger<R>>) {
        let Some(ledger) = ledger else {
            if self.epoch.take().is_some() {
                self.reset_instance();
            }
            return;
        };
        if self.epoch != Some(ledger.epoch()) {
            self.epoch = Some(ledger.epoch());
            self.reset_instance();
            self.list_revision = ledger.list_revision();
            return;
        }
        if self.list_revision != ledger.list_revision() {
            self.list_revision = ledger.list_revision();
            self.window_size = self.config.initial_window.max(1);
        }
    }

    fn reset_instance(&mut self) {
        self.window_size = self.config.initial_window.max(1);
        self.inflight.clear();
        self.queued.clear();
        self.orphan_counts.clear();
        self.list_revision = 0;
    }

    /// Leading ids eligible for hydration.
    pub fn active_ids<'a, R: RecordRow>(&self, ledger: &'a RecordLedger<R>) -> &'a [RecordId] {
        match ledger.id_list() {
            Some(ids) => &ids[..self.window_size.min(ids.len())],
            None => &[],
        }
    }

    /// Active ids lacking a row, not reserved by a cycle and below the orphan cap,
    /// in id-list order.
    pub fn missing_ids<R: RecordRow>(&self, ledger: &RecordLedger<R>) -> Vec<RecordId> {
        if ledger.mode() != LedgerMode::Hybrid {
            return Vec::new();
        }
        self.active_ids(ledger)
            .iter()
            .filter(|id| {
                let key = id.key();
                !ledger.is_hydrated(&key)
                    && !self.inflight.contains(&key)
                    && !self.queued.contains(&key)
                    && self.orphan_counts.get(&key).copied().unwrap_or(0) < self.config.orphan_cap
            })
            .cloned()
            .collect()
    }

    /// Share of the active window that is hydrated or already counted as a placeholder.
    pub fn coverage<R: RecordRow>(&self, ledger: &RecordLedger<R>) -> f64 {
        let active = self.active_ids(ledger);
        if active.is_empty() {
            return 0.0;
        }
        let represented = active
            .iter()
            .filter(|id| {
                let key = id.key();
                ledger.is_hydrated(&key) || self.orphan_counts.contains_key(&key)
            })
            .count();
        represented as f64 / active.len() as f64
    }

    /// Applies the gradual growth rule and the selection jump rule. Returns whether the
    /// window grew. The window never shrinks here.
    pub fn refresh<R: RecordRow>(
        &mut self,
        ledger: Option<&RecordLedger<R>>,
        selection: Option<&RecordId>,
    ) -> bool {
        self.sync(ledger);
        let Some(ledger) = ledger else {
            return false;
        };
        if ledger.mode() != LedgerMode::Hybrid {
            return false;
        }
        let total = ledger.len();
        let before = self.window_size;

        if let Some(position) = selection.and_then(|id| ledger.position_of(id)) {
            if position + self.config.jump_margin >= self.window_size && self.window_size < total {
                let target = (position + self.config.batch_increment).min(total);
                self.window_size = self.window_size.max(target);
            }
        }

        if self.window_size < total && self.coverage(ledger) >= self.config.growth_threshold {
            self.window_size = (self.window_size + self.config.batch_increment).min(total);
        }

        self.window_size > before
    }

    /// Widens the window so position `index` is active.
    pub fn ensure_covers(&mut self, index: usize, total: usize) -> bool {
        let wanted = (index + 1).min(total);
        if wanted > self.window_size {
            self.window_size = wanted;
            true
        } else {
            false
        }
    }

    /// Reserves the next bounded prefix of missing ids and splits it into chunks.
    pub fn reserve_cycle<R: RecordRow>(&mut self, ledger: &RecordLedger<R>) -> Option<CyclePlan> {
        self.sync(Some(ledger));
        let mut missing = self.missing_ids(ledger);
        if missing.is_empty() {
            return None;
        }
        missing.truncate(self.config.max_per_cycle.max(1));
        for id in &missing {
            self.queued.insert(id.key());
        }
        let chunks = missing
            .chunks(self.config.chunk_size.max(1))
            .map(<[RecordId]>::to_vec)
            .collect();
        Some(CyclePlan {
            epoch: ledger.epoch(),
            chunks,
        })
    }

    /// Moves a chunk from queued to inflight.
    pub fn dispatch(&mut self, chunk: &[RecordId]) {
        for id in chunk {
            let key = id.key();
            self.queued.remove(&key);
            self.inflight.insert(key);
        }
    }

    /// Drops reservations for chunks that will never be dispatched.
    pub fn release(&mut self, chunk: &[RecordId]) {
        for id in chunk {
            let key = id.key();
            self.queued.remove(&key);
            self.inflight.remove(&key);
        }
    }

    /// Settles a dispatched chunk. `hydrated` lists the ids the fetch delivered rows for;
    /// `None` means the whole chunk failed. Ids not delivered count as a failed attempt.
    pub fn settle(&mut self, chunk: &[RecordId], hydrated: Option<&HashSet<IdKey>>) -> ChunkSettlement {
        let mut settlement = ChunkSettlement::default();
        for id in chunk {
            let key = id.key();
            self.inflight.remove(&key);
            let delivered = hydrated.map(|set| set.contains(&key)).unwrap_or(false);
            if delivered {
                self.orphan_counts.remove(&key);
                settlement.hydrated += 1;
                continue;
            }
            let count = self.orphan_counts.entry(key).or_insert(0);
            *count += 1;
            settlement.orphaned += 1;
            if *count == self.config.orphan_cap {
                settlement.newly_capped += 1;
            }
        }
        settlement
    }

    pub fn snapshot(&self, fetching: bool) -> WindowSnapshot {
        let cap = self.config.orphan_cap;
        WindowSnapshot {
            module: self.module.clone(),
            window_size: self.window_size,
            phase: self.phase,
            inflight: self.inflight.len(),
            queued: self.queued.len(),
            orphaned: self.orphan_counts.len(),
            permanently_orphaned: self.orphan_counts.values().filter(|c| **c >= cap).count(),
            fetching,
        }
    }
}

// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{collections::HashMap, sync::Arc};

use log::debug;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::{
    error::{LedgerError, Result},
    identifier::RecordId,
    ledger::RecordLedger,
    row::{IdFn, RecordRow, RowAccessors},
};

/// Options for [`LedgerRegistry::add_rows`].
pub struct AddRowsOptions<R> {
    pub get_id: Option<IdFn<R>>,
    /// Append unseen rows to the fully loaded records array (legacy mode only).
    pub update_records_array: bool,
}

impl<R> Default for AddRowsOptions<R> {
    fn default() -> Self {
        Self {
            get_id: None,
            update_records_array: false,
        }
    }
}

struct RegistryState<R> {
    active: Option<RecordLedger<R>>,
    selection: HashMap<String, RecordId>,
    next_epoch: u64,
    revision: u64,
}

impl<R: RecordRow> RegistryState<R> {
    /// Returns the ledger for `module`, discarding any other module's ledger first.
    fn ledger_for(&mut self, module: &str) -> &mut RecordLedger<R> {
        if let Some(previous) = self.active.as_ref().filter(|l| l.module() != module) {
            debug!(
                "discarding ledger for '{}' in favor of '{}'",
                previous.module(),
                module
            );
            self.active = None;
        }
        if self.active.is_none() {
            self.next_epoch += 1;
        }
        let epoch = self.next_epoch;
        self.active
            .get_or_insert_with(|| RecordLedger::new(module, epoch))
    }

    fn matching_mut(&mut self, module: &str) -> Option<&mut RecordLedger<R>> {
        self.active
            .as_mut()
            .filter(|ledger| ledger.module() == module)
    }
}

/// Session-scoped context object owning the live ledger and per-module selection.
///
/// Cloning the registry clones the handle; all clones observe the same state. Every
/// mutation publishes a new revision on the watch channel returned by [`Self::subscribe`].
pub struct LedgerRegistry<R> {
    state: Arc<RwLock<RegistryState<R>>>,
    changes: Arc<watch::Sender<u64>>,
}

impl<R> Clone for LedgerRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            changes: Arc::clone(&self.changes),
        }
    }
}

impl<R: RecordRow> Default for LedgerRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RecordRow> LedgerRegistry<R> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(RegistryState {
                active: None,
                selection: HashMap::new(),
                next_epoch: 0,
                revision: 0,
            })),
            changes: Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Installs a fully loaded, non-windowed collection.
    pub fn register(&self, module: &str, rows: Vec<R>, accessors: RowAccessors<R>) {
        self.mutate(|state| {
            state.ledger_for(module).install_records(rows, accessors);
            true
        });
    }

    /// Installs (or replaces) the authoritative ordering for windowed mode.
    ///
    /// Narrowing to a single id moves the module's selection onto it.
    pub fn set_id_list(&self, module: &str, ids: Vec<RecordId>, complete: bool) {
        self.mutate(|state| {
            let single = if ids.len() == 1 { ids.first().cloned() } else { None };
            state.ledger_for(module).install_id_list(ids, complete);
            if let Some(only) = single {
                let current = state.selection.get(module);
                if current != Some(&only) {
                    debug!("[{module}] id list narrowed to {only}; selecting it");
                    state.selection.insert(module.to_string(), only);
                }
            }
            true
        });
    }

    /// Merges hydrated rows. Stale calls for another module and empty batches are no-ops.
    pub fn add_rows(&self, module: &str, rows: Vec<R>, options: AddRowsOptions<R>) -> usize {
        if rows.is_empty() {
            return 0;
        }
        let mut merged = 0usize;
        self.mutate(|state| match state.matching_mut(module) {
            Some(ledger) => {
                merged = ledger.merge_rows(
                    rows,
                    options.get_id.as_ref(),
                    options.update_records_array,
                );
                merged > 0
            }
            None => {
                debug!("[{module}] dropping {} row(s) for unregistered module", rows.len());
                false
            }
        });
        merged
    }

    /// Merges rows only if the live ledger for `module` is still at `epoch`.
    ///
    /// Returns `None` when the ledger was replaced or torn down since `epoch` was observed.
    pub fn add_rows_at_epoch(&self, module: &str, epoch: u64, rows: Vec<R>) -> Option<usize> {
        let mut merged = None;
        self.mutate(|state| {
            let Some(ledger) = state
                .matching_mut(module)
                .filter(|ledger| ledger.epoch() == epoch)
            else {
                debug!("[{module}] dropping {} row(s) from epoch {epoch}", rows.len());
                return false;
            };
            let count = ledger.merge_rows(rows, None, false);
            merged = Some(count);
            count > 0
        });
        merged
    }

    /// Replaces the row accessors of the live ledger for `module`.
    pub fn set_accessors(&self, module: &str, accessors: RowAccessors<R>) -> bool {
        let mut applied = false;
        self.mutate(|state| {
            if let Some(ledger) = state.matching_mut(module) {
                ledger.set_accessors(accessors);
                applied = true;
            }
            applied
        });
        applied
    }

    /// Tears down the ledger if it belongs to `module` (or unconditionally for `None`).
    pub fn clear(&self, module: Option<&str>) -> bool {
        let mut cleared = false;
        self.mutate(|state| {
            let matches = match (state.active.as_ref(), module) {
                (Some(_), None) => true,
                (Some(ledger), Some(module)) => ledger.module() == module,
                (None, _) => false,
            };
            if matches {
                state.active = None;
                cleared = true;
            }
            cleared
        });
        cleared
    }

    pub fn module(&self) -> Option<String> {
        self.state
            .read()
            .active
            .as_ref()
            .map(|ledger| ledger.module().to_string())
    }

    /// Epoch of the live ledger for `module`, if that module owns it.
    pub fn epoch(&self, module: &str) -> Option<u64> {
        self.with_ledger(module, |ledger| ledger.epoch())
    }

    pub fn with_ledger<T>(&self, module: &str, f: impl FnOnce(&RecordLedger<R>) -> T) -> Option<T> {
        let guard = self.state.read();
        guard
            .active
            .as_ref()
            .filter(|ledger| ledger.module() == module)
            .map(f)
    }

    /// Owned copy of the live ledger for `module`.
    pub fn snapshot(&self, module: &str) -> Option<RecordLedger<R>> {
        self.with_ledger(module, |ledger| ledger.clone())
    }

    pub fn require_position(&self, module: &str, id: &RecordId) -> Result<usize> {
        self.with_ledger(module, |ledger| ledger.position_of(id))
            .ok_or_else(|| LedgerError::NotRegistered {
                module: module.to_string(),
            })?
            .ok_or_else(|| LedgerError::UnknownId {
                module: module.to_string(),
                id: id.clone(),
            })
    }

    pub fn current_id(&self, module: &str) -> Option<RecordId> {
        self.state.read().selection.get(module).cloned()
    }

    /// Updates the selection; returns whether it changed.
    pub fn set_current_id(&self, module: &str, id: Option<RecordId>) -> bool {
        let mut changed = false;
        self.mutate(|state| {
            let previous = match id {
                Some(id) => state.selection.insert(module.to_string(), id.clone()).map(|p| p != id),
                None => state.selection.remove(module).map(|_| true),
            };
            changed = previous.unwrap_or(true);
            changed
        });
        changed
    }

    fn mutate(&self, f: impl FnOnce(&mut RegistryState<R>) -> bool) {
        let revision = {
            let mut guard = self.state.write();
            if !f(&mut *guard) {
                return;
            }
            guard.revision += 1;
            guard.revision
        };
        self.changes.send_replace(revision);
    }
}

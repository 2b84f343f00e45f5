// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Sequential navigation over a ledger's authoritative ordering, plus a keyboard
//! dispatcher wiring it to arrow keys and Escape.

pub mod keyboard;

use log::debug;
use record_ledger::{LedgerRegistry, RecordId, RecordLedger, RecordRow};

pub use keyboard::{FocusSource, KeyDispatcher, KeyEvent, Modifiers, NavKey, Router, ViewKind};

/// Read-only navigation over the live ledger of one module.
pub struct NavigationFacade<R> {
    module: String,
    registry: LedgerRegistry<R>,
}

impl<R> Clone for NavigationFacade<R> {
    fn clone(&self) -> Self {
        Self {
            module: self.module.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<R: RecordRow> NavigationFacade<R> {
    pub fn new(module: impl Into<String>, registry: LedgerRegistry<R>) -> Self {
        Self {
            module: module.into(),
            registry,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn first_id(&self) -> Option<RecordId> {
        self.with_ledger(|ledger| ledger.id_at(0))
    }

    pub fn last_id(&self) -> Option<RecordId> {
        self.with_ledger(|ledger| ledger.len().checked_sub(1).and_then(|last| ledger.id_at(last)))
    }

    /// Id after `id`, or `None` at the end or when `id` is unknown.
    pub fn next_id(&self, id: &RecordId) -> Option<RecordId> {
        self.with_ledger(|ledger| {
            let position = ledger.position_of(id)?;
            ledger.id_at(position + 1)
        })
    }

    /// Id before `id`, or `None` at the start or when `id` is unknown.
    pub fn prev_id(&self, id: &RecordId) -> Option<RecordId> {
        self.with_ledger(|ledger| {
            let position = ledger.position_of(id)?;
            ledger.id_at(position.checked_sub(1)?)
        })
    }

    /// Display path for `id`. Never fails: ids with no resolvable row get
    /// `/{module}/{id}`.
    pub fn path_for_id(&self, id: &RecordId) -> String {
        self.with_ledger(|ledger| resolve_path(ledger, id))
            .unwrap_or_else(|| self.fallback_path(id))
    }

    pub fn fallback_path(&self, id: &RecordId) -> String {
        format!("/{}/{}", self.module, id)
    }

    pub fn current_id(&self) -> Option<RecordId> {
        self.registry.current_id(&self.module)
    }

    pub fn set_current_id(&self, id: Option<RecordId>) -> bool {
        self.registry.set_current_id(&self.module, id)
    }

    /// Moves the selection one step forward; selects the first id when nothing is selected.
    pub fn select_next(&self) -> Option<RecordId> {
        let target = match self.current_id() {
            Some(current) => self.next_id(&current),
            None => self.first_id(),
        }?;
        self.set_current_id(Some(target.clone()));
        Some(target)
    }

    /// Moves the selection one step back; selects the first id when nothing is selected.
    pub fn select_prev(&self) -> Option<RecordId> {
        let target = match self.current_id() {
            Some(current) => self.prev_id(&current),
            None => self.first_id(),
        }?;
        self.set_current_id(Some(target.clone()));
        Some(target)
    }

    fn with_ledger<T>(&self, f: impl FnOnce(&RecordLedger<R>) -> Option<T>) -> Option<T> {
        self.registry.with_ledger(&self.module, f).flatten()
    }
}

fn resolve_path<R: RecordRow>(ledger: &RecordLedger<R>, id: &RecordId) -> Option<String> {
    let get_path = ledger.accessors().get_path.as_ref()?;
    if let Some(row) = ledger.hydrated_row(id) {
        return Some(get_path(row, id));
    }
    let row = ledger.legacy_row(id)?;
    debug!("[{}] path for {} resolved from records array", ledger.module(), id);
    Some(get_path(row, id))
}

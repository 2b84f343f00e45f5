// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::collections::HashMap;

use log::debug;

use crate::{
    identifier::{IdKey, RecordId},
    row::{RecordRow, RowAccessors},
};

/// Which ordering currently governs index resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerMode {
    /// Nothing installed yet.
    Empty,
    /// `id_list` present; positions fixed by it, rows hydrate lazily.
    Hybrid,
    /// Fully loaded `records` array, no id list.
    Legacy,
}

/// Ordered-identifier ledger plus sparse hydrated-row cache for one module.
#[derive(Clone)]
pub struct RecordLedger<R> {
    module: String,
    id_list: Option<Vec<RecordId>>,
    id_list_complete: bool,
    positions: HashMap<IdKey, usize>,
    rows_by_id: HashMap<IdKey, R>,
    records: Vec<R>,
    index_by_id: HashMap<IdKey, usize>,
    accessors: RowAccessors<R>,
    epoch: u64,
    list_revision: u64,
}

impl<R: RecordRow> RecordLedger<R> {
    pub fn new(module: impl Into<String>, epoch: u64) -> Self {
        Self {
            module: module.into(),
            id_list: None,
            id_list_complete: false,
            positions: HashMap::new(),
            rows_by_id: HashMap::new(),
            records: Vec::new(),
            index_by_id: HashMap::new(),
            accessors: RowAccessors::new(),
            epoch,
            list_revision: 0,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Generation of this ledger instance; bumps whenever ownership changes.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Bumps on every wholesale replacement of the id list or records array.
    pub fn list_revision(&self) -> u64 {
        self.list_revision
    }

    pub fn mode(&self) -> LedgerMode {
        if self.id_list.is_some() {
            LedgerMode::Hybrid
        } else if !self.records.is_empty() {
            LedgerMode::Legacy
        } else {
            LedgerMode::Empty
        }
    }

    pub fn id_list(&self) -> Option<&[RecordId]> {
        self.id_list.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        match self.mode() {
            LedgerMode::Hybrid => self.id_list_complete,
            _ => true,
        }
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn accessors(&self) -> &RowAccessors<R> {
        &self.accessors
    }

    /// Number of addressable positions under the authoritative ordering.
    pub fn len(&self) -> usize {
        match &self.id_list {
            Some(ids) => ids.len(),
            None => self.records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hydrated_count(&self) -> usize {
        self.rows_by_id.len()
    }

    pub fn is_hydrated(&self, key: &IdKey) -> bool {
        self.rows_by_id.contains_key(key)
    }

    pub fn id_of(&self, row: &R) -> Option<RecordId> {
        self.accessors.id_of(row)
    }

    pub fn position_of(&self, id: &RecordId) -> Option<usize> {
        let key = id.key();
        match &self.id_list {
            Some(_) => self.positions.get(&key).copied(),
            None => self.index_by_id.get(&key).copied(),
        }
    }

    pub fn id_at(&self, index: usize) -> Option<RecordId> {
        match &self.id_list {
            Some(ids) => ids.get(index).cloned(),
            None => self.records.get(index).and_then(|row| self.id_of(row)),
        }
    }

    /// Hydrated row for `id`, falling back to the fully loaded records array.
    pub fn row(&self, id: &RecordId) -> Option<&R> {
        let key = id.key();
        self.rows_by_id.get(&key).or_else(|| {
            self.index_by_id
                .get(&key)
                .and_then(|idx| self.records.get(*idx))
        })
    }

    /// Row materialized at `index` under the authoritative ordering.
    pub fn row_at(&self, index: usize) -> Option<&R> {
        match &self.id_list {
            Some(ids) => ids.get(index).and_then(|id| self.rows_by_id.get(&id.key())),
            None => self.records.get(index),
        }
    }

    pub fn legacy_row(&self, id: &RecordId) -> Option<&R> {
        self.index_by_id
            .get(&id.key())
            .and_then(|idx| self.records.get(*idx))
    }

    pub fn hydrated_row(&self, id: &RecordId) -> Option<&R> {
        self.rows_by_id.get(&id.key())
    }

    pub(crate) fn set_accessors(&mut self, accessors: RowAccessors<R>) {
        self.accessors = accessors;
    }

    pub(crate) fn install_records(&mut self, rows: Vec<R>, accessors: RowAccessors<R>) {
        self.accessors = accessors;
        self.records = rows;
        self.id_list = None;
        self.positions.clear();
        self.list_revision += 1;
        self.rebuild_index();
    }

    pub(crate) fn install_id_list(&mut self, ids: Vec<RecordId>, complete: bool) {
        let mut positions = HashMap::with_capacity(ids.len());
        for (idx, id) in ids.iter().enumerate() {
            positions.entry(id.key()).or_insert(idx);
        }
        if positions.len() != ids.len() {
            debug!(
                "[{}] id list carries {} duplicate id(s); first position wins",
                self.module,
                ids.len() - positions.len()
            );
        }
        self.positions = positions;
        self.id_list = Some(ids);
        self.id_list_complete = complete;
        self.list_revision += 1;
    }

    /// Merges rows into the sparse map; returns how many rows carried an id.
    pub(crate) fn merge_rows(
        &mut self,
        rows: Vec<R>,
        get_id: Option<&crate::row::IdFn<R>>,
        update_records_array: bool,
    ) -> usize {
        let append_allowed = update_records_array && self.id_list.is_none();
        if update_records_array && !append_allowed {
            debug!(
                "[{}] ignoring records-array append while id list governs positions",
                self.module
            );
        }
        let mut merged = 0usize;
        let mut appended = false;
        for row in rows {
            let id = match get_id {
                Some(get_id) => get_id(&row),
                None => self.accessors.id_of(&row),
            };
            let Some(id) = id else {
                continue;
            };
            let key = id.key();
            if append_allowed && !self.index_by_id.contains_key(&key) {
                self.index_by_id.insert(key.clone(), self.records.len());
                self.records.push(row.clone());
                appended = true;
            }
            self.rows_by_id.insert(key, row);
            merged += 1;
        }
        if appended {
            self.rebuild_index();
        }
        merged
    }

    fn rebuild_index(&mut self) {
        let mut index = HashMap::with_capacity(self.records.len());
        for (idx, row) in self.records.iter().enumerate() {
            if let Some(id) = self.accessors.id_of(row) {
                index.entry(id.key()).or_insert(idx);
            }
        }
        self.index_by_id = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn ids(range: std::ops::RangeInclusive<i64>) -> Vec<RecordId> {
        range.map(RecordId::Int).collect()
    }

    #[test]
    fn latest_wholesale_install_decides_mode() {
        let mut ledger: RecordLedger<Value> = RecordLedger::new("jobs", 1);
        ledger.install_records(vec![json!({"id": 10}), json!({"id": 11})], RowAccessors::new());
        assert_eq!(ledger.mode(), LedgerMode::Legacy);
        assert_eq!(ledger.position_of(&RecordId::Int(11)), Some(1));

        ledger.install_id_list(ids(1..=5), true);
        assert_eq!(ledger.mode(), LedgerMode::Hybrid);
        assert_eq!(ledger.len(), 5);
        assert_eq!(ledger.position_of(&RecordId::Int(11)), None);
        assert_eq!(ledger.position_of(&RecordId::from("3")), Some(2));

        ledger.install_records(vec![json!({"id": 10})], RowAccessors::new());
        assert_eq!(ledger.mode(), LedgerMode::Legacy);
        assert_eq!(ledger.list_revision(), 3);
    }

    #[test]
    fn merge_in_hybrid_mode_never_appends() {
        let mut ledger: RecordLedger<Value> = RecordLedger::new("jobs", 1);
        ledger.install_id_list(ids(1..=3), true);
        let merged = ledger.merge_rows(vec![json!({"id": 2}), json!({"name": "no id"})], None, true);
        assert_eq!(merged, 1);
        assert!(ledger.records().is_empty());
        assert!(ledger.is_hydrated(&RecordId::Int(2).key()));
        assert_eq!(ledger.row_at(1), Some(&json!({"id": 2})));
        assert_eq!(ledger.row_at(0), None);
    }

    #[test]
    fn merge_in_legacy_mode_appends_new_rows_only() {
        let mut ledger: RecordLedger<Value> = RecordLedger::new("shipments", 1);
        ledger.install_records(vec![json!({"id": 1})], RowAccessors::new());
        ledger.merge_rows(vec![json!({"id": 1, "v": 2}), json!({"id": "2"})], None, true);
        assert_eq!(ledger.records().len(), 2);
        assert_eq!(ledger.position_of(&RecordId::Int(2)), Some(1));
        assert_eq!(ledger.id_at(1), Some(RecordId::Int(2)));
    }

    #[test]
    fn duplicate_ids_keep_first_position() {
        let mut ledger: RecordLedger<Value> = RecordLedger::new("jobs", 1);
        ledger.install_id_list(vec![RecordId::Int(1), RecordId::Int(2), RecordId::Int(1)], false);
        assert_eq!(ledger.position_of(&RecordId::Int(1)), Some(0));
        assert!(!ledger.is_complete());
    }
}

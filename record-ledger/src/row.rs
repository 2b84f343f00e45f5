// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{fmt, sync::Arc};

use serde_json::Value;

use crate::identifier::RecordId;

/// A hydrated row as stored in the ledger.
pub trait RecordRow: Clone + Send + Sync + 'static {
    /// Identifier embedded in the row, if any.
    fn record_id(&self) -> Option<RecordId>;
}

impl RecordRow for Value {
    fn record_id(&self) -> Option<RecordId> {
        match self.get("id")? {
            Value::Number(num) => num.as_i64().map(RecordId::Int),
            Value::String(text) => Some(RecordId::Text(text.clone())),
            _ => None,
        }
    }
}

pub type IdFn<R> = Arc<dyn Fn(&R) -> Option<RecordId> + Send + Sync>;
pub type PathFn<R> = Arc<dyn Fn(&R, &RecordId) -> String + Send + Sync>;

/// Caller-supplied overrides for reading ids and building display paths from rows.
pub struct RowAccessors<R> {
    pub get_id: Option<IdFn<R>>,
    pub get_path: Option<PathFn<R>>,
}

impl<R: RecordRow> RowAccessors<R> {
    pub fn new() -> Self {
        Self {
            get_id: None,
            get_path: None,
        }
    }

    pub fn with_id(mut self, get_id: impl Fn(&R) -> Option<RecordId> + Send + Sync + 'static) -> Self {
        self.get_id = Some(Arc::new(get_id));
        self
    }

    pub fn with_path(mut self, get_path: impl Fn(&R, &RecordId) -> String + Send + Sync + 'static) -> Self {
        self.get_path = Some(Arc::new(get_path));
        self
    }

    pub fn id_of(&self, row: &R) -> Option<RecordId> {
        match &self.get_id {
            Some(get_id) => get_id(row),
            None => row.record_id(),
        }
    }
}

impl<R: RecordRow> Default for RowAccessors<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for RowAccessors<R> {
    fn clone(&self) -> Self {
        Self {
            get_id: self.get_id.clone(),
            get_path: self.get_path.clone(),
        }
    }
}

impl<R> fmt::Debug for RowAccessors<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowAccessors")
            .field("get_id", &self.get_id.is_some())
            .field("get_path", &self.get_path.is_some())
            .finish()
    }
}

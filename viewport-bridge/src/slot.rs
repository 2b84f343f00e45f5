// Copyright (c) James Kassemi, SC, US. All rights reserved.
use record_ledger::RecordId;

/// One position of the dense records array handed to the renderer.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordSlot<R> {
    Hydrated(R),
    /// Caller-built stand-in for a row that has not been fetched.
    Placeholder(R),
    /// Generic loading marker when no placeholder constructor is configured.
    Loading { index: usize, id: RecordId },
}

impl<R> RecordSlot<R> {
    pub fn is_hydrated(&self) -> bool {
        matches!(self, RecordSlot::Hydrated(_))
    }

    pub fn row(&self) -> Option<&R> {
        match self {
            RecordSlot::Hydrated(row) | RecordSlot::Placeholder(row) => Some(row),
            RecordSlot::Loading { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BridgeView<R> {
    pub records: Vec<RecordSlot<R>>,
    pub total: usize,
    /// No further rows can be paged in.
    pub at_end: bool,
    pub fetching: bool,
}

impl<R> BridgeView<R> {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            total: 0,
            at_end: true,
            fetching: false,
        }
    }
}

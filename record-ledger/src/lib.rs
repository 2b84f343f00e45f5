// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Identifier ledger for windowed record browsing.
//!
//! The crate exposes:
//! - [`LedgerRegistry`]: session context owning the live ledger, per-module selection and
//!   change notifications.
//! - [`RecordLedger`]: ordered id list plus sparse hydrated-row cache (or a fully loaded
//!   records array in legacy mode).
//! - [`RecordId`] / [`IdKey`]: identifiers and their canonical lookup form.

pub mod error;
pub mod identifier;
pub mod ledger;
pub mod registry;
pub mod row;

pub use error::{LedgerError, Result};
pub use identifier::{canonical_key, IdKey, RecordId};
pub use ledger::{LedgerMode, RecordLedger};
pub use registry::{AddRowsOptions, LedgerRegistry};
pub use row::{IdFn, PathFn, RecordRow, RowAccessors};

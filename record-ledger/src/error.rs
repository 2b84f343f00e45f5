// Copyright (c) James Kassemi, SC, US. All rights reserved.
use thiserror::Error;

use crate::identifier::RecordId;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("module '{module}' is not registered")]
    NotRegistered { module: String },
    #[error("id {id} not present in module '{module}'")]
    UnknownId { module: String, id: RecordId },
}

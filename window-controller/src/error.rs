// Copyright (c) James Kassemi, SC, US. All rights reserved.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControllerError>;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("window controller for '{0}' is already running")]
    AlreadyRunning(String),
    #[error("window controller for '{0}' is not running")]
    NotRunning(String),
    #[error("window controller requires a tokio runtime")]
    NoRuntime,
}

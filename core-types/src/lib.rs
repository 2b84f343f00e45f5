// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared configuration and status plumbing for the record window crates.

pub mod config;
pub mod status;

pub use config::{AppConfig, FetchConfig, ViewportConfig, WindowConfig};
pub use status::{OverallStatus, ServiceStatusHandle, ServiceStatusSnapshot, StatusGauge};

// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{path::Path, time::Duration};

use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_INITIAL_WINDOW: usize = 100;
pub const DEFAULT_BATCH_INCREMENT: usize = 200;
pub const DEFAULT_DEBOUNCE_MS: u64 = 120;
pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_MAX_PER_CYCLE: usize = 800;
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
pub const DEFAULT_ORPHAN_CAP: u32 = 2;
pub const DEFAULT_GROWTH_THRESHOLD: f64 = 0.8;
pub const DEFAULT_JUMP_MARGIN: usize = 50;
pub const DEFAULT_NEAR_END_DISTANCE: usize = 20;
/// Upper bound the id source applies before flagging a list as incomplete.
pub const MAX_ID_LIST_LEN: usize = 50_000;

const CONFIG_FILE: &str = "record-window.toml";
const ENV_PREFIX: &str = "RECORD_WINDOW";

/// Top-level configuration for the record window stack.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
}

impl AppConfig {
    /// Loads `record-window.toml` from the working directory (if present) layered under
    /// `RECORD_WINDOW_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.window.validate()?;
        Ok(config)
    }
}

/// Knobs for the window controller. Defaults mirror the production tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub initial_window: usize,
    pub batch_increment: usize,
    pub debounce_ms: u64,
    pub chunk_size: usize,
    pub max_per_cycle: usize,
    pub max_concurrent: usize,
    pub orphan_cap: u32,
    pub growth_threshold: f64,
    pub jump_margin: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            initial_window: DEFAULT_INITIAL_WINDOW,
            batch_increment: DEFAULT_BATCH_INCREMENT,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_per_cycle: DEFAULT_MAX_PER_CYCLE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            orphan_cap: DEFAULT_ORPHAN_CAP,
            growth_threshold: DEFAULT_GROWTH_THRESHOLD,
            jump_margin: DEFAULT_JUMP_MARGIN,
        }
    }
}

impl WindowConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_initial_window(mut self, size: usize) -> Self {
        self.initial_window = size.max(1);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Message("window.chunk_size must be > 0".into()));
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::Message(
                "window.max_concurrent must be > 0".into(),
            ));
        }
        if self.initial_window == 0 || self.batch_increment == 0 {
            return Err(ConfigError::Message(
                "window.initial_window and window.batch_increment must be > 0".into(),
            ));
        }
        if self.max_per_cycle == 0 {
            return Err(ConfigError::Message("window.max_per_cycle must be > 0".into()));
        }
        if !(self.growth_threshold > 0.0 && self.growth_threshold <= 1.0) {
            return Err(ConfigError::Message(format!(
                "window.growth_threshold {} outside (0, 1]",
                self.growth_threshold
            )));
        }
        Ok(())
    }
}

/// Where the row-fetch-by-ids endpoint lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    /// Path template; `{module}` is substituted. `None` means `/{module}/rows`.
    pub rows_path: Option<String>,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            rows_path: None,
            user_agent: "record-window/0.1".to_string(),
        }
    }
}

impl FetchConfig {
    pub fn rows_path_for(&self, module: &str) -> String {
        match self.rows_path.as_deref() {
            Some(template) => template.replace("{module}", module),
            None => format!("/{module}/rows"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub near_end_distance: usize,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            near_end_distance: DEFAULT_NEAR_END_DISTANCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_match_tuning() {
        let cfg = WindowConfig::default();
        assert_eq!(cfg.initial_window, 100);
        assert_eq!(cfg.batch_increment, 200);
        assert_eq!(cfg.debounce(), Duration::from_millis(120));
        assert_eq!(cfg.chunk_size, 100);
        assert_eq!(cfg.max_per_cycle, 800);
        assert_eq!(cfg.max_concurrent, 4);
        assert_eq!(cfg.orphan_cap, 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rows_path_defaults_to_module_rows() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.rows_path_for("jobs"), "/jobs/rows");
        let custom = FetchConfig {
            rows_path: Some("/api/{module}/batch".into()),
            ..FetchConfig::default()
        };
        assert_eq!(custom.rows_path_for("invoices"), "/api/invoices/batch");
    }

    #[test]
    fn load_from_file_overrides_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record-window.toml");
        fs::write(
            &path,
            "[window]\nchunk_size = 50\nmax_concurrent = 2\n\n[fetch]\nbase_url = \"http://example.test\"\n",
        )
        .unwrap();
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.window.chunk_size, 50);
        assert_eq!(cfg.window.max_concurrent, 2);
        assert_eq!(cfg.window.initial_window, DEFAULT_INITIAL_WINDOW);
        assert_eq!(cfg.fetch.base_url, "http://example.test");
        assert_eq!(cfg.viewport.near_end_distance, DEFAULT_NEAR_END_DISTANCE);
    }

    #[test]
    fn validation_rejects_zero_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record-window.toml");
        fs::write(&path, "[window]\nchunk_size = 0\n").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.window.max_per_cycle, DEFAULT_MAX_PER_CYCLE);
    }
}

// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{env, path::PathBuf, process, sync::Arc, time::Duration};

use config::ConfigError;
use core_types::config::{AppConfig, MAX_ID_LIST_LEN};
use log::{info, warn};
use record_ledger::{LedgerRegistry, RecordId};
use serde_json::Value;
use window_controller::{
    ControllerError, FetchError, HttpRowFetcher, RowFetcher, WindowController,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("window-diag failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), DiagError> {
    let args = CliArgs::parse(env::args().skip(1))?;
    let config = match args.config.as_deref() {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(DiagError::Runtime)?;
    runtime.block_on(diagnose(args, config))
}

async fn diagnose(args: CliArgs, config: AppConfig) -> Result<(), DiagError> {
    let mut ids = args.ids;
    let complete = ids.len() <= MAX_ID_LIST_LEN;
    if !complete {
        warn!("truncating {} ids to {}", ids.len(), MAX_ID_LIST_LEN);
        ids.truncate(MAX_ID_LIST_LEN);
    }
    let total = ids.len();

    let registry: LedgerRegistry<Value> = LedgerRegistry::new();
    registry.set_id_list(&args.module, ids, complete);
    let fetcher: Arc<dyn RowFetcher<Value>> = Arc::new(HttpRowFetcher::new(config.fetch.clone())?);
    let controller = WindowController::new(&args.module, config.window.clone(), registry.clone(), fetcher);
    controller.start()?;
    if let Some(selected) = args.select {
        info!("selecting {selected}");
        registry.set_current_id(&args.module, Some(selected));
    }

    let metrics = controller.metrics();
    tokio::time::sleep(config.window.debounce()).await;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let snap = metrics.snapshot();
        if !controller.is_fetching() {
            break;
        }
        if args.cycles.is_some_and(|cycles| snap.cycles_completed >= cycles) {
            break;
        }
    }
    controller.shutdown().await?;

    let window = controller.snapshot();
    let hydrated = registry
        .with_ledger(&args.module, |ledger| ledger.hydrated_count())
        .unwrap_or(0);
    let metrics = metrics.snapshot();
    println!("Window diagnostics (module={}):", args.module);
    println!("  ids:            {total} (complete={complete})");
    println!("  window size:    {}", window.window_size);
    println!("  hydrated:       {hydrated}");
    println!(
        "  orphaned:       {} ({} permanently)",
        window.orphaned, window.permanently_orphaned
    );
    println!(
        "  cycles:         started={} completed={}",
        metrics.cycles_started, metrics.cycles_completed
    );
    println!(
        "  chunks:         dispatched={} failed={} discarded={}",
        metrics.chunks_dispatched, metrics.chunks_failed, metrics.chunks_discarded
    );
    println!(
        "  fetch latency:  avg={:.1}ms max={:.1}ms",
        metrics.fetch_latency_ms_avg, metrics.fetch_latency_ms_max
    );
    let status = controller.status_handle();
    println!("  status:         {} {:?}", status.service_name(), status.overall());
    let status = status.snapshot();
    for warning in status.warnings {
        println!("  warning: {warning}");
    }
    for error in status.errors {
        println!("  error: {error}");
    }
    Ok(())
}

#[derive(Debug)]
struct CliArgs {
    module: String,
    ids: Vec<RecordId>,
    select: Option<RecordId>,
    cycles: Option<u64>,
    config: Option<PathBuf>,
}

impl CliArgs {
    /// Accepts `--flag value` and `--flag=value`.
    fn parse(args: impl Iterator<Item = String>) -> Result<Self, DiagError> {
        let mut module = None;
        let mut ids = None;
        let mut select = None;
        let mut cycles = None;
        let mut config = None;
        let mut args = args.peekable();
        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg.clone(), None),
            };
            let name: &'static str = match flag.as_str() {
                "--module" => "module",
                "--count" => "count",
                "--ids" => "ids",
                "--select" => "select",
                "--cycles" => "cycles",
                "--config" => "config",
                _ => return Err(DiagError::UnknownArg(arg)),
            };
            let value = match inline {
                Some(value) => value,
                None => args
                    .next_if(|next| !next.starts_with("--"))
                    .ok_or(DiagError::MissingValue(name))?,
            };
            match name {
                "module" => module = Some(value),
                "count" => {
                    let count: i64 = value.parse().map_err(|_| DiagError::invalid(name, &value))?;
                    ids = Some((1..=count).map(RecordId::Int).collect());
                }
                "ids" => {
                    ids = Some(
                        value
                            .split(',')
                            .filter(|raw| !raw.trim().is_empty())
                            .map(RecordId::parse)
                            .collect(),
                    );
                }
                "select" => select = Some(RecordId::parse(&value)),
                "cycles" => cycles = Some(value.parse().map_err(|_| DiagError::invalid(name, &value))?),
                _ => config = Some(PathBuf::from(value)),
            }
        }
        let ids: Vec<RecordId> = ids.ok_or(DiagError::MissingIds)?;
        if ids.is_empty() {
            return Err(DiagError::MissingIds);
        }
        Ok(Self {
            module: module.unwrap_or_else(|| "jobs".to_string()),
            ids,
            select,
            cycles,
            config,
        })
    }
}

#[derive(thiserror::Error, Debug)]
enum DiagError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("failed to start runtime: {0}")]
    Runtime(std::io::Error),
    #[error("unknown argument: {0}")]
    UnknownArg(String),
    #[error("invalid --{arg} value '{value}'")]
    InvalidArg { arg: &'static str, value: String },
    #[error("missing value for --{0}")]
    MissingValue(&'static str),
    #[error("provide ids with --count <n> or --ids a,b,c")]
    MissingIds,
}

impl DiagError {
    fn invalid(arg: &'static str, value: &str) -> Self {
        DiagError::InvalidArg {
            arg,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, DiagError> {
        CliArgs::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn parses_count_and_selection() {
        let args = parse(&["--module=companies", "--count=3", "--select=2", "--cycles=4"]).unwrap();
        assert_eq!(args.module, "companies");
        assert_eq!(args.ids, vec![RecordId::Int(1), RecordId::Int(2), RecordId::Int(3)]);
        assert_eq!(args.select, Some(RecordId::Int(2)));
        assert_eq!(args.cycles, Some(4));
    }

    #[test]
    fn parses_space_separated_values() {
        let args = parse(&["--module", "companies", "--count", "3", "--select", "2"]).unwrap();
        assert_eq!(args.module, "companies");
        assert_eq!(args.ids.len(), 3);
        assert_eq!(args.select, Some(RecordId::Int(2)));

        let args = parse(&["--ids", "4,5", "--config", "diag.toml", "--cycles=2"]).unwrap();
        assert_eq!(args.ids, vec![RecordId::Int(4), RecordId::Int(5)]);
        assert_eq!(args.config, Some(PathBuf::from("diag.toml")));
        assert_eq!(args.cycles, Some(2));
    }

    #[test]
    fn parses_explicit_ids() {
        let args = parse(&["--ids=7, a-1,,9"]).unwrap();
        assert_eq!(args.module, "jobs");
        assert_eq!(
            args.ids,
            vec![RecordId::Int(7), RecordId::from("a-1"), RecordId::Int(9)]
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse(&[]), Err(DiagError::MissingIds)));
        assert!(matches!(parse(&["--count=x"]), Err(DiagError::InvalidArg { arg: "count", .. })));
        assert!(matches!(parse(&["--count=2", "--verbose"]), Err(DiagError::UnknownArg(_))));
        assert!(matches!(parse(&["--count"]), Err(DiagError::MissingValue("count"))));
        assert!(matches!(
            parse(&["--module", "--count", "2"]),
            Err(DiagError::MissingValue("module"))
        ));
    }
}

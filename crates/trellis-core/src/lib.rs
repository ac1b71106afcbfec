pub mod api;
pub mod board;
pub mod cli;
pub mod commands;
pub mod config;
pub mod connectivity;
pub mod ordering;
pub mod render;
pub mod replay;
pub mod store;
pub mod sync;
pub mod task;

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

use crate::api::{ApiSettings, HttpTaskApi};
use crate::connectivity::ConnectivityFlag;
use crate::replay::StoreReplayScheduler;
use crate::store::LocalStore;
use crate::sync::SyncCoordinator;

#[tracing::instrument(skip_all)]
pub async fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );
    if cli.offline {
        cfg.apply_overrides([("offline".to_string(), "on".to_string())]);
    }

    let log_dir = cfg.get("log.directory").map(PathBuf::from);
    let _log_guard = cli::init_tracing(cli.verbose, cli.quiet, log_dir.as_deref())?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        config_files = ?cfg.loaded_files,
        "starting trellis"
    );

    let renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = LocalStore::initialize(&data_dir).with_context(|| {
        format!("failed to open local store at {}", data_dir.display())
    })?;

    let api = Arc::new(HttpTaskApi::new(ApiSettings::from_config(&cfg)?)?);

    let flag = if cfg.get_bool("offline").unwrap_or(false) {
        info!("offline mode forced by configuration");
        Arc::new(ConnectivityFlag::forced_offline())
    } else if inv.is_local() {
        debug!(command = %inv.command, "local command; skipping connectivity check");
        Arc::new(ConnectivityFlag::new(false))
    } else {
        let flag = Arc::new(ConnectivityFlag::new(false));
        flag.refresh(api.as_ref()).await;
        flag
    };

    let coordinator = Arc::new(SyncCoordinator::new(
        api.clone(),
        flag.clone(),
        Arc::new(StoreReplayScheduler::new(store.clone())),
        store.clone(),
    ));

    // A replay registered while offline fires on the first run that
    // finds the server reachable.
    if coordinator.is_online() && store.replay_requested() {
        match coordinator.flush_pending().await {
            Ok(report) => debug!(
                synced = report.synced.len(),
                rejected = report.rejected.len(),
                remaining = report.remaining,
                "replayed pending tasks"
            ),
            Err(err) => warn!(error = %format!("{err:#}"), "replay of pending tasks failed"),
        }
    }

    let mut app = commands::App {
        cfg,
        coordinator,
        flag,
        probe: api,
        renderer,
    };
    commands::dispatch(&mut app, inv).await?;

    info!("done");
    Ok(())
}

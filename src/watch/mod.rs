//! Config watcher: reload the `[strategy]` table when config.toml changes.
//!
//! Uses the notify crate to watch the file, debounces events, and publishes
//! the new table through [`SharedStrategyConfig::update`]. An edit that
//! fails to parse or validate is logged and the running config is kept.

mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{load_strategy_section, StrategyConfig};
use crate::error::Result;
use crate::network::strategy::SharedStrategyConfig;

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Re-read `[strategy]` from `path` and publish it.
pub fn apply_config_change(path: &Path, shared: &SharedStrategyConfig) -> Result<Arc<StrategyConfig>> {
    let strategy = load_strategy_section(path)?;
    if *shared.snapshot() == strategy {
        log::debug!("{} changed but [strategy] is unchanged", path.display());
        return Ok(shared.snapshot());
    }
    shared.update(strategy)
}

/// Watch `path` until `shutdown` fires, applying each settled change.
pub async fn run_config_watcher(
    path: PathBuf,
    shared: SharedStrategyConfig,
    debounce_ms: u64,
    shutdown: CancellationToken,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let watched = path.clone();
    std::thread::spawn(move || {
        if let Err(e) = watcher::run_watcher_thread(&watched, debounce_ms, tx) {
            log::error!("config watcher thread error: {}", e);
        }
    });

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            signal = rx.recv() => {
                if signal.is_none() {
                    break;
                }
                match apply_config_change(&path, &shared) {
                    Ok(config) => log::info!(
                        "watch: {} reloaded (small {}, large {}, workers {}..={})",
                        path.display(),
                        config.small_threshold,
                        config.large_threshold,
                        config.min_workers,
                        config.max_workers
                    ),
                    Err(e) => log::error!("watch: keeping current strategy config, {}: {}", path.display(), e),
                }
            }
        }
    }
    Ok(())
}

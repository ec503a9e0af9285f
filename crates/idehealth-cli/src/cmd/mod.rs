pub mod check;
pub mod circuit;
pub mod config;
pub mod invalidate;
pub mod metrics;
pub mod reset;
pub mod run;

use anyhow::Context;
use idehealth_core::config::Config;
use idehealth_core::HealthMonitor;
use std::future::Future;
use std::path::Path;

/// Build a monitor from the project config and restore the last snapshot.
/// A missing or unreadable snapshot starts from empty state.
pub(crate) fn open_monitor(root: &Path) -> anyhow::Result<HealthMonitor> {
    let config = Config::load(root).context("failed to load config")?;
    let monitor = HealthMonitor::new(config.health);
    monitor.load_metrics(root);
    Ok(monitor)
}

pub(crate) fn save_monitor(root: &Path, monitor: &HealthMonitor) -> anyhow::Result<()> {
    monitor
        .save_metrics(root)
        .context("failed to save health snapshot")
}

pub(crate) fn block_on<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    Ok(rt.block_on(fut))
}

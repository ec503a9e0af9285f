use super::{open_monitor, save_monitor};
use std::path::Path;

pub fn run(root: &Path, target: &str, scope: Option<&str>) -> anyhow::Result<()> {
    let monitor = open_monitor(root)?;
    let before = monitor.get_metrics().cache_size;
    monitor.invalidate(target, scope);
    let removed = before.saturating_sub(monitor.get_metrics().cache_size);
    save_monitor(root, &monitor)?;
    println!("Invalidated {removed} cache entr{}.", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

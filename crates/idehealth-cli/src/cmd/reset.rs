use super::{open_monitor, save_monitor};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let monitor = open_monitor(root)?;
    monitor.reset();
    save_monitor(root, &monitor)?;
    println!("Cleared cache, circuits, and metrics.");
    Ok(())
}

use super::{block_on, open_monitor, save_monitor};
use crate::output::print_json;
use idehealth_cli::probe;
use std::path::Path;
use std::time::Duration;

pub fn run(
    root: &Path,
    target: &str,
    scope: Option<&str>,
    command: &[String],
    timeout_ms: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let monitor = open_monitor(root)?;
    let scope = scope
        .map(str::to_string)
        .unwrap_or_else(|| root.display().to_string());
    let timeout = timeout_ms.map(Duration::from_millis);

    let result = block_on(monitor.check_ide(target, &scope, || probe::detect(command, timeout)))?;
    save_monitor(root, &monitor)?;

    if json {
        return print_json(&result);
    }

    let status = if result.detected { "detected" } else { "not detected" };
    let mut notes = Vec::new();
    if result.cached {
        notes.push("cached".to_string());
    }
    if result.circuit_open {
        notes.push("circuit open".to_string());
    }
    if let Some(ms) = result.duration_ms {
        notes.push(format!("{ms}ms"));
    }
    if notes.is_empty() {
        println!("{target}: {status}");
    } else {
        println!("{target}: {status} ({})", notes.join(", "));
    }
    if let Some(err) = &result.error {
        println!("  error: {err}");
    }
    Ok(())
}

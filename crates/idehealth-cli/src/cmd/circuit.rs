use super::open_monitor;
use crate::output::print_json;
use std::path::Path;

pub fn run(root: &Path, target: &str, json: bool) -> anyhow::Result<()> {
    let monitor = open_monitor(root)?;
    let state = monitor.get_circuit_state(target);

    if json {
        return print_json(&state);
    }

    let status = if state.open { "open" } else { "closed" };
    println!("{}: {status} ({} consecutive failures)", state.target, state.failures);
    if let Some(opened) = state.opened_at {
        println!("  opened at: {}", opened.to_rfc3339());
    }
    if let Some(err) = &state.last_error {
        println!("  last error: {err}");
    }
    Ok(())
}

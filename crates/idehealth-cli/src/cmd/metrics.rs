use super::open_monitor;
use crate::output::{print_json, print_table};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let monitor = open_monitor(root)?;
    let snapshot = monitor.get_metrics();

    if json {
        return print_json(&snapshot);
    }

    let m = &snapshot.metrics;
    let rows = vec![
        vec!["total checks".to_string(), m.total_checks.to_string()],
        vec!["cache hits".to_string(), m.cache_hits.to_string()],
        vec!["cache misses".to_string(), m.cache_misses.to_string()],
        vec!["hit rate".to_string(), snapshot.hit_rate.clone()],
        vec!["failures".to_string(), m.failures.to_string()],
        vec!["circuit opens".to_string(), m.circuit_opens.to_string()],
        vec!["cache size".to_string(), snapshot.cache_size.to_string()],
        vec!["open circuits".to_string(), snapshot.open_circuits.to_string()],
    ];
    print_table(&["METRIC", "VALUE"], rows);

    let open = monitor.open_circuits();
    if !open.is_empty() {
        println!();
        let rows = open
            .iter()
            .map(|c| {
                vec![
                    c.target.clone(),
                    c.failures.to_string(),
                    c.opened_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                    c.last_error.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["TARGET", "FAILURES", "OPENED", "LAST ERROR"], rows);
    }
    Ok(())
}

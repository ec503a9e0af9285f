//! Detection cache and per-target circuit breaker.
//!
//! [`HealthMonitor::check_ide`] answers "is this integration available?" by
//! running a caller-supplied probe at most once per cache miss. Results are
//! cached per `(target, scope)` for `cache_ttl_ms`. Consecutive probe
//! failures are counted per target; at `max_failures` the target's circuit
//! opens and probes stop until `circuit_reset_ms` has passed.
//!
//! There is no background timer. An open circuit is re-evaluated whenever
//! its target is looked at, which keeps the monitor testable with a
//! [`ManualClock`](crate::clock::ManualClock).
//!
//! Concurrent misses on the same key are not coalesced: each caller runs its
//! own probe. Probes are expected to be cheap and idempotent.

use crate::clock::{millis, Clock, SystemClock};
use crate::error::Result;
use crate::io;
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Passing this as the target to [`HealthMonitor::invalidate`] clears the
/// whole cache.
pub const WILDCARD: &str = "*";

const SNAPSHOT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// HealthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_circuit_reset_ms")]
    pub circuit_reset_ms: u64,
    /// Snapshot location relative to the project root.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

fn default_cache_ttl_ms() -> u64 {
    60_000
}

fn default_max_failures() -> u32 {
    3
}

fn default_circuit_reset_ms() -> u64 {
    30_000
}

fn default_snapshot_path() -> String {
    paths::DEFAULT_SNAPSHOT_FILE.to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            max_failures: default_max_failures(),
            circuit_reset_ms: default_circuit_reset_ms(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub target: String,
    pub scope: String,
}

impl CacheKey {
    pub fn new(target: &str, scope: &str) -> Self {
        Self {
            target: target.to_string(),
            scope: scope.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target, self.scope)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: bool,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitState {
    pub target: String,
    #[serde(default)]
    pub failures: u32,
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
}

impl CircuitState {
    pub fn closed(target: &str) -> Self {
        Self {
            target: target.to_string(),
            failures: 0,
            open: false,
            last_error: None,
            opened_at: None,
        }
    }

    /// Close the circuit if its cool-down has passed. Returns whether it is
    /// still open.
    fn settle(&mut self, now: DateTime<Utc>, reset_ms: u64) -> bool {
        if !self.open {
            return false;
        }
        let elapsed = self
            .opened_at
            .map_or(true, |opened| now.signed_duration_since(opened) >= millis(reset_ms));
        if elapsed {
            info!(target_name = %self.target, "circuit cool-down elapsed, closing");
            self.open = false;
            self.failures = 0;
            self.opened_at = None;
        }
        self.open
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub total_checks: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub failures: u64,
    pub circuit_opens: u64,
}

impl Metrics {
    /// `cache_hits / total_checks` as a one-decimal percentage.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> String {
        if self.total_checks == 0 {
            return "0.0%".to_string();
        }
        let rate = self.cache_hits as f64 / self.total_checks as f64 * 100.0;
        format!("{rate:.1}%")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    #[serde(flatten)]
    pub metrics: Metrics,
    pub cache_size: usize,
    pub open_circuits: usize,
    pub hit_rate: String,
    pub last_updated: DateTime<Utc>,
}

/// Answer to a single [`HealthMonitor::check_ide`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub detected: bool,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub circuit_open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Snapshot format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct HealthSnapshot {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    metrics: Metrics,
    #[serde(default)]
    cache: Vec<PersistedEntry>,
    #[serde(default)]
    circuits: Vec<CircuitState>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    target: String,
    scope: String,
    result: bool,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MonitorState {
    cache: HashMap<CacheKey, CacheEntry>,
    circuits: HashMap<String, CircuitState>,
    metrics: Metrics,
}

pub struct HealthMonitor {
    config: HealthConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<MonitorState>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: HealthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Probe `target` in `scope`, consulting the cache and circuit first.
    ///
    /// Probe failures are reported in the result and never returned as an
    /// error.
    pub async fn check_ide<F, Fut, E>(&self, target: &str, scope: &str, detect: F) -> CheckResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<bool, E>>,
        E: fmt::Display,
    {
        let key = CacheKey::new(target, scope);

        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let now = self.clock.now();
            state.metrics.total_checks += 1;

            if let Some(entry) = state.cache.get(&key).filter(|e| e.is_fresh(now)) {
                state.metrics.cache_hits += 1;
                debug!(%key, detected = entry.result, "health cache hit");
                return CheckResult {
                    detected: entry.result,
                    cached: true,
                    ..CheckResult::default()
                };
            }
            state.metrics.cache_misses += 1;

            let open = state
                .circuits
                .get_mut(target)
                .is_some_and(|c| c.settle(now, self.config.circuit_reset_ms));
            if open {
                let stale = state.cache.get(&key).map(|e| e.result);
                debug!(%key, stale = ?stale, "circuit open, skipping probe");
                return CheckResult {
                    detected: stale.unwrap_or(false),
                    cached: stale.is_some(),
                    circuit_open: true,
                    ..CheckResult::default()
                };
            }
        }

        debug!(%key, "health cache miss, probing");
        let started = Instant::now();
        let outcome = detect().await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut guard = self.lock();
        let state = &mut *guard;
        let now = self.clock.now();

        match outcome {
            Ok(detected) => {
                if let Some(circuit) = state.circuits.get_mut(target) {
                    circuit.failures = 0;
                    circuit.open = false;
                    circuit.opened_at = None;
                }
                let expires_at = now
                    .checked_add_signed(millis(self.config.cache_ttl_ms))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                state.cache.insert(
                    key,
                    CacheEntry {
                        result: detected,
                        cached_at: now,
                        expires_at,
                    },
                );
                CheckResult {
                    detected,
                    cached: false,
                    duration_ms: Some(duration_ms),
                    ..CheckResult::default()
                }
            }
            Err(e) => {
                let message = e.to_string();
                state.metrics.failures += 1;
                let circuit = state
                    .circuits
                    .entry(target.to_string())
                    .or_insert_with(|| CircuitState::closed(target));
                circuit.failures += 1;
                circuit.last_error = Some(message.clone());
                debug!(%key, failures = circuit.failures, error = %message, "probe failed");

                if !circuit.open && circuit.failures >= self.config.max_failures {
                    circuit.open = true;
                    circuit.opened_at = Some(now);
                    state.metrics.circuit_opens += 1;
                    warn!(
                        target_name = target,
                        failures = circuit.failures,
                        reset_ms = self.config.circuit_reset_ms,
                        error = %message,
                        "circuit opened"
                    );
                }

                CheckResult {
                    detected: false,
                    cached: false,
                    duration_ms: Some(duration_ms),
                    error: Some(message),
                    ..CheckResult::default()
                }
            }
        }
    }

    /// Circuit state for `target`; unknown targets read as closed.
    pub fn get_circuit_state(&self, target: &str) -> CircuitState {
        let mut state = self.lock();
        let now = self.clock.now();
        match state.circuits.get_mut(target) {
            Some(circuit) => {
                circuit.settle(now, self.config.circuit_reset_ms);
                circuit.clone()
            }
            None => CircuitState::closed(target),
        }
    }

    /// Circuits that are currently open, sorted by target.
    pub fn open_circuits(&self) -> Vec<CircuitState> {
        let mut state = self.lock();
        let now = self.clock.now();
        let mut open: Vec<CircuitState> = state
            .circuits
            .values_mut()
            .filter_map(|c| c.settle(now, self.config.circuit_reset_ms).then(|| c.clone()))
            .collect();
        open.sort_by(|a, b| a.target.cmp(&b.target));
        open
    }

    /// Drop cached results. `scope` narrows to one key; [`WILDCARD`] as the
    /// target clears everything. Circuit state is left alone.
    pub fn invalidate(&self, target: &str, scope: Option<&str>) {
        let mut state = self.lock();
        if target == WILDCARD {
            state.cache.clear();
            return;
        }
        match scope {
            Some(scope) => {
                state.cache.remove(&CacheKey::new(target, scope));
            }
            None => state.cache.retain(|k, _| k.target != target),
        }
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let mut state = self.lock();
        let now = self.clock.now();
        let reset_ms = self.config.circuit_reset_ms;
        let open_circuits = state
            .circuits
            .values_mut()
            .map(|c| c.settle(now, reset_ms))
            .filter(|open| *open)
            .count();
        MetricsSnapshot {
            hit_rate: state.metrics.hit_rate(),
            metrics: state.metrics.clone(),
            cache_size: state.cache.len(),
            open_circuits,
            last_updated: now,
        }
    }

    /// Forget all cached results, circuits and counters.
    pub fn reset(&self) {
        *self.lock() = MonitorState::default();
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write metrics, cache and circuits under `root` at the configured
    /// snapshot path.
    pub fn save_metrics(&self, root: &Path) -> Result<()> {
        self.save_metrics_to(&paths::snapshot_path(root, &self.config.snapshot_path))
    }

    pub fn save_metrics_to(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let state = self.lock();
            let mut cache: Vec<PersistedEntry> = state
                .cache
                .iter()
                .map(|(key, entry)| PersistedEntry {
                    target: key.target.clone(),
                    scope: key.scope.clone(),
                    result: entry.result,
                    cached_at: entry.cached_at,
                    expires_at: entry.expires_at,
                })
                .collect();
            cache.sort_by(|a, b| (&a.target, &a.scope).cmp(&(&b.target, &b.scope)));
            let mut circuits: Vec<CircuitState> = state.circuits.values().cloned().collect();
            circuits.sort_by(|a, b| a.target.cmp(&b.target));
            HealthSnapshot {
                version: SNAPSHOT_VERSION,
                metrics: state.metrics.clone(),
                cache,
                circuits,
                saved_at: Some(self.clock.now()),
            }
        };
        let data = serde_json::to_string_pretty(&snapshot)?;
        io::atomic_write(path, data.as_bytes())?;
        debug!(path = %path.display(), entries = snapshot.cache.len(), "saved health snapshot");
        Ok(())
    }

    /// Restore state written by [`HealthMonitor::save_metrics`]. Returns
    /// `false` when there is nothing usable to load; a missing or corrupt
    /// file is treated as a cold start.
    pub fn load_metrics(&self, root: &Path) -> bool {
        self.load_metrics_from(&paths::snapshot_path(root, &self.config.snapshot_path))
    }

    pub fn load_metrics_from(&self, path: &Path) -> bool {
        let data = match io::read_if_exists(path) {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(path = %path.display(), "no health snapshot");
                return false;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read health snapshot");
                return false;
            }
        };
        let snapshot: HealthSnapshot = match serde_json::from_str(&data) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt health snapshot");
                return false;
            }
        };

        let now = self.clock.now();
        let (version, saved_at) = (snapshot.version, snapshot.saved_at);
        let mut state = self.lock();
        state.metrics = snapshot.metrics;
        let mut restored = 0usize;
        for entry in snapshot.cache {
            if entry.expires_at <= now {
                continue;
            }
            state.cache.insert(
                CacheKey {
                    target: entry.target,
                    scope: entry.scope,
                },
                CacheEntry {
                    result: entry.result,
                    cached_at: entry.cached_at,
                    expires_at: entry.expires_at,
                },
            );
            restored += 1;
        }
        for circuit in snapshot.circuits {
            state.circuits.insert(circuit.target.clone(), circuit);
        }
        debug!(
            path = %path.display(),
            version,
            saved_at = ?saved_at,
            restored,
            "loaded health snapshot"
        );
        true
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(max_failures: u32) -> HealthConfig {
        HealthConfig {
            cache_ttl_ms: 1_000,
            max_failures,
            circuit_reset_ms: 5_000,
            ..HealthConfig::default()
        }
    }

    fn monitor(max_failures: u32) -> (HealthMonitor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let monitor = HealthMonitor::with_clock(config(max_failures), clock.clone());
        (monitor, clock)
    }

    async fn probe_ok(m: &HealthMonitor, target: &str, scope: &str, calls: &AtomicU32) -> CheckResult {
        m.check_ide(target, scope, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(true)
        })
        .await
    }

    async fn probe_err(m: &HealthMonitor, target: &str, calls: &AtomicU32) -> CheckResult {
        m.check_ide(target, "/proj", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<bool, _>("spawn cursor ENOENT")
        })
        .await
    }

    #[tokio::test]
    async fn concurrent_misses_each_run_detect() {
        let (m, _clock) = monitor(3);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let detect = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<_, String>(true)
        };

        let (a, b) = tokio::join!(
            m.check_ide("cursor", "/proj", detect),
            m.check_ide("cursor", "/proj", detect)
        );

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(!a.cached && !b.cached);
        assert!(a.detected && b.detected);
        let metrics = m.get_metrics();
        assert_eq!(metrics.metrics.cache_misses, 2);
        assert_eq!(metrics.cache_size, 1);
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_cached() {
        let (m, clock) = monitor(3);
        let calls = AtomicU32::new(0);

        let first = probe_ok(&m, "cursor", "/proj", &calls).await;
        assert!(first.detected);
        assert!(!first.cached);
        assert!(first.duration_ms.is_some());

        clock.advance(Duration::from_millis(999));
        let second = probe_ok(&m, "cursor", "/proj", &calls).await;
        assert!(second.detected);
        assert!(second.cached);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_probes_again_once() {
        let (m, clock) = monitor(3);
        let calls = AtomicU32::new(0);

        probe_ok(&m, "cursor", "/proj", &calls).await;
        clock.advance(Duration::from_millis(1_000));
        let again = probe_ok(&m, "cursor", "/proj", &calls).await;
        assert!(!again.cached);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let third = probe_ok(&m, "cursor", "/proj", &calls).await;
        assert!(third.cached);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_targets_and_scopes_do_not_share_entries() {
        let (m, _clock) = monitor(3);
        let calls = AtomicU32::new(0);

        probe_ok(&m, "cursor", "/a", &calls).await;
        assert!(!probe_ok(&m, "cursor", "/b", &calls).await.cached);
        assert!(!probe_ok(&m, "windsurf", "/a", &calls).await.cached);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_counters_are_per_target() {
        let (m, _clock) = monitor(3);
        let calls = AtomicU32::new(0);

        probe_err(&m, "cursor", &calls).await;
        probe_err(&m, "cursor", &calls).await;
        probe_err(&m, "windsurf", &calls).await;

        assert_eq!(m.get_circuit_state("cursor").failures, 2);
        assert_eq!(m.get_circuit_state("windsurf").failures, 1);
        assert_eq!(m.get_circuit_state("zed"), CircuitState::closed("zed"));
    }

    #[tokio::test]
    async fn circuit_opens_on_exactly_the_nth_failure() {
        let (m, _clock) = monitor(3);
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let r = probe_err(&m, "cursor", &calls).await;
            assert!(!r.detected);
            assert_eq!(r.error.as_deref(), Some("spawn cursor ENOENT"));
        }
        assert!(!m.get_circuit_state("cursor").open);
        assert_eq!(m.get_metrics().metrics.circuit_opens, 0);

        probe_err(&m, "cursor", &calls).await;
        let circuit = m.get_circuit_state("cursor");
        assert!(circuit.open);
        assert_eq!(circuit.last_error.as_deref(), Some("spawn cursor ENOENT"));
        assert_eq!(m.get_metrics().metrics.circuit_opens, 1);

        let r = probe_err(&m, "cursor", &calls).await;
        assert!(r.circuit_open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(m.get_metrics().metrics.circuit_opens, 1);
        assert_eq!(m.get_metrics().metrics.failures, 3);
    }

    #[tokio::test]
    async fn open_circuit_serves_stale_value() {
        let (m, clock) = monitor(1);
        let calls = AtomicU32::new(0);

        probe_ok(&m, "cursor", "/proj", &calls).await;
        clock.advance(Duration::from_millis(1_500));
        probe_err(&m, "cursor", &calls).await;
        assert!(m.get_circuit_state("cursor").open);

        let r = probe_ok(&m, "cursor", "/proj", &calls).await;
        assert!(r.circuit_open);
        assert!(r.detected);
        assert!(r.cached);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let r = probe_ok(&m, "cursor", "/elsewhere", &calls).await;
        assert!(r.circuit_open);
        assert!(!r.detected);
        assert!(!r.cached);
    }

    #[tokio::test]
    async fn circuit_closes_after_cool_down() {
        let (m, clock) = monitor(2);
        let calls = AtomicU32::new(0);

        probe_err(&m, "cursor", &calls).await;
        probe_err(&m, "cursor", &calls).await;
        assert!(m.get_circuit_state("cursor").open);
        assert_eq!(m.get_metrics().open_circuits, 1);

        clock.advance(Duration::from_millis(4_999));
        assert!(m.get_circuit_state("cursor").open);

        clock.advance(Duration::from_millis(1));
        let circuit = m.get_circuit_state("cursor");
        assert!(!circuit.open);
        assert_eq!(circuit.failures, 0);
        assert_eq!(m.get_metrics().open_circuits, 0);

        let r = probe_ok(&m, "cursor", "/proj", &calls).await;
        assert!(r.detected);
        assert!(!r.circuit_open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let (m, _clock) = monitor(3);
        let calls = AtomicU32::new(0);

        probe_err(&m, "cursor", &calls).await;
        probe_err(&m, "cursor", &calls).await;
        probe_ok(&m, "cursor", "/other", &calls).await;
        assert_eq!(m.get_circuit_state("cursor").failures, 0);

        probe_err(&m, "cursor", &calls).await;
        assert!(!m.get_circuit_state("cursor").open);
    }

    #[tokio::test]
    async fn hit_rate_is_formatted_percentage() {
        let (m, _clock) = monitor(3);
        assert_eq!(m.get_metrics().hit_rate, "0.0%");

        let calls = AtomicU32::new(0);
        probe_ok(&m, "cursor", "/proj", &calls).await;
        probe_ok(&m, "cursor", "/proj", &calls).await;

        let metrics = m.get_metrics();
        assert_eq!(metrics.metrics.total_checks, 2);
        assert_eq!(metrics.metrics.cache_hits, 1);
        assert_eq!(metrics.metrics.cache_misses, 1);
        assert_eq!(metrics.hit_rate, "50.0%");
        assert_eq!(metrics.cache_size, 1);

        probe_ok(&m, "cursor", "/proj", &calls).await;
        assert_eq!(m.get_metrics().hit_rate, "66.7%");
    }

    #[tokio::test]
    async fn invalidate_by_scope_target_and_wildcard() {
        let (m, _clock) = monitor(3);
        let calls = AtomicU32::new(0);
        probe_ok(&m, "cursor", "/a", &calls).await;
        probe_ok(&m, "cursor", "/b", &calls).await;
        probe_ok(&m, "windsurf", "/a", &calls).await;

        m.invalidate("cursor", Some("/a"));
        assert_eq!(m.get_metrics().cache_size, 2);
        assert!(!probe_ok(&m, "cursor", "/a", &calls).await.cached);

        m.invalidate("cursor", None);
        assert_eq!(m.get_metrics().cache_size, 1);

        m.invalidate(WILDCARD, None);
        assert_eq!(m.get_metrics().cache_size, 0);
    }

    #[tokio::test]
    async fn invalidate_leaves_circuit_alone() {
        let (m, _clock) = monitor(1);
        let calls = AtomicU32::new(0);
        probe_err(&m, "cursor", &calls).await;
        m.invalidate("cursor", None);
        assert!(m.get_circuit_state("cursor").open);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let (m, _clock) = monitor(1);
        let calls = AtomicU32::new(0);
        probe_ok(&m, "cursor", "/a", &calls).await;
        probe_err(&m, "windsurf", &calls).await;

        m.reset();
        let metrics = m.get_metrics();
        assert_eq!(metrics.metrics, Metrics::default());
        assert_eq!(metrics.cache_size, 0);
        assert_eq!(metrics.open_circuits, 0);
        assert!(!m.get_circuit_state("windsurf").open);
    }

    #[tokio::test]
    async fn snapshot_round_trip_keeps_only_fresh_entries() {
        let dir = TempDir::new().unwrap();
        let (m, clock) = monitor(3);
        let calls = AtomicU32::new(0);

        probe_ok(&m, "cursor", "/old", &calls).await;
        clock.advance(Duration::from_millis(600));
        probe_ok(&m, "cursor", "/new", &calls).await;
        probe_ok(&m, "cursor", "/new", &calls).await;
        clock.advance(Duration::from_millis(600));
        m.save_metrics(dir.path()).unwrap();
        assert!(dir.path().join(".idehealth/cache/health.json").exists());

        let fresh = HealthMonitor::with_clock(config(3), clock.clone());
        assert!(fresh.load_metrics(dir.path()));
        let metrics = fresh.get_metrics();
        assert_eq!(metrics.metrics.total_checks, 3);
        assert_eq!(metrics.metrics.cache_hits, 1);
        assert_eq!(metrics.cache_size, 1);

        let r = probe_ok(&fresh, "cursor", "/new", &calls).await;
        assert!(r.cached);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn snapshot_restores_circuits() {
        let dir = TempDir::new().unwrap();
        let (m, clock) = monitor(1);
        let calls = AtomicU32::new(0);
        probe_err(&m, "cursor", &calls).await;
        m.save_metrics(dir.path()).unwrap();

        let fresh = HealthMonitor::with_clock(config(1), clock.clone());
        assert!(fresh.load_metrics(dir.path()));
        assert!(fresh.get_circuit_state("cursor").open);

        clock.advance(Duration::from_millis(5_000));
        assert!(!fresh.get_circuit_state("cursor").open);
    }

    #[test]
    fn load_missing_snapshot_is_cold_start() {
        let dir = TempDir::new().unwrap();
        let m = HealthMonitor::default();
        assert!(!m.load_metrics(dir.path()));
        assert_eq!(m.get_metrics().metrics.total_checks, 0);
    }

    #[test]
    fn load_corrupt_snapshot_is_cold_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".idehealth/cache/health.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let m = HealthMonitor::default();
        assert!(!m.load_metrics(dir.path()));
        assert_eq!(m.get_metrics().cache_size, 0);
    }

    #[test]
    fn load_ignores_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("health.json");
        std::fs::write(
            &path,
            r#"{
                "version": 7,
                "metrics": {"total_checks": 12, "cache_hits": 4, "future_counter": 9},
                "cache": [],
                "dashboard": {"theme": "dark"}
            }"#,
        )
        .unwrap();

        let m = HealthMonitor::default();
        assert!(m.load_metrics_from(&path));
        let metrics = m.get_metrics();
        assert_eq!(metrics.metrics.total_checks, 12);
        assert_eq!(metrics.hit_rate, "33.3%");
    }

    #[test]
    fn custom_snapshot_path_is_honoured() {
        let dir = TempDir::new().unwrap();
        let m = HealthMonitor::new(HealthConfig {
            snapshot_path: "state/probe.json".into(),
            ..HealthConfig::default()
        });
        m.save_metrics(dir.path()).unwrap();
        assert!(dir.path().join("state/probe.json").exists());
    }
}

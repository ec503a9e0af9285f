use crate::failure::Failure;
use crate::outcome::{RecoveryError, RecoveryOutcome};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// A re-invocable guarded operation.
pub type Operation<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, Failure>> + Send + Sync>;

/// Predicate deciding whether a strategy should act on a failure.
pub type Condition = Arc<dyn Fn(&Failure) -> bool + Send + Sync>;

/// What a strategy knows about the failed call.
pub struct RecoveryContext<T> {
    /// Integration the operation belongs to.
    pub target: String,
    /// Short label for logs, e.g. `"detect"` or `"install-extension"`.
    pub operation_name: Option<String>,
    /// The operation itself, required by [`RetryStrategy`].
    pub operation: Option<Operation<T>>,
}

impl<T: Send + 'static> RecoveryContext<T> {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            operation_name: None,
            operation: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    pub fn with_operation<F, Fut>(mut self, op: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    {
        self.operation = Some(Arc::new(move || op().boxed()));
        self
    }

    pub fn with_shared_operation(mut self, op: Operation<T>) -> Self {
        self.operation = Some(op);
        self
    }

    fn label(&self) -> &str {
        self.operation_name.as_deref().unwrap_or("operation")
    }
}

// ---------------------------------------------------------------------------
// RecoveryStrategy
// ---------------------------------------------------------------------------

/// A policy for responding to a failed operation.
///
/// Implementations never panic on a failing operation and never return an
/// error any other way than through [`RecoveryOutcome::Unrecovered`].
pub trait RecoveryStrategy<T>: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle<'a>(
        &'a self,
        failure: &'a Failure,
        ctx: &'a RecoveryContext<T>,
    ) -> BoxFuture<'a, RecoveryOutcome<T>>;
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Upper bound on retries for timed-out operations.
pub const TIMEOUT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Same delays, at most [`TIMEOUT_MAX_RETRIES`] retries.
    pub fn for_timeouts(&self) -> Self {
        Self {
            max_retries: self.max_retries.min(TIMEOUT_MAX_RETRIES),
            ..self.clone()
        }
    }

    /// Delay before retry `attempt` (1-based): `base * multiplier^(attempt-1)`,
    /// never above `max_delay_ms`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let multiplier = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        let ms = (self.base_delay_ms as f64 * multiplier.powi(exp)).min(self.max_delay_ms as f64);
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

pub struct RetryStrategy {
    config: RetryConfig,
    condition: Option<Condition>,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            condition: None,
        }
    }

    /// Only retry failures the predicate accepts.
    pub fn with_condition(mut self, condition: impl Fn(&Failure) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn should_retry(&self, failure: &Failure) -> bool {
        self.condition.as_ref().map_or(true, |c| c(failure))
    }
}

impl<T: Send + 'static> RecoveryStrategy<T> for RetryStrategy {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn handle<'a>(
        &'a self,
        failure: &'a Failure,
        ctx: &'a RecoveryContext<T>,
    ) -> BoxFuture<'a, RecoveryOutcome<T>> {
        async move {
            let Some(op) = ctx.operation.as_ref() else {
                debug!(target_name = %ctx.target, "no operation to retry");
                return RecoveryOutcome::failed(failure);
            };
            if !self.should_retry(failure) {
                debug!(target_name = %ctx.target, error = %failure, "retry condition rejected failure");
                return RecoveryOutcome::failed(failure);
            }

            let mut last = failure.clone();
            let mut attempts = 1u32;
            for retry in 1..=self.config.max_retries {
                let delay = self.config.delay_for_attempt(retry);
                debug!(
                    target_name = %ctx.target,
                    operation = ctx.label(),
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    error = %last,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempts += 1;
                match op().await {
                    Ok(value) => {
                        debug!(target_name = %ctx.target, attempts, "operation recovered by retry");
                        return RecoveryOutcome::Recovered(value);
                    }
                    Err(e) => {
                        last = e;
                        if !self.should_retry(&last) {
                            break;
                        }
                    }
                }
            }

            warn!(
                target_name = %ctx.target,
                operation = ctx.label(),
                attempts,
                error = %last,
                "operation failed after retries"
            );
            RecoveryOutcome::Unrecovered(RecoveryError::Exhausted {
                attempts,
                last,
                original: failure.clone(),
            })
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

pub type FallbackFn<T> = Arc<
    dyn Fn(&Failure, &RecoveryContext<T>) -> BoxFuture<'static, Result<T, Failure>> + Send + Sync,
>;

pub struct FallbackStrategy<T> {
    fallback: FallbackFn<T>,
    condition: Option<Condition>,
}

impl<T: Send + 'static> FallbackStrategy<T> {
    pub fn new<F, Fut>(fallback: F) -> Self
    where
        F: Fn(&Failure, &RecoveryContext<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    {
        Self {
            fallback: Arc::new(
                move |failure: &Failure, ctx: &RecoveryContext<T>| -> BoxFuture<'static, Result<T, Failure>> {
                    fallback(failure, ctx).boxed()
                },
            ),
            condition: None,
        }
    }

    /// Only fall back for failures the predicate accepts.
    pub fn with_condition(mut self, condition: impl Fn(&Failure) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }
}

impl<T: Send + 'static> RecoveryStrategy<T> for FallbackStrategy<T> {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn handle<'a>(
        &'a self,
        failure: &'a Failure,
        ctx: &'a RecoveryContext<T>,
    ) -> BoxFuture<'a, RecoveryOutcome<T>> {
        async move {
            if let Some(cond) = &self.condition {
                if !cond(failure) {
                    return RecoveryOutcome::failed(failure);
                }
            }
            match (self.fallback)(failure, ctx).await {
                Ok(value) => {
                    debug!(target_name = %ctx.target, error = %failure, "fallback supplied a result");
                    RecoveryOutcome::Recovered(value)
                }
                Err(fallback) => {
                    warn!(target_name = %ctx.target, error = %failure, fallback_error = %fallback, "fallback failed");
                    RecoveryOutcome::Unrecovered(RecoveryError::FallbackFailed {
                        original: failure.clone(),
                        fallback,
                    })
                }
            }
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Abort
// ---------------------------------------------------------------------------

pub type MessageFormatter = Arc<dyn Fn(&Failure) -> String + Send + Sync>;

#[derive(Clone, Default)]
pub struct AbortStrategy {
    formatter: Option<MessageFormatter>,
    exit_code: Option<i32>,
}

impl AbortStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_formatter(mut self, formatter: impl Fn(&Failure) -> String + Send + Sync + 'static) -> Self {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Append an operator hint to the failure message.
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        self.with_formatter(move |f| format!("{f}. {hint}"))
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn format(&self, failure: &Failure) -> String {
        match &self.formatter {
            Some(fmt) => fmt(failure),
            None => failure.to_string(),
        }
    }
}

impl<T: Send + 'static> RecoveryStrategy<T> for AbortStrategy {
    fn name(&self) -> &'static str {
        "abort"
    }

    fn handle<'a>(
        &'a self,
        failure: &'a Failure,
        ctx: &'a RecoveryContext<T>,
    ) -> BoxFuture<'a, RecoveryOutcome<T>> {
        let message = self.format(failure);
        debug!(target_name = %ctx.target, operation = ctx.label(), %message, "aborting");
        futures::future::ready(RecoveryOutcome::Unrecovered(RecoveryError::Aborted {
            message,
            exit_code: self.exit_code,
            original: failure.clone(),
        }))
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Silent
// ---------------------------------------------------------------------------

pub type LogFn<T> = Arc<dyn Fn(&Failure, &RecoveryContext<T>) + Send + Sync>;

/// Swallows the failure and answers with a fixed value.
pub struct SilentStrategy<T> {
    default_value: T,
    log: Option<LogFn<T>>,
}

impl<T: Clone + Send + Sync + 'static> SilentStrategy<T> {
    pub fn new(default_value: T) -> Self {
        Self {
            default_value,
            log: None,
        }
    }

    pub fn with_log(mut self, log: impl Fn(&Failure, &RecoveryContext<T>) + Send + Sync + 'static) -> Self {
        self.log = Some(Arc::new(log));
        self
    }
}

impl<T: Clone + Send + Sync + 'static> RecoveryStrategy<T> for SilentStrategy<T> {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn handle<'a>(
        &'a self,
        failure: &'a Failure,
        ctx: &'a RecoveryContext<T>,
    ) -> BoxFuture<'a, RecoveryOutcome<T>> {
        match &self.log {
            Some(log) => log(failure, ctx),
            None => debug!(target_name = %ctx.target, error = %failure, "suppressed failure"),
        }
        futures::future::ready(RecoveryOutcome::Recovered(self.default_value.clone())).boxed()
    }
}

// ---------------------------------------------------------------------------
// Composite
// ---------------------------------------------------------------------------

/// Tries strategies in order until one recovers.
///
/// When none recover, the first strategy's outcome is returned since it
/// carries the earliest diagnostic.
pub struct CompositeStrategy<T> {
    strategies: Vec<Box<dyn RecoveryStrategy<T>>>,
}

impl<T: Send + 'static> CompositeStrategy<T> {
    pub fn new(strategies: Vec<Box<dyn RecoveryStrategy<T>>>) -> Self {
        Self { strategies }
    }

    pub fn then(mut self, strategy: impl RecoveryStrategy<T> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl<T: Send + 'static> RecoveryStrategy<T> for CompositeStrategy<T> {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn handle<'a>(
        &'a self,
        failure: &'a Failure,
        ctx: &'a RecoveryContext<T>,
    ) -> BoxFuture<'a, RecoveryOutcome<T>> {
        async move {
            let mut first: Option<RecoveryOutcome<T>> = None;
            for strategy in &self.strategies {
                let outcome = strategy.handle(failure, ctx).await;
                if outcome.is_recovered() {
                    debug!(target_name = %ctx.target, strategy = strategy.name(), "composite recovered");
                    return outcome;
                }
                if first.is_none() {
                    first = Some(outcome);
                }
            }
            first.unwrap_or_else(|| RecoveryOutcome::failed(failure))
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

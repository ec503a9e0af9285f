use crate::category::{categorize, ErrorCategory};
use crate::failure::Failure;
use crate::outcome::{RecoveryError, RecoveryOutcome};
use crate::strategy::{
    AbortStrategy, Operation, RecoveryContext, RecoveryStrategy, RetryConfig, RetryStrategy,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// Builds a strategy for one failure. Receives the factory's target name.
pub type StrategyConstructor<T> =
    Arc<dyn Fn(&str) -> Box<dyn RecoveryStrategy<T>> + Send + Sync>;

// ---------------------------------------------------------------------------
// ErrorFactory
// ---------------------------------------------------------------------------

/// Routes failures for one target to the strategy registered for their
/// category.
pub struct ErrorFactory<T> {
    target: String,
    strategies: RwLock<HashMap<ErrorCategory, StrategyConstructor<T>>>,
}

impl<T: Send + 'static> ErrorFactory<T> {
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_retry(target, RetryConfig::default())
    }

    /// Factory with the default strategy table; `retry` drives the network
    /// and timeout retries.
    pub fn with_retry(target: impl Into<String>, retry: RetryConfig) -> Self {
        let factory = Self::without_defaults(target);

        let network = retry.clone();
        factory.register(ErrorCategory::Network, move |_| {
            Box::new(RetryStrategy::new(network.clone()))
        });
        factory.register(ErrorCategory::Filesystem, |target| {
            Box::new(AbortStrategy::new().with_hint(format!(
                "check that {target} is installed and the path exists"
            )))
        });
        factory.register(ErrorCategory::Permission, |target| {
            Box::new(AbortStrategy::new().with_hint(format!("check file permissions for {target}")))
        });
        factory.register(ErrorCategory::Validation, |_| Box::new(AbortStrategy::new()));
        let timeout = retry.for_timeouts();
        factory.register(ErrorCategory::Timeout, move |_| {
            Box::new(RetryStrategy::new(timeout.clone()))
        });
        factory.register(ErrorCategory::Unknown, |_| Box::new(AbortStrategy::new()));
        factory
    }

    /// Factory with an empty strategy table. Unregistered categories abort.
    pub fn without_defaults(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            strategies: RwLock::new(HashMap::new()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Install or replace the strategy for `category`.
    pub fn register<F>(&self, category: ErrorCategory, ctor: F)
    where
        F: Fn(&str) -> Box<dyn RecoveryStrategy<T>> + Send + Sync + 'static,
    {
        let mut strategies = self.strategies.write().unwrap_or_else(|e| e.into_inner());
        strategies.insert(category, Arc::new(ctor));
    }

    pub fn has_strategy(&self, category: ErrorCategory) -> bool {
        self.strategies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&category)
    }

    fn constructor_for(&self, category: ErrorCategory) -> Option<StrategyConstructor<T>> {
        let strategies = self.strategies.read().unwrap_or_else(|e| e.into_inner());
        strategies
            .get(&category)
            .or_else(|| strategies.get(&ErrorCategory::Unknown))
            .cloned()
    }

    /// Categorize `failure` and hand it to the matching strategy. Unrecovered
    /// errors come back wrapped with the target name.
    pub async fn handle_error(
        &self,
        failure: &Failure,
        ctx: &RecoveryContext<T>,
    ) -> RecoveryOutcome<T> {
        let category = categorize(failure);
        let strategy: Box<dyn RecoveryStrategy<T>> = match self.constructor_for(category) {
            Some(ctor) => ctor(&self.target),
            None => Box::new(AbortStrategy::new()),
        };
        debug!(
            target_name = %self.target,
            %category,
            strategy = strategy.name(),
            error = %failure,
            "handling failure"
        );

        match strategy.handle(failure, ctx).await {
            RecoveryOutcome::Recovered(value) => RecoveryOutcome::Recovered(value),
            RecoveryOutcome::Unrecovered(inner) => RecoveryOutcome::Unrecovered(RecoveryError::Target {
                target: self.target.clone(),
                category,
                inner: Box::new(inner),
            }),
        }
    }

    /// Wrap `op` so failures are routed through [`ErrorFactory::handle_error`]
    /// with `op` itself as the operation to retry.
    pub fn wrap<F, Fut>(
        self: &Arc<Self>,
        op: F,
    ) -> impl Fn() -> BoxFuture<'static, Result<T, RecoveryError>> + Send + Sync
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    {
        let factory = Arc::clone(self);
        let op: Operation<T> = Arc::new(move || op().boxed());
        move || {
            let factory = Arc::clone(&factory);
            let op = Arc::clone(&op);
            async move {
                match op().await {
                    Ok(value) => Ok(value),
                    Err(failure) => {
                        let ctx =
                            RecoveryContext::new(factory.target.clone()).with_shared_operation(op);
                        factory.handle_error(&failure, &ctx).await.into_result()
                    }
                }
            }
            .boxed()
        }
    }

    /// Run `op` once under [`ErrorFactory::wrap`].
    pub async fn run<F, Fut>(self: &Arc<Self>, op: F) -> Result<T, RecoveryError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    {
        self.wrap(op)().await
    }
}

// ---------------------------------------------------------------------------
// FactoryRegistry
// ---------------------------------------------------------------------------

/// Owns one [`ErrorFactory`] per target name.
///
/// Repeated lookups of a name return the same instance, so strategies
/// registered on it stay in effect until [`FactoryRegistry::reset`].
pub struct FactoryRegistry<T> {
    factories: Mutex<HashMap<String, Arc<ErrorFactory<T>>>>,
    retry: RetryConfig,
}

impl<T: Send + 'static> FactoryRegistry<T> {
    pub fn new() -> Self {
        Self::with_retry(RetryConfig::default())
    }

    /// Registry whose factories are created with `retry`.
    pub fn with_retry(retry: RetryConfig) -> Self {
        Self {
            factories: Mutex::new(HashMap::new()),
            retry,
        }
    }

    pub fn get(&self, target: &str) -> Arc<ErrorFactory<T>> {
        let mut factories = self.factories.lock().unwrap_or_else(|e| e.into_inner());
        let factory = factories.entry(target.to_string()).or_insert_with(|| {
            debug!(target_name = target, "creating error factory");
            Arc::new(ErrorFactory::with_retry(target, self.retry.clone()))
        });
        Arc::clone(factory)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.factories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(target)
    }

    /// Drop every factory. Later lookups build fresh ones with the default
    /// strategy table.
    pub fn reset(&self) {
        self.factories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.factories.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static> Default for FactoryRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{FallbackStrategy, SilentStrategy};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            backoff_multiplier: 2.0,
            max_delay_ms: 4,
        }
    }

    fn no_op_ctx() -> RecoveryContext<String> {
        RecoveryContext::new("cursor")
    }

    #[test]
    fn defaults_cover_every_category() {
        let factory: ErrorFactory<String> = ErrorFactory::new("cursor");
        for category in ErrorCategory::ALL {
            assert!(factory.has_strategy(category), "missing {category}");
        }
    }

    #[tokio::test]
    async fn unrecovered_error_names_target() {
        let factory: ErrorFactory<String> = ErrorFactory::new("cursor");
        let outcome = factory
            .handle_error(&Failure::new("something odd"), &no_op_ctx())
            .await;
        let err = outcome.error().unwrap();
        assert!(err.to_string().contains("cursor"));
        assert_eq!(err.category(), Some(ErrorCategory::Unknown));
        assert_eq!(err.original().message, "something odd");
    }

    #[tokio::test]
    async fn filesystem_abort_carries_hint() {
        let factory: ErrorFactory<String> = ErrorFactory::new("windsurf");
        let failure = Failure::new("spawn windsurf").with_code("ENOENT");
        let outcome = factory.handle_error(&failure, &no_op_ctx()).await;
        let msg = outcome.error().unwrap().to_string();
        assert!(msg.starts_with("windsurf: "));
        assert!(msg.contains("check that windsurf is installed"));
    }

    #[tokio::test]
    async fn network_error_is_retried() {
        let factory: ErrorFactory<String> = ErrorFactory::with_retry("cursor", fast());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let ctx = RecoveryContext::new("cursor").with_operation(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Failure>("online".to_string())
            }
        });
        let failure = Failure::new("getaddrinfo failed").with_code("ENOTFOUND");
        let outcome = factory.handle_error(&failure, &ctx).await;
        assert_eq!(outcome.result().map(String::as_str), Some("online"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registered_strategy_overrides_default() {
        let factory: ErrorFactory<String> = ErrorFactory::new("cursor");
        factory.register(ErrorCategory::Validation, |_| {
            Box::new(SilentStrategy::new("{}".to_string()))
        });
        let outcome = factory
            .handle_error(&Failure::new("invalid JSON"), &no_op_ctx())
            .await;
        assert_eq!(outcome.result().map(String::as_str), Some("{}"));
    }

    #[tokio::test]
    async fn missing_category_falls_back_to_unknown() {
        let factory: ErrorFactory<String> = ErrorFactory::without_defaults("cursor");
        factory.register(ErrorCategory::Unknown, |target| {
            let target = target.to_string();
            Box::new(FallbackStrategy::new(move |_: &Failure, _: &RecoveryContext<String>| {
                let target = target.clone();
                async move { Ok::<_, Failure>(format!("{target} fallback")) }
            }))
        });
        let failure = Failure::new("denied").with_code("EACCES");
        let outcome = factory.handle_error(&failure, &no_op_ctx()).await;
        assert_eq!(outcome.result().map(String::as_str), Some("cursor fallback"));
    }

    #[tokio::test]
    async fn empty_table_aborts() {
        let factory: ErrorFactory<String> = ErrorFactory::without_defaults("zed");
        let outcome = factory
            .handle_error(&Failure::new("boom"), &no_op_ctx())
            .await;
        assert_eq!(outcome.error().unwrap().to_string(), "zed: boom");
    }

    #[tokio::test]
    async fn wrap_passes_success_through() {
        let factory = Arc::new(ErrorFactory::<u32>::new("cursor"));
        let wrapped = factory.wrap(|| async { Ok(42) });
        assert_eq!(wrapped().await.unwrap(), 42);
        assert_eq!(wrapped().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn wrap_recovers_through_retry() {
        let factory = Arc::new(ErrorFactory::<u32>::with_retry("cursor", fast()));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let wrapped = factory.wrap(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Failure::new("socket hang up").with_code("ECONNRESET"))
                } else {
                    Ok(7)
                }
            }
        });
        assert_eq!(wrapped().await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn wrap_rethrows_enriched_error() {
        let factory = Arc::new(ErrorFactory::<u32>::new("windsurf"));
        let err = factory
            .run(|| async { Err(Failure::new("invalid settings.json")) })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("windsurf: "));
        assert_eq!(err.category(), Some(ErrorCategory::Validation));
    }

    #[test]
    fn registry_returns_same_instance() {
        let registry: FactoryRegistry<String> = FactoryRegistry::new();
        let a = registry.get("cursor");
        let b = registry.get("cursor");
        let c = registry.get("windsurf");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn registry_keeps_registrations_until_reset() {
        let registry: FactoryRegistry<String> = FactoryRegistry::new();
        registry.get("cursor").register(ErrorCategory::Unknown, |_| {
            Box::new(SilentStrategy::new("quiet".to_string()))
        });

        let outcome = registry
            .get("cursor")
            .handle_error(&Failure::new("boom"), &no_op_ctx())
            .await;
        assert!(outcome.is_recovered());
        assert!(!registry
            .get("windsurf")
            .handle_error(&Failure::new("boom"), &no_op_ctx())
            .await
            .is_recovered());

        let before = registry.get("cursor");
        registry.reset();
        assert!(registry.is_empty());
        let after = registry.get("cursor");
        assert!(!Arc::ptr_eq(&before, &after));
        let outcome = after.handle_error(&Failure::new("boom"), &no_op_ctx()).await;
        assert!(!outcome.is_recovered());
    }
}

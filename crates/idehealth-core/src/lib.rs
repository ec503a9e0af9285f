//! Resilience layer for IDE integrations.
//!
//! Two independent pieces:
//!
//! - [`health::HealthMonitor`] caches the outcome of "is this tool
//!   available?" probes per `(target, scope)` and stops probing a target
//!   whose probes keep failing until a cool-down passes.
//! - [`factory::ErrorFactory`] categorizes a failure and applies the
//!   recovery strategy registered for that category (retry, fallback,
//!   abort, silent, or a chain of them).
//!
//! Probes and guarded operations are opaque async closures supplied by the
//! caller.

pub mod category;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod failure;
pub mod health;
pub mod io;
pub mod outcome;
pub mod paths;
pub mod strategy;

pub use category::{categorize, ErrorCategory};
pub use error::{IdeHealthError, Result};
pub use factory::{ErrorFactory, FactoryRegistry};
pub use failure::Failure;
pub use health::{CheckResult, HealthConfig, HealthMonitor};
pub use outcome::{RecoveryError, RecoveryOutcome};
pub use strategy::{RecoveryContext, RecoveryStrategy, RetryConfig};

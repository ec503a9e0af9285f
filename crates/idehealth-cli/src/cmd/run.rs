use super::block_on;
use anyhow::Context;
use idehealth_cli::probe;
use idehealth_core::config::Config;
use idehealth_core::strategy::{
    AbortStrategy, CompositeStrategy, RecoveryStrategy, RetryStrategy, SilentStrategy,
};
use idehealth_core::{ErrorCategory, ErrorFactory, FactoryRegistry};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Exit code used when the shell cannot find the command.
const EXIT_NOT_FOUND: i32 = 127;
/// Exit code used when the command exists but cannot be executed.
const EXIT_NOT_EXECUTABLE: i32 = 126;

/// A guarded command that could not be recovered. `main` exits with `code`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CommandFailed {
    pub message: String,
    pub code: i32,
}

pub fn run(
    root: &Path,
    target: &str,
    command: &[String],
    timeout_ms: Option<u64>,
    or_default: Option<String>,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let registry: FactoryRegistry<String> = FactoryRegistry::with_retry(config.retry.clone());
    let factory = registry.get(target);
    install_exit_codes(&factory);
    if let Some(value) = or_default {
        install_default(&factory, &config, value);
    }

    let command = command.to_vec();
    let timeout = timeout_ms.map(Duration::from_millis);
    let result = block_on(factory.run(move || probe::run_command(command.clone(), timeout)))?;

    match result {
        Ok(stdout) => {
            print!("{stdout}");
            Ok(())
        }
        Err(err) => Err(CommandFailed {
            message: err.to_string(),
            code: err.exit_code().unwrap_or(1),
        }
        .into()),
    }
}

/// Missing and non-executable commands abort with the exit codes a shell
/// would use.
fn install_exit_codes(factory: &ErrorFactory<String>) {
    factory.register(ErrorCategory::Filesystem, |target| {
        Box::new(
            AbortStrategy::new()
                .with_hint(format!("check that {target} is installed and on PATH"))
                .with_exit_code(EXIT_NOT_FOUND),
        )
    });
    factory.register(ErrorCategory::Permission, |target| {
        Box::new(
            AbortStrategy::new()
                .with_hint(format!("check file permissions for {target}"))
                .with_exit_code(EXIT_NOT_EXECUTABLE),
        )
    });
}

/// Print `value` instead of failing. Transient categories still retry first,
/// with the same retry budgets as the default table.
fn install_default(factory: &ErrorFactory<String>, config: &Config, value: String) {
    for category in ErrorCategory::ALL {
        let value = value.clone();
        let retry = match category {
            ErrorCategory::Network => Some(config.retry.clone()),
            ErrorCategory::Timeout => Some(config.retry.for_timeouts()),
            _ => None,
        };
        match retry {
            Some(retry) => factory.register(category, move |_| {
                let chain: Vec<Box<dyn RecoveryStrategy<String>>> = vec![
                    Box::new(RetryStrategy::new(retry.clone())),
                    Box::new(SilentStrategy::new(value.clone())),
                ];
                Box::new(CompositeStrategy::new(chain))
            }),
            None => factory.register(category, move |_| {
                Box::new(SilentStrategy::new(value.clone()))
            }),
        }
    }
}

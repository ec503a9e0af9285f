use crate::error::IdeHealthError;
use crate::failure::{io_error_code, Failure};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Network,
    Filesystem,
    Permission,
    Validation,
    Timeout,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 6] = [
        ErrorCategory::Network,
        ErrorCategory::Filesystem,
        ErrorCategory::Permission,
        ErrorCategory::Validation,
        ErrorCategory::Timeout,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::Filesystem => "FILESYSTEM",
            ErrorCategory::Permission => "PERMISSION",
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = IdeHealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| IdeHealthError::InvalidCategory(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Matching tables
// ---------------------------------------------------------------------------

const NETWORK_CODES: &[&str] = &[
    "ENOTFOUND",
    "ECONNREFUSED",
    "ECONNRESET",
    "ECONNABORTED",
    "EHOSTUNREACH",
    "ENETUNREACH",
    "EAI_AGAIN",
    "EPIPE",
];

const PERMISSION_CODES: &[&str] = &["EACCES", "EPERM"];

static VALIDATION_RE: OnceLock<Regex> = OnceLock::new();
static TIMEOUT_RE: OnceLock<Regex> = OnceLock::new();

fn validation_re() -> &'static Regex {
    VALIDATION_RE.get_or_init(|| {
        Regex::new(r"(?i)\binvalid\b|\bmalformed\b|unexpected token|unexpected end of json").unwrap()
    })
}

fn timeout_re() -> &'static Regex {
    TIMEOUT_RE.get_or_init(|| Regex::new(r"(?i)\btimed?\s?out\b").unwrap())
}

// ---------------------------------------------------------------------------
// Categorization
// ---------------------------------------------------------------------------

/// Map a failure onto its category. Checks run in a fixed order and the
/// first match wins, so a refused connection whose message also says
/// "timed out" is still `Network`.
pub fn categorize(failure: &Failure) -> ErrorCategory {
    let code = failure.code().unwrap_or_default();
    let message = failure.message.as_str();

    if NETWORK_CODES.contains(&code) || message.contains("fetch failed") {
        return ErrorCategory::Network;
    }
    if code == "ENOENT" {
        return ErrorCategory::Filesystem;
    }
    if PERMISSION_CODES.contains(&code) {
        return ErrorCategory::Permission;
    }
    if code == "EINVAL" || validation_re().is_match(message) {
        return ErrorCategory::Validation;
    }
    if code == "ETIMEDOUT" || timeout_re().is_match(message) {
        return ErrorCategory::Timeout;
    }
    ErrorCategory::Unknown
}

/// Categorize an arbitrary error by walking its source chain for an io
/// error that carries a kind, falling back to the top-level message.
pub fn categorize_error(err: &(dyn std::error::Error + 'static)) -> ErrorCategory {
    let mut code = None;
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = cur {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            code = io_error_code(io);
            break;
        }
        cur = e.source();
    }
    let mut failure = Failure::new(err.to_string());
    failure.code = code.map(str::to_string);
    categorize(&failure)
}

use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const IDEHEALTH_DIR: &str = ".idehealth";
pub const CONFIG_FILE: &str = ".idehealth/config.yaml";
pub const DEFAULT_SNAPSHOT_FILE: &str = ".idehealth/cache/health.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn idehealth_dir(root: &Path) -> PathBuf {
    root.join(IDEHEALTH_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve the snapshot location. `relative` comes from config and is
/// joined onto the project root.
pub fn snapshot_path(root: &Path, relative: &str) -> PathBuf {
    root.join(relative)
}

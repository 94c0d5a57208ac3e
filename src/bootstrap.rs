//! Bootstrap helpers for safelink.
//!
//! Env vars can be supplied through `./.env` and `~/.safelink/.env`
//! (standard dotenvy format) in addition to the process environment.

use std::path::{Path, PathBuf};

/// safelink's home directory: `~/.safelink`.
pub fn safelink_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".safelink")
}

/// Path to the safelink-specific `.env` file: `~/.safelink/.env`.
pub fn safelink_env_path() -> PathBuf {
    safelink_home().join(".env")
}

/// Load `./.env`, then `~/.safelink/.env`.
///
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.safelink/.env`
pub fn load_safelink_env() {
    let _ = dotenvy::dotenv();
    load_env_file(&safelink_env_path());
}

/// Load one env file if it exists. Parse errors are reported, not fatal.
pub fn load_env_file(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match dotenvy::from_path(path) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Warning: failed to load {}: {}", path.display(), e);
            false
        }
    }
}

// this_file: crates/rasterhub-dispatch/src/discovery.rs

//! Locating the `rasterhub` backend binary.
//!
//! Search order:
//! 1. the explicit override (`RASTERHUB_BIN` or [`DispatchConfig::binary`])
//! 2. build outputs relative to the working directory
//! 3. `rasterhub` on `PATH`

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::config::{self, BIN_ENV};

/// Executable name searched on `PATH`.
pub const BINARY_NAME: &str = "rasterhub";

/// Build outputs checked relative to the working directory, in order.
pub const RELATIVE_CANDIDATES: &[&str] = &[
    "target/release/rasterhub",
    "external/rasterhub/target/release/rasterhub",
];

fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn with_exe_suffix(path: PathBuf) -> PathBuf {
    if cfg!(windows) && path.extension().is_none() {
        path.with_extension("exe")
    } else {
        path
    }
}

/// Pure resolution over explicit inputs, so tests need not touch the process environment.
pub fn resolve_binary(
    override_path: Option<&Path>,
    cwd: &Path,
    path_var: Option<&OsStr>,
) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if is_executable_file(path) {
            return Some(path.to_path_buf());
        }
        log::warn!(
            "{} points at {}, which is not an executable file",
            BIN_ENV,
            path.display()
        );
    }

    for relative in RELATIVE_CANDIDATES {
        let candidate = with_exe_suffix(cwd.join(relative));
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }

    let path_var = path_var?;
    std::env::split_paths(path_var)
        .map(|dir| with_exe_suffix(dir.join(BINARY_NAME)))
        .find(|candidate| is_executable_file(candidate))
}

/// Resolve the backend binary using the global configuration and environment.
pub fn find_binary() -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let path_var = std::env::var_os("PATH");
    resolve_binary(
        config::global().binary.as_deref(),
        &cwd,
        path_var.as_deref(),
    )
}

/// Every location [`find_binary`] looks at, for error messages.
pub fn searched_locations() -> Vec<String> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut out = vec![format!(
        "{} environment variable: {}",
        BIN_ENV,
        std::env::var(BIN_ENV).unwrap_or_else(|_| "not set".to_string())
    )];
    out.extend(
        RELATIVE_CANDIDATES
            .iter()
            .map(|rel| cwd.join(rel).display().to_string()),
    );
    out.push(format!("{BINARY_NAME} on PATH"));
    out
}

//! Path sandboxing for local filesystem and terminal tools.
//!
//! Rejects traversal, dangling symlinks and anything outside the configured
//! base directories before a local tool touches the disk.

use crate::{HiveError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Sandbox configuration for local tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSecurityConfig {
    /// Allowed base directories. Empty vec = allow all (dev mode fallback).
    #[serde(default)]
    pub allowed_base_dirs: Vec<PathBuf>,

    /// Directory relative paths are resolved against.
    #[serde(default = "default_working_dir")]
    pub default_working_dir: PathBuf,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for PathSecurityConfig {
    fn default() -> Self {
        Self {
            allowed_base_dirs: Vec::new(),
            default_working_dir: default_working_dir(),
        }
    }
}

/// Resolve an optional working directory, falling back to the default.
///
/// The default goes through the same sandbox checks as an explicit path.
pub fn resolve_working_dir(working_dir: Option<&str>, config: &PathSecurityConfig) -> Result<PathBuf> {
    match working_dir {
        Some(d) if !d.trim().is_empty() => resolve_path(d, config),
        // "." resolves to `default_working_dir` itself
        _ => resolve_path(".", config),
    }
}

/// Validate and resolve a path a local tool wants to touch.
///
/// - Rejects empty paths and `..` components
/// - Resolves relative paths against `default_working_dir`
/// - Rejects dangling symbolic links
/// - Canonicalizes the path (or its parent when it does not exist yet)
/// - Checks the result is under an allowed base directory
pub fn resolve_path(raw: &str, config: &PathSecurityConfig) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        return Err(HiveError::Validation("path must not be empty".into()));
    }

    let path = Path::new(raw);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(HiveError::Validation(format!(
            "Path '{}' contains '..' components which are not allowed",
            raw
        )));
    }

    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        config.default_working_dir.join(path)
    };

    if path
        .symlink_metadata()
        .map(|m| m.is_symlink())
        .unwrap_or(false)
        && !path.exists()
    {
        return Err(HiveError::Validation(format!(
            "Path '{}' is a dangling symbolic link",
            raw
        )));
    }

    let canonical = if path.exists() {
        path.canonicalize().map_err(|e| {
            HiveError::Validation(format!("Failed to resolve path '{}': {}", raw, e))
        })?
    } else {
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) if parent.exists() => {
                let canonical_parent = parent.canonicalize().map_err(|e| {
                    HiveError::Validation(format!("Failed to resolve parent of '{}': {}", raw, e))
                })?;
                canonical_parent.join(name)
            }
            _ => {
                return Err(HiveError::Validation(format!(
                    "Parent directory of '{}' does not exist",
                    raw
                )));
            }
        }
    };

    if !config.allowed_base_dirs.is_empty() {
        let is_under_allowed = config.allowed_base_dirs.iter().any(|base| {
            let canonical_base = base.canonicalize().unwrap_or_else(|_| base.clone());
            canonical.starts_with(&canonical_base)
        });

        if !is_under_allowed {
            return Err(HiveError::Validation(format!(
                "Path '{}' is not under any allowed base directory. Allowed: {:?}",
                raw,
                config
                    .allowed_base_dirs
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
            )));
        }
    }

    Ok(canonical)
}

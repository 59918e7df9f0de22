//! Configuration for the coordinator.
//!
//! # Security Features
//!
//! - Config file permission validation on Unix systems
//! - Rejects world-readable files that carry upstream secrets
//! - Local tools are sandboxed by `[workspace]`

use hive_common::security::PathSecurityConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Main coordinator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Heartbeat staleness policy
    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Sandbox for filesystem and terminal tools
    #[serde(default)]
    pub workspace: PathSecurityConfig,

    /// `run_in_terminal` settings
    #[serde(default)]
    pub terminal: TerminalConfig,

    /// Tool classification overrides
    #[serde(default)]
    pub tools: ToolsConfig,

    /// External MCP servers whose tools are proxied
    #[serde(default)]
    pub upstream: Vec<UpstreamServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Heartbeat age after which an agent is considered offline
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,

    /// Period of the background liveness sweep
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_staleness_secs() -> u64 {
    90
}

fn default_sweep_interval_secs() -> u64 {
    15
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl LivenessConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Commands `run_in_terminal` may launch
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Kill the command after this many seconds
    #[serde(default = "default_terminal_timeout")]
    pub timeout_secs: u64,
}

fn default_terminal_timeout() -> u64 {
    30
}

/// Built-in command whitelist for `run_in_terminal`.
pub fn default_allowed_commands() -> Vec<String> {
    [
        // Build tools
        "cargo", "npm", "yarn", "pnpm", "make", "cmake",
        // Version control
        "git",
        // Languages/runtimes
        "python", "python3", "node", "deno", "bun", "rustc",
        // Testing
        "pytest", "jest", "vitest",
        // Utilities (read-only / safe)
        "ls", "cat", "head", "tail", "grep", "find", "tree", "wc", "diff", "which", "whoami",
        "pwd", "env", "echo",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            timeout_secs: default_terminal_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Extra tool-name patterns tagged local-only. A trailing `*` matches by
    /// prefix.
    #[serde(default)]
    pub local_only: Vec<String>,
}

/// An external MCP server spawned over stdio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamServerConfig {
    /// Name used in logs
    pub name: String,

    /// Command to spawn
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for the child process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl UpstreamServerConfig {
    /// Whether any env var looks like a credential.
    pub fn has_secrets(&self) -> bool {
        self.env.keys().any(|k| {
            let upper = k.to_ascii_uppercase();
            upper.contains("KEY") || upper.contains("TOKEN") || upper.contains("SECRET")
        })
    }
}

impl CoordinatorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Security
    ///
    /// On Unix systems, this function validates that:
    /// - The file is a regular file (not a symlink)
    /// - The file is not world-writable
    /// - The file is not world-readable if upstream env carries secrets
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = Self::from_file_unchecked(path)?;

        #[cfg(unix)]
        validate_config_file_permissions(path, config.has_secrets())?;

        if config.has_secrets() {
            warn!(
                "Upstream credentials found in config file '{}'. Prefer passing them \
                 through the coordinator's own environment.",
                path.display()
            );
        }

        Ok(config)
    }

    /// Load configuration from a TOML file without permission checks.
    ///
    /// Use this only for testing or when you've already validated the file.
    pub fn from_file_unchecked(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn has_secrets(&self) -> bool {
        self.upstream.iter().any(UpstreamServerConfig::has_secrets)
    }
}

/// Validate config file permissions on Unix systems.
///
/// Requirements:
/// - File must be a regular file (not symlink, directory, etc.)
/// - File must not be world-writable (mode & 0o002 == 0)
/// - If the file holds secrets, it must not be world-readable
#[cfg(unix)]
fn validate_config_file_permissions(path: &std::path::Path, has_secrets: bool) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). \
             This is a security risk. Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if has_secrets && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains upstream credentials but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.liveness.staleness(), Duration::from_secs(90));
        assert_eq!(config.liveness.sweep_interval(), Duration::from_secs(15));
        assert!(config.terminal.allowed_commands.contains(&"git".to_string()));
        assert!(config.upstream.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config = CoordinatorConfig::from_toml_str(
            r#"
            [liveness]
            staleness_secs = 30
            sweep_interval_secs = 5

            [workspace]
            allowed_base_dirs = ["/srv/work"]
            default_working_dir = "/srv/work"

            [terminal]
            allowed_commands = ["cargo"]
            timeout_secs = 10

            [tools]
            local_only = ["fs_*"]

            [[upstream]]
            name = "docs"
            command = "npx"
            args = ["-y", "@upstash/context7-mcp"]
            "#,
        )
        .unwrap();

        assert_eq!(config.liveness.staleness_secs, 30);
        assert_eq!(config.workspace.allowed_base_dirs.len(), 1);
        assert_eq!(config.terminal.allowed_commands, vec!["cargo".to_string()]);
        assert_eq!(config.tools.local_only, vec!["fs_*".to_string()]);
        assert_eq!(config.upstream[0].args.len(), 2);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = CoordinatorConfig::from_toml_str("[liveness]\nstaleness_secs = 5\n").unwrap();
        assert_eq!(config.liveness.staleness_secs, 5);
        assert_eq!(config.liveness.sweep_interval_secs, 15);
        assert_eq!(config.terminal.timeout_secs, 30);
    }

    #[test]
    fn test_zero_sweep_interval_is_clamped() {
        let liveness = LivenessConfig {
            staleness_secs: 1,
            sweep_interval_secs: 0,
        };
        assert_eq!(liveness.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_secret_detection() {
        let mut upstream = UpstreamServerConfig {
            name: "docs".into(),
            command: "docs-mcp".into(),
            args: vec![],
            env: HashMap::new(),
        };
        assert!(!upstream.has_secrets());
        upstream.env.insert("DOCS_API_KEY".into(), "abc".into());
        assert!(upstream.has_secrets());
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_world_writable_file() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[liveness]\nstaleness_secs = 5").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o666)).unwrap();

        let err = CoordinatorConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-writable"));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_world_readable_secrets() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[upstream]]\nname = \"x\"\ncommand = \"x\"\nenv = {{ X_TOKEN = \"t\" }}"
        )
        .unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(CoordinatorConfig::from_file(file.path()).is_err());

        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
        assert!(CoordinatorConfig::from_file(file.path()).is_ok());
    }
}

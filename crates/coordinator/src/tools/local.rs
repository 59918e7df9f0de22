//! Local-only tools: filesystem, editor and terminal access on the
//! coordinator's host.
//!
//! Every path goes through the `[workspace]` sandbox, and terminal commands
//! must be on the configured whitelist.

use super::{parse_args, schema_of, ToolCategory, ToolDescriptor, ToolEntry, ToolHandler, ToolVisibility};
use crate::config::TerminalConfig;
use async_trait::async_trait;
use hive_common::security::{resolve_path, resolve_working_dir, PathSecurityConfig};
use hive_common::{HiveError, Result};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Largest file `read_file` returns.
const MAX_READ_BYTES: u64 = 1024 * 1024;

/// Per-stream cap on captured terminal output.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileRequest {
    /// File to read, absolute or relative to the workspace
    pub path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileRequest {
    /// File to write, absolute or relative to the workspace
    pub path: String,
    /// New file contents
    pub content: String,
    /// Append instead of replacing the file
    #[serde(default)]
    pub append: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFileRequest {
    /// File to create; must not exist yet
    pub path: String,
    /// Initial contents
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunInTerminalRequest {
    /// Executable to run (must be whitelisted)
    pub command: String,
    /// Arguments, passed without a shell
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory (defaults to the workspace)
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// Settings shared by the local tools.
#[derive(Debug, Clone, Default)]
pub struct LocalToolSettings {
    pub workspace: PathSecurityConfig,
    pub terminal: TerminalConfig,
}

/// Validates that a command is in the whitelist.
pub fn validate_command(command: &str, allowed: &[String]) -> Result<()> {
    let base_cmd = Path::new(command)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(command);

    if !base_cmd.is_empty() && allowed.iter().any(|c| c == base_cmd) {
        Ok(())
    } else {
        warn!(command = %command, base_cmd = %base_cmd, "Command not in whitelist");
        Err(HiveError::Validation(format!(
            "Command '{}' is not allowed. Only whitelisted commands can be executed.",
            base_cmd
        )))
    }
}

fn truncate_output(bytes: &[u8]) -> (String, bool) {
    let truncated = bytes.len() > MAX_OUTPUT_BYTES;
    let slice = &bytes[..bytes.len().min(MAX_OUTPUT_BYTES)];
    (String::from_utf8_lossy(slice).into_owned(), truncated)
}

fn io_failure(action: &str, path: &Path, err: std::io::Error) -> HiveError {
    HiveError::Tool(format!("Failed to {} '{}': {}", action, path.display(), err))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalTool {
    ReadFile,
    WriteFile,
    VscodeCreateFile,
    RunInTerminal,
}

impl LocalTool {
    pub const ALL: [LocalTool; 4] = [
        Self::ReadFile,
        Self::WriteFile,
        Self::VscodeCreateFile,
        Self::RunInTerminal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::VscodeCreateFile => "vscode_create_file",
            Self::RunInTerminal => "run_in_terminal",
        }
    }

    pub fn descriptor(self) -> ToolDescriptor {
        let (description, schema) = match self {
            Self::ReadFile => ("Read a UTF-8 file from the workspace", schema_of::<ReadFileRequest>()),
            Self::WriteFile => ("Write or append to a file in the workspace", schema_of::<WriteFileRequest>()),
            Self::VscodeCreateFile => (
                "Create a new file in the editor workspace",
                schema_of::<CreateFileRequest>(),
            ),
            Self::RunInTerminal => (
                "Run a whitelisted command in the workspace and capture its output",
                schema_of::<RunInTerminalRequest>(),
            ),
        };
        ToolDescriptor::new(
            self.name(),
            description,
            schema,
            ToolVisibility::LocalOnly,
            ToolCategory::Local,
        )
    }
}

pub struct LocalHandler {
    tool: LocalTool,
    settings: Arc<LocalToolSettings>,
}

impl LocalHandler {
    pub fn new(tool: LocalTool, settings: Arc<LocalToolSettings>) -> Self {
        Self { tool, settings }
    }

    async fn read_file(&self, req: ReadFileRequest) -> Result<Value> {
        let path = resolve_path(&req.path, &self.settings.workspace)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_failure("stat", &path, e))?;
        if !metadata.is_file() {
            return Err(HiveError::Validation(format!("'{}' is not a file", req.path)));
        }
        if metadata.len() > MAX_READ_BYTES {
            return Err(HiveError::Validation(format!(
                "'{}' is {} bytes, larger than the {} byte limit",
                req.path,
                metadata.len(),
                MAX_READ_BYTES
            )));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_failure("read", &path, e))?;
        debug!(path = %path.display(), bytes = content.len(), "read_file");
        Ok(json!({
            "path": path.display().to_string(),
            "size": content.len(),
            "content": content,
        }))
    }

    async fn write_file(&self, req: WriteFileRequest) -> Result<Value> {
        let path = resolve_path(&req.path, &self.settings.workspace)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .append(req.append)
            .truncate(!req.append)
            .open(&path)
            .await
            .map_err(|e| io_failure("open", &path, e))?;
        file.write_all(req.content.as_bytes())
            .await
            .map_err(|e| io_failure("write", &path, e))?;
        file.flush().await.map_err(|e| io_failure("flush", &path, e))?;

        info!(path = %path.display(), bytes = req.content.len(), append = req.append, "write_file");
        Ok(json!({
            "path": path.display().to_string(),
            "bytes_written": req.content.len(),
        }))
    }

    async fn create_file(&self, req: CreateFileRequest) -> Result<Value> {
        let path = resolve_path(&req.path, &self.settings.workspace)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| io_failure("create", &path, e))?;
        file.write_all(req.content.as_bytes())
            .await
            .map_err(|e| io_failure("write", &path, e))?;
        file.flush().await.map_err(|e| io_failure("flush", &path, e))?;

        info!(path = %path.display(), "vscode_create_file");
        Ok(json!({
            "path": path.display().to_string(),
            "created": true,
        }))
    }

    async fn run_in_terminal(&self, req: RunInTerminalRequest) -> Result<Value> {
        let terminal = &self.settings.terminal;
        validate_command(&req.command, &terminal.allowed_commands)?;
        let working_dir = resolve_working_dir(req.working_dir.as_deref(), &self.settings.workspace)?;

        info!(
            command = %req.command,
            args = ?req.args,
            working_dir = %working_dir.display(),
            "run_in_terminal"
        );

        let child = Command::new(&req.command)
            .args(&req.args)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HiveError::Tool(format!("Failed to spawn '{}': {}", req.command, e)))?;

        let timeout = Duration::from_secs(terminal.timeout_secs.max(1));
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output
                .map_err(|e| HiveError::Tool(format!("Failed to run '{}': {}", req.command, e)))?,
            Err(_) => {
                warn!(command = %req.command, timeout_secs = timeout.as_secs(), "Command timed out");
                return Err(HiveError::Tool(format!(
                    "Command '{}' timed out after {}s",
                    req.command,
                    timeout.as_secs()
                )));
            }
        };

        let (stdout, stdout_truncated) = truncate_output(&output.stdout);
        let (stderr, stderr_truncated) = truncate_output(&output.stderr);
        Ok(json!({
            "exit_code": output.status.code(),
            "success": output.status.success(),
            "stdout": stdout,
            "stderr": stderr,
            "truncated": stdout_truncated || stderr_truncated,
        }))
    }
}

#[async_trait]
impl ToolHandler for LocalHandler {
    async fn call(&self, arguments: Value) -> Result<Value> {
        let name = self.tool.name();
        match self.tool {
            LocalTool::ReadFile => self.read_file(parse_args(name, arguments)?).await,
            LocalTool::WriteFile => self.write_file(parse_args(name, arguments)?).await,
            LocalTool::VscodeCreateFile => self.create_file(parse_args(name, arguments)?).await,
            LocalTool::RunInTerminal => self.run_in_terminal(parse_args(name, arguments)?).await,
        }
    }
}

/// Catalogue entries for every local tool.
pub fn local_tools(settings: LocalToolSettings) -> Vec<ToolEntry> {
    let settings = Arc::new(settings);
    LocalTool::ALL
        .into_iter()
        .map(|tool| {
            ToolEntry::new(
                tool.descriptor(),
                Arc::new(LocalHandler::new(tool, settings.clone())),
            )
        })
        .collect()
}

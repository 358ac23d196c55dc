use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::errors::{ToolError, ToolOutput};
use crate::models::tool::{Tool, ToolCall};
use crate::toolkit::Toolkit;

const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 30;
const MAX_SEARCH_MATCHES: usize = 100;

/// Local development tools: file read/write, directory listing, shell
/// execution and text search. Implementations are deliberately plain I/O
/// glue; the interesting behavior lives in the loop driving them.
pub struct DeveloperToolkit {
    tools: Vec<Tool>,
    root: PathBuf,
}

impl DeveloperToolkit {
    pub fn new() -> Self {
        Self::with_root(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn with_root(root: PathBuf) -> Self {
        let read_file = Tool::new(
            "read_file",
            "Read the contents of a text file.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute path, or relative to the working directory."
                    }
                }
            }),
        );

        let write_file = Tool::new(
            "write_file",
            "Write a file, or replace text inside one. With only `content`, \
             the file is created or overwritten. With `old_str`, the unique \
             occurrence of `old_str` is replaced by `content` instead.",
            json!({
                "type": "object",
                "required": ["path", "content"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute path, or relative to the working directory."
                    },
                    "content": {
                        "type": "string",
                        "description": "The full file contents, or the replacement text."
                    },
                    "old_str": {
                        "type": "string",
                        "default": null,
                        "description": "Exact text to replace. Must occur exactly once in the file."
                    }
                }
            }),
        );

        let list_directory = Tool::new(
            "list_directory",
            "List the entries of a directory. Directories carry a trailing slash.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute path, or relative to the working directory."
                    }
                }
            }),
        );

        let shell = Tool::new(
            "shell",
            "Run a command in a bash shell and return its interleaved output. \
             Commands are killed after the timeout expires. Set `background` \
             to start a long-lived process without waiting for it.",
            json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The bash command to run."
                    },
                    "timeout_seconds": {
                        "type": "integer",
                        "default": DEFAULT_SHELL_TIMEOUT_SECS,
                        "description": "Seconds to wait before the command is force-terminated."
                    },
                    "background": {
                        "type": "boolean",
                        "default": false,
                        "description": "Spawn detached and return immediately."
                    }
                }
            }),
        );

        let search_files = Tool::new(
            "search_files",
            "Search files under a directory for a regex pattern, returning \
             path:line matches. Hidden directories and build output are skipped.",
            json!({
                "type": "object",
                "required": ["pattern"],
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regular expression to search for."
                    },
                    "path": {
                        "type": "string",
                        "default": ".",
                        "description": "Directory to search. Defaults to the working directory."
                    }
                }
            }),
        );

        Self {
            tools: vec![read_file, write_file, list_directory, shell, search_files],
            root,
        }
    }

    fn resolve_path(&self, path_str: &str) -> PathBuf {
        let path = Path::new(path_str);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
        params
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidParameters(format!("Missing '{}' parameter", key)))
    }

    async fn read_file(&self, params: &Value) -> ToolOutput {
        let path = self.resolve_path(Self::require_str(params, "path")?);
        if !path.is_file() {
            return Err(ToolError::ExecutionError(format!(
                "file not found: {}",
                path.display()
            )));
        }
        std::fs::read_to_string(&path)
            .map_err(|e| ToolError::ExecutionError(format!("failed to read file: {}", e)))
    }

    async fn write_file(&self, params: &Value) -> ToolOutput {
        let path = self.resolve_path(Self::require_str(params, "path")?);
        let content = Self::require_str(params, "content")?;

        if let Some(old_str) = params.get("old_str").and_then(|v| v.as_str()) {
            let existing = std::fs::read_to_string(&path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ToolError::ExecutionError(format!("file not found: {}", path.display()))
                } else {
                    ToolError::ExecutionError(format!("failed to read file: {}", e))
                }
            })?;
            match existing.matches(old_str).count() {
                0 => {
                    return Err(ToolError::ExecutionError(
                        "text not found in file; no replacement made".into(),
                    ))
                }
                1 => {}
                n => {
                    return Err(ToolError::ExecutionError(format!(
                        "text not unique in file ({} occurrences); no replacement made",
                        n
                    )))
                }
            }
            let updated = existing.replacen(old_str, content, 1);
            std::fs::write(&path, updated)
                .map_err(|e| ToolError::ExecutionError(format!("failed to write file: {}", e)))?;
            return Ok(format!("Replaced text in {}", path.display()));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ToolError::ExecutionError(format!("failed to create directories: {}", e))
            })?;
        }
        std::fs::write(&path, content)
            .map_err(|e| ToolError::ExecutionError(format!("failed to write file: {}", e)))?;
        Ok(format!("Wrote {} bytes to {}", content.len(), path.display()))
    }

    async fn list_directory(&self, params: &Value) -> ToolOutput {
        let path = self.resolve_path(Self::require_str(params, "path")?);
        if !path.exists() {
            return Err(ToolError::ExecutionError(format!(
                "directory not found: {}",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(ToolError::ExecutionError(format!(
                "{} is not a directory",
                path.display()
            )));
        }

        let mut entries = Vec::new();
        let read = std::fs::read_dir(&path)
            .map_err(|e| ToolError::ExecutionError(format!("failed to list directory: {}", e)))?;
        for entry in read.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() {
                entries.push(format!("{}/", name));
            } else {
                entries.push(name);
            }
        }
        entries.sort();
        Ok(entries.join("\n"))
    }

    async fn shell(&self, params: &Value) -> ToolOutput {
        let command = Self::require_str(params, "command")?;
        let background = params
            .get("background")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let timeout_secs = params
            .get("timeout_seconds")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_SHELL_TIMEOUT_SECS);

        if background {
            // Fire and forget: nothing tracks or waits on this afterward.
            let child = tokio::process::Command::new("bash")
                .arg("-c")
                .arg(command)
                .current_dir(&self.root)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| ToolError::ExecutionError(e.to_string()))?;
            let pid = child.id().unwrap_or_default();
            return Ok(format!("Started background process (pid {})", pid));
        }

        // Interleave stderr into stdout so the model sees one transcript.
        // The group redirect covers every command in the script, not just
        // the last one.
        let child = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(format!("{{ {} ; }} 2>&1", command))
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionError(e.to_string()))?;

        // Dropping the future on expiry kills the child via kill_on_drop.
        let output = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ToolError::Timeout(timeout_secs))?
        .map_err(|e| ToolError::ExecutionError(e.to_string()))?;

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            return Err(ToolError::ExecutionError(format!(
                "command exited with {}: {}",
                output.status, text
            )));
        }
        Ok(text)
    }

    async fn search_files(&self, params: &Value) -> ToolOutput {
        let pattern = Self::require_str(params, "pattern")?;
        let path = self.resolve_path(
            params
                .get("path")
                .and_then(|v| v.as_str())
                .unwrap_or("."),
        );
        let regex = Regex::new(pattern)
            .map_err(|e| ToolError::InvalidParameters(format!("invalid pattern: {}", e)))?;

        if !path.is_dir() {
            return Err(ToolError::ExecutionError(format!(
                "directory not found: {}",
                path.display()
            )));
        }

        let mut matches = Vec::new();
        search_dir(&path, &regex, &mut matches);
        if matches.is_empty() {
            return Err(ToolError::ExecutionError(format!(
                "no matches for pattern '{}' under {}",
                pattern,
                path.display()
            )));
        }
        matches.truncate(MAX_SEARCH_MATCHES);
        Ok(matches.join("\n"))
    }
}

impl Default for DeveloperToolkit {
    fn default() -> Self {
        Self::new()
    }
}

fn search_dir(dir: &Path, regex: &Regex, matches: &mut Vec<String>) {
    if matches.len() >= MAX_SEARCH_MATCHES {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || name == "target" || name == "node_modules" {
            continue;
        }
        if path.is_dir() {
            search_dir(&path, regex, matches);
        } else if let Ok(content) = std::fs::read_to_string(&path) {
            for (line_number, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(format!("{}:{}: {}", path.display(), line_number + 1, line));
                    if matches.len() >= MAX_SEARCH_MATCHES {
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Toolkit for DeveloperToolkit {
    fn name(&self) -> &str {
        "developer"
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: &ToolCall) -> ToolOutput {
        match tool_call.name.as_str() {
            "read_file" => self.read_file(&tool_call.arguments).await,
            "write_file" => self.write_file(&tool_call.arguments).await,
            "list_directory" => self.list_directory(&tool_call.arguments).await,
            "shell" => self.shell(&tool_call.arguments).await,
            "search_files" => self.search_files(&tool_call.arguments).await,
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}

//! Ties a parsed `ToolKind` to its implementation, and selects the tool
//! set offered to the LLM for a given agent role (§4.9, §4.11).

use std::path::{Path, PathBuf};

use am_domain::tool::ToolDefinition;

use crate::kind::ToolKind;
use crate::{exec, file_ops, task};

pub struct ToolExecutor {
    http: reqwest::Client,
    api_base: String,
}

impl ToolExecutor {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }

    /// Parse and run a tool call, always returning a plain string — the
    /// tool boundary never propagates an error type.
    pub async fn execute(&self, worktree_path: &Path, tool_name: &str, arguments: &serde_json::Value) -> String {
        let kind = match ToolKind::parse(tool_name, arguments) {
            Ok(k) => k,
            Err(e) => return e,
        };

        match kind {
            ToolKind::ReadFile { path } => file_ops::read_file(worktree_path, &path).await,
            ToolKind::WriteFile { path, content } => file_ops::write_file(worktree_path, &path, &content).await,
            ToolKind::ListFiles { path } => file_ops::list_files(worktree_path, &path).await,
            ToolKind::RunCommand { command } => exec::run_command(worktree_path, &command).await,
            ToolKind::CreateTask(args) => task::create_task(&self.http, &self.api_base, &args).await,
        }
    }
}

/// Tool selection per role (§4.9): `task-creator` gets the single
/// task-creation tool, any other role with a worktree gets the file and
/// shell tools, and a role with no worktree gets none — the LLM can
/// only produce text.
pub fn tool_definitions_for_role(role: &str, worktree_path: Option<&PathBuf>) -> Vec<ToolDefinition> {
    if role == "task-creator" {
        return vec![create_task_definition()];
    }
    if worktree_path.is_some() {
        return vec![
            read_file_definition(),
            write_file_definition(),
            list_files_definition(),
            run_command_definition(),
        ];
    }
    Vec::new()
}

fn read_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: "read_file".into(),
        description: "Read the contents of a file relative to the worktree root.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"],
        }),
    }
}

fn write_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: "write_file".into(),
        description: "Write (creating or overwriting) a file relative to the worktree root.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" },
            },
            "required": ["path", "content"],
        }),
    }
}

fn list_files_definition() -> ToolDefinition {
    ToolDefinition {
        name: "list_files".into(),
        description: "List entries of a directory relative to the worktree root.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string", "default": "." } },
        }),
    }
}

fn run_command_definition() -> ToolDefinition {
    ToolDefinition {
        name: "run_command".into(),
        description: "Run a shell command with the worktree root as its working directory. Times out after 60 seconds.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": { "command": { "type": "string" } },
            "required": ["command"],
        }),
    }
}

fn create_task_definition() -> ToolDefinition {
    ToolDefinition {
        name: "create_task".into(),
        description: "Create a task in the adjacent task tracker.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "description": { "type": "string" },
                "priority": { "type": "integer", "default": 50 },
                "tags": { "type": "array", "items": { "type": "string" } },
                "project": { "type": "string" },
                "estimated_hours": { "type": "number" },
            },
            "required": ["title", "description"],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_creator_gets_only_create_task() {
        let defs = tool_definitions_for_role("task-creator", None);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "create_task");
    }

    #[test]
    fn worktree_role_gets_file_and_shell_tools() {
        let defs = tool_definitions_for_role("implementer", Some(&PathBuf::from("/tmp/x")));
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "write_file", "list_files", "run_command"]);
    }

    #[test]
    fn no_worktree_and_not_task_creator_gets_nothing() {
        let defs = tool_definitions_for_role("reviewer", None);
        assert!(defs.is_empty());
    }
}

//! Tool dispatch as a closed, tagged-variant enum (§9 redesign item)
//! rather than a string-keyed table: a tool call with an unknown name
//! simply fails to parse into a `ToolKind` — there is no code path that
//! can reach an "unregistered tool" case at dispatch time.

use serde_json::Value;

use crate::task::CreateTaskArgs;

#[derive(Debug, Clone)]
pub enum ToolKind {
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    ListFiles { path: String },
    RunCommand { command: String },
    CreateTask(CreateTaskArgs),
}

impl ToolKind {
    /// Parse a `(tool_name, arguments)` tool call into its variant.
    /// Returns `Err` with a tool-boundary-formatted message on an
    /// unknown name or malformed arguments — callers should return this
    /// string directly as the tool result rather than erroring the loop.
    pub fn parse(tool_name: &str, arguments: &Value) -> Result<Self, String> {
        match tool_name {
            "read_file" => Ok(ToolKind::ReadFile {
                path: string_field(arguments, "path")?,
            }),
            "write_file" => Ok(ToolKind::WriteFile {
                path: string_field(arguments, "path")?,
                content: string_field(arguments, "content")?,
            }),
            "list_files" => Ok(ToolKind::ListFiles {
                path: arguments
                    .get("path")
                    .and_then(|v| v.as_str())
                    .unwrap_or(".")
                    .to_string(),
            }),
            "run_command" => Ok(ToolKind::RunCommand {
                command: string_field(arguments, "command")?,
            }),
            "create_task" => {
                let args: CreateTaskArgs = serde_json::from_value(arguments.clone())
                    .map_err(|e| format!("Error: invalid create_task arguments: {e}"))?;
                Ok(ToolKind::CreateTask(args))
            }
            other => Err(format!("Error: unknown tool '{other}'")),
        }
    }
}

fn string_field(arguments: &Value, field: &str) -> Result<String, String> {
    arguments
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("Error: missing required field '{field}'"))
}

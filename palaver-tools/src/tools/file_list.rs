use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::tools::base::Tool;

#[derive(Deserialize)]
struct ListDirectoryInput {
    #[serde(default = "default_path")]
    path: String,
}

fn default_path() -> String {
    ".".to_string()
}

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List the entries of a directory, one per line"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: current directory)"
                }
            }
        })
    }

    async fn execute(
        &self,
        _ctx: ExecutionContext,
        input: serde_json::Value,
    ) -> Result<String, ToolError> {
        let input: ListDirectoryInput = serde_json::from_value(input)
            .map_err(|e| ToolError::ValidationError(e.to_string()))?;

        let mut entries = fs::read_dir(&input.path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{}: {}", input.path, e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?
        {
            let mut name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();

        if names.is_empty() {
            return Ok("(empty directory)".to_string());
        }
        Ok(names.join("\n"))
    }
}

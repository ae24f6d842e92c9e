use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::tools::base::Tool;

pub const MAX_READ_CHARS: usize = 50_000;

#[derive(Deserialize)]
struct ReadFileInput {
    path: String,
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file from the filesystem"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file to read"}
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        _ctx: ExecutionContext,
        input: serde_json::Value,
    ) -> Result<String, ToolError> {
        let input: ReadFileInput = serde_json::from_value(input)
            .map_err(|e| ToolError::ValidationError(e.to_string()))?;

        let metadata = fs::metadata(&input.path).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("{}: {}", input.path, e))
        })?;
        if metadata.is_dir() {
            return Err(ToolError::ValidationError(format!(
                "Path is a directory: {}",
                input.path
            )));
        }

        let bytes = fs::read(&input.path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{}: {}", input.path, e)))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| ToolError::ValidationError("Invalid UTF-8".into()))?;

        let mut chars = content.char_indices();
        match chars.nth(MAX_READ_CHARS) {
            Some((cut, _)) => Ok(format!("{}\n... (file truncated)", &content[..cut])),
            None => Ok(content),
        }
    }
}

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tokio::fs;
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::tools::base::Tool;

#[derive(Deserialize)]
struct WriteFileInput {
    path: String,
    content: String,
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file (creates parent directories if needed)"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file"},
                "content": {"type": "string", "description": "Content to write"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(
        &self,
        _ctx: ExecutionContext,
        input: serde_json::Value,
    ) -> Result<String, ToolError> {
        let input: WriteFileInput = serde_json::from_value(input)
            .map_err(|e| ToolError::ValidationError(e.to_string()))?;

        if let Some(parent) = Path::new(&input.path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
            }
        }

        fs::write(&input.path, input.content.as_bytes())
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        Ok(format!(
            "Wrote {} characters to {}",
            input.content.chars().count(),
            input.path
        ))
    }
}

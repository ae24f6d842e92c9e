use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use async_trait::async_trait;

/// A capability the model can call by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema of the arguments object.
    fn schema(&self) -> serde_json::Value;

    /// Clearance step run by the dispatcher before the timed execution.
    /// May block on a person, so it is never subject to the tool timeout.
    async fn authorize(&self, _input: &serde_json::Value) -> Result<(), ToolError> {
        Ok(())
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        input: serde_json::Value,
    ) -> Result<String, ToolError>;
}

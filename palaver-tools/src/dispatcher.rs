use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::registry::ToolRegistryImpl;

/// Executes registered tools and turns every outcome into a string.
///
/// `execute` never fails: unknown tools, handler errors, panics and timeouts
/// all come back as text the model can read and react to.
pub struct ToolDispatcherImpl {
    registry: Arc<ToolRegistryImpl>,
    timeout_ms: u64,
}

impl ToolDispatcherImpl {
    pub fn new(registry: Arc<ToolRegistryImpl>, timeout_ms: u64) -> Self {
        Self {
            registry,
            timeout_ms,
        }
    }

    pub fn registry(&self) -> &ToolRegistryImpl {
        &self.registry
    }

    pub fn schemas(&self) -> Vec<serde_json::Value> {
        self.registry.schemas()
    }

    pub async fn execute(
        &self,
        conversation_id: &str,
        tool_name: &str,
        input: serde_json::Value,
    ) -> String {
        info!("Dispatching tool: {} for conversation: {}", tool_name, conversation_id);

        let Some(tool) = self.registry.get(tool_name) else {
            warn!("Unknown tool requested: {}", tool_name);
            return format!("Error: Unknown tool '{}'", tool_name);
        };

        if let Err(e) = tool.authorize(&input).await {
            warn!("Tool {} not authorized: {}", tool_name, e);
            return format!("Error executing {}: {}", tool_name, e);
        }

        let ctx = ExecutionContext::new(conversation_id.to_string(), self.timeout_ms);
        let started = Instant::now();

        let result = self.execute_with_protection(tool, ctx, input).await;
        debug!("Tool {} finished in {:?}", tool_name, started.elapsed());

        match result {
            Ok(output) => output,
            Err(e) => {
                warn!("Tool {} failed: {}", tool_name, e);
                format!("Error executing {}: {}", tool_name, e)
            }
        }
    }

    async fn execute_with_protection(
        &self,
        tool: Arc<dyn crate::tools::Tool>,
        ctx: ExecutionContext,
        input: serde_json::Value,
    ) -> Result<String, ToolError> {
        let timeout_ms = ctx.timeout_ms;

        // Spawn task to isolate panics
        let handle = tokio::spawn(async move { tool.execute(ctx, input).await });
        let abort = handle.abort_handle();

        match timeout(Duration::from_millis(timeout_ms), handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!("Tool execution panicked");
                    Err(ToolError::ExecutionFailed("tool panicked".into()))
                } else {
                    error!("Tool execution cancelled");
                    Err(ToolError::Internal)
                }
            }
            Err(_) => {
                abort.abort();
                warn!("Tool execution timed out after {}ms", timeout_ms);
                Err(ToolError::Timeout)
            }
        }
    }
}

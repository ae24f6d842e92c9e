/// Per-call context handed to a tool.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub conversation_id: String,
    pub timeout_ms: u64,
}

impl ExecutionContext {
    pub fn new(conversation_id: String, timeout_ms: u64) -> Self {
        Self {
            conversation_id,
            timeout_ms,
        }
    }
}

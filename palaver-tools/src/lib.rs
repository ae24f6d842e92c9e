pub mod dispatcher;
pub mod error;
pub mod execution_context;
pub mod registry;
pub mod tools;

pub use dispatcher::ToolDispatcherImpl;
pub use error::ToolError;
pub use execution_context::ExecutionContext;
pub use registry::ToolRegistryImpl;
pub use tools::Tool;

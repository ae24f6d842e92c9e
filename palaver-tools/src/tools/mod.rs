pub mod base;
pub mod file_list;
pub mod file_read;
pub mod file_write;
pub mod shell_exec;

pub use base::Tool;
pub use file_list::ListDirectoryTool;
pub use file_read::ReadFileTool;
pub use file_write::WriteFileTool;
pub use shell_exec::RunCommandTool;

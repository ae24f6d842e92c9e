pub mod conversation_log;
pub mod permission_gate;
pub mod turn_serializer;

pub use conversation_log::{ConversationLog, ConversationLogError};
pub use permission_gate::{
    ApprovalDecision, ApproveAll, Approver, DenyAll, PermissionError, PermissionGate,
    PermissionRecord, DEFAULT_SAFE_COMMANDS,
};
pub use turn_serializer::{LockError, TurnGuard, TurnSerializer};

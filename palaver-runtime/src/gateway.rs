//! Conversation id composition for front-ends.

use crate::interfaces::RuntimeError;

/// Build the conversation id `"{session_prefix}:{channel}:{user_id}"`.
///
/// # Errors
/// Returns `ConfigError` if any part is empty.
pub fn conversation_id(
    session_prefix: &str,
    channel: &str,
    user_id: &str,
) -> Result<String, RuntimeError> {
    if session_prefix.is_empty() || channel.is_empty() || user_id.is_empty() {
        return Err(RuntimeError::ConfigError(
            "session_prefix, channel and user_id must be non-empty".to_string(),
        ));
    }

    Ok(format!("{}:{}:{}", session_prefix, channel, user_id))
}

//! Repairs a loaded history before a new turn starts.

use crate::types::{Message, Role};
use std::collections::HashSet;

/// Drops the trailing, unanswered part of the history.
///
/// Removes trailing assistant messages whose tool calls never got answers, and
/// a trailing exchange where only some of the calls were answered. Everything
/// before the last complete exchange is kept as is.
pub fn sanitize(mut messages: Vec<Message>) -> Vec<Message> {
    loop {
        let Some(last) = messages.last() else {
            break;
        };

        if last.has_tool_calls() {
            messages.pop();
            continue;
        }

        if last.role != Role::Tool {
            break;
        }

        match incomplete_exchange_start(&messages) {
            Some(start) => messages.truncate(start),
            None => break,
        }
    }
    messages
}

/// Index of the assistant message opening a trailing exchange that is missing
/// answers, if there is one.
fn incomplete_exchange_start(messages: &[Message]) -> Option<usize> {
    let start = messages.iter().rposition(|m| m.role != Role::Tool)?;
    let opener = &messages[start];
    if !opener.has_tool_calls() {
        return None;
    }

    let answered: HashSet<&str> = messages[start + 1..]
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    let complete = opener
        .tool_calls
        .iter()
        .all(|call| answered.contains(call.id.as_str()));

    if complete {
        None
    } else {
        Some(start)
    }
}

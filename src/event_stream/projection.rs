//! Folds the event log into display-oriented messages.

use serde::{Deserialize, Serialize};

use super::events::{Event, EventPayload};
use crate::types::{ContentPart, Role, ToolCall};

/// Projected conversation message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub is_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub timestamp: i64,
}

impl Message {
    fn new(role: Role, content: String, message_id: Option<String>, timestamp: i64) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            thinking: None,
            is_streaming: false,
            message_id,
            timestamp,
        }
    }
}

/// Build the message view of an event history.
///
/// Streaming fragments sharing a `message_id` are merged into one assistant
/// message; the final `assistant_message` replaces the accumulated text and
/// clears `is_streaming`.
pub fn project_messages(events: &[Event]) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::new();

    for event in events {
        match &event.payload {
            EventPayload::UserMessage(user) => messages.push(Message::new(
                Role::User,
                join_text(&user.content),
                None,
                event.timestamp,
            )),
            EventPayload::AssistantStreamingMessage(chunk) => {
                let message = assistant_slot(&mut messages, &chunk.message_id, event.timestamp);
                message.content.push_str(&chunk.content);
                message.is_streaming = !chunk.is_complete;
            }
            EventPayload::AssistantStreamingThinkingMessage(chunk) => {
                let message = assistant_slot(&mut messages, &chunk.message_id, event.timestamp);
                message
                    .thinking
                    .get_or_insert_with(String::new)
                    .push_str(&chunk.content);
                message.is_streaming = !chunk.is_complete;
            }
            EventPayload::AssistantThinkingMessage(thinking) => {
                let message =
                    assistant_slot(&mut messages, &thinking.message_id, event.timestamp);
                message.thinking = Some(thinking.content.clone());
            }
            EventPayload::AssistantMessage(final_message) => {
                let message =
                    assistant_slot(&mut messages, &final_message.message_id, event.timestamp);
                message.content = final_message.content.clone();
                message.tool_calls = final_message.tool_calls.clone();
                if let Some(reasoning) = &final_message.reasoning_content {
                    message.thinking = Some(reasoning.clone());
                }
                message.is_streaming = false;
            }
            EventPayload::ToolResult(result) => {
                let content = match &result.error {
                    Some(error) => error.clone(),
                    None => join_text(&ContentPart::from_json_content(&result.content)),
                };
                messages.push(Message::new(
                    Role::Tool,
                    content,
                    Some(result.tool_call_id.clone()),
                    event.timestamp,
                ));
            }
            _ => {}
        }
    }

    messages
}

fn assistant_slot<'a>(
    messages: &'a mut Vec<Message>,
    message_id: &str,
    timestamp: i64,
) -> &'a mut Message {
    let position = messages.iter().rposition(|message| {
        message.role == Role::Assistant && message.message_id.as_deref() == Some(message_id)
    });
    match position {
        Some(index) => &mut messages[index],
        None => {
            messages.push(Message::new(
                Role::Assistant,
                String::new(),
                Some(message_id.to_string()),
                timestamp,
            ));
            let last = messages.len() - 1;
            &mut messages[last]
        }
    }
}

fn join_text(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

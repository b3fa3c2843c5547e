//! Rebuild provider messages from the event log.

use crate::engine::ToolCallEngine;
use crate::event_stream::{Event, EventPayload, ToolResult};
use crate::types::{ContentPart, ModelMessage, Role};

/// Text standing in for screenshots older than the image budget.
pub const OMITTED_IMAGE_PLACEHOLDER: &str = "[screenshot omitted]";

struct Entry {
    message: ModelMessage,
    environment: bool,
}

/// Fold `events` into the conversation sent to the model.
///
/// Assistant turns and tool results go through the engine's historical
/// builders. Only the newest `max_images` environment screenshots keep their
/// image parts.
pub fn build_history(
    events: &[Event],
    engine: &dyn ToolCallEngine,
    max_images: usize,
) -> Vec<ModelMessage> {
    let mut entries: Vec<Entry> = Vec::new();
    let mut pending: Vec<ToolResult> = Vec::new();

    let flush = |entries: &mut Vec<Entry>, pending: &mut Vec<ToolResult>| {
        if pending.is_empty() {
            return;
        }
        entries.extend(
            engine
                .build_historical_tool_call_result_messages(pending)
                .into_iter()
                .map(|message| Entry {
                    message,
                    environment: false,
                }),
        );
        pending.clear();
    };

    for event in events {
        match &event.payload {
            EventPayload::ToolResult(result) => pending.push(result.clone()),
            EventPayload::UserMessage(user) => {
                flush(&mut entries, &mut pending);
                entries.push(Entry {
                    message: ModelMessage::with_parts(Role::User, user.content.clone()),
                    environment: false,
                });
            }
            EventPayload::AssistantMessage(message) => {
                flush(&mut entries, &mut pending);
                entries.push(Entry {
                    message: engine.build_historical_assistant_message(message),
                    environment: false,
                });
            }
            EventPayload::EnvironmentInput(input) => {
                flush(&mut entries, &mut pending);
                let mut content = Vec::with_capacity(input.content.len() + 1);
                if let Some(description) = &input.description {
                    content.push(ContentPart::text(description.clone()));
                }
                content.extend(input.content.iter().cloned());
                entries.push(Entry {
                    message: ModelMessage::with_parts(Role::User, content),
                    environment: true,
                });
            }
            _ => {}
        }
    }
    flush(&mut entries, &mut pending);

    limit_environment_images(&mut entries, max_images);
    entries.into_iter().map(|entry| entry.message).collect()
}

fn limit_environment_images(entries: &mut [Entry], max_images: usize) {
    let mut kept = 0;
    for entry in entries.iter_mut().rev().filter(|entry| entry.environment) {
        for part in entry.message.content.iter_mut().rev() {
            if matches!(part, ContentPart::Image(_)) {
                if kept < max_images {
                    kept += 1;
                } else {
                    *part = ContentPart::text(OMITTED_IMAGE_PLACEHOLDER);
                }
            }
        }
    }
}

//! Message types for model communication.

use serde::{Deserialize, Serialize};

/// A message in the provider-facing conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ModelMessage {
    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_parts(Role::System, vec![ContentPart::text(text)])
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_parts(Role::User, vec![ContentPart::text(text)])
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_parts(Role::Assistant, vec![ContentPart::text(text)])
    }

    /// Create a message from arbitrary content parts.
    pub fn with_parts(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            name: None,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: serde_json::Value,
        is_error: bool,
    ) -> Self {
        Self::with_parts(
            Role::Tool,
            vec![ContentPart::ToolResult(ToolResultPart {
                tool_call_id: tool_call_id.into(),
                content,
                is_error,
            })],
        )
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract tool calls from this message.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .collect()
    }

    /// Number of image parts carried by this message.
    pub fn image_count(&self) -> usize {
        self.content
            .iter()
            .filter(|part| matches!(part, ContentPart::Image(_)))
            .count()
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image(ImageContent),
    ToolCall(ToolCall),
    ToolResult(ToolResultPart),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Convert a JSON content value into parts.
    ///
    /// Arrays of `{"type": "text"}` / `{"type": "image_url"}` objects are mapped
    /// part by part; strings become one text part; anything else is rendered
    /// as pretty-printed JSON.
    pub fn from_json_content(value: &serde_json::Value) -> Vec<ContentPart> {
        match value {
            serde_json::Value::String(text) => vec![ContentPart::text(text.clone())],
            serde_json::Value::Array(items) if items.iter().all(is_part_object) => items
                .iter()
                .filter_map(|item| match item.get("type").and_then(|t| t.as_str()) {
                    Some("text") => item
                        .get("text")
                        .and_then(|t| t.as_str())
                        .map(ContentPart::text),
                    Some("image_url") => item
                        .get("image_url")
                        .and_then(|img| img.get("url"))
                        .and_then(|url| url.as_str())
                        .map(|url| ContentPart::Image(ImageContent::from_url(url))),
                    _ => None,
                })
                .collect(),
            serde_json::Value::Null => Vec::new(),
            other => vec![ContentPart::text(
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
            )],
        }
    }
}

fn is_part_object(value: &serde_json::Value) -> bool {
    matches!(
        value.get("type").and_then(|t| t.as_str()),
        Some("text") | Some("image_url")
    )
}

/// Image content embedded in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    /// Base64 payload (without the data-URL prefix) or a remote URL.
    pub data: String,
    pub mime_type: String,
}

impl ImageContent {
    pub fn base64(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` URL; other URLs are kept verbatim.
    pub fn from_url(url: &str) -> Self {
        if let Some(rest) = url.strip_prefix("data:") {
            if let Some((mime, payload)) = rest.split_once(";base64,") {
                return Self::base64(payload, mime);
            }
        }
        Self {
            data: url.to_string(),
            mime_type: String::new(),
        }
    }

    /// Render as a URL suitable for `image_url` payloads.
    pub fn to_url(&self) -> String {
        if self.mime_type.is_empty() {
            self.data.clone()
        } else {
            format!("data:{};base64,{}", self.mime_type, self.data)
        }
    }
}

/// A tool call requested by the model.
///
/// `arguments` holds the raw JSON text; it is parsed by the dispatcher so
/// malformed arguments surface as a tool result error, not a stream failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse `arguments` as JSON. Blank arguments are treated as `{}`.
    pub fn arguments_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        let trimmed = self.arguments.trim();
        if trimmed.is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(trimmed)
    }
}

/// A tool execution result as replayed to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultPart {
    pub tool_call_id: String,
    pub content: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

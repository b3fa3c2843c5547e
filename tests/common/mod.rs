//! Shared test helpers and mock provider.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use tarko::error::TarkoError;
use tarko::event_stream::{EventStream, EventType};
use tarko::provider::{ChunkStream, ModelProvider, ProviderRequest};
use tarko::tools::{FunctionTool, ToolParameters};
use tarko::types::*;

/// One scripted model turn.
pub enum Turn {
    Chunks(Vec<ChatCompletionChunk>),
    /// Chunks delivered after a delay.
    Delayed(Duration, Vec<ChatCompletionChunk>),
    /// `create_chat_completion` itself fails.
    Fail(String),
    /// The stream yields chunks, then an error.
    StreamError(Vec<ChatCompletionChunk>, String),
    /// The stream never produces anything.
    Hang,
}

/// A mock provider that replays scripted turns.
pub struct MockProvider {
    model_id: String,
    turns: Mutex<VecDeque<Turn>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            turns: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, turn: Turn) {
        self.turns.lock().unwrap().push_back(turn);
    }

    /// Queue a text response split into a few chunks.
    pub fn queue_text(&self, text: &str) {
        let mid = text
            .char_indices()
            .map(|(i, _)| i)
            .nth(text.chars().count() / 2)
            .unwrap_or(0);
        let (head, tail) = text.split_at(mid);
        let mut chunks = Vec::new();
        for part in [head, tail] {
            if !part.is_empty() {
                chunks.push(ChatCompletionChunk::text(part));
            }
        }
        chunks.push(ChatCompletionChunk::finish(FinishReason::Stop));
        self.queue(Turn::Chunks(chunks));
    }

    /// Queue a native tool call streamed in two fragments.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        let args = args.to_string();
        let (head, tail) = args.split_at(args.len() / 2);
        self.queue(Turn::Chunks(vec![
            ChatCompletionChunk::tool_call(ToolCallDelta {
                index: 0,
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: Some(head.to_string()),
            }),
            ChatCompletionChunk::tool_call(ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments: Some(tail.to_string()),
            }),
            ChatCompletionChunk::finish(FinishReason::ToolCalls),
        ]));
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn create_chat_completion(
        &self,
        request: &ProviderRequest,
        _cancel: CancellationToken,
    ) -> Result<ChunkStream, TarkoError> {
        self.requests.lock().unwrap().push(request.clone());
        let turn = self.turns.lock().unwrap().pop_front();
        let turn = turn.unwrap_or_else(|| {
            Turn::Chunks(vec![
                ChatCompletionChunk::text("Mock response"),
                ChatCompletionChunk::finish(FinishReason::Stop),
            ])
        });
        match turn {
            Turn::Chunks(chunks) => Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed()),
            Turn::Delayed(delay, chunks) => Ok(async_stream::stream! {
                tokio::time::sleep(delay).await;
                for chunk in chunks {
                    yield Ok::<_, TarkoError>(chunk);
                }
            }
            .boxed()),
            Turn::Fail(message) => Err(TarkoError::provider("mock", message)),
            Turn::StreamError(chunks, message) => Ok(async_stream::stream! {
                for chunk in chunks {
                    yield Ok(chunk);
                }
                yield Err(TarkoError::Stream(message));
            }
            .boxed()),
            Turn::Hang => Ok(futures::stream::pending::<Result<ChatCompletionChunk, TarkoError>>().boxed()),
        }
    }
}

pub fn mock_provider() -> Arc<MockProvider> {
    Arc::new(MockProvider::new("mock-model"))
}

/// A tool that echoes its arguments.
pub fn echo_tool(name: &str) -> FunctionTool {
    FunctionTool::new(name, "Echo the arguments", ToolParameters::empty(), |args, _| async move {
        Ok(args.into_inner())
    })
}

/// A tool that sleeps, then succeeds or fails.
pub fn sleepy_tool(name: &str, delay: Duration, fail_with: Option<&str>) -> FunctionTool {
    let tool_name = name.to_string();
    let fail_with = fail_with.map(str::to_string);
    FunctionTool::new(name, "Sleep then answer", ToolParameters::empty(), move |_, _| {
        let tool_name = tool_name.clone();
        let fail_with = fail_with.clone();
        async move {
            tokio::time::sleep(delay).await;
            match fail_with {
                Some(message) => Err(TarkoError::tool(tool_name, message)),
                None => Ok(serde_json::json!("done")),
            }
        }
    })
}

/// Poll until an event of `event_type` is recorded.
pub async fn wait_for_event(events: &EventStream, event_type: EventType) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while events.get_events_by_type(&[event_type]).is_empty() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("event was not emitted in time");
}

/// Poll until the provider has received `count` requests.
pub async fn wait_for_requests(provider: &MockProvider, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while provider.requests().len() < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("provider was not called in time");
}

pub fn event_types(events: &EventStream) -> Vec<EventType> {
    events.get_events().iter().map(|e| e.event_type()).collect()
}

//! Run controller behavior end to end with a scripted provider.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pretty_assertions::assert_eq;

use common::{
    event_types, mock_provider, sleepy_tool, wait_for_event, wait_for_requests, MockProvider, Turn,
};
use tarko::agent::{Agent, AgentHooks, AgentStatus, HookContext, RunOptions};
use tarko::error::TarkoError;
use tarko::event_stream::{project_messages, EventPayload, EventType};
use tarko::tools::{
    DynamicTool, DynamicToolProvider, Tool, ToolArguments, ToolExecutionContext, ToolParameters,
};
use tarko::types::{ChatCompletionChunk, FinishReason, Role};

fn agent_with(provider: Arc<MockProvider>) -> Agent {
    Agent::builder()
        .with_provider(provider)
        .with_instructions("You are a test agent.")
        .build()
        .unwrap()
}

fn scoped(tool: impl Tool + 'static) -> Vec<Arc<dyn Tool>> {
    let tool: Arc<dyn Tool> = Arc::new(tool);
    vec![tool]
}

fn assert_overlay_cleared(agent: &Agent, name: &str) {
    let registry = agent.dispatcher().registry();
    assert!(!registry.has_execution_tools());
    assert!(registry.get_tool(name).is_none());
    assert_eq!(registry.tool_names(), agent.tools().tool_names());
}

#[tokio::test]
async fn plain_answer_returns_to_idle() {
    let provider = mock_provider();
    provider.queue_text("Hello there");
    let agent = agent_with(provider.clone());

    let message = agent.run("hi").await.unwrap();
    assert_eq!(message.content, "Hello there");
    assert_eq!(message.finish_reason, FinishReason::Stop);
    assert_eq!(agent.status(), AgentStatus::Idle);

    let request = &provider.requests()[0];
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[1].text(), "hi");
    assert!(!request.stream);
}

#[tokio::test]
async fn second_run_is_rejected_while_executing() {
    let provider = mock_provider();
    provider.queue(Turn::Hang);
    let agent = agent_with(provider);

    let first = tokio::spawn(agent.run("slow"));
    let err = agent.run("again").await.unwrap_err();
    assert!(matches!(err, TarkoError::AlreadyExecuting));
    assert_eq!(err.to_string(), "Agent is already executing a task");
    assert_eq!(agent.status(), AgentStatus::Executing);

    assert!(agent.abort());
    let message = first.await.unwrap().unwrap();
    assert_eq!(message.finish_reason, FinishReason::Abort);
}

#[tokio::test]
async fn abort_is_synchronous_and_terminal() {
    let provider = mock_provider();
    provider.queue(Turn::Hang);
    let agent = agent_with(provider.clone());

    let run = tokio::spawn(agent.run("wait forever"));
    wait_for_event(agent.event_stream(), EventType::UserMessage).await;

    assert!(agent.abort());
    assert_eq!(agent.status(), AgentStatus::Aborted);
    assert!(agent.abort());

    let message = run.await.unwrap().unwrap();
    assert_eq!(message.content, "Request was aborted");
    assert_eq!(message.finish_reason, FinishReason::Abort);
    assert_eq!(agent.status(), AgentStatus::Aborted);
    assert!(!agent.abort());

    provider.queue_text("fresh start");
    let message = agent.run("again").await.unwrap();
    assert_eq!(message.content, "fresh start");
    assert_eq!(agent.status(), AgentStatus::Idle);
}

#[tokio::test]
async fn native_tool_round_trip_records_events_in_order() {
    let provider = mock_provider();
    provider.queue_tool_call("call_1", "echo", serde_json::json!({"value": 42}));
    provider.queue_text("The value is 42.");
    let agent = agent_with(provider.clone());
    agent.register_tool(Arc::new(common::echo_tool("echo")));

    let message = agent.run("echo 42").await.unwrap();
    assert_eq!(message.content, "The value is 42.");

    assert_eq!(
        event_types(agent.event_stream()),
        vec![
            EventType::AgentRunStart,
            EventType::UserMessage,
            EventType::AssistantMessage,
            EventType::ToolCall,
            EventType::ToolResult,
            EventType::AssistantMessage,
            EventType::AgentRunEnd,
        ]
    );
    let results = agent.event_stream().get_events_by_type(&[EventType::ToolResult]);
    match &results[0].payload {
        EventPayload::ToolResult(result) => {
            assert_eq!(result.content, serde_json::json!({"value": 42}));
            assert!(result.error.is_none());
            assert!(result.elapsed_ms >= 1);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let second = &provider.requests()[1];
    let roles: Vec<Role> = second.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
    assert_eq!(second.tools.as_ref().map(Vec::len), Some(1));
}

#[tokio::test]
async fn missing_tool_is_reported_and_run_continues() {
    let provider = mock_provider();
    provider.queue_tool_call("call_1", "ghost", serde_json::json!({}));
    provider.queue_text("Sorry.");
    let agent = agent_with(provider);

    let message = agent.run("use ghost").await.unwrap();
    assert_eq!(message.content, "Sorry.");
    let results = agent.event_stream().get_events_by_type(&[EventType::ToolResult]);
    match &results[0].payload {
        EventPayload::ToolResult(result) => {
            assert_eq!(result.error.as_deref(), Some("Tool \"ghost\" not found"));
            assert_eq!(result.elapsed_ms, 0);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn late_tool_failure_reports_real_elapsed_time() {
    let provider = mock_provider();
    provider.queue_tool_call("call_1", "flaky", serde_json::json!({}));
    provider.queue_text("It failed.");
    let agent = agent_with(provider);
    agent.register_tool(Arc::new(sleepy_tool(
        "flaky",
        Duration::from_millis(30),
        Some("backend exploded"),
    )));

    agent.run("try it").await.unwrap();
    let results = agent.event_stream().get_events_by_type(&[EventType::ToolResult]);
    match &results[0].payload {
        EventPayload::ToolResult(result) => {
            assert_eq!(result.error.as_deref(), Some("backend exploded"));
            assert!(result.elapsed_ms >= 30, "elapsed {}", result.elapsed_ms);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn run_scoped_tools_are_cleared_after_success() {
    let provider = mock_provider();
    provider.queue_tool_call("call_1", "scoped", serde_json::json!({}));
    provider.queue_text("done");
    let agent = agent_with(provider);

    let options = RunOptions::new("go").with_tools(scoped(common::echo_tool("scoped")));
    let message = agent.run(options).await.unwrap();
    assert_eq!(message.content, "done");

    let results = agent.event_stream().get_events_by_type(&[EventType::ToolResult]);
    match &results[0].payload {
        EventPayload::ToolResult(result) => assert!(result.error.is_none()),
        other => panic!("unexpected payload {other:?}"),
    }
    assert_overlay_cleared(&agent, "scoped");
}

#[tokio::test]
async fn run_scoped_tools_are_cleared_after_provider_error() {
    let provider = mock_provider();
    provider.queue(Turn::Fail("rate limited".into()));
    let agent = agent_with(provider.clone());

    let options = RunOptions::new("go").with_tools(scoped(common::echo_tool("scoped")));
    let message = agent.run(options).await.unwrap();
    assert_eq!(message.finish_reason, FinishReason::Error);
    assert!(message.content.contains("rate limited"));
    assert_eq!(agent.status(), AgentStatus::Error);
    assert_overlay_cleared(&agent, "scoped");

    let system = agent.event_stream().get_events_by_type(&[EventType::System]);
    assert_eq!(system.len(), 1);

    provider.queue_text("recovered");
    assert_eq!(agent.run("again").await.unwrap().content, "recovered");
    assert_eq!(agent.status(), AgentStatus::Idle);
}

#[tokio::test]
async fn mid_stream_error_becomes_error_message() {
    let provider = mock_provider();
    provider.queue(Turn::StreamError(
        vec![ChatCompletionChunk::text("partial")],
        "connection reset".into(),
    ));
    let agent = agent_with(provider);

    let message = agent.run("go").await.unwrap();
    assert_eq!(message.finish_reason, FinishReason::Error);
    assert_eq!(message.content, "Stream error: connection reset");
}

#[tokio::test]
async fn run_scoped_tools_are_cleared_after_abort_during_tool() {
    let provider = mock_provider();
    provider.queue_tool_call("call_1", "slow", serde_json::json!({}));
    let agent = agent_with(provider);

    let options = RunOptions::new("go").with_tools(scoped(sleepy_tool(
        "slow",
        Duration::from_secs(30),
        None,
    )));
    let run = tokio::spawn(agent.run(options));
    wait_for_event(agent.event_stream(), EventType::ToolCall).await;
    assert!(agent.abort());

    let message = run.await.unwrap().unwrap();
    assert_eq!(message.finish_reason, FinishReason::Abort);
    assert_overlay_cleared(&agent, "slow");

    let results = agent.event_stream().get_events_by_type(&[EventType::ToolResult]);
    match &results[0].payload {
        EventPayload::ToolResult(result) => {
            assert_eq!(result.error.as_deref(), Some("Request was aborted"));
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn run_started_while_aborted_run_unwinds_sees_only_its_tools() {
    let provider = mock_provider();
    provider.queue(Turn::Hang);
    let agent = Agent::builder()
        .with_provider(provider.clone())
        .with_tool(Arc::new(common::echo_tool("permanent")))
        .build()
        .unwrap();

    let options = RunOptions::new("a").with_tools(scoped(common::echo_tool("scoped_a")));
    let first = tokio::spawn(agent.run(options));
    wait_for_requests(&provider, 1).await;

    assert!(agent.abort());
    let second = agent.run("b");
    let message = second.await.unwrap();
    assert_eq!(message.content, "Mock response");

    let requests = provider.requests();
    let names: Vec<&str> = requests[1]
        .tools
        .iter()
        .flatten()
        .map(|tool| tool.name.as_str())
        .collect();
    assert_eq!(names, vec!["permanent"]);

    let aborted = first.await.unwrap().unwrap();
    assert_eq!(aborted.finish_reason, FinishReason::Abort);
    assert_overlay_cleared(&agent, "scoped_a");
}

#[tokio::test]
async fn streaming_run_started_while_aborted_run_unwinds_yields_only_its_events() {
    let provider = mock_provider();
    provider.queue(Turn::Hang);
    let agent = agent_with(provider.clone());

    let first = tokio::spawn(agent.run(RunOptions::new("a").with_session_id("A")));
    wait_for_requests(&provider, 1).await;

    assert!(agent.abort());
    let stream = agent
        .run_streaming(RunOptions::new("b").with_session_id("B"))
        .unwrap();
    let events: Vec<_> = stream.collect().await;

    assert!(events
        .iter()
        .all(|event| event.session_id.as_deref() == Some("B")));
    match &events.last().unwrap().payload {
        EventPayload::AgentRunEnd(end) => {
            assert_eq!(end.session_id, "B");
            assert_eq!(end.finish_reason, FinishReason::Stop);
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert!(events.iter().any(|event| matches!(
        &event.payload,
        EventPayload::AssistantMessage(message) if message.content == "Mock response"
    )));

    assert_eq!(first.await.unwrap().unwrap().finish_reason, FinishReason::Abort);
    let ends = agent.event_stream().get_events_by_type(&[EventType::AgentRunEnd]);
    assert_eq!(ends.len(), 2);
    assert!(ends
        .iter()
        .any(|event| event.session_id.as_deref() == Some("A")));
}

#[tokio::test]
async fn streaming_run_emits_stream_events_and_cleans_up() {
    let provider = mock_provider();
    provider.queue_tool_call("call_1", "scoped", serde_json::json!({"q": "x"}));
    provider.queue_text("streamed answer");
    let agent = agent_with(provider.clone());

    let options = RunOptions::new("go").with_tools(scoped(common::echo_tool("scoped")));
    let events: Vec<_> = agent.run_streaming(options).unwrap().collect().await;

    assert_eq!(events.first().map(|e| e.event_type()), Some(EventType::AgentRunStart));
    assert_eq!(events.last().map(|e| e.event_type()), Some(EventType::AgentRunEnd));
    assert!(events
        .iter()
        .any(|e| e.event_type() == EventType::AssistantStreamingToolCall));
    assert!(events
        .iter()
        .any(|e| e.event_type() == EventType::AssistantStreamingMessage));
    assert!(provider.requests()[0].stream);

    assert_eq!(agent.status(), AgentStatus::Idle);
    assert_overlay_cleared(&agent, "scoped");

    let messages = project_messages(&agent.event_stream().get_events());
    let last = messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, "streamed answer");
    assert!(!last.is_streaming);
}

#[tokio::test]
async fn streaming_run_cleans_up_after_abort() {
    let provider = mock_provider();
    provider.queue(Turn::Delayed(
        Duration::from_secs(30),
        vec![ChatCompletionChunk::text("too late")],
    ));
    let agent = agent_with(provider);

    let options = RunOptions::new("go").with_tools(scoped(common::echo_tool("scoped")));
    let mut stream = agent.run_streaming(options).unwrap();
    assert!(matches!(
        agent.run("second").await,
        Err(TarkoError::AlreadyExecuting)
    ));

    let first = stream.next().await.unwrap();
    assert_eq!(first.event_type(), EventType::AgentRunStart);
    assert!(agent.abort());
    let rest: Vec<_> = stream.collect().await;
    let final_message = rest.iter().rev().find_map(|e| match &e.payload {
        EventPayload::AssistantMessage(message) => Some(message.clone()),
        _ => None,
    });
    assert_eq!(final_message.unwrap().finish_reason, FinishReason::Abort);
    assert_eq!(agent.status(), AgentStatus::Aborted);
    assert_overlay_cleared(&agent, "scoped");
}

#[tokio::test]
async fn non_streaming_run_emits_no_streaming_events() {
    let provider = mock_provider();
    provider.queue(Turn::Chunks(vec![
        ChatCompletionChunk::reasoning("thinking it over"),
        ChatCompletionChunk::text("answer"),
        ChatCompletionChunk::finish(FinishReason::Stop),
    ]));
    let agent = agent_with(provider);

    agent.run("go").await.unwrap();
    let types = event_types(agent.event_stream());
    assert!(types.iter().all(|t| !t.is_streaming()), "{types:?}");
    assert!(types.contains(&EventType::AssistantThinkingMessage));
}

#[tokio::test]
async fn iteration_cap_ends_with_length() {
    let provider = mock_provider();
    for i in 0..3 {
        provider.queue_tool_call(&format!("call_{i}"), "echo", serde_json::json!({}));
    }
    let agent = Agent::builder()
        .with_provider(provider.clone())
        .with_max_iterations(2)
        .with_tool(Arc::new(common::echo_tool("echo")))
        .build()
        .unwrap();

    let message = agent.run("loop").await.unwrap();
    assert_eq!(message.finish_reason, FinishReason::Length);
    assert_eq!(provider.requests().len(), 2);

    let end = agent.event_stream().get_events_by_type(&[EventType::AgentRunEnd]);
    match &end[0].payload {
        EventPayload::AgentRunEnd(end) => {
            assert_eq!(end.iterations, 2);
            assert_eq!(end.finish_reason, FinishReason::Length);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

struct CountingHooks {
    starts: AtomicUsize,
    ends: AtomicUsize,
}

#[async_trait]
impl AgentHooks for CountingHooks {
    async fn on_each_agent_loop_start(&self, _ctx: &HookContext) -> Result<(), TarkoError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Err(TarkoError::InvalidState("screen unavailable".into()))
    }

    async fn on_agent_loop_end(
        &self,
        _ctx: &HookContext,
        _message: &tarko::event_stream::AssistantMessage,
    ) -> Result<(), TarkoError> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn hook_failures_are_recorded_not_fatal() {
    let provider = mock_provider();
    provider.queue_tool_call("call_1", "echo", serde_json::json!({}));
    provider.queue_text("ok");
    let hooks = Arc::new(CountingHooks {
        starts: AtomicUsize::new(0),
        ends: AtomicUsize::new(0),
    });
    let agent = Agent::builder()
        .with_provider(provider)
        .with_hooks(hooks.clone())
        .with_tool(Arc::new(common::echo_tool("echo")))
        .build()
        .unwrap();

    let message = agent.run("go").await.unwrap();
    assert_eq!(message.content, "ok");
    assert_eq!(hooks.starts.load(Ordering::SeqCst), 2);
    assert_eq!(hooks.ends.load(Ordering::SeqCst), 1);

    let system = agent.event_stream().get_events_by_type(&[EventType::System]);
    assert_eq!(system.len(), 2);
    match &system[0].payload {
        EventPayload::System(event) => assert!(event.message.contains("screen unavailable")),
        other => panic!("unexpected payload {other:?}"),
    }
}

struct RemoteTools;

#[async_trait]
impl DynamicToolProvider for RemoteTools {
    async fn list_tools(&self) -> Result<Vec<DynamicTool>, TarkoError> {
        Ok(vec![DynamicTool {
            name: "remote_search".into(),
            description: "Search remotely".into(),
            parameters: ToolParameters::empty(),
        }])
    }

    async fn execute_tool(
        &self,
        name: &str,
        _args: &ToolArguments,
        _ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, TarkoError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Err(TarkoError::tool(name, "MCP error -32001: Request timed out"))
    }
}

#[tokio::test]
async fn dynamic_tool_timeouts_surface_with_elapsed_time() {
    let provider = mock_provider();
    provider.queue_tool_call("call_1", "remote_search", serde_json::json!({"q": "rust"}));
    provider.queue_text("The search timed out.");
    let agent = agent_with(provider);

    assert_eq!(agent.register_dynamic_tools(Arc::new(RemoteTools)).await.unwrap(), 1);
    agent.run("search").await.unwrap();

    let results = agent.event_stream().get_events_by_type(&[EventType::ToolResult]);
    match &results[0].payload {
        EventPayload::ToolResult(result) => {
            assert_eq!(result.error.as_deref(), Some("MCP error -32001: Request timed out"));
            assert!(result.elapsed_ms >= 20);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn wait_for_idle_resolves_after_abort() {
    let provider = mock_provider();
    provider.queue(Turn::Hang);
    let agent = agent_with(provider);

    let run = agent.run("hang");
    let handle = tokio::spawn(run);
    agent.abort();
    tokio::time::timeout(Duration::from_secs(5), agent.wait_for_idle())
        .await
        .unwrap();
    assert_eq!(handle.await.unwrap().unwrap().finish_reason, FinishReason::Abort);
}

//! Tests for the tool system.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tarko::dispatcher::ToolDispatcher;
use tarko::event_stream::{EventStream, EventType};
use tarko::tools::*;
use tarko::types::ToolCall;

fn greet_tool() -> FunctionTool {
    FunctionTool::new(
        "greet",
        "Greet a person",
        ToolParameters::object()
            .string("name", "Name", true)
            .build(),
        |args, _ctx| async move {
            let name = args.get_str("name")?;
            Ok(serde_json::json!({"greeting": format!("Hello, {}!", name)}))
        },
    )
}

#[test]
fn parameter_builder_constructs_schema() {
    let params = ToolParameters::object()
        .string("query", "Search query", true)
        .number("limit", "Max results", false)
        .boolean("verbose", "Enable verbose output", false)
        .build();

    let schema = &params.schema;
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["properties"]["query"]["type"], "string");
    assert_eq!(schema["properties"]["limit"]["type"], "number");
    assert_eq!(schema["required"].as_array().unwrap().len(), 1);
}

#[test]
fn parameter_builder_string_enum() {
    let params = ToolParameters::object()
        .string_enum("direction", "Scroll direction", &["up", "down", "left", "right"], true)
        .build();

    let enums = params.schema["properties"]["direction"]["enum"]
        .as_array()
        .unwrap();
    assert_eq!(enums.len(), 4);
}

#[test]
fn tool_arguments_accessors() {
    let args = ToolArguments::new(serde_json::json!({"name": "Alice", "count": 42, "active": true}));
    assert_eq!(args.get_str("name").unwrap(), "Alice");
    assert!(args.get_str("missing").is_err());
    assert_eq!(args.get_i64("count").unwrap(), 42);
    assert!(args.get_bool("active").unwrap());
    assert_eq!(args.get_str_opt("missing"), None);
}

#[test]
fn tool_arguments_deserialize() {
    #[derive(serde::Deserialize, PartialEq, Debug)]
    struct Params {
        query: String,
        limit: Option<u32>,
    }

    let args = ToolArguments::new(serde_json::json!({"query": "rust", "limit": 10}));
    let params: Params = args.deserialize().unwrap();
    assert_eq!(params.query, "rust");
    assert_eq!(params.limit, Some(10));
}

#[tokio::test]
async fn function_tool_executes() {
    let tool = greet_tool();
    assert_eq!(tool.name(), "greet");
    assert_eq!(tool.definition().description, "Greet a person");

    let args = ToolArguments::new(serde_json::json!({"name": "World"}));
    let result = tool
        .execute(&args, &ToolExecutionContext::default())
        .await
        .unwrap();
    assert_eq!(result["greeting"], "Hello, World!");
}

#[test]
fn execution_overlay_shadows_and_clears() {
    let registry = ToolRegistry::new();
    registry.register_tool(Arc::new(greet_tool()));
    {
        let shadow: Arc<dyn Tool> = Arc::new(FunctionTool::new(
            "greet",
            "Scoped greeting",
            ToolParameters::empty(),
            |_, _| async { Ok(serde_json::json!("hi")) },
        ));
        let _scope = registry.scope(vec![shadow]);
        assert_eq!(registry.tools().len(), 1);
        assert_eq!(registry.get_tool("greet").unwrap().description(), "Scoped greeting");
    }
    assert!(!registry.has_execution_tools());
    assert_eq!(registry.get_tool("greet").unwrap().description(), "Greet a person");
}

#[tokio::test]
async fn dispatcher_keeps_call_order_and_pairs_events() {
    let registry = ToolRegistry::new();
    registry.register_tool(Arc::new(greet_tool()));
    registry.register_tool(Arc::new(FunctionTool::new(
        "slow",
        "Slow tool",
        ToolParameters::empty(),
        |_, _| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(serde_json::json!("late"))
        },
    )));
    let events = EventStream::new();
    let dispatcher = ToolDispatcher::new(registry, events.clone());

    let calls = vec![
        ToolCall::new("c1", "slow", "{}"),
        ToolCall::new("c2", "greet", r#"{"name":"Ada"}"#),
        ToolCall::new("c3", "greet", "{}"),
    ];
    let results = dispatcher
        .process_tool_calls(&calls, "session", &CancellationToken::new())
        .await;

    let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
    assert_eq!(results[0].content, serde_json::json!("late"));
    assert!(results[0].elapsed_ms >= 20);
    assert_eq!(results[1].content["greeting"], "Hello, Ada!");
    assert!(results[2].error.is_some());

    assert_eq!(events.get_events_by_type(&[EventType::ToolCall]).len(), 3);
    assert_eq!(events.get_events_by_type(&[EventType::ToolResult]).len(), 3);
}

#[tokio::test]
async fn cancelled_dispatch_reports_abort() {
    let registry = ToolRegistry::new();
    registry.register_tool(Arc::new(FunctionTool::new(
        "forever",
        "Never returns",
        ToolParameters::empty(),
        |_, _| async {
            std::future::pending::<()>().await;
            Ok(serde_json::Value::Null)
        },
    )));
    let dispatcher = ToolDispatcher::new(registry, EventStream::new());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let result = dispatcher
        .execute_tool_call(&ToolCall::new("c1", "forever", "{}"), "s", &cancel)
        .await;
    assert_eq!(result.error.as_deref(), Some("Request was aborted"));
}

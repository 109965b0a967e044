mod harness;

use std::time::Duration;

use futures::StreamExt;
use harness::config::ConfigBuilder;
use harness::mock_vendor::{MockVendor, Reply, openai_delta, openai_finish, openai_text, openai_tool_calls, openai_tool_delta};
use serde_json::{Map, Value, json};
use switchboard_config::ProviderKind;
use switchboard_llm::{
    ChatRequest, LlmClient, Message, StreamEvent, StreamState, ToolContext, ToolDefinition, ToolLoopOptions, Usage,
};

fn add_tool() -> ToolDefinition {
    ToolDefinition::new(
        "add",
        "Add two integers",
        json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
            "required": ["a", "b"]
        }),
    )
    .with_handler(|args: Map<String, Value>, _ctx: ToolContext| async move {
        let a = args.get("a").and_then(Value::as_i64).unwrap_or_default();
        let b = args.get("b").and_then(Value::as_i64).unwrap_or_default();
        Ok::<_, anyhow::Error>(json!(a + b))
    })
}

fn weather_tool() -> ToolDefinition {
    ToolDefinition::new(
        "get_weather",
        "Current weather for a city",
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }),
    )
    .with_handler(|args: Map<String, Value>, _ctx: ToolContext| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let city = args.get("city").and_then(Value::as_str).unwrap_or("nowhere").to_owned();
        Ok::<_, anyhow::Error>(json!({"city": city, "temp_c": 18}))
    })
}

fn client_for(mock: &MockVendor) -> LlmClient {
    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::Openai, &mock.base_url())
        .build();
    LlmClient::new(&config).unwrap()
}

#[tokio::test]
async fn chat_with_tools_runs_a_round_trip() {
    let mock = MockVendor::start(vec![
        Reply::Json(openai_tool_calls(&[("call_1", "add", json!({"a": 2, "b": 3}))])),
        Reply::Json(openai_text("2 + 3 = 5")),
    ])
    .await
    .unwrap();
    let client = client_for(&mock);
    client.registry().register_tool(add_tool()).unwrap();

    let outcome = client
        .chat_with_tools(ChatRequest::new(vec![Message::user("What is 2 + 3?")]), &ToolLoopOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.response.content, "2 + 3 = 5");
    assert_eq!(outcome.round_trips, 1);
    assert!(!outcome.exhausted);
    assert_eq!(outcome.tool_results.len(), 1);
    assert_eq!(outcome.tool_results[0].result(), Some(&json!(5)));
    assert_eq!(outcome.usage, Some(Usage::new(30, 13)));

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body["tools"][0]["function"]["name"], "add");

    let messages = requests[1].body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["tool_calls"][0]["id"], "call_1");
    assert_eq!(messages[2]["role"], "tool");
    assert_eq!(messages[2]["tool_call_id"], "call_1");
    assert_eq!(messages[2]["content"], "5");
}

#[tokio::test]
async fn parallel_calls_keep_request_order() {
    let mock = MockVendor::start(vec![
        Reply::Json(openai_tool_calls(&[
            ("call_paris", "get_weather", json!({"city": "Paris"})),
            ("call_sum", "add", json!({"a": 40, "b": 2})),
            ("call_oslo", "get_weather", json!({"city": "Oslo"})),
        ])),
        Reply::Json(openai_text("done")),
    ])
    .await
    .unwrap();
    let client = client_for(&mock);
    client.registry().register_tools([add_tool(), weather_tool()]).unwrap();

    let outcome = client
        .chat_with_tools(ChatRequest::new(vec![Message::user("Weather and sums")]), &ToolLoopOptions::default())
        .await
        .unwrap();

    let ids: Vec<&str> = outcome.tool_results.iter().map(|r| r.tool_call_id.as_str()).collect();
    assert_eq!(ids, ["call_paris", "call_sum", "call_oslo"]);
    assert!(outcome.tool_results.iter().all(|r| r.is_success()));
    assert_eq!(outcome.tool_results[2].result().unwrap()["city"], "Oslo");

    let messages = mock.requests()[1].body["messages"].clone();
    let tool_ids: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["role"] == "tool")
        .filter_map(|m| m["tool_call_id"].as_str())
        .collect();
    assert_eq!(tool_ids, ["call_paris", "call_sum", "call_oslo"]);
}

#[tokio::test]
async fn unknown_tool_is_reported_back_to_the_model() {
    let mock = MockVendor::start(vec![
        Reply::Json(openai_tool_calls(&[("call_g", "ghost", json!({}))])),
        Reply::Json(openai_text("sorry, no such tool")),
    ])
    .await
    .unwrap();
    let client = client_for(&mock);
    client.registry().register_tool(add_tool()).unwrap();

    let outcome = client
        .chat_with_tools(ChatRequest::new(vec![Message::user("haunt me")]), &ToolLoopOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.response.content, "sorry, no such tool");
    assert!(outcome.tool_results[0].is_error());

    let messages = mock.requests()[1].body["messages"].clone();
    assert_eq!(messages[2]["role"], "tool");
    assert_eq!(messages[2]["content"], "Error: Tool not found: ghost");
}

#[tokio::test]
async fn round_trip_limit_from_config() {
    let looping = openai_tool_calls(&[("call_1", "add", json!({"a": 1, "b": 1}))]);
    let mock = MockVendor::start(vec![
        Reply::Json(looping.clone()),
        Reply::Json(looping.clone()),
        Reply::Json(looping),
    ])
    .await
    .unwrap();

    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::Openai, &mock.base_url())
        .with_max_round_trips(1)
        .build();
    let client = LlmClient::new(&config).unwrap();
    client.registry().register_tool(add_tool()).unwrap();

    let outcome = client
        .chat_with_tools(ChatRequest::new(vec![Message::user("loop")]), &client.tool_loop_options())
        .await
        .unwrap();

    assert!(outcome.exhausted);
    assert_eq!(outcome.round_trips, 1);
    assert_eq!(mock.request_count(), 2);
    assert!(outcome.response.has_tool_calls());
}

#[tokio::test]
async fn stream_with_tools_over_http() {
    let mock = MockVendor::start(vec![
        Reply::Sse(vec![
            openai_tool_delta(0, Some("call_1"), Some("add"), r#"{"a":"#),
            openai_tool_delta(0, None, None, r#"20,"b":22}"#),
            openai_finish("tool_calls"),
            "[DONE]".to_owned(),
        ]),
        Reply::Sse(vec![
            openai_delta("The answer is "),
            openai_delta("42"),
            openai_finish("stop"),
            "[DONE]".to_owned(),
        ]),
    ])
    .await
    .unwrap();
    let client = client_for(&mock);
    client.registry().register_tool(add_tool()).unwrap();

    let events: Vec<StreamEvent> = client
        .stream_with_tools(ChatRequest::new(vec![Message::user("20 + 22?")]), &ToolLoopOptions::default())
        .await
        .unwrap()
        .collect()
        .await;

    let results: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ToolResult(result) => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result(), Some(&json!(42)));

    let done: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Done(summary) => Some(summary),
            _ => None,
        })
        .collect();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].content, "The answer is 42");
    assert_eq!(done[0].state, StreamState::Complete);

    let second = &mock.requests()[1];
    assert_eq!(second.body["stream"], true);
    assert_eq!(second.body["messages"][2]["content"], "42");
}

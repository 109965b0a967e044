mod harness;

use futures::StreamExt;
use harness::config::ConfigBuilder;
use harness::mock_vendor::{MockVendor, Reply, openai_delta, openai_finish, openai_tool_delta, openai_usage};
use serde_json::json;
use switchboard_config::ProviderKind;
use switchboard_llm::{
    ChatRequest, FinishReason, LegacyBridge, LlmClient, Message, StreamEvent, StreamState, Usage,
};

fn named(event: &str, data: serde_json::Value) -> (String, String) {
    (event.to_owned(), data.to_string())
}

#[tokio::test]
async fn openai_stream_collects_text_and_usage() {
    let mock = MockVendor::start(vec![Reply::Sse(vec![
        openai_delta("Hello"),
        openai_delta(", world"),
        openai_finish("stop"),
        openai_usage(9, 4),
        "[DONE]".to_owned(),
    ])])
    .await
    .unwrap();

    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::Openai, &mock.base_url())
        .build();
    let client = LlmClient::new(&config).unwrap();

    let summary = client
        .stream(ChatRequest::new(vec![Message::user("Hello")]))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(summary.content, "Hello, world");
    assert_eq!(summary.finish_reason, Some(FinishReason::Stop));
    assert_eq!(summary.usage, Some(Usage::new(9, 4)));
    assert_eq!(summary.state, StreamState::Complete);

    let request = &mock.requests()[0];
    assert_eq!(request.body["stream"], true);
    assert_eq!(request.headers["accept"], "text/event-stream");
}

#[tokio::test]
async fn openai_stream_assembles_tool_calls() {
    let mock = MockVendor::start(vec![Reply::Sse(vec![
        openai_tool_delta(0, Some("call_w"), Some("get_weather"), ""),
        openai_tool_delta(0, None, None, r#"{"location":"#),
        openai_tool_delta(0, None, None, r#""Paris"}"#),
        openai_finish("tool_calls"),
        "[DONE]".to_owned(),
    ])])
    .await
    .unwrap();

    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::Openai, &mock.base_url())
        .build();
    let client = LlmClient::new(&config).unwrap();

    let stream = client
        .stream(ChatRequest::new(vec![Message::user("Weather?")]))
        .await
        .unwrap();
    let events: Vec<StreamEvent> = StreamExt::collect(stream).await;

    let calls: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ToolCall(call) => Some(call.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_w");
    assert_eq!(calls[0].name, "get_weather");
    assert_eq!(calls[0].arguments["location"], "Paris");
}

#[tokio::test]
async fn anthropic_stream_over_http() {
    let mock = MockVendor::start(vec![Reply::NamedSse(vec![
        named(
            "message_start",
            json!({"type": "message_start", "message": {"id": "msg_1", "model": "claude-mock", "usage": {"input_tokens": 11, "output_tokens": 0}}}),
        ),
        named(
            "content_block_start",
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        ),
        named("ping", json!({"type": "ping"})),
        named(
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Salut"}}),
        ),
        named("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
        named(
            "message_delta",
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 2}}),
        ),
        named("message_stop", json!({"type": "message_stop"})),
    ])])
    .await
    .unwrap();

    let config = ConfigBuilder::new()
        .with_provider("claude", ProviderKind::Anthropic, &mock.base_url())
        .build();
    let client = LlmClient::new(&config).unwrap();

    let summary = client
        .stream(ChatRequest::new(vec![Message::user("Hi")]))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(summary.content, "Salut");
    assert_eq!(summary.finish_reason, Some(FinishReason::Stop));
    assert!(summary.errors.is_empty());
}

#[tokio::test]
async fn malformed_chunk_is_reported_in_band() {
    let mock = MockVendor::start(vec![Reply::Sse(vec![
        openai_delta("before"),
        "{not json".to_owned(),
        openai_delta(" after"),
        "[DONE]".to_owned(),
    ])])
    .await
    .unwrap();

    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::Openai, &mock.base_url())
        .build();
    let client = LlmClient::new(&config).unwrap();

    let summary = client
        .stream(ChatRequest::new(vec![Message::user("hi")]))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(summary.content, "before after");
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.state, StreamState::Complete);
}

#[tokio::test]
async fn cancelled_stream_reports_summary() {
    let mock = MockVendor::start(vec![Reply::Sse(vec![
        openai_delta("one"),
        openai_delta("two"),
        openai_delta("three"),
        "[DONE]".to_owned(),
    ])])
    .await
    .unwrap();

    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::Openai, &mock.base_url())
        .build();
    let client = LlmClient::new(&config).unwrap();

    let mut stream = client.stream(ChatRequest::new(vec![Message::user("count")])).await.unwrap();
    let handle = stream.cancel_handle();

    let first = stream.next().await;
    assert!(matches!(first, Some(StreamEvent::Delta(_))));

    handle.cancel();

    let mut rest = Vec::new();
    while let Some(event) = stream.next().await {
        rest.push(event);
    }

    assert_eq!(rest.len(), 1);
    let StreamEvent::Done(summary) = &rest[0] else {
        panic!("expected summary after cancellation");
    };
    assert!(summary.cancelled);
    assert_eq!(summary.content, "one");
}

#[tokio::test]
async fn legacy_bridge_repackages_live_stream() {
    let mock = MockVendor::start(vec![Reply::Sse(vec![
        openai_delta("legacy"),
        openai_finish("stop"),
        "[DONE]".to_owned(),
    ])])
    .await
    .unwrap();

    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::Openai, &mock.base_url())
        .build();
    let bridge = LegacyBridge::new(LlmClient::new(&config).unwrap());

    let chunks: Vec<_> = bridge
        .stream(ChatRequest::new(vec![Message::user("hi")]))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks[0].content, vec!["legacy".to_owned()]);
    let last = chunks.last().unwrap();
    assert!(last.complete);
    assert!(!last.error);
    assert_eq!(last.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn legacy_bridge_repeats_assembled_tool_calls_on_final_chunk() {
    let mock = MockVendor::start(vec![Reply::Sse(vec![
        openai_tool_delta(0, Some("call_w"), Some("get_weather"), r#"{"city":"#),
        openai_tool_delta(0, None, None, r#""Oslo"}"#),
        openai_finish("tool_calls"),
        "[DONE]".to_owned(),
    ])])
    .await
    .unwrap();

    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::Openai, &mock.base_url())
        .build();
    let bridge = LegacyBridge::new(LlmClient::new(&config).unwrap());

    let chunks: Vec<_> = bridge
        .stream(ChatRequest::new(vec![Message::user("weather")]))
        .await
        .unwrap()
        .collect()
        .await;

    let last = chunks.last().unwrap();
    assert!(last.complete);
    assert_eq!(last.finish_reason.as_deref(), Some("tool_calls"));
    assert_eq!(last.tool_calls.len(), 1);
    assert_eq!(last.tool_calls[0].id.as_deref(), Some("call_w"));
    assert_eq!(last.tool_calls[0].function.name.as_deref(), Some("get_weather"));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&last.tool_calls[0].function.arguments).unwrap(),
        json!({"city": "Oslo"})
    );
}

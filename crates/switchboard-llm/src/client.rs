//! Unified client over every configured provider

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use switchboard_config::{GatewayConfig, ProviderConfig, ProviderKind, ToolSettings};
use tokio::sync::mpsc;

use crate::error::LlmError;
use crate::provider::{self, HttpRequest, Provider, ProviderCapabilities};
use crate::stream::ChunkStream;
use crate::tools::{ExecutionOptions, ToolContext, ToolExecutor, ToolRegistry};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{
    ChatRequest, ChatResponse, Message, RequestOptions, StreamEvent, StreamState, StreamSummary, ToolChoice,
    ToolResult, Usage,
};

/// Events from an automatic tool loop, ending with one `Done`
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Buffered events between the tool-loop task and its consumer
const EVENT_BUFFER: usize = 64;

/// Provider listing entry
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub kind: ProviderKind,
    pub capabilities: ProviderCapabilities,
}

/// Bounds for `chat_with_tools` and `stream_with_tools`
#[derive(Debug, Clone)]
pub struct ToolLoopOptions {
    /// Maximum number of execute-and-resend cycles
    pub max_round_trips: usize,
    pub execution: ExecutionOptions,
}

impl Default for ToolLoopOptions {
    fn default() -> Self {
        Self::from(&ToolSettings::default())
    }
}

impl From<&ToolSettings> for ToolLoopOptions {
    fn from(settings: &ToolSettings) -> Self {
        Self {
            max_round_trips: settings.max_round_trips,
            execution: ExecutionOptions::from(settings),
        }
    }
}

/// Result of `chat_with_tools`
#[derive(Debug, Clone)]
pub struct ToolLoopResponse {
    /// Final model response
    pub response: ChatResponse,
    /// Conversation including every assistant tool turn and tool result
    pub messages: Vec<Message>,
    /// Every executed tool result, in execution order
    pub tool_results: Vec<ToolResult>,
    /// Completed execute-and-resend cycles
    pub round_trips: usize,
    /// The round-trip limit was reached while the model still wanted tools
    pub exhausted: bool,
    /// Usage summed over every request
    pub usage: Option<Usage>,
}

struct ProviderEntry {
    provider: Arc<dyn Provider>,
    transport: Arc<dyn Transport>,
    config: ProviderConfig,
}

/// A resolved target for one request
struct Route {
    name: String,
    model: String,
    provider: Arc<dyn Provider>,
    transport: Arc<dyn Transport>,
}

/// Client for chat, streaming, and automatic tool round trips
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    providers: IndexMap<String, ProviderEntry>,
    default_provider: Option<String>,
    registry: Arc<ToolRegistry>,
    executor: Arc<ToolExecutor>,
    tool_settings: ToolSettings,
}

impl LlmClient {
    /// Build a client with one HTTP transport per provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any provider fails to initialize
    pub fn new(config: &GatewayConfig) -> Result<Self, LlmError> {
        Self::build(config, |provider_config| {
            Ok(Arc::new(ReqwestTransport::from_config(provider_config)?) as Arc<dyn Transport>)
        })
    }

    /// Build a client that sends every request through `transport`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any provider fails to initialize
    pub fn with_transport(config: &GatewayConfig, transport: Arc<dyn Transport>) -> Result<Self, LlmError> {
        Self::build(config, |_| Ok(Arc::clone(&transport)))
    }

    fn build(
        config: &GatewayConfig,
        transport_for: impl Fn(&ProviderConfig) -> Result<Arc<dyn Transport>, LlmError>,
    ) -> Result<Self, LlmError> {
        let mut providers = IndexMap::with_capacity(config.providers.len());

        for (name, provider_config) in &config.providers {
            let entry = ProviderEntry {
                provider: provider::from_config(name, provider_config)?,
                transport: transport_for(provider_config)?,
                config: provider_config.clone(),
            };
            providers.insert(name.clone(), entry);
        }

        let default_provider = config.default_provider_name().map(str::to_owned);
        let registry = Arc::new(ToolRegistry::new());
        let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry)));

        tracing::info!(
            providers = providers.len(),
            default_provider = default_provider.as_deref().unwrap_or("none"),
            "llm client initialized"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                providers,
                default_provider,
                registry,
                executor,
                tool_settings: config.tools.clone(),
            }),
        })
    }

    /// Registry holding the tools this client can offer
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.inner.registry
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.inner.executor
    }

    /// Loop bounds taken from the configured tool settings
    pub fn tool_loop_options(&self) -> ToolLoopOptions {
        ToolLoopOptions::from(&self.inner.tool_settings)
    }

    /// Configured providers, in configuration order
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.inner
            .providers
            .iter()
            .map(|(name, entry)| ProviderInfo {
                name: name.clone(),
                kind: entry.provider.kind(),
                capabilities: entry.provider.capabilities(),
            })
            .collect()
    }

    /// Look up a provider by name
    ///
    /// # Errors
    ///
    /// Returns `ProviderNotFound` for unknown names
    pub fn provider(&self, name: &str) -> Result<Arc<dyn Provider>, LlmError> {
        self.inner
            .providers
            .get(name)
            .map(|entry| Arc::clone(&entry.provider))
            .ok_or_else(|| LlmError::ProviderNotFound {
                provider: name.to_owned(),
            })
    }

    /// Send a request and return the complete response
    ///
    /// Tool calls in the response are returned, not executed.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let (route, http) = self.prepare(&request, false)?;

        let body = route.transport.send(http).await?;
        let mut response = route.provider.parse_response(body)?;
        if response.model.is_none() {
            response.model = Some(route.model.clone());
        }

        tracing::debug!(
            provider = %route.name,
            model = %route.model,
            tool_calls = response.tool_calls.len(),
            "chat completed"
        );
        Ok(response)
    }

    /// Send a request and return its normalized event stream
    pub async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        let (route, http) = self.prepare(&request, true)?;

        let raw = route.transport.stream(http).await?;
        tracing::debug!(provider = %route.name, model = %route.model, "stream opened");

        Ok(ChunkStream::new(route.provider, raw))
    }

    /// Chat, executing requested tools and re-sending until the model
    /// answers without tool calls or the round-trip limit is hit
    ///
    /// When `request.tools` is `None`, every registered tool is offered.
    pub async fn chat_with_tools(
        &self,
        request: ChatRequest,
        options: &ToolLoopOptions,
    ) -> Result<ToolLoopResponse, LlmError> {
        let mut request = self.with_all_tools(request);
        let route = self.resolve(&request)?;
        let context = ToolContext::new(&route.name, &route.model);

        let mut tool_results = Vec::new();
        let mut usage: Option<Usage> = None;
        let mut round_trips = 0;

        loop {
            let response = self.chat(request.clone()).await?;
            usage = add_usage(usage, response.usage);

            if !response.has_tool_calls() {
                return Ok(ToolLoopResponse {
                    response,
                    messages: request.messages,
                    tool_results,
                    round_trips,
                    exhausted: false,
                    usage,
                });
            }

            if round_trips >= options.max_round_trips {
                tracing::warn!(
                    provider = %route.name,
                    max_round_trips = options.max_round_trips,
                    "tool round-trip limit reached"
                );
                return Ok(ToolLoopResponse {
                    response,
                    messages: request.messages,
                    tool_results,
                    round_trips,
                    exhausted: true,
                    usage,
                });
            }

            round_trips += 1;
            tracing::debug!(provider = %route.name, round = round_trips, calls = response.tool_calls.len(), "executing tool round");

            let results = self
                .inner
                .executor
                .execute_tools(&response.tool_calls, &context, &options.execution)
                .await?;

            append_tool_turn(&mut request, &response, &results);
            tool_results.extend(results);
        }
    }

    /// Streaming variant of [`chat_with_tools`](Self::chat_with_tools)
    ///
    /// Deltas, assembled tool calls, and tool results are forwarded as they
    /// happen; only the final round's `Done` is delivered. Dropping the
    /// returned stream stops the loop.
    ///
    /// # Errors
    ///
    /// Configuration and provider errors for the first request are returned
    /// directly; later failures arrive as `Error` events.
    pub async fn stream_with_tools(
        &self,
        request: ChatRequest,
        options: &ToolLoopOptions,
    ) -> Result<EventStream, LlmError> {
        let request = self.with_all_tools(request);
        let route = self.resolve(&request)?;
        let first = self.stream(request.clone()).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let client = self.clone();
        let options = options.clone();
        tokio::spawn(async move {
            client.drive_tool_stream(request, route, first, options, tx).await;
        });

        Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })))
    }

    async fn drive_tool_stream(
        self,
        mut request: ChatRequest,
        route: Route,
        mut stream: ChunkStream,
        options: ToolLoopOptions,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let context = ToolContext::new(&route.name, &route.model);
        let mut round_trips = 0;

        loop {
            let Some(summary) = forward_round(&mut stream, &tx).await else {
                return;
            };

            let wants_tools = summary.state == StreamState::Complete && !summary.tool_calls.is_empty();
            if !wants_tools || round_trips >= options.max_round_trips {
                if wants_tools {
                    tracing::warn!(
                        provider = %route.name,
                        max_round_trips = options.max_round_trips,
                        "tool round-trip limit reached"
                    );
                }
                let _ = tx.send(StreamEvent::Done(summary)).await;
                return;
            }

            round_trips += 1;
            tracing::debug!(provider = %route.name, round = round_trips, calls = summary.tool_calls.len(), "executing tool round");

            let results = match self
                .inner
                .executor
                .execute_tools(&summary.tool_calls, &context, &options.execution)
                .await
            {
                Ok(results) => results,
                Err(e) => {
                    finish_with_error(&tx, e, summary).await;
                    return;
                }
            };

            for result in &results {
                if tx.send(StreamEvent::ToolResult(result.clone())).await.is_err() {
                    return;
                }
            }

            let response = ChatResponse::from(summary.clone());
            append_tool_turn(&mut request, &response, &results);

            stream = match self.stream(request.clone()).await {
                Ok(next) => next,
                Err(e) => {
                    finish_with_error(&tx, e, summary).await;
                    return;
                }
            };
        }
    }

    /// Offer every registered tool when the request names none
    fn with_all_tools(&self, mut request: ChatRequest) -> ChatRequest {
        if request.tools.is_none() {
            let names = self.inner.registry.list_tools().into_iter().map(|tool| tool.name);
            request.tools = Some(names.collect());
        }
        request
    }

    fn resolve(&self, request: &ChatRequest) -> Result<Route, LlmError> {
        let name = request
            .provider
            .as_deref()
            .or(self.inner.default_provider.as_deref())
            .ok_or_else(|| LlmError::configuration("no provider specified and no default provider configured"))?;

        let entry = self
            .inner
            .providers
            .get(name)
            .ok_or_else(|| LlmError::ProviderNotFound {
                provider: name.to_owned(),
            })?;

        let model = request
            .model
            .clone()
            .or_else(|| entry.config.default_model.clone())
            .ok_or_else(|| LlmError::configuration(format!("no model specified for provider {name}")))?;

        Ok(Route {
            name: name.to_owned(),
            model,
            provider: Arc::clone(&entry.provider),
            transport: Arc::clone(&entry.transport),
        })
    }

    /// Resolve, validate, and translate a request without touching the network
    fn prepare(&self, request: &ChatRequest, stream: bool) -> Result<(Route, HttpRequest), LlmError> {
        let route = self.resolve(request)?;
        let provider = &route.provider;

        if request.messages.is_empty() {
            return Err(LlmError::configuration("request has no messages"));
        }
        for message in &request.messages {
            message.validate()?;
        }

        let tool_names = request.tools.as_deref().filter(|names| !names.is_empty());
        let unsupported = if stream && !provider.capabilities().streaming {
            Some("streaming")
        } else if tool_names.is_some() && !provider.supports_tools() {
            Some("tools")
        } else if request.has_images() && !provider.supports_images() {
            Some("images")
        } else if request.response_format.as_ref().is_some_and(|f| f.is_structured())
            && !provider.supports_structured_output()
        {
            Some("structured output")
        } else {
            None
        };
        if let Some(feature) = unsupported {
            return Err(LlmError::configuration(format!(
                "provider {} does not support {feature}",
                route.name
            )));
        }

        let tools = match tool_names {
            Some(names) => self.inner.registry.tools_for_provider(provider.kind(), Some(names))?,
            None => Vec::new(),
        };

        let defaults = &self.inner.providers[route.name.as_str()].config;
        let options = RequestOptions {
            temperature: request.temperature.or(defaults.temperature),
            max_tokens: request.max_tokens.or(defaults.max_tokens),
            top_p: request.top_p,
            stop: request.stop.clone(),
            stream,
            tools,
            tool_choice: request.tool_choice.clone(),
            response_format: request.response_format.clone(),
        };

        let messages = provider.format_messages(&request.messages)?;
        let body = provider.build_request(&route.model, messages, &options)?;
        let http = provider.http_request(&route.model, body, stream)?;

        Ok((route, http))
    }
}

/// Forward one round's events, holding back its summary
async fn forward_round(stream: &mut ChunkStream, tx: &mpsc::Sender<StreamEvent>) -> Option<StreamSummary> {
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Done(summary) => return Some(summary),
            other => {
                if tx.send(other).await.is_err() {
                    stream.cancel();
                    return None;
                }
            }
        }
    }
    None
}

async fn finish_with_error(tx: &mpsc::Sender<StreamEvent>, error: LlmError, mut summary: StreamSummary) {
    tracing::warn!(error = %error, "tool stream stopped");
    let message = error.to_string();
    summary.errors.push(message.clone());
    summary.state = StreamState::Errored;

    if tx.send(StreamEvent::Error(message)).await.is_ok() {
        let _ = tx.send(StreamEvent::Done(summary)).await;
    }
}

/// Append the assistant's tool calls and their results, and stop forcing
/// a tool choice so the model can answer
fn append_tool_turn(request: &mut ChatRequest, response: &ChatResponse, results: &[ToolResult]) {
    request.messages.push(Message::assistant_with_tool_calls(
        response.content.clone(),
        response.tool_calls.clone(),
    ));
    request.messages.extend(results.iter().map(Message::tool_result));

    if matches!(request.tool_choice, Some(ToolChoice::Required | ToolChoice::Function(_))) {
        request.tool_choice = Some(ToolChoice::Auto);
    }
}

fn add_usage(total: Option<Usage>, next: Option<Usage>) -> Option<Usage> {
    match (total, next) {
        (Some(a), Some(b)) => Some(Usage::new(
            a.prompt_tokens.saturating_add(b.prompt_tokens),
            a.completion_tokens.saturating_add(b.completion_tokens),
        )),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use url::Url;

    use super::*;
    use crate::transport::RawEventStream;
    use crate::types::{ContentPart, ResponseFormat, ToolDefinition};

    /// Replays canned bodies and records every request
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Value>>,
        streams: Mutex<VecDeque<Vec<String>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn with_responses(responses: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            })
        }

        fn with_streams(streams: Vec<Vec<String>>) -> Arc<Self> {
            Arc::new(Self {
                streams: Mutex::new(streams.into()),
                ..Self::default()
            })
        }

        fn bodies(&self) -> Vec<Value> {
            self.requests.lock().unwrap().iter().map(|r| r.body.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<Value, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Upstream("script exhausted".to_owned()))
        }

        async fn stream(&self, request: HttpRequest) -> Result<RawEventStream, LlmError> {
            self.requests.lock().unwrap().push(request);
            let events = self
                .streams
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Upstream("script exhausted".to_owned()))?;
            Ok(Box::pin(futures_util::stream::iter(events.into_iter().map(Ok))))
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig::default()
            .with_provider(
                "openai",
                ProviderConfig::new(ProviderKind::Openai)
                    .with_api_key("sk-test")
                    .with_default_model("gpt-4o-mini"),
            )
            .with_provider(
                "anthropic",
                ProviderConfig::new(ProviderKind::Anthropic).with_api_key("ak-test"),
            )
            .with_provider(
                "local",
                ProviderConfig::new(ProviderKind::Vllm)
                    .with_base_url(Url::parse("http://localhost:8000/v1").unwrap())
                    .with_default_model("llama"),
            )
    }

    fn client(transport: Arc<ScriptedTransport>) -> LlmClient {
        let client = LlmClient::with_transport(&config(), transport).unwrap();
        client.registry().register_tool(math_tool()).unwrap();
        client
    }

    fn math_tool() -> ToolDefinition {
        ToolDefinition::new(
            "math",
            "Add integers",
            json!({
                "type": "object",
                "properties": {"expression": {"type": "string"}},
                "required": ["expression"]
            }),
        )
        .with_handler(|args: Map<String, Value>, _ctx: ToolContext| async move {
            let expression = args.get("expression").and_then(Value::as_str).unwrap_or_default();
            let sum: i64 = expression
                .split('+')
                .map(|term| term.trim().parse::<i64>())
                .sum::<Result<i64, _>>()?;
            Ok::<_, anyhow::Error>(json!(sum))
        })
    }

    fn text_response(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        })
    }

    fn tool_response(id: &str, expression: &str) -> Value {
        json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": id,
                        "type": "function",
                        "function": {"name": "math", "arguments": json!({"expression": expression}).to_string()}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 8, "completion_tokens": 4, "total_tokens": 12}
        })
    }

    #[tokio::test]
    async fn chat_uses_default_provider_and_model() {
        let transport = ScriptedTransport::with_responses(vec![text_response("Hello!")]);
        let client = client(Arc::clone(&transport));

        let response = client.chat(ChatRequest::new(vec![Message::user("Hi")])).await.unwrap();

        assert_eq!(response.content, "Hello!");
        assert_eq!(response.usage, Some(Usage::new(10, 2)));

        let bodies = transport.bodies();
        assert_eq!(bodies[0]["model"], "gpt-4o-mini");
        assert!(bodies[0].get("tools").is_none());
    }

    #[tokio::test]
    async fn unknown_provider_fails_before_network() {
        let transport = ScriptedTransport::with_responses(Vec::new());
        let client = client(Arc::clone(&transport));

        let err = client
            .chat(ChatRequest::new(vec![Message::user("Hi")]).with_provider("nope"))
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::ProviderNotFound { provider } if provider == "nope"));
        assert!(transport.bodies().is_empty());
    }

    #[tokio::test]
    async fn unsupported_capabilities_fail_before_network() {
        let transport = ScriptedTransport::with_responses(Vec::new());
        let client = client(Arc::clone(&transport));

        let image = ChatRequest::new(vec![Message::user_parts(vec![
            ContentPart::text("what is this"),
            ContentPart::image("https://example.com/cat.png"),
        ])])
        .with_provider("local");
        let err = client.chat(image).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("does not support images"));

        let structured = ChatRequest::new(vec![Message::user("json please")])
            .with_provider("anthropic")
            .with_model("claude-sonnet-4")
            .with_response_format(ResponseFormat::JsonObject);
        let err = client.chat(structured).await.unwrap_err();
        assert!(err.to_string().contains("does not support structured output"));

        assert!(transport.bodies().is_empty());
    }

    #[tokio::test]
    async fn missing_model_is_configuration_error() {
        let client = client(ScriptedTransport::with_responses(Vec::new()));
        let err = client
            .chat(ChatRequest::new(vec![Message::user("Hi")]).with_provider("anthropic"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no model specified for provider anthropic"));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_rejected() {
        let transport = ScriptedTransport::with_responses(Vec::new());
        let client = client(Arc::clone(&transport));

        let err = client
            .chat(ChatRequest::new(vec![Message::user("Hi")]).with_tools(["ghost"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "configuration error: Tool not found: ghost");
        assert!(transport.bodies().is_empty());
    }

    #[tokio::test]
    async fn tool_round_trip() {
        let transport =
            ScriptedTransport::with_responses(vec![tool_response("call_1", "2+2"), text_response("2+2 is 4")]);
        let client = client(Arc::clone(&transport));

        let request = ChatRequest::new(vec![Message::user("What is 2+2?")]).with_tool_choice(ToolChoice::Required);
        let outcome = client
            .chat_with_tools(request, &ToolLoopOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.response.content, "2+2 is 4");
        assert_eq!(outcome.round_trips, 1);
        assert!(!outcome.exhausted);
        assert_eq!(outcome.tool_results[0].result(), Some(&json!(4)));
        assert_eq!(outcome.messages.len(), 3);
        assert_eq!(outcome.usage, Some(Usage::new(18, 6)));

        let bodies = transport.bodies();
        assert_eq!(bodies[0]["tool_choice"], "required");
        assert_eq!(bodies[0]["tools"][0]["function"]["name"], "math");
        assert_eq!(bodies[1]["tool_choice"], "auto");
        assert_eq!(
            bodies[1]["messages"][2],
            json!({"role": "tool", "name": "math", "tool_call_id": "call_1", "content": "4"})
        );
    }

    #[tokio::test]
    async fn failed_tool_results_are_flagged_for_anthropic() {
        let transport = ScriptedTransport::with_responses(vec![
            json!({
                "id": "msg_1",
                "model": "claude-test",
                "content": [{"type": "tool_use", "id": "toolu_1", "name": "ghost", "input": {}}],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 9, "output_tokens": 3}
            }),
            json!({
                "id": "msg_2",
                "model": "claude-test",
                "content": [{"type": "text", "text": "That tool does not exist."}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 20, "output_tokens": 6}
            }),
        ]);
        let client = client(Arc::clone(&transport));

        let request = ChatRequest::new(vec![Message::user("Use the ghost tool")])
            .with_provider("anthropic")
            .with_model("claude-test");
        let outcome = client
            .chat_with_tools(request, &ToolLoopOptions::default())
            .await
            .unwrap();

        assert!(outcome.tool_results[0].is_error());
        assert!(outcome.messages[2].is_error);

        let bodies = transport.bodies();
        assert_eq!(
            bodies[1]["messages"][2]["content"][0],
            json!({
                "type": "tool_result",
                "tool_use_id": "toolu_1",
                "content": "Error: Tool not found: ghost",
                "is_error": true
            })
        );
    }

    #[tokio::test]
    async fn round_trips_are_bounded() {
        let transport = ScriptedTransport::with_responses(vec![
            tool_response("call_1", "1+1"),
            tool_response("call_2", "2+2"),
            tool_response("call_3", "3+3"),
        ]);
        let client = client(Arc::clone(&transport));

        let options = ToolLoopOptions {
            max_round_trips: 2,
            ..ToolLoopOptions::default()
        };
        let outcome = client
            .chat_with_tools(ChatRequest::new(vec![Message::user("loop")]), &options)
            .await
            .unwrap();

        assert!(outcome.exhausted);
        assert_eq!(outcome.round_trips, 2);
        assert_eq!(outcome.tool_results.len(), 2);
        assert_eq!(transport.bodies().len(), 3);
    }

    #[tokio::test]
    async fn stream_with_tools_forwards_results() {
        let transport = ScriptedTransport::with_streams(vec![
            vec![
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"math","arguments":"{\"expression\":\"2+3\"}"}}]}}]}"#.to_owned(),
                r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#.to_owned(),
                "[DONE]".to_owned(),
            ],
            vec![
                r#"{"choices":[{"delta":{"content":"It is 5"}}]}"#.to_owned(),
                r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#.to_owned(),
                "[DONE]".to_owned(),
            ],
        ]);
        let client = client(Arc::clone(&transport));

        let events: Vec<StreamEvent> = client
            .stream_with_tools(ChatRequest::new(vec![Message::user("2+3?")]), &ToolLoopOptions::default())
            .await
            .unwrap()
            .collect()
            .await;

        let results: Vec<&ToolResult> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolResult(result) => Some(result),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result(), Some(&json!(5)));

        let dones = events.iter().filter(|e| matches!(e, StreamEvent::Done(_))).count();
        assert_eq!(dones, 1);
        let Some(StreamEvent::Done(summary)) = events.last() else {
            panic!("missing summary");
        };
        assert_eq!(summary.content, "It is 5");
        assert_eq!(transport.bodies()[1]["stream"], true);
    }

    #[test]
    fn lists_providers_in_order() {
        let client = client(ScriptedTransport::with_responses(Vec::new()));
        let names: Vec<String> = client.providers().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["openai", "anthropic", "local"]);
        assert!(!client.providers()[2].capabilities.images);
    }
}

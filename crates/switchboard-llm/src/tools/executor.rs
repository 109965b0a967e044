//! Runs tool handlers with bounded concurrency, timeouts, and cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::{StreamExt, TryStreamExt, stream};
use switchboard_config::ToolSettings;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use super::handler::ToolContext;
use super::registry::ToolRegistry;
use super::schema::validate_arguments;
use crate::error::LlmError;
use crate::types::{ToolCall, ToolErrorKind, ToolResult};

/// Batch execution settings
#[derive(Debug, Clone, Copy)]
pub struct ExecutionOptions {
    /// Per-call handler timeout
    pub timeout: Duration,
    /// Handlers allowed to run at once
    pub max_concurrent: usize,
    /// Abort the batch on the first failed call
    pub fail_fast: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::from(&ToolSettings::default())
    }
}

impl From<&ToolSettings> for ExecutionOptions {
    fn from(settings: &ToolSettings) -> Self {
        Self {
            timeout: settings.timeout,
            max_concurrent: settings.max_concurrent,
            fail_fast: settings.fail_fast,
        }
    }
}

/// Why a call was refused before its handler ran
struct Rejection {
    kind: ToolErrorKind,
    message: String,
}

/// Removes an execution from the in-flight table and stops its task
struct InFlightGuard {
    id: u64,
    table: Arc<DashMap<u64, CancellationToken>>,
    task: Option<AbortHandle>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.table.remove(&self.id);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Executes tool calls against the handlers bound in a [`ToolRegistry`]
///
/// Every execution gets a monotonically increasing id while it runs, which
/// [`cancel`](Self::cancel) accepts.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    in_flight: Arc<DashMap<u64, CancellationToken>>,
    next_id: AtomicU64,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            in_flight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run one call
    ///
    /// Timeouts, cancellation, handler errors, and panics all come back as a
    /// failed [`ToolResult`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error, without running anything, when the
    /// tool is unknown, has no handler, or the arguments fail validation
    pub async fn execute_tool(
        &self,
        call: &ToolCall,
        context: &ToolContext,
        timeout: Duration,
    ) -> Result<ToolResult, LlmError> {
        self.run(call, context, timeout)
            .await
            .map_err(|rejection| LlmError::Configuration(rejection.message))
    }

    /// Run a batch, preserving input order in the output
    ///
    /// At most `max_concurrent` handlers run at once. Without `fail_fast`,
    /// every call yields a result, refused calls included.
    ///
    /// # Errors
    ///
    /// With `fail_fast`, returns `ToolExecution` for the first call to fail
    /// in completion order, not input order; calls still running are aborted
    pub async fn execute_tools(
        &self,
        calls: &[ToolCall],
        context: &ToolContext,
        options: &ExecutionOptions,
    ) -> Result<Vec<ToolResult>, LlmError> {
        let width = options.max_concurrent.max(1);
        tracing::debug!(count = calls.len(), max_concurrent = width, fail_fast = options.fail_fast, "executing tool batch");

        if !options.fail_fast {
            let pending: Vec<_> = calls.iter().map(|call| self.settle(call, context, options.timeout)).collect();
            return Ok(stream::iter(pending)
                .buffered(width)
                .collect()
                .await);
        }

        let pending: Vec<_> = calls
            .iter()
            .enumerate()
            .map(|(position, call)| async move { (position, self.settle(call, context, options.timeout).await) })
            .collect();
        let mut settled: Vec<(usize, ToolResult)> = stream::iter(pending)
            .buffer_unordered(width)
            .map(|(position, result)| match result.error() {
                Some(error) => Err(LlmError::ToolExecution {
                    tool: result.name.clone(),
                    message: error.message.clone(),
                }),
                None => Ok((position, result)),
            })
            .try_collect()
            .await?;

        settled.sort_unstable_by_key(|(position, _)| *position);
        Ok(settled.into_iter().map(|(_, result)| result).collect())
    }

    /// Run one call of a batch; refusals become failed results
    async fn settle(&self, call: &ToolCall, context: &ToolContext, timeout: Duration) -> ToolResult {
        match self.run(call, context, timeout).await {
            Ok(result) => result,
            Err(rejection) => {
                ToolResult::failure(&call.id, &call.name, rejection.kind, rejection.message, Duration::ZERO)
            }
        }
    }

    /// Cancel one running execution; returns whether it was found
    pub fn cancel(&self, id: u64) -> bool {
        match self.in_flight.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running execution, returning how many were signalled
    pub fn cancel_all(&self) -> usize {
        let tokens: Vec<CancellationToken> = self.in_flight.iter().map(|entry| entry.value().clone()).collect();
        for token in &tokens {
            token.cancel();
        }

        let count = tokens.len();
        if count > 0 {
            tracing::info!(count, "cancelled in-flight tool executions");
        }
        count
    }

    /// Ids of executions currently running, ascending
    pub fn in_flight(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.in_flight.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    async fn run(&self, call: &ToolCall, context: &ToolContext, timeout: Duration) -> Result<ToolResult, Rejection> {
        let tool = self.registry.get_tool(&call.name).ok_or_else(|| Rejection {
            kind: ToolErrorKind::NotFound,
            message: format!("Tool not found: {}", call.name),
        })?;

        let handler = tool.handler.clone().ok_or_else(|| Rejection {
            kind: ToolErrorKind::MissingHandler,
            message: format!("Tool {} has no handler", tool.name),
        })?;

        validate_arguments(&tool.parameters, &call.arguments).map_err(|reason| Rejection {
            kind: ToolErrorKind::InvalidArguments,
            message: format!("Invalid arguments for tool {}: {reason}", tool.name),
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.in_flight.insert(id, token.clone());
        let mut guard = InFlightGuard {
            id,
            table: Arc::clone(&self.in_flight),
            task: None,
        };

        tracing::debug!(execution = id, tool = %tool.name, call = %call.id, "tool execution started");

        let started = Instant::now();
        let arguments = call.arguments.clone();
        let context = context.clone();
        let mut task = tokio::spawn(async move { handler.call(arguments, context).await });
        guard.task = Some(task.abort_handle());

        let failure = |kind, message: String| ToolResult::failure(&call.id, &tool.name, kind, message, started.elapsed());

        let result = tokio::select! {
            biased;

            () = token.cancelled() => {
                tracing::info!(execution = id, tool = %tool.name, "tool execution cancelled");
                failure(ToolErrorKind::Cancelled, format!("Tool {} was cancelled", tool.name))
            }

            joined = tokio::time::timeout(timeout, &mut task) => match joined {
                Err(_) => {
                    tracing::warn!(execution = id, tool = %tool.name, timeout = ?timeout, "tool execution timed out");
                    failure(
                        ToolErrorKind::Timeout,
                        format!("Tool {} timed out after {}ms", tool.name, timeout.as_millis()),
                    )
                }
                Ok(Ok(Ok(value))) => ToolResult::success(&call.id, &tool.name, value, started.elapsed()),
                Ok(Ok(Err(e))) => {
                    tracing::debug!(execution = id, tool = %tool.name, error = %e, "tool handler failed");
                    failure(ToolErrorKind::Handler, format!("{e:#}"))
                }
                Ok(Err(join_error)) if join_error.is_panic() => {
                    tracing::error!(execution = id, tool = %tool.name, "tool handler panicked");
                    failure(ToolErrorKind::Panicked, format!("Tool {} panicked", tool.name))
                }
                Ok(Err(_)) => failure(ToolErrorKind::Cancelled, format!("Tool {} was cancelled", tool.name)),
            },
        };

        drop(guard);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Map, Value, json};

    use super::*;
    use crate::types::{ToolDefinition, parse_arguments};

    fn math_tool() -> ToolDefinition {
        ToolDefinition::new(
            "math",
            "Evaluate a sum",
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

    fn executor_with(tools: Vec<ToolDefinition>) -> ToolExecutor {
        let registry = Arc::new(ToolRegistry::new());
        registry.register_tools(tools).unwrap();
        ToolExecutor::new(registry)
    }

    fn call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall::new(id, name, parse_arguments(args))
    }

    #[tokio::test]
    async fn runs_handler() {
        let executor = executor_with(vec![math_tool()]);
        let result = executor
            .execute_tool(&call("c1", "math", r#"{"expression":"2+2"}"#), &ToolContext::default(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.result(), Some(&json!(4)));
        assert_eq!(result.tool_call_id, "c1");
        assert!(executor.in_flight().is_empty());
    }

    #[tokio::test]
    async fn handler_error_becomes_failed_result() {
        let executor = executor_with(vec![math_tool()]);
        let result = executor
            .execute_tool(&call("c1", "math", r#"{"expression":"2+x"}"#), &ToolContext::default(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.error().unwrap().kind, ToolErrorKind::Handler);
    }

    #[tokio::test]
    async fn unknown_tool_is_configuration_error() {
        let executor = executor_with(vec![math_tool()]);
        let err = executor
            .execute_tool(&call("c1", "ghost", "{}"), &ToolContext::default(), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "configuration error: Tool not found: ghost");
    }

    #[tokio::test]
    async fn unknown_tool_in_batch_becomes_result() {
        let executor = executor_with(vec![math_tool()]);
        let results = executor
            .execute_tools(
                &[call("c1", "math", r#"{"expression":"1+1"}"#), call("c2", "ghost", "{}")],
                &ToolContext::default(),
                &ExecutionOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(results[0].result(), Some(&json!(2)));
        let error = results[1].error().unwrap();
        assert_eq!(error.kind, ToolErrorKind::NotFound);
        assert_eq!(error.message, "Tool not found: ghost");
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_handler() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invocations);

        let tool = ToolDefinition::new(
            "math",
            "Evaluate a sum",
            json!({"type": "object", "properties": {"expression": {"type": "string"}}, "required": ["expression"]}),
        )
        .with_handler(move |_args: Map<String, Value>, _ctx: ToolContext| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(Value::Null)
            }
        });

        let executor = executor_with(vec![tool]);
        let err = executor
            .execute_tool(&call("c1", "math", "{}"), &ToolContext::default(), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains("missing required argument: expression"));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_handler_is_refused() {
        let executor = executor_with(vec![ToolDefinition::new("bare", "No handler", json!({"type": "object"}))]);
        let err = executor
            .execute_tool(&call("c1", "bare", "{}"), &ToolContext::default(), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("has no handler"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let slow = ToolDefinition::new("slow", "Sleeps", json!({"type": "object"})).with_handler(
            |_args: Map<String, Value>, _ctx: ToolContext| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, anyhow::Error>(json!("late"))
            },
        );

        let executor = executor_with(vec![slow]);
        let result = executor
            .execute_tool(&call("c1", "slow", "{}"), &ToolContext::default(), Duration::from_secs(1))
            .await
            .unwrap();

        let error = result.error().unwrap();
        assert_eq!(error.kind, ToolErrorKind::Timeout);
        assert!(error.message.contains("timed out after 1000ms"));
        assert!(executor.in_flight().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_respects_concurrency_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (active_in, peak_in) = (Arc::clone(&active), Arc::clone(&peak));

        let tracked = ToolDefinition::new("tracked", "Counts overlap", json!({"type": "object"})).with_handler(
            move |_args: Map<String, Value>, _ctx: ToolContext| {
                let active = Arc::clone(&active_in);
                let peak = Arc::clone(&peak_in);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(json!("ok"))
                }
            },
        );

        let executor = executor_with(vec![tracked]);
        let calls: Vec<_> = (0..6).map(|i| call(&format!("c{i}"), "tracked", "{}")).collect();
        let options = ExecutionOptions {
            max_concurrent: 2,
            ..ExecutionOptions::default()
        };

        let results = executor
            .execute_tools(&calls, &ToolContext::default(), &options)
            .await
            .unwrap();

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(ToolResult::is_success));
        let ids: Vec<_> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["c0", "c1", "c2", "c3", "c4", "c5"]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fail_fast_surfaces_first_failure() {
        let executor = executor_with(vec![math_tool()]);
        let options = ExecutionOptions {
            fail_fast: true,
            ..ExecutionOptions::default()
        };

        let err = executor
            .execute_tools(
                &[call("c1", "math", r#"{"expression":"1+1"}"#), call("c2", "ghost", "{}")],
                &ToolContext::default(),
                &options,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::ToolExecution { ref tool, .. } if tool == "ghost"));
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fast_does_not_wait_for_slow_earlier_calls() {
        let slow = ToolDefinition::new("slow", "Takes a minute", json!({"type": "object"})).with_handler(
            |_args: Map<String, Value>, _ctx: ToolContext| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, anyhow::Error>(json!("late"))
            },
        );
        let executor = executor_with(vec![slow, math_tool()]);
        let options = ExecutionOptions {
            fail_fast: true,
            timeout: Duration::from_secs(120),
            ..ExecutionOptions::default()
        };

        let started = tokio::time::Instant::now();
        let err = executor
            .execute_tools(
                &[call("c1", "slow", "{}"), call("c2", "math", r#"{"expression":"one+two"}"#)],
                &ToolContext::default(),
                &options,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::ToolExecution { ref tool, .. } if tool == "math"));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn fail_fast_success_keeps_input_order() {
        let executor = executor_with(vec![math_tool()]);
        let options = ExecutionOptions {
            fail_fast: true,
            ..ExecutionOptions::default()
        };
        let calls: Vec<_> = (1..=4)
            .map(|n| call(&format!("c{n}"), "math", &format!(r#"{{"expression":"{n}+{n}"}}"#)))
            .collect();

        let results = executor
            .execute_tools(&calls, &ToolContext::default(), &options)
            .await
            .unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2", "c3", "c4"]);
        assert_eq!(results[3].result(), Some(&json!(8)));
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let boom = ToolDefinition::new("boom", "Panics", json!({"type": "object"})).with_handler(
            |_args: Map<String, Value>, _ctx: ToolContext| async move {
                if true {
                    panic!("handler exploded");
                }
                Ok::<_, anyhow::Error>(Value::Null)
            },
        );

        let executor = executor_with(vec![boom]);
        let result = executor
            .execute_tool(&call("c1", "boom", "{}"), &ToolContext::default(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.error().unwrap().kind, ToolErrorKind::Panicked);
    }

    #[tokio::test]
    async fn cancel_by_id() {
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let started_tx = Arc::new(std::sync::Mutex::new(Some(started_tx)));

        let waits = ToolDefinition::new("waits", "Never finishes", json!({"type": "object"})).with_handler(
            move |_args: Map<String, Value>, _ctx: ToolContext| {
                let started_tx = Arc::clone(&started_tx);
                async move {
                    if let Some(tx) = started_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                    std::future::pending::<()>().await;
                    Ok::<_, anyhow::Error>(Value::Null)
                }
            },
        );

        let executor = Arc::new(executor_with(vec![waits]));
        let running = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                executor
                    .execute_tool(&call("c1", "waits", "{}"), &ToolContext::default(), Duration::from_secs(60))
                    .await
            })
        };

        started_rx.await.unwrap();
        let ids = executor.in_flight();
        assert_eq!(ids.len(), 1);
        assert!(executor.cancel(ids[0]));
        assert!(!executor.cancel(9999));

        let result = running.await.unwrap().unwrap();
        assert_eq!(result.error().unwrap().kind, ToolErrorKind::Cancelled);
        assert!(executor.in_flight().is_empty());
    }
}

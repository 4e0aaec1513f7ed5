//! Activity contracts and their production implementation.
//!
//! All I/O the workflow needs happens inside activities: agent-config
//! build, tool discovery, LLM calls, tool execution, goal evaluation. The
//! workflow body itself never touches a socket. The [`Activities`] trait
//! is the seam the integration tests mock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tracing::Instrument;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ah_domain::agent::AgentConfig;
use ah_domain::config::{ModelPricing, RetryConfig, WorkflowConfig};
use ah_domain::error::{Error, Result};
use ah_domain::message::{Message, ToolCall};
use ah_domain::stream::{StreamEvent, Usage};
use ah_domain::tool::{ToolDescriptor, ToolOutcome};
use ah_mcp_client::McpManager;
use ah_providers::parser::{self, StreamingToolCalls};
use ah_providers::{CompletionRequest, LlmProvider, ProviderRegistry};
use ah_tools::{ToolCatalog, ToolExecutor};

use super::agent::AgentRegistry;
use super::events::EventPublisher;
use super::goal::{GoalEvaluation, GoalEvaluator};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contract types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identifiers threaded through every activity for event correlation.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationIds {
    pub task_id: Uuid,
    pub agent_id: Uuid,
    pub execution_id: Uuid,
}

/// One assistant turn as the workflow consumes it: parsed tool calls,
/// usage, and the cost already computed from the pricing table.
#[derive(Debug, Clone)]
pub struct AssistantTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub cost: f64,
}

/// Input to the LLM call activity.
pub struct LlmCallRequest<'a> {
    pub messages: &'a [Message],
    pub agent: &'a AgentConfig,
    pub tools: &'a [ToolDescriptor],
    pub streaming: bool,
    pub corr: CorrelationIds,
}

/// The activity surface invoked from the reasoning loop.
#[async_trait::async_trait]
pub trait Activities: Send + Sync {
    /// Resolve the agent's immutable execution config, or fail terminally.
    async fn build_agent_config(&self, agent_id: Uuid) -> Result<AgentConfig>;

    /// Discover the agent's tool catalog (`task_complete` always included).
    async fn discover_tools(&self, agent: &AgentConfig) -> Result<Vec<ToolDescriptor>>;

    /// Single-shot LLM completion; streaming emits chunk events through
    /// the publisher as a side effect.
    async fn call_llm(&self, req: LlmCallRequest<'_>) -> Result<AssistantTurn>;

    /// Execute one tool call. Never fails the workflow: every error shape
    /// is folded into the outcome.
    async fn execute_tool(
        &self,
        descriptor: &ToolDescriptor,
        args: &Value,
        cancel: &CancellationToken,
    ) -> ToolOutcome;

    /// Judge whether the conversation already satisfies the criteria.
    async fn evaluate_goal(
        &self,
        agent: &AgentConfig,
        messages: &[Message],
        criteria: &[String],
    ) -> Result<GoalEvaluation>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run `op` under a start-to-close timeout, retrying transient failures
/// with exponential backoff. Timeouts count as transient until the policy
/// exhausts; permanent errors surface immediately.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryConfig,
    timeout: Duration,
    what: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        let result = match tokio::time::timeout(timeout, op()).await {
            Ok(r) => r,
            Err(_) => Err(Error::Timeout(format!("{what} exceeded {timeout:?}"))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff_ms(attempt);
                tracing::warn!(
                    activity = what,
                    attempt,
                    delay_ms = delay,
                    error = %e,
                    "transient activity failure, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Production implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable dependency record built once at startup and handed to every
/// activity invocation.
pub struct ActivityDependencies {
    pub llm: Arc<ProviderRegistry>,
    pub mcp: Arc<McpManager>,
    pub agents: Arc<AgentRegistry>,
    pub publisher: Arc<EventPublisher>,
    pub pricing: HashMap<String, ModelPricing>,
    pub workflow: WorkflowConfig,
}

pub struct WorkerActivities {
    deps: ActivityDependencies,
    executor: ToolExecutor,
    evaluator: GoalEvaluator,
}

impl WorkerActivities {
    pub fn new(deps: ActivityDependencies) -> Self {
        let executor = ToolExecutor::new(
            deps.mcp.clone(),
            Duration::from_secs(deps.workflow.tool_timeout_secs),
        );
        let evaluator = GoalEvaluator::new(
            deps.llm.clone(),
            deps.pricing.clone(),
            deps.workflow.goal_model.clone(),
        );
        Self {
            deps,
            executor,
            evaluator,
        }
    }

    fn provider_for(&self, agent: &AgentConfig) -> Result<Arc<dyn LlmProvider>> {
        self.deps
            .llm
            .get(&agent.model.provider)
            .ok_or_else(|| Error::Provider {
                provider: agent.model.provider.clone(),
                message: "provider not registered".into(),
            })
    }

    fn cost_for(&self, model: &str, usage: &Usage) -> f64 {
        match self.deps.pricing.get(model) {
            Some(pricing) => pricing.estimate_cost(usage.prompt_tokens, usage.completion_tokens),
            None => {
                tracing::debug!(model, "no pricing configured, cost recorded as zero");
                0.0
            }
        }
    }

    fn completion_request(req: &LlmCallRequest<'_>) -> CompletionRequest {
        CompletionRequest {
            messages: req.messages.to_vec(),
            tools: req.tools.to_vec(),
            model: Some(req.agent.model.model.clone()),
            temperature: Some(0.2),
            max_tokens: None,
            json_mode: false,
        }
    }

    /// Consume a provider stream, forwarding token chunks through the
    /// publisher and assembling the final turn.
    async fn streamed_completion(
        &self,
        provider: &Arc<dyn LlmProvider>,
        creq: &CompletionRequest,
        corr: CorrelationIds,
    ) -> Result<(String, Vec<ToolCall>, Option<Usage>)> {
        let mut stream = provider.complete_stream(creq).await?;

        let mut content = String::new();
        let mut assembly = StreamingToolCalls::new();
        let mut usage: Option<Usage> = None;
        let mut chunk_index = 0u32;

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Token { text } => {
                    self.deps
                        .publisher
                        .llm_call_chunk(corr.task_id, &text, chunk_index, false);
                    chunk_index += 1;
                    content.push_str(&text);
                }
                StreamEvent::ToolCallStarted { index, id, name } => {
                    assembly.start(index, &id, &name);
                }
                StreamEvent::ToolCallDelta { index, arguments } => {
                    assembly.delta(index, &arguments);
                }
                StreamEvent::Done { usage: u, .. } => {
                    if u.is_some() {
                        usage = u;
                    }
                }
                StreamEvent::Error { message } => {
                    return Err(Error::Provider {
                        provider: provider.provider_id().into(),
                        message,
                    });
                }
            }
        }

        self.deps
            .publisher
            .llm_call_chunk(corr.task_id, "", chunk_index, true);

        let tool_calls = if assembly.is_empty() {
            parser::extract_tool_calls(&[], &content)
        } else {
            assembly.finish()
        };

        Ok((content, tool_calls, usage))
    }
}

#[async_trait::async_trait]
impl Activities for WorkerActivities {
    async fn build_agent_config(&self, agent_id: Uuid) -> Result<AgentConfig> {
        self.deps.agents.resolve_config(&agent_id)
    }

    async fn discover_tools(&self, agent: &AgentConfig) -> Result<Vec<ToolDescriptor>> {
        let catalog = ToolCatalog::resolve(agent, &self.deps.mcp);
        tracing::debug!(
            agent = %agent.name,
            tool_count = catalog.len(),
            "tool catalog resolved"
        );
        Ok(catalog.descriptors().to_vec())
    }

    async fn call_llm(&self, req: LlmCallRequest<'_>) -> Result<AssistantTurn> {
        let provider = self.provider_for(req.agent)?;
        let creq = Self::completion_request(&req);
        let timeout = Duration::from_secs(self.deps.workflow.llm_timeout_secs);
        let model = req.agent.model.model.clone();

        let span = tracing::info_span!(
            "llm.call",
            task_id = %req.corr.task_id,
            execution_id = %req.corr.execution_id,
            model = %model,
        );

        let streaming = req.streaming;
        let corr = req.corr;
        let provider_ref = &provider;
        let creq_ref = &creq;
        let call = async {
            if streaming {
                with_retry(&self.deps.workflow.retry, timeout, "call_llm", move || {
                    self.streamed_completion(provider_ref, creq_ref, corr)
                })
                .await
            } else {
                let response =
                    with_retry(&self.deps.workflow.retry, timeout, "call_llm", move || {
                        provider_ref.complete(creq_ref)
                    })
                    .await?;
                let tool_calls =
                    parser::extract_tool_calls(&response.tool_calls, &response.content);
                Ok((response.content, tool_calls, response.usage))
            }
        };
        let (content, tool_calls, usage) = call.instrument(span).await?;

        let usage = usage.unwrap_or_default();
        let cost = self.cost_for(&model, &usage);

        Ok(AssistantTurn {
            content,
            tool_calls,
            usage,
            cost,
        })
    }

    async fn execute_tool(
        &self,
        descriptor: &ToolDescriptor,
        args: &Value,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        let span = tracing::info_span!("tool.call", tool_name = descriptor.name());
        self.executor
            .execute(descriptor, args, cancel)
            .instrument(span)
            .await
    }

    async fn evaluate_goal(
        &self,
        agent: &AgentConfig,
        messages: &[Message],
        criteria: &[String],
    ) -> Result<GoalEvaluation> {
        let timeout = Duration::from_secs(self.deps.workflow.llm_timeout_secs);
        let evaluator = &self.evaluator;
        with_retry(&self.deps.workflow.retry, timeout, "evaluate_goal", move || {
            evaluator.evaluate(agent, messages, criteria)
        })
        .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_interval_ms: 1,
            max_interval_ms: 5,
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), Duration::from_secs(1), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Http("502".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_exhaustion_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> =
            with_retry(&fast_policy(2), Duration::from_secs(1), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::RateLimited("429".into())) }
            })
            .await;
        assert!(matches!(result.unwrap_err(), Error::RateLimited(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<()> =
            with_retry(&fast_policy(5), Duration::from_secs(1), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Auth("bad key".into())) }
            })
            .await;
        assert!(matches!(result.unwrap_err(), Error::Auth(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_counts_as_transient() {
        let calls = AtomicU32::new(0);
        let result: Result<()> =
            with_retry(&fast_policy(2), Duration::from_millis(10), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                }
            })
            .await;
        assert!(matches!(result.unwrap_err(), Error::Timeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

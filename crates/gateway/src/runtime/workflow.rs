//! The reasoning workflow — a bounded, cancellable, pausable loop that
//! builds context, requests LLM completions with the agent's tool catalog,
//! executes requested tool calls, and decides whether the goal is met.
//!
//! One spawned task per execution; the loop body is single-threaded and
//! suspends only at activity boundaries, the pause gate, and the execution
//! deadline. All I/O happens inside [`Activities`]. Exactly one terminal
//! event (`WorkflowCompleted`, `WorkflowFailed`, or `WorkflowCancelled`)
//! is emitted per execution.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

use ah_domain::agent::AgentConfig;
use ah_domain::budget::BudgetState;
use ah_domain::error::{Error, Result};
use ah_domain::message::Message;
use ah_domain::task::UserContext;
use ah_domain::tool::TASK_COMPLETE;
use ah_tools::ToolCatalog;

use super::activities::{Activities, CorrelationIds, LlmCallRequest};
use super::broker::task_topic;
use super::signals::SignalHandle;
use super::tasks::TaskService;

/// Nudge appended when the model produces neither content nor tool calls.
const CONTINUE_NUDGE: &str = "Continue; call task_complete when done.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inputs and outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a workflow execution starts with.
pub struct ExecutionRequest {
    pub task_id: Uuid,
    pub agent_id: Uuid,
    pub user: UserContext,
    pub task_query: String,
    /// Arbitrary submission parameters; `success_criteria` and
    /// `max_iterations` are recognized.
    pub parameters: Value,
    pub budget_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Completed { success: bool },
    MaxIterations,
    BudgetExceeded,
    Cancelled,
}

impl Termination {
    fn reason(self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::MaxIterations => "max_iterations",
            Self::BudgetExceeded => "budget_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

struct WorkflowOutcome {
    termination: Termination,
    final_response: Option<String>,
    iterations: u32,
    total_cost: f64,
}

/// Parameters recognized inside `ExecutionRequest::parameters`.
struct WorkflowParams {
    success_criteria: Vec<String>,
    max_iterations: Option<u32>,
}

impl WorkflowParams {
    fn from_value(parameters: &Value) -> Self {
        Self {
            success_criteria: parameters
                .get("success_criteria")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|c| c.as_str())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            max_iterations: parameters
                .get("max_iterations")
                .and_then(|v| v.as_u64())
                .map(|n| n as u32),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Spawn a workflow execution. Returns its execution id immediately; the
/// loop runs on its own task under the workspace concurrency clamp.
pub(crate) fn spawn(service: Arc<TaskService>, request: ExecutionRequest) -> Uuid {
    let execution_id = Uuid::new_v4();
    let signals = service.signals().register(request.task_id);

    let span = tracing::info_span!(
        "workflow",
        task_id = %request.task_id,
        agent_id = %request.agent_id,
        %execution_id,
    );
    tokio::spawn(run(service, request, execution_id, signals).instrument(span));
    execution_id
}

async fn run(
    service: Arc<TaskService>,
    request: ExecutionRequest,
    execution_id: Uuid,
    mut signals: SignalHandle,
) {
    let task_id = request.task_id;

    // Per-workspace concurrency clamp; queued executions stay `submitted`.
    let semaphore = service.workspace_semaphore(&request.user.workspace_id);
    let _permit = semaphore.acquire_owned().await;

    service.mark_running(&task_id, execution_id);
    tracing::debug!("workflow started");

    let deadline = Duration::from_secs(service.config().execution_timeout_secs);
    let result = tokio::time::timeout(
        deadline,
        run_inner(&service, &request, execution_id, &mut signals),
    )
    .await;

    let publisher = service.publisher().clone();
    match result {
        Ok(Ok(outcome)) => finalize(&service, task_id, outcome),
        Ok(Err(e)) => {
            let kind = error_kind(&e);
            tracing::error!(error = %e, error_kind = kind, "workflow failed");
            publisher.workflow_failed(task_id, kind, &e.to_string());
            service.finish_failed(&task_id, kind, &e.to_string(), None, 0.0);
        }
        Err(_) => {
            let message = format!("workflow execution deadline of {deadline:?} exceeded");
            tracing::error!("{message}");
            publisher.workflow_failed(task_id, "execution_timeout", &message);
            service.finish_failed(&task_id, "execution_timeout", &message, None, 0.0);
        }
    }

    service.signals().remove(&task_id);
    publisher.broker().remove_topic(&task_topic(&task_id));
}

fn finalize(service: &Arc<TaskService>, task_id: Uuid, outcome: WorkflowOutcome) {
    let publisher = service.publisher();
    let response = outcome.final_response.as_deref();

    match outcome.termination {
        Termination::Cancelled => {
            publisher.workflow_cancelled(task_id, outcome.iterations, outcome.total_cost, response);
            service.finish_cancelled(&task_id, outcome.final_response.clone(), outcome.total_cost);
        }
        Termination::Completed { success } => {
            publisher.workflow_completed(
                task_id,
                success,
                response,
                outcome.total_cost,
                outcome.iterations,
                outcome.termination.reason(),
            );
            if success {
                service.finish_completed(
                    &task_id,
                    outcome.final_response.clone(),
                    outcome.total_cost,
                );
            } else {
                service.finish_failed(
                    &task_id,
                    "task_unsuccessful",
                    "agent reported an unsuccessful completion",
                    outcome.final_response.clone(),
                    outcome.total_cost,
                );
            }
        }
        Termination::MaxIterations | Termination::BudgetExceeded => {
            let reason = outcome.termination.reason();
            publisher.workflow_completed(
                task_id,
                false,
                response,
                outcome.total_cost,
                outcome.iterations,
                reason,
            );
            let message = match outcome.termination {
                Termination::MaxIterations => {
                    format!("iteration cap reached after {} iterations", outcome.iterations)
                }
                _ => format!("budget exhausted at ${:.4}", outcome.total_cost),
            };
            service.finish_failed(&task_id, reason, &message, None, outcome.total_cost);
        }
    }

    tracing::info!(
        termination = outcome.termination.reason(),
        iterations = outcome.iterations,
        total_cost = outcome.total_cost,
        "workflow finished"
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_inner(
    service: &Arc<TaskService>,
    request: &ExecutionRequest,
    execution_id: Uuid,
    signals: &mut SignalHandle,
) -> Result<WorkflowOutcome> {
    let task_id = request.task_id;
    let activities = service.activities().clone();
    let publisher = service.publisher().clone();
    let config = service.config().clone();
    let corr = CorrelationIds {
        task_id,
        agent_id: request.agent_id,
        execution_id,
    };

    // ── Startup: config, tools, initial conversation ───────────────
    let agent = activities.build_agent_config(request.agent_id).await?;
    let catalog = ToolCatalog::new(activities.discover_tools(&agent).await?);

    let params = WorkflowParams::from_value(&request.parameters);
    let max_iterations = config.resolve_max_iterations(params.max_iterations);

    let mut messages = vec![
        Message::system(build_system_prompt(&agent, &params.success_criteria)),
        Message::user(&request.task_query),
    ];

    publisher.workflow_started(
        task_id,
        execution_id,
        &agent.name,
        max_iterations,
        request.budget_usd,
    );

    let mut budget = BudgetState::new(request.budget_usd);
    let mut iterations = 0u32;
    let mut goal_achieved = false;
    let mut completion_success = false;
    let mut budget_terminated = false;
    let mut final_response: Option<String> = None;
    let mut last_assistant = String::new();

    let termination = loop {
        // ── Termination predicates ─────────────────────────────────
        if signals.cancel.is_cancelled() {
            break Termination::Cancelled;
        }
        if goal_achieved {
            break Termination::Completed {
                success: completion_success,
            };
        }
        if budget_terminated {
            break Termination::BudgetExceeded;
        }
        if iterations >= max_iterations {
            break Termination::MaxIterations;
        }

        // ── Pause gate (cancellation still honored) ────────────────
        if *signals.pause.borrow() {
            publisher.workflow_paused(task_id, iterations + 1);
            service.mark_paused(&task_id);
            if !wait_for_resume(signals).await {
                break Termination::Cancelled;
            }
            publisher.workflow_resumed(task_id, iterations + 1);
            service.mark_resumed(&task_id);
        }

        iterations += 1;
        publisher.iteration_started(task_id, iterations);

        // ── LLM call ───────────────────────────────────────────────
        publisher.llm_call_started(task_id, iterations);
        let turn = tokio::select! {
            biased;
            _ = signals.cancel.cancelled() => break Termination::Cancelled,
            turn = activities.call_llm(LlmCallRequest {
                messages: &messages,
                agent: &agent,
                tools: catalog.descriptors(),
                streaming: agent.streaming,
                corr,
            }) => turn?,
        };
        publisher.llm_call_completed(
            task_id,
            iterations,
            &turn.content,
            &turn.tool_calls,
            &turn.usage,
            turn.cost,
        );

        // ── Budget accounting ──────────────────────────────────────
        budget.accrue(turn.cost);
        service.record_cost(&task_id, budget.accrued_usd);
        if budget.is_exceeded() {
            publisher.budget_exceeded(task_id, budget.accrued_usd, budget.limit_usd);
        } else if budget.should_warn() {
            publisher.budget_warning(task_id, budget.accrued_usd, budget.limit_usd);
            budget.mark_warning_sent();
        }

        if !turn.content.is_empty() {
            last_assistant = turn.content.clone();
        }
        let tool_calls = turn.tool_calls;
        messages.push(Message::assistant(turn.content.clone(), tool_calls.clone()));

        // The assistant message is kept, but its tool calls are not
        // executed once the budget is gone.
        if budget.is_exceeded() {
            budget_terminated = true;
            continue;
        }

        if turn.content.is_empty() && tool_calls.is_empty() {
            messages.push(Message::user(CONTINUE_NUDGE));
            continue;
        }

        // ── Tool dispatch, sequential in model order ───────────────
        let mut seen_ids: HashSet<&str> = HashSet::new();
        for call in &tool_calls {
            if !seen_ids.insert(call.id.as_str()) {
                messages.push(Message::tool_result(&call.id, &call.name, false, "duplicate_id"));
                continue;
            }

            if call.name == TASK_COMPLETE {
                let args = parse_tool_arguments(&call.arguments);
                publisher.tool_call_started(
                    task_id,
                    TASK_COMPLETE,
                    args.as_ref().unwrap_or(&Value::Null),
                );
                let Some(args) = args else {
                    publisher.tool_call_completed(
                        task_id,
                        TASK_COMPLETE,
                        false,
                        &json!({"error": "invalid_arguments"}),
                    );
                    messages.push(Message::tool_result(
                        &call.id,
                        TASK_COMPLETE,
                        false,
                        "invalid_arguments",
                    ));
                    continue;
                };

                let success = args
                    .get("success")
                    .and_then(value_as_bool)
                    .unwrap_or(true);
                let response = args
                    .get("result")
                    .map(value_to_text)
                    .filter(|s| !s.is_empty())
                    .or_else(|| (!last_assistant.is_empty()).then(|| last_assistant.clone()));

                publisher.tool_call_completed(task_id, TASK_COMPLETE, success, &args);
                messages.push(Message::tool_result(
                    &call.id,
                    TASK_COMPLETE,
                    true,
                    response.clone().unwrap_or_default(),
                ));

                final_response = response;
                completion_success = success;
                goal_achieved = true;
                // Remaining calls in this turn are dropped.
                break;
            }

            let Some(descriptor) = catalog.get(&call.name) else {
                publisher.tool_call_started(task_id, &call.name, &Value::Null);
                publisher.tool_call_completed(
                    task_id,
                    &call.name,
                    false,
                    &json!({"error": "unknown_tool"}),
                );
                messages.push(Message::tool_result(&call.id, &call.name, false, "unknown_tool"));
                continue;
            };

            let Some(args) = parse_tool_arguments(&call.arguments) else {
                messages.push(Message::tool_result(
                    &call.id,
                    &call.name,
                    false,
                    "invalid_arguments",
                ));
                continue;
            };

            publisher.tool_call_started(task_id, &call.name, &args);
            let outcome = activities.execute_tool(descriptor, &args, &signals.cancel).await;
            let result_data = if outcome.success {
                outcome.result.clone()
            } else {
                json!({ "error": outcome.error.clone() })
            };
            publisher.tool_call_completed(task_id, &call.name, outcome.success, &result_data);
            messages.push(Message::tool_result(
                &call.id,
                &call.name,
                outcome.success,
                outcome.content(),
            ));
        }

        if goal_achieved {
            continue;
        }

        // ── Goal evaluation ────────────────────────────────────────
        if !params.success_criteria.is_empty() {
            let eval = tokio::select! {
                biased;
                _ = signals.cancel.cancelled() => break Termination::Cancelled,
                eval = activities.evaluate_goal(&agent, &messages, &params.success_criteria) => eval,
            };
            match eval {
                Ok(eval) => {
                    budget.accrue(eval.cost);
                    service.record_cost(&task_id, budget.accrued_usd);
                    if budget.is_exceeded() {
                        publisher.budget_exceeded(task_id, budget.accrued_usd, budget.limit_usd);
                        budget_terminated = true;
                    } else if budget.should_warn() {
                        publisher.budget_warning(task_id, budget.accrued_usd, budget.limit_usd);
                        budget.mark_warning_sent();
                    }

                    publisher.goal_evaluated(task_id, eval.achieved, eval.confidence, eval.cost);
                    if eval.achieved && eval.confidence >= config.goal_confidence_threshold {
                        final_response = eval
                            .final_response
                            .or_else(|| (!last_assistant.is_empty()).then(|| last_assistant.clone()));
                        completion_success = true;
                        goal_achieved = true;
                    }
                }
                Err(e) => {
                    // Evaluation never terminates the workflow by itself.
                    tracing::warn!(error = %e, "goal evaluation failed, continuing");
                }
            }
        }
    };

    let final_response = match termination {
        Termination::Completed { .. } => final_response,
        Termination::Cancelled => final_response
            .or_else(|| (!last_assistant.is_empty()).then(|| last_assistant.clone())),
        _ => None,
    };

    Ok(WorkflowOutcome {
        termination,
        final_response,
        iterations,
        total_cost: budget.accrued_usd,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wait at the pause gate until resumed. Returns false when cancellation
/// arrived first.
async fn wait_for_resume(signals: &mut SignalHandle) -> bool {
    loop {
        tokio::select! {
            biased;
            _ = signals.cancel.cancelled() => return false,
            changed = signals.pause.changed() => {
                // A dropped hub counts as resumed; the next predicate
                // check decides what happens.
                if changed.is_err() || !*signals.pause.borrow() {
                    return true;
                }
            }
        }
    }
}

fn build_system_prompt(agent: &AgentConfig, criteria: &[String]) -> String {
    let mut prompt = agent.instruction.trim().to_string();

    if !criteria.is_empty() {
        prompt.push_str("\n\nSuccess criteria:\n");
        for (i, criterion) in criteria.iter().enumerate() {
            prompt.push_str(&format!("{}. {criterion}\n", i + 1));
        }
    }

    prompt.push_str(
        "\n\nWhen the task is finished, call the `task_complete` tool with \
         success=true and the final result. Calling `task_complete` is the \
         only way to signal completion.",
    );
    prompt
}

/// Parse a tool call's JSON-encoded argument string, recovering free text
/// as `{"text": <raw>}` and bare values as `{"value": …}`. `None` means
/// the arguments are unrepresentable and the call must be rejected.
fn parse_tool_arguments(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(json!({}));
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v @ Value::Object(_)) => Some(v),
        Ok(other) => Some(json!({ "value": other })),
        Err(_) => serde_json::to_value(trimmed)
            .ok()
            .map(|text| json!({ "text": text })),
    }
}

fn value_as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn error_kind(e: &Error) -> &'static str {
    match e {
        Error::Auth(_) => "provider_auth",
        Error::Provider { .. } => "provider_error",
        Error::AgentNotFound(_) => "agent_not_found",
        Error::Config(_) => "config_error",
        Error::Timeout(_) => "timeout",
        Error::Http(_) => "network",
        Error::RateLimited(_) => "rate_limited",
        _ => "internal",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

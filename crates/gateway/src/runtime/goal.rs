//! Goal progress evaluation.
//!
//! Decides whether the accumulated conversation already satisfies the
//! task's success criteria, independent of an explicit `task_complete`
//! call. Implemented as a JSON-mode call on a cheap configured model; the
//! only side effect is the cost it reports back for accrual.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use ah_domain::agent::{AgentConfig, ModelDescriptor};
use ah_domain::config::ModelPricing;
use ah_domain::error::{Error, Result};
use ah_domain::message::Message;
use ah_domain::stream::Usage;
use ah_providers::{CompletionRequest, LlmProvider, ProviderRegistry};

/// What the evaluator concluded about the conversation so far.
#[derive(Debug, Clone)]
pub struct GoalEvaluation {
    pub achieved: bool,
    pub confidence: f64,
    pub final_response: Option<String>,
    pub cost: f64,
}

impl GoalEvaluation {
    /// The negative verdict used when evaluation is skipped.
    pub fn not_achieved() -> Self {
        Self {
            achieved: false,
            confidence: 0.0,
            final_response: None,
            cost: 0.0,
        }
    }
}

/// Most recent conversation characters offered to the evaluator.
const TRANSCRIPT_BUDGET: usize = 8_000;

const EVALUATOR_INSTRUCTION: &str = "You judge whether a task's success criteria are already \
satisfied by the conversation so far. Respond with a single JSON object: \
{\"achieved\": bool, \"confidence\": number between 0 and 1, \
\"final_response\": string or null}. Set final_response to the best final \
answer only when achieved is true.";

pub struct GoalEvaluator {
    llm: Arc<ProviderRegistry>,
    pricing: HashMap<String, ModelPricing>,
    /// "provider/model" override; the agent's own model is the fallback.
    goal_model: Option<String>,
}

impl GoalEvaluator {
    pub fn new(
        llm: Arc<ProviderRegistry>,
        pricing: HashMap<String, ModelPricing>,
        goal_model: Option<String>,
    ) -> Self {
        Self {
            llm,
            pricing,
            goal_model,
        }
    }

    /// Evaluate the conversation against the success criteria.
    pub async fn evaluate(
        &self,
        agent: &AgentConfig,
        messages: &[Message],
        criteria: &[String],
    ) -> Result<GoalEvaluation> {
        if criteria.is_empty() {
            return Ok(GoalEvaluation::not_achieved());
        }

        let model = self
            .goal_model
            .as_deref()
            .and_then(ModelDescriptor::parse)
            .unwrap_or_else(|| agent.model.clone());

        let provider = self.llm.get(&model.provider).ok_or_else(|| Error::Provider {
            provider: model.provider.clone(),
            message: "goal evaluator provider not registered".into(),
        })?;

        let criteria_list = criteria
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {c}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        let request = CompletionRequest {
            messages: vec![
                Message::system(EVALUATOR_INSTRUCTION),
                Message::user(format!(
                    "Success criteria:\n{criteria_list}\n\nConversation:\n{}",
                    render_transcript(messages, TRANSCRIPT_BUDGET)
                )),
            ],
            tools: Vec::new(),
            model: Some(model.model.clone()),
            temperature: Some(0.0),
            max_tokens: Some(512),
            json_mode: true,
        };

        let response = provider.complete(&request).await?;
        let cost = estimate_cost(&self.pricing, &model.model, response.usage.as_ref());

        let mut evaluation = parse_evaluation(&response.content);
        evaluation.cost = cost;
        Ok(evaluation)
    }
}

/// Parse the evaluator's JSON verdict; an unparseable response counts as
/// not-achieved rather than failing the workflow.
pub(crate) fn parse_evaluation(content: &str) -> GoalEvaluation {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let parsed: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "goal evaluator returned unparseable JSON");
            return GoalEvaluation::not_achieved();
        }
    };

    GoalEvaluation {
        achieved: parsed
            .get("achieved")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        confidence: parsed
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
        final_response: parsed
            .get("final_response")
            .and_then(|v| v.as_str())
            .map(String::from),
        cost: 0.0,
    }
}

/// Render the most recent conversation turns within a character budget.
pub(crate) fn render_transcript(messages: &[Message], budget: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut used = 0;

    for msg in messages.iter().rev() {
        let line = match msg {
            Message::System { .. } => continue,
            Message::User { content } => format!("user: {content}"),
            Message::Assistant { content, tool_calls } => {
                if tool_calls.is_empty() {
                    format!("assistant: {content}")
                } else {
                    let names: Vec<&str> =
                        tool_calls.iter().map(|tc| tc.name.as_str()).collect();
                    format!("assistant: {content} [calls: {}]", names.join(", "))
                }
            }
            Message::Tool {
                tool_name,
                success,
                content,
                ..
            } => format!(
                "tool {tool_name} ({}): {content}",
                if *success { "ok" } else { "error" }
            ),
        };

        used += line.len() + 1;
        if used > budget && !lines.is_empty() {
            break;
        }
        lines.push(line);
    }

    lines.reverse();
    lines.join("\n")
}

fn estimate_cost(
    pricing: &HashMap<String, ModelPricing>,
    model: &str,
    usage: Option<&Usage>,
) -> f64 {
    match (pricing.get(model), usage) {
        (Some(p), Some(u)) => p.estimate_cost(u.prompt_tokens, u.completion_tokens),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_clean_verdict() {
        let eval = parse_evaluation(
            r#"{"achieved": true, "confidence": 0.92, "final_response": "42"}"#,
        );
        assert!(eval.achieved);
        assert!((eval.confidence - 0.92).abs() < 1e-9);
        assert_eq!(eval.final_response.as_deref(), Some("42"));
    }

    #[test]
    fn parse_fenced_verdict() {
        let eval = parse_evaluation(
            "```json\n{\"achieved\": false, \"confidence\": 0.3, \"final_response\": null}\n```",
        );
        assert!(!eval.achieved);
        assert!((eval.confidence - 0.3).abs() < 1e-9);
        assert!(eval.final_response.is_none());
    }

    #[test]
    fn unparseable_verdict_is_not_achieved() {
        let eval = parse_evaluation("I think it is done!");
        assert!(!eval.achieved);
        assert_eq!(eval.confidence, 0.0);
    }

    #[test]
    fn missing_fields_default_pessimistic() {
        let eval = parse_evaluation(r#"{"achieved": true}"#);
        assert!(eval.achieved);
        assert_eq!(eval.confidence, 0.0);
    }

    #[test]
    fn transcript_renders_roles_and_tool_status() {
        let messages = vec![
            Message::system("instructions"),
            Message::user("compute 15+27"),
            Message::assistant("", vec![ah_domain::message::ToolCall::new(
                "c1",
                "calculator",
                "{}",
            )]),
            Message::tool_result("c1", "calculator", true, "42"),
        ];
        let rendered = render_transcript(&messages, 10_000);
        assert!(rendered.contains("user: compute 15+27"));
        assert!(rendered.contains("[calls: calculator]"));
        assert!(rendered.contains("tool calculator (ok): 42"));
        assert!(!rendered.contains("instructions"));
    }

    #[test]
    fn transcript_keeps_most_recent_within_budget() {
        let mut messages = Vec::new();
        for i in 0..100 {
            messages.push(Message::user(format!("message number {i}")));
        }
        let rendered = render_transcript(&messages, 200);
        assert!(rendered.contains("message number 99"));
        assert!(!rendered.contains("message number 0\n"));
    }
}

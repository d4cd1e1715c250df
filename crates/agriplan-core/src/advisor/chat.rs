//! OpenAI-compatible chat-completions advisor.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Advisor, PlanContext, ProposedAction};
use crate::error::ProviderError;

const CHAT_TIMEOUT: Duration = Duration::from_secs(25);
const TEMPERATURE: f32 = 0.2;

/// Operations listed in the summary prompt; the rest are counted.
const PROMPT_OPERATION_LIMIT: usize = 60;

const SUMMARY_SYSTEM: &str = "You are a sugarcane agronomist advising Thai farmers. \
     Write a concise Markdown summary of the cultivation plan with practical priorities.";

const ACTIONS_SYSTEM: &str = "You are a sugarcane agronomist advising Thai farmers. \
     Reply ONLY with JSON of the form {\"actions\":[{\"type\":\"irrigation|fertilizer|pesticide|inspect|advisory\",\
     \"title\":\"...\",\"qty\":number|null,\"unit\":\"...\"|null,\"notes\":\"...\"}]}.";

pub struct ChatAdvisor {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatAdvisor {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(CHAT_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_owned(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::Empty);
        }
        debug!(model = %self.model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    actions: Vec<ProposedAction>,
}

#[async_trait]
impl Advisor for ChatAdvisor {
    fn name(&self) -> &str {
        &self.model
    }

    async fn summarize_plan(&self, ctx: &PlanContext<'_>) -> Result<String, ProviderError> {
        self.complete(SUMMARY_SYSTEM, summary_prompt(ctx)).await
    }

    async fn propose_actions(
        &self,
        ctx: &PlanContext<'_>,
        problems: &[String],
    ) -> Result<Vec<ProposedAction>, ProviderError> {
        let content = self
            .complete(ACTIONS_SYSTEM, actions_prompt(ctx, problems))
            .await?;
        parse_actions(&content)
    }
}

fn describe_field(out: &mut String, ctx: &PlanContext<'_>) {
    let f = ctx.field;
    let _ = writeln!(
        out,
        "Field: variety {}, crop {}, {:.2} rai in {} {}, soil {}, irrigation {} (pump {} m3/h), planted {}",
        f.variety,
        f.crop_type,
        f.area_rai,
        f.district,
        f.province,
        f.soil_texture,
        f.irrigation_source,
        f.pump_m3h.map_or_else(|| "n/a".to_owned(), |p| format!("{p:.1}")),
        f.planting_date
    );
}

fn summary_prompt(ctx: &PlanContext<'_>) -> String {
    let mut out = String::new();
    describe_field(&mut out, ctx);

    out.push_str("\nStages:\n");
    for stage in ctx.stages {
        let _ = writeln!(
            out,
            "- {}: {} to {}, {:.1} mm/day. {}",
            stage.stage, stage.start_date, stage.end_date, stage.water_mm_day, stage.notes
        );
    }

    out.push_str("\nOperations:\n");
    for op in ctx.operations.iter().take(PROMPT_OPERATION_LIMIT) {
        let qty = match (op.quantity, op.unit.as_deref()) {
            (Some(q), Some(u)) => format!(" ({q:.1} {u})"),
            (Some(q), None) => format!(" ({q:.1})"),
            _ => String::new(),
        };
        let _ = writeln!(out, "- {} {}: {}{}", op.date, op.kind, op.title, qty);
    }
    if ctx.operations.len() > PROMPT_OPERATION_LIMIT {
        let _ = writeln!(
            out,
            "- ... and {} more",
            ctx.operations.len() - PROMPT_OPERATION_LIMIT
        );
    }

    if !ctx.kb_context.is_empty() {
        out.push_str("\nReference material:\n");
        out.push_str(ctx.kb_context);
        out.push('\n');
    }
    out
}

fn actions_prompt(ctx: &PlanContext<'_>, problems: &[String]) -> String {
    let mut out = String::new();
    describe_field(&mut out, ctx);
    out.push_str("\nReported problems:\n");
    for p in problems {
        let _ = writeln!(out, "- {p}");
    }
    if !ctx.kb_context.is_empty() {
        out.push_str("\nReference material:\n");
        out.push_str(ctx.kb_context);
        out.push('\n');
    }
    out.push_str("\nPropose the most useful actions for the next few days, highest priority first.");
    out
}

/// Strip a surrounding Markdown code fence, with or without a language tag.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse a provider reply into actions.
///
/// Accepts `{"actions": [...]}` or a bare array, optionally fenced.
pub(crate) fn parse_actions(content: &str) -> Result<Vec<ProposedAction>, ProviderError> {
    let body = strip_code_fence(content);
    let actions = match serde_json::from_str::<ActionEnvelope>(body) {
        Ok(envelope) => envelope.actions,
        Err(_) => serde_json::from_str::<Vec<ProposedAction>>(body)?,
    };
    if actions.is_empty() {
        return Err(ProviderError::Empty);
    }
    Ok(actions)
}

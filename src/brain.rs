//! Reasoning service backed by an OpenAI-compatible chat completions API.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonschema::{Draft, JSONSchema};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use crate::capability::Reasoner;
use crate::config::LlmConfig;
use crate::types::{Action, Decision, Observation, Reflection, Step};

static CLICK_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Click\(\s*(\d+(?:\.\d+)?)\s*,\s*(\d+(?:\.\d+)?)\s*\)").expect("valid regex")
});

const OBSERVE_PROMPT: &str = r#"You are looking at a screenshot of a browser page while working toward a subgoal.
Describe what the page shows, whether the last action appears to have worked, what is still left to do
in this view, and every element that can be interacted with (links, buttons, inputs, scrollable lists).
Describe each element by how it looks and what it is labelled, so it can be found again visually.
Reply with JSON: {"observation": string, "reflection": string,
"relevant_page_actions": [{"type": string, "description": string, "label": string}]}"#;

const REFLECT_PROMPT: &str = r#"You supervise a browser agent. Given the overall goal, the current URL and the
recent trajectory (the newest observation is last), decide how to proceed:
- "continue": more work is needed; param is the next small, concrete subgoal.
- "finished": the trajectory shows the goal is fully met, including any data it asked for; param holds the complete answer.
- "break": the same approach keeps failing and there is no way forward; param explains why.
An empty trajectory always means "continue".
Reply with JSON: {"reflection": string, "decision": "continue" | "finished" | "break", "param": string}"#;

const ACT_PROMPT: &str = r#"You control a browser and must choose exactly ONE next action toward the subgoal.
Trust `current_page` (a description of the live screenshot) over anything else.
Actions:
- navigate: param is a URL.
- click: param describes the element to click as it appears on screen. Click a field before typing into it.
- type: param is the text; Enter and Tab are pressed automatically afterwards.
- scroll_down / scroll_up: param describes the area to scroll.
- look: read the page text; action_goal says what to extract.
- wait: let the page finish loading.
Accept cookie banners and close popups before anything else.
Reply with JSON: {"action": string, "action_goal": string, "param": string}"#;

const LOCATE_PROMPT: &str = "Find the element in the screenshot. Answer only with Click(x, y) where x and y are percentages of the image width and height.";

const SUMMARIZE_PROMPT: &str =
    "Given the text content of a web page and a goal, extract the information relevant to the goal.";

const BAKE_PROMPT: &str =
    "Turn the raw answer into a final response that follows the given JSON schema exactly. Reply with JSON only.";

pub struct LlmReasoner {
    client: Client,
    config: LlmConfig,
}

impl LlmReasoner {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(LlmConfig::from_env()?))
    }

    async fn complete(
        &self,
        model: &str,
        messages: Value,
        response_format: Option<Value>,
    ) -> Result<String> {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": 0.2,
        });
        if let Some(format) = response_format {
            body["response_format"] = format;
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let json_resp: Value = response.json().await?;

        if !status.is_success() {
            let err_msg = json_resp["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error");
            bail!("LLM API error ({status}): {err_msg}");
        }

        let content = json_resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("No content in LLM response: {json_resp}"))?;
        debug!(model, reply = %content, "LLM reply");
        Ok(content.to_string())
    }

    async fn ask_json<T: DeserializeOwned>(
        &self,
        model: &str,
        system: &str,
        user: Value,
    ) -> Result<T> {
        let messages = json!([
            {"role": "system", "content": system},
            {"role": "user", "content": user},
        ]);
        let content = self
            .complete(model, messages, Some(json!({"type": "json_object"})))
            .await?;
        parse_json_reply(&content)
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn observe(
        &self,
        subgoal: Option<&str>,
        trajectory: &[Step],
        snapshot: Option<&Path>,
    ) -> Result<Observation> {
        let snapshot = snapshot.ok_or_else(|| anyhow!("no screenshot to analyze"))?;
        let png = tokio::fs::read(snapshot)
            .await
            .with_context(|| format!("reading {}", snapshot.display()))?;

        let context = json!({
            "subgoal": subgoal,
            "last_action": trajectory.last(),
        });
        let user = json!([
            {"type": "text", "text": context.to_string()},
            {"type": "image_url", "image_url": {"url": data_url(&png)}},
        ]);
        self.ask_json(&self.config.vision_model, OBSERVE_PROMPT, user).await
    }

    async fn reflect(&self, goal: &str, url: &str, trajectory: &[Step]) -> Result<Reflection> {
        let input = json!({
            "goal": goal,
            "current_url": url,
            "trajectory": trajectory,
        });
        let reply: ReflectionReply = self
            .ask_json(&self.config.model, REFLECT_PROMPT, json!(input.to_string()))
            .await?;
        Ok(reply.into())
    }

    async fn act(
        &self,
        subgoal: &str,
        url: &str,
        trajectory: &[Step],
        observation: &Observation,
    ) -> Result<Action> {
        let input = json!({
            "goal": subgoal,
            "current_url": url,
            "trajectory": trajectory,
            "current_page": observation,
        });
        self.ask_json(&self.config.model, ACT_PROMPT, json!(input.to_string()))
            .await
    }

    async fn bake(&self, raw: &str, schema: &Value) -> Result<Value> {
        let messages = json!([
            {"role": "system", "content": BAKE_PROMPT},
            {"role": "user", "content": json!({"raw_response": raw}).to_string()},
        ]);
        let format = json!({
            "type": "json_schema",
            "json_schema": {"name": "final_response", "schema": schema},
        });
        let content = self
            .complete(&self.config.model, messages, Some(format))
            .await?;
        let baked: Value = parse_json_reply(&content)?;
        validate_baked(&baked, schema)?;
        Ok(baked)
    }

    async fn locate(&self, snapshot: &Path, description: &str) -> Result<(f64, f64)> {
        let png = tokio::fs::read(snapshot)
            .await
            .with_context(|| format!("reading {}", snapshot.display()))?;
        let messages = json!([
            {"role": "system", "content": LOCATE_PROMPT},
            {"role": "user", "content": [
                {"type": "text", "text": description},
                {"type": "image_url", "image_url": {"url": data_url(&png)}},
            ]},
        ]);
        let content = self
            .complete(&self.config.vision_model, messages, None)
            .await?;
        parse_click_point(&content)
    }

    async fn summarize(&self, goal: &str, page_text: &str) -> Result<String> {
        let messages = json!([
            {"role": "system", "content": SUMMARIZE_PROMPT},
            {"role": "user", "content": json!({"goal": goal, "page_content": page_text}).to_string()},
        ]);
        self.complete(&self.config.model, messages, None).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DecisionKind {
    Continue,
    #[serde(alias = "finish")]
    Finished,
    Break,
}

#[derive(Debug, Deserialize)]
struct ReflectionReply {
    #[serde(default)]
    reflection: String,
    decision: DecisionKind,
    #[serde(default)]
    param: String,
}

impl From<ReflectionReply> for Reflection {
    fn from(reply: ReflectionReply) -> Self {
        let decision = match reply.decision {
            DecisionKind::Continue => Decision::Continue {
                subgoal: reply.param,
            },
            DecisionKind::Finished => Decision::Finished {
                result: reply.param,
            },
            DecisionKind::Break => Decision::Break {
                result: reply.param,
            },
        };
        Reflection::new(reply.reflection, decision)
    }
}

fn data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Strip markdown fences the model might wrap around JSON, then parse.
fn parse_json_reply<T: DeserializeOwned>(content: &str) -> Result<T> {
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(cleaned).with_context(|| format!("Failed to parse LLM response: {cleaned}"))
}

/// Percent coordinates from a `Click(x, y)` answer, normalized to `[0, 1]`.
fn parse_click_point(content: &str) -> Result<(f64, f64)> {
    let caps = CLICK_POINT
        .captures(content)
        .ok_or_else(|| anyhow!("Couldn't extract coordinates from: {content}"))?;
    let x: f64 = caps[1].parse()?;
    let y: f64 = caps[2].parse()?;
    Ok((x / 100.0, y / 100.0))
}

/// Check a baked value against the caller's schema, failing with the first violation.
fn validate_baked(value: &Value, schema: &Value) -> Result<()> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| anyhow!("schema compile: {e}"))?;
    if let Err(errors) = compiled.validate(value) {
        let first = errors
            .into_iter()
            .next()
            .map(|err| err.to_string())
            .unwrap_or_else(|| "schema validation failed".to_string());
        bail!(first);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_point_is_normalized() {
        let (x, y) = parse_click_point("Sure. Click(25, 80.5)").unwrap();
        assert!((x - 0.25).abs() < 1e-9);
        assert!((y - 0.805).abs() < 1e-9);
        assert!(parse_click_point("I can't see it").is_err());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let action: Action = parse_json_reply(
            "```json\n{\"action\":\"click\",\"action_goal\":\"open login\",\"param\":\"Sign in button\"}\n```",
        )
        .unwrap();
        assert_eq!(action.param, "Sign in button");
    }

    #[test]
    fn reflection_reply_maps_to_decision() {
        let reply: ReflectionReply = parse_json_reply(
            r#"{"reflection":"done","decision":"finish","param":"login present"}"#,
        )
        .unwrap();
        let reflection: Reflection = reply.into();
        assert_eq!(
            reflection.decision,
            Decision::Finished {
                result: "login present".into()
            }
        );
    }

    fn price_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "price": {"type": "number"},
                "currency": {"type": "string", "enum": ["EUR", "USD"]},
            },
            "required": ["price", "currency"],
        })
    }

    #[test]
    fn baked_value_matching_schema_passes() {
        assert!(validate_baked(&json!({"price": 3.5, "currency": "EUR"}), &price_schema()).is_ok());
    }

    #[test]
    fn missing_required_field_fails() {
        let err = validate_baked(&json!({"price": 3}), &price_schema()).unwrap_err();
        assert!(err.to_string().contains("currency"));
    }

    #[test]
    fn present_but_mistyped_field_fails() {
        let err = validate_baked(
            &json!({"price": "not a number", "currency": "EUR"}),
            &price_schema(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("number"));

        assert!(
            validate_baked(
                &json!({"price": 3, "currency": ["nested", "array"]}),
                &price_schema()
            )
            .is_err()
        );
        assert!(validate_baked(&json!({"price": 3, "currency": "GBP"}), &price_schema()).is_err());
    }

    #[test]
    fn nested_shape_is_checked() {
        let schema = json!({
            "type": "object",
            "properties": {
                "items": {"type": "array", "items": {"type": "object", "required": ["name"]}},
            },
        });
        assert!(validate_baked(&json!({"items": [{"name": "a"}]}), &schema).is_ok());
        assert!(validate_baked(&json!({"items": [{"title": "a"}]}), &schema).is_err());
    }

    #[test]
    fn non_object_against_object_schema_fails() {
        assert!(validate_baked(&json!("text"), &price_schema()).is_err());
        assert!(validate_baked(&json!("text"), &json!({"type": "string"})).is_ok());
    }
}

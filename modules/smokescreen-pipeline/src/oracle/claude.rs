use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use smokescreen_common::{Article, Event};

use super::prompts::{cluster_prompt, score_prompt, CLUSTER_SYSTEM, SCORE_SYSTEM};
use super::Oracle;
use crate::score::response_schema;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const SCORE_TOOL: &str = "record_scores";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    system: &'static str,
    temperature: f32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
}

// =============================================================================
// Client
// =============================================================================

/// Anthropic Messages API as a judgment oracle.
pub struct ClaudeOracle {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl ClaudeOracle {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http: reqwest::Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/messages", self.base_url);

        debug!(model = %request.model, "Oracle request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await
            .context("Oracle request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Oracle API error ({}): {}", status, error_text));
        }

        Ok(response.json().await?)
    }

    fn request(&self, system: &'static str, prompt: String, max_tokens: u32) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens,
            system,
            // Judgment must be repeatable run to run.
            temperature: 0.0,
            messages: vec![WireMessage {
                role: "user",
                content: prompt,
            }],
            tools: None,
            tool_choice: None,
        }
    }
}

#[async_trait]
impl Oracle for ClaudeOracle {
    async fn cluster_articles(
        &self,
        articles: &[Article],
        existing_titles: &[String],
    ) -> Result<String> {
        let request = self.request(
            CLUSTER_SYSTEM,
            cluster_prompt(articles, existing_titles),
            8192,
        );
        let response = self.chat(&request).await?;

        let text: String = response
            .content
            .into_iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect();
        if text.trim().is_empty() {
            return Err(anyhow!("Oracle returned no text for clustering"));
        }
        Ok(text)
    }

    async fn score_event(&self, event: &Event, articles: &[Article]) -> Result<String> {
        let mut request = self.request(SCORE_SYSTEM, score_prompt(event, articles), 2048);
        request.tools = Some(vec![ToolDefinition {
            name: SCORE_TOOL,
            description: "Record driver ratings for the event.",
            input_schema: response_schema(),
        }]);
        request.tool_choice = Some(serde_json::json!({ "type": "tool", "name": SCORE_TOOL }));

        let response = self.chat(&request).await?;
        for block in response.content {
            if let ContentBlock::ToolUse { input } = block {
                return Ok(input.to_string());
            }
        }
        Err(anyhow!("No tool output in oracle scoring response"))
    }
}

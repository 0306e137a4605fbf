use async_trait::async_trait;
use eyre::{Result, bail};
use log::debug;

const SUMMARY_PROMPT: &str =
    "Summarize the following YouTube video transcript in a concise manner, highlighting key points:";

const ANSWER_PROMPT: &str = "Based on the following video transcript, answer the user's question.";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// The provider refused the request with 429 Too Many Requests
#[derive(Debug, thiserror::Error)]
#[error("{provider} API quota exceeded: {body}")]
pub struct QuotaExceeded {
    pub provider: &'static str,
    pub body: String,
}

/// Produces natural-language text from transcript text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;

    async fn answer(&self, text: &str, query: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    Anthropic,
    OpenAi,
}

impl Provider {
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("gemini") {
            Provider::Gemini
        } else if model.starts_with("claude") {
            Provider::Anthropic
        } else {
            Provider::OpenAi
        }
    }

    fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::Anthropic => "Anthropic",
            Provider::OpenAi => "OpenAI",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Gemini => GEMINI_BASE_URL,
            Provider::Anthropic => ANTHROPIC_BASE_URL,
            Provider::OpenAi => OPENAI_BASE_URL,
        }
    }
}

/// `TextGenerator` that talks to a hosted LLM API
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    provider: Provider,
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_chars: usize,
}

impl LlmClient {
    /// Build a client for `model`, taking the API key from the provider's env var
    pub fn new(client: reqwest::Client, model: &str, max_chars: usize) -> Self {
        let provider = Provider::for_model(model);
        let api_key = std::env::var(provider.api_key_var()).ok().filter(|k| !k.is_empty());
        Self {
            client,
            provider,
            model: model.to_string(),
            api_key,
            base_url: provider.default_base_url().to_string(),
            max_chars,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            eyre::eyre!(
                "{} environment variable not set (required for model {})",
                self.provider.api_key_var(),
                self.model
            )
        })
    }

    async fn response_json(&self, resp: reqwest::Response) -> Result<serde_json::Value> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        let provider = self.provider.label();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(QuotaExceeded { provider, body }.into());
        }
        bail!("{provider} API returned {status}: {body}");
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Generating via {:?} with model {} ({} byte prompt)", self.provider, self.model, prompt.len());
        match self.provider {
            Provider::Gemini => self.generate_gemini(prompt).await,
            Provider::Anthropic => self.generate_anthropic(prompt).await,
            Provider::OpenAi => self.generate_openai(prompt).await,
        }
    }

    async fn generate_gemini(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key()?;
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);

        let body = serde_json::json!({
            "contents": [
                {
                    "parts": [{ "text": prompt }]
                }
            ]
        });

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let json = self.response_json(resp).await?;
        extract_gemini_text(&json)
    }

    async fn generate_anthropic(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key()?;

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 4096,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let json = self.response_json(resp).await?;
        extract_anthropic_text(&json)
    }

    async fn generate_openai(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let json = self.response_json(resp).await?;
        extract_openai_text(&json)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn summarize(&self, text: &str) -> Result<String> {
        let prompt = summary_prompt(truncate_chars(text, self.max_chars));
        self.generate(&prompt).await
    }

    async fn answer(&self, text: &str, query: &str) -> Result<String> {
        let prompt = answer_prompt(truncate_chars(text, self.max_chars), query);
        self.generate(&prompt).await
    }
}

fn summary_prompt(text: &str) -> String {
    format!("{SUMMARY_PROMPT}\n\n{text}")
}

fn answer_prompt(text: &str, query: &str) -> String {
    format!("{ANSWER_PROMPT}\n\nTranscript:\n{text}\n\nQuestion: {query}")
}

/// At most `max` characters of `text`, cut on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn extract_gemini_text(json: &serde_json::Value) -> Result<String> {
    if let Some(parts) = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text")?.as_str())
            .collect::<Vec<_>>()
            .join("");
        if !text.is_empty() {
            return Ok(text);
        }
    }
    bail!("unexpected Gemini API response format");
}

fn extract_anthropic_text(json: &serde_json::Value) -> Result<String> {
    let text = json
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|block| block.get("text")?.as_str())
                .collect::<String>()
        })
        .unwrap_or_default();
    if text.is_empty() {
        bail!("unexpected Anthropic API response format");
    }
    Ok(text)
}

fn extract_openai_text(json: &serde_json::Value) -> Result<String> {
    if let Some(text) = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
    {
        return Ok(text.to_string());
    }
    bail!("unexpected OpenAI API response format");
}

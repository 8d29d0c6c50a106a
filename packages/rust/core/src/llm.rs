//! OpenRouter chat-completions client implementing [`GenerativeText`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use mathprereq_shared::{Concept, MathPrereqError, OpenRouterConfig, Result, parse_concept_list};

use crate::services::GenerativeText;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const IDENTIFY_TEMPERATURE: f32 = 0.1;
const EXPLAIN_TEMPERATURE: f32 = 0.3;

const IDENTIFY_SYSTEM_PROMPT: &str = "\
You are an expert mathematics educator specializing in calculus and its foundational prerequisites. \
Analyze a student's query and identify the key mathematical concepts involved, focusing on concepts \
taught in undergraduate calculus courses and their essential prerequisites.

Instructions:
1. Extract only core mathematical concepts essential to understanding calculus, including foundational \
prerequisite topics from algebra, functions, trigonometry, limits, and continuity.
2. Include concepts that have prerequisite relationships. For example, \"limits\" is a prerequisite for \
\"derivatives\", which is a prerequisite for \"integration\".
3. Use precise, standard mathematical terminology.
4. Answer with a lowercase, comma-separated list and nothing else.
5. Exclude broad, vague, or non-calculus terms.
6. When a method or rule is included (e.g. chain rule), also include its base concept (e.g. derivatives).
7. Order the list as a learning progression.

Examples:
Query: \"I don't understand how to find the derivative of x^2\"
Response: algebra, functions, limits, derivatives, power rule

Query: \"What is integration by parts and when do I use it?\"
Response: algebra, functions, derivatives, integration, integration by parts

Query: \"I'm confused about limits and continuity\"
Response: algebra, functions, limits, continuity

Query: \"How do I apply the chain rule?\"
Response: algebra, functions, derivatives, chain rule";

const EXPLAIN_SYSTEM_PROMPT: &str = "\
You are an expert mathematics tutor specializing in calculus. Give clear, complete, educational \
explanations that help students understand concepts and their prerequisites.

Guidelines:
1. Start with the fundamental concepts and build up logically.
2. Explain why each prerequisite is needed.
3. Use accessible language while staying mathematically accurate.
4. Include step-by-step worked solutions.
5. Address the student's question directly.
6. Ground the explanation in the provided learning path and course material.
7. End with a clear conclusion or final answer.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Thread-safe OpenRouter client.
#[derive(Clone)]
pub struct OpenRouterClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Builder for [`OpenRouterClient`].
#[derive(Default)]
pub struct OpenRouterClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
}

impl OpenRouterClientBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Defaults to the public OpenRouter endpoint.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<OpenRouterClient> {
        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MathPrereqError::config("OpenRouter API key is required"))?;
        let model = self
            .model
            .ok_or_else(|| MathPrereqError::config("OpenRouter model is required"))?;

        let http = HttpClient::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| MathPrereqError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(OpenRouterClient {
            http,
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            max_tokens: self.max_tokens.unwrap_or(2000),
        })
    }
}

impl OpenRouterClient {
    pub fn builder() -> OpenRouterClientBuilder {
        OpenRouterClientBuilder::default()
    }

    /// Client from the `[openrouter]` config section.
    pub fn from_config(config: &OpenRouterConfig, api_key: impl Into<String>) -> Result<Self> {
        Self::builder()
            .api_key(api_key)
            .base_url(&config.base_url)
            .model(&config.default_model)
            .max_tokens(config.max_tokens)
            .build()
    }

    /// One system + user exchange. Returns the trimmed reply text.
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, temperature, "sending chat completion request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "MathPrereq")
            .json(&request)
            .send()
            .await
            .map_err(|e| MathPrereqError::Network(format!("OpenRouter request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MathPrereqError::Network(format!(
                "OpenRouter returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| MathPrereqError::parse(format!("invalid OpenRouter response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| MathPrereqError::Generation("model returned an empty reply".into()))
    }
}

/// User prompt for an explanation request.
fn explanation_prompt(question: &str, path: &[Concept], context: &[String]) -> String {
    let mut prompt = format!("Student question: {question}\n\n");
    if !path.is_empty() {
        let names: Vec<&str> = path.iter().map(|c| c.name.as_str()).collect();
        prompt.push_str(&format!("Learning path: {}\n\n", names.join(" -> ")));
    }
    if !context.is_empty() {
        prompt.push_str("Relevant course material:\n");
        for (i, chunk) in context.iter().enumerate() {
            prompt.push_str(&format!("Context {}: {chunk}\n\n", i + 1));
        }
    }
    prompt.push_str(
        "Provide a complete explanation that answers the question directly, covers the \
         prerequisite concepts, shows a step-by-step solution, and explains how the concepts \
         connect.\n\nExplanation:",
    );
    prompt
}

#[async_trait]
impl GenerativeText for OpenRouterClient {
    #[instrument(skip_all)]
    async fn identify_concepts(&self, question: &str) -> Result<Vec<String>> {
        let user = format!("Student query: '{question}'\n\nIdentified concepts:");
        let reply = self
            .complete(IDENTIFY_SYSTEM_PROMPT, &user, IDENTIFY_TEMPERATURE)
            .await?;
        let concepts = parse_concept_list(&reply);
        info!(concepts = ?concepts, "identified concepts");
        Ok(concepts)
    }

    #[instrument(skip_all, fields(path_len = path.len(), context = context.len()))]
    async fn generate_explanation(
        &self,
        question: &str,
        path: &[Concept],
        context: &[String],
    ) -> Result<String> {
        let user = explanation_prompt(question, path, context);
        let explanation = self
            .complete(EXPLAIN_SYSTEM_PROMPT, &user, EXPLAIN_TEMPERATURE)
            .await?;
        info!(chars = explanation.len(), "generated explanation");
        Ok(explanation)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

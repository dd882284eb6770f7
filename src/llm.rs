//! OpenAI interop: query embeddings and grounded answer generation.
//!
//! The client wraps `async-openai` for two calls: embedding the incoming
//! question (with a small in-process cache, so repeated questions skip the
//! round trip) and chat completion with the approved calculator tools. A
//! citation post-condition runs after generation: definition-style questions
//! must carry at least one inline `(source p.N)` citation or the answer is
//! replaced with a refusal.

use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessage, ChatCompletionToolChoiceOption, CompletionUsage,
        CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
    },
    Client,
};
use moka::future::Cache;

use crate::config::OpenAiConfig as OpenAiSettings;
use crate::error::AppError;
use crate::index::normalize;
use crate::retrieval::RetrievedChunk;
use crate::tools;

/// System prompt for the grounded answerer.
const SYSTEM_PROMPT: &str = "You are a financial risk analyst (Basel; market, credit, liquidity, operational). \
     Answer ONLY using the provided context snippets and/or approved tools. \
     If the context is insufficient, say so. \
     Be concise (4\u{2013}7 sentences). Include inline citations like (source p.page) next to claims taken from the context.";

/// Refusal used when the citation post-condition fails.
const UNGROUNDED_REFUSAL: &str = "Insufficient grounded context to answer confidently from the provided documents. \
     Please provide additional materials or specify the exact section/page to consult.";

/// Question keywords that demand an inline citation in the answer.
const CITATION_KEYWORDS: [&str; 7] = [
    "what",
    "define",
    "definition",
    "basel",
    "lcr",
    "ratio",
    "coverage",
];

/// Maximum cached query embeddings.
const EMBED_CACHE_CAPACITY: u64 = 1024;

/// Token accounting reported by the API for one answer.
#[derive(Debug, Clone, Copy)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<CompletionUsage> for TokenUsage {
    fn from(usage: CompletionUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Shared OpenAI client plus model settings.
///
/// The inner client is absent when neither an API key nor a base-URL
/// override is configured; embedding then fails (retrieval cannot run
/// without vectors) while generation falls back to the dev-mode answer.
#[derive(Clone)]
pub struct LlmClient {
    client: Option<Arc<Client<OpenAIConfig>>>,
    has_api_key: bool,
    chat_model: String,
    embedding_model: String,
    temperature: f32,
    max_tokens: u32,
    embed_cache: Cache<String, Arc<Vec<f32>>>,
}

impl LlmClient {
    pub fn from_settings(settings: &OpenAiSettings) -> Self {
        let has_api_key = settings.api_key.is_some();
        let client = if settings.api_key.is_some() || settings.api_base.is_some() {
            let mut config = OpenAIConfig::new();
            if let Some(key) = &settings.api_key {
                config = config.with_api_key(key.clone());
            }
            if let Some(base) = &settings.api_base {
                config = config.with_api_base(base.clone());
            }
            Some(Arc::new(Client::with_config(config)))
        } else {
            None
        };

        Self {
            client,
            has_api_key,
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            embed_cache: Cache::new(EMBED_CACHE_CAPACITY),
        }
    }

    /// Whether grounded generation is available.
    pub fn has_credentials(&self) -> bool {
        self.has_api_key
    }

    /// Embed a query string, L2-normalized, with caching.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        if let Some(cached) = self.embed_cache.get(text).await {
            return Ok(cached.as_ref().clone());
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Retrieval("OPENAI_API_KEY missing".to_string()))?;

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input([text])
            .build()?;

        let response = client.embeddings().create(request).await?;
        let mut vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::Retrieval("embedding response was empty".to_string()))?;
        normalize(&mut vector);

        self.embed_cache
            .insert(text.to_string(), Arc::new(vector.clone()))
            .await;
        Ok(vector)
    }

    /// Generate a grounded answer from the retrieved context.
    ///
    /// Runs one chat completion with the calculator tools available; when the
    /// model requests tool calls, dispatches them locally and runs a single
    /// follow-up completion with the results appended.
    pub async fn generate_answer(
        &self,
        question: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<(String, Option<TokenUsage>), AppError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal("LLM client not configured".to_string()))?;

        let user_message = build_user_message(question, chunks);
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages.clone())
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .tools(tools::tool_specs()?)
            .tool_choice(ChatCompletionToolChoiceOption::Auto)
            .build()?;

        let first = client.chat().create(request).await?;
        let mut usage = first.usage.clone().map(TokenUsage::from);
        let choice = first
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("LLM returned no choices".to_string()))?;

        let content = match choice.message.tool_calls.as_ref().filter(|c| !c.is_empty()) {
            Some(tool_calls) => {
                messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .tool_calls(tool_calls.clone())
                        .build()?
                        .into(),
                );
                for call in tool_calls {
                    let result = tools::call_tool(&call.function.name, &call.function.arguments);
                    tracing::debug!(tool = %call.function.name, "Dispatched tool call");
                    messages.push(
                        ChatCompletionRequestToolMessageArgs::default()
                            .content(result.to_string())
                            .tool_call_id(call.id.clone())
                            .build()?
                            .into(),
                    );
                }

                let follow_up = CreateChatCompletionRequestArgs::default()
                    .model(&self.chat_model)
                    .messages(messages)
                    .temperature(self.temperature)
                    .max_tokens(self.max_tokens)
                    .build()?;

                let second = client.chat().create(follow_up).await?;
                if second.usage.is_some() {
                    usage = second.usage.clone().map(TokenUsage::from);
                }
                second
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default()
            }
            None => choice.message.content.unwrap_or_default(),
        };
        let content = content.trim().to_string();

        // Definition-style questions must come back with a citation.
        if needs_citation(question) && !has_inline_citation(&content) {
            return Ok((UNGROUNDED_REFUSAL.to_string(), usage));
        }

        Ok((content, usage))
    }
}

/// Format the retrieved chunks as a context block for the prompt.
pub fn build_context_block(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[{} p.{}] {}", c.source, c.page, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_user_message(question: &str, chunks: &[RetrievedChunk]) -> String {
    format!(
        "Question: {question}\n\n\
         Context snippets (may be partial):\n{}\n\n\
         Use ONLY these snippets for regulatory definitions (with citations). \
         If a small calculation is needed, you MAY call tools lcr_ratio or toy_var. \
         If insufficient context for a definition, say so.",
        build_context_block(chunks)
    )
}

/// Citation tags ("source p.page") for the retrieved chunks, deduplicated
/// in retrieval order.
pub fn build_citations(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for c in chunks {
        let tag = format!("{} p.{}", c.source, c.page);
        if seen.insert(tag.clone()) {
            out.push(tag);
        }
    }
    out
}

/// Order-preserving dedup, truncated to `keep` entries.
pub fn dedup_and_trim(citations: Vec<String>, keep: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<String> = citations
        .into_iter()
        .filter(|c| seen.insert(c.clone()))
        .collect();
    out.truncate(keep);
    out
}

/// Whether the question is definition-like and therefore must be cited.
pub fn needs_citation(question: &str) -> bool {
    let lower = question.to_lowercase();
    CITATION_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Scan for an inline citation of the form `(source p.N)`: an open paren,
/// at least one character of source text, ` p.` and digits right before the
/// closing paren.
pub fn has_inline_citation(text: &str) -> bool {
    let bytes = text.as_bytes();
    for close in 0..bytes.len() {
        if bytes[close] != b')' {
            continue;
        }
        let mut digits_start = close;
        while digits_start > 0 && bytes[digits_start - 1].is_ascii_digit() {
            digits_start -= 1;
        }
        if digits_start == close || digits_start < 3 {
            continue;
        }
        if bytes[digits_start - 3..digits_start] != *b" p." {
            continue;
        }
        let marker = digits_start - 3;
        if let Some(open) = text[..marker].rfind('(') {
            let between = &text[open + 1..marker];
            if !between.is_empty() && !between.contains(')') {
                return true;
            }
        }
    }
    false
}

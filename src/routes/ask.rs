//! Handler for grounded question answering.
//!
//! Retrieval, a confidence gate, a dev-mode fallback, and grounded
//! generation, in that order. Every answer carries observability fields
//! (latency, top similarity, token usage) so the offline evaluation harness
//! can track quality and cost.

use std::time::Instant;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::DEV_PREVIEW_LIMIT;
use crate::error::AppError;
use crate::llm::{build_citations, dedup_and_trim};
use crate::retrieval;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Default, Serialize)]
pub struct AskResponse {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

/// Handler for `POST /ask`.
#[instrument(name = "ask", skip(state, payload))]
pub async fn ask(
    State(state): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let start = Instant::now();
    let retrieval_config = &state.config.retrieval;

    let index = state.index.get().await?;
    let ctx = retrieval::retrieve(&index, &state.llm, retrieval_config, &payload.question).await?;

    if ctx.is_empty() {
        return Ok(Json(AskResponse {
            answer: "I couldn\u{2019}t find relevant passages in your index.".to_string(),
            note: Some("Add PDFs to data/raw and rebuild the index.".to_string()),
            latency_ms: Some(elapsed_ms(start)),
            ..Default::default()
        }));
    }

    let top_score = ctx[0].score;
    let citations = dedup_and_trim(build_citations(&ctx), retrieval_config.max_citations);

    // Confidence gate: refuse to speculate over weak context.
    if top_score < retrieval_config.low_confidence {
        return Ok(Json(AskResponse {
            answer: "The retrieved context is weak or off-topic, so I won't speculate. \
                     Please provide more relevant documents or rephrase the question."
                .to_string(),
            citations: Some(citations),
            note: Some(format!(
                "Top similarity {top_score:.2} < {:.2}.",
                retrieval_config.low_confidence
            )),
            latency_ms: Some(elapsed_ms(start)),
            top_score: Some(top_score),
            ..Default::default()
        }));
    }

    // Dev mode: no credentials for generation, quote the closest context.
    if !state.llm.has_credentials() {
        let best = &ctx[0].text;
        let preview: String = best.chars().take(DEV_PREVIEW_LIMIT).collect();
        let ellipsis = if best.chars().count() > DEV_PREVIEW_LIMIT {
            "\u{2026}"
        } else {
            ""
        };
        return Ok(Json(AskResponse {
            answer: format!(
                "(DEV MODE: no OPENAI_API_KEY) Closest context says: {preview}{ellipsis}"
            ),
            citations: Some(citations),
            note: Some("Set OPENAI_API_KEY to enable grounded LLM answers.".to_string()),
            latency_ms: Some(elapsed_ms(start)),
            top_score: Some(top_score),
            ..Default::default()
        }));
    }

    let (answer, usage) = state.llm.generate_answer(&payload.question, &ctx).await?;

    Ok(Json(AskResponse {
        answer,
        citations: Some(citations),
        note: None,
        latency_ms: Some(elapsed_ms(start)),
        top_score: Some(top_score),
        prompt_tokens: usage.map(|u| u.prompt_tokens),
        completion_tokens: usage.map(|u| u.completion_tokens),
        total_tokens: usage.map(|u| u.total_tokens),
    }))
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

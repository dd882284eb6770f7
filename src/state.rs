//! Shared application state for request handlers.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::index::IndexHandle;
use crate::llm::LlmClient;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
///
/// Contains the application configuration, the OpenAI client, and the lazily
/// loaded vector index.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub llm: LlmClient,
    pub index: IndexHandle,
}

impl AppState {
    /// Creates the application state from the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let llm = LlmClient::from_settings(&config.openai);
        let index = IndexHandle::new(config.index.clone());
        Self {
            config: Arc::new(config),
            llm,
            index,
        }
    }
}

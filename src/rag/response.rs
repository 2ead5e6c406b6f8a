//! RAG response generation.

use super::context::{format_context_for_display, format_context_for_prompt};
use super::{ContextBuilder, ContextChunk};
use crate::config::{Prompts, RagSettings};
use crate::embedding::Embedder;
use crate::error::{AdvisorError, Result};
use crate::openai::create_client;
use crate::vector_store::VectorStore;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Answer returned when retrieval finds nothing.
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in the knowledge base for this question.";

/// Chat messages kept between turns.
const MAX_HISTORY: usize = 20;

/// Per-question overrides.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Replaces the configured system prompt.
    pub system_prompt: Option<String>,
    /// Replaces the configured number of retrieved chunks.
    pub top_k: Option<usize>,
    /// Replaces the configured chat model.
    pub model: Option<String>,
}

/// RAG engine for question answering.
pub struct RagEngine {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    context_builder: ContextBuilder,
    prompts: Prompts,
    conversation_history: Vec<ChatCompletionRequestMessage>,
}

impl RagEngine {
    /// Create a new RAG engine.
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        settings: &RagSettings,
    ) -> Result<Self> {
        let context_builder = ContextBuilder::new(vector_store, embedder)
            .with_top_k(settings.top_k)
            .with_min_score(settings.min_score);

        Ok(Self {
            client: create_client()?,
            model: settings.model.clone(),
            temperature: settings.temperature,
            context_builder,
            prompts: Prompts::default(),
            conversation_history: Vec::new(),
        })
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Override the chat model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Default system prompt.
    pub fn system_prompt(&self) -> &str {
        &self.prompts.rag.system
    }

    /// Ask a single question and get a response.
    pub async fn ask(&self, question: &str) -> Result<RagResponse> {
        self.ask_with_options(question, &AskOptions::default()).await
    }

    /// Ask a question with a custom system prompt.
    pub async fn ask_with_system(&self, question: &str, system_prompt: &str) -> Result<RagResponse> {
        let options = AskOptions {
            system_prompt: Some(system_prompt.to_string()),
            ..AskOptions::default()
        };
        self.ask_with_options(question, &options).await
    }

    /// Ask a question with per-question overrides.
    #[instrument(skip(self, options), fields(question = %question))]
    pub async fn ask_with_options(&self, question: &str, options: &AskOptions) -> Result<RagResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AdvisorError::InvalidInput("Question is empty".to_string()));
        }

        info!("Processing question: {}", question);

        let top_k = options.top_k.unwrap_or_else(|| self.context_builder.top_k());
        let context_chunks = self.context_builder.build_with_limit(question, top_k).await?;

        if context_chunks.is_empty() {
            return Ok(RagResponse {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let user_prompt = self.render_user_prompt(question, &context_chunks);
        let system = options
            .system_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.prompts.rag.system);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            system_message(system)?,
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(|e| AdvisorError::Rag(e.to_string()))?
                .into(),
        ];

        let model = options.model.as_deref().unwrap_or(&self.model);
        let answer = self.complete(model, messages).await?;

        debug!("Generated response with {} sources", context_chunks.len());

        Ok(RagResponse {
            answer,
            sources: context_chunks,
        })
    }

    /// Start or continue a chat session. Every turn retrieves fresh context.
    #[instrument(skip(self), fields(message = %message))]
    pub async fn chat(&mut self, message: &str) -> Result<RagResponse> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AdvisorError::InvalidInput("Message is empty".to_string()));
        }

        info!("Chat message: {}", message);

        let context_chunks = self.context_builder.build(message).await?;

        let user_content = if context_chunks.is_empty() {
            format!(
                "Question: {}\n\n(No relevant context found in the knowledge base)",
                message
            )
        } else {
            format!(
                "Question: {}\n\nRelevant context:\n{}",
                message,
                format_context_for_prompt(&context_chunks)
            )
        };

        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(user_content)
            .build()
            .map_err(|e| AdvisorError::Rag(e.to_string()))?;
        self.conversation_history.push(user_message.into());

        let mut messages = vec![system_message(&self.prompts.rag.chat_system)?];
        messages.extend(self.conversation_history.clone());

        let answer = match self.complete(&self.model, messages).await {
            Ok(answer) => answer,
            Err(e) => {
                // Drop the unanswered turn so history stays paired.
                self.conversation_history.pop();
                return Err(e);
            }
        };

        let assistant_message = ChatCompletionRequestAssistantMessageArgs::default()
            .content(answer.clone())
            .build()
            .map_err(|e| AdvisorError::Rag(e.to_string()))?;
        self.conversation_history.push(assistant_message.into());

        trim_history(&mut self.conversation_history, MAX_HISTORY);

        Ok(RagResponse {
            answer,
            sources: context_chunks,
        })
    }

    /// Clear conversation history.
    pub fn clear_history(&mut self) {
        self.conversation_history.clear();
    }

    pub fn history_len(&self) -> usize {
        self.conversation_history.len()
    }

    fn render_user_prompt(&self, question: &str, chunks: &[ContextChunk]) -> String {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), format_context_for_prompt(chunks));
        self.prompts.render_with_custom(&self.prompts.rag.user, &vars)
    }

    async fn complete(&self, model: &str, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| AdvisorError::Rag(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AdvisorError::OpenAI(format!("Failed to generate response: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| AdvisorError::Rag("Empty response from LLM".to_string()))
    }
}

fn system_message(content: &str) -> Result<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestSystemMessageArgs::default()
        .content(content.to_string())
        .build()
        .map_err(|e| AdvisorError::Rag(e.to_string()))?
        .into())
}

/// Keep only the most recent `max` messages.
fn trim_history<T>(history: &mut Vec<T>, max: usize) {
    if history.len() > max {
        let excess = history.len() - max;
        history.drain(..excess);
    }
}

/// A RAG response with answer and sources.
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    /// The generated answer.
    pub answer: String,
    /// Source chunks used for the answer.
    pub sources: Vec<ContextChunk>,
}

impl RagResponse {
    /// Format the response for display.
    pub fn format_for_display(&self) -> String {
        let mut output = self.answer.clone();

        if !self.sources.is_empty() {
            output.push_str("\n\n--- Sources ---\n\n");
            output.push_str(&format_context_for_display(&self.sources));
        }

        output
    }
}

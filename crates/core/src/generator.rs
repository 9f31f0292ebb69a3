//! Grounded answer generation.
//!
//! The prompt restricts the model to the retrieved context and gives it a
//! fixed refusal sentence for questions the context does not cover. Model
//! failures never escape as errors: they become an answer string starting
//! with [`ERROR_PREFIX`].

use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use docqa_common::{DocQaError, QueryResult, Result};
use futures::future::ready;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, error, info};

pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_CHAT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

pub const ERROR_PREFIX: &str = "Error generating response:";
pub const REFUSAL: &str =
    "I'm sorry, I don't have enough information in the provided document to answer that question.";

pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Renders retrieved chunks as `[From {filename}]: {text}` blocks separated
/// by a blank line.
pub fn build_context(result: &QueryResult) -> String {
    result
        .chunks
        .iter()
        .map(|chunk| format!("[From {}]: {}", chunk.metadata.filename, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful assistant that answers questions based on the provided document context. \n\
         \n\
         IMPORTANT INSTRUCTIONS:\n\
         - Only answer based on the information provided in the context below\n\
         - If the answer is not found in the context, respond with \"{refusal}\"\n\
         - Do not make up or hallucinate information\n\
         - Be specific and cite relevant parts of the context when possible\n\
         \n\
         Context from document:\n\
         {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer:",
        refusal = REFUSAL,
        context = context,
        question = question,
    )
}

pub fn error_message(error: &DocQaError) -> String {
    match error {
        DocQaError::Generation(message) => format!("{} {}", ERROR_PREFIX, message),
        other => format!("{} {}", ERROR_PREFIX, other),
    }
}

/// Text-generation service that streams a completion for a single prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_completion(&self, prompt: &str) -> Result<FragmentStream>;

    fn model_name(&self) -> String;
}

/// Chat model behind an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiChatModel {
    pub fn new(api_key: &str, api_base: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base.trim_end_matches('/'));

        Self {
            client: Client::with_config(config),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

fn generation_err(e: impl std::fmt::Display) -> DocQaError {
    DocQaError::Generation(e.to_string())
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream_completion(&self, prompt: &str) -> Result<FragmentStream> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(generation_err)?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(vec![ChatCompletionRequestMessage::User(message)]);
        if let Some(temperature) = self.temperature {
            args.temperature(temperature);
        }
        let request = args.build().map_err(generation_err)?;

        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "Requesting completion");

        let response = self.client.chat().create_stream(request).await.map_err(|e| {
            error!(model = %self.model, error = %e, "Chat completion request failed");
            generation_err(e)
        })?;

        let fragments = response.filter_map(|item| {
            ready(match item {
                Ok(chunk) => {
                    let text: String = chunk
                        .choices
                        .into_iter()
                        .filter_map(|choice| choice.delta.content)
                        .collect();
                    if text.is_empty() {
                        None
                    } else {
                        Some(Ok(text))
                    }
                }
                Err(e) => Some(Err(generation_err(e))),
            })
        });

        Ok(fragments.boxed())
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// Turns a raw fragment stream into display text. The first error is
/// rendered as an error message and ends the stream.
pub fn text_stream(fragments: FragmentStream) -> BoxStream<'static, String> {
    fragments
        .scan(false, |failed, item| {
            if *failed {
                return ready(None);
            }
            ready(Some(match item {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Answer stream failed");
                    *failed = true;
                    error_message(&e)
                }
            }))
        })
        .boxed()
}

#[derive(Clone)]
pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> String {
        self.model.model_name()
    }

    /// Streams the answer as it is produced. A failure is delivered as a
    /// final error-message fragment; fragments already sent stay sent.
    pub async fn stream(&self, question: &str, context: &str) -> BoxStream<'static, String> {
        let prompt = build_prompt(question, context);
        match self.model.stream_completion(&prompt).await {
            Ok(fragments) => text_stream(fragments),
            Err(e) => {
                error!(model = %self.model.model_name(), error = %e, "Failed to start answer stream");
                stream::once(ready(error_message(&e))).boxed()
            }
        }
    }

    /// Collects the whole answer. On failure the partial text is discarded
    /// and only the error message is returned.
    pub async fn generate(&self, question: &str, context: &str) -> String {
        let prompt = build_prompt(question, context);
        let mut fragments = match self.model.stream_completion(&prompt).await {
            Ok(fragments) => fragments,
            Err(e) => {
                error!(model = %self.model.model_name(), error = %e, "Answer generation failed");
                return error_message(&e);
            }
        };

        let mut answer = String::new();
        while let Some(item) = fragments.next().await {
            match item {
                Ok(text) => answer.push_str(&text),
                Err(e) => {
                    error!(model = %self.model.model_name(), error = %e, "Answer stream failed");
                    return error_message(&e);
                }
            }
        }

        info!(model = %self.model.model_name(), answer_chars = answer.chars().count(), "Answer generated");
        answer
    }
}

use async_trait::async_trait;
use autoagents_llm::chat::{ChatMessage, ChatProvider, ChatResponse, StructuredOutputFormat, Tool};
use autoagents_llm::completion::{CompletionProvider, CompletionRequest, CompletionResponse};
use autoagents_llm::embedding::EmbeddingProvider;
use autoagents_llm::error::LLMError;
use autoagents_llm::models::ModelsProvider;
use autoagents_llm::{LLMProvider, ToolCall};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Script {
    Reply(Option<String>),
    Fail(String),
}

/// Companion model stand-in. Every chat call records its prompt and then
/// follows the script: a fixed reply, an empty answer or a provider error.
#[derive(Debug, Clone)]
pub struct ScriptedLLM {
    script: Script,
    prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedLLM {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            prompts: Arc::default(),
        }
    }

    pub fn replying(text: impl Into<String>) -> Self {
        Self::with_script(Script::Reply(Some(text.into())))
    }

    /// Answers without any text.
    pub fn silent() -> Self {
        Self::with_script(Script::Reply(None))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_script(Script::Fail(message.into()))
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }

    /// Messages of the most recent chat call.
    pub fn last_prompt(&self) -> Vec<ChatMessage> {
        self.prompts.lock().last().cloned().unwrap_or_default()
    }

    fn unsupported(&self, what: &str) -> LLMError {
        match &self.script {
            Script::Fail(message) => LLMError::ProviderError(message.clone()),
            Script::Reply(_) => LLMError::ProviderError(format!("{what} unsupported")),
        }
    }
}

#[derive(Debug)]
struct ScriptedResponse(Option<String>);

impl fmt::Display for ScriptedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_deref().unwrap_or_default())
    }
}

impl ChatResponse for ScriptedResponse {
    fn text(&self) -> Option<String> {
        self.0.clone()
    }

    fn tool_calls(&self) -> Option<Vec<ToolCall>> {
        None
    }
}

#[async_trait]
impl ChatProvider for ScriptedLLM {
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        _tools: Option<&[Tool]>,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        self.prompts.lock().push(messages.to_vec());
        match &self.script {
            Script::Reply(text) => Ok(Box::new(ScriptedResponse(text.clone()))),
            Script::Fail(message) => Err(LLMError::ProviderError(message.clone())),
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedLLM {
    async fn complete(
        &self,
        _req: &CompletionRequest,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<CompletionResponse, LLMError> {
        Err(self.unsupported("completion"))
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedLLM {
    async fn embed(&self, _input: Vec<String>) -> Result<Vec<Vec<f32>>, LLMError> {
        Err(self.unsupported("embedding"))
    }
}

#[async_trait]
impl ModelsProvider for ScriptedLLM {}

impl LLMProvider for ScriptedLLM {}

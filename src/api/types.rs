//! Wire types for the chat-completions surface
//!
//! These types follow the hosted completion API's chat/completions schema,
//! with one extension: `model` additionally accepts the logical labels
//! "small", "medium", and "auto". Validation is enforced during
//! deserialization - invalid instances cannot exist.

use serde::{Deserialize, Deserializer, Serialize};

/// Maximum number of messages allowed per request
const MAX_MESSAGES: usize = 100;
/// Maximum allowed total content length across all messages (500K chars)
const MAX_TOTAL_CONTENT_LENGTH: usize = 500_000;

/// The response_format marker that requests structured JSON output
pub const JSON_OBJECT_FORMAT: &str = "json_object";

// =============================================================================
// Message Types
// =============================================================================

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call emitted by the assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_function_type")]
    pub call_type: String,
    pub function: serde_json::Value,
}

fn default_function_type() -> String {
    "function".to_string()
}

/// Function definition for tool calling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

/// Tool definition attached to a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type", default = "default_function_type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Requested output format, e.g. `{"type": "json_object"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ResponseFormat {
    /// Whether this is exactly the structured-JSON marker
    pub fn is_json_object(&self) -> bool {
        self.format_type == JSON_OBJECT_FORMAT
    }
}

/// A single message in the conversation
///
/// Per-role content rules are enforced during deserialization:
/// system/user/tool messages require content, assistant messages require
/// content or tool_calls, and tool messages require a tool_call_id.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

fn validate_message_fields(
    role: MessageRole,
    content: Option<&str>,
    tool_calls: Option<&[ToolCall]>,
    tool_call_id: Option<&str>,
) -> Result<(), String> {
    let has_content = content.is_some_and(|c| !c.is_empty());
    let has_tool_calls = tool_calls.is_some_and(|t| !t.is_empty());

    match role {
        MessageRole::System | MessageRole::User => {
            if !has_content {
                return Err(format!("{:?} message requires content", role));
            }
        }
        MessageRole::Assistant => {
            if !has_content && !has_tool_calls {
                return Err("Assistant message must have content or tool_calls".to_string());
            }
        }
        MessageRole::Tool => {
            if !has_content {
                return Err("Tool message requires content".to_string());
            }
            if tool_call_id.is_none_or(|id| id.is_empty()) {
                return Err("Tool message requires tool_call_id".to_string());
            }
        }
    }
    Ok(())
}

impl Message {
    /// Create a validated message
    pub fn try_new(
        role: MessageRole,
        content: Option<String>,
        tool_calls: Option<Vec<ToolCall>>,
        tool_call_id: Option<String>,
    ) -> Result<Self, String> {
        validate_message_fields(
            role,
            content.as_deref(),
            tool_calls.as_deref(),
            tool_call_id.as_deref(),
        )?;
        Ok(Self {
            role,
            content,
            tool_calls,
            tool_call_id,
        })
    }

    /// System message convenience constructor
    ///
    /// # Panics
    /// Panics if content is empty (use `try_new` for error handling)
    pub fn system(content: impl Into<String>) -> Self {
        Self::try_new(MessageRole::System, Some(content.into()), None, None)
            .expect("system message content must not be empty")
    }

    /// User message convenience constructor
    ///
    /// # Panics
    /// Panics if content is empty (use `try_new` for error handling)
    pub fn user(content: impl Into<String>) -> Self {
        Self::try_new(MessageRole::User, Some(content.into()), None, None)
            .expect("user message content must not be empty")
    }

    /// Assistant message convenience constructor
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::try_new(MessageRole::Assistant, Some(content.into()), None, None)
            .expect("assistant message creation should not fail")
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        self.tool_calls.as_deref()
    }

    /// Content length in characters (Unicode-aware), 0 when absent
    pub fn content_length(&self) -> usize {
        self.content.as_deref().map_or(0, |c| c.chars().count())
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawMessage {
            role: MessageRole,
            #[serde(default)]
            content: Option<String>,
            #[serde(default)]
            tool_calls: Option<Vec<ToolCall>>,
            #[serde(default)]
            tool_call_id: Option<String>,
        }

        let raw = RawMessage::deserialize(deserializer)?;
        validate_message_fields(
            raw.role,
            raw.content.as_deref(),
            raw.tool_calls.as_deref(),
            raw.tool_call_id.as_deref(),
        )
        .map_err(serde::de::Error::custom)?;

        Ok(Message {
            role: raw.role,
            content: raw.content,
            tool_calls: raw.tool_calls,
            tool_call_id: raw.tool_call_id,
        })
    }
}

// =============================================================================
// Chat Completion Request
// =============================================================================

/// Shared validation used by both the deserializer and the builder
fn validate_request_fields(
    model: &str,
    messages: &[Message],
    temperature: Option<f64>,
    top_p: Option<f64>,
    max_tokens: Option<u32>,
) -> Result<(), String> {
    if model.trim().is_empty() {
        return Err("model cannot be empty".to_string());
    }

    if messages.is_empty() {
        return Err("messages array cannot be empty".to_string());
    }

    if messages.len() > MAX_MESSAGES {
        return Err(format!(
            "messages array cannot exceed {} messages (got {})",
            MAX_MESSAGES,
            messages.len()
        ));
    }

    let total_length: usize = messages.iter().map(|m| m.content_length()).sum();
    if total_length > MAX_TOTAL_CONTENT_LENGTH {
        return Err(format!(
            "total content length exceeds {} characters (got {})",
            MAX_TOTAL_CONTENT_LENGTH, total_length
        ));
    }

    if let Some(temp) = temperature {
        if temp.is_nan() || temp.is_infinite() {
            return Err("temperature must be a finite number".to_string());
        }
        if !(0.0..=2.0).contains(&temp) {
            return Err("temperature must be between 0.0 and 2.0".to_string());
        }
    }

    if let Some(top_p) = top_p {
        if top_p.is_nan() || top_p.is_infinite() {
            return Err("top_p must be a finite number".to_string());
        }
        if !(0.0..=1.0).contains(&top_p) {
            return Err("top_p must be between 0.0 and 1.0".to_string());
        }
    }

    if let Some(max) = max_tokens
        && max == 0
    {
        return Err("max_tokens must be greater than 0".to_string());
    }

    Ok(())
}

/// Chat completion request
///
/// Compatible with the upstream chat/completions schema, plus the virtual
/// "auto" model label that enables routing. Validation is enforced during
/// deserialization; use [`ChatCompletionRequest::builder()`] in tests.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    random_seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    safe_prompt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
    /// Create a new builder for constructing a request programmatically
    pub fn builder() -> ChatCompletionRequestBuilder {
        ChatCompletionRequestBuilder::new()
    }

    /// Requested model string ("small", "medium", "auto", or an upstream ID)
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn stream(&self) -> bool {
        self.stream
    }

    pub fn tools(&self) -> Option<&[Tool]> {
        self.tools.as_deref()
    }

    pub fn response_format(&self) -> Option<&ResponseFormat> {
        self.response_format.as_ref()
    }

    /// Whether at least one tool is declared
    pub fn has_tools(&self) -> bool {
        self.tools.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Total content character length across all messages
    pub fn total_content_length(&self) -> usize {
        self.messages.iter().map(|m| m.content_length()).sum()
    }
}

impl<'de> Deserialize<'de> for ChatCompletionRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawRequest {
            model: String,
            messages: Vec<Message>,
            #[serde(default)]
            temperature: Option<f64>,
            #[serde(default)]
            top_p: Option<f64>,
            #[serde(default)]
            max_tokens: Option<u32>,
            #[serde(default, deserialize_with = "stop_sequences")]
            stop: Option<Vec<String>>,
            #[serde(default)]
            stream: bool,
            #[serde(default)]
            random_seed: Option<i64>,
            #[serde(default)]
            safe_prompt: Option<bool>,
            #[serde(default)]
            tools: Option<Vec<Tool>>,
            #[serde(default)]
            tool_choice: Option<serde_json::Value>,
            #[serde(default)]
            response_format: Option<ResponseFormat>,
        }

        let raw = RawRequest::deserialize(deserializer)?;
        validate_request_fields(
            &raw.model,
            &raw.messages,
            raw.temperature,
            raw.top_p,
            raw.max_tokens,
        )
        .map_err(serde::de::Error::custom)?;

        Ok(ChatCompletionRequest {
            model: raw.model,
            messages: raw.messages,
            temperature: raw.temperature,
            top_p: raw.top_p,
            max_tokens: raw.max_tokens,
            stop: raw.stop,
            stream: raw.stream,
            random_seed: raw.random_seed,
            safe_prompt: raw.safe_prompt,
            tools: raw.tools,
            tool_choice: raw.tool_choice,
            response_format: raw.response_format,
        })
    }
}

/// `stop` accepts either a single string or a list of strings
fn stop_sequences<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StopField {
        One(String),
        Many(Vec<String>),
    }

    Ok(Option::<StopField>::deserialize(deserializer)?.map(|s| match s {
        StopField::One(s) => vec![s],
        StopField::Many(v) => v,
    }))
}

/// Builder for constructing [`ChatCompletionRequest`] programmatically
///
/// Performs the same validation as JSON deserialization.
#[derive(Debug, Default)]
pub struct ChatCompletionRequestBuilder {
    model: Option<String>,
    messages: Vec<Message>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    max_tokens: Option<u32>,
    stream: bool,
    tools: Option<Vec<Tool>>,
    response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model string (defaults to "auto")
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn system_message(self, content: impl Into<String>) -> Self {
        self.message(Message::system(content))
    }

    pub fn user_message(self, content: impl Into<String>) -> Self {
        self.message(Message::user(content))
    }

    pub fn assistant_message(self, content: impl Into<String>) -> Self {
        self.message(Message::assistant(content))
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.get_or_insert_with(Vec::new).push(tool);
        self
    }

    pub fn response_format(mut self, format_type: impl Into<String>) -> Self {
        self.response_format = Some(ResponseFormat {
            format_type: format_type.into(),
        });
        self
    }

    /// Build the request, performing all validation
    ///
    /// # Errors
    /// Returns an error string if validation fails (same rules as JSON
    /// deserialization)
    pub fn build(self) -> Result<ChatCompletionRequest, String> {
        let model = self.model.unwrap_or_else(|| "auto".to_string());
        validate_request_fields(
            &model,
            &self.messages,
            self.temperature,
            self.top_p,
            self.max_tokens,
        )?;

        Ok(ChatCompletionRequest {
            model,
            messages: self.messages,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stop: None,
            stream: self.stream,
            random_seed: None,
            safe_prompt: None,
            tools: self.tools,
            tool_choice: None,
            response_format: self.response_format,
        })
    }
}

// =============================================================================
// Chat Completion Response
// =============================================================================

/// Token counts reported by the upstream API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Assistant message in a response choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// A single choice in the response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Chat completion response as returned by the upstream API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    #[serde(default = "default_completion_object")]
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Option<UsageInfo>,
}

fn default_completion_object() -> String {
    "chat.completion".to_string()
}

/// Health check response body
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: String,
}

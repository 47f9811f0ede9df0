//! OpenAI chat-completions client with function calling.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub struct Client {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Model {
    /// Cheap model for classification and extraction.
    Mini,
    /// Conversational replies.
    Full,
}

impl Model {
    fn as_str(&self) -> &'static str {
        match self {
            Model::Mini => "gpt-4o-mini",
            Model::Full => "gpt-4o",
        }
    }
}

/// A single function the model is forced to call.
pub struct FunctionTool {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'static str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Serialize)]
struct ApiFunction<'a> {
    name: &'static str,
    description: &'static str,
    parameters: &'a Value,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    arguments: String,
}

impl Client {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Plain completion: returns the text of the first choice.
    pub async fn complete(&self, model: Model, messages: &[Message]) -> Result<String, Error> {
        let request = ApiRequest {
            model: model.as_str(),
            messages: to_api_messages(messages),
            tools: None,
            tool_choice: None,
        };
        let body = self.post(&request).await?;
        parse_completion(&body)
    }

    /// Force a call to `tool` and return its parsed arguments.
    pub async fn call_function(
        &self,
        model: Model,
        messages: &[Message],
        tool: &FunctionTool,
    ) -> Result<Value, Error> {
        let request = ApiRequest {
            model: model.as_str(),
            messages: to_api_messages(messages),
            tools: Some(vec![ApiTool {
                kind: "function",
                function: ApiFunction {
                    name: tool.name,
                    description: tool.description,
                    parameters: &tool.parameters,
                },
            }]),
            tool_choice: Some(serde_json::json!({
                "type": "function",
                "function": { "name": tool.name }
            })),
        };
        let body = self.post(&request).await?;
        let args = parse_tool_arguments(&body)?;
        debug!("{} -> {}", tool.name, args);
        Ok(args)
    }

    async fn post(&self, request: &ApiRequest<'_>) -> Result<String, Error> {
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        response.text().await.map_err(|e| Error::Http(e.to_string()))
    }
}

fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: m.role.as_str(),
            content: m.content.clone(),
        })
        .collect()
}

fn first_message(body: &str) -> Result<ResponseMessage, Error> {
    let response: ApiResponse =
        serde_json::from_str(body).map_err(|e| Error::Parse(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or(Error::Empty)
}

fn parse_completion(body: &str) -> Result<String, Error> {
    first_message(body)?
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or(Error::Empty)
}

fn parse_tool_arguments(body: &str) -> Result<Value, Error> {
    let call = first_message(body)?
        .tool_calls
        .into_iter()
        .next()
        .ok_or(Error::Empty)?;
    serde_json::from_str(&call.function.arguments).map_err(|e| Error::Parse(e.to_string()))
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
    Parse(String),
    Empty,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for Error {}

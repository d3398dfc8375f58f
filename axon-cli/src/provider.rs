use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde_json::{json, Value};

use axon_types::ports::{LlmProvider, StreamChunk};
use axon_types::{CompletionRequest, CompletionResponse, KernelError, ToolCallRequest, UsageTokens};

/// Talks to any OpenAI-compatible `/chat/completions` endpoint. Grounded
/// on the reference platform's `OpenAICompatibleProvider::complete`: build
/// a chat-completions body, apply bearer auth when an API key is
/// configured, and surface the provider's own error body on a non-2xx
/// response rather than a bare status code. `generate_stream` does not
/// parse the server-sent-events token stream the reference provider's
/// real streaming path does; it falls back to one `generate` call wrapped
/// in a single `Done` chunk, matching the default fallback the upstream
/// `Provider` trait itself offers implementors that skip true streaming.
pub struct OpenAiCompatibleProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { id: id.into(), base_url: base_url.into(), api_key, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, req: &CompletionRequest) -> Result<CompletionResponse, KernelError> {
        let mut messages = Vec::new();
        if let Some(system) = &req.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        for message in &req.messages {
            messages.push(json!({"role": message.role, "content": message.content}));
        }

        let mut body = json!({ "model": req.model.model_id, "messages": messages });
        if let Some(temperature) = req.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = req.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(tools) = req.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = json!(tools
                .iter()
                .map(|tool| json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    }
                }))
                .collect::<Vec<_>>());
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|err| KernelError::TransportError(err.to_string()))?;
        let status = response.status();
        let value: Value = response.json().await.map_err(|err| KernelError::ProviderError(err.to_string()))?;
        if !status.is_success() {
            let detail = extract_error_message(&value)
                .unwrap_or_else(|| format!("provider request failed with status {status}"));
            return Err(KernelError::ProviderError(detail));
        }

        let choice = value.get("choices").and_then(|choices| choices.get(0));
        let message = choice.and_then(|c| c.get("message"));
        let content = message.and_then(|m| m.get("content")).and_then(Value::as_str).map(str::to_string);
        let tool_calls = message
            .and_then(|m| m.get("tool_calls"))
            .and_then(Value::as_array)
            .map(|calls| calls.iter().filter_map(parse_tool_call).collect())
            .unwrap_or_default();

        let usage = value.get("usage");
        let prompt_tokens = usage.and_then(|u| u.get("prompt_tokens")).and_then(Value::as_u64).unwrap_or(0);
        let completion_tokens = usage.and_then(|u| u.get("completion_tokens")).and_then(Value::as_u64).unwrap_or(0);

        Ok(CompletionResponse { content, tool_calls, usage: UsageTokens { prompt_tokens, completion_tokens } })
    }

    async fn generate_stream(
        &self,
        req: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, KernelError>>, KernelError> {
        let response = self.generate(req).await?;
        Ok(Box::pin(stream::iter(vec![Ok(StreamChunk::Done(response))])))
    }
}

fn parse_tool_call(call: &Value) -> Option<ToolCallRequest> {
    let id = call.get("id")?.as_str()?.to_string();
    let function = call.get("function")?;
    let name = function.get("name")?.as_str()?.to_string();
    let arguments = function
        .get("arguments")
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| json!({}));
    Some(ToolCallRequest { id, name, arguments })
}

fn extract_error_message(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(|err| err.get("message").and_then(Value::as_str).map(str::to_string).or_else(|| err.as_str().map(str::to_string)))
}

/// Always-available fallback: echoes the last user message back with a
/// prefix. Lets the CLI run end to end with no network access or API key
/// configured, the same way a from-scratch checkout should be runnable
/// before anyone has filled in provider credentials.
pub struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    fn id(&self) -> &str {
        "echo"
    }

    async fn generate(&self, req: &CompletionRequest) -> Result<CompletionResponse, KernelError> {
        let last_user = req.messages.iter().rev().find(|m| m.role == "user").map(|m| m.content.clone()).unwrap_or_default();
        let prompt_tokens = last_user.split_whitespace().count() as u64;
        Ok(CompletionResponse {
            content: Some(format!("echo: {last_user}")),
            tool_calls: Vec::new(),
            usage: UsageTokens { prompt_tokens, completion_tokens: prompt_tokens },
        })
    }

    async fn generate_stream(
        &self,
        req: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, KernelError>>, KernelError> {
        let response = self.generate(req).await?;
        Ok(Box::pin(stream::iter(vec![Ok(StreamChunk::Done(response))])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_types::{ChatMessage, ModelSpec};

    fn request(user_text: &str) -> CompletionRequest {
        CompletionRequest {
            model: ModelSpec { provider_id: "default".to_string(), model_id: "default".to_string() },
            system_prompt: None,
            messages: vec![ChatMessage { role: "user".to_string(), content: user_text.to_string() }],
            temperature: None,
            max_tokens: None,
            tools: None,
        }
    }

    #[tokio::test]
    async fn echo_provider_prefixes_the_last_user_message() {
        let response = EchoProvider.generate(&request("hello there")).await.expect("generate");
        assert_eq!(response.content.as_deref(), Some("echo: hello there"));
    }

    #[test]
    fn extract_error_message_reads_nested_openai_shaped_errors() {
        let body = json!({"error": {"message": "invalid api key"}});
        assert_eq!(extract_error_message(&body), Some("invalid api key".to_string()));
    }
}

use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::types::{ChatRequest, Role};

/// 构建 generateContent 请求体
///
/// system 消息合并进 `systemInstruction`，assistant 角色映射为 Gemini 的 `model`。
pub(crate) fn build_gemini_body(request: &ChatRequest) -> Result<Value, LLMError> {
    let mut system_texts = Vec::new();
    let mut contents = Vec::new();
    for message in &request.messages {
        let role = match message.role {
            Role::System => {
                system_texts.push(message.content.as_str());
                continue;
            }
            Role::User => "user",
            Role::Assistant => "model",
        };
        contents.push(json!({
            "role": role,
            "parts": [{ "text": message.content }],
        }));
    }

    if contents.is_empty() {
        return Err(LLMError::Validation {
            message: "Gemini request requires at least one user/assistant message".to_string(),
        });
    }

    let mut body = Map::new();
    body.insert("contents".to_string(), Value::Array(contents));
    if !system_texts.is_empty() {
        body.insert(
            "systemInstruction".to_string(),
            json!({ "parts": [{ "text": system_texts.join("\n\n") }] }),
        );
    }

    let mut generation = Map::new();
    if let Some(max_tokens) = request.options.max_output_tokens {
        generation.insert("maxOutputTokens".to_string(), Value::from(max_tokens));
    }
    if let Some(temperature) = request.options.temperature {
        generation.insert("temperature".to_string(), Value::from(temperature));
    }
    if !generation.is_empty() {
        body.insert("generationConfig".to_string(), Value::Object(generation));
    }

    Ok(Value::Object(body))
}

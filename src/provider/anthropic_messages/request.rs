use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::types::{ChatRequest, Role};

/// 构建 Anthropic Messages 请求体
///
/// system 消息折叠为顶层 `system` 字段，其余按顺序进入 `messages`。
pub(crate) fn build_anthropic_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));

    let mut system_texts = Vec::new();
    let mut messages = Vec::new();
    for message in &request.messages {
        match message.role {
            Role::System => system_texts.push(message.content.as_str()),
            Role::User | Role::Assistant => messages.push(json!({
                "role": message.role.as_str(),
                "content": message.content,
            })),
        }
    }

    if messages.is_empty() {
        return Err(LLMError::Validation {
            message: "Anthropic Messages request requires at least one user/assistant message"
                .to_string(),
        });
    }
    body.insert("messages".to_string(), Value::Array(messages));

    if !system_texts.is_empty() {
        body.insert(
            "system".to_string(),
            Value::String(system_texts.join("\n\n")),
        );
    }

    let Some(max_tokens) = request.options.max_output_tokens else {
        return Err(LLMError::Validation {
            message: "Anthropic Messages requires max_output_tokens (mapped to max_tokens)"
                .to_string(),
        });
    };
    body.insert("max_tokens".to_string(), Value::from(max_tokens));
    if let Some(temperature) = request.options.temperature {
        body.insert("temperature".to_string(), Value::from(temperature));
    }
    if stream {
        body.insert("stream".to_string(), Value::Bool(true));
    }

    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn request(messages: Vec<Message>) -> ChatRequest {
        let mut request = ChatRequest::new(messages, "claude-3-haiku");
        request.options.max_output_tokens = Some(1000);
        request
    }

    #[test]
    fn system_messages_are_lifted_to_top_level() {
        let body = build_anthropic_body(
            &request(vec![
                Message::system("You must respond in hi."),
                Message::system("You are a helpful assistant."),
                Message::user("Namaste"),
            ]),
            "claude-3-haiku",
            true,
        )
        .expect("body");

        assert_eq!(
            body["system"],
            "You must respond in hi.\n\nYou are a helpful assistant."
        );
        assert_eq!(
            body["messages"],
            json!([{"role": "user", "content": "Namaste"}])
        );
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn non_streaming_body_omits_stream_flag() {
        let body = build_anthropic_body(&request(vec![Message::user("hi")]), "claude-3-haiku", false)
            .expect("body");
        assert!(body.get("stream").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn requires_a_conversational_message_and_max_tokens() {
        let err = build_anthropic_body(
            &request(vec![Message::system("only system")]),
            "claude-3-haiku",
            false,
        )
        .unwrap_err();
        assert!(matches!(err, LLMError::Validation { .. }));

        let bare = ChatRequest::new(vec![Message::user("hi")], "claude-3-haiku");
        let err = build_anthropic_body(&bare, "claude-3-haiku", false).unwrap_err();
        assert!(matches!(err, LLMError::Validation { .. }));
    }
}

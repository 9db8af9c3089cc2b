use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::types::ChatRequest;

/// 构建 chat/completions 请求体
pub(crate) fn build_openai_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    if request.messages.is_empty() {
        return Err(LLMError::Validation {
            message: "chat completion request requires at least one message".to_string(),
        });
    }

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    let messages = request
        .messages
        .iter()
        .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
        .collect();
    body.insert("messages".to_string(), Value::Array(messages));

    if let Some(temperature) = request.options.temperature {
        body.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(max_tokens) = request.options.max_output_tokens {
        body.insert("max_tokens".to_string(), Value::from(max_tokens));
    }
    body.insert("stream".to_string(), Value::Bool(stream));
    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn body_keeps_message_order_and_roles() {
        let mut request = ChatRequest::new(
            vec![
                Message::system("You must respond in es."),
                Message::user("Hola"),
            ],
            "gpt-3.5-turbo",
        );
        request.options.max_output_tokens = Some(1000);

        let body = build_openai_body(&request, "gpt-3.5-turbo", true).expect("body");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(
            body["messages"],
            json!([
                {"role": "system", "content": "You must respond in es."},
                {"role": "user", "content": "Hola"}
            ])
        );
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn empty_message_list_is_rejected() {
        let request = ChatRequest::new(Vec::new(), "gpt-3.5-turbo");
        let err = build_openai_body(&request, "gpt-3.5-turbo", false).unwrap_err();
        assert!(matches!(err, LLMError::Validation { .. }));
    }
}

use aigate_protocol::claude::{Message as ClaudeMessage, MessagesRequest};
use aigate_protocol::gemini::{Content as GeminiContent, GenerateContentRequest};
use aigate_protocol::openai::{ChatCompletionRequest, ChatMessage as OpenAiMessage};
use serde_json::Value;

/// Converts an OpenAI chat-completions request into Claude's Messages
/// shape. System messages have no dedicated slot in the minimal Claude DTO
/// here, so they're folded into a leading user turn the way the teacher's
/// openai-compat layer folds them into Claude's top-level `system` field.
pub fn openai_to_claude(request: ChatCompletionRequest) -> MessagesRequest {
    let mut messages = Vec::with_capacity(request.messages.len());
    let mut system_texts = Vec::new();

    for message in request.messages {
        if message.role == "system" {
            if let Some(text) = message.content.as_str() {
                system_texts.push(text.to_string());
            }
            continue;
        }
        messages.push(ClaudeMessage {
            role: message.role,
            content: message.content,
        });
    }

    if let Some(first) = messages.first_mut() {
        if !system_texts.is_empty() && first.role == "user" {
            let system = system_texts.join("\n");
            if let Some(text) = first.content.as_str() {
                first.content = Value::String(format!("{system}\n\n{text}"));
            }
        }
    }

    let mut extra = request.extra;
    extra.remove("model");
    extra.remove("stream");
    extra.remove("messages");
    extra
        .entry("max_tokens")
        .or_insert_with(|| Value::Number(4096.into()));

    MessagesRequest {
        model: request.model,
        stream: request.stream,
        messages,
        extra,
    }
}

pub fn claude_to_openai(request: MessagesRequest) -> ChatCompletionRequest {
    let messages = request
        .messages
        .into_iter()
        .map(|message| OpenAiMessage {
            role: message.role,
            content: message.content,
        })
        .collect();

    let mut extra = request.extra;
    extra.remove("model");
    extra.remove("stream");
    extra.remove("messages");
    extra.remove("max_tokens");

    ChatCompletionRequest {
        model: request.model,
        stream: request.stream,
        messages,
        extra,
    }
}

/// Gemini uses `"model"` where OpenAI/Claude use `"assistant"`, and wraps
/// content in a `parts` array rather than a bare value.
pub fn openai_to_gemini(request: ChatCompletionRequest) -> GenerateContentRequest {
    let contents = request
        .messages
        .into_iter()
        .filter(|message| message.role != "system")
        .map(|message| GeminiContent {
            role: Some(gemini_role(&message.role).to_string()),
            parts: vec![serde_json::json!({ "text": content_to_text(&message.content) })],
        })
        .collect();

    let mut extra = request.extra;
    extra.remove("model");
    extra.remove("stream");
    extra.remove("messages");

    GenerateContentRequest { contents, extra }
}

pub fn gemini_to_openai(request: GenerateContentRequest, model: String, stream: bool) -> ChatCompletionRequest {
    let messages = request
        .contents
        .into_iter()
        .map(|content| OpenAiMessage {
            role: openai_role(content.role.as_deref().unwrap_or("user")).to_string(),
            content: parts_to_value(&content.parts),
        })
        .collect();

    let mut extra = request.extra;
    extra.remove("contents");

    ChatCompletionRequest {
        model,
        stream,
        messages,
        extra,
    }
}

pub fn claude_to_gemini(request: MessagesRequest) -> GenerateContentRequest {
    let contents = request
        .messages
        .into_iter()
        .map(|message| GeminiContent {
            role: Some(gemini_role(&message.role).to_string()),
            parts: vec![serde_json::json!({ "text": content_to_text(&message.content) })],
        })
        .collect();

    let mut extra = request.extra;
    extra.remove("model");
    extra.remove("stream");
    extra.remove("messages");
    extra.remove("max_tokens");

    GenerateContentRequest { contents, extra }
}

pub fn gemini_to_claude(request: GenerateContentRequest, model: String, stream: bool) -> MessagesRequest {
    let messages = request
        .contents
        .into_iter()
        .map(|content| ClaudeMessage {
            role: openai_role(content.role.as_deref().unwrap_or("user")).to_string(),
            content: parts_to_value(&content.parts),
        })
        .collect();

    let mut extra = request.extra;
    extra.remove("contents");
    extra
        .entry("max_tokens")
        .or_insert_with(|| Value::Number(4096.into()));

    MessagesRequest {
        model,
        stream,
        messages,
        extra,
    }
}

fn gemini_role(role: &str) -> &'static str {
    match role {
        "assistant" => "model",
        _ => "user",
    }
}

fn openai_role(role: &str) -> &'static str {
    match role {
        "model" => "assistant",
        _ => "user",
    }
}

fn content_to_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn parts_to_value(parts: &[Value]) -> Value {
    if let [single] = parts {
        if let Some(text) = single.get("text").and_then(Value::as_str) {
            return Value::String(text.to_string());
        }
    }
    let joined: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    Value::String(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai_request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-4o-mini".into(),
            stream: false,
            messages: vec![
                OpenAiMessage {
                    role: "system".into(),
                    content: Value::String("be terse".into()),
                },
                OpenAiMessage {
                    role: "user".into(),
                    content: Value::String("hi".into()),
                },
            ],
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn openai_to_claude_folds_system_into_first_user_message() {
        let claude = openai_to_claude(openai_request());
        assert_eq!(claude.messages.len(), 1);
        assert_eq!(claude.messages[0].role, "user");
        assert_eq!(
            claude.messages[0].content.as_str().unwrap(),
            "be terse\n\nhi"
        );
    }

    #[test]
    fn openai_to_gemini_maps_assistant_to_model_role() {
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini".into(),
            stream: false,
            messages: vec![
                OpenAiMessage {
                    role: "user".into(),
                    content: Value::String("hi".into()),
                },
                OpenAiMessage {
                    role: "assistant".into(),
                    content: Value::String("hello".into()),
                },
            ],
            extra: serde_json::Map::new(),
        };
        let gemini = openai_to_gemini(request);
        assert_eq!(gemini.contents.len(), 2);
        assert_eq!(gemini.contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn gemini_to_claude_injects_default_max_tokens() {
        let request = GenerateContentRequest {
            contents: vec![GeminiContent {
                role: Some("user".into()),
                parts: vec![serde_json::json!({"text": "hi"})],
            }],
            extra: serde_json::Map::new(),
        };
        let claude = gemini_to_claude(request, "claude-3-5-sonnet".into(), false);
        assert_eq!(claude.extra.get("max_tokens").unwrap(), &serde_json::json!(4096));
    }
}

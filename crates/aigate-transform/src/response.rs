use aigate_protocol::claude::{MessagesResponse, MessagesUsage};
use aigate_protocol::gemini::{GenerateContentResponse, UsageMetadata};
use aigate_protocol::openai::{ChatCompletionResponse, ChatCompletionUsage};

/// Usage expressed in the one currency the gateway core bills on:
/// prompt/completion token counts. Every family's response transform
/// collapses down to this before anything touches the Usage Sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSummary {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

pub fn usage_from_openai(usage: &ChatCompletionUsage) -> UsageSummary {
    UsageSummary {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
    }
}

pub fn usage_from_claude(usage: &MessagesUsage) -> UsageSummary {
    UsageSummary {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
    }
}

pub fn usage_from_gemini(usage: &UsageMetadata) -> UsageSummary {
    UsageSummary {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
    }
}

pub fn claude_to_openai(response: MessagesResponse) -> ChatCompletionResponse {
    let usage = response.usage.as_ref().map(|usage| ChatCompletionUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
    });

    let mut extra = response.extra;
    extra.remove("usage");

    ChatCompletionResponse {
        id: response.id,
        model: response.model,
        usage,
        extra,
    }
}

pub fn openai_to_claude(response: ChatCompletionResponse) -> MessagesResponse {
    let usage = response.usage.as_ref().map(|usage| MessagesUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    });

    let mut extra = response.extra;
    extra.remove("usage");

    MessagesResponse {
        id: response.id,
        model: response.model,
        usage,
        extra,
    }
}

pub fn gemini_to_openai(response: GenerateContentResponse, id: String, model: String) -> ChatCompletionResponse {
    let usage = response
        .usage_metadata
        .as_ref()
        .map(|usage| ChatCompletionUsage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.prompt_token_count + usage.candidates_token_count,
        });

    let mut extra = response.extra;
    extra.remove("usageMetadata");

    ChatCompletionResponse {
        id,
        model,
        usage,
        extra,
    }
}

pub fn openai_to_gemini(response: ChatCompletionResponse) -> GenerateContentResponse {
    let usage_metadata = response.usage.as_ref().map(|usage| UsageMetadata {
        prompt_token_count: usage.prompt_tokens,
        candidates_token_count: usage.completion_tokens,
    });

    let mut extra = response.extra;
    extra.remove("usage");

    GenerateContentResponse {
        usage_metadata,
        extra,
    }
}

pub fn claude_to_gemini(response: MessagesResponse) -> GenerateContentResponse {
    let usage_metadata = response.usage.as_ref().map(|usage| UsageMetadata {
        prompt_token_count: usage.input_tokens,
        candidates_token_count: usage.output_tokens,
    });

    let mut extra = response.extra;
    extra.remove("usage");

    GenerateContentResponse {
        usage_metadata,
        extra,
    }
}

pub fn gemini_to_claude(response: GenerateContentResponse, id: String, model: String) -> MessagesResponse {
    let usage = response.usage_metadata.as_ref().map(|usage| MessagesUsage {
        input_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
    });

    let mut extra = response.extra;
    extra.remove("usageMetadata");

    MessagesResponse {
        id,
        model,
        usage,
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_to_openai_sums_total_tokens() {
        let response = MessagesResponse {
            id: "msg_1".into(),
            model: "claude-3-5-sonnet".into(),
            usage: Some(MessagesUsage {
                input_tokens: 10,
                output_tokens: 5,
            }),
            extra: serde_json::Map::new(),
        };
        let openai = claude_to_openai(response);
        let usage = openai.usage.unwrap();
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn gemini_to_openai_reads_usage_metadata() {
        let response = GenerateContentResponse {
            usage_metadata: Some(UsageMetadata {
                prompt_token_count: 8,
                candidates_token_count: 2,
            }),
            extra: serde_json::Map::new(),
        };
        let openai = gemini_to_openai(response, "resp_1".into(), "gemini-1.5-pro".into());
        let usage = openai.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 8);
        assert_eq!(usage.completion_tokens, 2);
    }
}

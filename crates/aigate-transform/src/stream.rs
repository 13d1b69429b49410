use aigate_protocol::claude::StreamEvent as ClaudeStreamEvent;
use aigate_protocol::gemini::GenerateContentResponse as GeminiChunk;
use aigate_protocol::openai::ChatCompletionChunk as OpenAiChunk;

use crate::response::UsageSummary;
use crate::types::Proto;

/// Accumulates usage across a stream as chunks arrive. Providers disclose
/// usage at different points (Claude splits it across `message_start` and
/// `message_delta`; OpenAI only sends it on the final chunk when opted in;
/// Gemini repeats cumulative totals on every chunk), so each push just
/// overwrites the field the chunk actually carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageAccumulator {
    summary: UsageSummary,
    seen: bool,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_openai(&mut self, chunk: &OpenAiChunk) {
        if let Some(usage) = &chunk.usage {
            self.summary.prompt_tokens = usage.prompt_tokens;
            self.summary.completion_tokens = usage.completion_tokens;
            self.seen = true;
        }
    }

    pub fn push_claude(&mut self, event: &ClaudeStreamEvent) {
        match event {
            ClaudeStreamEvent::MessageStart { message } => {
                if let Some(usage) = &message.usage {
                    self.summary.prompt_tokens = usage.input_tokens;
                    self.summary.completion_tokens = usage.output_tokens;
                    self.seen = true;
                }
            }
            ClaudeStreamEvent::MessageDelta { usage, .. } => {
                if let Some(usage) = usage {
                    if let Some(output_tokens) = usage.output_tokens {
                        self.summary.completion_tokens = output_tokens;
                        self.seen = true;
                    }
                }
            }
            ClaudeStreamEvent::Other => {}
        }
    }

    pub fn push_gemini(&mut self, chunk: &GeminiChunk) {
        if let Some(usage) = &chunk.usage_metadata {
            self.summary.prompt_tokens = usage.prompt_token_count;
            self.summary.completion_tokens = usage.candidates_token_count;
            self.seen = true;
        }
    }

    pub fn finalize(&self) -> Option<UsageSummary> {
        self.seen.then_some(self.summary)
    }
}

/// Which framing a stream's SSE/NDJSON transport uses, independent of the
/// usage accumulation above. Claude and the OpenAI Responses family name
/// their events; OpenAI chat-completions and Gemini's NDJSON stream don't.
pub fn frames_as_named_events(proto: Proto) -> bool {
    matches!(proto, Proto::Claude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigate_protocol::claude::MessagesResponse;

    #[test]
    fn openai_chunk_without_usage_does_not_finalize() {
        let mut acc = UsageAccumulator::new();
        acc.push_openai(&OpenAiChunk {
            id: "chatcmpl_1".into(),
            usage: None,
            extra: serde_json::Map::new(),
        });
        assert!(acc.finalize().is_none());
    }

    #[test]
    fn claude_message_start_then_delta_accumulates() {
        let mut acc = UsageAccumulator::new();
        acc.push_claude(&ClaudeStreamEvent::MessageStart {
            message: MessagesResponse {
                id: "msg_1".into(),
                model: "claude-3-5-sonnet".into(),
                usage: Some(aigate_protocol::claude::MessagesUsage {
                    input_tokens: 12,
                    output_tokens: 0,
                }),
                extra: serde_json::Map::new(),
            },
        });
        acc.push_claude(&ClaudeStreamEvent::MessageDelta {
            usage: Some(aigate_protocol::claude::PartialUsage {
                output_tokens: Some(9),
            }),
            extra: serde_json::Map::new(),
        });
        let summary = acc.finalize().unwrap();
        assert_eq!(summary.prompt_tokens, 12);
        assert_eq!(summary.completion_tokens, 9);
    }
}

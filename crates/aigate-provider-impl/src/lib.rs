//! Concrete `Adapter` implementations for each provider family (§4.1),
//! built on a shared HTTP/SSE plumbing module rather than each adapter
//! reimplementing deadline handling and status classification.

pub mod http;
pub mod providers;

pub use providers::anthropic::AnthropicAdapter;
pub use providers::gemini::GeminiAdapter;
pub use providers::mock::{MockAdapter, MockFailure, Scripted};
pub use providers::openai::OpenAiAdapter;

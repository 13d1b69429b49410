//! Dispatches the pairwise request/response functions in [`crate::request`]
//! and [`crate::response`] by `(from, to)` protocol pair, so the Gateway can
//! convert a canonical body into whatever wire shape the chosen candidate's
//! adapter speaks without matching on `Proto` itself (§4.1 TransformRequest/
//! TransformResponse, §9's "tagged sum at the Gateway/Router boundary").
//!
//! `model`/`stream` are threaded through explicitly because Gemini's wire
//! request has neither field in the body (both live in the URL path), so
//! converting *into* OpenAI/Claude from a Gemini source has to source them
//! from the caller rather than the payload.

use aigate_protocol::claude::MessagesRequest;
use aigate_protocol::gemini::GenerateContentRequest;
use aigate_protocol::openai::ChatCompletionRequest;
use serde_json::Value;

use crate::types::{Proto, TransformError};
use crate::{request, response};

pub fn convert_request(
    from: Proto,
    to: Proto,
    body: Value,
    model: &str,
    stream: bool,
) -> Result<Value, TransformError> {
    if from == to {
        return Ok(body);
    }

    let converted = match (from, to) {
        (Proto::OpenAi, Proto::Claude) => {
            serde_json::to_value(request::openai_to_claude(serde_json::from_value::<ChatCompletionRequest>(body)?))?
        }
        (Proto::Claude, Proto::OpenAi) => {
            serde_json::to_value(request::claude_to_openai(serde_json::from_value::<MessagesRequest>(body)?))?
        }
        (Proto::OpenAi, Proto::Gemini) => {
            serde_json::to_value(request::openai_to_gemini(serde_json::from_value::<ChatCompletionRequest>(body)?))?
        }
        (Proto::Gemini, Proto::OpenAi) => serde_json::to_value(request::gemini_to_openai(
            serde_json::from_value::<GenerateContentRequest>(body)?,
            model.to_string(),
            stream,
        ))?,
        (Proto::Claude, Proto::Gemini) => {
            serde_json::to_value(request::claude_to_gemini(serde_json::from_value::<MessagesRequest>(body)?))?
        }
        (Proto::Gemini, Proto::Claude) => serde_json::to_value(request::gemini_to_claude(
            serde_json::from_value::<GenerateContentRequest>(body)?,
            model.to_string(),
            stream,
        ))?,
        (same_from, same_to) => {
            debug_assert_eq!(same_from, same_to);
            return Ok(body);
        }
    };

    Ok(converted)
}

pub fn convert_response(
    from: Proto,
    to: Proto,
    body: Value,
    id: &str,
    model: &str,
) -> Result<Value, TransformError> {
    if from == to {
        return Ok(body);
    }

    let converted = match (from, to) {
        (Proto::Claude, Proto::OpenAi) => serde_json::to_value(response::claude_to_openai(serde_json::from_value(body)?))?,
        (Proto::OpenAi, Proto::Claude) => serde_json::to_value(response::openai_to_claude(serde_json::from_value(body)?))?,
        (Proto::Gemini, Proto::OpenAi) => serde_json::to_value(response::gemini_to_openai(
            serde_json::from_value(body)?,
            id.to_string(),
            model.to_string(),
        ))?,
        (Proto::OpenAi, Proto::Gemini) => serde_json::to_value(response::openai_to_gemini(serde_json::from_value(body)?))?,
        (Proto::Claude, Proto::Gemini) => serde_json::to_value(response::claude_to_gemini(serde_json::from_value(body)?))?,
        (Proto::Gemini, Proto::Claude) => serde_json::to_value(response::gemini_to_claude(
            serde_json::from_value(body)?,
            id.to_string(),
            model.to_string(),
        ))?,
        (same_from, same_to) => {
            debug_assert_eq!(same_from, same_to);
            return Ok(body);
        }
    };

    Ok(converted)
}

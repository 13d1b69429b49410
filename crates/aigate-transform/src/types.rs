use serde::{Deserialize, Serialize};

/// The wire protocol family a request was received as or needs to be sent
/// as. Narrower than `aigate_common::ApiFamily`: that type distinguishes
/// OpenAI's own sibling endpoints (chat vs. responses), this one only
/// distinguishes providers, since that's the axis every transform pairs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proto {
    OpenAi,
    Claude,
    Gemini,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    ProtoMismatch { expected: Proto, found: Proto },
    MissingField(&'static str),
    Malformed(String),
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformError::ProtoMismatch { expected, found } => {
                write!(f, "expected {expected:?} payload, found {found:?}")
            }
            TransformError::MissingField(name) => write!(f, "missing field: {name}"),
            TransformError::Malformed(detail) => write!(f, "malformed payload: {detail}"),
        }
    }
}

impl From<serde_json::Error> for TransformError {
    fn from(err: serde_json::Error) -> Self {
        TransformError::Malformed(err.to_string())
    }
}

impl std::error::Error for TransformError {}

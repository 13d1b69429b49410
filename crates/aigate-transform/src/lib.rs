//! Pure request/response conversions between the OpenAI, Claude and Gemini
//! wire shapes defined in `aigate_protocol`. Nothing here performs I/O or
//! knows about routing, credentials or quotas; it's the same
//! transform-as-pure-function layer the teacher keeps independent of the
//! provider/dispatch machinery that calls it.

pub mod convert;
pub mod request;
pub mod response;
pub mod stream;
pub mod types;

pub use convert::{convert_request, convert_response};
pub use types::{Proto, TransformError};

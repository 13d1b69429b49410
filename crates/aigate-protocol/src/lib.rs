//! Wire-format DTOs for each upstream API family, typed only as far as the
//! gateway core needs (model name, stream flag, message list for size
//! accounting, usage on the way back). Everything else round-trips through
//! an `extra` bucket so adapters never have to keep up with every field a
//! provider adds.

pub mod claude;
pub mod gemini;
pub mod openai;
pub mod sse;

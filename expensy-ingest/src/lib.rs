//! expensy-ingest: statement extraction through Gemini structured output.

pub mod gemini;
pub mod prompt;
pub mod response;

pub use gemini::{GeminiClient, GeminiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
pub use response::parse_records;

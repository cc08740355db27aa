//! Strict parsing of the model's JSON answer.
//!
//! Anything that is not an array of `{date, description, amount, category?}`
//! objects becomes an empty extraction instead of an error.

use expensy_core::{EmptyReason, ExpenseCandidate, ExtractionOutcome};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct RawRecord {
    date: String,
    description: String,
    amount: f64,
    #[serde(default)]
    category: Option<String>,
}

/// Parse the text the model produced under the structured-output schema
pub fn parse_records(text: &str) -> ExtractionOutcome {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return ExtractionOutcome::Empty(EmptyReason::NoRecords);
    }

    match serde_json::from_str::<Vec<RawRecord>>(body) {
        Ok(records) => ExtractionOutcome::from_records(
            records
                .into_iter()
                .map(|r| ExpenseCandidate {
                    date: r.date,
                    description: r.description,
                    amount: r.amount,
                    category: r.category,
                })
                .collect(),
        ),
        Err(e) => {
            warn!(error = %e, "extraction response does not match the record schema");
            ExtractionOutcome::Empty(EmptyReason::Malformed(e.to_string()))
        }
    }
}

// Models sometimes wrap JSON in ```json fences even in JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

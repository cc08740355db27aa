//! Instructions and response schema sent with every extraction request

use serde_json::{json, Value};

pub const TEXT_INSTRUCTIONS: &str = "Analyze this credit card statement or list of transactions and \
extract the individual expenses. Return only structured purchase data. Ignore bill payments, \
refunds and credits.";

pub const DOCUMENT_INSTRUCTIONS: &str = "Extract every purchase transaction from this credit card \
statement. Return a list of objects with the date, the description and a positive numeric amount. \
Ignore bill payments, refunds and credits.";

/// Prompt for pasted statement text
pub fn text_prompt(statement: &str) -> String {
    format!("{TEXT_INSTRUCTIONS}\n\nStatement text:\n{statement}")
}

/// Structured-output schema: an array of purchase records
pub fn response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "date": {
                    "type": "STRING",
                    "description": "Transaction date as printed (e.g. 15/05)"
                },
                "description": {
                    "type": "STRING",
                    "description": "Merchant name or description"
                },
                "amount": {
                    "type": "NUMBER",
                    "description": "Transaction amount as a positive number"
                },
                "category": {
                    "type": "STRING",
                    "description": "Suggested category (e.g. Food, Transport, Leisure)"
                }
            },
            "required": ["date", "description", "amount"]
        }
    })
}

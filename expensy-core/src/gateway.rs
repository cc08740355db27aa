//! Extraction gateway contract.
//!
//! A gateway turns statement text or a statement image/PDF into candidate
//! expense records. Implementations live outside the core; the core only
//! decides what a candidate must look like before it becomes an [`Expense`].

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::model::Expense;

/// Media types accepted for uploaded statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Png,
    Jpeg,
    Webp,
    Heic,
    Heif,
    Gif,
    Pdf,
}

impl MediaType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(MediaType::Png),
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "webp" => Some(MediaType::Webp),
            "heic" => Some(MediaType::Heic),
            "heif" => Some(MediaType::Heif),
            "gif" => Some(MediaType::Gif),
            "pdf" => Some(MediaType::Pdf),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Webp => "image/webp",
            MediaType::Heic => "image/heic",
            MediaType::Heif => "image/heif",
            MediaType::Gif => "image/gif",
            MediaType::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// What the user handed over for extraction
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionInput {
    /// Pasted statement text
    Text(String),
    /// Uploaded statement image or PDF
    Document { media_type: MediaType, bytes: Vec<u8> },
}

impl ExtractionInput {
    /// Read an uploaded file, rejecting anything that is not an image or PDF
    pub fn from_file(path: &Path) -> Result<Self, GatewayError> {
        let media_type = MediaType::from_path(path)
            .ok_or_else(|| GatewayError::UnsupportedMediaType(path.display().to_string()))?;
        let bytes = std::fs::read(path)?;
        Ok(ExtractionInput::Document { media_type, bytes })
    }
}

/// One record as returned by the gateway, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseCandidate {
    pub date: String,
    pub description: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    /// The gateway answered with zero records
    NoRecords,
    /// The gateway answered with something that does not match the record schema
    Malformed(String),
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyReason::NoRecords => f.write_str("no purchases found"),
            EmptyReason::Malformed(detail) => write!(f, "unreadable extraction result: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Records(Vec<ExpenseCandidate>),
    Empty(EmptyReason),
}

impl ExtractionOutcome {
    pub fn from_records(records: Vec<ExpenseCandidate>) -> Self {
        if records.is_empty() {
            ExtractionOutcome::Empty(EmptyReason::NoRecords)
        } else {
            ExtractionOutcome::Records(records)
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing API key for the extraction service")]
    MissingCredential,
    #[error("invalid API key for the extraction service: {0}")]
    InvalidCredential(String),
    #[error("unsupported statement file (expected an image or PDF): {0}")]
    UnsupportedMediaType(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("extraction service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reading statement: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionOutcome, GatewayError>;
}

/// Candidates accepted and rejected at the gateway/store boundary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Admitted {
    pub expenses: Vec<Expense>,
    pub rejected: Vec<ExpenseCandidate>,
}

/// Turn candidates into expenses.
///
/// Non-finite or non-positive amounts are rejected. Every accepted record
/// gets a fresh id and starts without a receipt.
pub fn admit_candidates(candidates: Vec<ExpenseCandidate>) -> Admitted {
    let mut out = Admitted::default();
    for c in candidates {
        if !c.amount.is_finite() || c.amount <= 0.0 {
            warn!(description = %c.description, amount = c.amount, "rejected non-positive amount");
            out.rejected.push(c);
            continue;
        }
        let category = c
            .category
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let mut expense = Expense::new(c.date.trim(), c.description.trim(), c.amount);
        expense.category = category;
        out.expenses.push(expense);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(desc: &str, amount: f64) -> ExpenseCandidate {
        ExpenseCandidate {
            date: " 12/04 ".to_string(),
            description: format!(" {desc} "),
            amount,
            category: Some("  ".to_string()),
        }
    }

    #[test]
    fn test_media_type_from_path() {
        assert_eq!(MediaType::from_path(Path::new("fatura.PDF")), Some(MediaType::Pdf));
        assert_eq!(MediaType::from_path(Path::new("a/b/foto.jpg")), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_path(Path::new("extrato.csv")), None);
        assert_eq!(MediaType::from_path(Path::new("noext")), None);
        assert_eq!(MediaType::Webp.mime(), "image/webp");
    }

    #[test]
    fn test_from_file_rejects_before_reading() {
        let err = ExtractionInput::from_file(Path::new("/definitely/missing.txt")).unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedMediaType(_)));
    }

    #[test]
    fn test_admit_rejects_non_positive() {
        let admitted = admit_candidates(vec![
            cand("Supermercado", 150.0),
            cand("Pagamento fatura", -500.0),
            cand("Zero", 0.0),
            cand("NaN", f64::NAN),
            cand("Uber", 23.4),
        ]);
        assert_eq!(admitted.expenses.len(), 2);
        assert_eq!(admitted.rejected.len(), 3);

        let first = &admitted.expenses[0];
        assert_eq!(first.date, "12/04");
        assert_eq!(first.description, "Supermercado");
        assert!(first.category.is_none());
        assert!(!first.receipt_attached);
        assert_ne!(admitted.expenses[0].id, admitted.expenses[1].id);
    }

    #[test]
    fn test_outcome_from_records() {
        assert_eq!(
            ExtractionOutcome::from_records(vec![]),
            ExtractionOutcome::Empty(EmptyReason::NoRecords)
        );
        assert!(matches!(
            ExtractionOutcome::from_records(vec![cand("x", 1.0)]),
            ExtractionOutcome::Records(_)
        ));
    }
}

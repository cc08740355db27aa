//! Card accounts and the expenses they own

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single card purchase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Opaque identifier, unique within the owning account
    pub id: String,
    /// Display date as printed on the statement (e.g. "15/05"), never parsed
    pub date: String,
    /// Merchant name or statement description
    pub description: String,
    /// Purchase magnitude; always a positive spend, never a credit
    pub amount: f64,
    /// True once a receipt has been matched to this purchase
    #[serde(default)]
    pub receipt_attached: bool,
    /// Suggested category, advisory only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Link to the matched receipt, when one was uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
}

impl Expense {
    /// Create an unreconciled expense with a freshly generated id
    pub fn new(date: impl Into<String>, description: impl Into<String>, amount: f64) -> Self {
        Self {
            id: new_expense_id(),
            date: date.into(),
            description: description.into(),
            amount,
            receipt_attached: false,
            category: None,
            receipt_url: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_receipt(mut self, attached: bool) -> Self {
        self.receipt_attached = attached;
        self
    }
}

/// A credit card and its imported expenses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardAccount {
    pub id: String,
    pub name: String,
    pub last_four_digits: String,
    /// Display tag; the core never interprets it
    pub color: String,
    /// Insertion order is import order and display order
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

impl CardAccount {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        last_four_digits: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            last_four_digits: last_four_digits.into(),
            color: color.into(),
            expenses: Vec::new(),
        }
    }

    pub fn find_expense(&self, expense_id: &str) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == expense_id)
    }

    /// Label used in listings, e.g. "Nubank Principal (****4582)"
    pub fn label(&self) -> String {
        format!("{} (****{})", self.name, self.last_four_digits)
    }
}

/// Generate a fresh expense id
pub fn new_expense_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expense_defaults() {
        let e = Expense::new("12/04", "Supermercado", 150.0);
        assert!(!e.receipt_attached);
        assert!(e.category.is_none());
        assert_eq!(e.id.len(), 32);
    }

    #[test]
    fn test_ids_are_fresh() {
        let a = Expense::new("01/01", "A", 1.0);
        let b = Expense::new("01/01", "A", 1.0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_camel_case_wire_names() {
        let mut card = CardAccount::new("1", "Nubank Principal", "4582", "bg-purple-600");
        card.expenses
            .push(Expense::new("12/04", "Padaria", 12.5).with_id("e1"));

        let v = serde_json::to_value(&card).unwrap();
        assert_eq!(v["lastFourDigits"], "4582");
        assert_eq!(v["expenses"][0]["receiptAttached"], false);
        assert!(v["expenses"][0].get("category").is_none());
    }

    #[test]
    fn test_missing_receipt_flag_defaults_false() {
        let e: Expense = serde_json::from_str(
            r#"{"id":"x","date":"15/05","description":"Uber","amount":23.9}"#,
        )
        .unwrap();
        assert!(!e.receipt_attached);
        assert_eq!(e.amount, 23.9);
    }

    #[test]
    fn test_receipt_url_kept_when_present() {
        let e: Expense = serde_json::from_str(
            r#"{"id":"r1","date":"02/06","description":"Restaurante","amount":88.0,
                "receiptAttached":true,"receiptUrl":"https://files.example/r1.jpg"}"#,
        )
        .unwrap();
        assert_eq!(e.receipt_url.as_deref(), Some("https://files.example/r1.jpg"));
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["receiptUrl"], "https://files.example/r1.jpg");
        let plain = serde_json::to_value(Expense::new("01/01", "x", 1.0)).unwrap();
        assert!(plain.get("receiptUrl").is_none());
    }

    #[test]
    fn test_label() {
        let card = CardAccount::new("2", "Itaú Personalité", "1290", "bg-orange-500");
        assert_eq!(card.label(), "Itaú Personalité (****1290)");
    }
}

//! Expense entity and its wire envelopes.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

// ============================================================================
// IDENTITY
// ============================================================================

/// Server-assigned expense identifier.
///
/// Server ids are positive. Negative ids are provisional: they only ever
/// appear inside an optimistic patch and are replaced on the next refetch.
pub type ExpenseId = i64;

/// Generator for provisional (client-side, not yet confirmed) expense ids.
#[derive(Debug)]
pub struct ProvisionalIds {
    next: AtomicI64,
}

impl ProvisionalIds {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(-1),
        }
    }

    /// Allocate a fresh provisional id. Never collides with a server id.
    pub fn allocate(&self) -> ExpenseId {
        self.next.fetch_sub(1, Ordering::Relaxed)
    }
}

impl Default for ProvisionalIds {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ENTITY
// ============================================================================

/// An expense as rendered by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: ExpenseId,
    pub title: String,
    pub amount: f64,
    /// Object key of the attached receipt. Older servers call this `fileUrl`.
    #[serde(default, alias = "fileUrl", skip_serializing_if = "Option::is_none")]
    pub file_reference: Option<String>,
}

impl Expense {
    /// Build the optimistic stand-in for an expense the server has not confirmed yet.
    pub fn provisional(id: ExpenseId, new: &NewExpense) -> Self {
        Self {
            id,
            title: new.title.clone(),
            amount: new.amount,
            file_reference: None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.id < 0
    }

    pub fn has_receipt(&self) -> bool {
        self.file_reference.is_some()
    }
}

/// Unvalidated user input for a new expense.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseDraft {
    pub title: String,
    pub amount: f64,
}

impl ExpenseDraft {
    pub fn new(title: impl Into<String>, amount: f64) -> Self {
        Self {
            title: title.into(),
            amount,
        }
    }

    /// Check the draft locally. The returned title is trimmed.
    pub fn validate(&self) -> Result<NewExpense, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::required("title"));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ValidationError::invalid(
                "amount",
                "must be greater than 0",
            ));
        }
        Ok(NewExpense {
            title: title.to_string(),
            amount: self.amount,
        })
    }
}

/// A validated create request, as sent to `POST /expenses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    title: String,
    amount: f64,
}

impl NewExpense {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }
}

// ============================================================================
// ENVELOPES
// ============================================================================

/// Body of `GET /expenses`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpenseList {
    pub expenses: Vec<Expense>,
}

impl ExpenseList {
    pub fn ids(&self) -> Vec<ExpenseId> {
        self.expenses.iter().map(|e| e.id).collect()
    }

    pub fn find(&self, id: ExpenseId) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == id)
    }
}

/// Body of `GET /expenses/{id}`; `expense` is null when the id is unknown.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpenseDetail {
    pub expense: Option<Expense>,
}

/// Body returned by create and patch endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseEnvelope {
    pub expense: Expense,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validate_trims_title() {
        let new = ExpenseDraft::new("  Coffee  ", 4.0).validate().unwrap();
        assert_eq!(new.title(), "Coffee");
        assert_eq!(new.amount(), 4.0);
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        let err = ExpenseDraft::new("   ", 4.0).validate().unwrap_err();
        assert_eq!(err, ValidationError::required("title"));
    }

    #[test]
    fn test_validate_rejects_nan_amount() {
        let err = ExpenseDraft::new("Coffee", f64::NAN).validate().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidValue { ref field, .. } if field == "amount"
        ));
    }

    #[test]
    fn test_provisional_ids_are_negative_and_unique() {
        let ids = ProvisionalIds::new();
        let a = ids.allocate();
        let b = ids.allocate();
        assert!(a < 0 && b < 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_expense_accepts_legacy_file_url() {
        let json = serde_json::json!({
            "id": 3,
            "title": "Lunch",
            "amount": 12.5,
            "fileUrl": "receipts/3.png"
        });
        let expense: Expense = serde_json::from_value(json).unwrap();
        assert_eq!(expense.file_reference.as_deref(), Some("receipts/3.png"));
    }

    #[test]
    fn test_expense_serializes_camel_case() {
        let expense = Expense {
            id: 1,
            title: "Taxi".to_string(),
            amount: 20.0,
            file_reference: Some("k".to_string()),
        };
        let value = serde_json::to_value(&expense).unwrap();
        assert_eq!(value["fileReference"], "k");
    }

    #[test]
    fn test_detail_null_expense() {
        let detail: ExpenseDetail =
            serde_json::from_value(serde_json::json!({ "expense": null })).unwrap();
        assert!(detail.expense.is_none());
    }

    proptest! {
        #[test]
        fn prop_non_positive_amount_rejected(amount in -1_000_000.0f64..=0.0) {
            prop_assert!(ExpenseDraft::new("Coffee", amount).validate().is_err());
        }

        #[test]
        fn prop_positive_amount_with_title_accepted(
            title in "[a-zA-Z][a-zA-Z ]{0,20}",
            amount in 0.01f64..1_000_000.0,
        ) {
            let new = ExpenseDraft::new(title.clone(), amount).validate().unwrap();
            prop_assert_eq!(new.title(), title.trim());
        }
    }
}

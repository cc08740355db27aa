//! Summary engine: totals derived from one account's expenses

use serde::Serialize;

use crate::model::CardAccount;

/// Derived figures for one account; never persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub total_amount: f64,
    pub reconciled_amount: f64,
    pub pending_amount: f64,
    /// 0 when the total is not positive; within 0..=100 unless amounts are negative
    pub completion_percentage: f64,
    pub expense_count: usize,
    /// Expenses still missing a receipt
    pub pending_count: usize,
}

// Absorbs summation noise only. Figures from negative amounts pass through.
const ROUNDING_TOLERANCE: f64 = 1e-9;

fn snap(value: f64, bound: f64) -> f64 {
    if (value - bound).abs() <= ROUNDING_TOLERANCE * bound.abs().max(1.0) {
        bound
    } else {
        value
    }
}

pub fn summarize(account: &CardAccount) -> SummaryStats {
    let (total_amount, reconciled_amount, reconciled_count) = account.expenses.iter().fold(
        (0.0_f64, 0.0_f64, 0usize),
        |(total, reconciled, count), e| {
            if e.receipt_attached {
                (total + e.amount, reconciled + e.amount, count + 1)
            } else {
                (total + e.amount, reconciled, count)
            }
        },
    );

    let pending_amount = snap(total_amount - reconciled_amount, 0.0);
    let completion_percentage = if total_amount > 0.0 {
        let pct = reconciled_amount / total_amount * 100.0;
        snap(snap(pct, 0.0), 100.0)
    } else {
        0.0
    };

    SummaryStats {
        total_amount,
        reconciled_amount,
        pending_amount,
        completion_percentage,
        expense_count: account.expenses.len(),
        pending_count: account.expenses.len() - reconciled_count,
    }
}

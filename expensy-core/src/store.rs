//! Account store: pure mutations over the full account collection.
//!
//! Every operation takes the current collection and returns a new one. A
//! mutation touches at most one account; every other account is cloned
//! through unchanged. Unknown account or expense ids are no-ops.

use std::collections::HashSet;

use tracing::debug;

use crate::model::{new_expense_id, CardAccount, Expense};

/// Accounts used when nothing has been persisted yet
pub fn seed_accounts() -> Vec<CardAccount> {
    vec![
        CardAccount::new("1", "Nubank Principal", "4582", "bg-purple-600"),
        CardAccount::new("2", "Itaú Personalité", "1290", "bg-orange-500"),
        CardAccount::new("3", "Inter Corporativo", "8831", "bg-orange-600"),
    ]
}

/// Outcome of looking up the active account by id
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActiveResolution<'a> {
    /// The requested id matched a stored account
    Found(&'a CardAccount),
    /// Active account not found, defaulted to the first account
    DefaultedToFirst(&'a CardAccount),
}

impl<'a> ActiveResolution<'a> {
    pub fn account(&self) -> &'a CardAccount {
        match self {
            ActiveResolution::Found(a) | ActiveResolution::DefaultedToFirst(a) => a,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ActiveResolution::DefaultedToFirst(_))
    }
}

/// Resolve the active account. Returns `None` only for an empty collection.
pub fn resolve_active<'a>(
    accounts: &'a [CardAccount],
    active_id: Option<&str>,
) -> Option<ActiveResolution<'a>> {
    if let Some(id) = active_id {
        if let Some(found) = accounts.iter().find(|a| a.id == id) {
            return Some(ActiveResolution::Found(found));
        }
    }
    accounts.first().map(ActiveResolution::DefaultedToFirst)
}

fn map_account(
    accounts: &[CardAccount],
    account_id: &str,
    f: impl Fn(&CardAccount) -> CardAccount,
) -> Vec<CardAccount> {
    if !accounts.iter().any(|a| a.id == account_id) {
        debug!(account_id, "mutation target account not found");
        return accounts.to_vec();
    }
    accounts
        .iter()
        .map(|a| if a.id == account_id { f(a) } else { a.clone() })
        .collect()
}

/// Append `new_expenses` to the end of the target account, preserving order.
///
/// Amounts are not validated here. An incoming id that already exists in the
/// account (or earlier in the same batch) is replaced with a fresh one.
pub fn add_expenses(
    accounts: &[CardAccount],
    account_id: &str,
    new_expenses: &[Expense],
) -> Vec<CardAccount> {
    map_account(accounts, account_id, |account| {
        let mut seen: HashSet<String> = account.expenses.iter().map(|e| e.id.clone()).collect();
        let mut next = account.clone();
        next.expenses.reserve(new_expenses.len());
        for expense in new_expenses {
            let mut expense = expense.clone();
            while seen.contains(&expense.id) {
                let fresh = new_expense_id();
                debug!(old = %expense.id, new = %fresh, "re-keyed colliding expense id");
                expense.id = fresh;
            }
            seen.insert(expense.id.clone());
            next.expenses.push(expense);
        }
        next
    })
}

/// Flip `receipt_attached` on one expense
pub fn toggle_receipt(accounts: &[CardAccount], account_id: &str, expense_id: &str) -> Vec<CardAccount> {
    map_account(accounts, account_id, |account| {
        let mut next = account.clone();
        match next.expenses.iter_mut().find(|e| e.id == expense_id) {
            Some(e) => e.receipt_attached = !e.receipt_attached,
            None => debug!(account_id, expense_id, "toggle: expense not found"),
        }
        next
    })
}

/// Remove one expense by id
pub fn delete_expense(accounts: &[CardAccount], account_id: &str, expense_id: &str) -> Vec<CardAccount> {
    map_account(accounts, account_id, |account| {
        let mut next = account.clone();
        match next.expenses.iter().position(|e| e.id == expense_id) {
            Some(idx) => {
                next.expenses.remove(idx);
            }
            None => debug!(account_id, expense_id, "delete: expense not found"),
        }
        next
    })
}

/// Empty the target account. Confirmation is the caller's job.
pub fn clear_all(accounts: &[CardAccount], account_id: &str) -> Vec<CardAccount> {
    map_account(accounts, account_id, |account| CardAccount {
        expenses: Vec::new(),
        ..account.clone()
    })
}

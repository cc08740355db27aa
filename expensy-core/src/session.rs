//! Import session: the single writer over the account collection.
//!
//! Holds the accounts, the active selection and the set of accounts with an
//! import in flight. Each mutation builds the next collection, persists it,
//! and only then replaces the in-memory copy.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::SessionError;
use crate::gateway::{
    admit_candidates, EmptyReason, ExtractionInput, ExtractionOutcome, Extractor, GatewayError,
};
use crate::model::{CardAccount, Expense};
use crate::storage::{LoadOutcome, StateDocument, StateStore};
use crate::store::{self, ActiveResolution};
use crate::summary::{summarize, SummaryStats};

/// Proof that an import was started for an account; consumed on completion
#[derive(Debug)]
#[must_use = "an import ticket must be completed to release the account"]
pub struct ImportTicket {
    account_id: String,
}

impl ImportTicket {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub account_id: String,
    /// Ids of the appended expenses, in statement order
    pub added: Vec<String>,
    /// Candidates dropped for a non-positive amount
    pub rejected: usize,
    /// Set when the gateway produced nothing usable
    pub empty: Option<EmptyReason>,
}

pub struct Session<S> {
    store: S,
    accounts: Vec<CardAccount>,
    active_id: Option<String>,
    processing: HashSet<String>,
}

impl<S: StateStore> Session<S> {
    /// Load persisted state once. The outcome says whether seed accounts
    /// were used or a corrupt save was recovered from.
    pub fn open(store: S) -> Result<(Self, LoadOutcome), SessionError> {
        let outcome = store.load()?;
        let doc = outcome.document().clone();
        let session = Self {
            store,
            accounts: doc.accounts,
            active_id: doc.active_account_id,
            processing: HashSet::new(),
        };
        Ok((session, outcome))
    }

    pub fn accounts(&self) -> &[CardAccount] {
        &self.accounts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn account(&self, account_id: &str) -> Option<&CardAccount> {
        self.accounts.iter().find(|a| a.id == account_id)
    }

    /// Active account, defaulting to the first one when the selection is stale
    pub fn active(&self) -> Result<ActiveResolution<'_>, SessionError> {
        store::resolve_active(&self.accounts, self.active_id.as_deref())
            .ok_or(SessionError::NoAccounts)
    }

    /// The stored selection, which may name an account that no longer exists
    pub fn active_selection(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active_account_id(&self) -> Result<String, SessionError> {
        Ok(self.active()?.account().id.clone())
    }

    /// Change the selection. Account data is not touched.
    pub fn set_active_account(&mut self, account_id: &str) -> Result<ActiveResolution<'_>, SessionError> {
        let doc = StateDocument::new(self.accounts.clone(), Some(account_id.to_string()));
        self.store.save(&doc)?;
        self.active_id = Some(account_id.to_string());
        self.active()
    }

    pub fn summary(&self, account_id: &str) -> Result<SummaryStats, SessionError> {
        self.account(account_id)
            .map(summarize)
            .ok_or_else(|| SessionError::AccountNotFound(account_id.to_string()))
    }

    pub fn add_expenses(&mut self, account_id: &str, expenses: &[Expense]) -> Result<(), SessionError> {
        let next = store::add_expenses(&self.accounts, account_id, expenses);
        self.commit(next)
    }

    pub fn toggle_receipt(&mut self, account_id: &str, expense_id: &str) -> Result<(), SessionError> {
        let next = store::toggle_receipt(&self.accounts, account_id, expense_id);
        self.commit(next)
    }

    pub fn delete_expense(&mut self, account_id: &str, expense_id: &str) -> Result<(), SessionError> {
        let next = store::delete_expense(&self.accounts, account_id, expense_id);
        self.commit(next)
    }

    /// Empty an account. Callers confirm with the user first.
    pub fn clear_all(&mut self, account_id: &str) -> Result<(), SessionError> {
        let next = store::clear_all(&self.accounts, account_id);
        self.commit(next)
    }

    pub fn is_processing(&self, account_id: &str) -> bool {
        self.processing.contains(account_id)
    }

    /// Mark an account as processing. Fails if an import is already running
    /// for it; there is no queue.
    pub fn begin_import(&mut self, account_id: &str) -> Result<ImportTicket, SessionError> {
        if self.account(account_id).is_none() {
            return Err(SessionError::AccountNotFound(account_id.to_string()));
        }
        if !self.processing.insert(account_id.to_string()) {
            return Err(SessionError::ImportInProgress(account_id.to_string()));
        }
        Ok(ImportTicket {
            account_id: account_id.to_string(),
        })
    }

    /// Finish an import. A gateway error leaves the collection untouched;
    /// otherwise every admitted record is appended in one step.
    pub fn complete_import(
        &mut self,
        ticket: ImportTicket,
        result: Result<ExtractionOutcome, GatewayError>,
    ) -> Result<ImportReport, SessionError> {
        let ImportTicket { account_id } = ticket;
        self.processing.remove(&account_id);

        let candidates = match result {
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "extraction failed, state unchanged");
                return Err(SessionError::Gateway(e));
            }
            Ok(ExtractionOutcome::Empty(reason)) => {
                if let EmptyReason::Malformed(detail) = &reason {
                    warn!(account_id = %account_id, %detail, "extraction result did not match schema");
                }
                return Ok(ImportReport {
                    account_id,
                    added: Vec::new(),
                    rejected: 0,
                    empty: Some(reason),
                });
            }
            Ok(ExtractionOutcome::Records(records)) => records,
        };

        let admitted = admit_candidates(candidates);
        let rejected = admitted.rejected.len();
        if admitted.expenses.is_empty() {
            return Ok(ImportReport {
                account_id,
                added: Vec::new(),
                rejected,
                empty: Some(EmptyReason::NoRecords),
            });
        }

        let before = self.account(&account_id).map(|a| a.expenses.len()).unwrap_or(0);
        let next = store::add_expenses(&self.accounts, &account_id, &admitted.expenses);
        self.commit(next)?;

        // Read back the ids: the store may have re-keyed collisions.
        let added: Vec<String> = self
            .account(&account_id)
            .map(|a| a.expenses[before..].iter().map(|e| e.id.clone()).collect())
            .unwrap_or_default();
        info!(account_id = %account_id, added = added.len(), rejected, "import applied");

        Ok(ImportReport {
            account_id,
            added,
            rejected,
            empty: None,
        })
    }

    /// Apply an extraction result that was produced elsewhere, typically
    /// before this session was loaded from the latest saved state.
    pub fn apply_extraction(
        &mut self,
        account_id: &str,
        result: Result<ExtractionOutcome, GatewayError>,
    ) -> Result<ImportReport, SessionError> {
        let ticket = self.begin_import(account_id)?;
        self.complete_import(ticket, result)
    }

    /// Run a whole import against one account
    pub async fn import<E>(
        &mut self,
        extractor: &E,
        account_id: &str,
        input: &ExtractionInput,
    ) -> Result<ImportReport, SessionError>
    where
        E: Extractor + ?Sized,
    {
        let ticket = self.begin_import(account_id)?;
        let result = extractor.extract(input).await;
        self.complete_import(ticket, result)
    }

    fn commit(&mut self, next: Vec<CardAccount>) -> Result<(), SessionError> {
        if next == self.accounts {
            return Ok(());
        }
        let doc = StateDocument::new(next, self.active_id.clone());
        self.store.save(&doc)?;
        self.accounts = doc.accounts;
        Ok(())
    }

    /// Write the current state, e.g. after a migration or recovery at startup
    pub fn persist(&self) -> Result<(), SessionError> {
        let doc = StateDocument::new(self.accounts.clone(), self.active_id.clone());
        self.store.save(&doc)?;
        Ok(())
    }
}

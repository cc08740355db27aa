//! expensy-core: card accounts, the expense store, summaries and persistence

pub mod error;
pub mod format;
pub mod gateway;
pub mod model;
pub mod session;
pub mod storage;
pub mod store;
pub mod summary;

pub use error::{SessionError, StorageError};
pub use format::{format_percentage, CurrencyFormat};
pub use gateway::{
    admit_candidates, Admitted, EmptyReason, ExpenseCandidate, ExtractionInput, ExtractionOutcome,
    Extractor, GatewayError, MediaType,
};
pub use model::{new_expense_id, CardAccount, Expense};
pub use session::{ImportReport, ImportTicket, Session};
pub use storage::{JsonFileStore, LoadOutcome, MemoryStore, StateDocument, StateStore, STATE_VERSION};
pub use store::{
    add_expenses, clear_all, delete_expense, resolve_active, seed_accounts, toggle_receipt,
    ActiveResolution,
};
pub use summary::{summarize, SummaryStats};

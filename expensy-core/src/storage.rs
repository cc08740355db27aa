//! Persistence adapter: the whole account collection as one JSON document.
//!
//! Version 1 layout:
//! `{"version":1,"activeAccountId":"1","accounts":[...]}`
//! A bare array of accounts is the unversioned (version 0) layout and is
//! migrated on load.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::StorageError;
use crate::model::CardAccount;
use crate::store::seed_accounts;

pub const STATE_VERSION: u32 = 1;
pub const STATE_FILE_NAME: &str = "cards.json";

const TMP_SUFFIX: &str = "tmp";
const CORRUPT_INFIX: &str = ".corrupt-";
const CORRUPT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    pub version: u32,
    #[serde(default)]
    pub active_account_id: Option<String>,
    pub accounts: Vec<CardAccount>,
}

impl StateDocument {
    pub fn new(accounts: Vec<CardAccount>, active_account_id: Option<String>) -> Self {
        Self {
            version: STATE_VERSION,
            active_account_id,
            accounts,
        }
    }

    pub fn seeded() -> Self {
        Self::new(seed_accounts(), None)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Persisted {
    Versioned(StateDocument),
    Unversioned(Vec<CardAccount>),
}

/// How the state came to be at startup
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Nothing persisted yet; seed accounts
    Seeded(StateDocument),
    Loaded(StateDocument),
    /// Read an older layout and upgraded it in memory
    Migrated { document: StateDocument, from_version: u32 },
    /// Stored data was unreadable; seed accounts were used instead
    Recovered {
        document: StateDocument,
        reason: String,
        backup: Option<PathBuf>,
    },
}

impl LoadOutcome {
    pub fn document(&self) -> &StateDocument {
        match self {
            LoadOutcome::Seeded(d) | LoadOutcome::Loaded(d) => d,
            LoadOutcome::Migrated { document, .. } | LoadOutcome::Recovered { document, .. } => {
                document
            }
        }
    }

    pub fn into_document(self) -> StateDocument {
        match self {
            LoadOutcome::Seeded(d) | LoadOutcome::Loaded(d) => d,
            LoadOutcome::Migrated { document, .. } | LoadOutcome::Recovered { document, .. } => {
                document
            }
        }
    }

    /// Message for the user when startup did not go cleanly
    pub fn warning(&self) -> Option<String> {
        match self {
            LoadOutcome::Recovered { reason, backup, .. } => Some(match backup {
                Some(p) => format!(
                    "saved data could not be read ({reason}); started from default cards, \
                     the unreadable file was kept at {}",
                    p.display()
                ),
                None => format!("saved data could not be read ({reason}); started from default cards"),
            }),
            _ => None,
        }
    }
}

/// Decode a persisted document, upgrading older layouts.
///
/// Returns the document and the version it was stored with.
pub fn decode_state(text: &str) -> Result<(StateDocument, u32), String> {
    let persisted: Persisted = serde_json::from_str(text).map_err(|e| e.to_string())?;
    match persisted {
        Persisted::Versioned(doc) if doc.version == 0 || doc.version > STATE_VERSION => {
            Err(format!("unsupported state version {}", doc.version))
        }
        Persisted::Versioned(doc) => {
            let version = doc.version;
            Ok((doc, version))
        }
        Persisted::Unversioned(accounts) => Ok((StateDocument::new(accounts, None), 0)),
    }
}

pub fn encode_state(doc: &StateDocument) -> Result<String, StorageError> {
    Ok(serde_json::to_string_pretty(doc)?)
}

/// A durable slot holding the account collection
pub trait StateStore {
    fn load(&self) -> Result<LoadOutcome, StorageError>;
    fn save(&self, doc: &StateDocument) -> Result<(), StorageError>;
}

fn outcome_from_text(text: &str) -> Result<LoadOutcome, String> {
    let (document, version) = decode_state(text)?;
    if version < STATE_VERSION {
        info!(from_version = version, "migrating stored state");
        Ok(LoadOutcome::Migrated {
            document,
            from_version: version,
        })
    } else {
        Ok(LoadOutcome::Loaded(document))
    }
}

/// JSON file on disk, written atomically via a temporary sibling
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/cards.json`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the unreadable file aside, reusing an earlier copy of the same bytes
    fn keep_corrupt_copy(&self, contents: &[u8]) -> Result<PathBuf, StorageError> {
        if let Some(existing) = self.find_corrupt_copy(contents)? {
            return Ok(existing);
        }
        let stamp = Utc::now().format(CORRUPT_TIMESTAMP_FORMAT).to_string();
        let mut n = 0u32;
        let backup = loop {
            let mut name = self.path.as_os_str().to_owned();
            match n {
                0 => name.push(format!("{CORRUPT_INFIX}{stamp}")),
                _ => name.push(format!("{CORRUPT_INFIX}{stamp}-{n}")),
            }
            let candidate = PathBuf::from(name);
            if !candidate.exists() {
                break candidate;
            }
            n += 1;
        };
        fs::write(&backup, contents)?;
        Ok(backup)
    }

    fn find_corrupt_copy(&self, contents: &[u8]) -> Result<Option<PathBuf>, StorageError> {
        let Some(file_name) = self.path.file_name() else {
            return Ok(None);
        };
        let prefix = format!("{}{CORRUPT_INFIX}", file_name.to_string_lossy());
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_name().to_string_lossy().starts_with(&prefix) {
                continue;
            }
            if fs::read(entry.path())? == contents {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<LoadOutcome, StorageError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no saved state, using seed accounts");
            return Ok(LoadOutcome::Seeded(StateDocument::seeded()));
        }
        let bytes = fs::read(&self.path)?;
        let decoded = std::str::from_utf8(&bytes)
            .map_err(|e| e.to_string())
            .and_then(outcome_from_text);
        match decoded {
            Ok(outcome) => Ok(outcome),
            Err(reason) => {
                warn!(path = %self.path.display(), %reason, "saved state is unreadable");
                let backup = match self.keep_corrupt_copy(&bytes) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(error = %e, "could not keep a copy of the unreadable state");
                        None
                    }
                };
                Ok(LoadOutcome::Recovered {
                    document: StateDocument::seeded(),
                    reason,
                    backup,
                })
            }
        }
    }

    fn save(&self, doc: &StateDocument) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = encode_state(doc)?;
        let tmp = tmp_path(&self.path);
        let mut file = File::create(&tmp)?;
        file.write_all(data.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{existing}.{TMP_SUFFIX}"),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

/// In-memory slot holding the last serialized document
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(text: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(text.into())),
        }
    }

    /// Raw contents of the slot, as last written
    pub fn contents(&self) -> Option<String> {
        self.slot.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<LoadOutcome, StorageError> {
        let Some(text) = self.contents() else {
            return Ok(LoadOutcome::Seeded(StateDocument::seeded()));
        };
        Ok(outcome_from_text(&text).unwrap_or_else(|reason| LoadOutcome::Recovered {
            document: StateDocument::seeded(),
            reason,
            backup: None,
        }))
    }

    fn save(&self, doc: &StateDocument) -> Result<(), StorageError> {
        let data = encode_state(doc)?;
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(data);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Expense;

    #[test]
    fn test_decode_versioned() {
        let text = r#"{"version":1,"activeAccountId":"2","accounts":[
            {"id":"2","name":"Itaú","lastFourDigits":"1290","color":"bg-orange-500","expenses":[]}
        ]}"#;
        let (doc, version) = decode_state(text).unwrap();
        assert_eq!(version, 1);
        assert_eq!(doc.active_account_id.as_deref(), Some("2"));
        assert_eq!(doc.accounts[0].last_four_digits, "1290");
    }

    #[test]
    fn test_decode_unversioned_array() {
        let text = r#"[{"id":"1","name":"Nubank Principal","lastFourDigits":"4582","color":"bg-purple-600",
            "expenses":[{"id":"k3j","date":"15/05","description":"Uber","amount":18.5,"receiptAttached":true,"category":"Transporte"}]}]"#;
        let (doc, version) = decode_state(text).unwrap();
        assert_eq!(version, 0);
        assert_eq!(doc.version, STATE_VERSION);
        assert!(doc.accounts[0].expenses[0].receipt_attached);
        assert_eq!(doc.accounts[0].expenses[0].category.as_deref(), Some("Transporte"));
    }

    #[test]
    fn test_unversioned_receipt_url_survives_migration() {
        let text = r#"[{"id":"1","name":"Nubank Principal","lastFourDigits":"4582","color":"bg-purple-600",
            "expenses":[{"id":"q1","date":"20/05","description":"Hotel","amount":410.0,
            "receiptAttached":true,"receiptUrl":"blob:receipt-q1"}]}]"#;
        let (doc, _) = decode_state(text).unwrap();
        let saved = encode_state(&doc).unwrap();
        assert!(saved.contains("\"receiptUrl\": \"blob:receipt-q1\""));
    }

    #[test]
    fn test_decode_rejects_future_version_and_garbage() {
        assert!(decode_state(r#"{"version":7,"accounts":[]}"#).is_err());
        assert!(decode_state("{not json").is_err());
        assert!(decode_state(r#"{"accounts": 3}"#).is_err());
    }

    #[test]
    fn test_encode_decode_preserves_document() {
        let mut doc = StateDocument::seeded();
        doc.accounts[0]
            .expenses
            .push(Expense::new("12/04", "Supermercado", 150.0).with_category("Alimentação"));
        let text = encode_state(&doc).unwrap();
        assert!(text.contains("\"version\": 1"));
        let (back, _) = decode_state(&text).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_memory_store_seeds_when_empty() {
        let store = MemoryStore::new();
        assert!(matches!(store.load().unwrap(), LoadOutcome::Seeded(_)));
        store.save(&StateDocument::seeded()).unwrap();
        assert!(matches!(store.load().unwrap(), LoadOutcome::Loaded(_)));
    }

    #[test]
    fn test_memory_store_recovers_from_garbage() {
        let store = MemoryStore::with_contents("]]");
        let outcome = store.load().unwrap();
        assert!(outcome.warning().is_some());
        assert_eq!(outcome.document().accounts, seed_accounts());
    }

    #[test]
    fn test_tmp_path() {
        assert_eq!(tmp_path(Path::new("/x/cards.json")), PathBuf::from("/x/cards.json.tmp"));
    }
}

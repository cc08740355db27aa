use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use expensy_core::{
    format_percentage, CardAccount, CurrencyFormat, ExtractionInput, Extractor, ImportReport,
    JsonFileStore, LoadOutcome, Session, SummaryStats,
};
use expensy_ingest::{GeminiClient, GeminiConfig};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod state;

use config::{load_config, Config};
use state::{ensure_home, expensy_home, ImportLock, StateLock};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("EXPENSY_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "expensy", version = VERSION, about = "Credit card expense reconciliation")]
struct Cli {
    /// State directory (default: $EXPENSY_HOME or ~/.expensy)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List card accounts; the active one is marked with *
    Accounts,

    /// Select the active account
    Use { account_id: String },

    /// List expenses of the active account
    List {
        #[arg(long)]
        account: Option<String>,
    },

    /// Totals and reconciliation progress
    Summary {
        #[arg(long)]
        account: Option<String>,
    },

    /// Extract expenses from a statement and append them
    Import {
        /// Statement image or PDF
        #[arg(long, conflicts_with_all = ["text", "stdin"])]
        file: Option<PathBuf>,

        /// Pasted statement text
        #[arg(long, conflicts_with = "stdin")]
        text: Option<String>,

        /// Read statement text from stdin
        #[arg(long, default_value_t = false)]
        stdin: bool,

        #[arg(long)]
        account: Option<String>,
    },

    /// Mark or unmark an expense as having a receipt
    Toggle {
        expense_id: String,
        #[arg(long)]
        account: Option<String>,
    },

    /// Delete one expense
    Delete {
        expense_id: String,
        #[arg(long)]
        account: Option<String>,
    },

    /// Remove every expense from an account
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, default_value_t = false)]
        yes: bool,
        #[arg(long)]
        account: Option<String>,
    },

    /// Configuration file helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Credential helpers
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config.toml
    Init,
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Store a Gemini API key in auth.json
    PasteGeminiKey,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("EXPENSY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let home = ensure_home(&expensy_home(cli.home.as_deref())?)?;
    let cfg = load_config(&home)?;
    let money = cfg.display.currency();

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config(&home)?,
            ConfigCommand::Show => {
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
        },

        Command::Auth { command } => match command {
            AuthCommand::PasteGeminiKey => auth::paste_gemini_key(&home)?,
        },

        Command::Accounts => {
            let session = open_session(&home)?;
            let active = session.active_account_id()?;
            for a in session.accounts() {
                let marker = if a.id == active { "*" } else { " " };
                let stats = expensy_core::summarize(a);
                println!(
                    "{} {:<4} {:<32} {:>3} expenses  {}",
                    marker,
                    a.id,
                    a.label(),
                    stats.expense_count,
                    money.format(stats.total_amount)
                );
            }
        }

        Command::Use { account_id } => {
            let (_lock, mut session) = open_locked(&home)?;
            let resolved = session.set_active_account(&account_id)?;
            if resolved.is_fallback() {
                println!(
                    "No account with id {account_id}; using {} instead",
                    resolved.account().label()
                );
            } else {
                println!("Active account: {}", resolved.account().label());
            }
        }

        Command::List { account } => {
            let session = open_session(&home)?;
            let account = target_account(&session, account.as_deref())?;
            print_expenses(account, &money);
        }

        Command::Summary { account } => {
            let session = open_session(&home)?;
            let account = target_account(&session, account.as_deref())?;
            println!("{}", account.label());
            print_summary(&expensy_core::summarize(account), &money);
        }

        Command::Import {
            file,
            text,
            stdin,
            account,
        } => {
            let input = read_input(file, text, stdin)?;
            let account_id = {
                let session = open_session(&home)?;
                let id = target_account(&session, account.as_deref())?.id.clone();
                id
            };
            let (report, session) = run_import(&home, &cfg, &account_id, &input).await?;
            print_import_report(&report);
            let account = target_account(&session, Some(account_id.as_str()))?;
            print_summary(&expensy_core::summarize(account), &money);
        }

        Command::Toggle { expense_id, account } => {
            let (_lock, mut session) = open_locked(&home)?;
            let account_id = target_account(&session, account.as_deref())?.id.clone();
            let Some(expense_id) = resolve_expense_id(&session, &account_id, &expense_id)? else {
                println!("No expense {expense_id} in this account; nothing changed");
                return Ok(());
            };
            session.toggle_receipt(&account_id, &expense_id)?;
            let account = target_account(&session, Some(account_id.as_str()))?;
            if let Some(e) = account.find_expense(&expense_id) {
                let state = if e.receipt_attached { "reconciled" } else { "pending" };
                println!("{} {} -> {}", e.date, e.description, state);
            }
            print_summary(&expensy_core::summarize(account), &money);
        }

        Command::Delete { expense_id, account } => {
            let (_lock, mut session) = open_locked(&home)?;
            let account_id = target_account(&session, account.as_deref())?.id.clone();
            let Some(expense_id) = resolve_expense_id(&session, &account_id, &expense_id)? else {
                println!("No expense {expense_id} in this account; nothing changed");
                return Ok(());
            };
            session.delete_expense(&account_id, &expense_id)?;
            println!("Deleted {expense_id}");
        }

        Command::Clear { yes, account } => {
            // Ask before locking so a pending prompt does not block other commands.
            let (account_id, label) = {
                let session = open_session(&home)?;
                let target = target_account(&session, account.as_deref())?;
                if target.expenses.is_empty() {
                    println!("{} has no expenses", target.label());
                    return Ok(());
                }
                let question =
                    format!("Remove all {} expenses from {}?", target.expenses.len(), target.label());
                if !yes && !confirm(&question)? {
                    println!("Cancelled");
                    return Ok(());
                }
                (target.id.clone(), target.label())
            };
            let (_lock, mut session) = open_locked(&home)?;
            let count = session.account(&account_id).map_or(0, |a| a.expenses.len());
            session.clear_all(&account_id)?;
            println!("Cleared {count} expenses from {label}");
        }
    }

    Ok(())
}

fn load_session(home: &Path) -> Result<(Session<JsonFileStore>, LoadOutcome)> {
    debug!(home = %home.display(), "opening saved cards");
    let (session, outcome) =
        Session::open(JsonFileStore::in_dir(home)).context("loading saved cards")?;
    if let Some(warning) = outcome.warning() {
        eprintln!("warning: {warning}");
    }
    Ok((session, outcome))
}

/// Read-only view of the saved cards; never writes back
fn open_session(home: &Path) -> Result<Session<JsonFileStore>> {
    Ok(load_session(home)?.0)
}

/// Lock the state file, then load it. Hold the lock until the last save.
fn open_locked(home: &Path) -> Result<(StateLock, Session<JsonFileStore>)> {
    let lock = StateLock::acquire(home)?;
    let (session, outcome) = load_session(home)?;
    if matches!(outcome, LoadOutcome::Migrated { .. }) {
        session.persist().context("saving migrated cards")?;
    }
    Ok((lock, session))
}

/// Explicit `--account` must exist; otherwise the active account, which
/// falls back to the first one when the stored selection is stale.
fn target_account<'a>(
    session: &'a Session<JsonFileStore>,
    explicit: Option<&str>,
) -> Result<&'a CardAccount> {
    if let Some(id) = explicit {
        return session
            .account(id)
            .ok_or_else(|| anyhow!("no account with id {id} (see: expensy accounts)"));
    }
    let resolved = session.active()?;
    if resolved.is_fallback() {
        if let Some(stale) = session.active_selection() {
            eprintln!(
                "note: selected account {stale} not found; using {}",
                resolved.account().label()
            );
        }
    }
    Ok(resolved.account())
}

/// Exact id, or a unique prefix of one
fn resolve_expense_id(
    session: &Session<JsonFileStore>,
    account_id: &str,
    needle: &str,
) -> Result<Option<String>> {
    if needle.trim().is_empty() {
        bail!("expense id must not be empty");
    }
    let account = session
        .account(account_id)
        .ok_or_else(|| anyhow!("no account with id {account_id}"))?;
    if account.find_expense(needle).is_some() {
        return Ok(Some(needle.to_string()));
    }
    let matches: Vec<&str> = account
        .expenses
        .iter()
        .filter(|e| e.id.starts_with(needle))
        .map(|e| e.id.as_str())
        .collect();
    match matches.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some(one.to_string())),
        _ => bail!("expense id prefix {needle} is ambiguous ({} matches)", matches.len()),
    }
}

fn read_input(file: Option<PathBuf>, text: Option<String>, stdin: bool) -> Result<ExtractionInput> {
    if let Some(path) = file {
        return ExtractionInput::from_file(&path)
            .with_context(|| format!("reading {}", path.display()));
    }
    let text = match (text, stdin) {
        (Some(t), _) => t,
        (None, true) => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s).context("read stdin")?;
            s
        }
        (None, false) => bail!("nothing to import (pass --file <path>, --text <text> or --stdin)"),
    };
    if text.trim().is_empty() {
        bail!("statement text is empty");
    }
    Ok(ExtractionInput::Text(text))
}

/// Extract without holding the state lock, then apply the result to a
/// fresh load so writes made meanwhile by other commands are kept.
async fn run_import(
    home: &Path,
    cfg: &Config,
    account_id: &str,
    input: &ExtractionInput,
) -> Result<(ImportReport, Session<JsonFileStore>)> {
    if cfg.gateway.provider != "gemini" {
        bail!("unsupported gateway provider: {}", cfg.gateway.provider);
    }
    let api_key = auth::resolve_api_key(home, &cfg.gateway)?.ok_or_else(|| {
        anyhow!(
            "missing Gemini API key; set {} or run: expensy auth paste-gemini-key",
            cfg.gateway.api_key_env
        )
    })?;
    let client = GeminiClient::new(GeminiConfig {
        api_key,
        model: cfg.gateway.model.clone(),
        base_url: cfg.gateway.base_url.clone(),
        timeout: Duration::from_secs(cfg.gateway.timeout_secs),
    })?;

    let _import_lock = ImportLock::acquire(home, account_id)?;
    eprintln!("Processing statement with {}...", client.model());
    let result = client.extract(input).await;

    let (_state_lock, mut session) = open_locked(home)?;
    let report = session
        .apply_extraction(account_id, result)
        .context("could not process the statement; nothing was changed, try again")?;
    Ok((report, session))
}

fn print_import_report(report: &ImportReport) {
    match &report.empty {
        Some(reason) => println!("No expenses imported: {reason}"),
        None => println!("Imported {} expenses", report.added.len()),
    }
    if report.rejected > 0 {
        println!(
            "Skipped {} records without a positive amount",
            report.rejected
        );
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N]: ");
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(matches!(s.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_expenses(account: &CardAccount, money: &CurrencyFormat) {
    println!("{}\n", account.label());
    if account.expenses.is_empty() {
        println!("(no expenses; import a statement with: expensy import --file <statement>)");
        return;
    }
    for e in &account.expenses {
        let mark = if e.receipt_attached { "x" } else { " " };
        println!(
            "[{}] {:<8} {:<8} {:<36} {:>14}  {}",
            mark,
            e.id.chars().take(8).collect::<String>(),
            e.date,
            e.description,
            money.format(e.amount),
            e.category.as_deref().unwrap_or("")
        );
    }
}

fn print_summary(stats: &SummaryStats, money: &CurrencyFormat) {
    println!(
        "Total:      {} ({} expenses)",
        money.format(stats.total_amount),
        stats.expense_count
    );
    println!(
        "Reconciled: {} ({})",
        money.format(stats.reconciled_amount),
        format_percentage(stats.completion_percentage)
    );
    println!(
        "Pending:    {} ({} receipts missing)",
        money.format(stats.pending_amount),
        stats.pending_count
    );
}

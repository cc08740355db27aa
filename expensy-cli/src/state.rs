use anyhow::{bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const STATE_LOCK_FILE: &str = "cards.lock";
const STATE_LOCK_WAIT: Duration = Duration::from_secs(10);
const STATE_LOCK_POLL: Duration = Duration::from_millis(25);

/// Resolve the Expensy home: `--home`, then `EXPENSY_HOME`, then `~/.expensy`
pub fn expensy_home(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Ok(p) = std::env::var("EXPENSY_HOME") {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".expensy"))
}

pub fn ensure_home(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir.to_path_buf())
}

fn create_lock_file(path: &Path) -> io::Result<File> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id()).ok();
    Ok(file)
}

/// Exclusive hold on `cards.json` for one load-mutate-save cycle.
///
/// Every command that writes state takes this before loading, so a save
/// never rewrites a snapshot another process has already replaced.
/// Removed on drop.
pub struct StateLock {
    path: PathBuf,
}

impl StateLock {
    pub fn acquire(home: &Path) -> Result<Self> {
        Self::acquire_within(home, STATE_LOCK_WAIT)
    }

    pub fn acquire_within(home: &Path, wait: Duration) -> Result<Self> {
        let path = home.join(STATE_LOCK_FILE);
        let deadline = Instant::now() + wait;
        loop {
            match create_lock_file(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        bail!(
                            "saved cards are locked by another expensy process (remove {} if it is stale)",
                            path.display()
                        );
                    }
                    thread::sleep(STATE_LOCK_POLL);
                }
                Err(e) => return Err(e).with_context(|| format!("create {}", path.display())),
            }
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Exclusive marker that an import is running for one account.
///
/// Held across the gateway call; the state itself is only locked for the
/// final write. A crashed run leaves the file behind; delete it by hand.
pub struct ImportLock {
    path: PathBuf,
}

impl ImportLock {
    pub fn acquire(home: &Path, account_id: &str) -> Result<Self> {
        let safe: String = account_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let path = home.join(format!("import-{safe}.lock"));
        match create_lock_file(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => bail!(
                "an import is already running for account {account_id} (remove {} if it is stale)",
                path.display()
            ),
            Err(e) => Err(e).with_context(|| format!("create {}", path.display())),
        }
    }
}

impl Drop for ImportLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

use anyhow::{Context, Result};
use expensy_core::CurrencyFormat;
use expensy_ingest::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub display: DisplaySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Only "gemini" is supported
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Environment variable consulted before auth.json
    pub api_key_env: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySection {
    pub currency_symbol: String,
    pub decimal_separator: char,
    pub grouping_separator: char,
}

impl Default for DisplaySection {
    fn default() -> Self {
        let f = CurrencyFormat::default();
        Self {
            currency_symbol: f.symbol,
            decimal_separator: f.decimal_separator,
            grouping_separator: f.grouping_separator,
        }
    }
}

impl DisplaySection {
    pub fn currency(&self) -> CurrencyFormat {
        CurrencyFormat {
            symbol: self.currency_symbol.clone(),
            decimal_separator: self.decimal_separator,
            grouping_separator: self.grouping_separator,
        }
    }
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.toml")
}

pub fn load_config(home: &Path) -> Result<Config> {
    let p = config_path(home);
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(home: &Path, cfg: &Config) -> Result<()> {
    let p = config_path(home);
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config(home: &Path) -> Result<()> {
    let p = config_path(home);
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(home, &Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

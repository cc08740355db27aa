use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::GatewaySection;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthState {
    pub gemini_api_key: Option<String>,
}

fn auth_path(home: &Path) -> PathBuf {
    home.join("auth.json")
}

pub fn load_auth(home: &Path) -> Result<AuthState> {
    let p = auth_path(home);
    if !p.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_auth(home: &Path, auth: &AuthState) -> Result<()> {
    let p = auth_path(home);
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

/// The environment variable named in the config wins over auth.json
pub fn resolve_api_key(home: &Path, gateway: &GatewaySection) -> Result<Option<String>> {
    if let Ok(key) = std::env::var(&gateway.api_key_env) {
        if !key.trim().is_empty() {
            return Ok(Some(key.trim().to_string()));
        }
    }
    Ok(load_auth(home)?
        .gemini_api_key
        .filter(|k| !k.trim().is_empty()))
}

fn prompt_secret(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

pub fn paste_gemini_key(home: &Path) -> Result<()> {
    let mut auth = load_auth(home)?;
    let key = prompt_secret("Paste Gemini API key")?;
    if key.is_empty() || key.contains(char::is_whitespace) {
        bail!("that does not look like an API key");
    }
    auth.gemini_api_key = Some(key);
    save_auth(home, &auth)?;
    println!("Saved Gemini API key to {}", auth_path(home).display());
    Ok(())
}

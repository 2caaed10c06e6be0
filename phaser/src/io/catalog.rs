//! Account and resource catalogs (`accounts.json`, `resources.json`).
//!
//! Catalogs are loaded once per run and are immutable while it lasts. Missing
//! files are seeded empty so a first run has something to edit.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::types::{Account, Credential, Resource};

/// One catalog entry. The credential may be supplied by the environment instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<AccountEntry>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourcesFile {
    #[serde(default)]
    urls: Vec<Resource>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// Account catalog bound to its file.
#[derive(Debug)]
pub struct AccountCatalog {
    path: PathBuf,
    entries: Vec<AccountEntry>,
}

impl AccountCatalog {
    pub fn load_or_seed(path: &Path) -> Result<Self> {
        if !path.exists() {
            let catalog = Self {
                path: path.to_path_buf(),
                entries: Vec::new(),
            };
            catalog.save()?;
            info!(path = %path.display(), "seeded empty account catalog");
            return Ok(catalog);
        }
        let file: AccountsFile = read_json(path)?;
        let mut seen = HashSet::new();
        for entry in &file.accounts {
            if entry.id.trim().is_empty() {
                bail!("{}: account id must not be empty", path.display());
            }
            if !seen.insert(entry.id.as_str()) {
                bail!("{}: duplicate account id {}", path.display(), entry.id);
            }
        }
        debug!(path = %path.display(), count = file.accounts.len(), "account catalog loaded");
        Ok(Self {
            path: path.to_path_buf(),
            entries: file.accounts,
        })
    }

    pub fn entries(&self) -> &[AccountEntry] {
        &self.entries
    }

    /// Add an account. Returns `false` if the id is already present.
    pub fn add(&mut self, entry: AccountEntry) -> Result<bool> {
        if entry.id.trim().is_empty() {
            return Err(anyhow!("account id must not be empty"));
        }
        if self.entries.iter().any(|existing| existing.id == entry.id) {
            return Ok(false);
        }
        self.entries.push(entry);
        self.save()?;
        Ok(true)
    }

    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Resolve every entry into an `Account`, filling missing credentials
    /// from `fallback`.
    pub fn resolve(&self, fallback: Option<&Credential>) -> Result<Vec<Account>> {
        self.entries
            .iter()
            .map(|entry| {
                let credential = entry
                    .credential
                    .clone()
                    .or_else(|| fallback.cloned())
                    .ok_or_else(|| anyhow!("no credential for account {}", entry.id))?;
                Ok(Account::new(entry.id.clone(), credential))
            })
            .collect()
    }

    /// Every entry as an `Account`, with a blank credential where none is
    /// stored. For planning and reporting, never for logging in.
    pub fn roster(&self) -> Vec<Account> {
        self.entries
            .iter()
            .map(|entry| {
                let credential = entry.credential.clone().unwrap_or_else(|| Credential::new(""));
                Account::new(entry.id.clone(), credential)
            })
            .collect()
    }

    fn save(&self) -> Result<()> {
        let file = AccountsFile {
            accounts: self.entries.clone(),
            last_updated: Some(Utc::now()),
        };
        write_json(&self.path, &file)
    }
}

/// Resource catalog bound to its file. Order is execution order.
#[derive(Debug)]
pub struct ResourceCatalog {
    path: PathBuf,
    urls: Vec<Resource>,
}

impl ResourceCatalog {
    pub fn load_or_seed(path: &Path) -> Result<Self> {
        if !path.exists() {
            let catalog = Self {
                path: path.to_path_buf(),
                urls: Vec::new(),
            };
            catalog.save()?;
            info!(path = %path.display(), "seeded empty resource catalog");
            return Ok(catalog);
        }
        let file: ResourcesFile = read_json(path)?;
        let mut seen = HashSet::new();
        for url in &file.urls {
            if url.trim().is_empty() {
                bail!("{}: resource must not be empty", path.display());
            }
            if !seen.insert(url.as_str()) {
                bail!("{}: duplicate resource {}", path.display(), url);
            }
        }
        debug!(path = %path.display(), count = file.urls.len(), "resource catalog loaded");
        Ok(Self {
            path: path.to_path_buf(),
            urls: file.urls,
        })
    }

    pub fn urls(&self) -> &[Resource] {
        &self.urls
    }

    pub fn add(&mut self, url: &str) -> Result<bool> {
        let url = url.trim();
        if url.is_empty() {
            return Err(anyhow!("resource must not be empty"));
        }
        if self.urls.iter().any(|existing| existing == url) {
            return Ok(false);
        }
        self.urls.push(url.to_string());
        self.save()?;
        Ok(true)
    }

    pub fn remove(&mut self, url: &str) -> Result<bool> {
        let before = self.urls.len();
        self.urls.retain(|existing| existing != url);
        if self.urls.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn save(&self) -> Result<()> {
        let file = ResourcesFile {
            urls: self.urls.clone(),
            last_updated: Some(Utc::now()),
        };
        write_json(&self.path, &file)
    }
}

/// Read a credential from the named environment variable, if set and non-empty.
pub fn credential_from_env(var: &str) -> Option<Credential> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .map(Credential::new)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize catalog")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

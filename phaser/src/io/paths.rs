//! Data directory layout and first-run scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::catalog::{AccountCatalog, ResourceCatalog};
use super::config::{AutomationConfig, write_config};

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".phaser";

/// All canonical paths within a data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub accounts_path: PathBuf,
    pub resources_path: PathBuf,
    pub state_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub logs_dir: PathBuf,
    pub audit_path: PathBuf,
    pub profiles_dir: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join("state");
        let logs_dir = root.join("logs");
        Self {
            config_path: root.join("config.toml"),
            accounts_path: root.join("accounts.json"),
            resources_path: root.join("resources.json"),
            ledger_path: state_dir.join("ledger.json"),
            audit_path: logs_dir.join("activity_log.csv"),
            profiles_dir: root.join("profiles"),
            state_dir,
            logs_dir,
            root,
        }
    }
}

/// Options for `init_data_dir`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config with defaults.
    pub force: bool,
}

/// Create the data directory, write a default config, and seed empty catalogs.
///
/// Fails if a config already exists unless `options.force` is set. Catalogs and
/// the ledger are never overwritten.
pub fn init_data_dir(root: &Path, options: &InitOptions) -> Result<DataPaths> {
    let paths = DataPaths::new(root);
    if paths.root.exists() && !paths.root.is_dir() {
        return Err(anyhow!(
            "init: {} exists but is not a directory",
            paths.root.display()
        ));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    for dir in [&paths.root, &paths.state_dir, &paths.logs_dir, &paths.profiles_dir] {
        fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    }
    write_config(&paths.config_path, &AutomationConfig::default())?;
    AccountCatalog::load_or_seed(&paths.accounts_path)?;
    ResourceCatalog::load_or_seed(&paths.resources_path)?;

    info!(root = %paths.root.display(), "data directory initialized");
    Ok(paths)
}

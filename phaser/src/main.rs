//! phaser: resumable two-phase account automation.
//!
//! The binary manages the data directory (`.phaser/`), its catalogs, and the
//! progress ledger. `phaser run` drives a session through Chromium when built
//! with the `browser` feature.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};

use phaser::core::ledger::LedgerState;
use phaser::core::scheduler::work_plan;
use phaser::core::summary::summarize;
use phaser::exit_codes;
use phaser::io::catalog::{AccountCatalog, AccountEntry, ResourceCatalog, credential_from_env};
use phaser::io::config::load_config;
use phaser::io::ledger_store::Ledger;
use phaser::io::paths::{DEFAULT_DATA_DIR, DataPaths, InitOptions, init_data_dir};
use phaser::{logging, maintenance, report};

#[derive(Parser)]
#[command(
    name = "phaser",
    version,
    about = "Resumable two-phase account automation"
)]
struct Cli {
    /// Data directory holding config, catalogs, ledger, and logs.
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Enable debug diagnostics on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the data directory with a default config and empty catalogs.
    Init {
        /// Overwrite an existing config with defaults.
        #[arg(short, long)]
        force: bool,
    },
    /// Log in pending accounts, then work pending resources. Ctrl-C stops
    /// after the current task and still prints the summary.
    Run,
    /// Print the ledger and session summary.
    Status,
    /// List pending logins and interactions. Exits 2 when nothing is pending.
    Plan,
    /// Remove every ledger entry for the given accounts.
    Cleanup {
        /// Account ids to remove (comma-separated or repeated).
        #[arg(long, required = true, value_delimiter = ',', num_args = 1..)]
        account_ids: Vec<String>,
        /// Show what would be removed without changing the ledger.
        #[arg(long)]
        dry_run: bool,
    },
    /// Discard all progress and start a new session.
    Reset {
        /// Show what would be discarded without changing the ledger.
        #[arg(long)]
        dry_run: bool,
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
    /// Manage the account catalog.
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
    /// Manage the resource catalog.
    Resources {
        #[command(subcommand)]
        action: ResourcesAction,
    },
}

#[derive(Subcommand)]
enum AccountsAction {
    List,
    Add {
        id: String,
        /// Store the credential read from this environment variable.
        #[arg(long)]
        credential_from_env: Option<String>,
    },
    Remove {
        id: String,
    },
}

#[derive(Subcommand)]
enum ResourcesAction {
    List,
    Add { url: String },
    Remove { url: String },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let paths = DataPaths::new(&cli.data_dir);
    match cli.command {
        Command::Init { force } => cmd_init(&cli.data_dir, force),
        Command::Run => cmd_run(&paths),
        Command::Status => cmd_status(&paths),
        Command::Plan => cmd_plan(&paths),
        Command::Cleanup {
            account_ids,
            dry_run,
        } => cmd_cleanup(&paths, &account_ids, dry_run),
        Command::Reset { dry_run, yes } => cmd_reset(&paths, dry_run, yes),
        Command::Accounts { action } => cmd_accounts(&paths, action),
        Command::Resources { action } => cmd_resources(&paths, action),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_data_dir(root, &InitOptions { force })?;
    println!("Initialized {}", paths.root.display());
    println!("Set site.landing_url in {}", paths.config_path.display());
    Ok(exit_codes::OK)
}

#[cfg(feature = "browser")]
fn cmd_run(paths: &DataPaths) -> Result<i32> {
    use phaser::browser::ChromiumLauncher;
    use phaser::io::clock::StopSignal;
    use phaser::orchestrator::run_attended;

    require_initialized(paths)?;
    let launcher = ChromiumLauncher::new()?;
    let stop = StopSignal::default();
    launcher.watch_interrupts(stop.clone());
    let end = run_attended(paths, launcher, stop)?;
    print!("{}", report::render_session_end(&end));
    Ok(end.exit_code())
}

#[cfg(not(feature = "browser"))]
fn cmd_run(paths: &DataPaths) -> Result<i32> {
    require_initialized(paths)?;
    bail!("this build has no browser backend; rebuild with `--features browser`")
}

fn cmd_status(paths: &DataPaths) -> Result<i32> {
    require_initialized(paths)?;
    let accounts = AccountCatalog::load_or_seed(&paths.accounts_path)?.roster();
    let resources = ResourceCatalog::load_or_seed(&paths.resources_path)?
        .urls()
        .to_vec();
    let state = match Ledger::open_existing(&paths.ledger_path)? {
        Some(ledger) => {
            print!("{}", report::render_ledger(ledger.state()));
            ledger.state().clone()
        }
        None => {
            println!("No ledger yet.");
            LedgerState::fresh(Utc::now())
        }
    };
    print!("{}", report::render_summary(&summarize(&state, &accounts, &resources)));
    Ok(exit_codes::OK)
}

fn cmd_plan(paths: &DataPaths) -> Result<i32> {
    require_initialized(paths)?;
    let accounts = AccountCatalog::load_or_seed(&paths.accounts_path)?.roster();
    let resources = ResourceCatalog::load_or_seed(&paths.resources_path)?
        .urls()
        .to_vec();
    let state = match Ledger::open_existing(&paths.ledger_path)? {
        Some(ledger) => ledger.state().clone(),
        None => LedgerState::fresh(Utc::now()),
    };
    let plan = work_plan(&state, &accounts, &resources);
    print!("{}", report::render_plan(&plan));
    if plan.is_empty() {
        Ok(exit_codes::COMPLETE)
    } else {
        Ok(exit_codes::OK)
    }
}

fn cmd_cleanup(paths: &DataPaths, account_ids: &[String], dry_run: bool) -> Result<i32> {
    let mut ledger = existing_ledger(paths)?;
    let result = maintenance::cleanup_accounts(&mut ledger, account_ids, dry_run)?;
    print!("{}", report::render_cleanup(&result));
    Ok(exit_codes::OK)
}

fn cmd_reset(paths: &DataPaths, dry_run: bool, yes: bool) -> Result<i32> {
    if !dry_run && !yes {
        bail!("reset discards all progress; pass --yes to confirm or --dry-run to preview");
    }
    let mut ledger = existing_ledger(paths)?;
    let result = maintenance::reset_session(&mut ledger, dry_run)?;
    print!("{}", report::render_reset(&result));
    Ok(exit_codes::OK)
}

fn cmd_accounts(paths: &DataPaths, action: AccountsAction) -> Result<i32> {
    require_initialized(paths)?;
    let mut catalog = AccountCatalog::load_or_seed(&paths.accounts_path)?;
    match action {
        AccountsAction::List => {
            let config = load_config(&paths.config_path)?;
            let fallback = credential_from_env(&config.credentials.env_var).is_some();
            for entry in catalog.entries() {
                let source = match (&entry.credential, fallback) {
                    (Some(_), _) => "stored".to_string(),
                    (None, true) => format!("${}", config.credentials.env_var),
                    (None, false) => "missing".to_string(),
                };
                println!("{}\t{}", entry.id, source);
            }
        }
        AccountsAction::Add {
            id,
            credential_from_env: var,
        } => {
            let credential = match var {
                Some(var) => Some(
                    credential_from_env(&var)
                        .with_context(|| format!("environment variable {var} is not set"))?,
                ),
                None => None,
            };
            let added = catalog.add(AccountEntry {
                id: id.clone(),
                credential,
            })?;
            if added {
                println!("Added account {id}");
            } else {
                println!("Account {id} already present");
            }
        }
        AccountsAction::Remove { id } => {
            if catalog.remove(&id)? {
                println!("Removed account {id}");
                println!("Ledger entries are kept; run `phaser cleanup --account-ids {id}` to drop them.");
            } else {
                bail!("no account {id} in catalog");
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_resources(paths: &DataPaths, action: ResourcesAction) -> Result<i32> {
    require_initialized(paths)?;
    let mut catalog = ResourceCatalog::load_or_seed(&paths.resources_path)?;
    match action {
        ResourcesAction::List => {
            for url in catalog.urls() {
                println!("{url}");
            }
        }
        ResourcesAction::Add { url } => {
            if catalog.add(&url)? {
                println!("Added {}", url.trim());
            } else {
                println!("{} already present", url.trim());
            }
        }
        ResourcesAction::Remove { url } => {
            if !catalog.remove(&url)? {
                bail!("no resource {url} in catalog");
            }
            println!("Removed {url}");
        }
    }
    Ok(exit_codes::OK)
}

fn require_initialized(paths: &DataPaths) -> Result<()> {
    if !paths.config_path.is_file() {
        bail!(
            "{} not found; run `phaser init` first",
            paths.config_path.display()
        );
    }
    Ok(())
}

fn existing_ledger(paths: &DataPaths) -> Result<Ledger> {
    require_initialized(paths)?;
    Ledger::open_existing(&paths.ledger_path)?
        .with_context(|| format!("no ledger at {}", paths.ledger_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["phaser", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn parse_global_data_dir_after_subcommand() {
        let cli = Cli::parse_from(["phaser", "status", "--data-dir", "/tmp/x", "-v"]);
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/x"));
        assert!(cli.verbose);
    }

    #[test]
    fn parse_cleanup_accepts_comma_list() {
        let cli = Cli::parse_from(["phaser", "cleanup", "--account-ids", "a1,a2", "--dry-run"]);
        match cli.command {
            Command::Cleanup {
                account_ids,
                dry_run,
            } => {
                assert_eq!(account_ids, vec!["a1", "a2"]);
                assert!(dry_run);
            }
            _ => panic!("expected cleanup"),
        }
    }

    #[test]
    fn parse_run() {
        let cli = Cli::parse_from(["phaser", "run", "--data-dir", "d"]);
        assert!(matches!(cli.command, Command::Run));
        assert_eq!(cli.data_dir, PathBuf::from("d"));
    }

    #[test]
    fn parse_cleanup_requires_ids() {
        assert!(Cli::try_parse_from(["phaser", "cleanup"]).is_err());
    }

    #[test]
    fn parse_accounts_add_with_env() {
        let cli = Cli::parse_from([
            "phaser",
            "accounts",
            "add",
            "a1",
            "--credential-from-env",
            "A1_PW",
        ]);
        match cli.command {
            Command::Accounts {
                action:
                    AccountsAction::Add {
                        id,
                        credential_from_env,
                    },
            } => {
                assert_eq!(id, "a1");
                assert_eq!(credential_from_env.as_deref(), Some("A1_PW"));
            }
            _ => panic!("expected accounts add"),
        }
    }
}

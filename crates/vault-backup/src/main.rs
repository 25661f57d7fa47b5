//! # vault-backup
//!

use core::time::Duration;
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    thread::sleep,
};

use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use shared::{Failure, init_logger};
use tracing::{error, info};
use vault_backup::{
    Orchestrator, Settings,
    config::Config,
    history::History,
    notify::DingTalk,
    select::{LatestSelector, PromptSelector},
    store::S3Store,
};
use zeroize::Zeroizing;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const HISTORY_FILE: &str = "history.json";

#[derive(Parser)]
#[command(version, about = "Back up a directory to an S3 compatible bucket")]
struct Cli {
    /// The config file.
    #[arg(long, global = true, default_value = "./config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init,

    /// Run a single backup now.
    Backup,

    /// Download and extract a stored backup.
    Restore {
        /// Restore the most recent backup without prompting.
        #[arg(long)]
        latest: bool,

        /// Decrypt the backup with this password before extracting it.
        #[arg(long)]
        password: Option<String>,
    },

    /// Back up on the configured schedule until stopped.
    Daemon,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logger = init_logger(Path::new("./logs")).or_log_and_panic("Could not create logger");

    match cli.command {
        Command::Init => {
            let config = Config::default();
            let contents =
                toml::to_string_pretty(&config).or_log_and_panic("Could not serialize config file");
            fs::write(&cli.config, contents).or_log_and_panic("Could not create config file");
            info!("Wrote default config to {:?}", cli.config);
            ExitCode::SUCCESS
        }

        Command::Backup => {
            let Pipeline {
                settings,
                store,
                notifier,
                ..
            } = Pipeline::load(&cli.config);

            match Orchestrator::new(settings, store, notifier, LatestSelector).run_backup() {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            }
        }

        Command::Restore { latest, password } => {
            let Pipeline {
                mut settings,
                store,
                notifier,
                ..
            } = Pipeline::load(&cli.config);
            settings.restore_password = password.map(Zeroizing::new);

            let restored = if latest {
                Orchestrator::new(settings, store, notifier, LatestSelector).run_restore()
            } else {
                Orchestrator::new(settings, store, notifier, PromptSelector::stdio()).run_restore()
            };

            match restored {
                Ok(()) => ExitCode::SUCCESS,
                Err(restore_error) => {
                    error!("Restore failed: {restore_error}");
                    ExitCode::FAILURE
                }
            }
        }

        Command::Daemon => {
            let Pipeline {
                config,
                settings,
                store,
                notifier,
            } = Pipeline::load(&cli.config);
            let mut history = History::load_or_create(Path::new(HISTORY_FILE))
                .or_log_and_panic("Could not load or create history");
            let orchestrator = Orchestrator::new(settings, store, notifier, LatestSelector);

            info!("Backing up {:?} {:?}", config.backup_dir, config.schedule);
            loop {
                if history.needs_backup(config.schedule) && orchestrator.run_backup().is_ok() {
                    if let Err(history_error) = history.update() {
                        error!("Could not save history: {history_error}");
                    }
                }

                sleep(Duration::from_secs(60 * 5));
            }
        }
    }
}

/// Everything a run needs, built from the config file.
struct Pipeline {
    config: Config,
    settings: Settings,
    store: S3Store,
    notifier: DingTalk,
}

impl Pipeline {
    fn load(config_path: &Path) -> Self {
        let config = Config::load_toml(config_path).or_log_and_panic("Could not load config");

        let store = S3Store::connect(&config.store.connection)
            .or_log_and_panic("Could not create the object store client");
        let notifier = DingTalk::new(config.ding_talk.clone())
            .or_log_and_panic("Could not create the notifier");

        let settings = Settings {
            backup_dir: config.backup_dir.clone(),
            restore_dir: config.restore_dir.clone(),
            prefix: config.store.prefix.clone(),
            password_length: config
                .encryption
                .enabled
                .then_some(config.encryption.password_length),
            restore_password: None,
        };

        Self {
            config,
            settings,
            store,
            notifier,
        }
    }
}

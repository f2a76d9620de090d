//! grafana-backup - command line entry point
//!
//! Settings come from an optional TOML file overridden by environment variables.
//! Any error that escapes a command is logged, reported to the notification
//! channel, and turned into exit code 1.

use clap::{Parser, Subcommand};
use grafana_backup::backup::create_archive;
use grafana_backup::gateway::HttpGateway;
use grafana_backup::notify::{Notifier, WebhookNotifier, notify_outcome};
use grafana_backup::remote::{fetch_object, open_store};
use grafana_backup::{
    BackupManager, BackupOptions, Config, DefaultEnvSource, Error, RestoreManager, RestoreOptions,
    Result,
};
use log::{error, info, warn};
use std::error::Error as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file (environment variables take precedence)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (same as DEBUG_MODE=1)
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up the instance into a tree, archive it and optionally upload the archive
    Backup {
        /// Destination directory (overrides BACKUP_DIR)
        #[arg(long, value_name = "DIR")]
        base_dir: Option<PathBuf>,

        /// Abort on the first failing resource
        #[arg(long)]
        fail_fast: bool,

        /// Leave the tree unarchived
        #[arg(long, conflicts_with = "upload")]
        no_archive: bool,

        /// Upload the archive to STORAGE_BUCKET
        #[arg(long)]
        upload: bool,
    },

    /// Replay serialized resources onto the instance
    Restore {
        /// Probe only, report what would be created or updated
        #[arg(long, global = true)]
        dry_run: bool,

        #[command(subcommand)]
        target: RestoreTarget,
    },

    /// Download an archive from object storage into a local directory
    Fetch {
        bucket: String,
        key: String,

        #[arg(long, value_name = "DIR", default_value = ".")]
        dest: PathBuf,
    },

    /// List objects in a bucket
    List {
        bucket: String,

        /// Key prefix (defaults to STORAGE_PREFIX)
        #[arg(long)]
        prefix: Option<String>,

        #[arg(long, default_value_t = 1000)]
        max: usize,
    },
}

#[derive(Subcommand, Debug)]
enum RestoreTarget {
    /// Folder directory holding data.json and access.json
    Folder {
        #[arg(env = "FOLDER_PATH")]
        path: PathBuf,
    },

    /// Dashboard file inside <folder>/dashboards/
    Dashboard {
        #[arg(env = "DASHBOARD_PATH")]
        path: PathBuf,

        /// Folder directory to restore into (defaults to two levels above the file)
        #[arg(long, value_name = "DIR")]
        folder_dir: Option<PathBuf>,
    },

    /// Datasource file
    Datasource {
        #[arg(env = "DATASOURCE_PATH")]
        path: PathBuf,
    },

    /// Every folder, dashboard and datasource under a backup tree
    Tree { dir: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(config.debug);

    let notifier = WebhookNotifier::new();
    match execute(&args.command, &config, &notifier) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", describe(&e));
            let message = format!("grafana-backup failed on {}: {e}", config.grafana.url);
            if let Err(notify_error) = notify_outcome(&notifier, &config.notifier, false, &message) {
                warn!("Failure notification not delivered: {notify_error}");
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => config_from_file(path)?,
        None => Config::default(),
    };
    config.apply_env(&DefaultEnvSource)?;
    if args.debug {
        config.debug = true;
    }
    Ok(config)
}

#[cfg(feature = "toml")]
fn config_from_file(path: &Path) -> Result<Config> {
    Config::from_file(path)
}

#[cfg(not(feature = "toml"))]
fn config_from_file(path: &Path) -> Result<Config> {
    Err(Error::Config(format!(
        "cannot read '{}': built without the toml feature",
        path.display()
    )))
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}]: \"{}\"",
                record.level(),
                buf.timestamp_seconds(),
                record.args()
            )
        })
        .init();
}

/// Error message followed by its source chain
fn describe(error: &Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    text
}

fn execute(command: &Command, config: &Config, notifier: &dyn Notifier) -> Result<()> {
    match command {
        Command::Backup {
            base_dir,
            fail_fast,
            no_archive,
            upload,
        } => run_backup(config, notifier, base_dir.as_deref(), *fail_fast, *no_archive, *upload),
        Command::Restore { dry_run, target } => run_restore(config, target, *dry_run),
        Command::Fetch { bucket, key, dest } => {
            let store = open_store(&config.storage)?;
            fetch_object(store.as_ref(), bucket, key, dest)?;
            Ok(())
        }
        Command::List { bucket, prefix, max } => {
            let store = open_store(&config.storage)?;
            let prefix = prefix.as_deref().unwrap_or(&config.storage.prefix);
            let listing = store.list(bucket, prefix, *max)?;
            for key in &listing.keys {
                println!("{key}");
            }
            if listing.truncated {
                info!("More than {max} objects match, listing truncated");
            }
            Ok(())
        }
    }
}

fn run_backup(
    config: &Config,
    notifier: &dyn Notifier,
    base_dir: Option<&Path>,
    fail_fast: bool,
    no_archive: bool,
    upload: bool,
) -> Result<()> {
    config.validate()?;
    let gateway = HttpGateway::new(&config.grafana)?;
    let base = base_dir.unwrap_or(config.backup.base_dir.as_path());

    let mut options = BackupOptions::from(&config.backup);
    if fail_fast {
        options = options.fail_fast();
    }

    let report = BackupManager::new(&gateway).run(base, &options)?;
    for failure in &report.failures {
        warn!("Not backed up: {failure}");
    }
    let mut message = format!("Backup of {}: {}", config.grafana.url, report.summary());

    if !no_archive {
        let archive = create_archive(base)?;
        message.push_str(&format!(", archive {}", archive.path.display()));

        if upload {
            let store = open_store(&config.storage)?;
            let bucket = config
                .storage
                .bucket
                .as_deref()
                .filter(|b| !b.is_empty())
                .ok_or_else(|| Error::Config("--upload needs STORAGE_BUCKET".into()))?;
            let key = store.upload(&archive.path, bucket)?;
            message.push_str(&format!(" uploaded to {bucket}/{key}"));
        }
    }

    info!("{message}");
    if let Err(e) = notify_outcome(notifier, &config.notifier, report.is_complete(), &message) {
        warn!("Notification not delivered: {e}");
    }
    Ok(())
}

fn run_restore(config: &Config, target: &RestoreTarget, dry_run: bool) -> Result<()> {
    config.validate()?;
    let gateway = HttpGateway::new(&config.grafana)?;
    let restore = RestoreManager::new(&gateway).with_options(RestoreOptions::new().dry_run(dry_run));

    match target {
        RestoreTarget::Folder { path } => {
            let restored = restore.restore_folder(path)?;
            info!("Folder '{}' {}", restored.body.display_name(), restored.action);
        }
        RestoreTarget::Dashboard { path, folder_dir } => {
            let restored = match folder_dir {
                Some(dir) => restore.restore_dashboard_in(path, dir)?,
                None => restore.restore_dashboard(path)?,
            };
            info!(
                "Dashboard '{}' {}",
                restored.body.uid().unwrap_or_default(),
                restored.action
            );
        }
        RestoreTarget::Datasource { path } => {
            let restored = restore.restore_datasource(path)?;
            info!("Datasource '{}' {}", restored.body.display_name(), restored.action);
        }
        RestoreTarget::Tree { dir } => {
            let report = restore.restore_tree(dir)?;
            info!("{} resources restored", report.total());
        }
    }
    Ok(())
}

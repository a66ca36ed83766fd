mod app;
mod cache;
mod config;
mod connectivity;
mod db;
mod error;
mod event;
mod http;
mod ledger;
mod queue;
mod records;
mod sync;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::records::AddOutcome;
use crate::worker::WorkerOutcome;

#[derive(Parser, Debug)]
#[command(name = "postgram")]
#[command(about = "Offline-first contact book with a cached app shell")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./postgram.yaml or $XDG_CONFIG_HOME/postgram/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Treat the network as unreachable
  #[arg(long, global = true)]
  offline: bool,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Watch the contact list and sync whenever the network comes back
  Run,
  /// Add a contact (queued when offline)
  Add { name: String, number: String },
  /// Delete a synced contact by id
  Delete { id: String },
  /// List synced contacts
  List,
  /// Inspect or drop contacts waiting to be synced
  Pending {
    #[command(subcommand)]
    action: Option<PendingAction>,
  },
  /// Push queued contacts now
  Sync,
  /// Fetch a URL through the shell cache
  Fetch {
    url: String,
    /// HTTP method; anything but GET skips the cache
    #[arg(long, default_value = "GET")]
    method: String,
    /// Treat as a top-level navigation
    #[arg(long)]
    navigate: bool,
  },
  /// Precache the app shell
  Install,
  /// Remove caches from older versions
  Activate,
  /// Tell a waiting shell to activate now
  SkipWaiting,
}

#[derive(Subcommand, Debug)]
enum PendingAction {
  List,
  Drop { local_key: i64 },
}

fn init_logging(log_dir: &Path) -> WorkerGuard {
  let filter = EnvFilter::try_from_env("POSTGRAM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  let file_appender = tracing_appender::rolling::daily(log_dir, "postgram.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(filter)
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false),
    )
    .init();

  guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let data_dir = config.storage.resolve_data_dir()?;
  std::fs::create_dir_all(&data_dir)?;
  let _guard = init_logging(&data_dir);

  let app = app::App::new(config, args.offline).await?;

  let code = match args.command.unwrap_or(Command::Run) {
    Command::Run => {
      app.run().await?;
      ExitCode::SUCCESS
    }
    Command::Add { name, number } => match app.add(&name, &number).await {
      Ok(AddOutcome::Saved) => done("Contact saved."),
      Ok(AddOutcome::Queued { local_key }) => done(&format!(
        "Offline: contact saved locally (#{local_key}) and will sync when online."
      )),
      Err(e) => fail(&e),
    },
    Command::Delete { id } => match app.delete(&id).await {
      Ok(()) => done("Contact deleted."),
      Err(e) => fail(&e),
    },
    Command::List => match app.list().await {
      Ok(records) => {
        records.iter().for_each(app::print_record);
        ExitCode::SUCCESS
      }
      Err(e) => fail(&e),
    },
    Command::Pending { action } => match action.unwrap_or(PendingAction::List) {
      PendingAction::List => match app.pending() {
        Ok(pending) => {
          for item in pending {
            println!("#{:<6} {:<24} {}", item.local_key, item.name, item.number);
          }
          match app.pending_count() {
            Ok(count) => done(&format!("{count} waiting to sync.")),
            Err(e) => fail(&e),
          }
        }
        Err(e) => fail(&e),
      },
      PendingAction::Drop { local_key } => match app.drop_pending(local_key) {
        Ok(true) => done(&format!("Dropped #{local_key}.")),
        Ok(false) => done(&format!("No pending contact #{local_key}.")),
        Err(e) => fail(&e),
      },
    },
    Command::Sync => match app.sync().await {
      Ok(report) => done(&format!(
        "Synced {} of {} ({} failed).",
        report.synced, report.attempted, report.failed
      )),
      Err(e) => fail(&e),
    },
    Command::Fetch {
      url,
      method,
      navigate,
    } => {
      let response = app.fetch(&url, &method, navigate).await;
      if response.is_network_error() {
        eprintln!("Network error");
        ExitCode::FAILURE
      } else {
        println!("{} {}", response.status, response.status_text);
        done(&String::from_utf8_lossy(&response.body))
      }
    }
    Command::Install => match app.install().await {
      WorkerOutcome::Installed { precached } => done(&format!("Precached {precached} assets.")),
      _ => ExitCode::FAILURE,
    },
    Command::Activate => activated(app.activate().await),
    Command::SkipWaiting => activated(app.skip_waiting().await),
  };

  Ok(code)
}

fn done(message: &str) -> ExitCode {
  println!("{message}");
  ExitCode::SUCCESS
}

fn activated(outcome: WorkerOutcome) -> ExitCode {
  match outcome {
    WorkerOutcome::Activated { removed, .. } => {
      done(&format!("Removed {} old caches.", removed.len()))
    }
    _ => ExitCode::FAILURE,
  }
}

fn fail(err: &error::Error) -> ExitCode {
  tracing::warn!("{}", err);
  eprintln!("{}", err.user_message());
  ExitCode::FAILURE
}

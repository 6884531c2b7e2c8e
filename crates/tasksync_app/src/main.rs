mod config;
mod logging;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tasksync_core::{TaskId, TaskStatus};
use tasksync_engine::{
    ApiClient, PushConnector, SessionRegistry, StatusSource, SyncSettings, WsConnector,
};
use tasksync_logging::{level_from_verbosity, sync_info, sync_warn};

use crate::config::EndpointOverrides;
use crate::logging::LogDestination;
use crate::render::TerminalSubscriber;

/// Follow server-side transcript batches from the terminal.
#[derive(Parser)]
#[command(name = "tasksync", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Settings file (RON). Defaults to ./tasksync.ron when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// REST base url.
    #[arg(long, global = true, env = "TASKSYNC_API_BASE")]
    api_base: Option<String>,

    /// Push-channel base url.
    #[arg(long, global = true, env = "TASKSYNC_WS_BASE")]
    ws_base: Option<String>,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long, global = true, value_enum, default_value = "terminal")]
    log: LogDestination,

    /// Log file used with `--log file|both`. Defaults to ./tasksync.log.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Follow an existing task until it finishes.
    Watch {
        task_id: String,
    },
    /// Submit talk urls for processing and follow the new task.
    Batch {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long, default_value = "default")]
        user: String,
    },
    /// Search talks by topic.
    Search {
        topic: String,
        #[arg(long, default_value = "default")]
        user: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(
        cli.global.log,
        level_from_verbosity(cli.global.verbose),
        cli.global.log_file.as_deref(),
    )?;

    let file = config::load(cli.global.config.as_deref())?;
    let settings = config::resolve(
        &file,
        &EndpointOverrides {
            api_base: cli.global.api_base.clone(),
            ws_base: cli.global.ws_base.clone(),
        },
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run(cli.command, settings))
}

async fn run(command: Command, settings: SyncSettings) -> Result<()> {
    let api = ApiClient::new(settings.clone()).context("failed to build http client")?;
    match command {
        Command::Watch { task_id } => watch(TaskId::from(task_id), settings, api).await,
        Command::Batch { urls, user } => {
            let task_id = api
                .start_batch(&urls, &user)
                .await
                .context("failed to start batch")?;
            println!("started task {task_id} ({} url(s))", urls.len());
            watch(task_id, settings, api).await
        }
        Command::Search { topic, user } => {
            let results = api
                .search(&topic, &user)
                .await
                .with_context(|| format!("search for {topic:?} failed"))?;
            render::print_search_results(&results);
            Ok(())
        }
    }
}

async fn watch(task_id: TaskId, settings: SyncSettings, api: ApiClient) -> Result<()> {
    let connector: Arc<dyn PushConnector> = Arc::new(WsConnector::new(settings.clone()));
    let source: Arc<dyn StatusSource> = Arc::new(api);
    let registry = SessionRegistry::new(settings, connector, source);

    sync_info!("Watching task {}", task_id);
    let session = registry.open(task_id.clone(), Arc::new(TerminalSubscriber));

    let progress = tokio::select! {
        progress = session.wait_terminal() => progress,
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                registry.close_all();
                let progress = session.wait_terminal().await;
                println!("stopped watching task {task_id} at {}%", progress.progress_percent());
                return Ok(());
            }
            Err(err) => {
                sync_warn!("Failed to listen for ctrl-c: {}", err);
                session.wait_terminal().await
            }
        },
    };

    match progress.status() {
        TaskStatus::Completed => Ok(()),
        TaskStatus::Failed => bail!(
            "task {task_id} failed: {}",
            progress.error().unwrap_or("unknown error")
        ),
        status => bail!("stopped following task {task_id} while it was {status}"),
    }
}

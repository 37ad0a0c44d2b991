//! `hotlist` command-line driver.
//!
//! # Responsibility
//! - Parse string parameters the same way an HTTP edge would and run one feed
//!   operation per invocation against the configured backend.
//! - Print results as JSON on stdout and failures as `{"error": ...}` on
//!   stderr.
//!
//! # Exit codes
//! - `0` success, `2` rejected request, `1` server-side failure.

use clap::{Parser, Subcommand};
use hotlist_core::{
    default_log_level, init_logging, open_backend, AnnotatedItem, BackendConfig, ConfigError,
    CreateItemParams, EngineConfig, ErrorClass, FeedError, FeedService, ItemView, ListParams,
    Reconciler, ValidationError, VoteParams, VoteResult,
};
use log::error;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hotlist")]
#[command(about = "Vote-ranked feed", version)]
struct Cli {
    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, env = "HOTLIST_LOG_DIR", global = true)]
    log_dir: Option<String>,

    #[arg(long, env = "HOTLIST_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// SQLite database file (overrides HOTLIST_BACKEND)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an item
    Post {
        #[arg(long)]
        url: String,
        #[arg(long)]
        caption: Option<String>,
    },
    /// List the ranked feed
    Hot {
        /// Base64 key of the last item seen
        #[arg(long)]
        key: Option<String>,
        /// Score of the last item seen
        #[arg(long)]
        score: Option<String>,
        /// Opaque cursor token from a previous page
        #[arg(long)]
        cursor: Option<String>,
        /// Page toward higher scores from the cursor
        #[arg(long)]
        forward: bool,
        #[arg(long)]
        limit: Option<String>,
        #[arg(long)]
        device_id: Option<String>,
    },
    /// Vote for an item
    Vote {
        #[arg(long)]
        device_id: String,
        #[arg(long)]
        key: String,
    },
    /// Recount votes and repair drifted scores
    Reconcile,
}

enum CliError {
    Config(ConfigError),
    Feed(FeedError),
    Startup(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Feed(err) if err.class() == ErrorClass::Client => 2,
            Self::Config(_) => 2,
            _ => 1,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Config(err) => err.to_string(),
            Self::Feed(err) => err.public_message(),
            Self::Startup(message) => message.clone(),
        }
    }
}

impl From<FeedError> for CliError {
    fn from(value: FeedError) -> Self {
        Self::Feed(value)
    }
}

impl From<ValidationError> for CliError {
    fn from(value: ValidationError) -> Self {
        Self::Feed(value.into())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("{}", json!({ "error": err.to_string() }));
            return ExitCode::from(2);
        }
    }

    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            if let CliError::Feed(inner) = &err {
                error!(
                    "event=cli_command module=cli status=error class={:?} error={inner}",
                    inner.class()
                );
            }
            eprintln!("{}", json!({ "error": err.public_message() }));
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<Value, CliError> {
    let mut config = EngineConfig::from_env().map_err(CliError::Config)?;
    if let Some(path) = cli.db {
        config.backend = BackendConfig::Sqlite { path };
    }

    let backend = open_backend(&config)
        .await
        .map_err(|err| CliError::Startup(format!("failed to open backend: {err}")))?;

    let reconciler = Reconciler::new(Arc::clone(&backend));
    let service = FeedService::new(backend, &config);
    match cli.command {
        Command::Post { url, caption } => {
            let request = CreateItemParams { url, caption }.parse()?;
            let item = service.create_item(request).await?;
            Ok(view_json(&ItemView::from_annotated(&AnnotatedItem::new(
                item, false,
            ))))
        }
        Command::Hot {
            key,
            score,
            cursor,
            forward,
            limit,
            device_id,
        } => {
            let params = ListParams {
                key,
                score,
                cursor,
                forward: forward.then(|| "true".to_string()),
                limit,
                device_id,
            };
            let request = params.parse(service.category())?;
            let page = service.list_ranked(&request).await?;
            let items: Vec<Value> = page
                .items
                .iter()
                .map(|annotated| view_json(&ItemView::from_annotated(annotated)))
                .collect();
            Ok(json!({
                "items": items,
                "next_cursor": page.next_cursor.map(|cursor| cursor.to_token()),
            }))
        }
        Command::Vote { device_id, key } => {
            let request = VoteParams { device_id, key }.parse()?;
            match service.vote(&request).await? {
                VoteResult::Accepted(annotated) => Ok(json!({
                    "status": "accepted",
                    "item": view_json(&ItemView::from_annotated(&annotated)),
                })),
                VoteResult::AlreadyVoted => Ok(json!({ "status": "already_voted" })),
            }
        }
        Command::Reconcile => {
            let report = reconciler.reconcile(service.category()).await?;
            Ok(json!({ "scanned": report.scanned, "repaired": report.repaired }))
        }
    }
}

fn view_json(view: &ItemView) -> Value {
    serde_json::to_value(view).unwrap_or(Value::Null)
}

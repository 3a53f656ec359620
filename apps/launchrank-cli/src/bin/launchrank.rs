use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use launchrank_cli::app::CaptureTarget;
use launchrank_cli::{server, App};
use launchrank_core::capture::EntryCapture;
use launchrank_core::config::Config;
use launchrank_core::error::Error;
use launchrank_core::traits::EntryProvider;
use launchrank_core::types::EntryKind;
use launchrank_rank::PipelineOptions;

#[derive(Parser)]
#[command(name = "launchrank", version, about = "Launcher entries ranked by what you are likely to run next")]
struct Cli {
    /// Configuration environment (dev, prod, test); defaults to RUST_ENV.
    #[arg(long, global = true)]
    config_env: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the dataset, train a model and log it to the registry.
    Train {
        /// Recompute the dataset instead of using the cached copy.
        #[arg(long)]
        no_cache: bool,
        /// Train and report without logging the model.
        #[arg(long)]
        no_log: bool,
        /// Point production at the new run.
        #[arg(long)]
        promote: bool,
    },
    /// Evaluate a logged model against the dataset and the baseline.
    Evaluate {
        /// Run to evaluate; defaults to the production run.
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long)]
        no_cache: bool,
    },
    /// Inspect or update the model registry.
    Registry {
        #[command(subcommand)]
        action: RegistryCommand,
    },
    /// Print the current ranking with scores.
    Rank {
        /// Previous key to rank against; defaults to the last used key.
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Serve the ranking over HTTP.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Record that an entry was used.
    Record { key: String },
    /// Store a new entry. Content is read from stdin when not given.
    Capture {
        /// Store under a generated `no key ...` name as a snippet.
        #[arg(long)]
        anonymous: bool,
        #[arg(long)]
        kind: Option<EntryKind>,
        /// `<KEY> [CONTENT]`, or `[CONTENT]` with --anonymous.
        #[arg(num_args = 0..=2)]
        args: Vec<String>,
    },
    /// Show an entry's details.
    Preview { key: String },
}

#[derive(Subcommand)]
enum RegistryCommand {
    /// List logged runs, oldest first; `*` marks production.
    List,
    /// Print one run's metadata; defaults to production.
    Show { run_id: Option<String> },
    /// Point production at a logged run.
    Promote { run_id: String },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn read_content(arg: Option<String>) -> Result<String> {
    match arg {
        Some(content) => Ok(content),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load_for_env(cli.config_env.as_deref())?;
    let app = App::from_config(&config)?;

    match cli.command {
        Command::Train { no_cache, no_log, promote } => {
            let mut pipeline_config = app.training_config();
            pipeline_config.show_progress = true;
            let pipeline = app.pipeline().await?.with_config(pipeline_config);
            let outcome = pipeline.run(PipelineOptions { use_cache: !no_cache, log_model: !no_log, promote }).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Evaluate { run_id, no_cache } => {
            let report = app.pipeline().await?.evaluate(run_id.as_deref(), !no_cache).await?;
            println!("{report}");
        }
        Command::Registry { action } => {
            let registry = app.registry().await?;
            match action {
                RegistryCommand::List => {
                    let production = registry.production_run_id().await?;
                    for run in registry.list_runs().await? {
                        let mark = if production.as_deref() == Some(run.run_id.as_str()) { "*" } else { " " };
                        println!(
                            "{mark} {}  {}  test_mse={:.6}  {}",
                            run.run_id,
                            run.created_at.format("%Y-%m-%d %H:%M:%S"),
                            run.metrics.test_mse,
                            run.embedder_id
                        );
                    }
                }
                RegistryCommand::Show { run_id } => {
                    let run_id = match run_id {
                        Some(id) => id,
                        None => registry.production_run_id().await?.ok_or(Error::NoProductionModel)?,
                    };
                    println!("{}", serde_json::to_string_pretty(&registry.metadata(&run_id).await?)?);
                }
                RegistryCommand::Promote { run_id } => {
                    registry.promote(&run_id).await?;
                    println!("production -> {run_id}");
                }
            }
        }
        Command::Rank { context, limit } => {
            let service = app.ranking_service().await?;
            let context = match context {
                Some(c) => Some(c),
                None => service.current().await.context.clone(),
            };
            let ranking = service.rank_for(context.as_deref()).await?;
            for entry in ranking.entries.iter().take(limit.unwrap_or(usize::MAX)) {
                println!("{:>9.5}  {}", entry.score, entry.key);
            }
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| app.settings.server.bind.clone());
            let service = Arc::new(app.ranking_service().await?);
            server::run_server(service, &bind).await?;
        }
        Command::Record { key } => {
            let event = app.recorder().record(&key, Utc::now())?;
            println!("{} <- {}", event.key, event.previous_key.as_deref().unwrap_or("-"));
        }
        Command::Capture { anonymous, kind, args } => {
            let store = app.entry_store();
            let sink = app.event_sink();
            let capture = EntryCapture::new(&store).with_sink(&sink);
            match CaptureTarget::from_args(anonymous, args)? {
                CaptureTarget::Anonymous { content } => {
                    let key = capture.register_anonymous(&read_content(content)?, Utc::now())?;
                    println!("{key}");
                }
                CaptureTarget::Named { key, content } => {
                    let raw = capture.register(&key, kind, &read_content(content)?, Utc::now())?;
                    tracing::debug!(?raw, "captured entry");
                    println!("{key}");
                }
            }
        }
        Command::Preview { key } => {
            let catalog = app.entry_store().load_config()?;
            let entry = catalog.get(&key).ok_or_else(|| Error::NotFound(format!("entry '{key}'")))?;
            println!("{}", entry.preview(Utc::now()));
        }
    }
    Ok(())
}

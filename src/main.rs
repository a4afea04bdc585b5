//! frank CLI: answer queries against local fact files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};

use frank::alist::{Alist, Context};
use frank::config::FrankConfig;
use frank::infer::Engine;
use frank::kb::{MemoryGazetteer, MemorySource};
use frank::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "frank", version, about = "Inference engine for factoid and numeric queries")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Knowledge {
    /// JSON array of facts; repeatable. The file stem names the source.
    #[arg(long)]
    facts: Vec<PathBuf>,

    /// JSON object mapping places to their sub-places.
    #[arg(long)]
    places: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one query.
    Query {
        /// The query alist as inline JSON.
        #[arg(long, conflicts_with = "file")]
        query: Option<String>,

        /// Read the query alist from a file.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Context block (user/env/query) to attach to the query.
        #[arg(long)]
        context: Option<String>,

        /// Include the inference graph in the output.
        #[arg(long)]
        graph: bool,

        #[command(flatten)]
        knowledge: Knowledge,
    },
    /// Answer a JSON array of queries concurrently.
    Batch {
        #[arg(long)]
        file: PathBuf,

        /// Write answers here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        knowledge: Knowledge,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => FrankConfig::load(path)?,
        None => FrankConfig::default(),
    };

    match cli.command {
        Commands::Query {
            query,
            file,
            context,
            graph,
            knowledge,
        } => {
            let text = match (query, file) {
                (Some(q), _) => q,
                (None, Some(path)) => std::fs::read_to_string(&path).into_diagnostic()?,
                (None, None) => return Err(miette!("either --query or --file is required")),
            };
            let mut root = Alist::from_json_str(&text)?;
            if let Some(context) = context {
                root.context = serde_json::from_str::<Context>(&context)
                    .map_err(|e| miette!("invalid --context: {e}"))?;
            }

            let engine = build_engine(&config, &knowledge)?;
            let scheduler = Scheduler::new(&engine, config.scheduler.clone());
            let (answer, session) = scheduler.run_session(root);

            let output = if graph {
                serde_json::json!({
                    "answer": answer,
                    "graph": session.graph.ui_graph(),
                })
            } else {
                serde_json::to_value(&answer).into_diagnostic()?
            };
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        }

        Commands::Batch {
            file,
            output,
            knowledge,
        } => {
            let text = std::fs::read_to_string(&file).into_diagnostic()?;
            let items: Vec<serde_json::Value> = serde_json::from_str(&text).into_diagnostic()?;
            let roots = items
                .into_iter()
                .map(Alist::from_json)
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let engine = build_engine(&config, &knowledge)?;
            let scheduler = Scheduler::new(&engine, config.scheduler.clone());
            let count = roots.len();
            let answers = scheduler.run_many(roots);
            let found = answers.iter().filter(|a| a.is_found()).count();

            let rendered = serde_json::to_string_pretty(&answers).into_diagnostic()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered).into_diagnostic()?;
                    eprintln!("Answered {found}/{count} queries -> {}", path.display());
                }
                None => println!("{rendered}"),
            }
        }
    }

    Ok(())
}

fn build_engine(config: &FrankConfig, knowledge: &Knowledge) -> Result<Engine> {
    let mut engine = Engine::new(config.engine.clone());
    for path in &knowledge.facts {
        let source = MemorySource::load(source_name(path), path)?;
        tracing::info!(source = %source_name(path), facts = source.facts().len(), "loaded facts");
        engine = engine.with_source(Arc::new(source));
    }
    if let Some(path) = &knowledge.places {
        engine = engine.with_gazetteer(Arc::new(MemoryGazetteer::load(path)?));
    }
    Ok(engine)
}

fn source_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "memory".to_string())
}

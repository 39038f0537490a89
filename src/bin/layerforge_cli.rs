//! LayerForge CLI - Bridge interface for node hosts
//!
//! Commands: reconcile, apply-overrides, replay
//! Outputs JSON to stdout
//! Returns non-zero on rejected input

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use layerforge_core::{
    apply_overrides,
    config::EngineConfig,
    pipeline::{DocumentHandle, ReviewPipeline, ReviewRequest, StaticPolicy, WireframeComposer},
    script::{parse_script, run_script, snapshot_json},
    Artifact, Override, PipelineStore, Reconciler, Session, SlotKey,
};

#[derive(Parser)]
#[command(name = "layerforge-cli")]
#[command(about = "LayerForge CLI - Layout Pipeline Store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to engine config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an incoming artifact against the current one
    Reconcile {
        /// JSON payload (Artifact)
        #[arg(short, long)]
        incoming: String,

        /// JSON payload (Artifact) currently stored
        #[arg(long)]
        current: Option<String>,
    },

    /// Apply reviewer overrides to an artifact's layer tree
    ApplyOverrides {
        /// JSON payload (Artifact)
        #[arg(short, long)]
        artifact: String,

        /// JSON payload (array of Override)
        #[arg(short, long)]
        overrides: String,
    },

    /// Replay an event script and print the final registries
    Replay {
        /// Script file (JSON array or JSON lines)
        #[arg(short, long)]
        script: PathBuf,

        /// Review this producer's "out" slot after replay, using overrides JSON
        #[arg(long)]
        review: Option<String>,

        /// Overrides for --review (array of Override)
        #[arg(long, default_value = "[]")]
        overrides: String,
    },
}

fn fail(message: String) -> ExitCode {
    let output = serde_json::json!({ "success": false, "error": message });
    println!("{}", output);
    ExitCode::from(2)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("layerforge_core={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!(r#"{{"error": "Failed to load config: {}"}}"#, e);
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Reconcile { incoming, current } => {
            let incoming: Artifact = match serde_json::from_str(&incoming) {
                Ok(a) => a,
                Err(e) => return fail(format!("Invalid incoming payload: {}", e)),
            };
            let current: Option<Artifact> = match current.as_deref().map(serde_json::from_str).transpose() {
                Ok(c) => c,
                Err(e) => return fail(format!("Invalid current payload: {}", e)),
            };

            let resolution = Reconciler::new(config.reconcile_policy()).resolve(&incoming, current.as_ref());
            let output = serde_json::json!({
                "success": true,
                "rule": resolution.rule,
                "rejected": resolution.is_rejected(),
                "artifact": resolution.artifact,
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            ExitCode::SUCCESS
        }

        Commands::ApplyOverrides { artifact, overrides } => {
            let artifact: Artifact = match serde_json::from_str(&artifact) {
                Ok(a) => a,
                Err(e) => return fail(format!("Invalid artifact payload: {}", e)),
            };
            let overrides: Vec<Override> = match serde_json::from_str(&overrides) {
                Ok(o) => o,
                Err(e) => return fail(format!("Invalid overrides payload: {}", e)),
            };

            let output = serde_json::json!({
                "success": true,
                "artifact": apply_overrides(&artifact, &overrides),
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            ExitCode::SUCCESS
        }

        Commands::Replay { script, review, overrides } => {
            let text = match std::fs::read_to_string(&script) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!(r#"{{"error": "Failed to read script: {}"}}"#, e);
                    return ExitCode::FAILURE;
                }
            };
            let ops = match parse_script(&text) {
                Ok(ops) => ops,
                Err(e) => return fail(e.to_string()),
            };
            let policy: StaticPolicy = match serde_json::from_str(&overrides) {
                Ok(p) => p,
                Err(e) => return fail(format!("Invalid overrides payload: {}", e)),
            };

            let mut session = Session::new();
            if let Err(e) = session.start(&config) {
                return fail(e.to_string());
            }
            let store: &mut PipelineStore = session.store_mut();
            let report = run_script(store, &ops);

            let review_outcome = match review {
                Some(producer) => {
                    let request = ReviewRequest {
                        source: SlotKey::new(producer.as_str(), "out"),
                        target: SlotKey::new(format!("{}:review", producer), "out"),
                        document: DocumentHandle(script.display().to_string()),
                    };
                    match ReviewPipeline::from_config(&config).review(store, &request, &policy, Some(&WireframeComposer)) {
                        Ok(outcome) => Some(outcome),
                        Err(e) => return fail(e.to_string()),
                    }
                }
                None => None,
            };

            let snapshot = match snapshot_json(store) {
                Ok(s) => s,
                Err(e) => return fail(e.to_string()),
            };
            let output = serde_json::json!({
                "success": true,
                "session": session.id(),
                "startedAt": session.started_at(),
                "report": report,
                "review": review_outcome,
                "state": snapshot,
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            session.end();
            ExitCode::SUCCESS
        }
    }
}

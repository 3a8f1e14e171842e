//! EduRun CLI
//!
//! Runs a source file through the execution backend and prints hints from the
//! feedback backend, or serves a learner session over HTTP.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use edurun_orchestrator::{
    create_router, AppState, Config, CoordinatorEvent, ExecutionClient, ExecutionResult,
    FeedbackBundle, FeedbackTier, LanguageRegistry, RequestCoordinator, RequestGeneration,
    RunRequest, SourceFile,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Extra time allowed on top of backend timeouts while waiting for events.
const WAIT_MARGIN: Duration = Duration::from_secs(5);

/// EduRun - run code, get hints
///
/// Submits learner programs to an execution backend and asks a generative
/// mentor for hints that never give the full solution away.
#[derive(Parser, Debug)]
#[command(name = "edurun")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: edurun.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a source file and print its output and feedback
    Run {
        /// Path to the source file
        #[arg(value_name = "FILE")]
        file: String,

        /// Language identifier (default: detected from the extension)
        #[arg(short, long)]
        language: Option<String>,

        /// Only check syntax
        #[arg(long)]
        syntax_only: bool,

        /// Skip the feedback analysis
        #[arg(long)]
        no_feedback: bool,
    },

    /// List supported languages
    Languages {
        /// Ask the execution backend instead of the built-in table
        #[arg(long)]
        remote: bool,
    },

    /// Check that the execution backend is healthy
    Health,

    /// Serve a learner session over HTTP and WebSocket
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match dispatch(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(args: Args) -> anyhow::Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Run {
            file,
            language,
            syntax_only,
            no_feedback,
        } => run_file(&config, &file, language, syntax_only, no_feedback).await,
        Command::Languages { remote } => list_languages(&config, remote).await,
        Command::Health => check_health(&config).await,
        Command::Serve { port } => serve(config, port).await,
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

// ============================================================================
// run
// ============================================================================

async fn run_file(
    config: &Config,
    file: &str,
    language: Option<String>,
    syntax_only: bool,
    no_feedback: bool,
) -> anyhow::Result<ExitCode> {
    let source = SourceFile::load(file, LanguageRegistry::builtin())?;
    let language = language
        .or_else(|| source.language.as_ref().map(|l| l.id.clone()))
        .unwrap_or_else(|| config.default_language.clone());

    tracing::info!(path = %source.path.display(), language = %language, "Running source file");

    let coordinator = RequestCoordinator::spawn_from_config(config)?;
    let mut events = coordinator.subscribe();

    let mut request = RunRequest::new(source.code.clone(), language);
    if syntax_only {
        request = request.syntax_only();
    }
    let generation = coordinator.run(request).await?;

    let run_timeout = if syntax_only {
        config.execution.syntax_timeout_seconds
    } else {
        config.execution.run_timeout_seconds
    };
    let execution_wait = Duration::from_secs(
        run_timeout.saturating_add(config.execution.request_grace_seconds),
    ) + WAIT_MARGIN;

    let result = wait_for_execution(&mut events, generation, execution_wait).await?;
    print_result(&result);

    let exit = if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    };

    if no_feedback || source.code.trim().is_empty() {
        return Ok(exit);
    }

    println!();
    println!("Analyzing your code...");
    let feedback_wait = config.coordinator.debounce()
        + Duration::from_secs(config.feedback.request_timeout_seconds)
        + WAIT_MARGIN;
    let (tier, bundle) = wait_for_feedback(&mut events, feedback_wait).await?;
    tracing::debug!(tier = tier.level(), "Feedback received");
    print_feedback(&bundle);

    Ok(exit)
}

async fn wait_for_execution(
    events: &mut broadcast::Receiver<CoordinatorEvent>,
    generation: RequestGeneration,
    limit: Duration,
) -> anyhow::Result<ExecutionResult> {
    tokio::time::timeout(limit, async {
        loop {
            match events.recv().await {
                Ok(CoordinatorEvent::ExecutionCompleted(payload))
                    if payload.generation == generation =>
                {
                    return Ok(payload.result);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    anyhow::bail!("Coordinator stopped before the run completed");
                }
            }
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("Timed out waiting for the run to complete"))?
}

async fn wait_for_feedback(
    events: &mut broadcast::Receiver<CoordinatorEvent>,
    limit: Duration,
) -> anyhow::Result<(FeedbackTier, FeedbackBundle)> {
    tokio::time::timeout(limit, async {
        loop {
            match events.recv().await {
                Ok(CoordinatorEvent::FeedbackReady(payload)) => {
                    return Ok((payload.tier, payload.bundle));
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    anyhow::bail!("Coordinator stopped before feedback was ready");
                }
            }
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("Timed out waiting for feedback"))?
}

/// Prints an execution result.
fn print_result(result: &ExecutionResult) {
    println!("=== Output ===");
    for line in &result.output {
        println!("{line}");
    }

    if !result.errors.is_empty() {
        println!();
        println!("=== Errors ===");
        for line in &result.errors {
            println!("{line}");
        }
    }

    println!();
    println!("Completed in {:.3}s", result.execution_time_seconds);
}

/// Prints a feedback bundle.
fn print_feedback(bundle: &FeedbackBundle) {
    println!();
    println!("=== Suggestions ===");
    for (i, suggestion) in bundle.suggestions.iter().enumerate() {
        println!();
        println!("{}. [{}] {}", i + 1, suggestion.kind, suggestion.title);
        println!("   {}", suggestion.description);
        if let Some(example) = &suggestion.code_example {
            for line in example.lines() {
                println!("   | {line}");
            }
        }
    }

    if !bundle.learning_content.is_empty() {
        println!();
        println!("=== Learning ===");
        println!("{}", bundle.learning_content);
    }
}

// ============================================================================
// languages / health
// ============================================================================

async fn list_languages(config: &Config, remote: bool) -> anyhow::Result<ExitCode> {
    if remote {
        let client = ExecutionClient::new(config)?;
        println!("Languages enabled on {}:", client.base_url());
        for lang in client.supported_languages().await {
            println!("  {:<12} {:<12} {}", lang.id, lang.name, lang.description);
        }
    } else {
        println!("Built-in languages:");
        for lang in LanguageRegistry::builtin().all() {
            println!(
                "  {:<12} {:<12} {}",
                lang.id,
                lang.display_name,
                lang.file_name()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn check_health(config: &Config) -> anyhow::Result<ExitCode> {
    let client = ExecutionClient::new(config)?;
    if client.health().await {
        println!("Execution backend at {} is healthy", client.base_url());
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "Execution backend at {} is not healthy\n\nSuggestion: Check executionBackendUrl in edurun.json",
            client.base_url()
        );
        Ok(ExitCode::from(1))
    }
}

// ============================================================================
// serve
// ============================================================================

async fn serve(config: Config, port: u16) -> anyhow::Result<ExitCode> {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();

    let state = AppState::from_config(config)?;
    let router = create_router(state);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("EduRun session server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, shutting down");
        })
        .await?;

    Ok(ExitCode::SUCCESS)
}

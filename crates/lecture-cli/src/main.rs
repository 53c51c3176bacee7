//! Lecture Me CLI
//!
//! Serves the quiz over HTTP, or runs it interactively on the console.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use lecture_core::{
    build_gateway, create_router, AppState, Config, Dice, QuizEngine, QuizInput, Reply, UserId,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// User id for the console session.
const CONSOLE_USER: &str = "console";

/// Lecture Me - quiz yourself on your own notes
///
/// Scans a notes directory laid out as <subject>/<topic>/<unit>.md, asks
/// questions about random passages and scores your answers.
#[derive(Parser, Debug)]
#[command(name = "lecture-me")]
#[command(version, about, long_about = None)]
struct Args {
    /// Notes directory (overrides notesDirectory from the config file)
    #[arg(value_name = "NOTES_DIR")]
    notes_dir: Option<String>,

    /// Path to configuration file (default: lecture-me.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Port for the HTTP API server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seed for passage selection and score perturbation
    #[arg(long)]
    seed: Option<u64>,

    /// Chat on the console instead of serving HTTP
    #[arg(long)]
    console: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
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

    tracing::info!("Lecture Me starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref notes_dir) = args.notes_dir {
        config.notes_directory.clone_from(notes_dir);
    }
    if args.seed.is_some() {
        config.random_seed = args.seed;
    }

    // Re-validate after overrides
    config.validate()?;

    if !Path::new(&config.notes_directory).is_dir() {
        anyhow::bail!(
            "Notes directory not found: '{}'\n\nSuggestion: Pass the notes folder as the first argument or set notesDirectory in lecture-me.json",
            config.notes_directory
        );
    }

    let dice = Arc::new(Dice::from_seed_option(config.random_seed));
    let gateway = build_gateway(&config.gateway, Arc::clone(&dice))?;
    let engine = Arc::new(QuizEngine::from_config(&config, gateway, dice));

    print_config(&config, &engine).await;

    if args.console {
        run_console(&engine).await
    } else {
        serve(engine, args.port).await
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

async fn serve(engine: Arc<QuizEngine>, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let router = create_router(AppState::new(engine));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    Ok(())
}

/// Reads one message per line from stdin and prints each reply.
///
/// Typing the number of a listed option sends that option's label.
async fn run_console(engine: &QuizEngine) -> anyhow::Result<()> {
    let user = UserId::from(CONSOLE_USER);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut options: Vec<String> = Vec::new();

    print_reply(&engine.handle(&user, QuizInput::Restart).await, &mut options);

    while let Some(line) = lines.next_line().await? {
        let message = resolve_option(line.trim(), &options);
        if message.is_empty() {
            continue;
        }
        if message == "/quit" || message == "/exit" {
            break;
        }
        let reply = engine.handle(&user, QuizInput::from_message(&message)).await;
        print_reply(&reply, &mut options);
    }

    println!("Bye!");
    Ok(())
}

/// Maps a bare option number to its label; other input passes through.
fn resolve_option(input: &str, options: &[String]) -> String {
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i))
        .map_or_else(|| input.to_string(), Clone::clone)
}

fn print_reply(reply: &Reply, options: &mut Vec<String>) {
    println!();
    println!("{}", reply.text);
    options.clear();
    if let Some(ref keyboard) = reply.keyboard {
        println!();
        for (i, label) in keyboard.iter().enumerate() {
            println!("  {}. {label}", i + 1);
        }
        options.extend(keyboard.iter().cloned());
    }
    println!();
}

async fn print_config(config: &Config, engine: &QuizEngine) {
    println!("Configuration loaded:");
    println!("  Notes directory: {}", config.notes_directory);
    println!("  Gateway: {}", engine.gateway().name());
    println!("  Max score: {}", config.gateway.max_score);
    println!("  Timeout: {}s", config.gateway.timeout_seconds);
    match engine.subject_names().await {
        Ok(names) if names.is_empty() => println!("  Subjects: none found"),
        Ok(names) => println!("  Subjects: {}", names.join(", ")),
        Err(e) => tracing::warn!(error = %e, "Failed to scan notes directory"),
    }
}

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use campus_chat_core::render::render_document;
use campus_chat_core::{ChatSession, Config, Entry, SendOutcome, ERROR_TEXT};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

const DEFAULT_LOG_FILTER: &str = "campus_chat=info,campus_chat_core=info";

#[derive(Parser)]
#[command(name = "campus-chat", version)]
#[command(about = "Chat with the campus assistant from the terminal")]
struct Cli {
    /// API base URL, e.g. https://chat.example.edu/api
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Origin the client is served from; its /api path is used when no URL is given
    #[arg(long, global = true)]
    origin: Option<String>,
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and print the answer
    Ask {
        /// Your question
        #[arg(required = true)]
        question: Vec<String>,
        /// Print the conversation as an HTML document
        #[arg(long)]
        html: bool,
    },
    /// Show the resolved configuration, or write it out with --init
    Config {
        /// Save the configuration to the config file
        #[arg(long)]
        init: bool,
        /// Overwrite an existing config file
        #[arg(long, requires = "init")]
        force: bool,
    },
}

enum LogSink {
    File(File),
    Stderr,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let sink = match cli.command {
        Some(Commands::Ask { .. }) | Some(Commands::Config { .. }) => LogSink::Stderr,
        None => open_log_file().map(LogSink::File).unwrap_or(LogSink::Off),
    };
    init_tracing(sink);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load config")?;
    config.apply_env(|key| std::env::var(key).ok());
    apply_cli_overrides(&cli, &mut config);

    match cli.command {
        Some(Commands::Ask { question, html }) => run_ask(&config, &question.join(" "), html).await,
        Some(Commands::Config { init, force }) => run_config(&config, cli.config.as_deref(), init, force),
        None => run_tui(&config).await,
    }
}

fn init_tracing(sink: LogSink) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = match sink {
            LogSink::Off => EnvFilter::new("off"),
            _ => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        };
        let builder = fmt().with_env_filter(filter).with_target(false).with_level(true);
        match sink {
            // The TUI owns the terminal, so its logs go to a file
            LogSink::File(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
            LogSink::Stderr | LogSink::Off => builder.with_writer(std::io::stderr).init(),
        }
    });
}

fn open_log_file() -> Option<File> {
    let dir = Config::config_dir().ok()?;
    fs::create_dir_all(&dir).ok()?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("campus-chat.log"))
        .ok()
}

fn apply_cli_overrides(cli: &Cli, config: &mut Config) {
    if let Some(url) = &cli.api_url {
        info!(url = %url, "Overriding API URL based on CLI flag");
        config.api_url = Some(url.clone());
    }
    if let Some(origin) = &cli.origin {
        config.origin = Some(origin.clone());
    }
}

fn run_config(config: &Config, path: Option<&Path>, init: bool, force: bool) -> Result<()> {
    if !init {
        println!("{}", serde_json::to_string_pretty(config)?);
        println!("# resolved API URL: {}", config.api_url()?);
        return Ok(());
    }

    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };
    if write_config(config, &path, force)? {
        println!("Wrote {}", path.display());
    } else {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Ok(())
}

/// Saves `config` to `path`. Returns false when the file exists and `force` is unset.
fn write_config(config: &Config, path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    config.save_to(path)?;
    info!(path = %path.display(), "config written");
    Ok(true)
}

async fn run_ask(config: &Config, question: &str, html: bool) -> Result<()> {
    let api_url = config.api_url()?;
    info!(%api_url, "asking a single question");

    let mut session = ChatSession::new(Arc::new(config.client()?), config.session_options());
    if !matches!(session.send_message(question), SendOutcome::Sent(_)) {
        bail!("question is empty");
    }
    session.settle().await;

    if html {
        println!("{}", render_document("Campus Assistant", session.entries()));
    } else {
        print_answer(&session);
    }

    if session.entries().iter().any(|e| matches!(e, Entry::Error)) {
        bail!("{ERROR_TEXT} ({api_url})");
    }
    Ok(())
}

fn print_answer(session: &ChatSession) {
    // The first message is the question itself
    for message in session.messages().skip(1) {
        if message.is_follow_up {
            println!();
        }
        println!("{}", message.content);

        let sources = message.listed_sources();
        if !sources.is_empty() {
            println!("\nSources:");
            for (i, source) in sources.iter().enumerate() {
                println!("  {}. {}", i + 1, source);
            }
        }
    }
}

async fn run_tui(config: &Config) -> Result<()> {
    let api_url = config.api_url()?;
    let session = ChatSession::new(Arc::new(config.client()?), config.session_options());
    let export_dir = match dirs::document_dir() {
        Some(dir) => dir.join("campus-chat"),
        None => Config::config_dir()?.join("transcripts"),
    };
    info!(%api_url, export_dir = %export_dir.display(), "starting terminal client");

    let mut app = App::new(session, api_url, config.presets.clone(), export_dir);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = event_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    if let Err(err) = &result {
        warn!(error = %err, "terminal client stopped with an error");
    }
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            Some(event) = events.next() => handler::handle_event(app, event)?,
            Some(event) = app.session.next_event() => app.apply_session_event(event),
            else => break,
        }
    }
    Ok(())
}

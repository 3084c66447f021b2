// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::ai::connector::ChatRequest;
use crate::ai::local_model::LocalModel;
use crate::ai::reply::ReplyText;
use crate::ai::ProviderRegistry;
use crate::app::{App, Reply, Services};
use crate::chat::event::MessageEvent;
use crate::chat::onebot::{MessageLookup, OneBotClient};
use crate::config::{PluginConfig, ProviderKind, DEFAULT_OLLAMA_URL};
use crate::portrait::avatar::HttpImageFetcher;
use crate::portrait::gemini::GeminiImageClient;
use crate::portrait::matte::{matte_bytes, ChromaKeySpec};

mod ai;
mod app;
mod chat;
mod config;
mod options;
mod portrait;
mod render;

#[derive(Parser)]
#[command(name = "galchoice")]
#[command(about = "GalGame-style dialogue choices for chat bots", long_about = None)]
struct Cli {
    /// Plugin configuration (JSON)
    #[arg(long, global = true, default_value = "galchoice.json")]
    config: PathBuf,

    /// Directory holding backgrounds, cached portraits and rendered scenes
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate options for a message
    Options {
        /// Message text, e.g. "/gal 她转过身来 4"
        text: Option<String>,

        /// OneBot message event JSON file ("-" for stdin)
        #[arg(long, conflicts_with = "text")]
        event: Option<PathBuf>,

        /// Option count used when the message carries none
        #[arg(long, short = 'n')]
        count: Option<usize>,

        /// Render a scene instead of replying with text
        #[arg(long)]
        render: bool,

        /// Where to write the rendered scene
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Regenerate the sender's character portrait
    RefreshPortrait {
        /// OneBot message event JSON file ("-" for stdin)
        #[arg(long, required_unless_present = "user")]
        event: Option<PathBuf>,

        /// Sender id, when no event is given
        #[arg(long)]
        user: Option<String>,

        /// Sender display name, when no event is given
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Chroma-key an image file and write a transparent PNG
    Matte {
        input: PathBuf,
        output: PathBuf,

        /// Key color as #RRGGBB (default: chroma_bg_color from config)
        #[arg(long)]
        color: Option<String>,

        /// Euclidean RGB tolerance (default: chroma_tolerance from config)
        #[arg(long)]
        tolerance: Option<u32>,
    },
    /// Normalize raw option text into labelled lines
    Normalize {
        #[arg(long, short = 'n', default_value_t = 3)]
        count: usize,

        /// Input file (default: stdin)
        file: Option<PathBuf>,
    },
    /// Send a test prompt to the selected provider
    CheckProvider {
        /// Provider id (default: provider_id from config)
        #[arg(long)]
        provider: Option<String>,
    },
    /// List models of the configured Ollama providers
    ListModels {
        /// Ollama server URL (default: config, then OLLAMA_HOST)
        #[arg(long)]
        ollama_url: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info")
    );

    let cli = Cli::parse();
    let mut cfg = PluginConfig::load(&cli.config)?;

    match cli.command {
        Commands::Options { text, event, count, render, out } => {
            if let Some(count) = count {
                cfg.option_count = count;
            }
            if render {
                cfg.render_image = true;
            }
            run_options(&cfg, &cli.data_dir, text, event, out)
        }
        Commands::RefreshPortrait { event, user, name } => {
            let event = match (event, user) {
                (Some(path), _) => MessageEvent::load(&path)?,
                (None, Some(user)) => MessageEvent::from_text("刷新立绘", &user, &name),
                (None, None) => anyhow::bail!("Either --event or --user is required"),
            };
            run_refresh(&cfg, &cli.data_dir, &event)
        }
        Commands::Matte { input, output, color, tolerance } => {
            let color = color.unwrap_or_else(|| cfg.chroma_bg_color.clone());
            let tolerance = tolerance.unwrap_or(cfg.chroma_tolerance);
            run_matte(&input, &output, &color, tolerance)
        }
        Commands::Normalize { count, file } => run_normalize(count, file),
        Commands::CheckProvider { provider } => check_provider(&cfg, provider),
        Commands::ListModels { ollama_url } => list_ollama_models(&cfg, ollama_url),
    }
}

fn get_ollama_url(url_arg: Option<String>) -> String {
    url_arg.unwrap_or_else(|| {
        std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string())
    })
}

fn build_registry(cfg: &PluginConfig) -> Result<ProviderRegistry> {
    let ollama_host = get_ollama_url(None);
    ProviderRegistry::from_config(cfg, Some(&ollama_host))
}

fn build_lookup(cfg: &PluginConfig) -> Option<OneBotClient> {
    let base = cfg.onebot_api_base.as_deref()?.trim();
    if base.is_empty() {
        return None;
    }
    match OneBotClient::new(base, cfg.onebot_access_token.as_deref()) {
        Ok(client) => Some(client),
        Err(e) => {
            error!("Failed to create OneBot client: {}", e);
            None
        }
    }
}

/// Build the network clients and hand an `App` to `f`
fn with_app<T>(cfg: &PluginConfig, data_dir: &Path, f: impl FnOnce(&App<'_>) -> T) -> Result<T> {
    let registry = build_registry(cfg)?;
    let lookup = build_lookup(cfg);
    let fetcher = HttpImageFetcher::new()?;
    let generator = GeminiImageClient::from_config(cfg)?;
    let services = Services {
        registry: &registry,
        lookup: lookup.as_ref().map(|client| client as &dyn MessageLookup),
        fetcher: &fetcher,
        generator: &generator,
    };
    let app = App::new(cfg, data_dir, services);
    Ok(f(&app))
}

fn run_options(
    cfg: &PluginConfig,
    data_dir: &Path,
    text: Option<String>,
    event: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<()> {
    let from_file = event.is_some();
    let event = match event {
        Some(path) => MessageEvent::load(&path)?,
        None => MessageEvent::from_text(text.as_deref().unwrap_or_default(), "0", ""),
    };

    let reply = with_app(cfg, data_dir, |app| {
        if from_file && !app.accepts(&event) {
            warn!("Event text does not start with an option command, ignoring");
            return None;
        }
        Some(app.make_options(&event, out.as_deref()))
    })?;

    match reply {
        Some(Reply::Text(text)) => println!("{}", text),
        Some(Reply::Image(path)) => println!("{}", path.display()),
        None => {}
    }
    Ok(())
}

fn run_refresh(cfg: &PluginConfig, data_dir: &Path, event: &MessageEvent) -> Result<()> {
    let message = with_app(cfg, data_dir, |app| app.refresh_portrait(event))?;
    println!("{}", message);
    Ok(())
}

fn run_matte(input: &Path, output: &Path, color: &str, tolerance: u32) -> Result<()> {
    let spec = ChromaKeySpec::from_hex(color, tolerance)?;
    info!("Keying {} against {} (tolerance {})", input.display(), color, tolerance);

    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let png = matte_bytes(&bytes, &spec)?;
    std::fs::write(output, png)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("✓ Matte saved to: {}", output.display());
    Ok(())
}

fn run_normalize(count: usize, file: Option<PathBuf>) -> Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    for line in options::normalize_options(&raw, count) {
        println!("{}", line);
    }
    Ok(())
}

fn check_provider(cfg: &PluginConfig, provider: Option<String>) -> Result<()> {
    let registry = build_registry(cfg)?;
    println!("Configured providers: {}", registry.ids().join(", "));

    let requested = provider.unwrap_or_else(|| cfg.provider_id.clone());
    let Some(connector) = registry.select(&requested) else {
        println!("✗ {}", options::NO_PROVIDER_MESSAGE);
        return Ok(());
    };

    let request = ChatRequest {
        prompt: "请只回复：OK".to_string(),
        model: cfg.model.clone(),
        ..ChatRequest::default()
    };
    match connector.text_chat(&request) {
        Ok(reply) => {
            println!("✓ Provider '{}' replied:", connector.id());
            println!("{}", ReplyText::decode(&reply).into_text());
        }
        Err(e) => {
            println!("✗ Provider '{}' failed", connector.id());
            println!("  Error: {:#}", e);
        }
    }
    Ok(())
}

fn list_ollama_models(cfg: &PluginConfig, ollama_url: Option<String>) -> Result<()> {
    let mut targets: Vec<(String, String, Option<String>)> = match ollama_url {
        Some(url) => vec![("ollama".to_string(), url, None)],
        None => cfg
            .providers
            .iter()
            .filter(|p| p.kind == ProviderKind::Ollama)
            .map(|p| {
                let url = p.base_url.clone().unwrap_or_else(|| get_ollama_url(None));
                (p.id.clone(), url, p.model.clone())
            })
            .collect(),
    };
    if targets.is_empty() {
        targets.push(("ollama".to_string(), get_ollama_url(None), None));
    }

    for (id, url, model) in targets {
        info!("Listing Ollama models at {}...", url);
        let local = LocalModel::new(&id, &url, model.as_deref())?;
        match local.list_models() {
            Ok(models) => {
                println!("\nModels at {} ({}):", local.url(), id);
                if models.is_empty() {
                    println!("  No models found");
                }
                for model in &models {
                    let size_gb = model.size as f64 / (1024.0 * 1024.0 * 1024.0);
                    println!("  - {} ({:.1} GB)", model.name, size_gb);
                }
                if !models.iter().any(|m| m.name == local.model_name()) {
                    println!("\nConfigured model {} is missing, run:", local.model_name());
                    println!("  ollama pull {}", local.model_name());
                }
            }
            Err(e) => {
                error!("Failed to connect to Ollama: {}", e);
                println!("\nMake sure Ollama is running: ollama serve");
            }
        }
    }
    Ok(())
}

//! boardsync - an offline communication board driven from the terminal.
//!
//! Keeps the board dataset and its icons available offline, checks a
//! configured endpoint for newer datasets, and composes sentences from the
//! board's tiles.

mod app;

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use boardsync_core::format::{age_display, format_bytes};
use boardsync_core::store::keys;
use boardsync_core::{
    Config, Fetcher, HttpFetcher, Request, SyncContext, UpdateOutcome, DYNAMIC_CACHE, STATIC_CACHE,
};

use app::{BoardApp, Tile};

// ============================================================================
// Constants
// ============================================================================

/// Directory for an additional daily-rolling log file
const LOG_DIR_ENV: &str = "BOARDSYNC_LOG_DIR";

const USAGE: &str = "\
Usage: boardsync <command> [args]

Commands:
  install                    Cache the application shell for offline use
  show                       Show the current dataset
  status                     Show sync and cache status
  set-source <url> [base]    Set the update endpoint and icon base URL
  check                      Check the update endpoint for a newer dataset
  fetch <url>                Fetch a URL through the offline cache
  board [category]           Show the board, optionally opening a category
  menu                       Return to the category menu
  add <text>                 Add a tile (or typed text) to the sentence
  remove <n>                 Remove the n-th word of the sentence
  back                       Remove the last word of the sentence
  clear                      Clear the sentence
  say                        Print the sentence with voice settings
  voice [rate pitch]         Show or set voice rate and pitch (0.5 - 2.0)";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Install,
    Show,
    Status,
    SetSource { url: String, base_url: String },
    Check,
    Fetch { url: String },
    Board { category: Option<String> },
    Menu,
    Add { text: String },
    Remove { index: usize },
    Back,
    Clear,
    Say,
    Voice { settings: Option<(f64, f64)> },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            bail!("No command given\n\n{}", USAGE);
        };
        let rest = &args[1..];
        let command = match name.as_str() {
            "install" => Command::Install,
            "show" => Command::Show,
            "status" => Command::Status,
            "set-source" => {
                let Some(url) = rest.first() else {
                    bail!("set-source needs a URL");
                };
                Command::SetSource {
                    url: url.clone(),
                    base_url: rest.get(1).cloned().unwrap_or_default(),
                }
            }
            "check" => Command::Check,
            "fetch" => {
                let Some(url) = rest.first() else {
                    bail!("fetch needs a URL");
                };
                Command::Fetch { url: url.clone() }
            }
            "board" => Command::Board {
                category: rest.first().cloned(),
            },
            "menu" => Command::Menu,
            "add" => {
                let text = rest.join(" ");
                if text.trim().is_empty() {
                    bail!("add needs some text");
                }
                Command::Add { text }
            }
            "remove" => {
                let position: usize = rest
                    .first()
                    .context("remove needs a position")?
                    .parse()
                    .context("position must be a number")?;
                if position == 0 {
                    bail!("positions start at 1");
                }
                Command::Remove {
                    index: position - 1,
                }
            }
            "back" => Command::Back,
            "clear" => Command::Clear,
            "say" => Command::Say,
            "voice" => match rest {
                [] => Command::Voice { settings: None },
                [rate, pitch] => Command::Voice {
                    settings: Some((
                        rate.parse().context("rate must be a number")?,
                        pitch.parse().context("pitch must be a number")?,
                    )),
                },
                _ => bail!("voice takes a rate and a pitch"),
            },
            "-h" | "--help" | "help" => bail!("{}", USAGE),
            other => bail!("Unknown command: {}\n\n{}", other, USAGE),
        };
        Ok(command)
    }
}

/// Initialize the tracing subscriber for logging.
///
/// RUST_LOG controls the level (default `warn`). Logs go to stderr, and also
/// to a daily file when `BOARDSYNC_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "boardsync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = Config::load().context("Failed to load config")?;
    let network = HttpFetcher::new(config.request_timeout()).context("Failed to build HTTP client")?;
    let ctx = SyncContext::new(config, Arc::new(network)).context("Invalid configuration")?;
    info!(?command, "boardsync starting");

    if command != Command::Install {
        ctx.resume().await.context("Failed to open caches")?;
    }

    let result = run(&ctx, command).await;
    if let Some(worker) = ctx.registration().active() {
        worker.settle().await;
    }
    result
}

async fn run(ctx: &SyncContext, command: Command) -> Result<()> {
    match command {
        Command::Install => {
            let count = ctx.install().await.context("Install failed")?;
            println!("Installed {} shell resources for {}", count, ctx.origin());
        }
        Command::Show => show(ctx).await?,
        Command::Status => status(ctx).await?,
        Command::SetSource { url, base_url } => {
            ctx.set_source(&url, &base_url)
                .await
                .context("Failed to save update source")?;
            println!("Update source set to {}", url.trim());
        }
        Command::Check => check(ctx).await?,
        Command::Fetch { url } => {
            let request = Request::get(&url)?;
            let response = ctx.registration().fetch(request).await?;
            println!(
                "{} {} ({}, {})",
                response.status,
                response.url,
                response.header("content-type").unwrap_or("unknown type"),
                format_bytes(response.body.len() as u64)
            );
        }
        command => board_command(ctx, command).await?,
    }
    Ok(())
}

async fn board_command(ctx: &SyncContext, command: Command) -> Result<()> {
    let mut board = BoardApp::load(ctx.store().clone(), &ctx.loader())
        .await
        .context("No dataset available")?;

    match command {
        Command::Board { category } => {
            if let Some(id) = category {
                board.open_category(&id).await?;
            }
            print_board(&board);
        }
        Command::Menu => {
            board.back_to_menu().await;
            print_board(&board);
        }
        Command::Add { text } => {
            board.add_item(&text).await;
            print_sentence(&board);
        }
        Command::Remove { index } => {
            if board.remove_at(index).await.is_none() {
                bail!("No word at position {}", index + 1);
            }
            print_sentence(&board);
        }
        Command::Back => {
            board.pop().await;
            print_sentence(&board);
        }
        Command::Clear => {
            board.clear().await;
            print_sentence(&board);
        }
        Command::Say => {
            let text = board.sentence_text();
            if text.is_empty() {
                println!("(nothing to say)");
            } else {
                println!(
                    "[{} rate {:.1} pitch {:.1}] {}",
                    board.voice.lang, board.voice.rate, board.voice.pitch, text
                );
            }
        }
        Command::Voice { settings } => {
            if let Some((rate, pitch)) = settings {
                board.set_voice(rate, pitch).await;
            }
            println!(
                "Voice {}: rate {:.1}, pitch {:.1}",
                board.voice.lang, board.voice.rate, board.voice.pitch
            );
        }
        other => bail!("Not a board command: {:?}", other),
    }
    Ok(())
}

async fn show(ctx: &SyncContext) -> Result<()> {
    let (dataset, source) = ctx
        .loader()
        .load_current_with_source()
        .await
        .context("No dataset available")?;
    println!(
        "Dataset v{} ({:?}), exported {}",
        dataset.version,
        source,
        if dataset.exported_at.is_empty() { "-" } else { dataset.exported_at.as_str() }
    );
    for category in &dataset.categories {
        println!(
            "  {:<16} {:<24} {} items",
            category.id,
            category.label,
            dataset.items_in(&category.id).count()
        );
    }
    println!("  {} items total", dataset.items.len());
    Ok(())
}

async fn status(ctx: &SyncContext) -> Result<()> {
    let store = ctx.store();
    match ctx.registration().active_version() {
        Some(version) => println!("Offline shell: {} ({})", version, ctx.origin()),
        None => println!("Offline shell: not installed"),
    }

    let url = store.get_as::<String>(keys::UPDATES_URL).await?.unwrap_or_default();
    let base = store.get_as::<String>(keys::UPDATES_BASE_URL).await?.unwrap_or_default();
    println!(
        "Update source: {}",
        if url.is_empty() { "not configured" } else { url.as_str() }
    );
    if !base.is_empty() {
        println!("Icon base URL: {}", base);
    }

    match store.record(keys::SEED_UPDATED).await {
        Ok(Some(record)) => {
            let version = record.value.get("version").and_then(|v| v.as_i64()).unwrap_or(0);
            println!("Updated dataset: v{} (saved {})", version, age_display(record.updated_at));
        }
        Ok(None) => println!("Updated dataset: none, using bundled"),
        Err(e) => println!("Updated dataset: unreadable ({})", e),
    }

    println!("Cache dir: {}", ctx.caches().root().display());
    for name in [STATIC_CACHE, DYNAMIC_CACHE] {
        let partition = ctx.caches().open(name).await?;
        let stats = partition.stats().await?;
        let newest = partition
            .entries()
            .await?
            .into_iter()
            .max_by_key(|entry| entry.cached_at)
            .map(|entry| format!(", newest {}", entry.age_display()))
            .unwrap_or_default();
        println!(
            "Cache {}: {} entries, {}{}",
            stats.name,
            stats.entries,
            format_bytes(stats.bytes),
            newest
        );
    }
    Ok(())
}

async fn check(ctx: &SyncContext) -> Result<()> {
    let loader = ctx.loader();
    let board = BoardApp::load(ctx.store().clone(), &loader).await.ok();
    let coordinator = ctx.coordinator().await.context("Failed to open caches")?;
    let outcome = coordinator.check_configured().await;
    match &outcome {
        UpdateOutcome::NotConfigured => {
            println!("No update source configured. Use `boardsync set-source <url>`.")
        }
        UpdateOutcome::NoUpdate { current_version } => {
            println!("Up to date (v{})", current_version)
        }
        UpdateOutcome::Applied {
            version,
            exported_at,
            icons_fetched,
            icons_failed,
        } => {
            println!(
                "Updated to v{} ({}), {} icons cached, {} failed",
                version, exported_at, icons_fetched, icons_failed
            );
        }
        UpdateOutcome::Failed { message } => bail!("Update failed: {}", message),
    }

    if outcome.requires_reload() {
        let board = match board {
            Some(mut board) => {
                board.reload(&loader).await?;
                board
            }
            None => BoardApp::load(ctx.store().clone(), &loader).await?,
        };
        println!(
            "Board reloaded: {} categories, {} items",
            board.dataset.categories.len(),
            board.dataset.items.len()
        );
    }
    Ok(())
}

fn print_board(board: &BoardApp) {
    match board.active_category.as_deref().and_then(|id| board.dataset.category(id)) {
        Some(category) => println!("== {} ==", category.label),
        None => println!("== Menu =="),
    }
    for (i, tile) in board.tiles().iter().enumerate() {
        match tile {
            Tile::Category { id, label } => println!("{:>3}. [{}] {}", i + 1, id, label),
            Tile::Item { text, icon: Some(icon) } => println!("{:>3}. {} <{}>", i + 1, text, icon),
            Tile::Item { text, icon: None } => println!("{:>3}. {}", i + 1, text),
        }
    }
    print_sentence(board);
}

fn print_sentence(board: &BoardApp) {
    if board.sentence.is_empty() {
        println!("Sentence: (empty)");
    } else {
        println!("Sentence: {}", board.sentence_text());
    }
}

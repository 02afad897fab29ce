//! CLI parsing and orchestration. Parses args, runs the download stages, writes the EPUB.
//! Maps errors to exit codes.

use crate::config::{self, Config, ConfigError};
use crate::ellu::{
    assemble, parse_page_url, scrape_book, site_origin, Fetch, PoliteClient, ReaderError,
    ScrapeOptions, SESSION_COOKIE,
};
use crate::epub::{EpubBuilder, EpubError, EpubOptions, EpubVersion};
use clap::Parser;
use reqwest::Url;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DELAY_SECS: u64 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LANGUAGE: &str = "en";

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Epub(#[from] EpubError),

    #[error("{0}")]
    Validation(String),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Config(_) => 1,
            CliRunError::Reader(_) => 2,
            CliRunError::Epub(_) | CliRunError::Validation(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ellu-dl")]
#[command(about = "Download a book from the Ellu web reader and write it as EPUB")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, request_delay_secs, timeout_secs, toc_page, language) are read from ./ellu-dl.toml or ~/.config/ellu-dl/config.toml. CLI flags override config."
)]
pub struct Args {
    /// Book page URL, e.g. https://www.ellu.ee/books/9789949123456/some-title
    pub url: String,

    /// Value of the "sid" session cookie.
    #[arg(long, env = "ELLU_COOKIE", hide_env_values = true)]
    pub cookie: String,

    /// Read from /reader-preview instead of /reader.
    #[arg(long)]
    pub preview: bool,

    /// Output path. Default: ./{title} ({id}).epub
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Generate EPUB 2 instead of EPUB 3.
    #[arg(long)]
    pub epub_2: bool,

    /// Include toc.ncx in EPUB 3 output for legacy readers (EPUB 2 always includes it).
    #[arg(long)]
    pub ncx: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Print verbose error chain.
    #[arg(long)]
    pub verbose: bool,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 1).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Resolve the book and its chapter list, print them and the output path without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// After writing, run epubcheck on the EPUB (epubcheck must be on PATH).
    #[arg(long)]
    pub validate: bool,
}

/// Effective settings after merging CLI flags, config file, and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub user_agent: Option<String>,
    pub delay_secs: u64,
    pub timeout_secs: u64,
    pub toc_page: bool,
    pub language: String,
}

impl Settings {
    pub fn resolve(args: &Args, config: Option<&Config>) -> Self {
        Settings {
            output_dir: config
                .and_then(|c| c.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            user_agent: args
                .user_agent
                .clone()
                .or_else(|| config.and_then(|c| c.user_agent.clone())),
            delay_secs: args
                .delay
                .or_else(|| config.and_then(|c| c.request_delay_secs))
                .unwrap_or(DEFAULT_DELAY_SECS),
            timeout_secs: args
                .timeout
                .or_else(|| config.and_then(|c| c.timeout_secs))
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            toc_page: config.and_then(|c| c.toc_page).unwrap_or(true),
            language: config
                .and_then(|c| c.language.clone())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        }
    }
}

/// Run epubcheck on the given EPUB path. Requires epubcheck on PATH.
fn validate_epub(path: &Path) -> Result<(), CliRunError> {
    let output = std::process::Command::new("epubcheck")
        .arg(path)
        .output()
        .map_err(|e| {
            CliRunError::Validation(format!(
                "Could not run epubcheck: {}. Is epubcheck installed and on PATH?",
                e
            ))
        })?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let msg = if stderr.is_empty() { stdout } else { stderr };
        Err(CliRunError::Validation(format!(
            "epubcheck reported errors:\n{}",
            msg.trim()
        )))
    }
}

/// Ensure output path parent exists.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

fn invalid_url(e: ReaderError) -> CliRunError {
    match e {
        ReaderError::InvalidUrl { input, reason } => CliRunError::InvalidInput(format!(
            "Expected a book page URL. Example: https://www.ellu.ee/books/9789949123456/... Invalid: {}: {}",
            input, reason
        )),
        other => CliRunError::Reader(other),
    }
}

/// Messages of `err` and each of its sources, outermost first.
pub fn error_chain(err: &dyn std::error::Error) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let page_url = parse_page_url(&args.url).map_err(invalid_url)?;
    if args.cookie.trim().is_empty() {
        return Err(CliRunError::InvalidInput(
            "Session cookie is empty. Pass --cookie or set ELLU_COOKIE.".to_string(),
        ));
    }

    let config = config::load_config()?;
    let settings = Settings::resolve(args, config.as_ref());

    let mut builder = PoliteClient::builder()
        .delay_secs(settings.delay_secs)
        .timeout_secs(settings.timeout_secs)
        .cookie(SESSION_COOKIE, args.cookie.trim(), &page_url);
    if let Some(ua) = &settings.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    let mut client = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    if let Some(path) = download(args, &page_url, &settings, &mut client)? {
        if args.validate {
            validate_epub(&path)?;
        }
        if !args.quiet {
            eprintln!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Run all stages against `client` and write the EPUB. Returns the written path,
/// or None for a dry run.
pub fn download(
    args: &Args,
    page_url: &Url,
    settings: &Settings,
    client: &mut dyn Fetch,
) -> Result<Option<PathBuf>, CliRunError> {
    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(
                    style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(n as u64);
        pb.set_message(format!("Fetching chapter {}/{}", n, total));
    };
    let progress: Option<&dyn Fn(u32, u32)> = if args.quiet { None } else { Some(&progress_cb) };

    let options = ScrapeOptions {
        preview: args.preview,
        progress,
        toc_only: args.dry_run,
    };
    let scraped = scrape_book(client, page_url, &options);
    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }
    let mut book = scraped?;

    if !args.quiet {
        eprintln!(
            "{} by {} (catalog number {}, book id {}), {} chapters",
            book.title,
            if book.author.is_empty() { "unknown author" } else { book.author.as_str() },
            book.catalog_number,
            book.id,
            book.chapters.len()
        );
    }

    let output_path = match &args.output {
        Some(p) => p.clone(),
        None => settings.output_dir.join(book.file_name()),
    };

    if args.dry_run {
        for chapter in &book.chapters {
            eprintln!("  [{}] {}", chapter.id, chapter.title);
        }
        eprintln!("Chapters: {}", book.chapters.len());
        eprintln!("Output: {}", output_path.display());
        return Ok(None);
    }

    validate_output_path(&output_path)?;

    let origin = site_origin(page_url)?;
    let mut epub = EpubBuilder::new(client);
    epub.set_title(book.title.clone());
    epub.set_author(book.author.clone());
    epub.set_identifier(book.catalog_number.to_string());
    epub.set_language(settings.language.clone());
    assemble(&mut book, &origin, &mut epub)?;

    let epub_options = EpubOptions {
        version: if args.epub_2 {
            EpubVersion::Epub2
        } else {
            EpubVersion::Epub3
        },
        include_ncx: args.ncx,
        include_toc_page: settings.toc_page,
    };
    epub.write(&output_path, &epub_options)?;
    Ok(Some(output_path))
}

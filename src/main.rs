// stepviz: line-by-line execution visualizer

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use eyre::{Context, Result};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stepviz::cache::SourceCache;
use stepviz::config::Config;
use stepviz::errors::TraceError;
use stepviz::language::Language;
use stepviz::logging::{self, LogTarget};
use stepviz::playback::{Playback, PlaybackOptions};
use stepviz::snapshot::{OutputEntry, Snapshot};
use stepviz::ui::App;

/// Step through a program and watch its stack, heap and output
#[derive(Debug, Parser)]
#[command(name = "stepviz", version, about)]
struct Cli {
    /// Source file to visualize; the cached buffer for --lang when omitted
    file: Option<PathBuf>,

    /// Language tag (javascript, python, java, c, cpp, csharp, go, kotlin,
    /// swift, php, rust, typescript); guessed from the file extension
    #[arg(long = "lang", value_name = "TAG")]
    lang: Option<Language>,

    /// Delay between played steps in milliseconds
    #[arg(long, value_name = "MS")]
    speed: Option<u64>,

    /// Configuration file instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// JavaScript function to call after the top-level code runs
    #[arg(long, value_name = "NAME")]
    entry: Option<String>,

    /// JSON argument for --entry, repeatable
    #[arg(long = "arg", value_name = "JSON")]
    args: Vec<String>,

    /// Step to completion and print one JSON object per step
    #[arg(long)]
    headless: bool,
}

#[derive(Serialize)]
struct StepRecord<'a> {
    step: usize,
    line: usize,
    snapshot: &'a Snapshot,
    output: Vec<&'a OutputEntry>,
}

#[derive(Serialize)]
struct FinalRecord<'a> {
    finished: bool,
    error: Option<&'a TraceError>,
    result: Option<&'a JsonValue>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = logging::init(if cli.headless {
        LogTarget::Stderr
    } else {
        LogTarget::File
    })?;

    let config = Config::load(cli.config.as_deref())?;
    let mut options = config.playback_options();
    if let Some(speed) = cli.speed {
        options.speed_ms = speed;
    }
    options.entry_point = cli.entry.clone();
    options.args = cli
        .args
        .iter()
        .map(|a| serde_json::from_str(a).with_context(|| format!("--arg is not valid JSON: {}", a)))
        .collect::<Result<_>>()?;

    let mut cache = match SourceCache::default_path() {
        Some(path) => SourceCache::open(path),
        None => SourceCache::in_memory(),
    };
    let (source, language) = load_source(&cli, &cache)?;
    if cli.file.is_some() {
        cache.set(language, source.clone());
    }
    tracing::info!(%language, headless = cli.headless, "starting");

    if cli.headless {
        return run_headless(options, source, language);
    }
    run_tui(options, source, language, cache)?;
    Ok(ExitCode::SUCCESS)
}

fn load_source(cli: &Cli, cache: &SourceCache) -> Result<(String, Language)> {
    let Some(path) = &cli.file else {
        let language = cli.lang.unwrap_or(Language::JavaScript);
        return Ok((cache.source_or_starter(language), language));
    };

    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let language = match cli.lang {
        Some(language) => language,
        None => path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
            .ok_or_else(|| {
                eyre::eyre!("Cannot tell the language of {}; pass --lang", path.display())
            })?,
    };
    Ok((source, language))
}

fn run_headless(options: PlaybackOptions, source: String, language: Language) -> Result<ExitCode> {
    let mut playback = Playback::new(options);
    playback.load(source, language);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut emitted: usize = 0;
    while playback.step_once() {
        // entries evicted from the log still count as emitted
        let log = playback.output();
        let skip = emitted.saturating_sub(log.dropped());
        let record = StepRecord {
            step: playback.steps_taken(),
            line: playback.active_line(),
            snapshot: playback.snapshot(),
            output: log.entries().skip(skip).collect(),
        };
        serde_json::to_writer(&mut out, &record)?;
        writeln!(out)?;
        emitted = log.dropped() + log.len();
    }

    let record = FinalRecord {
        finished: playback.is_finished(),
        error: playback.error(),
        result: playback.result(),
    };
    serde_json::to_writer(&mut out, &record)?;
    writeln!(out)?;

    Ok(if playback.error().is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_tui(options: PlaybackOptions, source: String, language: Language, cache: SourceCache) -> Result<()> {
    let mut playback = Playback::new(options);
    playback.load(source, language);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(playback, cache);
    let res = app.run(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.wrap_err("The terminal UI failed")
}

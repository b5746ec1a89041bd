use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use crate::config::Config;
use crate::engine::{LevelEngine, SessionSummary};
use crate::model::tick::Tick;
use crate::session::SessionCalendar;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: u64,
    pub malformed_lines: u64,
    pub ticks_accepted: u64,
    pub ticks_dropped: u64,
    pub sessions: u64,
}

/// Feeds JSON-lines ticks through `engine`, writing one JSON summary line per
/// finalized session. The open session is flushed at end of input.
pub fn replay<C, R, W>(
    engine: &mut LevelEngine<C>,
    mut input: R,
    out: &mut W,
) -> Result<ReplayStats>
where
    C: SessionCalendar,
    R: BufRead,
    W: Write,
{
    let mut stats = ReplayStats::default();
    let accepted_before = engine.ticks_accepted();
    let dropped_before = engine.ticks_dropped();

    let mut buf = Vec::new();
    let mut line_no = 0usize;
    loop {
        buf.clear();
        let read = input
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("failed to read line {}", line_no + 1))?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                stats.lines += 1;
                stats.malformed_lines += 1;
                tracing::warn!(
                    line = line_no,
                    error = %e,
                    "Skipping tick line with invalid UTF-8"
                );
                continue;
            }
        };
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        stats.lines += 1;
        let tick: Tick = match serde_json::from_str(line) {
            Ok(tick) => tick,
            Err(e) => {
                stats.malformed_lines += 1;
                tracing::warn!(line = line_no, error = %e, "Skipping malformed tick line");
                continue;
            }
        };
        if let Some(summary) = engine.process_tick(&tick) {
            write_summary(out, &summary)?;
            stats.sessions += 1;
        }
    }
    if let Some(summary) = engine.flush() {
        write_summary(out, &summary)?;
        stats.sessions += 1;
    }
    out.flush().context("failed to flush output")?;

    stats.ticks_accepted = engine.ticks_accepted() - accepted_before;
    stats.ticks_dropped = engine.ticks_dropped() - dropped_before;
    Ok(stats)
}

fn write_summary<W: Write>(out: &mut W, summary: &SessionSummary) -> Result<()> {
    let json = serde_json::to_string(summary).context("failed to serialize session summary")?;
    writeln!(out, "{}", json).context("failed to write session summary")
}

fn init_tracing(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .json()
        .try_init();
}

struct CliArgs {
    input: String,
    config: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Option<CliArgs>> {
    let mut input = None;
    let mut config = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "help" | "--help" | "-h" => return Ok(None),
            "--config" | "-c" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow!("`{}` requires a path argument", arg))?;
                config = Some(PathBuf::from(path));
            }
            other if input.is_none() => input = Some(other.to_string()),
            other => bail!("unexpected argument `{}`", other),
        }
    }
    let input = input.ok_or_else(|| anyhow!("missing tick file argument (use `-` for stdin)"))?;
    Ok(Some(CliArgs { input, config }))
}

fn print_usage() {
    println!("usage: delta-pivots <ticks.jsonl | -> [--config <path>]");
    println!();
    println!("Replays JSON-lines ticks ({{\"timestamp_ms\",\"price\",\"volume\",\"side\"}})");
    println!("and prints one JSON session summary per finalized session.");
}

pub fn run_cli(args: &[String]) -> Result<()> {
    let Some(cli) = parse_args(args)? else {
        print_usage();
        return Ok(());
    };

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    init_tracing(&config.logging.level);

    let engine_config = config.engine_config()?;
    let calendar = config.sessions.calendar()?;
    let mut engine =
        LevelEngine::new(engine_config, calendar).context("failed to build engine")?;

    tracing::info!(
        symbol = %config.instrument.symbol,
        tick_size = config.instrument.tick_size,
        input = %cli.input,
        "Starting replay"
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let stats = if cli.input == "-" {
        replay(&mut engine, io::stdin().lock(), &mut out)?
    } else {
        let path = Path::new(&cli.input);
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        replay(&mut engine, BufReader::new(file), &mut out)?
    };

    tracing::info!(
        lines = stats.lines,
        malformed = stats.malformed_lines,
        accepted = stats.ticks_accepted,
        dropped = stats.ticks_dropped,
        sessions = stats.sessions,
        "Replay complete"
    );
    Ok(())
}

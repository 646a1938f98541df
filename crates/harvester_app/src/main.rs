mod batch;
mod config_file;
mod logging;
mod run_ledger;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_core::{replay, HarvestResult, SourceConfig};
use harvester_engine::{
    bootstrap_from_config, load_archive, write_csv, write_json, AtomicFileWriter, CsvOptions,
    EngineEvent, EngineHandle, EngineOptions, FetchSettings, RawPageArchive, SessionBootstrap,
    SharedBootstrap,
};
use log::LevelFilter;

use crate::config_file::Overrides;
use crate::logging::LogDestination;
use crate::run_ledger::RunRecord;

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(about = "Harvest paginated hotel listings into CSV or JSON tables", long_about = None)]
struct Cli {
    /// Source configuration files (RON)
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Directory receiving the exports and the run ledger
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Stop after this many pages, overriding the source file
    #[arg(long)]
    max_pages: Option<u32>,

    /// Cancel a harvest running longer than this many seconds; rows so far are kept
    #[arg(long)]
    time_limit: Option<u64>,

    #[arg(long, default_value_t = ';')]
    delimiter: char,

    /// Omit the UTF-8 byte order mark from CSV files
    #[arg(long)]
    no_bom: bool,

    #[arg(long, value_enum, default_value_t = LogDestination::Both)]
    log: LogDestination,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,

    /// Only validate the source files
    #[arg(long)]
    check: bool,

    /// Fill a `{NAME}` placeholder of the sources, e.g. `--var checkin=2026-02-01`
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = config_file::parse_var)]
    vars: Vec<(String, String)>,

    /// Run each source once per row of this CSV or JSON export, into one table
    #[arg(long, value_name = "FILE")]
    for_each: Option<PathBuf>,

    /// Column of the --for-each file holding each row's key
    #[arg(long, default_value = "detail_url")]
    key_column: String,

    /// Var receiving the last path segment of each key
    #[arg(long, default_value = "hotel")]
    bind: String,

    /// Keep every fetched page as JSON in this directory
    #[arg(long, value_name = "DIR")]
    raw_dir: Option<PathBuf>,

    /// Normalize pages kept with --raw-dir again instead of fetching
    #[arg(long, value_name = "DIR", conflicts_with_all = ["raw_dir", "for_each"])]
    from_raw: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
    Both,
}

impl OutputFormat {
    fn csv(self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Both)
    }

    fn json(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Both)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::initialize(cli.log, cli.log_level);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        // Some harvest stopped before the end of its listing.
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            engine_error!("{:#}", err);
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every source was harvested to its natural end.
fn run(cli: &Cli) -> Result<bool> {
    let overrides = Overrides {
        max_pages: cli.max_pages,
        vars: cli.vars.iter().cloned().collect(),
    };
    let sources = cli
        .sources
        .iter()
        .map(|path| config_file::load_source(path, &overrides))
        .collect::<Result<Vec<_>>>()?;
    for config in &sources {
        config_file::check_source(config)?;
    }
    if cli.check {
        engine_info!("{} source file(s) are valid", sources.len());
        return Ok(true);
    }

    let keys = cli
        .for_each
        .as_deref()
        .map(|path| batch::read_keys(path, &cli.key_column))
        .transpose()?;
    if let Some(keys) = &keys {
        engine_info!("Batch of {} key(s) bound to {{{}}}", keys.len(), cli.bind);
    }

    let writer = AtomicFileWriter::new(cli.output_dir.clone());
    let mut ledger = run_ledger::load(&cli.output_dir);
    let mut all_complete = true;

    for config in sources {
        if let Some(previous) = ledger.last_for(&config.name) {
            engine_info!(
                "Previous run of {} finished {} with {} rows ({})",
                previous.source,
                previous.finished_utc,
                previous.rows,
                previous.terminal_reason
            );
        }
        let endpoint = config.endpoint.clone();
        let name = config.name.clone();
        let started = Utc::now();

        let outcome = match (&cli.from_raw, &keys) {
            (Some(dir), _) => replay_archive(&config, dir),
            (None, Some(keys)) => harvest_batch(&config, keys, cli).map(|(result, failed)| {
                if failed > 0 {
                    all_complete = false;
                }
                result
            }),
            (None, None) => harvest(config, cli, None),
        };
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                engine_error!("Harvest of {} failed: {:#}", name, err);
                all_complete = false;
                continue;
            }
        };
        if !result.reason.is_complete() {
            engine_warn!(
                "Harvest of {} is partial: {} after {} pages",
                name,
                result.reason,
                result.pages
            );
            all_complete = false;
        }

        let outputs = export(&result, &writer, &endpoint, cli)?;
        ledger.record(RunRecord::new(&result, &endpoint, started, outputs));
        run_ledger::save(&cli.output_dir, &ledger);
    }

    Ok(all_complete)
}

/// One live harvest. `bootstrap` replaces the one the source names.
fn harvest(
    config: SourceConfig,
    cli: &Cli,
    bootstrap: Option<Box<dyn SessionBootstrap>>,
) -> Result<HarvestResult> {
    let name = config.name.clone();
    let time_limit = cli.time_limit.map(Duration::from_secs);
    let options = EngineOptions {
        settings: FetchSettings::default(),
        bootstrap,
        archive: cli
            .raw_dir
            .as_ref()
            .map(|dir| RawPageArchive::new(dir.clone(), &config)),
    };
    let engine = EngineHandle::launch(config, options)
        .with_context(|| format!("failed to start harvest of {name}"))?;
    let started = Instant::now();
    let mut cancelled = false;

    while !engine.is_finished() {
        if let Some(event) = engine.recv_timeout(EVENT_POLL_INTERVAL) {
            report(&event);
        }
        if !cancelled && time_limit.is_some_and(|limit| started.elapsed() >= limit) {
            engine_warn!("Time limit reached for {}; cancelling", name);
            engine.cancel();
            cancelled = true;
        }
    }
    while let Some(event) = engine.try_recv() {
        report(&event);
    }

    Ok(engine.join()?)
}

/// Harvests `config` once per key with the key's last path segment bound to
/// `--bind`. All harvests share one bootstrapped session and fold into one
/// result. A failing key is logged and skipped; their count is returned.
fn harvest_batch(
    config: &SourceConfig,
    keys: &[String],
    cli: &Cli,
) -> Result<(HarvestResult, usize)> {
    let shared = SharedBootstrap::new(bootstrap_from_config(
        &config.bootstrap,
        &FetchSettings::default(),
    ));
    let mut combined = None;
    let mut failed = 0;
    for (index, key) in keys.iter().enumerate() {
        let Some(value) = batch::bound_value(key) else {
            engine_warn!("Skipping key {:?} without a path segment", key);
            failed += 1;
            continue;
        };
        engine_info!(
            "{}: {}={} ({}/{})",
            config.name,
            cli.bind,
            value,
            index + 1,
            keys.len()
        );
        let bound = batch::bind(config, &cli.bind, &value);
        match harvest(bound, cli, Some(Box::new(shared.clone()))) {
            Ok(result) => fold(&mut combined, result),
            Err(err) => {
                engine_error!("{}={} failed: {:#}", cli.bind, value, err);
                failed += 1;
            }
        }
    }
    let result = combined.with_context(|| format!("no harvest of {} succeeded", config.name))?;
    Ok((result, failed))
}

/// Re-normalizes every archived run of `config` under `dir` into one result.
fn replay_archive(config: &SourceConfig, dir: &Path) -> Result<HarvestResult> {
    let runs = load_archive(dir, &config.name)
        .with_context(|| format!("failed to read page archive {}", dir.display()))?;
    let mut combined = None;
    for run in runs {
        engine_info!("Replaying {} page(s) of {}", run.pages.len(), run.run);
        fold(&mut combined, replay(config, run.pages)?);
    }
    combined.with_context(|| {
        format!(
            "no archived pages of {} under {}",
            config.name,
            dir.display()
        )
    })
}

fn fold(combined: &mut Option<HarvestResult>, result: HarvestResult) {
    match combined {
        Some(total) => total.append(result),
        None => *combined = Some(result),
    }
}

fn report(event: &EngineEvent) {
    match event {
        EngineEvent::BootstrapCompleted {
            source,
            credentials,
        } => engine_info!("{}: session ready with {} credential(s)", source, credentials),
        EngineEvent::PageCompleted(view) => match view.declared_total {
            Some(total) => engine_info!(
                "{}: {} page(s), {} rows of {} declared, {} duplicates skipped",
                view.source,
                view.pages,
                view.rows,
                total,
                view.duplicates_skipped
            ),
            None => engine_info!(
                "{}: {} page(s), {} rows, {} duplicates skipped",
                view.source,
                view.pages,
                view.rows,
                view.duplicates_skipped
            ),
        },
        EngineEvent::FetchFailed {
            cursor,
            attempt,
            error,
        } => engine_warn!("Fetch at {} failed (attempt {}): {}", cursor, attempt, error),
        EngineEvent::HarvestFinished {
            source,
            reason,
            pages,
            rows,
        } => engine_info!(
            "{}: finished with {} ({} pages, {} rows)",
            source,
            reason,
            pages,
            rows
        ),
    }
}

fn export(
    result: &HarvestResult,
    writer: &AtomicFileWriter,
    endpoint: &str,
    cli: &Cli,
) -> Result<Vec<PathBuf>> {
    let mut outputs = Vec::new();
    if cli.format.csv() {
        let options = CsvOptions {
            delimiter: cli.delimiter,
            bom: !cli.no_bom,
        };
        let summary = write_csv(result, writer, endpoint, &options)
            .with_context(|| format!("failed to write CSV for {}", result.source))?;
        engine_info!("Wrote {} rows to {:?}", summary.rows, summary.path);
        outputs.push(summary.path);
    }
    if cli.format.json() {
        let summary = write_json(result, writer, endpoint)
            .with_context(|| format!("failed to write JSON for {}", result.source))?;
        engine_info!("Wrote {} rows to {:?}", summary.rows, summary.path);
        outputs.push(summary.path);
    }
    Ok(outputs)
}

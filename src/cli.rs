use crate::{
    config::AppConfig,
    filter::ModFilter,
    log::{self, CliVerbosity, LogLevel, Logger},
    paths::{PathList, PathStyle},
    remover::{self, FailureStage, FileFailure, RemovalReport, RemoveOptions},
};
use anyhow::{anyhow, bail, Result};
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use std::{
    io::{self, IsTerminal},
    path::PathBuf,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CliAction {
    Help,
    Version,
    Remove(RemoveArgs),
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RemoveArgs {
    name: Option<String>,
    workshop_id: Option<String>,
    paths: Vec<String>,
    stdin: bool,
    dropped: bool,
    dry_run: bool,
    format: Option<OutputFormat>,
    verbosity: Option<CliVerbosity>,
    config: Option<PathBuf>,
    no_log_file: bool,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        CliAction::Help => {
            print_help();
            Ok(())
        }
        CliAction::Version => {
            println!("modscrub v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliAction::Remove(args) => run_removal(args).map(|_| ()),
    }
}

fn parse_args(args: &[String]) -> Result<CliAction> {
    if args.is_empty() {
        return Ok(CliAction::Help);
    }

    let mut parsed = RemoveArgs::default();
    let mut stop_parsing = false;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if stop_parsing {
            parsed.paths.push(arg.to_string());
            continue;
        }

        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };

        match flag {
            "--" => stop_parsing = true,
            "-h" | "--help" => return Ok(CliAction::Help),
            "-V" | "--version" => return Ok(CliAction::Version),
            "-n" | "--name" => parsed.name = Some(option_value(flag, inline, &mut iter)?),
            "-w" | "--workshop-id" => {
                parsed.workshop_id = Some(option_value(flag, inline, &mut iter)?);
            }
            "--stdin" => parsed.stdin = true,
            "--dropped" => parsed.dropped = true,
            "--dry-run" => parsed.dry_run = true,
            "--no-log-file" => parsed.no_log_file = true,
            "--format" => {
                let value = option_value(flag, inline, &mut iter)?;
                let format = OutputFormat::parse(&value)
                    .ok_or_else(|| anyhow!("Unknown format: {value} (use 'text' or 'json')"))?;
                parsed.format = Some(format);
            }
            "--config" => {
                parsed.config = Some(PathBuf::from(option_value(flag, inline, &mut iter)?));
            }
            "-q" | "--quiet" => parsed.verbosity = Some(CliVerbosity::Quiet),
            "--verbose" => parsed.verbosity = Some(CliVerbosity::Verbose),
            "--verbosity" => {
                let level = option_value(flag, inline, &mut iter)?;
                let verbosity = CliVerbosity::parse(&level)
                    .ok_or_else(|| anyhow!("Unknown verbosity: {level}"))?;
                parsed.verbosity = Some(verbosity);
            }
            _ if is_short_verbose(flag) => {
                let count = flag.chars().filter(|ch| *ch == 'v').count();
                parsed.verbosity = Some(if count >= 2 {
                    CliVerbosity::Debug
                } else {
                    CliVerbosity::Verbose
                });
            }
            _ if flag.starts_with('-') && flag.len() > 1 => bail!("Unknown option: {arg}"),
            _ => parsed.paths.push(arg.to_string()),
        }
    }

    Ok(CliAction::Remove(parsed))
}

fn option_value<'a, I>(flag: &str, inline: Option<String>, iter: &mut I) -> Result<String>
where
    I: Iterator<Item = &'a String>,
{
    if let Some(value) = inline {
        return Ok(value);
    }
    iter.next()
        .map(|value| value.to_string())
        .ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn is_short_verbose(flag: &str) -> bool {
    flag.len() > 1
        && flag.starts_with('-')
        && !flag.starts_with("--")
        && flag[1..].chars().all(|ch| ch == 'v')
}

fn run_removal(args: RemoveArgs) -> Result<Option<RemovalReport>> {
    let config = AppConfig::load(args.config.as_deref())?;
    let verbosity = args.verbosity.unwrap_or(config.verbosity);
    let format = args.format.unwrap_or(config.format);
    let dry_run = args.dry_run || config.dry_run;
    let log_path = if config.log_to_file && !args.no_log_file {
        log::default_log_path().ok()
    } else {
        None
    };
    let logger = Logger::new(verbosity, log_path);

    let filter = ModFilter::new(args.name.as_deref(), args.workshop_id.as_deref())?;

    let style = if args.dropped {
        PathStyle::Dropped
    } else {
        PathStyle::Literal
    };
    let mut paths = PathList::new();
    for raw in &args.paths {
        paths.push_as(raw, style);
    }
    if args.stdin {
        let added = paths.extend_from_lines(io::stdin().lock(), style)?;
        logger.debug(&format!("Read {added} path(s) from stdin"));
    }
    if paths.is_empty() {
        logger.warn("No files or folders supplied; nothing to do");
        return Ok(None);
    }

    if let Some(path) = logger.path() {
        logger.debug(&format!("Logging to {}", path.display()));
    }
    let mode = if dry_run { " (dry run)" } else { "" };
    logger.info(&format!(
        "Removing {} from {} path(s){mode}",
        filter.describe(),
        paths.len()
    ));

    let report = remover::collect_and_process(paths.iter(), &filter, &RemoveOptions { dry_run });
    log_report(&logger, &filter, &report);

    match format {
        OutputFormat::Json => print_json(&filter, &report)?,
        OutputFormat::Text => print_summary(&filter, &report),
    }

    Ok(Some(report))
}

fn log_report(logger: &Logger, filter: &ModFilter, report: &RemovalReport) {
    for path in &report.ignored {
        logger.debug(&format!(
            "Skipped {} (not a folder or .json file)",
            path.display()
        ));
    }
    for failure in &report.failures {
        match failure_level(failure) {
            LogLevel::Error => logger.error(&failure.error),
            _ => logger.warn(&failure.error),
        }
    }
    for path in &report.changed {
        logger.debug(&format!("Updated {}", path.display()));
    }
    logger.debug(&summary_line(filter, report));
}

/// A failed rewrite may have left a truncated file behind, so it is an error;
/// anything that failed before writing only skipped the file.
fn failure_level(failure: &FileFailure) -> LogLevel {
    match failure.stage {
        FailureStage::Write => LogLevel::Error,
        FailureStage::Walk
        | FailureStage::Read
        | FailureStage::Parse
        | FailureStage::Serialize => LogLevel::Warn,
    }
}

#[derive(Serialize)]
struct RemovalOutput<'a> {
    filter: &'a ModFilter,
    #[serde(flatten)]
    report: &'a RemovalReport,
}

fn print_json(filter: &ModFilter, report: &RemovalReport) -> Result<()> {
    let output = RemovalOutput { filter, report };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_summary(filter: &ModFilter, report: &RemovalReport) {
    let styled = io::stdout().is_terminal();
    for path in &report.changed {
        let line = format!("  {}", path.display());
        if styled {
            println!("{}", line.green());
        } else {
            println!("{line}");
        }
    }

    let headline = summary_line(filter, report);
    if !styled {
        println!("{headline}");
    } else if !report.failures.is_empty() {
        println!("{}", headline.yellow().bold());
    } else if report.changed.is_empty() {
        println!("{}", headline.dim());
    } else {
        println!("{}", headline.green().bold());
    }
}

fn summary_line(filter: &ModFilter, report: &RemovalReport) -> String {
    let target = filter.describe();
    let counts = format!(
        "{} scanned, {} failed",
        report.scanned,
        report.failures.len()
    );
    if report.changed.is_empty() {
        return format!("No file references {target} ({counts})");
    }
    let verb = if report.dry_run {
        "Would remove"
    } else {
        "Removed"
    };
    format!(
        "{verb} {target} from {} file(s) ({counts})",
        report.changed.len()
    )
}

fn print_help() {
    println!("modscrub v{}", env!("CARGO_PKG_VERSION"));
    println!("Remove a mod from the RequiredMods list of every .json save under the given paths.");
    println!();
    println!("Usage:");
    println!("  modscrub [options] <paths...>");
    println!();
    println!("Filter (at least one):");
    println!("  -n, --name <mod>                 Mod display name (case-insensitive)");
    println!("  -w, --workshop-id <id>           Workshop id");
    println!();
    println!("Options:");
    println!("      --stdin                      Also read paths from stdin, one per line");
    println!("      --dropped                    Clean up pasted drag-and-drop paths (quotes,");
    println!("                                   file:// URLs, backslash and percent escapes)");
    println!("      --dry-run                    Report files that would change, write nothing");
    println!("      --format <text|json>         Summary format");
    println!("      --config <path>              Config file to use instead of the default");
    println!("      --no-log-file                Do not append to the log file");
    println!("  -q, --quiet                      Errors only");
    println!("  -v, -vv                          Increase verbosity");
    println!("      --verbosity <level>          quiet | normal | verbose | debug");
    println!("      --verbose                    Alias for --verbosity verbose");
    println!("  -h, --help                       Show help");
    println!("  -V, --version                    Show version");
}

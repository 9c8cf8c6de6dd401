use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::anyhow;
use clap::Parser as ClapParser;
use clap::{Subcommand, ValueEnum};
use serde::Serialize;
use sttm::ast::StatementKind;
use sttm::classifier::classify;
use sttm::config::LineageConfig;
use sttm::export::{MappingLayout, export_mappings_csv, write_artifacts};
use sttm::lineage::{
    Lineage, LineageAggregator, LineageExtractor, extract_lineage_from_path, read_inputs,
};

const STDIN_INPUT: &str = "-";

#[derive(clap::Parser)]
#[command(name = "sttm")]
#[command(about = "Source-to-target table lineage from noisy SQL logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract table lineage from a log file, a directory of log files or stdin.
    ExtractLineage(LineageCommand),
    /// Print the statement units found in the input and their kinds.
    Statements(StatementsCommand),
}

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    Pair,
    Target,
}

impl From<Layout> for MappingLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Pair => MappingLayout::Pair,
            Layout::Target => MappingLayout::Target,
        }
    }
}

#[derive(clap::Args)]
struct LineageCommand {
    /// Path to the log file or directory, or `-` for stdin.
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Write mappings.csv, nodes.jsonl and edges.jsonl into this directory
    /// instead of printing the CSV mapping table.
    #[arg(short, long)]
    out_dir: Option<PathBuf>,
    /// CSV layout, overriding the configuration.
    #[arg(long, value_enum)]
    layout: Option<Layout>,
    /// Drop repeated mappings.
    #[arg(long)]
    dedupe: bool,
    /// Resolve statements in parallel.
    #[arg(long)]
    parallel: bool,
}

#[derive(clap::Args)]
struct StatementsCommand {
    /// Path to the log file or directory, or `-` for stdin.
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Pretty-print the output.
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct OutStatement {
    index: usize,
    kind: StatementKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    text: String,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<LineageConfig> {
    match path {
        Some(path) => Ok(LineageConfig::from_file(path)?),
        None => Ok(LineageConfig::default()),
    }
}

fn is_stdin(input: &Path) -> bool {
    input.as_os_str() == STDIN_INPUT
}

fn read_stdin() -> anyhow::Result<String> {
    let mut blob = String::new();
    std::io::stdin()
        .read_to_string(&mut blob)
        .map_err(|err| anyhow!("Failed to read stdin: {}", err))?;
    Ok(blob)
}

fn run_lineage(command: &LineageCommand) -> anyhow::Result<()> {
    let mut config = load_config(command.config.as_deref())?;
    if let Some(layout) = command.layout {
        config.export.layout = layout.into();
    }
    config.export.dedupe |= command.dedupe;
    config.parallel |= command.parallel;

    let lineage: Lineage = if is_stdin(&command.input) {
        let extractor = LineageExtractor::new(&config)?;
        let mut aggregator = LineageAggregator::new();
        extractor.extract_into(&read_stdin()?, &mut aggregator);
        aggregator.finish()
    } else {
        extract_lineage_from_path(&command.input, &config)?
    };

    log::info!(
        "Statements: {}, resolved: {}, skipped: {}, failed: {}",
        lineage.stats.statements,
        lineage.stats.resolved,
        lineage.stats.skipped,
        lineage.stats.failed
    );

    match &command.out_dir {
        Some(dir) => {
            let paths = write_artifacts(&lineage, &config.export, dir)?;
            println!("{}", paths.mappings.display());
            println!("{}", paths.nodes.display());
            println!("{}", paths.edges.display());
        }
        None => {
            let csv = export_mappings_csv(&lineage, &config.export)?;
            std::io::stdout().write_all(&csv)?;
        }
    }
    Ok(())
}

fn run_statements(command: &StatementsCommand) -> anyhow::Result<()> {
    let config = load_config(command.config.as_deref())?;
    let extractor = LineageExtractor::new(&config)?;
    let blobs = if is_stdin(&command.input) {
        vec![read_stdin()?]
    } else {
        read_inputs(&command.input)?
            .into_iter()
            .map(|(_, blob)| blob)
            .collect()
    };

    let statements: Vec<OutStatement> = blobs
        .iter()
        .flat_map(|blob| extractor.segment(blob))
        .enumerate()
        .map(|(index, unit)| OutStatement {
            index,
            kind: classify(&unit.text),
            timestamp: unit.approximate_timestamp,
            text: unit.text,
        })
        .collect();

    let out_str = if command.pretty {
        serde_json::to_string_pretty(&statements)?
    } else {
        serde_json::to_string(&statements)?
    };
    println!("{}", out_str);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let now = Instant::now();

    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::ExtractLineage(lineage_command) => run_lineage(lineage_command)?,
        Commands::Statements(statements_command) => run_statements(statements_command)?,
    }

    let elapsed = now.elapsed();
    log::info!("Elapsed: {:.2?}", elapsed);

    Ok(())
}

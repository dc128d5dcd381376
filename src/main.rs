use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use polars::prelude::*;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use disbursement_curves::summary::{sector_year_shares, year_summary};
use disbursement_curves::{Pipeline, PipelineConfig, ReportKind, SourceTables, TableLoader};

/// Cumulative disbursement curves per operation, country or sector
#[derive(Parser)]
#[command(name = "disbursement-curves")]
#[command(about = "Turn disbursement and operation tables into cumulative disbursement reports", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the annotated report table
    Run(InputArgs),
    /// Per-year roll-up of a report
    Summary(InputArgs),
    /// Share of each sector in every year's disbursed amount
    Sectors(InputArgs),
    /// List the available report presets
    Reports,
}

#[derive(Args)]
struct InputArgs {
    /// Disbursements CSV
    #[arg(short, long)]
    disbursements: PathBuf,

    /// Operations CSV
    #[arg(short, long)]
    operations: PathBuf,

    /// Path to configuration file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Report preset, overriding the configuration file
    #[arg(short, long)]
    report: Option<ReportKind>,

    /// Output file (.csv or .parquet); CSV on stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => execute(args, cli.verbose, Output::Report),
        Commands::Summary(args) => execute(args, cli.verbose, Output::YearSummary),
        Commands::Sectors(args) => execute(args, cli.verbose, Output::SectorShares),
        Commands::Reports => {
            list_reports();
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

#[derive(Clone, Copy)]
enum Output {
    Report,
    YearSummary,
    SectorShares,
}

fn init_logging(config_level: &str, verbose: u8) {
    let level = match verbose {
        0 => config_level,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .init();
}

fn execute(args: InputArgs, verbose: u8, output: Output) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(report) = args.report {
        config.report = report;
    }
    init_logging(&config.log_level, verbose);
    debug!(report = %config.report, "configuration loaded");

    let pipeline = Pipeline::from_config(&config)?;
    let loader = TableLoader::new(".").with_header_aliases(config.header_aliases());
    let tables = SourceTables {
        disbursements: loader
            .load_disbursements(Some(&args.disbursements.to_string_lossy()))
            .with_context(|| format!("reading {}", args.disbursements.display()))?,
        operations: loader
            .load_operations(Some(&args.operations.to_string_lossy()))
            .with_context(|| format!("reading {}", args.operations.display()))?,
    };

    let mut df = match output {
        Output::Report => pipeline.run(&tables)?,
        Output::YearSummary => year_summary(&pipeline.run(&tables)?, pipeline.spec())?,
        Output::SectorShares => sector_year_shares(&pipeline.bucketed(&tables)?)?,
    };

    match &args.output {
        Some(path) => {
            write_table(&mut df, path)?;
            info!(rows = df.height(), path = %path.display(), "wrote table");
        }
        None => {
            CsvWriter::new(std::io::stdout().lock())
                .include_header(true)
                .finish(&mut df)?;
        }
    }
    Ok(())
}

fn write_table(df: &mut DataFrame, path: &Path) -> anyhow::Result<()> {
    let format = OutputFormat::from_path(path)?;
    let mut file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    match format {
        OutputFormat::Csv => {
            CsvWriter::new(&mut file).include_header(true).finish(df)?;
        }
        OutputFormat::Parquet => {
            ParquetWriter::new(file).finish(df)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    /// Resolved before any file is created.
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            other => bail!("unsupported output format '{other}' (expected csv or parquet)"),
        }
    }
}

fn list_reports() {
    for kind in ReportKind::ALL {
        let spec = kind.spec();
        println!(
            "{:<18} keys={:<22} policy={:<14} mode={}",
            kind.name(),
            spec.key_columns().join(","),
            spec.policy().to_string(),
            spec.mode()
        );
    }
}

use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, Subcommand};
use hospital_lakehouse::{
    aggregate::Reports,
    config::PipelineConfig,
    pipeline::Pipeline,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "hospital-lakehouse")]
#[command(about = "Bronze/silver/gold batch pipeline for hospital quality scores")]
struct Args {
    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Warehouse directory (overrides the config file)
    #[arg(long, global = true)]
    warehouse: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load, clean and aggregate, then print the reports
    Run {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Load the input file into the bronze table
    Load {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Rebuild the silver table from bronze
    Clean,
    /// Rebuild the gold tables from silver
    Aggregate,
    /// Print the reports computed from silver, writing nothing
    Report {
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List tables in the warehouse
    Tables,
}

fn input_path(flag: Option<PathBuf>, cfg: &PipelineConfig) -> Result<PathBuf> {
    flag.or_else(|| cfg.input.clone())
        .context("no input file: pass --input or set `input` in the config")
}

fn print_reports(reports: &Reports) -> Result<()> {
    let sections = [
        (format!("Top facilities in {}", reports.region), reports.top_batch()?),
        (format!("Bottom facilities in {}", reports.region), reports.bottom_batch()?),
        ("Average score by region".to_string(), reports.regions_batch()?),
        ("Average record count by condition".to_string(), reports.conditions_batch()?),
    ];
    for (title, batch) in sections {
        println!("{title}");
        println!("{}", pretty_format_batches(&[batch])?);
        println!();
    }
    Ok(())
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = args.warehouse {
        cfg.warehouse = dir;
    }
    info!(warehouse = %cfg.warehouse.display(), "startup");

    match args.command {
        Command::Run { input } => {
            let input = input_path(input, &cfg)?;
            let pipeline = Pipeline::new(cfg)?;
            let summary = pipeline.run(&input)?;
            println!("{}", serde_json::to_string_pretty(&summary.stats)?);
            print_reports(&summary.reports)?;
        }
        Command::Load { input } => {
            let input = input_path(input, &cfg)?;
            let manifest = Pipeline::new(cfg)?.load(&input)?;
            println!("loaded {} rows into {}/{}", manifest.rows, manifest.layer, manifest.name);
        }
        Command::Clean => {
            let (manifest, stats) = Pipeline::new(cfg)?.clean()?;
            println!(
                "wrote {} rows into {}/{} ({} partitions)",
                manifest.rows,
                manifest.layer,
                manifest.name,
                manifest.partitions.len()
            );
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Aggregate => {
            let reports = Pipeline::new(cfg)?.aggregate()?;
            print_reports(&reports)?;
        }
        Command::Report { region, limit } => {
            let pipeline = Pipeline::new(cfg)?;
            let region = region.unwrap_or_else(|| pipeline.config().report_region.clone());
            let limit = limit.unwrap_or(pipeline.config().top_n);
            let reports = pipeline.report(&region, limit)?;
            print_reports(&reports)?;
        }
        Command::Tables => {
            let pipeline = Pipeline::new(cfg)?;
            println!("warehouse {}", pipeline.warehouse().root().display());
            for m in pipeline.warehouse().list_tables()? {
                println!(
                    "{:<8} {:<22} rows={:<8} partitions={:<4} created={}",
                    m.layer.as_str(),
                    m.name,
                    m.rows,
                    m.partitions.len(),
                    m.created_at.to_rfc3339()
                );
            }
        }
    }

    info!("all done");
    Ok(())
}

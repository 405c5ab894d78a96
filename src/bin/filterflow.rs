//! Filterflow command-line front end.
//!
//! Counts term frequencies in a text file and prints the most common terms.

use anyhow::{Context, Result, bail};
use clap::Parser;
use filterflow::element::TypeTag;
use filterflow::elements::text::{self, format_terms, invert_counts, most_common};
use filterflow::pipeline::{
    Collector, ExecutionMode, PipelineBuilder, PipelineConfig, RunReport, SourceInput,
    StageRegistry,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

type Inverted = BTreeMap<usize, Vec<String>>;
type Counts = HashMap<String, usize>;

/// Filterflow - pipe-and-filter term frequency counter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Text file to read
    file: PathBuf,

    /// Execution mode: serial or parallel
    #[arg(short, long, default_value = "serial")]
    mode: ExecutionMode,

    /// Channel capacity
    #[arg(long, default_value_t = 100)]
    capacity: usize,

    /// Replicas per parallelizable stage
    #[arg(short, long, default_value_t = 4)]
    parallelism: usize,

    /// Comma-separated stage names, source first and sink last
    #[arg(long, value_delimiter = ',')]
    stages: Option<Vec<String>>,

    /// Number of frequencies to print
    #[arg(short = 'n', long, default_value_t = 10)]
    top: usize,

    /// Print per-stage statistics
    #[arg(long)]
    stats: bool,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let registry = StageRegistry::with_builtins().context("failed to register stages")?;
    let stages: Vec<String> = match args.stages {
        Some(stages) => stages.into_iter().map(|s| s.trim().to_string()).collect(),
        None => text::DEFAULT_ASSEMBLY.iter().map(ToString::to_string).collect(),
    };
    let config = PipelineConfig::default()
        .with_mode(args.mode)
        .with_capacity(args.capacity)
        .with_parallelism(args.parallelism);

    info!("running {} pipeline: {}", config.mode, stages.join(" -> "));

    let container = stages
        .last()
        .and_then(|name| registry.descriptor(name))
        .and_then(|descriptor| descriptor.container);
    let builder = PipelineBuilder::new(&registry)
        .config(config)
        .stages(stages.iter().cloned());
    let input = SourceInput::file(&args.file);

    let (inverted, report) = if container == Some(TypeTag::of::<Counts>()) {
        let counts: Collector<Counts> = Collector::default();
        let report = run(builder, input, counts.clone()).await?;
        (invert_counts(&counts.take()), report)
    } else if container == Some(TypeTag::of::<Inverted>()) {
        let inverted: Collector<Inverted> = Collector::default();
        let report = run(builder, input, inverted.clone()).await?;
        (inverted.take(), report)
    } else {
        // Let the builder report unknown names and type errors.
        builder
            .validate::<Inverted>()
            .context("invalid stage assembly")?;
        bail!("the last stage does not produce term frequencies");
    };

    for (frequency, terms) in most_common(&inverted, args.top) {
        println!("{frequency:>8}  {}", format_terms(terms));
    }
    if args.stats {
        println!();
        println!("{report}");
    }
    Ok(())
}

async fn run<C: Send + 'static>(
    builder: PipelineBuilder<'_>,
    input: SourceInput,
    collector: Collector<C>,
) -> Result<RunReport> {
    let pipeline = builder
        .build(input, collector)
        .context("invalid stage assembly")?;
    let report = pipeline.run().await.context("pipeline failed")?;
    Ok(report)
}

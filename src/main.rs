use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;
use std::process::ExitCode;

use admatrix::error::{EX_CANCELLED, EX_USAGE};
use admatrix::merge::DEFAULT_CHANNEL_CAPACITY;
use admatrix::source::{SourceInput, VcfRecordReader};
use admatrix::{
    CancelToken, CellRepresentation, ChromosomeOrder, ContigListOrder, ExtractionRule, KeyOrder,
    MatrixSink, MatrixSpec, MergeEngine, MergeError, SubfieldLocator, TsvMatrixSink,
    check_distinct_outputs, load_manifest, open_output, open_vcfs,
};

/// How keys are ordered and how cells are pulled out of each record
#[derive(Debug, Args)]
struct MergeOptions {
    /// File listing one VCF path per line (first tab-separated column)
    manifest: PathBuf,

    /// Allele-depth subfield: a FORMAT tag, or a 0-based index into the sample column
    #[arg(long = "ad-field", value_name = "TAG|INDEX", default_value = "AD")]
    ad_field: SubfieldLocator,

    /// Total-depth subfield used by the reference-depth representation
    #[arg(long = "dp-field", value_name = "TAG|INDEX", default_value = "DP")]
    dp_field: SubfieldLocator,

    /// Chromosome order the inputs are sorted in
    #[arg(
        long = "chromosome-order",
        value_enum,
        default_value_t = ChromosomeOrder::Natural,
        conflicts_with = "contig_order"
    )]
    chromosome_order: ChromosomeOrder,

    /// Take the chromosome order from a file whose first column names contigs (e.g. a .fai)
    #[arg(long = "contig-order", value_name = "FILE")]
    contig_order: Option<PathBuf>,

    /// Number of threads used to open the inputs (default: all cores)
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,
}

impl MergeOptions {
    fn key_order(&self) -> Result<Box<dyn KeyOrder + Send>> {
        match &self.contig_order {
            Some(path) => {
                let order = ContigListOrder::from_path(path)?;
                log::info!(
                    "Using contig order of {} names from {}",
                    order.len(),
                    path.display()
                );
                Ok(Box::new(order))
            }
            None => Ok(self.chromosome_order.into_order()),
        }
    }

    fn rule(&self, representation: CellRepresentation) -> ExtractionRule {
        ExtractionRule::new(representation)
            .with_allele_depth(self.ad_field.clone())
            .with_total_depth(self.dp_field.clone())
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Merge the manifest's VCFs into one matrix per requested representation
    Merge {
        #[command(flatten)]
        options: MergeOptions,

        /// Output matrix as REPR=PATH (reference, alternate, combined, reference-depth);
        /// PATH `-` is stdout, `.gz`/`.bgz` is BGZF compressed
        #[arg(short = 'm', long = "matrix", value_name = "REPR=PATH", required = true)]
        matrices: Vec<MatrixSpec>,

        /// Skip the check that every input is sorted without duplicate sites
        #[arg(long = "no-check-order")]
        no_check_order: bool,

        /// Start each matrix with a `#CHROM POS <samples>` line
        #[arg(long)]
        header: bool,

        /// Write matrices on a dedicated thread
        #[arg(long = "writer-thread")]
        writer_thread: bool,

        /// Rows buffered for the writer thread
        #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
        channel_capacity: usize,
    },

    /// Check that the manifest's VCFs open, are sorted and merge cleanly
    Validate {
        #[command(flatten)]
        options: MergeOptions,

        /// Representation whose extraction is checked
        #[arg(long = "representation", default_value = "combined")]
        representation: CellRepresentation,
    },
}

#[derive(Debug, Parser)]
#[command(name = "admatrix", author, version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(EX_USAGE);
        }
        Err(e) => e.exit(),
    };
    let result = match cli.cmd {
        Commands::Merge {
            options,
            matrices,
            no_check_order,
            header,
            writer_thread,
            channel_capacity,
        } => cmd_merge(
            options,
            matrices,
            !no_check_order,
            header,
            writer_thread.then_some(channel_capacity),
        ),
        Commands::Validate {
            options,
            representation,
        } => cmd_validate(options, representation),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            let code = e
                .downcast_ref::<MergeError>()
                .map_or(1, MergeError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn configure_threads(threads: Option<usize>) -> Result<()> {
    if let Some(threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }
    Ok(())
}

/// Stop the merge at the next row on SIGINT or SIGTERM; a second signal exits at once
fn cancel_on_signal(token: CancelToken) -> Result<()> {
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(i32::from(EX_CANCELLED));
        }
        log::warn!("Interrupted; stopping after the current row");
        token.cancel();
    })
    .context("Failed to install the interrupt handler")
}

fn open_engine(
    options: &MergeOptions,
    rules: Vec<ExtractionRule>,
    check_order: bool,
) -> Result<MergeEngine<VcfRecordReader<SourceInput>>> {
    configure_threads(options.threads)?;
    let order = options.key_order()?;
    let cancel = CancelToken::new();
    cancel_on_signal(cancel.clone())?;

    let paths = load_manifest(&options.manifest)?;
    let sources = open_vcfs(&paths)?;
    log::info!("Opened {} sources", sources.len());

    Ok(MergeEngine::new(sources, rules)
        .with_order(order)
        .validate_order(check_order)
        .with_cancel_token(cancel))
}

/// `admatrix merge MANIFEST -m REPR=PATH ...`
fn cmd_merge(
    options: MergeOptions,
    matrices: Vec<MatrixSpec>,
    check_order: bool,
    header: bool,
    writer_thread: Option<usize>,
) -> Result<()> {
    if writer_thread == Some(0) {
        return Err(MergeError::InvalidParameter {
            parameter: "channel-capacity".to_string(),
            reason: "must be at least 1".to_string(),
        }
        .into());
    }
    check_distinct_outputs(&matrices)?;

    // Outputs with the same representation share one extraction rule
    let mut rules: Vec<ExtractionRule> = Vec::new();
    let mut layers = Vec::with_capacity(matrices.len());
    for spec in &matrices {
        let rule = options.rule(spec.representation);
        let layer = match rules.iter().position(|r| *r == rule) {
            Some(layer) => layer,
            None => {
                rules.push(rule);
                rules.len() - 1
            }
        };
        layers.push(layer);
    }

    // Open every source before creating any output
    let mut engine = open_engine(&options, rules, check_order)?;

    let mut sinks = Vec::with_capacity(matrices.len());
    for (spec, layer) in matrices.iter().zip(layers) {
        let name = spec.path.display().to_string();
        let writer = open_output(&spec.path)?;
        log::info!("{} matrix -> {}", spec.representation.name(), name);
        sinks.push(TsvMatrixSink::new(name, layer, writer).with_header(header));
    }

    let summary = match writer_thread {
        Some(capacity) => engine.write_to_threaded(&mut sinks, capacity)?,
        None => engine.write_to(&mut sinks)?,
    };

    for sink in &sinks {
        log::debug!("Finished {}", sink.name());
    }
    if summary.recovered_cells > 0 {
        log::warn!(
            "{} cells had unusable depth values and were written as missing",
            summary.recovered_cells
        );
    }
    Ok(())
}

/// `admatrix validate MANIFEST`
fn cmd_validate(options: MergeOptions, representation: CellRepresentation) -> Result<()> {
    let rule = options.rule(representation);
    let mut engine = open_engine(&options, vec![rule], true)?;
    let summary = engine.drain()?;

    println!("rows\t{}", summary.rows);
    println!("recovered_cells\t{}", summary.recovered_cells);
    for source in &summary.sources {
        println!(
            "{}\t{}\trecords={}\trecovered={}",
            source.label, source.id, source.records, source.recovered
        );
    }
    Ok(())
}

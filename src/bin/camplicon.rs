use anyhow::bail;
use camplicon::{
    about,
    aligner::Bwa,
    annotation::ReferenceAnnotation,
    config::PipelineConfig,
    kmers::{read_kmer_dump, run_kmc},
    pipeline::{GenomeSet, Pipeline},
    primer::{PrimerPair, read_primers_fasta, write_primers_fasta},
    primer3::Primer3,
    report::{ProductCatalog, write_pairs_report},
    tool_overrides::{KMC_ENV_DIR, ToolPaths},
};
use camplicon_protocol::{PAIRS_REPORT_SUFFIX, PRODUCTS_FASTA_SUFFIX, PRODUCTS_TABLE_SUFFIX};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const PRIMERS_FASTA_SUFFIX: &str = "_primers.fasta";
const PAIR_FASTA_SUFFIX: &str = "_pair.fasta";

#[derive(Parser)]
#[command(name = "camplicon")]
#[command(about = "Find PCR primer pairs that amplify foreground sequences and avoid background ones")]
#[command(disable_version_flag = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Number of worker threads
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    /// Output files prefix
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// JSON config file; command line values take precedence
    #[arg(short, long, global = true, env = "CAMPLICON_CONFIG")]
    config: Option<PathBuf>,

    /// bwa executable
    #[arg(long, global = true)]
    bwa: Option<String>,

    /// primer3_core executable
    #[arg(long, global = true)]
    primer3: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print version and build
    #[arg(short = 'V', long)]
    version: bool,
}

#[derive(Args, Clone)]
struct SequenceDirs {
    /// Directory of foreground (target) FASTA files
    #[arg(long = "fg", visible_alias = "foreground")]
    fg: PathBuf,

    /// Directory of background (off-target) FASTA files
    #[arg(long = "bg", visible_alias = "background")]
    bg: PathBuf,
}

#[derive(Args, Clone, Default)]
struct KmcArgs {
    /// Directory containing the KMC executables
    #[arg(long = "kmc", visible_alias = "kmc_dir", env = KMC_ENV_DIR)]
    kmc_dir: Option<PathBuf>,

    /// K-mer (primer) length
    #[arg(long)]
    kmer_len: Option<usize>,
}

#[derive(Args, Clone, Default)]
struct PrimerArgs {
    /// Maximum number of k-mers to check, sampled from the candidates; 0 checks all
    #[arg(long)]
    max_primers: Option<usize>,

    /// Primer3 thermodynamic parameters directory
    #[arg(long = "p3")]
    p3: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
struct ProductArgs {
    /// Minimum PCR product length (exclusive)
    #[arg(long = "min")]
    min_length: Option<usize>,

    /// Maximum PCR product length (exclusive)
    #[arg(long = "max")]
    max_length: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Count foreground k-mers with KMC, masking those found in background sequences
    Kmers {
        #[command(flatten)]
        dirs: SequenceDirs,
        #[command(flatten)]
        kmc: KmcArgs,
    },

    /// Check the most frequent k-mers as primers with Primer3
    Primers {
        /// k-mer count file produced by `kmers`
        #[arg(long)]
        kmer_file: PathBuf,
        #[command(flatten)]
        primer: PrimerArgs,
    },

    /// Pair primers, simulate products in every genome and rank the pairs
    Filter {
        /// Primer file produced by `primers`
        #[arg(long)]
        primer_file: PathBuf,
        #[command(flatten)]
        dirs: SequenceDirs,
        #[command(flatten)]
        primer: PrimerArgs,
        #[command(flatten)]
        products: ProductArgs,
        /// GenBank file of one foreground sequence, for gene context of each pair
        #[arg(long = "ref")]
        reference: Option<PathBuf>,
    },

    /// Predict PCR products of one primer pair
    Predict {
        #[command(flatten)]
        dirs: SequenceDirs,
        /// Forward primer sequence
        #[arg(long = "fp", visible_alias = "fwd_primer")]
        forward: String,
        /// Reverse primer sequence
        #[arg(long = "rp", visible_alias = "rev_primer")]
        reverse: String,
        #[command(flatten)]
        products: ProductArgs,
    },

    /// kmers, primers, filter and predict in one run
    Full {
        #[command(flatten)]
        dirs: SequenceDirs,
        #[command(flatten)]
        kmc: KmcArgs,
        #[command(flatten)]
        primer: PrimerArgs,
        #[command(flatten)]
        products: ProductArgs,
        /// GenBank file of one foreground sequence, for gene context of each pair
        #[arg(long = "ref")]
        reference: Option<PathBuf>,
    },

    /// primers, filter and predict, starting from a k-mer count file
    Pfp {
        #[command(flatten)]
        dirs: SequenceDirs,
        /// k-mer count file produced by `kmers`
        #[arg(long)]
        kmer_file: PathBuf,
        #[command(flatten)]
        kmc: KmcArgs,
        #[command(flatten)]
        primer: PrimerArgs,
        #[command(flatten)]
        products: ProductArgs,
        /// GenBank file of one foreground sequence, for gene context of each pair
        #[arg(long = "ref")]
        reference: Option<PathBuf>,
    },
}

impl KmcArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.kmc_dir {
            config.kmc_dir = Some(dir.clone());
        }
        if let Some(len) = self.kmer_len {
            config.kmer_len = len;
        }
    }
}

impl PrimerArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(max) = self.max_primers {
            config.max_primers = max;
        }
        if let Some(dir) = &self.p3 {
            config.primer3_config = Some(dir.clone());
        }
    }
}

impl ProductArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(min) = self.min_length {
            config.min_length = min;
        }
        if let Some(max) = self.max_length {
            config.max_length = max;
        }
    }
}

impl Commands {
    fn apply(&self, config: &mut PipelineConfig) {
        match self {
            Commands::Kmers { kmc, .. } => kmc.apply(config),
            Commands::Primers { primer, .. } => primer.apply(config),
            Commands::Filter {
                primer, products, ..
            } => {
                primer.apply(config);
                products.apply(config);
            }
            Commands::Predict { products, .. } => products.apply(config),
            Commands::Full {
                kmc,
                primer,
                products,
                ..
            }
            | Commands::Pfp {
                kmc,
                primer,
                products,
                ..
            } => {
                kmc.apply(config);
                primer.apply(config);
                products.apply(config);
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn find_kmers(config: &PipelineConfig, tools: &ToolPaths, dirs: &SequenceDirs) -> anyhow::Result<PathBuf> {
    info!(
        kmer_len = config.kmer_len,
        foreground = %dirs.fg.display(),
        "finding k-mers"
    );
    let genomes = GenomeSet::from_dirs(&dirs.fg, &dirs.bg)?;
    let run = run_kmc(
        tools,
        &genomes.foreground,
        &genomes.background,
        config.kmer_len,
        &config.prefix,
        config.threads,
    )?;
    println!(
        "Found {} k-mers, output to file: {}",
        run.kmer_count,
        run.dump_path.display()
    );
    Ok(run.dump_path)
}

fn find_primers(pipeline: &Pipeline, kmer_file: &Path) -> anyhow::Result<PathBuf> {
    let kmers = read_kmer_dump(kmer_file)?;
    let primers = pipeline.find_primers(kmers)?;
    let path = pipeline.config().output_path(PRIMERS_FASTA_SUFFIX);
    write_primers_fasta(&primers, &path)?;
    println!(
        "Found {} primers, output to file: {}",
        primers.len(),
        path.display()
    );
    Ok(path)
}

fn filter_primers(
    pipeline: &Pipeline,
    primer_file: &Path,
    dirs: &SequenceDirs,
    reference: Option<&Path>,
) -> anyhow::Result<PrimerPair> {
    let primers = read_primers_fasta(primer_file)?;
    let genomes = GenomeSet::from_dirs(&dirs.fg, &dirs.bg)?;
    let reference = match reference {
        Some(path) => Some(ReferenceAnnotation::from_genbank_file(path)?),
        None => None,
    };
    let ranking = pipeline.filter(&primers, &genomes, reference.as_ref())?;
    let path = pipeline.config().output_path(PAIRS_REPORT_SUFFIX);
    write_pairs_report(&ranking.pairs, &path)?;
    println!(
        "Found {} primer pairs, output to file: {}",
        ranking.pairs.len(),
        path.display()
    );
    match ranking.pairs.into_iter().next() {
        Some(best) => Ok(best),
        None => bail!("No primer pair survived scoring"),
    }
}

fn predict_products(
    pipeline: &Pipeline,
    forward: &str,
    reverse: &str,
    dirs: &SequenceDirs,
) -> anyhow::Result<()> {
    let genomes = GenomeSet::from_dirs(&dirs.fg, &dirs.bg)?;
    let prediction = pipeline.predict(forward, reverse, &genomes)?;
    let config = pipeline.config();
    write_primers_fasta(
        &[prediction.pair.left.clone(), prediction.pair.right.clone()],
        &config.output_path(PAIR_FASTA_SUFFIX),
    )?;
    let catalog = ProductCatalog::from_products(&prediction.products);
    let fasta = config.output_path(PRODUCTS_FASTA_SUFFIX);
    let table = config.output_path(PRODUCTS_TABLE_SUFFIX);
    catalog.write_fasta(&fasta)?;
    catalog.write_mapping(&table)?;
    println!(
        "Predicted {} distinct products ({} foreground hits, {} background hits), output to files: {} {}",
        catalog.sequences.len(),
        prediction.pair.stats.nhits,
        prediction.pair.stats.offhits,
        fasta.display(),
        table.display()
    );
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", about::version_cli_text());
        return Ok(());
    }
    init_tracing(cli.verbose);
    let Some(command) = cli.command else {
        bail!("Missing command (kmers|primers|filter|predict|full|pfp), see --help");
    };

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_from_path(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if let Some(prefix) = cli.prefix {
        config.prefix = prefix;
    }
    if cli.bwa.is_some() {
        config.bwa_bin = cli.bwa;
    }
    if cli.primer3.is_some() {
        config.primer3_bin = cli.primer3;
    }
    command.apply(&mut config);

    let tools = config.tool_paths();
    let evaluator = Primer3::new(tools.primer3.clone(), config.primer3_config.clone());
    let aligner = Bwa::new(tools.bwa.clone());
    let pipeline = Pipeline::new(&config, &evaluator, &aligner)?;

    match &command {
        Commands::Kmers { dirs, .. } => {
            find_kmers(&config, &tools, dirs)?;
        }
        Commands::Primers { kmer_file, .. } => {
            find_primers(&pipeline, kmer_file)?;
        }
        Commands::Filter {
            primer_file,
            dirs,
            reference,
            ..
        } => {
            filter_primers(&pipeline, primer_file, dirs, reference.as_deref())?;
        }
        Commands::Predict {
            dirs,
            forward,
            reverse,
            ..
        } => predict_products(&pipeline, forward, reverse, dirs)?,
        Commands::Full {
            dirs, reference, ..
        } => {
            info!("running the full workflow");
            let kmer_file = find_kmers(&config, &tools, dirs)?;
            let primer_file = find_primers(&pipeline, &kmer_file)?;
            let best = filter_primers(&pipeline, &primer_file, dirs, reference.as_deref())?;
            predict_products(&pipeline, &best.left.seq, &best.right.seq, dirs)?;
        }
        Commands::Pfp {
            dirs,
            kmer_file,
            reference,
            ..
        } => {
            info!("running the primers-filter-predict workflow");
            let primer_file = find_primers(&pipeline, kmer_file)?;
            let best = filter_primers(&pipeline, &primer_file, dirs, reference.as_deref())?;
            predict_products(&pipeline, &best.left.seq, &best.right.seq, dirs)?;
        }
    }
    Ok(())
}

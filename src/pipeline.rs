//! Stage orchestration: primer feasibility, pairing, per-genome product
//! simulation on a worker pool, then single-threaded scoring and ranking.

use crate::{
    aligner::Aligner,
    alignment::resolve_hits,
    annotation::{ReferenceAnnotation, annotate_pair},
    config::PipelineConfig,
    error::{PipelineError, Result, Stage},
    genome::{GenomeSequences, find_sequence_files},
    kmers::{Kmer, select_max_frequency, subsample},
    nucleotide::normalize_primer_sequence,
    primer::{Primer, PrimerPair, ensure_uniform_length, generate_pairs, write_alignment_fasta},
    primer3::PrimerEvaluator,
    product::{PcrProduct, simulate_product},
    ranking::rank_pairs,
    scoring::score_pair,
};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Target and off-target genome files of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenomeSet {
    pub foreground: Vec<PathBuf>,
    pub background: Vec<PathBuf>,
}

impl GenomeSet {
    pub fn from_dirs(foreground: &Path, background: &Path) -> Result<Self> {
        let ret = Self {
            foreground: find_sequence_files(foreground)?,
            background: find_sequence_files(background)?,
        };
        if ret.foreground.is_empty() {
            return Err(PipelineError::new(
                Stage::Input,
                format!("No sequence files in '{}'", foreground.display()),
            ));
        }
        Ok(ret)
    }
}

/// Product attempts of one pair, one slot per genome in `GenomeSet` order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairProducts {
    pub foreground: Vec<Option<PcrProduct>>,
    pub background: Vec<Option<PcrProduct>>,
}

/// Products by `pair_id`.
pub type ProductTable = HashMap<usize, PairProducts>;

#[derive(Debug, Clone)]
pub struct Ranking {
    pub pairs: Vec<PrimerPair>,
    pub products: ProductTable,
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub pair: PrimerPair,
    pub products: PairProducts,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    evaluator: &'a dyn PrimerEvaluator,
    aligner: &'a dyn Aligner,
    pool: ThreadPool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        evaluator: &'a dyn PrimerEvaluator,
        aligner: &'a dyn Aligner,
    ) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| {
                PipelineError::new(
                    Stage::Config,
                    format!("Could not start {} worker threads: {e}", config.threads),
                )
            })?;
        Ok(Self {
            config,
            evaluator,
            aligner,
            pool,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        self.config
    }

    /// Most frequent k-mers that pass the single-primer check, followed by
    /// their reverse complements.
    pub fn find_primers(&self, kmers: Vec<Kmer>) -> Result<Vec<Primer>> {
        if kmers.is_empty() {
            return Err(PipelineError::new(Stage::Kmers, "No candidate k-mers"));
        }
        let candidates = subsample(
            select_max_frequency(kmers),
            self.config.max_primers,
            self.config.sample_seed,
        );
        info!(candidates = candidates.len(), "checking k-mers as primers");

        let checked: Vec<Option<Primer>> = self.pool.install(|| {
            candidates
                .par_iter()
                .map(|kmer| {
                    Ok(self
                        .evaluator
                        .check_primer(&kmer.seq)?
                        .map(|melt| Primer::new(kmer.id.clone(), kmer.seq.clone(), Some(melt))))
                })
                .collect::<Result<Vec<_>>>()
        })?;
        let mut primers: Vec<Primer> = checked.into_iter().flatten().collect();
        let reverse: Vec<Primer> = primers.iter().map(Primer::reverse_complement).collect();
        primers.extend(reverse);
        info!(primers = primers.len(), "feasible primers");
        Ok(primers)
    }

    /// Pairs that pass the pairwise check, carrying their penalty.
    ///
    /// A primer paired with its own reverse complement is dropped without
    /// asking the evaluator.
    pub fn check_pairs(&self, primers: &[Primer]) -> Result<Vec<PrimerPair>> {
        let pairs: Vec<PrimerPair> = generate_pairs(primers).collect();
        let total = pairs.len();
        let checked: Vec<Option<PrimerPair>> = self.pool.install(|| {
            pairs
                .into_par_iter()
                .map(|mut pair| {
                    if pair.is_reverse_complement_pair() {
                        return Ok(None);
                    }
                    Ok(self
                        .evaluator
                        .check_pair(&pair.left.seq, &pair.right.seq)?
                        .map(|penalty| {
                            pair.penalty = Some(penalty);
                            pair
                        }))
                })
                .collect::<Result<Vec<_>>>()
        })?;
        let viable: Vec<PrimerPair> = checked.into_iter().flatten().collect();
        info!(total, viable = viable.len(), "checked primer pairs");
        Ok(viable)
    }

    fn simulate_genome(
        &self,
        query: &Path,
        genome_file: &Path,
        pairs: &[PrimerPair],
        primer_len: usize,
    ) -> Result<Vec<Option<PcrProduct>>> {
        let genome = GenomeSequences::from_fasta_file(genome_file)?;
        info!(genome = genome.name(), "aligning primers");
        let hits = resolve_hits(self.aligner.align(query, genome_file)?)?;
        debug!(genome = genome.name(), hits = hits.len(), "resolved primer hits");
        pairs
            .iter()
            .map(|pair| {
                simulate_product(
                    pair,
                    &hits,
                    &genome,
                    primer_len,
                    self.config.max_product_length,
                )
            })
            .collect()
    }

    /// One product attempt per pair for every genome file, outer index = genome.
    pub fn simulate_genomes(
        &self,
        primers: &[Primer],
        pairs: &[PrimerPair],
        genome_files: &[PathBuf],
    ) -> Result<Vec<Vec<Option<PcrProduct>>>> {
        let primer_len = ensure_uniform_length(primers)?;
        let workdir = tempfile::tempdir().map_err(|e| {
            PipelineError::new(Stage::Io, format!("Could not create temp dir: {e}"))
        })?;
        let query = workdir.path().join("primers.fasta");
        write_alignment_fasta(primers, &query)?;
        self.pool.install(|| {
            genome_files
                .par_iter()
                .map(|file| self.simulate_genome(&query, file, pairs, primer_len))
                .collect()
        })
    }

    /// Simulates every pair in every genome of `genomes`. All genomes finish
    /// before the table is returned.
    pub fn simulate(
        &self,
        primers: &[Primer],
        pairs: &[PrimerPair],
        genomes: &GenomeSet,
    ) -> Result<ProductTable> {
        let foreground = self.simulate_genomes(primers, pairs, &genomes.foreground)?;
        let background = self.simulate_genomes(primers, pairs, &genomes.background)?;
        Ok(tabulate(pairs, foreground, background))
    }

    /// Scores every pair against its products and ranks them. An empty ranking
    /// is fatal.
    pub fn score_and_rank(
        &self,
        pairs: Vec<PrimerPair>,
        products: &ProductTable,
    ) -> Result<Vec<PrimerPair>> {
        let scoring = self.config.scoring();
        let mut scored = Vec::with_capacity(pairs.len());
        for mut pair in pairs {
            let pair_products = products.get(&pair.pair_id).ok_or_else(|| {
                PipelineError::new(
                    Stage::Scoring,
                    format!("No simulated products for pair {}", pair.pair_id),
                )
            })?;
            score_pair(
                &mut pair,
                &pair_products.foreground,
                &pair_products.background,
                &scoring,
            );
            scored.push(pair);
        }
        let ranked = rank_pairs(scored);
        if ranked.is_empty() {
            return Err(PipelineError::new(
                Stage::Scoring,
                format!(
                    "No primer pair gives a foreground product between {} and {} bp",
                    scoring.min_length, scoring.max_length
                ),
            ));
        }
        info!(ranked = ranked.len(), "scored primer pairs");
        Ok(ranked)
    }

    /// Sets the gene context of ranked pairs; returns how many were located.
    pub fn annotate(
        &self,
        pairs: &mut [PrimerPair],
        reference: &ReferenceAnnotation,
        products: &ProductTable,
    ) -> usize {
        let located = self.pool.install(|| {
            pairs
                .par_iter_mut()
                .map(|pair| match products.get(&pair.pair_id) {
                    Some(p) => annotate_pair(pair, reference, &p.foreground),
                    None => false,
                })
                .filter(|located| *located)
                .count()
        });
        if located == 0 {
            warn!("reference annotation matched none of the foreground products");
        }
        located
    }

    /// Pairs the primers, simulates products and returns the ranked pairs.
    pub fn filter(
        &self,
        primers: &[Primer],
        genomes: &GenomeSet,
        reference: Option<&ReferenceAnnotation>,
    ) -> Result<Ranking> {
        let max = self.config.max_primers;
        let primers = if max != 0 && primers.len() > max {
            &primers[..max]
        } else {
            primers
        };
        info!(primers = primers.len(), "pairing primers");
        let pairs = self.check_pairs(primers)?;
        if pairs.is_empty() {
            return Err(PipelineError::new(
                Stage::PairFeasibility,
                "No primer pair passed the pairwise check",
            ));
        }
        let products = self.simulate(primers, &pairs, genomes)?;
        let realized = products
            .values()
            .flat_map(|p| p.foreground.iter())
            .flatten()
            .count();
        if realized == 0 {
            return Err(PipelineError::new(
                Stage::ProductSimulation,
                "There are no foreground PCR products",
            ));
        }
        let mut ranked = self.score_and_rank(pairs, &products)?;
        if let Some(reference) = reference {
            self.annotate(&mut ranked, reference, &products);
        }
        Ok(Ranking {
            pairs: ranked,
            products,
        })
    }

    /// Products and statistics of a single user-supplied pair.
    pub fn predict(&self, forward: &str, reverse: &str, genomes: &GenomeSet) -> Result<Prediction> {
        let primers = vec![
            Primer::new("0", normalize_primer_sequence(forward)?, None),
            Primer::new("1", normalize_primer_sequence(reverse)?, None),
        ];
        ensure_uniform_length(&primers)?;
        let mut pair = PrimerPair::new(0, primers[0].clone(), primers[1].clone());
        let mut table = self.simulate(&primers, std::slice::from_ref(&pair), genomes)?;
        let products = table.remove(&pair.pair_id).unwrap_or_default();
        score_pair(
            &mut pair,
            &products.foreground,
            &products.background,
            &self.config.scoring(),
        );
        info!(
            nhits = pair.stats.nhits,
            offhits = pair.stats.offhits,
            "predicted products"
        );
        Ok(Prediction { pair, products })
    }
}

/// Regroups per-genome product lists into per-pair lists.
fn tabulate(
    pairs: &[PrimerPair],
    foreground: Vec<Vec<Option<PcrProduct>>>,
    background: Vec<Vec<Option<PcrProduct>>>,
) -> ProductTable {
    let mut slots: Vec<PairProducts> = pairs
        .iter()
        .map(|_| PairProducts {
            foreground: Vec::with_capacity(foreground.len()),
            background: Vec::with_capacity(background.len()),
        })
        .collect();
    for genome in foreground {
        for (slot, product) in slots.iter_mut().zip(genome) {
            slot.foreground.push(product);
        }
    }
    for genome in background {
        for (slot, product) in slots.iter_mut().zip(genome) {
            slot.background.push(product);
        }
    }
    pairs.iter().map(|p| p.pair_id).zip(slots).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alignment::{AlignmentRecord, parse_sam},
        genome::genome_name,
        scoring::DEFAULT_MAX_LENGTH,
    };
    use gb_io::seq::{Feature, Location, Seq, Topology};
    use std::borrow::Cow;
    use std::{
        collections::HashSet,
        fs,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tempfile::{TempDir, tempdir};

    struct MockEvaluator {
        rejected: HashSet<String>,
        pair_calls: AtomicUsize,
    }

    impl MockEvaluator {
        fn new(rejected: &[&str]) -> Self {
            Self {
                rejected: rejected.iter().map(|s| s.to_string()).collect(),
                pair_calls: AtomicUsize::new(0),
            }
        }
    }

    impl PrimerEvaluator for MockEvaluator {
        fn check_primer(&self, seq: &str) -> Result<Option<f64>> {
            Ok((!self.rejected.contains(seq)).then_some(60.0))
        }

        fn check_pair(&self, left: &str, right: &str) -> Result<Option<f64>> {
            self.pair_calls.fetch_add(1, Ordering::SeqCst);
            if self.rejected.contains(left) || self.rejected.contains(right) {
                return Ok(None);
            }
            Ok(Some(0.5))
        }
    }

    /// SAM text by genome name.
    struct MockAligner {
        sam: HashMap<String, String>,
    }

    impl Aligner for MockAligner {
        fn align(&self, primers_fasta: &Path, genome_fasta: &Path) -> Result<Vec<AlignmentRecord>> {
            assert!(primers_fasta.exists());
            match self.sam.get(&genome_name(genome_fasta)) {
                Some(text) => parse_sam(text),
                None => Ok(vec![]),
            }
        }
    }

    fn mapped(query: &str, flag: u16, pos: usize) -> String {
        format!("{query}\t{flag}\tc1\t{pos}\t37\t5M\t*\t0\t0\tNNNNN\tIIIII\tNM:i:0\n")
    }

    fn unmapped(query: &str) -> String {
        format!("{query}\t4\t*\t0\t0\t*\t*\t0\t0\tNNNNN\tIIIII\n")
    }

    fn random_dna(len: usize, seed: u64) -> String {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                b"ACGT"[((state >> 33) % 4) as usize] as char
            })
            .collect()
    }

    fn genomes(td: &TempDir) -> GenomeSet {
        let write = |name: &str, seed: u64| {
            let path = td.path().join(format!("{name}.fasta"));
            fs::write(&path, format!(">c1\n{}\n", random_dna(1000, seed))).unwrap();
            path
        };
        GenomeSet {
            foreground: vec![write("fg1", 1), write("fg2", 2)],
            background: vec![write("bg1", 3)],
        }
    }

    fn aligner(left: &str, right: &str, third: &str) -> MockAligner {
        let mut sam = HashMap::new();
        sam.insert(
            "fg1".to_string(),
            format!("@HD\tVN:1.5\n{}{}{}", mapped(left, 0, 100), mapped(right, 16, 430), unmapped(third)),
        );
        sam.insert(
            "fg2".to_string(),
            format!("{}{}{}", mapped(left, 16, 380), mapped(right, 0, 50), unmapped(third)),
        );
        sam.insert(
            "bg1".to_string(),
            format!("{}{}{}", mapped(left, 0, 10), mapped(right, 16, 200), mapped(third, 0, 300)),
        );
        MockAligner { sam }
    }

    fn primers() -> Vec<Primer> {
        vec![
            Primer::new("P1", "AACCG", Some(60.0)),
            Primer::new("P2", "TTGCA", Some(61.0)),
            Primer::new("P3", "GGATC", Some(59.0)),
        ]
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            threads: 2,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_find_primers_keeps_feasible_kmers_and_adds_reverse_complements() {
        let config = config();
        let evaluator = MockEvaluator::new(&["GGATC"]);
        let aligner = MockAligner { sam: HashMap::new() };
        let pipeline = Pipeline::new(&config, &evaluator, &aligner).unwrap();
        let kmers = vec![
            Kmer { id: "0".to_string(), seq: "AACCG".to_string(), freq: 5 },
            Kmer { id: "1".to_string(), seq: "GGATC".to_string(), freq: 5 },
            Kmer { id: "2".to_string(), seq: "TTTTT".to_string(), freq: 2 },
        ];
        let primers = pipeline.find_primers(kmers).unwrap();
        assert_eq!(
            primers,
            vec![
                Primer::new("0", "AACCG", Some(60.0)),
                Primer::new("0rc", "CGGTT", Some(60.0)),
            ]
        );
        assert_eq!(pipeline.find_primers(vec![]).unwrap_err().stage, Stage::Kmers);
    }

    #[test]
    fn test_check_pairs_skips_reverse_complement_without_evaluator_call() {
        let config = config();
        let evaluator = MockEvaluator::new(&[]);
        let aligner = MockAligner { sam: HashMap::new() };
        let pipeline = Pipeline::new(&config, &evaluator, &aligner).unwrap();
        let primers = vec![
            Primer::new("A", "AACCG", None),
            Primer::new("Arc", "CGGTT", None),
            Primer::new("C", "ATATA", None),
        ];
        let pairs = pipeline.check_pairs(&primers).unwrap();
        assert_eq!(evaluator.pair_calls.load(Ordering::SeqCst), 2);
        let ids: Vec<usize> = pairs.iter().map(|p| p.pair_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(pairs.iter().all(|p| p.penalty == Some(0.5)));
    }

    #[test]
    fn test_filter_ranks_pairs_by_foreground_products() {
        let td = tempdir().unwrap();
        let genomes = genomes(&td);
        let config = config();
        let evaluator = MockEvaluator::new(&[]);
        let aligner = aligner("P1", "P2", "P3");
        let pipeline = Pipeline::new(&config, &evaluator, &aligner).unwrap();

        let ranking = pipeline.filter(&primers(), &genomes, None).unwrap();
        assert_eq!(ranking.pairs.len(), 1);
        let best = &ranking.pairs[0];
        assert_eq!((best.left.id.as_str(), best.right.id.as_str()), ("P1", "P2"));
        assert_eq!(best.stats.nhits, 2);
        assert_eq!(best.stats.nseq, 2);
        assert!((best.stats.info - 1.0).abs() < 1e-12);
        assert!((best.stats.length - 335.0).abs() < 1e-12);
        assert_eq!(best.stats.se, 0.0);
        assert_eq!(best.stats.offhits, 1);
        assert_eq!(best.stats.offseqs, 1);
        assert_eq!(best.stats.overlap, 0);
        assert_eq!(best.penalty, Some(0.5));
        assert_eq!(best.locale, "-");

        let products = &ranking.products[&best.pair_id];
        assert_eq!(products.foreground.len(), 2);
        assert_eq!(products.background.len(), 1);
        let fg1 = products.foreground[0].as_ref().unwrap();
        assert_eq!((fg1.start, fg1.end), (100, 435));
        assert_eq!(fg1.seq, random_dna(1000, 1)[99..434]);
        assert_eq!(ranking.products.len(), 3);
        assert!(ranking.products[&1].foreground.iter().all(Option::is_none));
    }

    #[test]
    fn test_filter_without_qualifying_products_is_fatal() {
        let td = tempdir().unwrap();
        let genomes = genomes(&td);
        let config = PipelineConfig {
            min_length: 400,
            max_length: DEFAULT_MAX_LENGTH,
            ..config()
        };
        let evaluator = MockEvaluator::new(&[]);
        let aligner = aligner("P1", "P2", "P3");
        let pipeline = Pipeline::new(&config, &evaluator, &aligner).unwrap();
        let err = pipeline.filter(&primers(), &genomes, None).unwrap_err();
        assert_eq!(err.stage, Stage::Scoring);

        let silent = MockAligner { sam: HashMap::new() };
        let pipeline = Pipeline::new(&config, &evaluator, &silent).unwrap();
        let err = pipeline.filter(&primers(), &genomes, None).unwrap_err();
        assert_eq!(err.stage, Stage::ProductSimulation);
    }

    #[test]
    fn test_filter_annotates_with_reference() {
        let td = tempdir().unwrap();
        let genomes = genomes(&td);
        let config = config();
        let evaluator = MockEvaluator::new(&[]);
        let aligner = aligner("P1", "P2", "P3");
        let pipeline = Pipeline::new(&config, &evaluator, &aligner).unwrap();
        let gene = Feature {
            kind: Cow::from("gene"),
            location: Location::simple_range(200, 260),
            qualifiers: vec![("locus_tag".into(), Some("tag_0001".to_string()))],
        };
        let reference = ReferenceAnnotation::from_records(vec![Seq {
            name: Some("c1".to_string()),
            topology: Topology::Linear,
            date: None,
            len: Some(1000),
            molecule_type: None,
            division: String::new(),
            definition: None,
            accession: None,
            version: None,
            source: None,
            dblink: None,
            keywords: None,
            references: vec![],
            comments: vec![],
            seq: vec![],
            contig: None,
            features: vec![gene],
        }]);
        let ranking = pipeline.filter(&primers(), &genomes, Some(&reference)).unwrap();
        assert_eq!(ranking.pairs[0].locale, "tag_0001,-");
    }

    #[test]
    fn test_predict_scores_a_single_pair() {
        let td = tempdir().unwrap();
        let genomes = genomes(&td);
        let config = config();
        let evaluator = MockEvaluator::new(&[]);
        let aligner = aligner("0", "1", "2");
        let pipeline = Pipeline::new(&config, &evaluator, &aligner).unwrap();

        let prediction = pipeline.predict("aaccg", "TTGCA", &genomes).unwrap();
        assert_eq!(prediction.pair.stats.nhits, 2);
        assert_eq!(prediction.pair.stats.offhits, 1);
        assert_eq!(prediction.products.foreground.iter().flatten().count(), 2);
        assert_eq!(evaluator.pair_calls.load(Ordering::SeqCst), 0);

        let err = pipeline.predict("AACCG", "TTGC", &genomes).unwrap_err();
        assert_eq!(err.stage, Stage::Input);
    }

    #[test]
    fn test_tabulate_regroups_by_pair() {
        let pairs: Vec<PrimerPair> = generate_pairs(&primers()).collect();
        let product = |t: &str| {
            Some(PcrProduct {
                template: t.to_string(),
                seq: "ACGT".to_string(),
                start: 1,
                end: 5,
            })
        };
        let fg = vec![
            vec![product("g1"), None, None],
            vec![None, product("g2"), None],
        ];
        let table = tabulate(&pairs, fg, vec![vec![None, None, product("b1")]]);
        assert_eq!(table[&0].foreground, vec![product("g1"), None]);
        assert_eq!(table[&1].foreground, vec![None, product("g2")]);
        assert_eq!(table[&2].background, vec![product("b1")]);
    }
}

//! Per-pair specificity and consistency statistics across all genomes.

use crate::{primer::PrimerPair, product::PcrProduct};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_MIN_LENGTH: usize = 300;
pub const DEFAULT_MAX_LENGTH: usize = 500;

/// Which length bounds a background product must satisfy to count as an off-target hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundFilter {
    /// Only `len < max_length`; short off-target products still count.
    #[default]
    MaxOnly,
    /// The same exclusive window as foreground products.
    BothBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub background_filter: BackgroundFilter,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            max_length: DEFAULT_MAX_LENGTH,
            background_filter: BackgroundFilter::default(),
        }
    }
}

impl ScoringConfig {
    /// Non-empty and strictly inside `(min_length, max_length)`.
    pub fn qualifies(&self, product: &PcrProduct) -> bool {
        let len = product.len();
        len > 0 && len > self.min_length && len < self.max_length
    }

    pub fn qualifies_background(&self, product: &PcrProduct) -> bool {
        match self.background_filter {
            BackgroundFilter::MaxOnly => !product.is_empty() && product.len() < self.max_length,
            BackgroundFilter::BothBounds => self.qualifies(product),
        }
    }
}

/// Shannon entropy in bits of the sequence distribution.
pub fn shannon_entropy(seqs: &[&str]) -> f64 {
    if seqs.is_empty() {
        return 0.0;
    }
    // ordered keys keep the floating-point sum identical between runs
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for seq in seqs {
        *counts.entry(*seq).or_default() += 1;
    }
    let total = seqs.len() as f64;
    counts.values().fold(0.0, |acc, &count| {
        let p = count as f64 / total;
        acc - p * p.log2()
    })
}

fn mean_and_stderr(lengths: &[f64]) -> (f64, f64) {
    let n = lengths.len() as f64;
    let mean = lengths.iter().sum::<f64>() / n;
    let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt() / n.sqrt())
}

/// Fills `pair.stats` from one product attempt per foreground and background genome.
///
/// Pure in its inputs: re-running on the same products gives the same stats.
pub fn score_pair(
    pair: &mut PrimerPair,
    foreground: &[Option<PcrProduct>],
    background: &[Option<PcrProduct>],
    config: &ScoringConfig,
) {
    let good: Vec<&str> = foreground
        .iter()
        .flatten()
        .filter(|p| config.qualifies(p))
        .map(|p| p.seq.as_str())
        .collect();
    let good_set: HashSet<&str> = good.iter().copied().collect();

    let stats = &mut pair.stats;
    stats.nhits = good.len();
    stats.nseq = good_set.len();
    if good.is_empty() {
        stats.length = 0.0;
        stats.se = 0.0;
        stats.info = 0.0;
    } else {
        let lengths: Vec<f64> = good.iter().map(|s| s.len() as f64).collect();
        (stats.length, stats.se) = mean_and_stderr(&lengths);
        stats.info = shannon_entropy(&good);
    }

    let off: Vec<&str> = background
        .iter()
        .flatten()
        .filter(|p| config.qualifies_background(p))
        .map(|p| p.seq.as_str())
        .collect();
    let off_set: HashSet<&str> = off.iter().copied().collect();
    stats.offhits = off.len();
    stats.offseqs = off_set.len();
    stats.overlap = off_set.iter().filter(|s| good_set.contains(*s)).count();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primer::Primer;

    fn pair() -> PrimerPair {
        PrimerPair::new(
            0,
            Primer::new("P1", "ACGT", None),
            Primer::new("P2", "TTGG", None),
        )
    }

    fn product(seq: String) -> Option<PcrProduct> {
        Some(PcrProduct {
            template: "chr1".to_string(),
            end: seq.len() + 1,
            seq,
            start: 1,
        })
    }

    fn of_len(base: char, len: usize) -> Option<PcrProduct> {
        product(base.to_string().repeat(len))
    }

    #[test]
    fn test_entropy_single_sequence_is_zero() {
        assert_eq!(shannon_entropy(&["AC", "AC", "AC"]), 0.0);
        assert!(shannon_entropy(&["AC"]).is_sign_positive());
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn test_entropy_equal_frequencies_is_log2_k() {
        assert_eq!(shannon_entropy(&["A", "C"]), 1.0);
        assert_eq!(shannon_entropy(&["A", "C", "G", "T"]), 2.0);
        let three = shannon_entropy(&["A", "C", "G", "A", "C", "G"]);
        assert!((three - 3f64.log2()).abs() < 1e-12);
    }

    #[test]
    fn test_entropy_is_deterministic() {
        let names: Vec<String> = (1..=9).map(|i| format!("SEQ{i}")).collect();
        let seqs: Vec<&str> = names
            .iter()
            .enumerate()
            .flat_map(|(i, name)| std::iter::repeat_n(name.as_str(), (i + 1) * (i + 1)))
            .collect();
        let first = shannon_entropy(&seqs).to_bits();
        for _ in 0..200 {
            assert_eq!(shannon_entropy(&seqs).to_bits(), first);
        }
    }

    #[test]
    fn test_length_window_is_exclusive() {
        let config = ScoringConfig::default();
        assert!(!config.qualifies(&of_len('A', 300).unwrap()));
        assert!(config.qualifies(&of_len('A', 301).unwrap()));
        assert!(config.qualifies(&of_len('A', 499).unwrap()));
        assert!(!config.qualifies(&of_len('A', 500).unwrap()));
    }

    #[test]
    fn test_short_product_does_not_count() {
        let mut p = pair();
        score_pair(&mut p, &[of_len('A', 270)], &[], &ScoringConfig::default());
        assert_eq!(p.stats.nhits, 0);
        assert_eq!(p.stats.nseq, 0);
    }

    #[test]
    fn test_single_qualifying_product() {
        let mut p = pair();
        score_pair(&mut p, &[of_len('A', 340)], &[], &ScoringConfig::default());
        assert_eq!(p.stats.nhits, 1);
        assert_eq!(p.stats.nseq, 1);
        assert_eq!(p.stats.info, 0.0);
        assert_eq!(p.stats.length, 340.0);
        assert_eq!(p.stats.se, 0.0);
    }

    #[test]
    fn test_foreground_statistics() {
        let fg = vec![
            of_len('A', 310),
            of_len('A', 310),
            of_len('C', 330),
            None,
            of_len('G', 600),
            of_len('T', 350),
        ];
        let mut p = pair();
        score_pair(&mut p, &fg, &[], &ScoringConfig::default());
        assert_eq!(p.stats.nhits, 4);
        assert_eq!(p.stats.nseq, 3);
        assert_eq!(p.stats.length, 325.0);
        // population stdev of [310, 310, 330, 350] is sqrt(275)
        assert!((p.stats.se - 275f64.sqrt() / 2.0).abs() < 1e-9);
        assert_eq!(p.stats.info, 1.5);
        assert_eq!(p.stats.offhits, 0);
    }

    #[test]
    fn test_background_filter_modes_and_overlap() {
        let fg = vec![of_len('A', 320), of_len('C', 340)];
        let bg = vec![
            of_len('A', 320),
            of_len('A', 320),
            of_len('G', 100),
            of_len('T', 700),
            None,
        ];
        let mut p = pair();
        score_pair(&mut p, &fg, &bg, &ScoringConfig::default());
        assert_eq!(p.stats.offhits, 3);
        assert_eq!(p.stats.offseqs, 2);
        assert_eq!(p.stats.overlap, 1);

        let strict = ScoringConfig {
            background_filter: BackgroundFilter::BothBounds,
            ..ScoringConfig::default()
        };
        score_pair(&mut p, &fg, &bg, &strict);
        assert_eq!(p.stats.offhits, 2);
        assert_eq!(p.stats.offseqs, 1);
        assert_eq!(p.stats.overlap, 1);
    }

    #[test]
    fn test_overlap_never_exceeds_distinct_counts() {
        let fg = vec![of_len('A', 320), of_len('C', 330), of_len('G', 340)];
        let bg = vec![of_len('A', 320), of_len('C', 330), of_len('T', 200)];
        let mut p = pair();
        score_pair(&mut p, &fg, &bg, &ScoringConfig::default());
        assert_eq!(p.stats.overlap, 2);
        assert!(p.stats.overlap <= p.stats.nseq.min(p.stats.offseqs));
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let fg = vec![of_len('A', 320), of_len('C', 330)];
        let bg = vec![of_len('A', 320)];
        let mut p = pair();
        score_pair(&mut p, &fg, &bg, &ScoringConfig::default());
        let first = p.stats.clone();
        score_pair(&mut p, &fg, &bg, &ScoringConfig::default());
        assert_eq!(p.stats, first);
    }
}

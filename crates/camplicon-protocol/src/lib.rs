//! Row contracts for the tab-separated files camplicon writes.
//!
//! Field order is column order; writers serialize these rows directly.

use serde::{Deserialize, Serialize};

pub const PAIRS_REPORT_SUFFIX: &str = "_pairs.txt";
pub const PRODUCTS_FASTA_SUFFIX: &str = "_products.fasta";
pub const PRODUCTS_TABLE_SUFFIX: &str = "_products.tab";

/// One ranked primer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReportRow {
    pub left_id: String,
    pub left_seq: String,
    pub left_tm: Option<f64>,
    pub right_id: String,
    pub right_seq: String,
    pub right_tm: Option<f64>,
    pub locale: String,
    pub nhits: usize,
    pub nseq: usize,
    pub info: f64,
    pub penalty: Option<f64>,
    pub mean_len: f64,
    pub stderr_len: f64,
    pub offhits: usize,
    pub offseqs: usize,
    pub overlap: usize,
}

/// Which sequence set a realized product came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductOrigin {
    #[serde(rename = "FG")]
    Foreground,
    #[serde(rename = "BG")]
    Background,
}

/// Links a genome template to a numbered product sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMappingRow {
    pub template: String,
    pub origin: ProductOrigin,
    pub product: String,
}

pub fn product_label(index: usize) -> String {
    format!("Product{index}")
}

//! Writers for the ranked-pairs table and the realized product set.

use crate::{
    error::{PipelineError, Result, Stage},
    pipeline::PairProducts,
    primer::PrimerPair,
};
use camplicon_protocol::{PairReportRow, ProductMappingRow, ProductOrigin, product_label};
use csv::WriterBuilder;
use std::{
    collections::HashMap,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

pub fn pair_report_row(pair: &PrimerPair) -> PairReportRow {
    PairReportRow {
        left_id: pair.left.id.clone(),
        left_seq: pair.left.seq.clone(),
        left_tm: pair.left.melt,
        right_id: pair.right.id.clone(),
        right_seq: pair.right.seq.clone(),
        right_tm: pair.right.melt,
        locale: pair.locale.clone(),
        nhits: pair.stats.nhits,
        nseq: pair.stats.nseq,
        info: pair.stats.info,
        penalty: pair.penalty,
        mean_len: pair.stats.length,
        stderr_len: pair.stats.se,
        offhits: pair.stats.offhits,
        offseqs: pair.stats.offseqs,
        overlap: pair.stats.overlap,
    }
}

fn report_error(path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::new(
        Stage::Report,
        format!("Could not write '{}': {e}", path.display()),
    )
}

/// Tab-separated, one header line, pairs in the given (ranked) order.
pub fn write_pairs_report(pairs: &[PrimerPair], path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| report_error(path, e))?;
    for pair in pairs {
        writer
            .serialize(pair_report_row(pair))
            .map_err(|e| report_error(path, e))?;
    }
    writer.flush().map_err(|e| report_error(path, e))
}

/// Distinct product sequences numbered by first appearance, foreground
/// before background, and the template-to-product mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductCatalog {
    pub sequences: Vec<String>,
    pub mapping: Vec<ProductMappingRow>,
}

impl ProductCatalog {
    pub fn from_products(products: &PairProducts) -> Self {
        let mut ret = Self::default();
        let mut index: HashMap<&str, usize> = HashMap::new();
        let tagged = products
            .foreground
            .iter()
            .flatten()
            .map(|p| (ProductOrigin::Foreground, p))
            .chain(
                products
                    .background
                    .iter()
                    .flatten()
                    .map(|p| (ProductOrigin::Background, p)),
            );
        for (origin, product) in tagged {
            let i = *index.entry(product.seq.as_str()).or_insert_with(|| {
                ret.sequences.push(product.seq.clone());
                ret.sequences.len() - 1
            });
            ret.mapping.push(ProductMappingRow {
                template: product.template.clone(),
                origin,
                product: product_label(i),
            });
        }
        ret
    }

    pub fn write_fasta(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| report_error(path, e))?;
        let mut writer = BufWriter::new(file);
        for (i, seq) in self.sequences.iter().enumerate() {
            writeln!(writer, ">{}_{}\n{}", product_label(i), seq.len(), seq)
                .map_err(|e| report_error(path, e))?;
        }
        writer.flush().map_err(|e| report_error(path, e))
    }

    /// Headerless `template<TAB>FG|BG<TAB>ProductN` lines.
    pub fn write_mapping(&self, path: &Path) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_path(path)
            .map_err(|e| report_error(path, e))?;
        for row in &self.mapping {
            writer.serialize(row).map_err(|e| report_error(path, e))?;
        }
        writer.flush().map_err(|e| report_error(path, e))
    }
}

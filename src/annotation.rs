//! Gene context for a chosen pair: which annotated genes its product covers.

use crate::{
    error::{PipelineError, Result, Stage},
    feature_location::feature_overlaps,
    primer::{DEFAULT_LOCALE, PrimerPair},
    product::PcrProduct,
};
use gb_io::seq::{Feature, Seq};
use std::path::Path;

const GENE_FEATURE: &str = "gene";
const MISSING_GENE_NAME: &str = "-";

/// Annotated reference records, read once from GenBank.
#[derive(Debug, Clone, Default)]
pub struct ReferenceAnnotation {
    records: Vec<Seq>,
}

impl ReferenceAnnotation {
    pub fn from_genbank_file(path: &Path) -> Result<Self> {
        let records = gb_io::reader::parse_file(path).map_err(|e| {
            PipelineError::new(
                Stage::Annotation,
                format!("Could not parse GenBank reference '{}': {e}", path.display()),
            )
        })?;
        if records.is_empty() {
            return Err(PipelineError::new(
                Stage::Annotation,
                format!("GenBank reference '{}' has no records", path.display()),
            ));
        }
        Ok(Self { records })
    }

    pub fn from_records(records: Vec<Seq>) -> Self {
        Self { records }
    }

    /// Record whose version, accession or locus name equals `template`.
    pub fn record_for(&self, template: &str) -> Option<&Seq> {
        self.records.iter().find(|seq| {
            [&seq.version, &seq.accession, &seq.name]
                .into_iter()
                .flatten()
                .any(|id| id == template)
        })
    }

    /// `locus_tag,gene` entries of genes overlapping `product`, or `None` when
    /// the product's contig is not in this reference.
    pub fn gene_context(&self, product: &PcrProduct) -> Option<String> {
        let record = self.record_for(&product.template)?;
        let start = product.start as i64;
        let end = product.end as i64;
        let mut loc_info: Vec<String> = vec![];
        for feature in record
            .features
            .iter()
            .filter(|f| is_gene(f) && feature_overlaps(f, start, end))
        {
            loc_info.extend(feature.qualifier_values("locus_tag".into()).map(str::to_string));
            let names: Vec<String> = feature
                .qualifier_values("gene".into())
                .map(str::to_string)
                .collect();
            if names.is_empty() {
                loc_info.push(MISSING_GENE_NAME.to_string());
            } else {
                loc_info.extend(names);
            }
        }
        Some(loc_info.join(","))
    }
}

fn is_gene(feature: &Feature) -> bool {
    feature.kind.to_string().eq_ignore_ascii_case(GENE_FEATURE)
}

/// Sets `pair.locale` from the first of its products that lies on the reference.
///
/// Returns false when none of the products is on a reference record. The locale
/// stays at its default when no gene overlaps.
pub fn annotate_pair(
    pair: &mut PrimerPair,
    reference: &ReferenceAnnotation,
    products: &[Option<PcrProduct>],
) -> bool {
    let Some(context) = products
        .iter()
        .flatten()
        .find_map(|product| reference.gene_context(product))
    else {
        return false;
    };
    pair.locale = if context.is_empty() {
        DEFAULT_LOCALE.to_string()
    } else {
        context
    };
    true
}

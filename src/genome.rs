//! In-memory genome store: contig sequences by identifier, loaded from FASTA.

use crate::error::{PipelineError, Result, Stage};
use bio::io::fasta;
use flate2::read::GzDecoder;
use std::{
    collections::HashMap,
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

const SEQUENCE_EXTENSIONS: [&str; 3] = ["fasta", "fa", "fna"];

#[derive(Debug, Clone, Default)]
pub struct GenomeSequences {
    name: String,
    path: PathBuf,
    contigs: HashMap<String, Vec<u8>>,
}

impl GenomeSequences {
    pub fn from_fasta_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PipelineError::new(
                Stage::Io,
                format!("Could not open genome '{}': {e}", path.display()),
            )
        })?;
        let reader: Box<dyn Read> = if is_gzip_path(path) {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut ret = Self::from_reader(reader).map_err(|e| {
            PipelineError::new(e.stage, format!("{} in genome '{}'", e.message, path.display()))
        })?;
        ret.name = genome_name(path);
        ret.path = path.to_path_buf();
        Ok(ret)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut contigs = HashMap::new();
        for record in fasta::Reader::new(reader).records() {
            let record = record.map_err(|e| {
                PipelineError::new(Stage::Input, format!("Could not parse FASTA record: {e}"))
            })?;
            let seq = record.seq().to_ascii_uppercase();
            if contigs.insert(record.id().to_string(), seq).is_some() {
                return Err(PipelineError::new(
                    Stage::Input,
                    format!("Duplicate contig '{}'", record.id()),
                ));
            }
        }
        if contigs.is_empty() {
            return Err(PipelineError::new(Stage::Input, "No sequence records"));
        }
        Ok(Self {
            contigs,
            ..Self::default()
        })
    }

    pub fn from_contigs<I, K, V>(name: &str, contigs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        Self {
            name: name.to_string(),
            path: PathBuf::new(),
            contigs: contigs
                .into_iter()
                .map(|(k, v)| (k.into(), v.as_ref().to_ascii_uppercase()))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contig(&self, id: &str) -> Option<&[u8]> {
        self.contigs.get(id).map(Vec::as_slice)
    }
}

fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// File name without sequence and compression extensions.
pub fn genome_name(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if let Some(stripped) = name.strip_suffix(".gz") {
        name = stripped.to_string();
    }
    for ext in SEQUENCE_EXTENSIONS {
        if let Some(stripped) = name.strip_suffix(&format!(".{ext}")) {
            name = stripped.to_string();
            break;
        }
    }
    if name.is_empty() {
        "genome".to_string()
    } else {
        name
    }
}

fn is_sequence_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().map(|s| s.to_string_lossy().to_ascii_lowercase())
    else {
        return false;
    };
    let file_name = file_name.strip_suffix(".gz").unwrap_or(&file_name);
    SEQUENCE_EXTENSIONS
        .iter()
        .any(|ext| file_name.ends_with(&format!(".{ext}")))
}

/// FASTA files (optionally gzipped) directly inside `dir`, sorted by path.
pub fn find_sequence_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        PipelineError::new(
            Stage::Io,
            format!("Could not list sequence directory '{}': {e}", dir.display()),
        )
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| {
                PipelineError::new(
                    Stage::Io,
                    format!("Could not read sequence directory '{}': {e}", dir.display()),
                )
            })?
            .path();
        if path.is_file() && is_sequence_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

use crate::error::{PipelineError, Result, Stage};

#[inline(always)]
pub fn is_primer_base(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

#[inline(always)]
pub fn base_complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'U' => b'A',
        _ => b'N',
    }
}

pub fn reverse_complement(seq: &str) -> String {
    seq.as_bytes()
        .iter()
        .rev()
        .map(|b| base_complement(*b))
        .map(char::from)
        .collect()
}

/// Uppercases a primer and rejects anything outside A/C/G/T.
pub fn normalize_primer_sequence(seq: &str) -> Result<String> {
    let upper = seq.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(PipelineError::new(Stage::Input, "Primer sequence is empty"));
    }
    if let Some(bad) = upper.bytes().find(|b| !is_primer_base(*b)) {
        return Err(PipelineError::new(
            Stage::Input,
            format!("Invalid primer base '{}' in '{upper}'", bad as char),
        ));
    }
    Ok(upper)
}

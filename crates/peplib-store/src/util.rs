use std::path::Path;

use peplib_core::fasta::Fasta;

use crate::Error;

/// Validated protein records from one or more FASTA files
#[derive(Clone, Debug, Default)]
pub struct FastaCollection {
    /// Surviving records; a record's position is its `fasta_index`
    pub fasta: Fasta,
    /// Records dropped for containing non-standard residues
    pub skipped: usize,
}

pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String, Error> {
    std::fs::read_to_string(path.as_ref()).map_err(|source| Error::Read {
        path: path.as_ref().display().to_string(),
        source,
    })
}

/// Read FASTA files in order and drop records with invalid sequences.
/// Surviving records are numbered consecutively across all files.
pub fn read_fasta<P: AsRef<Path>>(paths: &[P]) -> Result<FastaCollection, Error> {
    let mut fasta = Fasta::default();
    for path in paths {
        let parsed = Fasta::parse(&read_to_string(path)?);
        log::trace!(
            "read {} records from {}",
            parsed.len(),
            path.as_ref().display()
        );
        fasta.extend(parsed);
    }
    let skipped = fasta.retain_valid();
    if skipped > 0 {
        log::warn!("skipped {} FASTA entries with unknown residues", skipped);
    }
    Ok(FastaCollection { fasta, skipped })
}

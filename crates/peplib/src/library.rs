use crate::fasta::ProteinRecord;
use crate::index::PeptideProteinIndex;
use crate::ion_series::FragmentSpectrum;

/// Deduplicated theoretical spectra sorted by precursor mass, the
/// peptide-protein index, and the protein table it refers into.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralLibrary {
    pub spectra: Vec<FragmentSpectrum>,
    pub index: PeptideProteinIndex,
    pub proteins: Vec<ProteinRecord>,
}

impl SpectralLibrary {
    /// Sort spectra by ascending precursor mass, ties by sequence
    pub fn sort(&mut self) {
        self.spectra.sort_by(|a, b| {
            a.precursor_mass
                .total_cmp(&b.precursor_mass)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
    }

    /// Widest fragment ladder in the library
    pub fn max_fragments(&self) -> usize {
        self.spectra.iter().map(FragmentSpectrum::len).max().unwrap_or(0)
    }

    pub fn decoys(&self) -> usize {
        self.spectra.iter().filter(|s| is_decoy(&s.sequence)).count()
    }

    /// Spectra whose precursor mass falls in `[low, high]`. Requires the
    /// library to be sorted.
    pub fn precursor_range(&self, low: f64, high: f64) -> &[FragmentSpectrum] {
        let left = self.spectra.partition_point(|s| s.precursor_mass < low);
        let right = self.spectra.partition_point(|s| s.precursor_mass <= high);
        &self.spectra[left..right.max(left)]
    }

    /// Owning protein records of a peptide
    pub fn proteins_of(&self, sequence: &str) -> Vec<&ProteinRecord> {
        self.index
            .proteins(sequence)
            .into_iter()
            .filter_map(|idx| self.proteins.get(idx))
            .collect()
    }
}

pub fn is_decoy(sequence: &str) -> bool {
    sequence.ends_with(crate::peptide::DECOY_TAG)
}

use serde::{Deserialize, Serialize};

use crate::peptide::Peptide;

/// How decoy sequences are derived from target peptides
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoyStrategy {
    /// Reverse everything but the C-terminal residue, which stays in place
    pub pseudo_reverse: bool,
    /// Move unmodified A and L residues one position towards the C-terminus
    #[serde(rename = "AL_swap")]
    pub al_swap: bool,
    /// Exchange an unmodified C-terminal K for R and vice versa
    #[serde(rename = "KR_swap")]
    pub kr_swap: bool,
}

impl Default for DecoyStrategy {
    fn default() -> Self {
        Self {
            pseudo_reverse: true,
            al_swap: false,
            kr_swap: false,
        }
    }
}

impl DecoyStrategy {
    /// Generate the decoy counterpart of an (unmodified or protein-terminally
    /// modified) target peptide. Residue tokens move as a unit, so any
    /// modification encodings travel with their residue.
    pub fn decoy(&self, peptide: &Peptide) -> Peptide {
        let mut decoy = Peptide {
            residues: peptide.residues.clone(),
            decoy: true,
        };
        if decoy.residues.is_empty() {
            return decoy;
        }

        let n = decoy.residues.len();
        match self.pseudo_reverse {
            true => decoy.residues[..n - 1].reverse(),
            false => decoy.residues.reverse(),
        }

        if self.al_swap {
            swap_al(&mut decoy);
        }
        if self.kr_swap {
            swap_kr(&mut decoy);
        }
        decoy
    }
}

/// Scanning left to right, an unmodified A or L trades places with the
/// residue after it; the position it moves into is not revisited
fn swap_al(peptide: &mut Peptide) {
    let n = peptide.residues.len();
    let mut i = 0;
    while i + 1 < n {
        if peptide.residues[i].is(b'A') || peptide.residues[i].is(b'L') {
            peptide.residues.swap(i, i + 1);
            i += 1;
        }
        i += 1;
    }
}

fn swap_kr(peptide: &mut Peptide) {
    if let Some(last) = peptide.residues.last_mut() {
        if last.is(b'K') {
            last.aa = b'R';
        } else if last.is(b'R') {
            last.aa = b'K';
        }
    }
}

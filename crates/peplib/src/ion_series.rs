use serde::{Deserialize, Serialize};

use crate::mass::MassTable;
use crate::peptide::Peptide;
use crate::Error;

/// Fragment ion type. The discriminant is the persisted label.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Kind {
    B = 0,
    Y = 1,
}

impl Kind {
    pub fn label(self) -> i8 {
        self as i8
    }

    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            0 => Some(Kind::B),
            1 => Some(Kind::Y),
            _ => None,
        }
    }
}

/// Theoretical b/y ion
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ion {
    pub kind: Kind,
    /// Number of residues retained in the fragment (the `3` of `b3`)
    pub index: usize,
    /// Singly protonated fragment mass
    pub monoisotopic_mass: f64,
}

/// Generate b or y ions from the residue token masses of a peptide.
/// Yields one ion per backbone bond, i.e. `n - 1` ions for `n` residues.
pub struct IonSeries<'m> {
    pub kind: Kind,
    cumulative_mass: f64,
    masses: &'m [f64],
    idx: usize,
}

impl<'m> IonSeries<'m> {
    pub fn new(masses: &'m [f64], kind: Kind, table: &MassTable) -> Self {
        let cumulative_mass = match kind {
            Kind::B => table.proton,
            Kind::Y => table.proton + table.h2o,
        };
        Self {
            kind,
            cumulative_mass,
            masses,
            idx: 0,
        }
    }
}

impl<'m> Iterator for IonSeries<'m> {
    type Item = Ion;

    // Running sum from the retained terminus, one residue per step
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx + 1 >= self.masses.len() {
            return None;
        }
        let residue = match self.kind {
            Kind::B => self.masses[self.idx],
            Kind::Y => self.masses[self.masses.len() - 1 - self.idx],
        };
        self.cumulative_mass += residue;
        self.idx += 1;

        Some(Ion {
            kind: self.kind,
            index: self.idx,
            monoisotopic_mass: self.cumulative_mass,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.masses.len().saturating_sub(1).saturating_sub(self.idx);
        (n, Some(n))
    }
}

impl<'m> ExactSizeIterator for IonSeries<'m> {}

/// Neutral precursor mass: water plus every residue token
pub fn precursor_mass(peptide: &Peptide, table: &MassTable) -> Result<f64, Error> {
    let masses = peptide.token_masses(table)?;
    Ok(sum_precursor(&masses, table))
}

fn sum_precursor(masses: &[f64], table: &MassTable) -> f64 {
    masses.iter().fold(table.h2o, |acc, m| acc + m)
}

/// Named fragment masses, `b1..b(n-1)` followed by `y1..y(n-1)`
pub fn fragment_labels(peptide: &Peptide, table: &MassTable) -> Result<Vec<(String, f64)>, Error> {
    let masses = peptide.token_masses(table)?;
    let labels = IonSeries::new(&masses, Kind::B, table)
        .chain(IonSeries::new(&masses, Kind::Y, table))
        .map(|ion| {
            let name = match ion.kind {
                Kind::B => format!("b{}", ion.index),
                Kind::Y => format!("y{}", ion.index),
            };
            (name, ion.monoisotopic_mass)
        })
        .collect();
    Ok(labels)
}

/// A theoretical spectrum: precursor, textual peptide and its b/y ladder
/// sorted by ascending mass.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentSpectrum {
    pub precursor_mass: f64,
    pub sequence: String,
    pub fragment_masses: Vec<f64>,
    pub fragment_types: Vec<Kind>,
}

impl FragmentSpectrum {
    pub fn new(peptide: &Peptide, table: &MassTable) -> Result<Self, Error> {
        let masses = peptide.token_masses(table)?;

        let mut ions = IonSeries::new(&masses, Kind::B, table)
            .chain(IonSeries::new(&masses, Kind::Y, table))
            .map(|ion| (ion.monoisotopic_mass, ion.kind))
            .collect::<Vec<_>>();

        // Stable: equal masses keep b before y
        ions.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (fragment_masses, fragment_types) = ions.into_iter().unzip();

        Ok(FragmentSpectrum {
            precursor_mass: sum_precursor(&masses, table),
            sequence: peptide.to_string(),
            fragment_masses,
            fragment_types,
        })
    }

    /// Spectrum of a textual peptide (`PEPoxMIDE`, `EDITPEPK_decoy`, ...)
    pub fn from_sequence(sequence: &str, table: &MassTable) -> Result<Self, Error> {
        FragmentSpectrum::new(&sequence.parse()?, table)
    }

    pub fn len(&self) -> usize {
        self.fragment_masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragment_masses.is_empty()
    }
}

use std::fmt::Write;
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;

use crate::mass::MassTable;
use crate::Error;

/// Suffix appended to the textual form of decoy peptides
pub const DECOY_TAG: &str = "_decoy";

/// One residue token: an uppercase amino acid and the modification encodings
/// written in front of it, in textual order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Residue {
    pub aa: u8,
    pub mods: Vec<Arc<str>>,
}

impl Residue {
    pub fn new(aa: u8) -> Self {
        Self {
            aa,
            mods: Vec::new(),
        }
    }

    /// Is this the bare, unmodified residue `aa`?
    pub fn is(&self, aa: u8) -> bool {
        self.aa == aa && self.mods.is_empty()
    }
}

impl std::fmt::Display for Residue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for m in &self.mods {
            f.write_str(m)?;
        }
        f.write_char(self.aa as char)
    }
}

/// A peptide held as residue tokens plus a decoy flag. The textual encoding
/// (`PEPoxMIDE`, `aPEPTIDE_decoy`, ...) only exists at the boundaries, see
/// the [`std::fmt::Display`] and [`FromStr`] impls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Peptide {
    pub residues: Vec<Residue>,
    pub decoy: bool,
}

impl Peptide {
    /// Build an unmodified target peptide from a plain residue string
    pub fn unmodified(sequence: &str) -> Self {
        Self {
            residues: sequence.bytes().map(Residue::new).collect(),
            decoy: false,
        }
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// Residue letters without any modification encodings
    pub fn stripped(&self) -> String {
        self.residues.iter().map(|r| r.aa as char).collect()
    }

    /// Sub-peptide over a residue range; modifications travel with residues
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            residues: self.residues[range].to_vec(),
            decoy: self.decoy,
        }
    }

    pub fn label(&self) -> i32 {
        match self.decoy {
            true => -1,
            false => 1,
        }
    }

    /// Monoisotopic mass of every residue token, N- to C-terminus
    pub fn token_masses(&self, masses: &MassTable) -> Result<Vec<f64>, Error> {
        self.residues
            .iter()
            .map(|residue| {
                masses
                    .residue(residue)
                    .ok_or_else(|| Error::UnknownResidueOrModification {
                        token: residue.to_string(),
                        peptide: self.to_string(),
                    })
            })
            .collect()
    }
}

impl std::fmt::Display for Peptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for residue in &self.residues {
            write!(f, "{}", residue)?;
        }
        if self.decoy {
            f.write_str(DECOY_TAG)?;
        }
        Ok(())
    }
}

impl FromStr for Peptide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, tag) = match s.split_once('_') {
            Some((body, tag)) => (body, Some(tag)),
            None => (s, None),
        };

        let mut residues = Vec::with_capacity(body.len());
        let mut prefix = String::new();
        for c in body.chars() {
            if c.is_ascii_uppercase() {
                let mut residue = Residue::new(c as u8);
                if !prefix.is_empty() {
                    residue.mods.push(Arc::from(std::mem::take(&mut prefix)));
                }
                residues.push(residue);
            } else {
                prefix.push(c);
            }
        }

        if !prefix.is_empty() {
            return Err(Error::UnknownResidueOrModification {
                token: prefix,
                peptide: s.into(),
            });
        }

        Ok(Peptide {
            residues,
            decoy: tag == Some(&DECOY_TAG[1..]),
        })
    }
}

/// Split a textual peptide into residue tokens: every token ends with its
/// uppercase residue letter. A `_`-delimited suffix is dropped first.
pub fn parse_tokens(peptide: &str) -> Vec<&str> {
    let body = peptide.split('_').next().unwrap_or_default();
    let mut tokens = Vec::new();
    let mut start = 0;
    for (idx, c) in body.char_indices() {
        if c.is_ascii_uppercase() {
            tokens.push(&body[start..idx + c.len_utf8()]);
            start = idx + c.len_utf8();
        }
    }
    tokens
}

/// Append the decoy tag to textual peptides
pub fn add_decoy_tag<S: AsRef<str>>(peptides: &[S]) -> Vec<String> {
    peptides
        .iter()
        .map(|p| format!("{}{}", p.as_ref(), DECOY_TAG))
        .collect()
}

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::peptide::Residue;
use crate::Error;

pub const H2O: f64 = 18.010_564_68;
pub const PROTON: f64 = 1.007_276_466_87;

/// Residues accepted in protein sequences
pub const VALID_AA: [u8; 20] = *b"ACDEFGHIKLMNPQRSTVWY";

/// Marks a modification that may sit on any residue
pub const ANY_RESIDUE: char = '^';

const RESIDUES: [(u8, f64); 20] = [
    (b'A', 71.037_113_81),
    (b'C', 103.009_184_5),
    (b'D', 115.026_943_1),
    (b'E', 129.042_593_1),
    (b'F', 147.068_413_9),
    (b'G', 57.021_463_74),
    (b'H', 137.058_911_9),
    (b'I', 113.084_064_0),
    (b'K', 128.094_955_7),
    (b'L', 113.084_064_0),
    (b'M', 131.040_484_6),
    (b'N', 114.042_927_5),
    (b'P', 97.052_763_88),
    (b'Q', 128.058_577_5),
    (b'R', 156.101_111_1),
    (b'S', 87.032_028_44),
    (b'T', 101.047_678_5),
    (b'V', 99.068_413_95),
    (b'W', 186.079_313_0),
    (b'Y', 163.063_328_5),
];

/// A modification mass definition. Every residue listed in `residues` gets a
/// token `encoding + residue` whose mass is the residue mass plus `delta`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModificationMass {
    /// Lowercase prefix written in front of the residue, e.g. `ox` in `oxM`
    pub encoding: String,
    /// Residues that can carry the modification, or `^` for all of them
    pub residues: String,
    /// Mass shift relative to the unmodified residue
    pub delta: f64,
}

impl ModificationMass {
    pub fn new<S: Into<String>>(encoding: S, residues: S, delta: f64) -> Self {
        Self {
            encoding: encoding.into(),
            residues: residues.into(),
            delta,
        }
    }
}

pub fn default_modifications() -> Vec<ModificationMass> {
    vec![
        ModificationMass::new("c", "C", 57.021_464),
        ModificationMass::new("ox", "M", 15.994_915),
        ModificationMass::new("a", "^", 42.010_565),
        ModificationMass::new("am", "^", -0.984_016),
        ModificationMass::new("p", "STY", 79.966_331),
        ModificationMass::new("deam", "NQ", 0.984_016),
        ModificationMass::new("pg", "E", -18.010_565),
        ModificationMass::new("pg", "Q", -17.026_549),
    ]
}

/// Immutable lookup from residue tokens (`M`, `oxM`, `aA`, ...) to
/// monoisotopic masses. Built once per run and shared read-only by every
/// worker.
#[derive(Clone, Debug)]
pub struct MassTable {
    tokens: FnvHashMap<String, f64>,
    pub h2o: f64,
    pub proton: f64,
}

impl Default for MassTable {
    fn default() -> Self {
        let mut table = Self::standard();
        for modification in default_modifications() {
            // Built-in definitions are well formed
            let _ = table.insert_modification(&modification);
        }
        table
    }
}

impl MassTable {
    /// Unmodified residues only
    pub fn standard() -> Self {
        let tokens = RESIDUES
            .iter()
            .map(|(aa, mass)| ((*aa as char).to_string(), *mass))
            .collect();
        Self {
            tokens,
            h2o: H2O,
            proton: PROTON,
        }
    }

    /// Register `encoding + residue` tokens for a modification definition
    pub fn insert_modification(&mut self, modification: &ModificationMass) -> Result<(), Error> {
        let encoding = &modification.encoding;
        if encoding.is_empty()
            || encoding
                .chars()
                .any(|c| c.is_ascii_uppercase() || matches!(c, '_' | '<' | '>' | '^'))
        {
            return Err(Error::InvalidModification(encoding.clone()));
        }

        let residues: Vec<u8> = if modification.residues.contains(ANY_RESIDUE) {
            VALID_AA.to_vec()
        } else {
            modification.residues.bytes().collect()
        };

        for residue in residues {
            let base = self
                .tokens
                .get(&(residue as char).to_string())
                .copied()
                .ok_or_else(|| Error::UnknownResidueOrModification {
                    token: (residue as char).to_string(),
                    peptide: format!("{}{}", encoding, modification.residues),
                })?;
            self.tokens.insert(
                format!("{}{}", encoding, residue as char),
                base + modification.delta,
            );
        }
        Ok(())
    }

    pub fn get(&self, token: &str) -> Option<f64> {
        self.tokens.get(token).copied()
    }

    /// Mass of a structured residue token. Stacked modifications (`acC`)
    /// are not tabulated directly; each one contributes its own shift
    /// relative to the bare residue.
    pub fn residue(&self, residue: &Residue) -> Option<f64> {
        let aa = residue.aa as char;
        let base = self.get(&aa.to_string())?;
        match residue.mods.as_slice() {
            [] => Some(base),
            [single] => self.get(&format!("{}{}", single, aa)).or_else(|| {
                self.modification_delta(single, aa).map(|delta| base + delta)
            }),
            stacked => stacked.iter().try_fold(base, |mass, m| {
                self.modification_delta(m, aa).map(|delta| mass + delta)
            }),
        }
    }

    /// Mass shift of a modification prefix on `aa`. A prefix that is not a
    /// known encoding is split into known encodings (`ac` -> `a` + `c`).
    fn modification_delta(&self, prefix: &str, aa: char) -> Option<f64> {
        let base = self.get(&aa.to_string())?;
        if let Some(mass) = self.get(&format!("{}{}", prefix, aa)) {
            return Some(mass - base);
        }
        (1..prefix.len())
            .filter(|&split| prefix.is_char_boundary(split))
            .find_map(|split| {
                let head = self.get(&format!("{}{}", &prefix[..split], aa))?;
                let rest = self.modification_delta(&prefix[split..], aa)?;
                Some(head - base + rest)
            })
    }

    /// Mass of a textual residue token (`K`, `oxM`, `acC`)
    pub fn token(&self, token: &str) -> Option<f64> {
        if let Some(mass) = self.get(token) {
            return Some(mass);
        }
        let aa = token.chars().last()?;
        let prefix = &token[..token.len() - aa.len_utf8()];
        let base = self.get(&aa.to_string())?;
        match prefix.is_empty() {
            true => Some(base),
            false => self.modification_delta(prefix, aa).map(|delta| base + delta),
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains_key(token)
    }

    /// Mass of a single residue token; unknown tokens are an error, never zero
    pub fn residue_mass(&self, token: &str) -> Result<f64, Error> {
        self.token(token)
            .ok_or_else(|| Error::UnknownResidueOrModification {
                token: token.into(),
                peptide: token.into(),
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn smoke() {
        let table = MassTable::standard();
        for aa in VALID_AA {
            assert!(table.get(&(aa as char).to_string()).unwrap() > 0.0);
        }
        assert!(table.get("X").is_none());
    }

    #[test]
    fn default_modifications_expand() {
        let table = MassTable::default();
        let m = table.residue_mass("M").unwrap();
        let ox = table.residue_mass("oxM").unwrap();
        assert!((ox - m - 15.994_915).abs() < 1e-9);

        // `^` expands to every residue
        for aa in VALID_AA {
            assert!(table.contains(&format!("a{}", aa as char)));
        }
        assert!(table.contains("pgE") && table.contains("pgQ"));
        assert!(!table.contains("oxC"));
    }

    #[test]
    fn stacked_modifications_add_up() {
        let table = MassTable::default();
        let residue: crate::peptide::Peptide = "acC".parse().unwrap();
        let stacked = table.residue(&residue.residues[0]).unwrap();
        let expected = table.residue_mass("C").unwrap() + 42.010_565 + 57.021_464;
        assert!((stacked - expected).abs() < 1e-6);

        let single: crate::peptide::Peptide = "cC".parse().unwrap();
        assert_eq!(table.residue(&single.residues[0]), table.get("cC"));
    }

    #[test]
    fn stacked_tokens_resolve_from_text() {
        let table = MassTable::default();
        let expected = table.residue_mass("C").unwrap() + 42.010_565 + 57.021_464;
        assert!((table.residue_mass("acC").unwrap() - expected).abs() < 1e-6);

        // Text form collapses both encodings into one prefix
        let parsed: crate::peptide::Peptide = "acCEEK".parse().unwrap();
        assert_eq!(parsed.residues[0].mods.len(), 1);
        assert!((table.residue(&parsed.residues[0]).unwrap() - expected).abs() < 1e-6);

        // `am` is its own encoding, never `a` + `m`
        let am = table.residue_mass("amK").unwrap() - table.residue_mass("K").unwrap();
        assert!((am + 0.984_016).abs() < 1e-6);

        assert!(table.residue_mass("acM").is_err());
        assert!(table.residue_mass("xC").is_err());
    }

    #[test]
    fn unknown_token_is_an_error() {
        let table = MassTable::default();
        assert!(matches!(
            table.residue_mass("zzK"),
            Err(Error::UnknownResidueOrModification { .. })
        ));
    }

    #[test]
    fn reject_bad_encoding() {
        let mut table = MassTable::standard();
        assert!(table
            .insert_modification(&ModificationMass::new("Ox", "M", 16.0))
            .is_err());
        assert!(table
            .insert_modification(&ModificationMass::new("", "M", 16.0))
            .is_err());
        assert!(table
            .insert_modification(&ModificationMass::new("x", "B", 16.0))
            .is_err());
    }
}

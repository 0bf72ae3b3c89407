//! Fixed, variable and terminal modifications, and the isoform engine
//!
//! Modifications are configured with the textual encodings that also appear
//! inside peptide strings:
//!
//! * `oxM` - internal modification `ox` on every `M`
//! * `a<^` - `a` on the N-terminal residue, whatever it is
//! * `am>^` - `am` on the C-terminal residue, whatever it is
//! * `pg<Q` - `pg` on the N-terminal residue, only if it is a `Q`

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};

use crate::mass::{MassTable, ANY_RESIDUE, VALID_AA};
use crate::peptide::Peptide;
use crate::Error;

/// Internal modification of a specific residue
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Modification {
    pub encoding: Arc<str>,
    pub residue: u8,
}

impl FromStr for Modification {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let residue = s.bytes().last().filter(|r| VALID_AA.contains(r));
        let encoding = s.get(..s.len().saturating_sub(1)).unwrap_or_default();
        match residue {
            Some(residue)
                if !encoding.is_empty() && !encoding.bytes().any(|c| c.is_ascii_uppercase()) =>
            {
                Ok(Modification {
                    encoding: Arc::from(encoding),
                    residue,
                })
            }
            _ => Err(Error::InvalidModification(s.into())),
        }
    }
}

impl Display for Modification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.encoding, self.residue as char)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Terminus {
    N,
    C,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TerminalTarget {
    Any,
    Residue(u8),
}

/// Modification restricted to the first or last residue of a peptide (or
/// protein)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TerminalModification {
    pub encoding: Arc<str>,
    pub terminus: Terminus,
    pub target: TerminalTarget,
}

impl FromStr for TerminalModification {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars = s.chars().collect::<Vec<_>>();
        if chars.len() < 3 {
            return Err(Error::InvalidTerminalModificationEncoding(s.into()));
        }
        let n = chars.len();
        let terminus = match chars[n - 2] {
            '<' => Terminus::N,
            '>' => Terminus::C,
            _ => return Err(Error::InvalidTerminalModificationEncoding(s.into())),
        };
        let target = match chars[n - 1] {
            ANY_RESIDUE => TerminalTarget::Any,
            c if c.is_ascii() && VALID_AA.contains(&(c as u8)) => TerminalTarget::Residue(c as u8),
            _ => return Err(Error::InvalidTerminalModificationEncoding(s.into())),
        };
        let encoding = chars[..n - 2].iter().collect::<String>();
        if encoding.chars().any(|c| c.is_ascii_uppercase() || c == '<' || c == '>') {
            return Err(Error::InvalidTerminalModificationEncoding(s.into()));
        }
        Ok(TerminalModification {
            encoding: Arc::from(encoding),
            terminus,
            target,
        })
    }
}

impl Display for TerminalModification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = match self.terminus {
            Terminus::N => '<',
            Terminus::C => '>',
        };
        let target = match self.target {
            TerminalTarget::Any => ANY_RESIDUE,
            TerminalTarget::Residue(r) => r as char,
        };
        write!(f, "{}{}{}", self.encoding, side, target)
    }
}

impl TerminalModification {
    /// Residue tokens this modification can produce
    pub fn tokens(&self) -> Vec<String> {
        match self.target {
            TerminalTarget::Any => VALID_AA
                .iter()
                .map(|aa| format!("{}{}", self.encoding, *aa as char))
                .collect(),
            TerminalTarget::Residue(r) => vec![format!("{}{}", self.encoding, r as char)],
        }
    }
}

impl Peptide {
    /// Apply a fixed internal modification to every matching residue
    pub fn fixed_mod(&mut self, m: &Modification) {
        for residue in self.residues.iter_mut().filter(|r| r.aa == m.residue) {
            residue.mods.push(m.encoding.clone());
        }
    }

    /// Apply a terminal modification in-place.
    ///
    /// * any-residue N-term: written in front of everything on the first residue
    /// * any-residue C-term: written directly in front of the last residue letter
    /// * residue-specific N-term: only on an unmodified first residue
    /// * residue-specific C-term: only if the last residue letter matches
    pub fn terminal_mod(&mut self, m: &TerminalModification) {
        let residue = match m.terminus {
            Terminus::N => self.residues.first_mut(),
            Terminus::C => self.residues.last_mut(),
        };
        let Some(residue) = residue else {
            return;
        };
        match (m.terminus, m.target) {
            (Terminus::N, TerminalTarget::Any) => residue.mods.insert(0, m.encoding.clone()),
            (Terminus::C, TerminalTarget::Any) => residue.mods.push(m.encoding.clone()),
            (Terminus::N, TerminalTarget::Residue(r)) => {
                if residue.is(r) {
                    residue.mods.push(m.encoding.clone());
                }
            }
            (Terminus::C, TerminalTarget::Residue(r)) => {
                if residue.aa == r {
                    residue.mods.push(m.encoding.clone());
                }
            }
        }
    }

    /// Lazily enumerate variable-modification isoforms, see [`Isoforms`]
    pub fn isoforms<'p>(
        &'p self,
        variable: &'p FnvHashMap<u8, Arc<str>>,
        max_isoforms: usize,
    ) -> Isoforms<'p> {
        let sites = self
            .residues
            .iter()
            .enumerate()
            .filter_map(|(idx, r)| variable.get(&r.aa).map(|m| (idx, m)))
            .collect::<Vec<_>>();
        Isoforms {
            peptide: self,
            state: vec![false; sites.len()],
            sites,
            remaining: max_isoforms,
            done: false,
        }
    }
}

/// Cartesian product of {unmodified, modified} over every residue that has a
/// variable modification.
///
/// Combinations are produced lexicographically over position (the first
/// modifiable residue varies slowest, unmodified before modified), so the
/// first item is always the peptide itself and truncation at `max_isoforms`
/// is deterministic. Nothing beyond the current combination is materialized.
pub struct Isoforms<'p> {
    peptide: &'p Peptide,
    sites: Vec<(usize, &'p Arc<str>)>,
    state: Vec<bool>,
    remaining: usize,
    done: bool,
}

impl<'p> Iterator for Isoforms<'p> {
    type Item = Peptide;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let mut isoform = self.peptide.clone();
        for ((idx, encoding), modified) in self.sites.iter().zip(&self.state) {
            if *modified {
                isoform.residues[*idx].mods.push((*encoding).clone());
            }
        }

        // Advance the odometer, last site fastest
        self.done = true;
        for flag in self.state.iter_mut().rev() {
            if *flag {
                *flag = false;
            } else {
                *flag = true;
                self.done = false;
                break;
            }
        }

        Some(isoform)
    }
}

/// Keep the first occurrence of every peptide
fn unique(peptides: Vec<Peptide>) -> Vec<Peptide> {
    let mut seen = FnvHashSet::default();
    peptides
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Ordered modification configuration for one stage of the pipeline
#[derive(Clone, Debug, Default)]
pub struct Modifications {
    /// Applied first, in declaration order
    pub fixed: Vec<Modification>,
    /// Residue -> variable modification. A later declaration for the same
    /// residue replaces an earlier one.
    pub variable: FnvHashMap<u8, Arc<str>>,
    pub fixed_terminal: Vec<TerminalModification>,
    pub variable_terminal: Vec<TerminalModification>,
    pub max_isoforms: usize,
}

impl Modifications {
    pub fn new(
        fixed: Vec<Modification>,
        variable: Vec<Modification>,
        fixed_terminal: Vec<TerminalModification>,
        variable_terminal: Vec<TerminalModification>,
        max_isoforms: usize,
    ) -> Self {
        let mut map = FnvHashMap::default();
        for m in variable {
            if let Some(prev) = map.insert(m.residue, m.encoding.clone()) {
                log::warn!(
                    "variable modification `{}` replaces `{}{}`",
                    m,
                    prev,
                    m.residue as char
                );
            }
        }
        Self {
            fixed,
            variable: map,
            fixed_terminal,
            variable_terminal,
            max_isoforms,
        }
    }

    /// Check that every residue token this configuration can produce has a mass
    pub fn validate(&self, masses: &MassTable) -> Result<(), Error> {
        let internal = self
            .fixed
            .iter()
            .map(|m| (m.to_string(), m.to_string()))
            .chain(self.variable.iter().map(|(r, enc)| {
                let token = format!("{}{}", enc, *r as char);
                (token.clone(), token)
            }));
        let terminal = self
            .fixed_terminal
            .iter()
            .chain(&self.variable_terminal)
            .flat_map(|m| m.tokens().into_iter().map(move |t| (t, m.to_string())));

        for (token, source) in internal.chain(terminal) {
            if !masses.contains(&token) {
                return Err(Error::UnknownResidueOrModification {
                    token,
                    peptide: source,
                });
            }
        }
        Ok(())
    }

    pub fn apply_fixed(&self, peptides: &mut [Peptide]) {
        for m in &self.fixed {
            peptides.iter_mut().for_each(|p| p.fixed_mod(m));
        }
    }

    pub fn apply_fixed_terminal(&self, peptides: &mut [Peptide]) {
        for m in &self.fixed_terminal {
            peptides.iter_mut().for_each(|p| p.terminal_mod(m));
        }
    }

    /// Both modified and unmodified variants are kept. N-terminal variants
    /// are expanded first, then C-terminal variants over that result.
    pub fn apply_variable_terminal(&self, peptides: Vec<Peptide>) -> Vec<Peptide> {
        if self.variable_terminal.is_empty() {
            return peptides;
        }

        let expand = |base: &[Peptide], terminus: Terminus| {
            let mut out = base.to_vec();
            for m in self.variable_terminal.iter().filter(|m| m.terminus == terminus) {
                out.extend(base.iter().map(|p| {
                    let mut p = p.clone();
                    p.terminal_mod(m);
                    p
                }));
            }
            unique(out)
        };

        let nterm = expand(&peptides[..], Terminus::N);
        expand(&nterm[..], Terminus::C)
    }

    pub fn apply_variable<'a>(
        &'a self,
        peptides: &'a [Peptide],
    ) -> impl Iterator<Item = Peptide> + 'a {
        peptides
            .iter()
            .flat_map(move |p| p.isoforms(&self.variable, self.max_isoforms))
    }

    /// Fixed, fixed terminal, variable terminal, then variable internal
    pub fn apply(&self, mut peptides: Vec<Peptide>) -> Vec<Peptide> {
        self.apply_fixed(&mut peptides);
        self.apply_fixed_terminal(&mut peptides);
        let peptides = self.apply_variable_terminal(peptides);
        if self.variable.is_empty() {
            return peptides;
        }
        let isoforms = self.apply_variable(&peptides).collect();
        isoforms
    }

    /// Terminal-only pass used on whole proteins before digestion
    pub fn apply_terminal(&self, mut peptides: Vec<Peptide>) -> Vec<Peptide> {
        self.apply_fixed_terminal(&mut peptides);
        self.apply_variable_terminal(peptides)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn strings(peptides: &[Peptide]) -> Vec<String> {
        peptides.iter().map(ToString::to_string).collect()
    }

    fn pep(s: &str) -> Peptide {
        Peptide::unmodified(s)
    }

    #[test]
    fn parse_modifications() {
        let m = "oxM".parse::<Modification>().unwrap();
        assert_eq!(&*m.encoding, "ox");
        assert_eq!(m.residue, b'M');
        assert_eq!(m.to_string(), "oxM");
        assert!("M".parse::<Modification>().is_err());
        assert!("oxB".parse::<Modification>().is_err());
        assert!("oXM".parse::<Modification>().is_err());

        let t = "a<^".parse::<TerminalModification>().unwrap();
        assert_eq!(t.terminus, Terminus::N);
        assert_eq!(t.target, TerminalTarget::Any);
        assert_eq!(t.to_string(), "a<^");

        let t = "pg>Q".parse::<TerminalModification>().unwrap();
        assert_eq!(t.terminus, Terminus::C);
        assert_eq!(t.target, TerminalTarget::Residue(b'Q'));

        for bad in ["aM", "a^", "a", "a<x", "a=^"] {
            assert!(
                matches!(
                    bad.parse::<TerminalModification>(),
                    Err(Error::InvalidTerminalModificationEncoding(_))
                ),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn fixed_mods_rewrite_every_residue() {
        let mods = Modifications::new(
            vec!["cC".parse().unwrap(), "xC".parse().unwrap()],
            vec![],
            vec![],
            vec![],
            1,
        );
        let mut peptides = vec![pep("ACDCK")];
        mods.apply_fixed(&mut peptides);
        // Declaration order matters: second mod lands between first and residue
        assert_eq!(strings(&peptides), vec!["AcxCDcxCK"]);
    }

    #[test]
    fn fixed_terminal_mods() {
        let cases = [
            ("a<^", "MEEK", "aMEEK"),
            ("am>^", "MEEK", "MEEamK"),
            ("pg<Q", "QEEK", "pgQEEK"),
            ("pg<Q", "EQEK", "EQEK"),
            ("x>K", "MEEK", "MEExK"),
            ("x>K", "MEER", "MEER"),
        ];
        for (m, input, expected) in cases {
            let mut p = pep(input);
            p.terminal_mod(&m.parse().unwrap());
            assert_eq!(p.to_string(), expected);
        }

        // Residue-specific N-term mods need a bare first residue
        let mut p = "cCEEK".parse::<Peptide>().unwrap();
        p.terminal_mod(&"x<C".parse().unwrap());
        assert_eq!(p.to_string(), "cCEEK");

        // Any-residue N-term goes in front of existing encodings,
        // any-residue C-term directly before the letter
        let mut p = "cCEEcC".parse::<Peptide>().unwrap();
        p.terminal_mod(&"a<^".parse().unwrap());
        p.terminal_mod(&"am>^".parse().unwrap());
        assert_eq!(p.to_string(), "acCEEcamC");
    }

    #[test]
    fn variable_terminal_mods() {
        let mods = Modifications::new(
            vec![],
            vec![],
            vec![],
            vec!["a<^".parse().unwrap(), "am>^".parse().unwrap()],
            1,
        );
        let out = mods.apply_variable_terminal(vec![pep("MEEK")]);
        assert_eq!(strings(&out), vec!["MEEK", "aMEEK", "MEEamK", "aMEEamK"]);

        // Unchanged variants collapse
        let mods = Modifications::new(vec![], vec![], vec![], vec!["pg<Q".parse().unwrap()], 1);
        let out = mods.apply_variable_terminal(vec![pep("MEEK"), pep("QEEK")]);
        assert_eq!(strings(&out), vec!["MEEK", "QEEK", "pgQEEK"]);
    }

    #[test]
    fn isoforms_are_lexicographic() {
        let mods = Modifications::new(
            vec![],
            vec!["oxM".parse().unwrap(), "pS".parse().unwrap()],
            vec![],
            vec![],
            1024,
        );
        let out = mods.apply(vec![pep("AMSM")]);
        assert_eq!(
            strings(&out),
            vec![
                "AMSM", "AMSoxM", "AMpSM", "AMpSoxM", "AoxMSM", "AoxMSoxM", "AoxMpSM", "AoxMpSoxM",
            ]
        );
    }

    #[test]
    fn isoforms_are_capped() {
        let mut variable = FnvHashMap::default();
        variable.insert(b'M', Arc::from("ox"));

        let peptide = pep(&"M".repeat(80));
        let isoforms = peptide.isoforms(&variable, 5).collect::<Vec<_>>();
        assert_eq!(isoforms.len(), 5);
        assert_eq!(isoforms[0], peptide);
        assert_eq!(isoforms[1].residues[79].mods.len(), 1);
        assert_eq!(isoforms[2].residues[78].mods.len(), 1);

        // No modifiable residues: the peptide itself, once
        let plain = pep("PEPTIDE");
        assert_eq!(plain.isoforms(&variable, 5).count(), 1);

        // Exhaustive enumeration stops on its own
        let small = pep("MAM");
        assert_eq!(small.isoforms(&variable, 100).count(), 4);
        assert_eq!(small.isoforms(&variable, 0).count(), 0);
    }

    #[test]
    fn full_pipeline_order() {
        let mods = Modifications::new(
            vec!["cC".parse().unwrap()],
            vec!["oxM".parse().unwrap()],
            vec!["a<^".parse().unwrap()],
            vec!["am>^".parse().unwrap()],
            16,
        );
        let out = mods.apply(vec![pep("MCK")]);
        assert_eq!(
            strings(&out),
            vec!["aMcCK", "aoxMcCK", "aMcCamK", "aoxMcCamK"]
        );
    }

    #[test]
    fn validation() {
        let masses = MassTable::default();
        let ok = Modifications::new(
            vec!["cC".parse().unwrap()],
            vec!["oxM".parse().unwrap()],
            vec![],
            vec!["a<^".parse().unwrap()],
            1,
        );
        assert!(ok.validate(&masses).is_ok());

        let bad = Modifications::new(vec!["zzC".parse().unwrap()], vec![], vec![], vec![], 1);
        assert!(matches!(
            bad.validate(&masses),
            Err(Error::UnknownResidueOrModification { .. })
        ));

        let bad = Modifications::new(vec![], vec![], vec!["ox<^".parse().unwrap()], vec![], 1);
        assert!(bad.validate(&masses).is_err());
    }
}

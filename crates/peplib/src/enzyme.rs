use std::ops::Range;

use fnv::FnvHashSet;
use regex::Regex;

use crate::mass::VALID_AA;
use crate::Error;

/// An enzymatic digest: a cleaved subsequence of a protein
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Digest<'s> {
    /// Cleaved peptide sequence
    pub sequence: &'s str,
    /// Residue range in the parent sequence
    pub range: Range<usize>,
    /// Number of cleavage sites spanned by this digest
    pub missed_cleavages: u8,
}

/// A protease cleavage rule
#[derive(Clone, Debug)]
pub struct Protease {
    pub name: String,
    // Regex for matching cleavage residues
    regex: Regex,
    // Skip cleaving if the site is followed by this residue
    skip_suffix: Option<u8>,
    // Cleave after (true) or before (false) the matched residue
    c_terminal: bool,
}

/// Known proteases: name, cleavage residues, restricting next residue,
/// cleaves C-terminal to the residue
const PROTEASES: &[(&str, &str, Option<char>, bool)] = &[
    ("trypsin", "KR", Some('P'), true),
    ("trypsin/p", "KR", None, true),
    ("arg-c", "R", None, true),
    ("clostripain", "R", None, true),
    ("lys-c", "K", None, true),
    ("lys-n", "K", None, false),
    ("asp-n", "D", None, false),
    ("glutamyl endopeptidase", "E", None, true),
    ("formic acid", "D", None, true),
    ("cnbr", "M", None, true),
    ("bnps-skatole", "W", None, true),
    ("iodosobenzoic acid", "W", None, true),
    ("non-specific", "", None, true),
];

impl Protease {
    /// Build a cleavage rule. An empty `cleave` string cleaves after every
    /// residue.
    pub fn new(
        name: &str,
        cleave: &str,
        skip_suffix: Option<char>,
        c_terminal: bool,
    ) -> Result<Self, Error> {
        if !cleave.bytes().all(|x| VALID_AA.contains(&x)) {
            return Err(Error::UnknownProtease(format!(
                "{}: cleavage residues `{}` are not amino acids",
                name, cleave
            )));
        }
        if let Some(skip) = skip_suffix {
            if !skip.is_ascii() || !VALID_AA.contains(&(skip as u8)) {
                return Err(Error::UnknownProtease(format!(
                    "{}: restriction `{}` is not an amino acid",
                    name, skip
                )));
            }
        }

        let pattern = match cleave {
            "" => ".".to_string(),
            _ => format!("[{}]", cleave),
        };
        let regex = Regex::new(&pattern)
            .map_err(|e| Error::UnknownProtease(format!("{}: {}", name, e)))?;

        Ok(Protease {
            name: name.into(),
            regex,
            skip_suffix: skip_suffix.map(|c| c as u8),
            c_terminal,
        })
    }

    /// Look up a protease by (case-insensitive) name
    pub fn from_name(name: &str) -> Result<Self, Error> {
        let lower = name.to_ascii_lowercase();
        PROTEASES
            .iter()
            .find(|(n, ..)| *n == lower)
            .ok_or_else(|| {
                let known = Protease::names().collect::<Vec<_>>().join(", ");
                Error::UnknownProtease(format!("`{}`, expected one of: {}", name, known))
            })
            .and_then(|(n, cleave, skip, c_terminal)| Protease::new(n, cleave, *skip, *c_terminal))
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        PROTEASES.iter().map(|(n, ..)| *n)
    }

    /// Every position where the rule matches, as a cut position. This may
    /// include a cut at the very end (or start) of the sequence.
    fn matches<'a>(&'a self, sequence: &'a str) -> impl Iterator<Item = usize> + 'a {
        let bytes = sequence.as_bytes();
        self.regex.find_iter(sequence).filter_map(move |mat| match self.c_terminal {
            true => match (self.skip_suffix, bytes.get(mat.end())) {
                // A restricted rule needs a following residue that isn't the restriction
                (Some(_), None) => None,
                (Some(skip), Some(next)) if *next == skip => None,
                _ => Some(mat.end()),
            },
            // Cleaving in front of a residue needs a residue before it
            false => (mat.start() > 0).then_some(mat.start()),
        })
    }

    /// Internal cut positions, ascending, excluding both sequence ends
    pub fn cleavage_sites(&self, sequence: &str) -> Vec<usize> {
        let n = sequence.len();
        self.matches(sequence)
            .filter(|&pos| pos > 0 && pos < n)
            .collect()
    }

    /// Number of cleavage-rule matches within a sequence
    pub fn count_cleavage_sites(&self, sequence: &str) -> usize {
        self.matches(sequence).count()
    }

    /// 1 if the last residue is not itself a cleavage residue (the peptide
    /// did not arise from a cut at its C-terminus), 0 otherwise
    pub fn is_internal_cleavage(&self, sequence: &str) -> u8 {
        let last = match sequence.chars().last() {
            Some(c) => c,
            None => return 1,
        };
        let mut buf = [0u8; 4];
        let cleaves = self.c_terminal && self.regex.is_match(last.encode_utf8(&mut buf));
        match cleaves {
            true => 0,
            false => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EnzymeParameters {
    /// Number of missed cleavages to produce
    pub missed_cleavages: u8,
    /// Inclusive, in residues
    pub min_len: usize,
    /// Inclusive, in residues
    pub max_len: usize,
    pub protease: Protease,
}

impl EnzymeParameters {
    /// Residue ranges of the fully cleaved base fragments, covering the
    /// whole sequence from position 0 to its end
    pub fn base_fragments(&self, sequence: &str) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut left = 0;
        for right in self.protease.cleavage_sites(sequence) {
            ranges.push(left..right);
            left = right;
        }
        ranges.push(left..sequence.len());
        ranges
    }

    /// Fully cleaved fragments plus every contiguous join of `k + 1` base
    /// fragments for `k` in `1..=missed_cleavages`, filtered to the length
    /// bounds. Each distinct subsequence is reported once.
    pub fn digest<'s>(&self, sequence: &'s str) -> Vec<Digest<'s>> {
        let sites = self.base_fragments(sequence);
        let mut digests = Vec::new();

        // Same peptide may occur multiple times in a protein
        let mut seen = FnvHashSet::default();

        for cleavage in 1..=(1 + self.missed_cleavages as usize) {
            for win in sites.windows(cleavage) {
                let range = win[0].start..win[cleavage - 1].end;
                let len = range.len();
                let peptide = &sequence[range.clone()];
                if len >= self.min_len && len <= self.max_len && len > 0 && seen.insert(peptide) {
                    digests.push(Digest {
                        sequence: peptide,
                        range,
                        missed_cleavages: (cleavage - 1) as u8,
                    });
                }
            }
        }
        digests
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params(protease: &str, missed_cleavages: u8, min_len: usize, max_len: usize) -> EnzymeParameters {
        EnzymeParameters {
            missed_cleavages,
            min_len,
            max_len,
            protease: Protease::from_name(protease).unwrap(),
        }
    }

    fn sequences(params: &EnzymeParameters, sequence: &str) -> Vec<String> {
        params
            .digest(sequence)
            .into_iter()
            .map(|d| d.sequence.to_string())
            .collect()
    }

    #[test]
    fn trypsin_base_fragments() {
        let tryp = params("trypsin", 0, 1, 100);
        assert_eq!(
            sequences(&tryp, "ACDEFGHKRILMNPQSTVWY"),
            vec!["ACDEFGHK", "R", "ILMNPQSTVWY"]
        );
    }

    #[test]
    fn trypsin() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";
        let tryp = params("trypsin", 0, 2, 50);
        assert_eq!(
            sequences(&tryp, sequence),
            vec!["MADEEK", "LPPGWEK", "MSR", "SSGR", "VYYFNHITNASQWERPSGN"]
        );
    }

    #[test]
    fn trypsin_missed_cleavage() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";
        let expected = vec![
            "MADEEK",
            "LPPGWEK",
            "R",
            "MSR",
            "SSGR",
            "VYYFNHITNASQWERPSGN",
            "MADEEKLPPGWEK",
            "LPPGWEKR",
            "RMSR",
            "MSRSSGR",
            "SSGRVYYFNHITNASQWERPSGN",
            "MADEEKLPPGWEKR",
            "LPPGWEKRMSR",
            "RMSRSSGR",
            "MSRSSGRVYYFNHITNASQWERPSGN",
        ];
        assert_eq!(sequences(&params("trypsin", 2, 0, 50), sequence), expected);

        let digests = params("trypsin", 2, 0, 50).digest(sequence);
        assert_eq!(digests[6].missed_cleavages, 1);
        assert_eq!(digests[11].missed_cleavages, 2);
        assert_eq!(&sequence[digests[11].range.clone()], "MADEEKLPPGWEKR");
    }

    #[test]
    fn trypsin_p() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";
        assert_eq!(
            sequences(&params("trypsin/p", 0, 2, 50), sequence),
            vec!["MADEEK", "LPPGWEK", "MSR", "SSGR", "VYYFNHITNASQWER", "PSGN"]
        );
    }

    #[test]
    fn asp_n() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGNW";
        assert_eq!(
            sequences(&params("asp-n", 0, 1, 50), sequence),
            vec!["MA", "DEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGNW"]
        );
        // A leading D is not a cut
        assert_eq!(sequences(&params("asp-n", 0, 1, 50), "DAADK"), vec!["DAA", "DK"]);
    }

    #[test]
    fn non_specific_missed_cleavages_are_windows() {
        let sequence = "PEPTIDE";
        let out = sequences(&params("non-specific", 2, 3, 3), sequence);
        let expected = sequence
            .as_bytes()
            .windows(3)
            .flat_map(std::str::from_utf8)
            .collect::<Vec<_>>();
        assert_eq!(out, expected);
    }

    #[test]
    fn ensure_unique() {
        let sequence = "KVEGAQNQGKKVEGAQNQGK";
        assert_eq!(
            sequences(&params("lys-c", 0, 2, usize::MAX), sequence),
            vec!["VEGAQNQGK"]
        );
    }

    #[test]
    fn terminal_fragments_are_kept() {
        // No internal site: the whole sequence is the single fragment
        let tryp = params("trypsin", 1, 1, 100);
        assert_eq!(sequences(&tryp, "PEPTIDEK"), vec!["PEPTIDEK"]);
        assert_eq!(tryp.base_fragments("PEPTIDEK"), vec![0..8]);
        assert_eq!(tryp.base_fragments(""), vec![0..0]);
        assert!(tryp.digest("").is_empty());
    }

    #[test]
    fn cleavage_counts() {
        let tryp = Protease::from_name("trypsin").unwrap();
        assert_eq!(tryp.count_cleavage_sites("ACDEFGHKRILMNPQSTVWY"), 2);
        // Terminal K has no following residue, KP is blocked
        assert_eq!(tryp.count_cleavage_sites("PEPKPTIDEK"), 0);
        assert_eq!(tryp.count_cleavage_sites("PEPKATIDEK"), 1);

        let lysc = Protease::from_name("lys-c").unwrap();
        assert_eq!(lysc.count_cleavage_sites("PEPKATIDEK"), 2);
    }

    #[test]
    fn internal_cleavage_flag() {
        let tryp = Protease::from_name("Trypsin").unwrap();
        assert_eq!(tryp.is_internal_cleavage("PEPTIDEK"), 0);
        assert_eq!(tryp.is_internal_cleavage("PEPTIDER"), 0);
        assert_eq!(tryp.is_internal_cleavage("PEPTIDE"), 1);

        let aspn = Protease::from_name("asp-n").unwrap();
        assert_eq!(aspn.is_internal_cleavage("PEPTID"), 1);
    }

    #[test]
    fn unknown_protease() {
        assert!(matches!(
            Protease::from_name("pepsin"),
            Err(Error::UnknownProtease(_))
        ));
        let message = Protease::from_name("pepsin").unwrap_err().to_string();
        assert!(message.contains("`pepsin`"));
        assert!(message.contains("trypsin/p") && message.contains("non-specific"));
        assert!(Protease::new("bad", "KB", None, true).is_err());
    }
}

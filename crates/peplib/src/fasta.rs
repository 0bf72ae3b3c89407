use serde::{Deserialize, Serialize};

use crate::mass::VALID_AA;
use crate::Error;

/// One protein entry of a FASTA file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProteinRecord {
    /// Accession: second `|` field of the header's first word (`sp|P12345|NAME`),
    /// or the whole first word
    pub id: String,
    /// First word of the header
    pub name: String,
    /// Full header line, without `>`
    pub description: String,
    pub sequence: String,
}

impl ProteinRecord {
    fn from_header(header: &str, sequence: String) -> Self {
        let description = header.trim().to_string();
        let name = description
            .split_ascii_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        let id = match name.split('|').nth(1) {
            Some(accession) => accession.to_string(),
            None => name.clone(),
        };
        ProteinRecord {
            id,
            name,
            description,
            sequence,
        }
    }
}

/// Reject a record whose sequence contains anything outside the 20 standard
/// residues. The error lists the offending characters.
pub fn check_sequence(record: &ProteinRecord) -> Result<(), Error> {
    let mut invalid = record
        .sequence
        .chars()
        .filter(|c| !c.is_ascii() || !VALID_AA.contains(&(*c as u8)))
        .collect::<Vec<_>>();
    if invalid.is_empty() {
        return Ok(());
    }
    invalid.sort_unstable();
    invalid.dedup();
    Err(Error::InvalidSequence {
        id: record.id.clone(),
        residues: invalid.into_iter().collect(),
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fasta {
    pub records: Vec<ProteinRecord>,
}

impl Fasta {
    /// Parse FASTA-formatted text. Sequence lines are concatenated; records
    /// without any sequence are kept so that `check_sequence` and the
    /// digestion stage decide what happens to them.
    pub fn parse(contents: &str) -> Fasta {
        let mut records = Vec::new();
        let mut header: Option<&str> = None;
        let mut s = String::new();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            if let Some(next) = line.strip_prefix('>') {
                if let Some(header) = header {
                    records.push(ProteinRecord::from_header(header, std::mem::take(&mut s)));
                }
                header = Some(next);
            } else if header.is_some() {
                s.push_str(line);
            } else {
                log::warn!("ignoring sequence data before the first FASTA header");
            }
        }

        if let Some(header) = header {
            records.push(ProteinRecord::from_header(header, s));
        }

        Fasta { records }
    }

    /// Drop records that fail [`check_sequence`], logging each one. Returns
    /// the number of records removed; survivors keep their relative order, so
    /// their position is their `fasta_index`.
    pub fn retain_valid(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|record| match check_sequence(record) {
            Ok(()) => true,
            Err(e) => {
                log::error!("skipping FASTA entry: {}", e);
                false
            }
        });
        before - self.records.len()
    }

    pub fn extend(&mut self, other: Fasta) {
        self.records.extend(other.records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_headers() {
        let contents = r#">sp|P12345|ALBU_HUMAN Serum albumin OS=Homo sapiens
MKWVTFISLL
FSSAYS

>decoy_protein
PEPTIDEK
>empty
"#;
        let fasta = Fasta::parse(contents);
        assert_eq!(fasta.len(), 3);

        let first = &fasta.records[0];
        assert_eq!(first.id, "P12345");
        assert_eq!(first.name, "sp|P12345|ALBU_HUMAN");
        assert_eq!(
            first.description,
            "sp|P12345|ALBU_HUMAN Serum albumin OS=Homo sapiens"
        );
        assert_eq!(first.sequence, "MKWVTFISLLFSSAYS");

        assert_eq!(fasta.records[1].id, "decoy_protein");
        assert_eq!(fasta.records[1].sequence, "PEPTIDEK");
        assert_eq!(fasta.records[2].sequence, "");
    }

    #[test]
    fn validate_sequence() {
        let mut record = ProteinRecord {
            id: "P1".into(),
            sequence: "PEPTIDEK".into(),
            ..Default::default()
        };
        assert!(check_sequence(&record).is_ok());

        record.sequence = "PEPXTIDEBXK".into();
        match check_sequence(&record) {
            Err(Error::InvalidSequence { id, residues }) => {
                assert_eq!(id, "P1");
                assert_eq!(residues, "BX");
            }
            other => panic!("unexpected {:?}", other),
        }

        record.sequence = "peptidek".into();
        assert!(check_sequence(&record).is_err());
    }

    #[test]
    fn retain_valid_records() {
        let mut fasta = Fasta::parse(">a\nPEPTIDEK\n>b\nPEPTIDEXK\n>c\nLESLIEK\n");
        assert_eq!(fasta.retain_valid(), 1);
        let ids = fasta.records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "c"]);
    }
}

use fnv::FnvHashMap;

use crate::Error;

/// Peptide → owning protein indices (`fasta_index`). Protein lists may hold
/// duplicates after merging; [`PeptideProteinIndex::proteins`] resolves them
/// to a sorted set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeptideProteinIndex {
    map: FnvHashMap<String, Vec<usize>>,
}

/// Compressed sparse row form of a [`PeptideProteinIndex`]:
/// `indices[indptr[i]..indptr[i + 1]]` are the proteins of `sequences[i]`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CsrIndex {
    pub sequences: Vec<String>,
    pub indptr: Vec<i64>,
    pub indices: Vec<i64>,
}

impl PeptideProteinIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `protein` as an owner of every peptide. Returns the peptides
    /// that were not present in the index before this call, in input order.
    pub fn add<P: ToString>(
        &mut self,
        peptides: impl IntoIterator<Item = P>,
        protein: usize,
    ) -> Vec<P> {
        let mut added = Vec::new();
        for peptide in peptides {
            if self.insert(peptide.to_string(), protein) {
                added.push(peptide);
            }
        }
        added
    }

    /// Returns true if `peptide` is a new key
    pub fn insert(&mut self, peptide: String, protein: usize) -> bool {
        match self.map.get_mut(&peptide) {
            Some(proteins) => {
                proteins.push(protein);
                false
            }
            None => {
                self.map.insert(peptide, vec![protein]);
                true
            }
        }
    }

    /// Union keys, concatenating protein lists of shared keys
    pub fn extend(&mut self, other: PeptideProteinIndex) {
        for (peptide, proteins) in other.map {
            self.map.entry(peptide).or_default().extend(proteins);
        }
    }

    /// Left-fold a list of indices into one
    pub fn merge(indices: Vec<PeptideProteinIndex>) -> Result<PeptideProteinIndex, Error> {
        let mut iter = indices.into_iter();
        let mut merged = iter.next().ok_or(Error::EmptyMergeInput)?;
        for index in iter {
            merged.extend(index);
        }
        Ok(merged)
    }

    pub fn get(&self, peptide: &str) -> Option<&[usize]> {
        self.map.get(peptide).map(|v| v.as_slice())
    }

    /// Sorted, deduplicated owners of `peptide`
    pub fn proteins(&self, peptide: &str) -> Vec<usize> {
        let mut proteins = self.get(peptide).map(<[usize]>::to_vec).unwrap_or_default();
        proteins.sort_unstable();
        proteins.dedup();
        proteins
    }

    pub fn contains(&self, peptide: &str) -> bool {
        self.map.contains_key(peptide)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Sequences sorted ascending; each protein list is sorted and
    /// deduplicated
    pub fn to_csr(&self) -> CsrIndex {
        let mut sequences = self.map.keys().cloned().collect::<Vec<_>>();
        sequences.sort_unstable();

        let mut indptr = Vec::with_capacity(sequences.len() + 1);
        let mut indices = Vec::new();
        indptr.push(0);
        for sequence in &sequences {
            indices.extend(self.proteins(sequence).into_iter().map(|p| p as i64));
            indptr.push(indices.len() as i64);
        }

        CsrIndex {
            sequences,
            indptr,
            indices,
        }
    }

    /// Rebuild from CSR arrays. Returns `None` if the offsets are not a
    /// non-decreasing pointer array covering `indices`, or if a peptide
    /// would end up without an owner.
    pub fn from_csr(csr: &CsrIndex) -> Option<PeptideProteinIndex> {
        let CsrIndex {
            sequences,
            indptr,
            indices,
        } = csr;
        if indptr.len() != sequences.len() + 1
            || indptr.first().copied() != Some(0)
            || indptr.last().copied() != Some(indices.len() as i64)
        {
            return None;
        }

        let mut map = FnvHashMap::default();
        for (sequence, bounds) in sequences.iter().zip(indptr.windows(2)) {
            let start = usize::try_from(bounds[0]).ok()?;
            let end = usize::try_from(bounds[1]).ok()?;
            if start >= end {
                return None;
            }
            let proteins = indices
                .get(start..end)?
                .iter()
                .map(|&p| usize::try_from(p).ok())
                .collect::<Option<Vec<_>>>()?;
            map.insert(sequence.clone(), proteins);
        }
        Some(PeptideProteinIndex { map })
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use fnv::FnvHashSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::decoy::DecoyStrategy;
use crate::enzyme::{EnzymeParameters, Protease};
use crate::fasta::ProteinRecord;
use crate::index::PeptideProteinIndex;
use crate::ion_series::FragmentSpectrum;
use crate::library::SpectralLibrary;
use crate::mass::{MassTable, ModificationMass};
use crate::modification::{Modification, Modifications, TerminalModification};
use crate::peptide::Peptide;
use crate::Error;

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
/// Parameters used for generating the spectral library
pub struct Builder {
    /// Protease name, see [`Protease::from_name`]
    pub protease: Option<String>,
    /// How many missed cleavages to use
    pub missed_cleavages: Option<u8>,
    /// Minimum peptide length (residues) that will be kept
    pub min_length: Option<usize>,
    /// Maximum peptide length (residues) that will be kept
    pub max_length: Option<usize>,
    /// Fixed internal modifications, e.g. `cC`. Applied in order.
    pub mods_fixed: Option<Vec<String>>,
    /// Variable internal modifications, e.g. `oxM`
    pub mods_variable: Option<Vec<String>>,
    /// Fixed peptide-terminal modifications, e.g. `a<^`
    pub mods_fixed_terminal: Option<Vec<String>>,
    pub mods_variable_terminal: Option<Vec<String>>,
    /// Fixed protein-terminal modifications, applied before digestion
    pub mods_fixed_terminal_prot: Option<Vec<String>>,
    pub mods_variable_terminal_prot: Option<Vec<String>>,
    /// Cap on variable modification isoforms per peptide
    pub max_isoforms: Option<usize>,
    pub decoy: Option<DecoyStrategy>,
    /// Extra modification masses on top of the built-in table
    pub custom_mods: Option<Vec<ModificationMass>>,
    /// Proteins per parallel work unit
    pub fasta_block_size: Option<usize>,
    /// Peptides per spectrum-generation chunk within a block
    pub spectra_block_size: Option<usize>,
    pub worker_count: Option<usize>,
    /// Fail the run if any protein block is still running this many seconds
    /// after a worker picked it up
    pub block_timeout_secs: Option<u64>,
}

fn parse_all<T>(encodings: Option<Vec<String>>, default: &[&str]) -> Result<Vec<T>, Error>
where
    T: std::str::FromStr<Err = Error>,
{
    match encodings {
        Some(v) => v.iter().map(|s| s.parse()).collect(),
        None => default.iter().map(|s| s.parse()).collect(),
    }
}

impl Builder {
    pub fn make_parameters(self) -> Result<Parameters, Error> {
        let protease = Protease::from_name(self.protease.as_deref().unwrap_or("trypsin"))?;

        let mut masses = MassTable::default();
        for custom in self.custom_mods.iter().flatten() {
            masses.insert_modification(custom)?;
        }

        let max_isoforms = self.max_isoforms.unwrap_or(1024);
        if max_isoforms == 0 {
            return Err(Error::InvalidParameter(
                "max_isoforms must be at least 1".into(),
            ));
        }
        let mods = Modifications::new(
            parse_all::<Modification>(self.mods_fixed, &["cC"])?,
            parse_all::<Modification>(self.mods_variable, &["oxM"])?,
            parse_all::<TerminalModification>(self.mods_fixed_terminal, &[])?,
            parse_all::<TerminalModification>(self.mods_variable_terminal, &[])?,
            max_isoforms,
        );
        let protein_mods = Modifications::new(
            Vec::new(),
            Vec::new(),
            parse_all::<TerminalModification>(self.mods_fixed_terminal_prot, &[])?,
            parse_all::<TerminalModification>(self.mods_variable_terminal_prot, &["a<^"])?,
            max_isoforms,
        );
        mods.validate(&masses)?;
        protein_mods.validate(&masses)?;

        let min_len = self.min_length.unwrap_or(7);
        let max_len = self.max_length.unwrap_or(27);
        if min_len > max_len {
            log::warn!(
                "min_length ({}) exceeds max_length ({}), no peptides will be produced",
                min_len,
                max_len
            );
        }

        Ok(Parameters {
            enzyme: EnzymeParameters {
                missed_cleavages: self.missed_cleavages.unwrap_or(2),
                min_len,
                max_len,
                protease,
            },
            mods,
            protein_mods,
            decoy: self.decoy.unwrap_or_default(),
            masses,
            fasta_block_size: self.fasta_block_size.unwrap_or(1000).max(1),
            spectra_block_size: self.spectra_block_size.unwrap_or(100_000).max(1),
            worker_count: self
                .worker_count
                .unwrap_or_else(rayon::current_num_threads)
                .max(1),
            block_timeout: self.block_timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Progress of one protein block, sent from the worker to the orchestrator
enum BlockEvent {
    Started(usize, Instant),
    Finished(usize, Result<Block, Error>),
}

/// Validated, immutable run configuration. Shared read-only by every worker.
#[derive(Clone, Debug)]
pub struct Parameters {
    pub enzyme: EnzymeParameters,
    /// Peptide-level modifications
    pub mods: Modifications,
    /// Protein-level terminal modifications
    pub protein_mods: Modifications,
    pub decoy: DecoyStrategy,
    pub masses: MassTable,
    pub fasta_block_size: usize,
    pub spectra_block_size: usize,
    pub worker_count: usize,
    pub block_timeout: Option<Duration>,
}

/// Result of digesting one contiguous block of proteins
#[derive(Debug, Default)]
pub struct Block {
    /// `fasta_index` of the first protein in the block
    pub start: usize,
    /// One spectrum per peptide first seen in this block
    pub spectra: Vec<FragmentSpectrum>,
    pub index: PeptideProteinIndex,
}

impl Parameters {
    /// Every modified target and decoy peptide of one protein sequence.
    /// Protein terminal modifications are applied first and travel with
    /// their residues into the cleaved peptides.
    pub fn generate_peptides(&self, sequence: &str) -> Vec<Peptide> {
        let protein = self
            .protein_mods
            .apply_terminal(vec![Peptide::unmodified(sequence)]);
        let digests = self.enzyme.digest(sequence);

        let mut seen = FnvHashSet::default();
        let mut peptides = Vec::with_capacity(digests.len() * protein.len());
        for variant in &protein {
            for digest in &digests {
                let peptide = variant.slice(digest.range.clone());
                if seen.insert(peptide.clone()) {
                    peptides.push(peptide);
                }
            }
        }

        let decoys = peptides.iter().map(|p| self.decoy.decoy(p)).collect();
        let mut out = self.mods.apply(peptides);
        out.extend(self.mods.apply(decoys));
        out
    }

    /// Digest, modify, decoy and fragment a block of proteins. `offset` is the
    /// `fasta_index` of `block[0]`.
    pub fn digest_block(&self, offset: usize, block: &[ProteinRecord]) -> Result<Block, Error> {
        let mut index = PeptideProteinIndex::new();
        let mut added = Vec::new();
        for (idx, protein) in block.iter().enumerate() {
            let peptides = self.generate_peptides(&protein.sequence);
            added.extend(index.add(peptides, offset + idx));
        }

        let mut spectra = Vec::with_capacity(added.len());
        for chunk in added.chunks(self.spectra_block_size) {
            for peptide in chunk {
                spectra.push(FragmentSpectrum::new(peptide, &self.masses)?);
            }
            log::trace!(
                "block {}: {}/{} spectra",
                offset,
                spectra.len(),
                added.len()
            );
        }

        Ok(Block {
            start: offset,
            spectra,
            index,
        })
    }

    pub fn build(&self, proteins: Vec<ProteinRecord>) -> Result<SpectralLibrary, Error> {
        self.build_with_progress(proteins, |_| {})
    }

    /// Build the spectral library from validated protein records (their
    /// position is their `fasta_index`). Blocks are digested in parallel;
    /// `progress` receives the completed fraction after each block.
    pub fn build_with_progress<F>(
        &self,
        proteins: Vec<ProteinRecord>,
        mut progress: F,
    ) -> Result<SpectralLibrary, Error>
    where
        F: FnMut(f64),
    {
        let n_proteins = proteins.len();
        let starts = (0..n_proteins)
            .step_by(self.fasta_block_size)
            .collect::<Vec<_>>();
        log::info!(
            "digesting {} proteins in {} blocks using {} workers",
            n_proteins,
            starts.len(),
            self.worker_count
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count)
            .panic_handler(|_| log::error!("worker panicked while digesting a protein block"))
            .build()?;

        let params = Arc::new(self.clone());
        let proteins = Arc::new(proteins);
        let (tx, rx) = mpsc::channel();

        for &start in &starts {
            let end = (start + self.fasta_block_size).min(n_proteins);
            let params = Arc::clone(&params);
            let proteins = Arc::clone(&proteins);
            let tx = tx.clone();
            pool.spawn(move || {
                // Receiver only goes away once the run has already failed
                let _ = tx.send(BlockEvent::Started(start, Instant::now()));
                let block = params.digest_block(start, &proteins[start..end]);
                let _ = tx.send(BlockEvent::Finished(start, block));
            });
        }
        drop(tx);

        let mut outstanding = starts.iter().copied().collect::<BTreeSet<_>>();
        let mut running = BTreeMap::new();
        let mut blocks = Vec::with_capacity(starts.len());
        while let Some(first) = outstanding.first().copied() {
            let event = match self.block_timeout {
                Some(timeout) => {
                    // Earliest deadline among running blocks. Nothing running
                    // means the pool has not picked up a queued block yet.
                    let now = Instant::now();
                    let (start, deadline) = running
                        .iter()
                        .map(|(&start, &began): (&usize, &Instant)| (start, began + timeout))
                        .min_by_key(|(_, deadline)| *deadline)
                        .unwrap_or((first, now + timeout));
                    if deadline <= now {
                        return Err(Error::BlockTimeout { start, timeout });
                    }
                    rx.recv_timeout(deadline - now).map_err(|e| match e {
                        mpsc::RecvTimeoutError::Timeout => Error::BlockTimeout { start, timeout },
                        mpsc::RecvTimeoutError::Disconnected => Error::WorkerLost { start: first },
                    })?
                }
                None => rx
                    .recv()
                    .map_err(|_| Error::WorkerLost { start: first })?,
            };

            let (start, block) = match event {
                BlockEvent::Started(start, began) => {
                    running.insert(start, began);
                    continue;
                }
                BlockEvent::Finished(start, block) => (start, block),
            };
            if let (Some(timeout), Some(began)) = (self.block_timeout, running.remove(&start)) {
                if began.elapsed() >= timeout {
                    return Err(Error::BlockTimeout { start, timeout });
                }
            }
            outstanding.remove(&start);
            blocks.push(block?);

            let fraction = blocks.len() as f64 / starts.len() as f64;
            if catch_unwind(AssertUnwindSafe(|| progress(fraction))).is_err() {
                log::warn!("progress callback panicked at {:.1}%", fraction * 100.0);
            }
        }

        let mut spectra = Vec::new();
        let mut indices = Vec::with_capacity(blocks.len());
        for block in blocks {
            spectra.extend(block.spectra);
            indices.push(block.index);
        }

        log::trace!("sorting and deduplicating {} spectra", spectra.len());
        spectra.par_sort_by(|a, b| a.sequence.cmp(&b.sequence));
        spectra.dedup_by(|remove, keep| remove.sequence == keep.sequence);

        if spectra.is_empty() {
            return Err(Error::NoSpectraGenerated {
                proteins: n_proteins,
            });
        }

        let index = PeptideProteinIndex::merge(indices)?;
        let proteins = Arc::try_unwrap(proteins).unwrap_or_else(|shared| (*shared).clone());

        let mut library = SpectralLibrary {
            spectra,
            index,
            proteins,
        };
        library.sort();
        log::info!(
            "generated {} spectra ({} decoys) for {} peptides",
            library.spectra.len(),
            library.decoys(),
            library.index.len()
        );
        Ok(library)
    }
}

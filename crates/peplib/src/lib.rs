pub mod database;
pub mod decoy;
pub mod enzyme;
pub mod fasta;
pub mod index;
pub mod ion_series;
pub mod library;
pub mod mass;
pub mod modification;
pub mod peptide;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown residue or modification `{token}` in `{peptide}`")]
    UnknownResidueOrModification { token: String, peptide: String },
    #[error("invalid terminal modification `{0}`: expected `<` (N-term) or `>` (C-term) before the last character")]
    InvalidTerminalModificationEncoding(String),
    #[error("invalid modification `{0}`")]
    InvalidModification(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("protein `{id}` contains residues outside the allowed alphabet: {residues}")]
    InvalidSequence { id: String, residues: String },
    #[error("cannot merge an empty list of peptide-protein indices")]
    EmptyMergeInput,
    #[error("no spectra were generated from {proteins} proteins")]
    NoSpectraGenerated { proteins: usize },
    #[error("unknown protease {0}")]
    UnknownProtease(String),
    #[error("protein block starting at protein {start} did not finish within {timeout:?}")]
    BlockTimeout {
        start: usize,
        timeout: std::time::Duration,
    },
    #[error("worker for the block starting at protein {start} exited without a result")]
    WorkerLost { start: usize },
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

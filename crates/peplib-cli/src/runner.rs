use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use log::info;
use peplib_core::library::{is_decoy, SpectralLibrary};
use peplib_store::util::read_fasta;

use crate::input::Settings;

/// Optional peptide table written next to the database
pub const TSV_NAME: &str = "peptides.tsv";

pub struct Runner {
    pub settings: Settings,
    start: Instant,
}

/// Counts reported at the end of a run
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub proteins: usize,
    pub skipped: usize,
    pub peptides: usize,
    pub decoys: usize,
    pub max_fragments: usize,
    pub database_path: PathBuf,
    pub elapsed: Duration,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} proteins ({} skipped) -> {} peptides ({} decoys, up to {} fragments) in {:.2}s, written to {}",
            self.proteins,
            self.skipped,
            self.peptides,
            self.decoys,
            self.max_fragments,
            self.elapsed.as_secs_f32(),
            self.database_path.display()
        )
    }
}

impl Runner {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            start: Instant::now(),
        }
    }

    pub fn run(&self) -> anyhow::Result<Summary> {
        let collection = read_fasta(&self.settings.fasta_paths)
            .context("Failed to read FASTA files")?;
        info!(
            "read {} proteins from {} FASTA file(s)",
            collection.fasta.len(),
            self.settings.fasta_paths.len()
        );

        let proteins = collection.fasta.len();
        let library = self
            .settings
            .parameters
            .build_with_progress(collection.fasta.records, |fraction| {
                info!("- digested {:.0}% of protein blocks", fraction * 100.0)
            })
            .context("Failed to build spectral library")?;
        info!(
            "generated {} unique peptides in {:#?}",
            library.spectra.len(),
            self.start.elapsed()
        );

        let path = &self.settings.database_path;
        peplib_store::save_database(&library, path)
            .with_context(|| format!("Failed to write database to `{}`", path.display()))?;
        self.write_settings()?;
        let tsv = path.join(TSV_NAME);
        if self.settings.write_tsv {
            self.write_tsv(&library, &tsv)?;
            info!("wrote peptide table to {}", tsv.display());
        } else if tsv.is_file() {
            // A table from an earlier run no longer matches the database
            std::fs::remove_file(&tsv)
                .with_context(|| format!("Failed to remove stale `{}`", tsv.display()))?;
        }

        let summary = Summary {
            proteins,
            skipped: collection.skipped,
            peptides: library.spectra.len(),
            decoys: library.decoys(),
            max_fragments: library.max_fragments(),
            database_path: path.clone(),
            elapsed: self.start.elapsed(),
        };
        info!("finished in {:#?}", summary.elapsed);
        Ok(summary)
    }

    /// Record the resolved configuration next to the database
    fn write_settings(&self) -> anyhow::Result<()> {
        let path = self.settings.database_path.join("settings.json");
        let bytes = serde_json::to_vec_pretty(&self.settings)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))
    }

    fn write_tsv(&self, library: &SpectralLibrary, path: &Path) -> anyhow::Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .with_context(|| format!("Failed to create `{}`", path.display()))?;

        wtr.write_record(["peptide", "precursor_mass", "decoy", "proteins"])?;
        for spectrum in &library.spectra {
            let proteins = library
                .proteins_of(&spectrum.sequence)
                .iter()
                .map(|p| p.id.as_str())
                .collect::<Vec<_>>()
                .join(";");
            let mass = spectrum.precursor_mass.to_string();
            let decoy = if is_decoy(&spectrum.sequence) { "1" } else { "0" };
            wtr.write_record([
                spectrum.sequence.as_str(),
                mass.as_str(),
                decoy,
                proteins.as_str(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

//! On-disk layout of a [`SpectralLibrary`]
//!
//! | dataset | group | contents |
//! |---|---|---|
//! | `precursors` | `/` | `f64[n]`, ascending |
//! | `seqs` | `/` | `utf8[n]`, parallel to `precursors` |
//! | `fragmasses` | `/` | `f64[n, w]`, padded with `-1` |
//! | `fragtypes` | `/` | `i32[n, w]`, `0` = b, `1` = y, padded with `-1` |
//! | `bounds` | `/` | `i64[w]`, non-padding cells per column |
//! | `proteins` | `/` | table: `fasta_index`, `id`, `name`, `description`, `sequence` |
//! | `sequences` | `peptides` | `utf8[m]`, sorted |
//! | `protein_indptr` | `peptides` | `i64[m + 1]` |
//! | `protein_indices` | `peptides` | `i64[..]` |

use std::path::Path;

use peplib_core::fasta::ProteinRecord;
use peplib_core::index::{CsrIndex, PeptideProteinIndex};
use peplib_core::ion_series::{FragmentSpectrum, Kind};
use peplib_core::library::SpectralLibrary;

use crate::columnar::{Array, Column, Store};
use crate::Error;

pub const PADDING: f64 = -1.0;
pub const TYPE_PADDING: i32 = -1;
pub const PEPTIDE_GROUP: &str = "peptides";

/// Every dataset written by [`save_database`]
pub const DATASETS: [(&str, Option<&str>); 9] = [
    ("precursors", None),
    ("seqs", None),
    ("fragmasses", None),
    ("fragtypes", None),
    ("bounds", None),
    ("proteins", None),
    ("sequences", Some(PEPTIDE_GROUP)),
    ("protein_indptr", Some(PEPTIDE_GROUP)),
    ("protein_indices", Some(PEPTIDE_GROUP)),
];

/// Persist a library, replacing a library previously saved at `path`.
/// Other files in the directory are left alone.
pub fn save_database<P: AsRef<Path>>(library: &SpectralLibrary, path: P) -> Result<(), Error> {
    let store = Store::create(path)?;
    for (name, group) in DATASETS {
        if store.remove(name, group)? {
            log::trace!("replacing `{}` in {}", name, store.path().display());
        }
    }

    let mut spectra = library.spectra.iter().collect::<Vec<_>>();
    spectra.sort_by(|a, b| {
        a.precursor_mass
            .total_cmp(&b.precursor_mass)
            .then_with(|| a.sequence.cmp(&b.sequence))
    });

    let rows = spectra.len();
    let width = spectra.iter().map(|s| s.len()).max().unwrap_or(0);

    let mut fragmasses = vec![PADDING; rows * width];
    let mut fragtypes = vec![TYPE_PADDING; rows * width];
    let mut bounds = vec![0i64; width];
    for (row, spectrum) in spectra.iter().enumerate() {
        let offset = row * width;
        fragmasses[offset..offset + spectrum.len()].copy_from_slice(&spectrum.fragment_masses);
        for (col, kind) in spectrum.fragment_types.iter().enumerate() {
            fragtypes[offset + col] = i32::from(kind.label());
            bounds[col] += 1;
        }
    }

    store.write(
        &Array::new(spectra.iter().map(|s| s.precursor_mass).collect::<Vec<_>>()),
        "precursors",
        None,
    )?;
    store.write(
        &Array::new(spectra.iter().map(|s| s.sequence.clone()).collect::<Vec<_>>()),
        "seqs",
        None,
    )?;
    store.write(&Array::matrix(fragmasses, rows, width)?, "fragmasses", None)?;
    store.write(&Array::matrix(fragtypes, rows, width)?, "fragtypes", None)?;
    store.write(&Array::new(bounds), "bounds", None)?;

    let proteins = &library.proteins;
    store.write_table(
        &[
            Column::new("fasta_index", (0..proteins.len() as i64).collect::<Vec<_>>()),
            Column::new("id", proteins.iter().map(|p| p.id.clone()).collect::<Vec<_>>()),
            Column::new("name", proteins.iter().map(|p| p.name.clone()).collect::<Vec<_>>()),
            Column::new(
                "description",
                proteins.iter().map(|p| p.description.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "sequence",
                proteins.iter().map(|p| p.sequence.clone()).collect::<Vec<_>>(),
            ),
        ],
        "proteins",
        None,
    )?;

    let CsrIndex {
        sequences,
        indptr,
        indices,
    } = library.index.to_csr();
    let group = Some(PEPTIDE_GROUP);
    store.write(&Array::new(sequences), "sequences", group)?;
    store.write(&Array::new(indptr), "protein_indptr", group)?;
    store.write(&Array::new(indices), "protein_indices", group)?;

    log::info!(
        "saved {} spectra, {} peptides and {} proteins to {}",
        rows,
        library.index.len(),
        proteins.len(),
        store.path().display()
    );
    Ok(())
}

/// Read a single named array, e.g. `read_array(path, "precursors", None)` or
/// `read_array(path, "protein_indptr", Some("peptides"))`
pub fn read_array<P: AsRef<Path>>(path: P, name: &str, group: Option<&str>) -> Result<Array, Error> {
    Store::open(path)?.read(name, group)
}

fn read_spectra(store: &Store) -> Result<Vec<FragmentSpectrum>, Error> {
    let precursors = store.read("precursors", None)?.values.into_f64("precursors")?;
    let seqs = store.read("seqs", None)?.values.into_strings("seqs")?;
    let masses = store.read("fragmasses", None)?;
    let types = store.read("fragtypes", None)?;
    let bounds = store.read("bounds", None)?.values.into_i64("bounds")?;

    let rows = precursors.len();
    let width = masses.cols();
    if seqs.len() != rows
        || masses.rows() != rows
        || types.shape != masses.shape
        || bounds.len() != width
    {
        return Err(Error::Malformed(format!(
            "inconsistent spectrum arrays: {} precursors, {} sequences, fragments {:?}, types {:?}, {} bounds",
            rows,
            seqs.len(),
            masses.shape,
            types.shape,
            bounds.len()
        )));
    }
    let masses = masses.values.into_f64("fragmasses")?;
    let types = types.values.into_i32("fragtypes")?;

    let mut counts = vec![0i64; width];
    let mut spectra = Vec::with_capacity(rows);
    for (row, (precursor_mass, sequence)) in precursors.into_iter().zip(seqs).enumerate() {
        let cells = row * width..(row + 1) * width;
        let n = types[cells.clone()]
            .iter()
            .take_while(|t| **t != TYPE_PADDING)
            .count();
        let fragment_types = types[cells.start..cells.start + n]
            .iter()
            .map(|t| {
                Kind::from_label(i64::from(*t))
                    .ok_or_else(|| Error::Malformed(format!("unknown fragment type {}", t)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        counts.iter_mut().take(n).for_each(|c| *c += 1);

        spectra.push(FragmentSpectrum {
            precursor_mass,
            sequence,
            fragment_masses: masses[cells.start..cells.start + n].to_vec(),
            fragment_types,
        });
    }

    if counts != bounds {
        return Err(Error::Malformed(
            "fragment padding does not match the stored bounds".into(),
        ));
    }
    Ok(spectra)
}

fn read_proteins(store: &Store) -> Result<Vec<ProteinRecord>, Error> {
    let mut fasta_index = Vec::new();
    let mut id = Vec::new();
    let mut name = Vec::new();
    let mut description = Vec::new();
    let mut sequence = Vec::new();
    for column in store.read_table("proteins", None)? {
        match column.name.as_str() {
            "fasta_index" => fasta_index = column.values.into_i64("fasta_index")?,
            "id" => id = column.values.into_strings("id")?,
            "name" => name = column.values.into_strings("name")?,
            "description" => description = column.values.into_strings("description")?,
            "sequence" => sequence = column.values.into_strings("sequence")?,
            other => log::warn!("ignoring unknown protein column `{}`", other),
        }
    }

    let n = fasta_index.len();
    if [id.len(), name.len(), description.len(), sequence.len()]
        .iter()
        .any(|len| *len != n)
        || fasta_index.iter().enumerate().any(|(i, idx)| *idx != i as i64)
    {
        return Err(Error::Malformed(
            "protein table columns are incomplete or out of order".into(),
        ));
    }

    Ok(id
        .into_iter()
        .zip(name)
        .zip(description)
        .zip(sequence)
        .map(|(((id, name), description), sequence)| ProteinRecord {
            id,
            name,
            description,
            sequence,
        })
        .collect())
}

fn read_index(store: &Store) -> Result<PeptideProteinIndex, Error> {
    let group = Some(PEPTIDE_GROUP);
    let csr = CsrIndex {
        sequences: store
            .read("sequences", group)?
            .values
            .into_strings("sequences")?,
        indptr: store
            .read("protein_indptr", group)?
            .values
            .into_i64("protein_indptr")?,
        indices: store
            .read("protein_indices", group)?
            .values
            .into_i64("protein_indices")?,
    };
    PeptideProteinIndex::from_csr(&csr)
        .ok_or_else(|| Error::Malformed("invalid peptide-protein offsets".into()))
}

/// Read a library written by [`save_database`]
pub fn read_database<P: AsRef<Path>>(path: P) -> Result<SpectralLibrary, Error> {
    let store = Store::open(path)?;
    let library = SpectralLibrary {
        spectra: read_spectra(&store)?,
        index: read_index(&store)?,
        proteins: read_proteins(&store)?,
    };
    log::debug!(
        "read {} spectra and {} proteins from {}",
        library.spectra.len(),
        library.proteins.len(),
        store.path().display()
    );
    Ok(library)
}

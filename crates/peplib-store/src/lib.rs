pub mod columnar;
pub mod library;
pub mod util;

pub use columnar::{Array, Column, Store, Values};
pub use library::{read_array, read_database, save_database};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("dataset `{name}` not found in group `{group}`")]
    MissingDataset { group: String, name: String },
    #[error("dataset `{name}` does not hold {expected} values")]
    UnexpectedType { name: String, expected: &'static str },
    #[error("malformed database: {0}")]
    Malformed(String),
    #[error(transparent)]
    Core(#[from] peplib_core::Error),
}

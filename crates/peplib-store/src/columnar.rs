//! A minimal columnar store on top of the low-level `parquet` file API.
//!
//! A store is a directory. Groups are sub-directories, and every named
//! dataset is a single `<name>.parquet` file holding one or more equal-length
//! columns. N-dimensional arrays are flattened row-major into one column named
//! `values`; their shape lives in the file's key/value metadata.

use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parquet::basic::{Compression, Type as PhysicalType, ZstdLevel};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int32Type, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
use parquet::format::KeyValue;
use parquet::record::RowAccessor;

use crate::Error;

pub const ROW_GROUP_SIZE: usize = 65_536;
pub const ZSTD_COMPRESSION_LEVEL: i32 = 3;

const EXTENSION: &str = "parquet";
const SHAPE_KEY: &str = "shape";
const ARRAY_COLUMN: &str = "values";

/// Typed, flat column data
#[derive(Clone, Debug, PartialEq)]
pub enum Values {
    Float64(Vec<f64>),
    Int64(Vec<i64>),
    Int32(Vec<i32>),
    Utf8(Vec<String>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Values::Float64(v) => v.len(),
            Values::Int64(v) => v.len(),
            Values::Int32(v) => v.len(),
            Values::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn empty_like(physical: PhysicalType) -> Option<Values> {
        match physical {
            PhysicalType::DOUBLE => Some(Values::Float64(Vec::new())),
            PhysicalType::INT64 => Some(Values::Int64(Vec::new())),
            PhysicalType::INT32 => Some(Values::Int32(Vec::new())),
            PhysicalType::BYTE_ARRAY => Some(Values::Utf8(Vec::new())),
            _ => None,
        }
    }

    fn schema_field(&self, name: &str) -> String {
        match self {
            Values::Float64(_) => format!("required double {};", name),
            Values::Int64(_) => format!("required int64 {};", name),
            Values::Int32(_) => format!("required int32 {};", name),
            Values::Utf8(_) => format!("required byte_array {} (utf8);", name),
        }
    }

    pub fn into_f64(self, name: &str) -> Result<Vec<f64>, Error> {
        match self {
            Values::Float64(v) => Ok(v),
            _ => Err(unexpected(name, "float64")),
        }
    }

    pub fn into_i64(self, name: &str) -> Result<Vec<i64>, Error> {
        match self {
            Values::Int64(v) => Ok(v),
            _ => Err(unexpected(name, "int64")),
        }
    }

    pub fn into_i32(self, name: &str) -> Result<Vec<i32>, Error> {
        match self {
            Values::Int32(v) => Ok(v),
            _ => Err(unexpected(name, "int32")),
        }
    }

    pub fn into_strings(self, name: &str) -> Result<Vec<String>, Error> {
        match self {
            Values::Utf8(v) => Ok(v),
            _ => Err(unexpected(name, "utf8")),
        }
    }
}

fn unexpected(name: &str, expected: &'static str) -> Error {
    Error::UnexpectedType {
        name: name.into(),
        expected,
    }
}

impl From<Vec<f64>> for Values {
    fn from(v: Vec<f64>) -> Self {
        Values::Float64(v)
    }
}

impl From<Vec<i64>> for Values {
    fn from(v: Vec<i64>) -> Self {
        Values::Int64(v)
    }
}

impl From<Vec<i32>> for Values {
    fn from(v: Vec<i32>) -> Self {
        Values::Int32(v)
    }
}

impl From<Vec<String>> for Values {
    fn from(v: Vec<String>) -> Self {
        Values::Utf8(v)
    }
}

/// One named column of a table dataset
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Values,
}

impl Column {
    pub fn new<S: Into<String>, V: Into<Values>>(name: S, values: V) -> Self {
        Self {
            name: name.into(),
            values: values.into(),
        }
    }
}

/// An N-dimensional array, stored row-major
#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    pub values: Values,
    pub shape: Vec<usize>,
}

impl Array {
    /// One-dimensional array
    pub fn new<V: Into<Values>>(values: V) -> Self {
        let values = values.into();
        let shape = vec![values.len()];
        Self { values, shape }
    }

    pub fn matrix<V: Into<Values>>(values: V, rows: usize, cols: usize) -> Result<Self, Error> {
        let values = values.into();
        if rows * cols != values.len() {
            return Err(Error::Malformed(format!(
                "{} values do not fill a {}x{} matrix",
                values.len(),
                rows,
                cols
            )));
        }
        Ok(Self {
            values,
            shape: vec![rows, cols],
        })
    }

    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Row width: the product of every trailing dimension
    pub fn cols(&self) -> usize {
        self.shape.iter().skip(1).product()
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A directory-backed collection of named datasets
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open a store, creating the directory if needed
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        std::fs::create_dir_all(path.as_ref())?;
        Ok(Self {
            root: path.as_ref().into(),
        })
    }

    /// Open an existing store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let root: PathBuf = path.as_ref().into();
        if !root.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no database at {}", root.display()),
            )));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn group_dir(&self, group: Option<&str>) -> PathBuf {
        match group {
            Some(group) if !group.is_empty() && group != "/" => self.root.join(group),
            _ => self.root.clone(),
        }
    }

    fn dataset_path(&self, name: &str, group: Option<&str>) -> Result<PathBuf, Error> {
        let group_ok = group.map_or(true, |g| g.is_empty() || g == "/" || valid_name(g));
        if !valid_name(name) || !group_ok {
            return Err(Error::Malformed(format!(
                "invalid dataset name `{}` in group `{}`",
                name,
                group.unwrap_or("/")
            )));
        }
        Ok(self
            .group_dir(group)
            .join(format!("{}.{}", name, EXTENSION)))
    }

    pub fn contains(&self, name: &str, group: Option<&str>) -> bool {
        self.dataset_path(name, group)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Remove one dataset if present. A group directory left empty by the
    /// removal goes with it; anything else in the store is untouched.
    pub fn remove(&self, name: &str, group: Option<&str>) -> Result<bool, Error> {
        let path = self.dataset_path(name, group)?;
        if !is_dataset(&path) {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;

        let dir = self.group_dir(group);
        if dir != self.root && std::fs::read_dir(&dir)?.next().is_none() {
            std::fs::remove_dir(&dir)?;
        }
        Ok(true)
    }

    /// Write a 1- or N-dimensional array
    pub fn write(&self, array: &Array, name: &str, group: Option<&str>) -> Result<(), Error> {
        if array.shape.iter().product::<usize>() != array.values.len() {
            return Err(Error::Malformed(format!(
                "shape {:?} does not match {} values for `{}`",
                array.shape,
                array.values.len(),
                name
            )));
        }
        let shape = array
            .shape
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let column = Column {
            name: ARRAY_COLUMN.into(),
            values: array.values.clone(),
        };
        self.write_columns(&[column], name, group, Some(shape))
    }

    pub fn read(&self, name: &str, group: Option<&str>) -> Result<Array, Error> {
        let (mut columns, shape) = self.read_columns(name, group)?;
        let values = match columns.len() {
            1 => columns.remove(0).values,
            n => {
                return Err(Error::Malformed(format!(
                    "`{}` has {} columns, expected a single array",
                    name, n
                )))
            }
        };
        let shape = match shape {
            Some(shape) => shape,
            None => vec![values.len()],
        };
        if shape.iter().product::<usize>() != values.len() {
            return Err(Error::Malformed(format!(
                "`{}` holds {} values but its shape is {:?}",
                name,
                values.len(),
                shape
            )));
        }
        Ok(Array { values, shape })
    }

    /// Write a table of equal-length columns, one row per record
    pub fn write_table(&self, columns: &[Column], name: &str, group: Option<&str>) -> Result<(), Error> {
        self.write_columns(columns, name, group, None)
    }

    pub fn read_table(&self, name: &str, group: Option<&str>) -> Result<Vec<Column>, Error> {
        self.read_columns(name, group).map(|(columns, _)| columns)
    }

    fn write_columns(
        &self,
        columns: &[Column],
        name: &str,
        group: Option<&str>,
        shape: Option<String>,
    ) -> Result<(), Error> {
        let path = self.dataset_path(name, group)?;
        let rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        if columns.is_empty() || columns.iter().any(|c| c.values.len() != rows || !valid_name(&c.name)) {
            return Err(Error::Malformed(format!(
                "`{}` needs named columns of equal length",
                name
            )));
        }

        let fields = columns
            .iter()
            .map(|c| c.values.schema_field(&c.name))
            .collect::<Vec<_>>()
            .join(" ");
        let schema = parquet::schema::parser::parse_message_type(&format!(
            "message {} {{ {} }}",
            name, fields
        ))?;

        let mut props = WriterProperties::builder().set_compression(Compression::ZSTD(
            ZstdLevel::try_new(ZSTD_COMPRESSION_LEVEL)?,
        ));
        if let Some(shape) = shape {
            props = props.set_key_value_metadata(Some(vec![KeyValue::new(
                SHAPE_KEY.to_string(),
                shape,
            )]));
        }

        std::fs::create_dir_all(self.group_dir(group))?;
        let file = File::create(&path)?;
        let mut writer = SerializedFileWriter::new(file, Arc::new(schema), Arc::new(props.build()))?;

        let mut start = 0;
        while start < rows {
            let range = start..(start + ROW_GROUP_SIZE).min(rows);
            let mut rg = writer.next_row_group()?;
            for column in columns {
                if let Some(mut c) = rg.next_column()? {
                    write_range(&mut c, &column.values, range.clone())?;
                    c.close()?;
                }
            }
            rg.close()?;
            start = range.end;
        }
        writer.close()?;

        log::trace!("wrote {} rows to {}", rows, path.display());
        Ok(())
    }

    fn read_columns(
        &self,
        name: &str,
        group: Option<&str>,
    ) -> Result<(Vec<Column>, Option<Vec<usize>>), Error> {
        let path = self.dataset_path(name, group)?;
        if !path.is_file() {
            return Err(Error::MissingDataset {
                group: group.unwrap_or("/").into(),
                name: name.into(),
            });
        }

        let reader = SerializedFileReader::new(File::open(&path)?)?;
        let metadata = reader.metadata().file_metadata();

        let shape = metadata
            .key_value_metadata()
            .and_then(|kv| kv.iter().find(|kv| kv.key == SHAPE_KEY))
            .and_then(|kv| kv.value.as_deref())
            .map(parse_shape)
            .transpose()?;

        let mut columns = metadata
            .schema_descr()
            .columns()
            .iter()
            .map(|descr| {
                Values::empty_like(descr.physical_type())
                    .map(|values| Column {
                        name: descr.name().to_string(),
                        values,
                    })
                    .ok_or_else(|| unexpected(descr.name(), "float64, int64, int32 or utf8"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for row in reader.get_row_iter(None)? {
            let row = row?;
            for (idx, column) in columns.iter_mut().enumerate() {
                match &mut column.values {
                    Values::Float64(v) => v.push(row.get_double(idx)?),
                    Values::Int64(v) => v.push(row.get_long(idx)?),
                    Values::Int32(v) => v.push(row.get_int(idx)?),
                    Values::Utf8(v) => v.push(row.get_string(idx)?.clone()),
                }
            }
        }
        Ok((columns, shape))
    }
}

fn is_dataset(path: &Path) -> bool {
    path.is_file() && path.extension().map_or(false, |ext| ext == EXTENSION)
}

fn parse_shape(s: &str) -> Result<Vec<usize>, Error> {
    s.split(',')
        .map(|dim| {
            dim.trim()
                .parse::<usize>()
                .map_err(|_| Error::Malformed(format!("invalid array shape `{}`", s)))
        })
        .collect()
}

fn write_range(
    column: &mut SerializedColumnWriter<'_>,
    values: &Values,
    range: Range<usize>,
) -> parquet::errors::Result<()> {
    match values {
        Values::Float64(v) => {
            column.typed::<DoubleType>().write_batch(&v[range], None, None)?;
        }
        Values::Int64(v) => {
            column.typed::<Int64Type>().write_batch(&v[range], None, None)?;
        }
        Values::Int32(v) => {
            column.typed::<Int32Type>().write_batch(&v[range], None, None)?;
        }
        Values::Utf8(v) => {
            let data = v[range]
                .iter()
                .map(|s| ByteArray::from(s.as_str()))
                .collect::<Vec<_>>();
            column.typed::<ByteArrayType>().write_batch(&data, None, None)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn arrays_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path()).unwrap();

        let masses = Array::new(vec![1.5, -1.0, std::f64::consts::PI]);
        store.write(&masses, "masses", None).unwrap();
        assert_eq!(store.read("masses", None).unwrap(), masses);

        let matrix = Array::matrix(vec![1i32, 2, 3, 4, 5, 6], 2, 3).unwrap();
        store.write(&matrix, "grid", Some("nested")).unwrap();
        let back = store.read("grid", Some("nested")).unwrap();
        assert_eq!(back.shape, vec![2, 3]);
        assert_eq!((back.rows(), back.cols()), (2, 3));
        assert_eq!(back, matrix);

        let names = Array::new(vec!["PEPTIDEK".to_string(), "EDITPEPK_decoy".to_string()]);
        store.write(&names, "names", None).unwrap();
        assert_eq!(store.read("names", None).unwrap(), names);
    }

    #[test]
    fn empty_arrays() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path()).unwrap();
        let empty = Array::matrix(Vec::<f64>::new(), 0, 0).unwrap();
        store.write(&empty, "nothing", None).unwrap();
        let back = store.read("nothing", None).unwrap();
        assert!(back.values.is_empty());
        assert_eq!(back.shape, vec![0, 0]);
    }

    #[test]
    fn tables() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path()).unwrap();
        let columns = vec![
            Column::new("idx", vec![0i64, 1]),
            Column::new("name", vec!["a".to_string(), "b".to_string()]),
        ];
        store.write_table(&columns, "table", None).unwrap();
        assert_eq!(store.read_table("table", None).unwrap(), columns);

        // Ragged tables are rejected
        let ragged = vec![
            Column::new("idx", vec![0i64]),
            Column::new("name", vec!["a".to_string(), "b".to_string()]),
        ];
        assert!(store.write_table(&ragged, "ragged", None).is_err());
    }

    #[test]
    fn missing_and_mistyped() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path()).unwrap();
        assert!(matches!(
            store.read("absent", Some("peptides")),
            Err(Error::MissingDataset { .. })
        ));

        store.write(&Array::new(vec![1i64, 2]), "ints", None).unwrap();
        let values = store.read("ints", None).unwrap().values;
        assert!(matches!(
            values.into_f64("ints"),
            Err(Error::UnexpectedType { .. })
        ));
        assert!(Array::matrix(vec![1.0], 2, 2).is_err());
        assert!(store.write(&Array::new(vec![1.0]), "../escape", None).is_err());
    }

    #[test]
    fn remove_single_datasets() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path()).unwrap();
        store.write(&Array::new(vec![1.0]), "a", None).unwrap();
        store.write(&Array::new(vec![1.0]), "b", Some("group")).unwrap();
        store.write(&Array::new(vec![1.0]), "c", Some("shared")).unwrap();
        store.write(&Array::new(vec![1.0]), "d", Some("shared")).unwrap();

        assert!(store.remove("a", None).unwrap());
        assert!(!store.remove("a", None).unwrap());
        assert!(store.remove("b", Some("group")).unwrap());
        assert!(store.remove("c", Some("shared")).unwrap());

        assert!(!store.contains("a", None));
        assert!(!tmp.path().join("group").exists());
        assert!(store.contains("d", Some("shared")));
        assert!(store.remove("../a", None).is_err());

        assert!(Store::open(tmp.path().join("missing")).is_err());
    }
}

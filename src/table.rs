//! In-memory tabular data and the sources it is loaded from.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::TableError;

/// Cell spellings treated as missing when reading CSV data.
const MISSING_MARKERS: [&str; 7] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL"];

/// Values of a single column.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValues {
    /// Floating point data; missing entries are `NaN`.
    Numeric(Vec<f64>),
    /// Text labels; missing entries are `None`.
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(values) => values.len(),
            Self::Categorical(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entry at `row` is missing.
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Self::Numeric(values) => values[row].is_nan(),
            Self::Categorical(values) => values[row].is_none(),
        }
    }
}

/// A named column of a [`Table`].
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    name: String,
    values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    /// Creates a categorical column; `None` entries are missing.
    pub fn categorical<S: Into<String>>(name: impl Into<String>, values: Vec<Option<S>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Categorical(
                values.into_iter().map(|value| value.map(Into::into)).collect(),
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    /// Returns the data if the column is numeric.
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match &self.values {
            ColumnValues::Numeric(values) => Some(values),
            ColumnValues::Categorical(_) => None,
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.values, ColumnValues::Categorical(_))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Rectangular dataset with named columns and ordered rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    /// Creates a table after validating names and column lengths.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        columns
            .into_iter()
            .fold(TableBuilder::new(), TableBuilder::column)
            .build()
    }

    /// Reads a CSV file with a header row.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;
        Self::read_csv(reader)
    }

    /// Reads CSV data with a header row from any reader.
    pub fn from_csv_reader<R: io::Read>(reader: R) -> Result<Self, TableError> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::read_csv(reader)
    }

    fn read_csv<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Self, TableError> {
        // Blank headers (e.g. an unnamed index column) get pandas-style placeholder names.
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(index, name)| {
                if name.is_empty() {
                    format!("Unnamed: {index}")
                } else {
                    name.to_string()
                }
            })
            .collect();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record?;
            for (column, value) in cells.iter_mut().zip(record.iter()) {
                column.push(value.to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, raw)| infer_column(name, raw))
            .collect();
        Self::new(columns)
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.row_count
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// Column names in table order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Replaces the column of the same name, or appends it.
    pub fn with_column(mut self, column: Column) -> Result<Self, TableError> {
        if column.len() != self.row_count {
            return Err(TableError::LengthMismatch {
                column: column.name,
                expected: self.row_count,
                found: column.values.len(),
            });
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    /// Drops the named column if present.
    pub fn without_column(mut self, name: &str) -> Self {
        self.columns.retain(|column| column.name != name);
        self
    }

    /// Keeps only the rows for which `keep` returns true.
    pub fn filter_rows(mut self, mut keep: impl FnMut(usize) -> bool) -> Self {
        let mask: Vec<bool> = (0..self.row_count).map(&mut keep).collect();
        for column in &mut self.columns {
            column.values = match &column.values {
                ColumnValues::Numeric(values) => ColumnValues::Numeric(select(values, &mask)),
                ColumnValues::Categorical(values) => {
                    ColumnValues::Categorical(select(values, &mask))
                }
            };
        }
        self.row_count = mask.iter().filter(|keep| **keep).count();
        self
    }
}

fn select<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(value, _)| value.clone())
        .collect()
}

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell)
}

/// Numeric when every non-missing cell parses as `f64`, categorical otherwise.
fn infer_column(name: String, raw: Vec<String>) -> Column {
    let parsed: Option<Vec<f64>> = raw
        .iter()
        .map(|cell| {
            if is_missing(cell) {
                Some(f64::NAN)
            } else {
                cell.parse::<f64>().ok()
            }
        })
        .collect();

    match parsed {
        Some(values) => Column::numeric(name, values),
        None => Column::categorical(
            name,
            raw.into_iter()
                .map(|cell| (!is_missing(&cell)).then_some(cell))
                .collect(),
        ),
    }
}

/// Builder that validates names and lengths before constructing a [`Table`].
#[derive(Debug, Default)]
pub struct TableBuilder {
    columns: Vec<Column>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a prepared column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Appends a numeric column.
    pub fn numeric(self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.column(Column::numeric(name, values))
    }

    /// Appends a categorical column from non-missing labels.
    pub fn categorical<S: Into<String>>(self, name: impl Into<String>, values: Vec<S>) -> Self {
        self.column(Column::categorical(
            name,
            values.into_iter().map(Some).collect(),
        ))
    }

    /// Finalizes construction after validating names and lengths.
    pub fn build(self) -> Result<Table, TableError> {
        if self.columns.is_empty() {
            return Err(TableError::NoColumns);
        }

        let mut seen = HashSet::new();
        for (index, column) in self.columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(TableError::EmptyColumnName { index });
            }
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn {
                    name: column.name.clone(),
                });
            }
        }

        let row_count = self.columns[0].len();
        if let Some(column) = self.columns.iter().find(|c| c.len() != row_count) {
            return Err(TableError::LengthMismatch {
                column: column.name.clone(),
                expected: row_count,
                found: column.len(),
            });
        }

        Ok(Table {
            columns: self.columns,
            row_count,
        })
    }
}

/// Somewhere a [`Table`] can be (re)loaded from.
pub trait TableSource: fmt::Debug + Send + Sync {
    /// Identifier used in error messages and logs.
    fn origin(&self) -> String;

    /// Loads a fresh copy of the table.
    fn load(&self) -> Result<Table, TableError>;
}

/// CSV file on disk, read in full on every load.
#[derive(Clone, Debug)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TableSource for CsvSource {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Table, TableError> {
        let table = Table::from_csv_path(&self.path)?;
        debug!(
            "loaded {} rows x {} columns from {}",
            table.nrows(),
            table.ncols(),
            self.path.display()
        );
        Ok(table)
    }
}

/// An in-memory table is its own source; every load is a clone.
impl TableSource for Table {
    fn origin(&self) -> String {
        "<in-memory table>".to_string()
    }

    fn load(&self) -> Result<Table, TableError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_columns_are_inferred() {
        let data = "temp,season,count\n9.8,spring,16\n,summer,40\n12.3, winter ,NA\n";
        let table = Table::from_csv_reader(data.as_bytes()).expect("valid csv");

        assert_eq!(table.nrows(), 3);
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            ["temp", "season", "count"]
        );

        let temp = table.column("temp").unwrap().as_numeric().unwrap();
        assert_eq!(temp[0], 9.8);
        assert!(temp[1].is_nan());

        let season = table.column("season").unwrap();
        assert!(season.is_categorical());
        assert_eq!(
            season.values(),
            &ColumnValues::Categorical(vec![
                Some("spring".to_string()),
                Some("summer".to_string()),
                Some("winter".to_string()),
            ])
        );
        assert!(table.column("count").unwrap().values().is_missing(2));
    }

    #[test]
    fn blank_csv_headers_get_placeholder_names() {
        let data = ",temp,count\n0,1.0,2.0\n1,3.0,4.0\n";
        let table = Table::from_csv_reader(data.as_bytes()).expect("valid csv");

        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            ["Unnamed: 0", "temp", "count"]
        );
        assert_eq!(
            table.column("Unnamed: 0").unwrap().as_numeric(),
            Some(&[0.0, 1.0][..])
        );

        let built = TableBuilder::new().numeric("", vec![1.0]).build();
        assert!(matches!(built, Err(TableError::EmptyColumnName { index: 0 })));
    }

    #[test]
    fn ragged_csv_is_rejected() {
        let data = "a,b\n1,2\n3\n";
        let result = Table::from_csv_reader(data.as_bytes());
        assert!(matches!(result, Err(TableError::Csv(_))));
    }

    #[test]
    fn builder_detects_duplicate_and_mismatched_columns() {
        let duplicate = TableBuilder::new()
            .numeric("a", vec![1.0])
            .numeric("a", vec![2.0])
            .build();
        assert!(matches!(duplicate, Err(TableError::DuplicateColumn { .. })));

        let mismatched = TableBuilder::new()
            .numeric("a", vec![1.0, 2.0])
            .categorical("b", vec!["x"])
            .build();
        assert!(matches!(
            mismatched,
            Err(TableError::LengthMismatch {
                expected: 2,
                found: 1,
                ..
            })
        ));

        assert!(matches!(
            TableBuilder::new().build(),
            Err(TableError::NoColumns)
        ));
    }

    #[test]
    fn with_column_replaces_or_appends() {
        let table = TableBuilder::new()
            .numeric("a", vec![1.0, 2.0])
            .build()
            .unwrap();

        let table = table
            .with_column(Column::numeric("a", vec![3.0, 4.0]))
            .unwrap()
            .with_column(Column::numeric("b", vec![5.0, 6.0]))
            .unwrap();
        assert_eq!(table.ncols(), 2);
        assert_eq!(table.column("a").unwrap().as_numeric(), Some(&[3.0, 4.0][..]));

        let short = table.clone().with_column(Column::numeric("c", vec![1.0]));
        assert!(short.is_err());

        let table = table.without_column("a");
        assert!(!table.has_column("a"));
    }

    #[test]
    fn filter_rows_keeps_columns_aligned() {
        let table = TableBuilder::new()
            .numeric("a", vec![1.0, 2.0, 3.0])
            .categorical("b", vec!["x", "y", "z"])
            .build()
            .unwrap()
            .filter_rows(|row| row != 1);

        assert_eq!(table.nrows(), 2);
        assert_eq!(table.column("a").unwrap().as_numeric(), Some(&[1.0, 3.0][..]));
        assert_eq!(
            table.column("b").unwrap().values(),
            &ColumnValues::Categorical(vec![Some("x".into()), Some("z".into())])
        );
    }
}

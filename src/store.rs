//! Columnar storage of event records
//!
//! An event store is a delimited file with one header row naming the
//! columns. It is read fully into memory as one array per column, and is
//! never modified afterwards: quantities computed by the selection live in
//! separate columns which are only appended when a skim is written out.

use crate::{error::SampleResult, numeric::Float};

use std::{collections::HashMap, path::Path};

/// File extension of event stores
pub const STORE_EXTENSION: &str = "csv";

/// One column of event data
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    /// Numbers, including booleans stored as 0/1
    Numeric(Vec<Float>),

    /// Anything which does not parse as a number
    Text(Vec<String>),
}
//
impl Column {
    /// Number of entries in the column
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    /// Render one entry for output
    fn render(&self, row: usize) -> String {
        match self {
            Column::Numeric(v) => v[row].to_string(),
            Column::Text(v) => v[row].clone(),
        }
    }

    /// Decode a column from its textual entries
    fn parse(raw: Vec<String>) -> Self {
        let numbers = raw
            .iter()
            .map(|s| parse_number(s.trim()))
            .collect::<Option<Vec<_>>>();
        match numbers {
            Some(values) => Column::Numeric(values),
            None => Column::Text(raw),
        }
    }
}

/// Parse a numeric entry, accepting booleans as 0/1
fn parse_number(s: &str) -> Option<Float> {
    match s {
        "true" | "True" => Some(1.),
        "false" | "False" => Some(0.),
        _ => s.parse::<Float>().ok(),
    }
}

/// In-memory structure-of-arrays event store
#[derive(Clone, Debug, Default)]
pub struct EventStore {
    /// Number of events
    num_rows: usize,

    /// Column names and data, in file order
    columns: Vec<(String, Column)>,

    /// Position of each column in `columns`
    index: HashMap<String, usize>,
}
//
impl EventStore {
    /// Assemble a store from named columns of equal length
    pub fn from_columns(columns: Vec<(String, Column)>) -> eyre::Result<Self> {
        let num_rows = columns.first().map_or(0, |(_, c)| c.len());
        let mut index = HashMap::with_capacity(columns.len());
        for (pos, (name, column)) in columns.iter().enumerate() {
            eyre::ensure!(
                column.len() == num_rows,
                "column '{}' has {} entries, expected {}",
                name,
                column.len(),
                num_rows
            );
            eyre::ensure!(
                index.insert(name.clone(), pos).is_none(),
                "duplicate column '{}'",
                name
            );
        }
        Ok(Self {
            num_rows,
            columns,
            index,
        })
    }

    /// Load an event store from disk
    pub fn read(path: impl AsRef<Path>) -> SampleResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path.as_ref())?;
        let names = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_owned())
            .collect::<Vec<_>>();

        // Transpose the records into per-column storage
        let mut raw = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record?;
            for (column, field) in raw.iter_mut().zip(record.iter()) {
                column.push(field.to_owned());
            }
        }

        let columns = names
            .into_iter()
            .zip(raw.into_iter().map(Column::parse))
            .collect();
        Self::from_columns(columns).map_err(|e| {
            crate::error::SampleError::Config(format!(
                "malformed event store {}: {e}",
                path.as_ref().display()
            ))
        })
    }

    /// Number of events
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Names of all columns, in file order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Truth that a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Access a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&pos| &self.columns[pos].1)
    }

    /// Access a numeric column by name
    pub fn numeric(&self, name: &str) -> Option<&[Float]> {
        match self.column(name)? {
            Column::Numeric(values) => Some(values),
            Column::Text(_) => None,
        }
    }

    /// Write a subset of the events, plus extra per-event columns, to disk
    ///
    /// `rows` index both the store and the extra columns. Parent directories
    /// are created and any existing file is replaced.
    ///
    pub fn write_subset(
        &self,
        path: impl AsRef<Path>,
        rows: &[usize],
        extra: &[(&str, &Column)],
    ) -> SampleResult<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path.as_ref())?;

        // Extra columns shadow store columns with the same name
        let kept = self
            .columns
            .iter()
            .filter(|(name, _)| extra.iter().all(|(extra_name, _)| extra_name != name))
            .map(|(name, column)| (name.as_str(), column))
            .chain(extra.iter().copied())
            .collect::<Vec<_>>();

        writer.write_record(kept.iter().map(|(name, _)| *name))?;
        for &row in rows {
            writer.write_record(kept.iter().map(|(_, column)| column.render(row)))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn read_numeric_boolean_and_text_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        fs::write(&path, "pt,fired,name\n3.5,true,a\n10,0,b\n").unwrap();

        let store = EventStore::read(&path).unwrap();
        assert_eq!(store.num_rows(), 2);
        assert_eq!(store.numeric("pt").unwrap(), &[3.5, 10.]);
        assert_eq!(store.numeric("fired").unwrap(), &[1., 0.]);
        assert!(store.numeric("name").is_none());
        assert_eq!(
            store.column("name"),
            Some(&Column::Text(vec!["a".to_owned(), "b".to_owned()]))
        );
        assert_eq!(store.column_names().collect::<Vec<_>>(), ["pt", "fired", "name"]);
    }

    #[test]
    fn header_only_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "pt,fired\n").unwrap();
        let store = EventStore::read(&path).unwrap();
        assert_eq!(store.num_rows(), 0);
        assert!(store.has_column("pt"));
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let columns = vec![
            ("a".to_owned(), Column::Numeric(vec![1., 2.])),
            ("b".to_owned(), Column::Numeric(vec![1.])),
        ];
        assert!(EventStore::from_columns(columns).is_err());
    }

    #[test]
    fn write_subset_appends_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let store = EventStore::from_columns(vec![
            ("x".to_owned(), Column::Numeric(vec![1., 2., 3.])),
            ("w".to_owned(), Column::Numeric(vec![9., 9., 9.])),
        ])
        .unwrap();
        let weight = Column::Numeric(vec![0.5, 1.5, 2.5]);

        store
            .write_subset(&path, &[0, 2], &[("w", &weight)])
            .unwrap();

        let back = EventStore::read(&path).unwrap();
        assert_eq!(back.column_names().collect::<Vec<_>>(), ["x", "w"]);
        assert_eq!(back.numeric("x").unwrap(), &[1., 3.]);
        assert_eq!(back.numeric("w").unwrap(), &[0.5, 2.5]);
    }
}

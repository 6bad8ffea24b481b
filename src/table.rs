//! Flat CSV tables with a dynamic column set.
//!
//! Node tables from the scraper and the reference download carry whatever
//! columns their source had, so rows are kept as plain strings keyed by the
//! header. Fixed-shape tables (the closure) go through serde instead.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::util::ensure_parent_directory;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers = reader
            .headers()
            .context("failed to read csv header")?
            .iter()
            .map(|name| name.trim().to_string())
            .collect::<Vec<String>>();

        let mut table = Self::new(headers);
        for (index, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("malformed csv record {}", index + 1))?;
            table.push_row(record.iter().map(str::to_string).collect())?;
        }

        Ok(table)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        ensure_parent_directory(path)?;
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        self.to_writer(file)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.headers.len() {
            bail!(
                "row has {} fields but the table has {} columns",
                row.len(),
                self.headers.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .with_context(|| format!("required column '{name}' not found"))
    }

    /// Trimmed value of `column` in `row`; empty cells become `None`.
    pub fn cell<'a>(&self, row: &'a [String], column: usize) -> Option<&'a str> {
        row.get(column)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    records_from_reader(file).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn records_from_reader<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (index, record) in reader.deserialize().enumerate() {
        let record: T = record.with_context(|| format!("malformed csv record {}", index + 1))?;
        records.push(record);
    }
    Ok(records)
}

pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    ensure_parent_directory(path)?;
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv_writer(file);
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AncestorEdge, NodeId};

    #[test]
    fn from_reader_keeps_quoted_commas_and_trims_headers() {
        let raw = "Code , Grouping,Notes\n101Y00000X,\"Behavioral Health & Social Service Providers\",\"a, b\"\n";
        let table = Table::from_reader(raw.as_bytes()).expect("csv should parse");

        assert_eq!(table.headers(), ["Code", "Grouping", "Notes"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0][2], "a, b");
    }

    #[test]
    fn cell_treats_blank_values_as_missing() {
        let table = Table::from_reader("a,b\n  ,x\n".as_bytes()).expect("csv should parse");
        let row = &table.rows()[0];
        assert_eq!(table.cell(row, 0), None);
        assert_eq!(table.cell(row, 1), Some("x"));
    }

    #[test]
    fn push_row_rejects_wrong_width() {
        let mut table = Table::new(vec!["a".to_string(), "b".to_string()]);
        let error = table
            .push_row(vec!["only".to_string()])
            .expect_err("short row should be rejected");
        assert!(error.to_string().contains("1 fields"), "unexpected error: {error}");
    }

    #[test]
    fn closure_records_round_trip_through_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("closure.csv");
        let edges = vec![
            AncestorEdge::new(NodeId::new("14"), NodeId::new("14")),
            AncestorEdge::new(NodeId::new("14"), NodeId::new("2496")),
        ];

        write_records(&path, &edges).expect("write closure");
        let raw = std::fs::read_to_string(&path).expect("read back");
        assert!(raw.starts_with("ancestor_nucc_code_id,child_nucc_code_id\n"));

        let loaded: Vec<AncestorEdge> = read_records(&path).expect("parse closure");
        assert_eq!(loaded, edges);
    }
}

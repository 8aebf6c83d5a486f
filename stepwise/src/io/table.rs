//! CSV parameter/result tables in the otoole layout.
//!
//! One file per parameter: index columns (`REGION`, `TECHNOLOGY`, `YEAR`, ...)
//! followed by a `VALUE` column. Cells are kept as text so values round-trip
//! exactly as the model wrote them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

pub const VALUE_COLUMN: &str = "VALUE";
pub const YEAR_COLUMN: &str = "YEAR";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("open {}", path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("read header {}", path.display()))?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("read row {}", path.display()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer =
            csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
        writer
            .write_record(&self.headers)
            .with_context(|| format!("write header {}", path.display()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .with_context(|| format!("write row {}", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("flush {}", path.display()))?;
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Headers other than `VALUE`, in file order.
    pub fn index_columns(&self) -> Vec<&str> {
        self.headers
            .iter()
            .map(String::as_str)
            .filter(|h| *h != VALUE_COLUMN)
            .collect()
    }

    /// Keep only rows whose `column` holds one of `years`.
    ///
    /// Returns `false` (and leaves the table untouched) if the column is absent.
    pub fn retain_years_in(&mut self, column: &str, years: &[u32]) -> Result<bool> {
        let Some(idx) = self.column(column) else {
            return Ok(false);
        };
        let wanted: HashSet<u32> = years.iter().copied().collect();
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            let year = parse_year(&row[idx])?;
            if wanted.contains(&year) {
                kept.push(row);
            }
        }
        self.rows = kept;
        Ok(true)
    }

    pub fn retain_years(&mut self, years: &[u32]) -> Result<bool> {
        self.retain_years_in(YEAR_COLUMN, years)
    }

    /// Overwrite `VALUE` of the row matching every `(column, value)` in `key`,
    /// or append a new row if none matches.
    pub fn upsert(&mut self, key: &[(String, String)], value: &str) -> Result<()> {
        let value_idx = self
            .column(VALUE_COLUMN)
            .ok_or_else(|| anyhow!("table has no {VALUE_COLUMN} column"))?;
        let mut key_idx = Vec::with_capacity(key.len());
        for (col, cell) in key {
            let idx = self
                .column(col)
                .ok_or_else(|| anyhow!("table has no column {col}"))?;
            key_idx.push((idx, cell.as_str()));
        }

        let mut matched = false;
        for row in &mut self.rows {
            if key_idx.iter().all(|(idx, cell)| row[*idx] == *cell) {
                row[value_idx] = value.to_string();
                matched = true;
            }
        }
        if !matched {
            let mut row = vec![String::new(); self.headers.len()];
            for (idx, cell) in &key_idx {
                row[*idx] = (*cell).to_string();
            }
            row[value_idx] = value.to_string();
            self.rows.push(row);
        }
        Ok(())
    }
}

pub fn parse_year(cell: &str) -> Result<u32> {
    cell.trim()
        .parse::<u32>()
        .with_context(|| format!("invalid year '{cell}'"))
}

/// `*.csv` files directly inside `dir`, sorted by file name.
pub fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

//! Adaptation convergence history (`history_adap.csv` / `history_adap.dat`).
//!
//! The header is fixed by the first record that carries solver columns and
//! every later record is mapped onto it by column name. Until such a record
//! arrives (e.g. `ini/` left no solver history) the header holds only the
//! adaptation columns; the first wider record rewrites the file with its
//! header and pads the earlier rows.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::core::types::TabularFormat;

pub const ADAPTATION_COLUMNS: [&str; 4] = ["Adap_Iter", "Complexity", "Vertices", "Elements"];
const ADJOINT_PREFIX: &str = "Adj_";

/// History file stem written by the solver in direct mode.
pub const DIRECT_HISTORY: &str = "history";
/// History file stem written by the solver in adjoint mode.
pub const ADJOINT_HISTORY: &str = "history_adj";

/// One row of named values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryRecord {
    columns: Vec<String>,
    values: Vec<String>,
}

impl HistoryRecord {
    /// Leading adaptation columns of a row.
    pub fn adaptation(adap_iter: u32, complexity: u64, vertices: usize, elements: usize) -> Self {
        let mut record = Self::default();
        let values = [
            adap_iter.to_string(),
            complexity.to_string(),
            vertices.to_string(),
            elements.to_string(),
        ];
        for (name, value) in ADAPTATION_COLUMNS.iter().zip(values) {
            record.push(name, value);
        }
        record
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i].as_str())
    }

    pub fn push(&mut self, column: &str, value: impl Into<String>) {
        self.columns.push(column.to_string());
        self.values.push(value.into());
    }

    /// Append solver columns; names already present get `Adj_` prepended.
    pub fn extend_solver(&mut self, row: &HistoryRecord) {
        for (column, value) in row.columns.iter().zip(&row.values) {
            if self.get(column).is_some() {
                self.push(&format!("{ADJOINT_PREFIX}{column}"), value.clone());
            } else {
                self.push(column, value.clone());
            }
        }
    }
}

/// Path of a solver history file (`history` / `history_adj`) in `dir`.
pub fn solver_history_path(dir: &Path, stem: &str, format: TabularFormat) -> PathBuf {
    dir.join(format!("{stem}.{}", format.extension()))
}

/// Last data row of a solver history file, or `None` if the file is absent.
pub fn read_last_row(path: &Path) -> Result<Option<HistoryRecord>> {
    if !path.is_file() {
        warn!(path = %path.display(), "solver history not found");
        return Ok(None);
    }
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_last_row(&text).with_context(|| format!("parse {}", path.display()))
}

fn split_row(line: &str) -> Vec<String> {
    line.split(',')
        .map(|token| token.trim().trim_matches('"').trim().to_string())
        .collect()
}

fn parse_last_row(text: &str) -> Result<Option<HistoryRecord>> {
    let mut header: Option<Vec<String>> = None;
    let mut last: Option<&str> = None;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let upper = line.to_ascii_uppercase();
        if upper.starts_with("TITLE") || upper.starts_with("ZONE") {
            continue;
        }
        if upper.starts_with("VARIABLES") {
            let names = line.split_once('=').map(|(_, rest)| rest).unwrap_or_default();
            header = Some(split_row(names));
            continue;
        }
        if header.is_none() {
            header = Some(split_row(line));
        } else {
            last = Some(line);
        }
    }
    let (Some(columns), Some(line)) = (header, last) else {
        return Ok(None);
    };
    let values = split_row(line);
    if values.len() != columns.len() {
        bail!(
            "last row has {} values but the header has {} columns",
            values.len(),
            columns.len()
        );
    }
    Ok(Some(HistoryRecord { columns, values }))
}

/// Append-only adaptation history table.
#[derive(Debug)]
pub struct HistoryTable {
    path: PathBuf,
    format: TabularFormat,
    header: Option<Vec<String>>,
    /// Rows written while the header held only adaptation columns.
    pending: Vec<HistoryRecord>,
}

impl HistoryTable {
    /// Table `history_adap.<ext>` in `dir`; nothing is written until the first append.
    pub fn new(dir: &Path, format: TabularFormat) -> Self {
        Self {
            path: dir.join(format!("history_adap.{}", format.extension())),
            format,
            header: None,
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> TabularFormat {
        self.format
    }

    /// Append a record and flush it to disk.
    pub fn append(&mut self, record: &HistoryRecord) -> Result<()> {
        let provisional = self.header.as_deref().is_none_or(adaptation_only);
        if provisional {
            self.pending.push(record.clone());
            if self.header.is_none() || !adaptation_only(&record.columns) {
                self.header = Some(record.columns.clone());
                return self.rewrite();
            }
        }
        let header = self.header.as_deref().unwrap_or_default();
        let row = format_row(header, record);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(row.as_bytes())
            .with_context(|| format!("append to {}", self.path.display()))?;
        debug!(path = %self.path.display(), "appended history record");
        Ok(())
    }

    fn rewrite(&mut self) -> Result<()> {
        let header = self.header.clone().unwrap_or_default();
        let mut text = self.format_header(&header);
        for record in &self.pending {
            text.push_str(&format_row(&header, record));
        }
        fs::write(&self.path, text).with_context(|| format!("write {}", self.path.display()))?;
        debug!(path = %self.path.display(), columns = header.len(), "wrote history header");
        if !adaptation_only(&header) {
            self.pending.clear();
        }
        Ok(())
    }

    fn format_header(&self, columns: &[String]) -> String {
        let quoted: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
        match self.format {
            TabularFormat::Csv => format!("{}\n", quoted.join(",")),
            TabularFormat::Tecplot => format!(
                "TITLE = \"Adaptation history\"\nVARIABLES = {}\nZONE T= \"Adaptation\"\n",
                quoted.join(",")
            ),
        }
    }
}

fn adaptation_only(columns: &[String]) -> bool {
    columns.len() <= ADAPTATION_COLUMNS.len()
}

fn format_row(header: &[String], record: &HistoryRecord) -> String {
    let dropped: Vec<&str> = record
        .columns
        .iter()
        .filter(|c| !header.contains(*c))
        .map(String::as_str)
        .collect();
    if !dropped.is_empty() {
        warn!(columns = %dropped.join(", "), "history columns not in table header");
    }
    let row: Vec<&str> = header
        .iter()
        .map(|column| record.get(column).unwrap_or_default())
        .collect();
    format!("{}\n", row.join(","))
}

//! Validator/cleaner for raw per-source CSVs.
//!
//! Raw files arrive with source-attribution comment lines, inconsistent
//! date formats, duplicate dates and stray non-numeric cells. This stage
//! coerces what it can, drops what it cannot, and reports every repair so
//! the combiner can rely on `TimeSeriesTable` invariants downstream.

use crate::domain::errors::PipelineError;
use crate::domain::table::{parse_cell, parse_date, TimeSeriesTable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// What the cleaner did to one raw file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningReport {
    pub origin: String,
    pub rows_read: usize,
    pub rows_dropped_invalid_date: usize,
    pub rows_dropped_duplicate_date: usize,
    pub cells_coerced_to_missing: usize,
    /// (old, new) pairs for columns renamed during header normalization.
    pub renamed_columns: Vec<(String, String)>,
    /// Columns with more than 10% missing values after cleaning.
    pub high_missing_columns: Vec<String>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

/// Validates and cleans one raw CSV file.
pub fn validate_file(path: impl AsRef<Path>) -> Result<(TimeSeriesTable, CleaningReport), PipelineError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| PipelineError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    validate(file, &path.display().to_string())
}

/// Validates and cleans a raw CSV stream.
///
/// Rows with unparseable dates are dropped; duplicate dates keep the first
/// occurrence; rows are re-sorted ascending. Non-numeric cells are coerced
/// to missing rather than rejected — strict numeric checks belong to the
/// stages that actually consume the values.
pub fn validate(
    reader: impl Read,
    origin: &str,
) -> Result<(TimeSeriesTable, CleaningReport), PipelineError> {
    let mut rdr = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| PipelineError::Csv {
            path: origin.to_string(),
            source: e,
        })?
        .clone();

    let date_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("date"))
        .ok_or_else(|| PipelineError::input("Date", "no Date column in header"))?;

    let mut report = CleaningReport {
        origin: origin.to_string(),
        ..Default::default()
    };

    // Header normalization: trim whitespace, deduplicate repeated names.
    let mut columns: Vec<String> = Vec::new();
    for (i, raw) in headers.iter().enumerate() {
        if i == date_idx {
            continue;
        }
        let trimmed = raw.trim().to_string();
        let mut name = trimmed.clone();
        let mut suffix = 2;
        while columns.contains(&name) {
            name = format!("{}_{}", trimmed, suffix);
            suffix += 1;
        }
        if name != raw {
            report.renamed_columns.push((raw.to_string(), name.clone()));
        }
        columns.push(name);
    }

    // BTreeMap keeps dates sorted and makes duplicate detection free.
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for record in rdr.records() {
        let record = record.map_err(|e| PipelineError::Csv {
            path: origin.to_string(),
            source: e,
        })?;
        report.rows_read += 1;

        let raw_date = record.get(date_idx).unwrap_or("").trim();
        let Some(date) = parse_date(raw_date) else {
            report.rows_dropped_invalid_date += 1;
            continue;
        };
        if by_date.contains_key(&date) {
            report.rows_dropped_duplicate_date += 1;
            continue;
        }

        let mut row = Vec::with_capacity(columns.len());
        for i in 0..headers.len() {
            if i == date_idx {
                continue;
            }
            let cell = record.get(i).unwrap_or("");
            match parse_cell(cell) {
                Some(v) => row.push(v),
                None => {
                    report.cells_coerced_to_missing += 1;
                    row.push(f64::NAN);
                }
            }
        }
        by_date.insert(date, row);
    }

    if by_date.is_empty() {
        return Err(PipelineError::input("Date", "no valid dated rows in file"));
    }

    report.date_range = Some((
        *by_date.keys().next().unwrap(),
        *by_date.keys().next_back().unwrap(),
    ));

    let n_rows = by_date.len();
    let (dates, rows): (Vec<_>, Vec<_>) = by_date.into_iter().unzip();

    for (j, col) in columns.iter().enumerate() {
        let missing = rows.iter().filter(|r| r[j].is_nan()).count();
        if missing * 10 > n_rows {
            report.high_missing_columns.push(col.clone());
        }
    }

    if report.rows_dropped_invalid_date > 0 || report.rows_dropped_duplicate_date > 0 {
        warn!(
            origin,
            invalid = report.rows_dropped_invalid_date,
            duplicate = report.rows_dropped_duplicate_date,
            "dropped rows during cleaning"
        );
    }
    info!(
        origin,
        rows = n_rows,
        cols = columns.len(),
        "cleaned table"
    );

    let table = TimeSeriesTable::new(dates, columns, rows)?;
    Ok((table, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_dates_keep_first() {
        let csv = "Date,A\n2024-01-01,1\n2024-01-01,2\n2024-01-02,3\n";
        let (table, report) = validate(csv.as_bytes(), "test").unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(report.rows_dropped_duplicate_date, 1);
        assert_eq!(table.column("A").unwrap()[0], 1.0);
    }

    #[test]
    fn test_invalid_dates_dropped_and_reported() {
        let csv = "Date,A\nnot-a-date,1\n2024-01-02,2\n";
        let (table, report) = validate(csv.as_bytes(), "test").unwrap();
        assert_eq!(table.n_rows(), 1);
        assert_eq!(report.rows_dropped_invalid_date, 1);
    }

    #[test]
    fn test_rows_sorted_ascending() {
        let csv = "Date,A\n2024-01-03,3\n2024-01-01,1\n2024-01-02,2\n";
        let (table, _) = validate(csv.as_bytes(), "test").unwrap();
        assert_eq!(table.column("A").unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mixed_date_formats_standardized() {
        let csv = "Date,A\n2024/01/01,1\n2024-01-02,2\n";
        let (table, _) = validate(csv.as_bytes(), "test").unwrap();
        assert_eq!(table.n_rows(), 2);
    }

    #[test]
    fn test_garbage_cells_coerced() {
        let csv = "Date,A\n2024-01-01,oops\n2024-01-02,2\n";
        let (table, report) = validate(csv.as_bytes(), "test").unwrap();
        assert_eq!(report.cells_coerced_to_missing, 1);
        assert!(table.column("A").unwrap()[0].is_nan());
    }

    #[test]
    fn test_header_whitespace_renamed() {
        let csv = "Date, A \n2024-01-01,1\n";
        let (table, report) = validate(csv.as_bytes(), "test").unwrap();
        assert_eq!(table.column_names(), &["A"]);
        assert_eq!(report.renamed_columns.len(), 1);
    }

    #[test]
    fn test_empty_file_fails() {
        let csv = "Date,A\n";
        assert!(validate(csv.as_bytes(), "test").is_err());
    }

    #[test]
    fn test_high_missing_column_flagged() {
        let mut csv = String::from("Date,A,B\n");
        for day in 1..=20 {
            // B is missing in 15 of 20 rows.
            let b = if day <= 5 { day.to_string() } else { String::new() };
            csv.push_str(&format!("2024-01-{:02},{},{}\n", day, day, b));
        }
        let (_, report) = validate(csv.as_bytes(), "test").unwrap();
        assert_eq!(report.high_missing_columns, vec!["B".to_string()]);
    }
}

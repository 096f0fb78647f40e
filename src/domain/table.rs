//! Date-indexed wide table shared by every pipeline stage.
//!
//! A `TimeSeriesTable` holds one row per calendar date with the dates in
//! strictly ascending order. The constructor enforces both invariants; raw
//! CSVs that violate them must go through the cleaner first.

use crate::domain::errors::PipelineError;
use chrono::NaiveDate;
use std::io::Read;
use std::path::Path;

/// Cell tokens treated as missing rather than malformed.
const MISSING_TOKENS: &[&str] = &["", "na", "n/a", "nan", "null"];

/// Wide numeric table indexed by calendar date.
///
/// Values are stored row-major; missing values are NaN. Column names keep
/// their original CSV order, which is also the tie-break order used by the
/// feature selector.
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl TimeSeriesTable {
    /// Builds a table, enforcing unique and strictly ascending dates.
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, PipelineError> {
        if dates.len() != rows.len() {
            return Err(PipelineError::input(
                "Date",
                format!("{} dates for {} rows", dates.len(), rows.len()),
            ));
        }
        for row in &rows {
            if row.len() != columns.len() {
                return Err(PipelineError::input(
                    "Date",
                    format!("row has {} values, expected {}", row.len(), columns.len()),
                ));
            }
        }
        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(PipelineError::input(
                    "Date",
                    format!("dates not strictly ascending: {} follows {}", pair[1], pair[0]),
                ));
            }
        }
        Ok(Self {
            dates,
            columns,
            rows,
        })
    }

    /// Reads a table from a CSV file. Lines starting with `#` (source
    /// attribution headers) are skipped.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| PipelineError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_reader(file, &path.display().to_string())
    }

    /// Reads a table from any reader. `origin` is used in error messages.
    pub fn from_reader(reader: impl Read, origin: &str) -> Result<Self, PipelineError> {
        let mut rdr = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .flexible(false)
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

        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_idx)
            .map(|(_, h)| h.trim().to_string())
            .collect();

        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| PipelineError::Csv {
                path: origin.to_string(),
                source: e,
            })?;
            let raw_date = record.get(date_idx).unwrap_or("").trim();
            let date = parse_date(raw_date).ok_or_else(|| {
                PipelineError::input("Date", format!("unparseable date '{}'", raw_date))
            })?;

            let mut row = Vec::with_capacity(columns.len());
            for (i, cell) in record.iter().enumerate() {
                if i == date_idx {
                    continue;
                }
                let value = parse_cell(cell).ok_or_else(|| {
                    let col = if i > date_idx { i - 1 } else { i };
                    PipelineError::input(
                        columns[col].clone(),
                        format!("non-numeric value '{}'", cell.trim()),
                    )
                })?;
                row.push(value);
            }
            dates.push(date);
            rows.push(row);
        }

        Self::new(dates, columns, rows)
    }

    /// Writes the table as standard CSV with `YYYY-MM-DD` dates.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let mut wtr = csv::Writer::from_path(path).map_err(|e| PipelineError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut header = vec!["Date".to_string()];
        header.extend(self.columns.iter().cloned());
        wtr.write_record(&header).map_err(|e| PipelineError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;

        for (date, row) in self.dates.iter().zip(&self.rows) {
            let mut record = vec![date.format("%Y-%m-%d").to_string()];
            for v in row {
                record.push(if v.is_nan() {
                    String::new()
                } else {
                    format!("{}", v)
                });
            }
            wtr.write_record(&record).map_err(|e| PipelineError::Csv {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        wtr.flush().map_err(|e| PipelineError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Extracts one column by name as an owned vector.
    pub fn column(&self, name: &str) -> Result<Vec<f64>, PipelineError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| PipelineError::input(name, "column not found"))?;
        Ok(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Extracts the named columns row-major, in the given order.
    pub fn matrix(&self, names: &[String]) -> Result<Vec<Vec<f64>>, PipelineError> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            indices.push(
                self.column_index(name)
                    .ok_or_else(|| PipelineError::input(name, "column not found"))?,
            );
        }
        Ok(self
            .rows
            .iter()
            .map(|r| indices.iter().map(|&i| r[i]).collect())
            .collect())
    }

    /// Projects the table onto a subset of columns, keeping the date index.
    pub fn project(&self, names: &[String]) -> Result<Self, PipelineError> {
        let rows = self.matrix(names)?;
        Self::new(self.dates.clone(), names.to_vec(), rows)
    }

    pub(crate) fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

/// Accepts the date formats seen across the source datasets.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m-%d-%Y"];
    // Timestamps like "2024-01-01 00:00:00" reduce to their date part.
    let raw = raw.split_whitespace().next()?;
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Parses one cell: missing tokens become NaN, anything else must be numeric.
pub fn parse_cell(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if MISSING_TOKENS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return Some(f64::NAN);
    }
    trimmed.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_with_comment_header() {
        let csv = "# Data Source: alternative.me\n\
                   Date,BTC/USD,FearGreed\n\
                   2024-01-01,42000.5,70\n\
                   2024-01-02,43100.0,72\n";
        let table = TimeSeriesTable::from_reader(csv.as_bytes(), "test").unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column_names(), &["BTC/USD", "FearGreed"]);
        assert_eq!(table.column("BTC/USD").unwrap()[0], 42000.5);
    }

    #[test]
    fn test_missing_cell_becomes_nan() {
        let csv = "Date,A\n2024-01-01,\n2024-01-02,1.5\n";
        let table = TimeSeriesTable::from_reader(csv.as_bytes(), "test").unwrap();
        let col = table.column("A").unwrap();
        assert!(col[0].is_nan());
        assert_eq!(col[1], 1.5);
    }

    #[test]
    fn test_non_numeric_cell_names_column() {
        let csv = "Date,Gold\n2024-01-01,oops\n";
        let err = TimeSeriesTable::from_reader(csv.as_bytes(), "test").unwrap_err();
        assert!(err.to_string().contains("Gold"));
    }

    #[test]
    fn test_duplicate_dates_rejected() {
        let dates = vec![date("2024-01-01"), date("2024-01-01")];
        let err = TimeSeriesTable::new(dates, vec!["A".into()], vec![vec![1.0], vec![2.0]])
            .unwrap_err();
        assert!(err.to_string().contains("ascending"));
    }

    #[test]
    fn test_out_of_order_dates_rejected() {
        let dates = vec![date("2024-01-02"), date("2024-01-01")];
        assert!(
            TimeSeriesTable::new(dates, vec!["A".into()], vec![vec![1.0], vec![2.0]]).is_err()
        );
    }

    #[test]
    fn test_project_preserves_order() {
        let csv = "Date,A,B,C\n2024-01-01,1,2,3\n2024-01-02,4,5,6\n";
        let table = TimeSeriesTable::from_reader(csv.as_bytes(), "test").unwrap();
        let projected = table
            .project(&["C".to_string(), "A".to_string()])
            .unwrap();
        assert_eq!(projected.column_names(), &["C", "A"]);
        assert_eq!(projected.column("C").unwrap(), vec![3.0, 6.0]);
    }
}

//! Combiner: aligns cleaned per-source tables on a common date index.
//!
//! Mirrors the original dataset build: outer join on date, per-source
//! column prefixes to avoid collisions, forward-fill then back-fill for
//! gaps introduced by the join.

use crate::domain::errors::PipelineError;
use crate::domain::table::TimeSeriesTable;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::info;

/// Combines cleaned source tables into one wide table.
///
/// Column names are prefixed with the source name (`{source}_{column}`)
/// unless the source name is empty. Dates are the union of all inputs;
/// missing values after the join are forward-filled, then back-filled for
/// leading gaps.
pub fn combine(sources: &[(String, TimeSeriesTable)]) -> Result<TimeSeriesTable, PipelineError> {
    if sources.is_empty() {
        return Err(PipelineError::input("Date", "no source tables to combine"));
    }

    let mut columns: Vec<String> = Vec::new();
    for (source, table) in sources {
        for col in table.column_names() {
            if source.is_empty() {
                columns.push(col.clone());
            } else {
                columns.push(format!("{}_{}", source, col));
            }
        }
    }

    // Union of all dates, each row initialized to all-missing.
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for (_, table) in sources {
        for date in table.dates() {
            by_date
                .entry(*date)
                .or_insert_with(|| vec![f64::NAN; columns.len()]);
        }
    }

    let mut offset = 0;
    for (_, table) in sources {
        let width = table.n_cols();
        for (date, row) in table.dates().iter().zip(table.rows()) {
            let dest = by_date.get_mut(date).expect("date inserted above");
            dest[offset..offset + width].copy_from_slice(row);
        }
        offset += width;
    }

    let (dates, mut rows): (Vec<_>, Vec<_>) = by_date.into_iter().unzip();

    // Forward-fill, then back-fill the leading gap per column.
    for j in 0..columns.len() {
        let mut last = f64::NAN;
        for row in rows.iter_mut() {
            if row[j].is_nan() {
                row[j] = last;
            } else {
                last = row[j];
            }
        }
        let mut next = f64::NAN;
        for row in rows.iter_mut().rev() {
            if row[j].is_nan() {
                row[j] = next;
            } else {
                next = row[j];
            }
        }
    }

    info!(
        sources = sources.len(),
        rows = dates.len(),
        cols = columns.len(),
        "combined dataset"
    );

    TimeSeriesTable::new(dates, columns, rows)
}

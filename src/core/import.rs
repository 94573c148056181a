//! Bulk import - Loading a roster from a spreadsheet export.
//!
//! Import is two steps. [`preview`] maps raw CSV rows onto student fields and shows
//! what would be inserted, silently dropping rows without a name, email or roll.
//! [`import`] then inserts the previewed rows one by one, counting failures instead
//! of aborting the batch.

use crate::{
    core::{
        auth::{self, Session},
        student::{self, NewStudent, StudentInput},
    },
    entities::{Role, StudentModel},
    errors::{Error, Result},
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// A parsed CSV file. The first line is always the header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsvTable {
    /// Trimmed header names
    pub headers: Vec<String>,
    /// Data rows, cells untrimmed
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

/// Parses CSV text. Rows may be shorter or longer than the header.
pub fn parse_csv(text: &str) -> Result<CsvTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(ToString::to_string).collect()))
        .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;

    Ok(CsvTable { headers, rows })
}

/// Which CSV header feeds each student field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnMapping {
    /// Header holding the name; required
    pub name: String,
    /// Header holding the email; required
    pub email: String,
    /// Header holding the roll number; required
    pub roll: String,
    /// Optional; rows default to veg
    #[serde(default)]
    pub food_preference: Option<String>,
    /// Optional; rows default to unpaid
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Optional
    #[serde(default)]
    pub section: Option<String>,
}

/// Header indices resolved from a [`ColumnMapping`].
struct ResolvedMapping {
    name: usize,
    email: usize,
    roll: usize,
    food_preference: Option<usize>,
    payment_method: Option<usize>,
    section: Option<usize>,
}

impl ColumnMapping {
    fn resolve(&self, table: &CsvTable) -> Result<ResolvedMapping> {
        let required = |field: &str, header: &str| {
            if header.trim().is_empty() {
                return Err(Error::Validation {
                    message: format!("Map a column to {field}"),
                });
            }
            table.column(header.trim()).ok_or_else(|| Error::Validation {
                message: format!("Column '{header}' not found in CSV header"),
            })
        };
        let optional = |header: &Option<String>| -> Result<Option<usize>> {
            match header.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
                None => Ok(None),
                Some(h) => table.column(h).map(Some).ok_or_else(|| Error::Validation {
                    message: format!("Column '{h}' not found in CSV header"),
                }),
            }
        };

        Ok(ResolvedMapping {
            name: required("name", &self.name)?,
            email: required("email", &self.email)?,
            roll: required("roll", &self.roll)?,
            food_preference: optional(&self.food_preference)?,
            payment_method: optional(&self.payment_method)?,
            section: optional(&self.section)?,
        })
    }
}

/// Maps every row of `table` onto a student in cohort `year`.
///
/// # Errors
/// [`Error::Validation`] when `year` is blank or the mapping names a missing column.
pub fn preview(table: &CsvTable, mapping: &ColumnMapping, year: &str) -> Result<Vec<NewStudent>> {
    if year.trim().is_empty() {
        return Err(Error::Validation {
            message: "Select a year for the imported students".to_string(),
        });
    }
    let columns = mapping.resolve(table)?;

    let cell = |row: &[String], index: usize| row.get(index).cloned().unwrap_or_default();
    let optional_cell = |row: &[String], index: Option<usize>| index.and_then(|i| row.get(i).cloned());

    Ok(table
        .rows
        .iter()
        .filter_map(|row| {
            NewStudent::new(StudentInput {
                name: cell(row, columns.name),
                email: cell(row, columns.email),
                roll: cell(row, columns.roll),
                year: year.to_string(),
                section: optional_cell(row, columns.section),
                food_preference: optional_cell(row, columns.food_preference),
                payment_method: optional_cell(row, columns.payment_method),
            })
            .ok()
        })
        .collect())
}

/// Counts reported back after an import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    /// Rows inserted
    pub successful: usize,
    /// Rows the store rejected
    pub failed: usize,
    /// Records that were inserted, for change notification
    #[serde(skip)]
    pub created: Vec<StudentModel>,
}

/// Inserts previewed rows. Admin only.
#[instrument(skip(db, session, rows), fields(admin = %session.email, rows = rows.len()))]
pub async fn import(
    db: &DatabaseConnection,
    session: &Session,
    rows: Vec<NewStudent>,
) -> Result<ImportSummary> {
    auth::authorize(db, session, Role::Admin).await?;

    let mut summary = ImportSummary::default();
    for row in rows {
        let roll = row.roll().to_string();
        match student::create_student(db, row).await {
            Ok(created) => {
                summary.successful += 1;
                summary.created.push(created);
            }
            Err(e) => {
                warn!(%roll, error = %e, "Failed to import row");
                summary.failed += 1;
            }
        }
    }

    info!(successful = summary.successful, failed = summary.failed, "Import finished");
    Ok(summary)
}

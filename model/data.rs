//! # Case Record Types and Batch Loading
//!
//! This module defines the input side of the estimator: the field vocabulary
//! of a missing-person case record, the record type itself, and the CSV
//! loader used by the batch scoring path.
//!
//! - Strict Schema: Column names are not configurable. The loader enforces
//!   the training pipeline's column names (`sex`, `province`, `nationality`,
//!   `approximate_age`, `ethnicity`), which eliminates a class of
//!   configuration errors.
//! - User-Centric Errors: Failures are assumed to be user-input errors. The
//!   `DataError` enum is designed to provide clear, actionable feedback,
//!   including the offending row where one exists.
//! - Range Policy: `approximate_age` is validated to [0, 100] here, at the
//!   input boundary. The estimator itself never re-checks the range; values
//!   it receives are taken as already validated.

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// The closed set of fields a case record carries. The training pipeline
/// fixed this set; artifact bundles reference fields by these names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Sex,
    Province,
    Nationality,
    ApproximateAge,
    Ethnicity,
}

/// All record fields in the training pipeline's canonical column order.
pub const RECORD_FIELDS: [FieldName; 5] = [
    FieldName::Sex,
    FieldName::Province,
    FieldName::Nationality,
    FieldName::ApproximateAge,
    FieldName::Ethnicity,
];

impl FieldName {
    /// The column name used in input files and artifact documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Sex => "sex",
            FieldName::Province => "province",
            FieldName::Nationality => "nationality",
            FieldName::ApproximateAge => "approximate_age",
            FieldName::Ethnicity => "ethnicity",
        }
    }

    /// Whether this field carries a label (encoded) rather than a number
    /// (scaled). `approximate_age` is the single numeric field.
    pub fn is_categorical(&self) -> bool {
        !matches!(self, FieldName::ApproximateAge)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One missing-person case record, as collected at the input boundary.
/// Immutable once constructed; each inference request builds its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRecord {
    pub sex: String,
    pub province: String,
    pub nationality: String,
    pub ethnicity: String,
    /// Age in whole years. The input boundary guarantees [0, 100].
    pub approximate_age: u8,
}

impl FeatureRecord {
    /// The label this record carries for a categorical field.
    /// Returns `None` for `approximate_age`, which has no label.
    pub fn label(&self, field: FieldName) -> Option<&str> {
        match field {
            FieldName::Sex => Some(&self.sex),
            FieldName::Province => Some(&self.province),
            FieldName::Nationality => Some(&self.nationality),
            FieldName::Ethnicity => Some(&self.ethnicity),
            FieldName::ApproximateAge => None,
        }
    }
}

/// A comprehensive error type for all batch-input loading failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying CSV reader: {0}")]
    CsvError(#[from] csv::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "Row {row}: the 'approximate_age' value '{value}' is not a whole number."
    )]
    AgeNotInteger { row: usize, value: String },
    #[error("Row {row}: 'approximate_age' is {found}, outside the supported range [0, 100].")]
    AgeOutOfRange { row: usize, found: i64 },
    #[error("The input file contains a header but no data rows.")]
    EmptyInput,
}

/// Reads case records from a CSV file with the canonical column schema.
///
/// Extra columns are tolerated and ignored; missing required columns are
/// rejected by name. Row numbers in errors are 1-based data rows, matching
/// what a user sees in a spreadsheet minus the header.
pub fn load_record_batch<P: AsRef<Path>>(path: P) -> Result<Vec<FeatureRecord>, DataError> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let headers = reader.headers()?.clone();
    let column = |field: FieldName| -> Result<usize, DataError> {
        headers
            .iter()
            .position(|h| h == field.as_str())
            .ok_or_else(|| DataError::ColumnNotFound(field.as_str().to_string()))
    };
    let sex_col = column(FieldName::Sex)?;
    let province_col = column(FieldName::Province)?;
    let nationality_col = column(FieldName::Nationality)?;
    let age_col = column(FieldName::ApproximateAge)?;
    let ethnicity_col = column(FieldName::Ethnicity)?;

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row?;
        let data_row = i + 1;

        let raw_age = row.get(age_col).unwrap_or("").trim();
        let age: i64 = raw_age.parse().map_err(|_| DataError::AgeNotInteger {
            row: data_row,
            value: raw_age.to_string(),
        })?;
        if !(0..=100).contains(&age) {
            return Err(DataError::AgeOutOfRange {
                row: data_row,
                found: age,
            });
        }

        records.push(FeatureRecord {
            sex: row.get(sex_col).unwrap_or("").trim().to_string(),
            province: row.get(province_col).unwrap_or("").trim().to_string(),
            nationality: row.get(nationality_col).unwrap_or("").trim().to_string(),
            ethnicity: row.get(ethnicity_col).unwrap_or("").trim().to_string(),
            approximate_age: age as u8,
        });
    }

    if records.is_empty() {
        return Err(DataError::EmptyInput);
    }
    log::info!("Loaded {} case records for batch scoring", records.len());
    Ok(records)
}

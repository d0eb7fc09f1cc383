//! CSV upload parsing and column validation.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::ValidationError;

use super::model::{Batch, ContactRow, RowStatus, columns};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// What the operator is told after a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub rows: usize,
    pub columns: Vec<String>,
    /// Non-fatal issues, e.g. a missing Description column.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Column positions resolved from the header row.
struct ColumnMap {
    name: usize,
    company: usize,
    email: usize,
    description: Option<usize>,
    message: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Result<Self, ValidationError> {
        let find = |wanted: &str| headers.iter().position(|h| h.trim() == wanted);

        let missing: Vec<String> = columns::REQUIRED
            .iter()
            .filter(|c| find(c).is_none())
            .map(|c| c.to_string())
            .collect();

        match (find(columns::NAME), find(columns::COMPANY), find(columns::EMAIL)) {
            (Some(name), Some(company), Some(email)) => Ok(Self {
                name,
                company,
                email,
                description: find(columns::DESCRIPTION),
                message: find(columns::MESSAGE),
            }),
            _ => Err(ValidationError::MissingColumns { missing }),
        }
    }
}

/// Parse an uploaded CSV into a batch.
///
/// Requires `Name`, `Company` and `Email`. `Description` is recommended
/// only: without it the upload succeeds with a warning. A non-empty
/// `Message` cell is taken as an already-written message.
pub fn load(bytes: &[u8]) -> Result<(Batch, UploadSummary), ValidationError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| {
        ValidationError::Encoding(format!("invalid byte at offset {}", e.valid_up_to()))
    })?;

    if text.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();

    let map = ColumnMap::resolve(&headers)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(malformed)?;
        let fields: Vec<String> = record.iter().map(str::to_string).collect();

        let description = map
            .description
            .map(|i| fields[i].trim().to_string())
            .filter(|d| !d.is_empty());
        let message = map
            .message
            .map(|i| fields[i].clone())
            .filter(|m| !m.trim().is_empty());
        let status = if message.is_some() {
            RowStatus::Generated
        } else {
            RowStatus::Pending
        };

        rows.push(ContactRow {
            name: fields[map.name].trim().to_string(),
            company: fields[map.company].trim().to_string(),
            email: fields[map.email].trim().to_string(),
            description,
            message,
            status,
            fields,
        });
    }

    let mut warnings = Vec::new();
    if map.description.is_none() {
        warnings.push(
            "No 'Description' column: emails will be written without a note on the recipient's work"
                .to_string(),
        );
    }

    let mut seen = HashSet::new();
    let duplicates: Vec<&str> = rows
        .iter()
        .filter(|r| !seen.insert(r.name.as_str()))
        .map(|r| r.name.as_str())
        .collect();
    if !duplicates.is_empty() {
        tracing::warn!(?duplicates, "Batch contains duplicate names");
        warnings.push(format!(
            "Duplicate names share one generated message: {}",
            duplicates.join(", ")
        ));
    }

    tracing::info!(rows = rows.len(), columns = headers.len(), "CSV batch loaded");

    let summary = UploadSummary {
        rows: rows.len(),
        columns: headers.clone(),
        warnings,
    };
    Ok((Batch::from_parts(headers, rows, map.message), summary))
}

fn malformed(e: csv::Error) -> ValidationError {
    let line = e.position().map(|p| p.line()).unwrap_or(0);
    ValidationError::Malformed {
        line,
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Name,Company,Email,Description\n\
                          A,Acme,a@x.com,builds widgets\n\
                          B,Beta,b@x.com,ships gadgets\n";

    #[test]
    fn loads_rows_in_order() {
        let (batch, summary) = load(SAMPLE.as_bytes()).unwrap();
        assert_eq!(summary.rows, 2);
        assert!(summary.warnings.is_empty());
        assert_eq!(batch.names(), vec!["A", "B"]);
        assert_eq!(batch.rows()[0].description.as_deref(), Some("builds widgets"));
        assert!(batch.rows().iter().all(|r| r.status == RowStatus::Pending));
    }

    #[test]
    fn missing_required_columns_are_named() {
        let err = load(b"Name,Description\nA,x\n").unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingColumns {
                missing: vec!["Company".into(), "Email".into()]
            }
        );
        assert!(err.to_string().contains("'Description' is recommended"));
    }

    #[test]
    fn load_accepts_missing_description_column() {
        // Description is recommended, not enforced.
        let (batch, summary) = load(b"Name,Company,Email\nA,Acme,a@x.com\n").unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.rows()[0].description.is_none());
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("Description"));
    }

    #[test]
    fn headers_are_matched_after_trimming_and_bom() {
        let mut input = UTF8_BOM.to_vec();
        input.extend_from_slice(b" Name , Company,Email \nA,Acme,a@x.com\n");
        let (batch, _) = load(&input).unwrap();
        assert_eq!(batch.columns()[0], " Name ");
        assert_eq!(batch.rows()[0].company, "Acme");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(load(b"").unwrap_err(), ValidationError::Empty);
        assert_eq!(load(b"  \n").unwrap_err(), ValidationError::Empty);
    }

    #[test]
    fn non_utf8_is_rejected() {
        let err = load(b"Name,Company,Email\n\xff,Acme,a@x.com\n").unwrap_err();
        assert!(matches!(err, ValidationError::Encoding(_)));
    }

    #[test]
    fn ragged_rows_are_malformed() {
        let err = load(b"Name,Company,Email\nA,Acme\n").unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { .. }), "got {err:?}");
    }

    #[test]
    fn existing_messages_are_picked_up() {
        let input = "Name,Company,Email,Message\nA,Acme,a@x.com,Hello A\nB,Beta,b@x.com,\n";
        let (batch, _) = load(input.as_bytes()).unwrap();
        assert_eq!(batch.message_column(), Some(3));
        assert_eq!(batch.rows()[0].message.as_deref(), Some("Hello A"));
        assert_eq!(batch.rows()[0].status, RowStatus::Generated);
        assert!(batch.rows()[1].message.is_none());
    }

    #[test]
    fn duplicate_names_warn() {
        let input = "Name,Company,Email\nA,Acme,a@x.com\nA,Acme EU,a2@x.com\n";
        let (_, summary) = load(input.as_bytes()).unwrap();
        assert!(summary.warnings.iter().any(|w| w.contains("Duplicate names")));
    }
}

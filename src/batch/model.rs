//! Batch and contact row types.

use serde::{Deserialize, Serialize};

/// Column headers the loader recognises.
pub mod columns {
    pub const NAME: &str = "Name";
    pub const COMPANY: &str = "Company";
    pub const EMAIL: &str = "Email";
    pub const DESCRIPTION: &str = "Description";
    pub const MESSAGE: &str = "Message";

    /// Must be present for an upload to be accepted.
    pub const REQUIRED: [&str; 3] = [NAME, COMPANY, EMAIL];
}

/// Where a row is in the generation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RowStatus {
    Pending,
    Generated,
    Failed { reason: String },
}

impl RowStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generated => "generated",
            Self::Failed { .. } => "failed",
        }
    }
}

/// One recipient plus its (optionally generated) message.
#[derive(Debug, Clone, Serialize)]
pub struct ContactRow {
    pub name: String,
    pub company: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub message: Option<String>,
    pub status: RowStatus,
    /// Every loaded cell, in column order, exactly as read.
    #[serde(skip)]
    pub(crate) fields: Vec<String>,
}

impl ContactRow {
    /// Build a row with no extra columns, for programmatic batches.
    pub fn new(
        name: impl Into<String>,
        company: impl Into<String>,
        email: impl Into<String>,
        description: Option<&str>,
    ) -> Self {
        let name = name.into();
        let company = company.into();
        let email = email.into();
        let description = description.map(str::to_string);
        let fields = vec![
            name.clone(),
            company.clone(),
            email.clone(),
            description.clone().unwrap_or_default(),
        ];
        Self {
            name,
            company,
            email,
            description,
            message: None,
            status: RowStatus::Pending,
            fields,
        }
    }

    /// The loaded cells, in column order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_message(&self) -> bool {
        self.message.as_deref().is_some_and(|m| !m.trim().is_empty())
    }
}

/// Ordered rows loaded atomically from one upload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Batch {
    columns: Vec<String>,
    rows: Vec<ContactRow>,
    #[serde(skip)]
    message_column: Option<usize>,
}

impl Batch {
    pub(crate) fn from_parts(
        columns: Vec<String>,
        rows: Vec<ContactRow>,
        message_column: Option<usize>,
    ) -> Self {
        Self {
            columns,
            rows,
            message_column,
        }
    }

    /// Build a batch from rows created with `ContactRow::new`.
    pub fn from_rows(rows: Vec<ContactRow>) -> Self {
        let columns = [
            columns::NAME,
            columns::COMPANY,
            columns::EMAIL,
            columns::DESCRIPTION,
        ]
        .map(String::from)
        .to_vec();
        Self::from_parts(columns, rows, None)
    }

    /// Headers in load order (without an appended Message column).
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Index of a loaded Message column, if the upload had one.
    pub fn message_column(&self) -> Option<usize> {
        self.message_column
    }

    pub fn rows(&self) -> &[ContactRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether at least one row has a populated message.
    pub fn has_messages(&self) -> bool {
        self.rows.iter().any(ContactRow::has_message)
    }

    /// Names in row order, for driving a pass over the batch.
    pub fn names(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.name.clone()).collect()
    }

    /// Record a generated message on every row keyed by `name`.
    ///
    /// Returns how many rows matched. Rows with other names are untouched.
    pub fn set_message(&mut self, name: &str, message: String) -> usize {
        self.update_where(name, |row| {
            row.message = Some(message.clone());
            row.status = RowStatus::Generated;
        })
    }

    /// Mark every row keyed by `name` as failed and drop any earlier message,
    /// so a body written for a previous campaign is never exported or sent.
    pub fn set_failed(&mut self, name: &str, reason: String) -> usize {
        self.update_where(name, |row| {
            row.message = None;
            row.status = RowStatus::Failed {
                reason: reason.clone(),
            };
        })
    }

    fn update_where(&mut self, name: &str, mut apply: impl FnMut(&mut ContactRow)) -> usize {
        let mut matched = 0;
        for row in self.rows.iter_mut().filter(|r| r.name == name) {
            apply(row);
            matched += 1;
        }
        matched
    }

    /// Counts per status label: (generated, failed, pending).
    pub fn status_counts(&self) -> (usize, usize, usize) {
        self.rows
            .iter()
            .fold((0, 0, 0), |(g, f, p), row| match row.status {
                RowStatus::Generated => (g + 1, f, p),
                RowStatus::Failed { .. } => (g, f + 1, p),
                RowStatus::Pending => (g, f, p + 1),
            })
    }
}

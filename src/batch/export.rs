//! Batch → CSV download.

use super::model::{Batch, columns};

/// Fixed download name for the exported batch.
pub const EXPORT_FILE_NAME: &str = "personalized_messages.csv";
pub const EXPORT_MIME_TYPE: &str = "text/csv";

/// Encode the full batch as UTF-8 CSV with a header row.
///
/// Loaded columns keep their order and exact cell contents. The message
/// goes into a loaded `Message` column if there was one, otherwise into a
/// new trailing `Message` column.
pub fn to_csv(batch: &Batch) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = batch.columns().iter().map(String::as_str).collect();
    if batch.message_column().is_none() {
        header.push(columns::MESSAGE);
    }
    writer.write_record(&header)?;

    for row in batch.rows() {
        let message = row.message.as_deref().unwrap_or_default();
        let mut record: Vec<&str> = row.fields().iter().map(String::as_str).collect();
        match batch.message_column() {
            Some(i) => record[i] = message,
            None => record.push(message),
        }
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

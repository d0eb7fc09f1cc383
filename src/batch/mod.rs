//! Contact batches: the unit of upload, generation, review and export.

pub mod export;
pub mod loader;
pub mod model;

pub use export::{EXPORT_FILE_NAME, EXPORT_MIME_TYPE, to_csv};
pub use loader::{UploadSummary, load};
pub use model::{Batch, ContactRow, RowStatus};

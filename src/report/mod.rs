//! Report emission: row schemas, CSV table writing, and S3 upload.

pub mod rows;
pub mod upload;
pub mod writer;

pub use rows::{CheckRow, DependencyRow, SummaryRow};
pub use upload::ResultUploader;

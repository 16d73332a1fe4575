//! Data types shared by the partition, warehouse and merge layers

pub mod load_error;
pub mod record;

pub use load_error::{LoadErrorDetail, LoadErrorScope};
pub use record::{FieldError, RECORD_COLUMNS, Record, TIMESTAMP_FORMAT};

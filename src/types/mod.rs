//! Type definitions for records and classification results

pub mod record;
pub mod verdict;

pub use record::{FieldValue, RecordSubmission, TrafficRecord};
pub use verdict::{Label, Outcome, Prediction, Verdict};

//! Normalisation of loosely-typed device rows into typed points
//!
//! ```text
//! raw row --> FieldClassifier (tables, duration parser) --> PointBuilder --> Sink
//! ```

pub mod builder;
pub mod classifier;
pub mod duration;
pub mod tables;

pub use builder::{HOST_TAG, PointBuilder, single_tag};
pub use classifier::{FieldClassifier, SpecialTransform, sanitize_key};
pub use duration::{parse_duration, parse_duration_value};
pub use tables::{ClassificationTables, Disposition, NumericKind};

/// One row returned by a device command, keyed by the vendor's field names
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

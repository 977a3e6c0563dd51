//! sqlimport core pipeline
//!
//! Pure, synchronous building blocks shared by every load strategy:
//!
//! - [`delimited`]: quote-toggling field splitter for one line of text
//! - [`reconcile`]: aligns a source file layout to the target table's columns
//! - [`normalize`]: pads or trims a raw line to an exact field count
//! - [`descriptor`]: the XML bulk-load format file handed to the engine
//! - [`value`]: typed conversion of text fields for row-streaming loads
//! - [`diagnostics`]: scan for fields wider than their target column
//!
//! Nothing in this crate talks to a database or the network; the loader
//! crate drives these pieces against the external capabilities.

pub mod delimited;
pub mod descriptor;
pub mod diagnostics;
pub mod error;
pub mod normalize;
pub mod reconcile;
pub mod stats;
pub mod types;
pub mod value;

pub use delimited::{
    decode_record, parse_delimiter, split_fields, split_fields_limited, strip_line_terminator,
    BOM,
};
pub use descriptor::{
    DescriptorEntry, DescriptorOptions, FieldTerminatorSpec, FieldType, LoadDescriptor,
    SmallDateTimeTag, MAX_FIELD_LENGTH, RECORD_TERMINATOR,
};
pub use diagnostics::{scan_oversized_fields, OversizedField};
pub use error::{BoxError, LoadError, Result};
pub use normalize::normalize_line;
pub use reconcile::{ColumnMapping, ColumnReconciler, HeaderMatch, Reconciliation};
pub use stats::{LoadStats, StatsAccumulator};
pub use types::{ColumnSpec, HeaderMode, MaxLength, SqlType, TableName};
pub use value::{convert_field, QuotePolicy, SqlValue, ValueError};

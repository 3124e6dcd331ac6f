//! Contact field helpers
//!
//! Helpers that read and write fields on a single contact record.

mod format;
mod name_parse;
mod snapshot;
mod transfer;

pub use format::{apply_format, DateStampIt, FormatIt, MathIt};
pub use name_parse::{parse_name, NameParseIt, ParsedName};
pub use snapshot::SnapshotIt;
pub use transfer::{ClearIt, CombineIt, CopyIt, DefaultToField, FieldToField, MergeIt, MoveIt};

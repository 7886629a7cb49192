//! Write intents and their translation into store statements.

pub mod diff;
pub mod entry;
pub mod statement;

pub use diff::{AttributeDifference, AttributePath, PathSegment, apply_differences, diff_attributes};
pub use entry::{ConstraintEntry, WriteEntry};
pub use statement::{Operation, Statement, StatementBuilder, UpdateChange};

//! Conversions between typed payloads, attribute maps and stored rows.

pub mod attribute;
pub mod registry;
pub mod row;

pub use attribute::{AttributeValue, Attributes};
pub use registry::TypeRegistry;
pub use row::format_timestamp;

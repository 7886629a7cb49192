//! Full-row layout: a [`StoredItem`] flattened into one attribute map.
//!
//! ```text
//! PK              S   partition key
//! SK              S   sort key
//! CreateDate      S   RFC 3339
//! RowType         S   payload type discriminator
//! RowVersion      N
//! LastUpdatedDate S   RFC 3339
//! ExpireDate      N   optional, epoch seconds
//! <payload>       ... one attribute per top-level payload field
//! ```

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::EncodingError;
use crate::item::StoredItem;
use crate::types::{
    CREATE_DATE_ATTRIBUTE, CompositeKey, LAST_UPDATED_DATE_ATTRIBUTE, PARTITION_KEY_ATTRIBUTE,
    RESERVED_ATTRIBUTES, ROW_TYPE_ATTRIBUTE, ROW_VERSION_ATTRIBUTE, RowStatus,
    SORT_KEY_ATTRIBUTE, TIME_TO_LIVE_ATTRIBUTE, TimeToLive,
};

use super::attribute::{AttributeValue, Attributes};

/// Render a timestamp the way rows store it.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, EncodingError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EncodingError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn required<'a>(row: &'a Attributes, name: &str) -> Result<&'a AttributeValue, EncodingError> {
    row.get(name)
        .ok_or_else(|| EncodingError::MissingAttribute(name.to_string()))
}

fn required_string<'a>(row: &'a Attributes, name: &str) -> Result<&'a str, EncodingError> {
    let value = required(row, name)?;
    value
        .as_s()
        .ok_or_else(|| EncodingError::UnexpectedAttributeType {
            attribute: name.to_string(),
            expected: "S",
            found: value.type_name(),
        })
}

fn number<T: std::str::FromStr>(value: &AttributeValue, name: &str) -> Result<T, EncodingError> {
    let text = value
        .as_n()
        .ok_or_else(|| EncodingError::UnexpectedAttributeType {
            attribute: name.to_string(),
            expected: "N",
            found: value.type_name(),
        })?;
    text.parse()
        .map_err(|_| EncodingError::InvalidNumber(text.to_string()))
}

impl StoredItem {
    /// Flatten into the full row written to the store.
    pub fn to_row(&self) -> Attributes {
        let mut row = self.attributes.clone();
        row.insert(
            PARTITION_KEY_ATTRIBUTE.to_string(),
            AttributeValue::S(self.key.partition_key.clone()),
        );
        row.insert(
            SORT_KEY_ATTRIBUTE.to_string(),
            AttributeValue::S(self.key.sort_key.clone()),
        );
        row.insert(
            CREATE_DATE_ATTRIBUTE.to_string(),
            AttributeValue::S(format_timestamp(&self.create_date)),
        );
        row.insert(
            ROW_TYPE_ATTRIBUTE.to_string(),
            AttributeValue::S(self.row_type.clone()),
        );
        row.insert(
            ROW_VERSION_ATTRIBUTE.to_string(),
            AttributeValue::N(self.row_status.row_version.to_string()),
        );
        row.insert(
            LAST_UPDATED_DATE_ATTRIBUTE.to_string(),
            AttributeValue::S(format_timestamp(&self.row_status.last_updated_date)),
        );
        if let Some(ttl) = self.time_to_live {
            row.insert(
                TIME_TO_LIVE_ATTRIBUTE.to_string(),
                AttributeValue::N(ttl.expires_at.to_string()),
            );
        }
        row
    }

    /// Rebuild an item from a full row.
    pub fn from_row(row: &Attributes) -> Result<Self, EncodingError> {
        let key = CompositeKey::new(
            required_string(row, PARTITION_KEY_ATTRIBUTE)?,
            required_string(row, SORT_KEY_ATTRIBUTE)?,
        );
        let create_date = parse_timestamp(required_string(row, CREATE_DATE_ATTRIBUTE)?)?;
        let row_type = required_string(row, ROW_TYPE_ATTRIBUTE)?.to_string();
        let row_status = RowStatus {
            row_version: number(
                required(row, ROW_VERSION_ATTRIBUTE)?,
                ROW_VERSION_ATTRIBUTE,
            )?,
            last_updated_date: parse_timestamp(required_string(
                row,
                LAST_UPDATED_DATE_ATTRIBUTE,
            )?)?,
        };
        let time_to_live = row
            .get(TIME_TO_LIVE_ATTRIBUTE)
            .map(|value| number(value, TIME_TO_LIVE_ATTRIBUTE).map(TimeToLive::at))
            .transpose()?;

        let attributes = row
            .iter()
            .filter(|(name, _)| !RESERVED_ATTRIBUTES.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Self {
            key,
            row_type,
            create_date,
            row_status,
            time_to_live,
            attributes,
        })
    }
}

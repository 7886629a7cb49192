//! Versioned items: the typed entity wrapper and its type-erased encoded form.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::encoding::attribute::{self, Attributes};
use crate::error::{EncodingError, Error, Result};
use crate::types::{CompositeKey, ExpectedVersion, RESERVED_ATTRIBUTES, RowStatus, TimeToLive};

/// Capability a payload type needs to be stored in a table.
///
/// `ROW_TYPE` is written next to the payload and checked on decode, so a row
/// written as one type is never silently read back as another.
pub trait ItemPayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const ROW_TYPE: &'static str;
}

/// A payload together with its identity, creation time and row status.
///
/// Values are immutable: an update produces a new item through
/// [`VersionedItem::create_updated_item`] and leaves the original untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedItem<T> {
    key: CompositeKey,
    create_date: DateTime<Utc>,
    row_status: RowStatus,
    time_to_live: Option<TimeToLive>,
    payload: T,
}

impl<T: ItemPayload> VersionedItem<T> {
    /// A new item at version 0, created now.
    pub fn new_item(key: CompositeKey, payload: T) -> Self {
        let now = Utc::now();
        Self {
            key,
            create_date: now,
            row_status: RowStatus::initial(now),
            time_to_live: None,
            payload,
        }
    }

    /// A new item at version 0 that carries an expiry.
    pub fn new_item_with_time_to_live(
        key: CompositeKey,
        payload: T,
        time_to_live: TimeToLive,
    ) -> Self {
        Self {
            time_to_live: Some(time_to_live),
            ..Self::new_item(key, payload)
        }
    }

    /// The next version of this item with a new payload.
    ///
    /// Keeps the key, create date and expiry; advances the row version by one.
    pub fn create_updated_item(&self, payload: T) -> Self {
        Self {
            key: self.key.clone(),
            create_date: self.create_date,
            row_status: self.row_status.next(Utc::now()),
            time_to_live: self.time_to_live,
            payload,
        }
    }

    /// Like [`create_updated_item`](Self::create_updated_item), replacing the expiry.
    pub fn create_updated_item_with_time_to_live(
        &self,
        payload: T,
        time_to_live: Option<TimeToLive>,
    ) -> Self {
        Self {
            time_to_live,
            ..self.create_updated_item(payload)
        }
    }

    pub fn key(&self) -> &CompositeKey {
        &self.key
    }

    pub fn create_date(&self) -> DateTime<Utc> {
        self.create_date
    }

    pub fn row_status(&self) -> &RowStatus {
        &self.row_status
    }

    pub fn row_version(&self) -> u64 {
        self.row_status.row_version
    }

    pub fn time_to_live(&self) -> Option<TimeToLive> {
        self.time_to_live
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    /// The lock token a conditional write against this item must match.
    pub fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion {
            row_version: self.row_status.row_version,
            create_date: self.create_date,
        }
    }

    /// Encode into the type-erased form used by write entries and stores.
    pub fn encode(&self) -> Result<StoredItem> {
        let attributes = attribute::encode_payload(&self.payload)?;
        if let Some(name) = attributes
            .keys()
            .find(|name| RESERVED_ATTRIBUTES.contains(&name.as_str()))
        {
            return Err(EncodingError::ReservedAttribute(name.clone()).into());
        }
        Ok(StoredItem {
            key: self.key.clone(),
            row_type: T::ROW_TYPE.to_string(),
            create_date: self.create_date,
            row_status: self.row_status,
            time_to_live: self.time_to_live,
            attributes,
        })
    }
}

/// An encoded item: identity, row metadata and the payload as attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub key: CompositeKey,
    pub row_type: String,
    pub create_date: DateTime<Utc>,
    pub row_status: RowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<TimeToLive>,
    pub attributes: Attributes,
}

impl StoredItem {
    pub fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion {
            row_version: self.row_status.row_version,
            create_date: self.create_date,
        }
    }

    /// Whether this stored row still holds the version the caller read.
    pub fn matches(&self, expected: &ExpectedVersion) -> bool {
        self.row_status.row_version == expected.row_version
            && self.create_date == expected.create_date
    }

    /// Decode into a typed item, checking the row type first.
    pub fn decode<T: ItemPayload>(&self) -> Result<VersionedItem<T>> {
        if self.row_type != T::ROW_TYPE {
            return Err(Error::TypeMismatch {
                key: self.key.clone(),
                expected: T::ROW_TYPE.to_string(),
                provided: self.row_type.clone(),
            });
        }
        Ok(VersionedItem {
            key: self.key.clone(),
            create_date: self.create_date,
            row_status: self.row_status,
            time_to_live: self.time_to_live,
            payload: attribute::decode_payload(&self.attributes)?,
        })
    }
}

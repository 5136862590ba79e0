//! Shared data structures for the persistence layer
//!
//! These structs represent the data model that flows between
//! the database layer and the service layer.

use chrono::{DateTime, Utc};

/// A finished colorization: the original image, its result and when it was made
///
/// Images are stored as encoded PNG bytes. Items are immutable once saved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryItem {
    pub result_image: Option<Vec<u8>>,
    pub input_image: Option<Vec<u8>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl HistoryItem {
    /// New item stamped with the current time
    ///
    /// The stamp is cut to whole milliseconds, the precision the store keeps.
    pub fn new(input_image: Vec<u8>, result_image: Vec<u8>) -> Self {
        Self {
            result_image: Some(result_image),
            input_image: Some(input_image),
            timestamp: DateTime::from_timestamp_millis(Utc::now().timestamp_millis()),
        }
    }
}

/// A history item as read back from the database
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    /// Unique database ID
    pub id: i64,
    pub item: HistoryItem,
}

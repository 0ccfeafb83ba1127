//! Persisted weighing records and the append-only store seam.

use chrono::{DateTime, Utc};
use labeler_traits::BoxError;
use serde::{Deserialize, Serialize};

/// One weighed-and-labeled unit as written to durable local storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub batch_id: String,
    pub product_id: String,
    pub weight: f64,
    pub unit: String,
    pub epc_code: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only local record store.
///
/// `take_all_pending` must be atomic with respect to concurrent `append`
/// calls: a record is returned by exactly one take.
pub trait RecordStore: Send + Sync {
    fn append(&self, record: &WeightRecord) -> Result<(), BoxError>;
    fn take_all_pending(&self) -> Result<Vec<WeightRecord>, BoxError>;
}

impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    fn append(&self, record: &WeightRecord) -> Result<(), BoxError> {
        (**self).append(record)
    }

    fn take_all_pending(&self) -> Result<Vec<WeightRecord>, BoxError> {
        (**self).take_all_pending()
    }
}

use std::sync::Mutex;

use crate::pipeline::alerts::repository::StoreError;

use super::domain::CallRecord;

/// Append-only call completion log.
pub trait CallLogStore: Send + Sync {
    fn append(&self, record: CallRecord) -> Result<(), StoreError>;
    fn query_by_phone(&self, phone: &str) -> Result<Vec<CallRecord>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryCallLog {
    records: Mutex<Vec<CallRecord>>,
}

impl CallLogStore for InMemoryCallLog {
    fn append(&self, record: CallRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .expect("call log mutex poisoned")
            .push(record);
        Ok(())
    }

    fn query_by_phone(&self, phone: &str) -> Result<Vec<CallRecord>, StoreError> {
        let records = self.records.lock().expect("call log mutex poisoned");
        Ok(records
            .iter()
            .filter(|record| record.phone == phone)
            .cloned()
            .collect())
    }
}

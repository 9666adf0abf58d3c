use async_trait::async_trait;
use dashmap::DashMap;
use primeq_core::{RecordError, RecordId, WorkRecord, RECORD_KEY_PREFIX};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Stored entry {key} is not a valid record: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: RecordError,
    },

    #[error("Failed to encode record {id}: {source}")]
    Encode {
        id: RecordId,
        #[source]
        source: RecordError,
    },

    #[error("Cannot allocate {count} ids after {after}")]
    IdsExhausted { after: RecordId, count: usize },
}

/// Key-value source of work records. Keys are `record:<id>`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: RecordId) -> Result<Option<WorkRecord>, StoreError>;

    /// Insert or replace
    async fn set(&self, record: &WorkRecord) -> Result<(), StoreError>;

    /// Every stored record, ordered by id
    async fn list_all(&self) -> Result<Vec<WorkRecord>, StoreError>;
}

/// Record store held in process memory, storing each record as its JSON form
#[derive(Default)]
pub struct MemoryRecordStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<WorkRecord, StoreError> {
        WorkRecord::from_payload(bytes).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: RecordId) -> Result<Option<WorkRecord>, StoreError> {
        let key = format!("{}{}", RECORD_KEY_PREFIX, id);
        match self.entries.get(&key) {
            Some(entry) => Ok(Some(Self::decode(&key, entry.value())?)),
            None => Ok(None),
        }
    }

    async fn set(&self, record: &WorkRecord) -> Result<(), StoreError> {
        let bytes = record.to_payload().map_err(|source| StoreError::Encode {
            id: record.id,
            source,
        })?;
        self.entries.insert(record.store_key(), bytes);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<WorkRecord>, StoreError> {
        let mut records = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(RECORD_KEY_PREFIX))
            .map(|entry| Self::decode(entry.key(), entry.value()))
            .collect::<Result<Vec<_>, _>>()?;

        records.sort_by_key(|record| record.id);
        Ok(records)
    }
}

/// Create `count` records with random values of 1 to `max_digits` digits.
/// Ids continue after the highest id already stored.
pub async fn generate(
    store: &dyn RecordStore,
    count: usize,
    max_digits: usize,
) -> Result<Vec<WorkRecord>, StoreError> {
    let after = store.list_all().await?.last().map_or(0, |record| record.id);
    let exhausted = || StoreError::IdsExhausted { after, count };

    // Ids run from next_id through next_id + count - 1
    let next_id = after.checked_add(1).ok_or_else(exhausted)?;
    if count > 0 {
        u64::try_from(count - 1)
            .ok()
            .and_then(|span| next_id.checked_add(span))
            .ok_or_else(exhausted)?;
    }

    let records = {
        let mut rng = rand::thread_rng();
        (0..count as u64)
            .map(|offset| WorkRecord::random(next_id + offset, max_digits, &mut rng))
            .collect::<Vec<_>>()
    };

    for record in &records {
        store.set(record).await?;
    }

    Ok(records)
}

use super::{DUPLICATE_KEY_CODE, OpOutcome, OpStatus, WireClient, WireOp, WireOptions, WriteFailure};
use crate::core::{DbError, Record, Result, Value};
use crate::document::{DocumentId, ID_FIELD};
use crate::update::UpdateSpec;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::{Mutex, RwLock};

/// Server error code for a modifier applied to a field of the wrong type.
pub const TYPE_MISMATCH_CODE: i32 = 14;

/// In-process document store implementing [`WireClient`].
///
/// Collections are created on first write. Unique indexes ignore records
/// where the indexed field is missing or null.
#[derive(Default)]
pub struct MemoryWireClient {
    state: RwLock<MemoryState>,
    last_options: Mutex<Option<WireOptions>>,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, MemoryCollection>,
    pending_fault: Option<InjectedFault>,
}

struct InjectedFault {
    acknowledged: usize,
    message: String,
}

#[derive(Default)]
struct MemoryCollection {
    records: Vec<Record>,
    unique_fields: BTreeSet<String>,
}

impl MemoryCollection {
    fn position(&self, id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.get(ID_FIELD).and_then(Value::as_str) == Some(id))
    }

    fn check_unique(
        &self,
        collection: &str,
        record: &Record,
        skip: Option<usize>,
    ) -> std::result::Result<(), WriteFailure> {
        let fields = std::iter::once(ID_FIELD).chain(self.unique_fields.iter().map(String::as_str));
        for field in fields {
            let Some(value) = record.get(field).filter(|value| !value.is_null()) else {
                continue;
            };
            let clash = self
                .records
                .iter()
                .enumerate()
                .filter(|(pos, _)| Some(*pos) != skip)
                .any(|(_, existing)| existing.get(field) == Some(value));
            if clash {
                return Err(duplicate_key(collection, field, value));
            }
        }
        Ok(())
    }

    fn insert(&mut self, collection: &str, mut record: Record) -> std::result::Result<(), WriteFailure> {
        record
            .entry(ID_FIELD.to_string())
            .or_insert_with(|| DocumentId::generate().into());
        self.check_unique(collection, &record, None)?;
        self.records.push(record);
        Ok(())
    }
}

fn duplicate_key(collection: &str, field: &str, value: &Value) -> WriteFailure {
    WriteFailure {
        code: DUPLICATE_KEY_CODE,
        message: format!(
            "E11000 duplicate key error collection: {} index: {}_1 dup key: {{ {}: {} }}",
            collection, field, field, value
        ),
    }
}

impl MemoryWireClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `execute_batch` call apply `acknowledged` operations and
    /// then fail in transit with `message`.
    pub async fn fail_next_batch(&self, acknowledged: usize, message: impl Into<String>) {
        let mut state = self.state.write().await;
        state.pending_fault = Some(InjectedFault {
            acknowledged,
            message: message.into(),
        });
    }

    /// Snapshot of a collection in insertion order.
    pub async fn records(&self, collection: &str) -> Vec<Record> {
        let state = self.state.read().await;
        state
            .collections
            .get(collection)
            .map(|coll| coll.records.clone())
            .unwrap_or_default()
    }

    /// Options passed with the most recent call.
    pub async fn last_options(&self) -> Option<WireOptions> {
        self.last_options.lock().await.clone()
    }

    async fn remember(&self, options: &WireOptions) {
        *self.last_options.lock().await = Some(options.clone());
    }
}

#[async_trait]
impl WireClient for MemoryWireClient {
    async fn execute_batch(
        &self,
        collection: &str,
        ops: Vec<WireOp>,
        ordered: bool,
        options: &WireOptions,
    ) -> Result<Vec<OpOutcome>> {
        self.remember(options).await;
        let mut state = self.state.write().await;
        let fault = state.pending_fault.take();
        let coll = state.collections.entry(collection.to_string()).or_default();

        let mut outcomes = Vec::with_capacity(ops.len());
        for (attempted, op) in ops.into_iter().enumerate() {
            if let Some(fault) = fault.as_ref().filter(|f| f.acknowledged == attempted) {
                return Err(DbError::Transport(fault.message.clone()));
            }

            match op {
                WireOp::Insert { index, record } => match coll.insert(collection, record) {
                    Ok(()) => outcomes.push(OpOutcome::ok(index)),
                    Err(failure) => {
                        outcomes.push(OpOutcome {
                            index,
                            status: OpStatus::Failed(failure),
                        });
                        if ordered {
                            break;
                        }
                    }
                },
            }
        }

        if let Some(fault) = fault {
            return Err(DbError::Transport(fault.message));
        }
        Ok(outcomes)
    }

    async fn find_one(
        &self,
        collection: &str,
        id: &DocumentId,
        options: &WireOptions,
    ) -> Result<Option<Record>> {
        self.remember(options).await;
        let state = self.state.read().await;
        Ok(state.collections.get(collection).and_then(|coll| {
            coll.position(id.as_str())
                .map(|pos| coll.records[pos].clone())
        }))
    }

    async fn insert_one(
        &self,
        collection: &str,
        record: Record,
        options: &WireOptions,
    ) -> Result<()> {
        self.remember(options).await;
        let mut state = self.state.write().await;
        let coll = state.collections.entry(collection.to_string()).or_default();
        coll.insert(collection, record)?;
        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &DocumentId,
        mut record: Record,
        options: &WireOptions,
    ) -> Result<()> {
        self.remember(options).await;
        let mut state = self.state.write().await;
        let coll = state.collections.entry(collection.to_string()).or_default();
        record.insert(ID_FIELD.to_string(), id.clone().into());

        match coll.position(id.as_str()) {
            Some(pos) => {
                coll.check_unique(collection, &record, Some(pos))?;
                coll.records[pos] = record;
            }
            None => coll.insert(collection, record)?,
        }
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &DocumentId,
        update: &UpdateSpec,
        options: &WireOptions,
    ) -> Result<Record> {
        self.remember(options).await;
        let mut state = self.state.write().await;
        let not_found = || DbError::DocumentNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        let coll = state.collections.get_mut(collection).ok_or_else(not_found)?;
        let pos = coll.position(id.as_str()).ok_or_else(not_found)?;

        let mut updated = coll.records[pos].clone();
        update.apply_to(&mut updated).map_err(|err| DbError::Write {
            code: TYPE_MISMATCH_CODE,
            message: err.to_string(),
        })?;
        updated.insert(ID_FIELD.to_string(), id.clone().into());
        coll.check_unique(collection, &updated, Some(pos))?;
        coll.records[pos] = updated.clone();
        Ok(updated)
    }

    async fn remove(
        &self,
        collection: &str,
        id: &DocumentId,
        options: &WireOptions,
    ) -> Result<bool> {
        self.remember(options).await;
        let mut state = self.state.write().await;
        let Some(coll) = state.collections.get_mut(collection) else {
            return Ok(false);
        };
        match coll.position(id.as_str()) {
            Some(pos) => {
                coll.records.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self, collection: &str, options: &WireOptions) -> Result<usize> {
        self.remember(options).await;
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .map_or(0, |coll| coll.records.len()))
    }

    async fn ensure_unique_index(
        &self,
        collection: &str,
        field: &str,
        options: &WireOptions,
    ) -> Result<()> {
        self.remember(options).await;
        let mut state = self.state.write().await;
        let coll = state.collections.entry(collection.to_string()).or_default();
        if coll.unique_fields.contains(field) {
            return Ok(());
        }

        let mut seen: Vec<&Value> = Vec::new();
        for value in coll
            .records
            .iter()
            .filter_map(|record| record.get(field))
            .filter(|value| !value.is_null())
        {
            if seen.contains(&value) {
                return Err(duplicate_key(collection, field, value).into());
            }
            seen.push(value);
        }

        coll.unique_fields.insert(field.to_string());
        Ok(())
    }
}

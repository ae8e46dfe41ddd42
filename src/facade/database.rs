use crate::bulk::{Bulk, BulkOptions, BulkResult};
use crate::connection::{DatabaseConfig, ReadPreference};
use crate::core::{DbError, Record, Result, Value};
use crate::document::{DatabaseId, Document, DocumentId, DocumentType};
use crate::serialize::{self, Fields};
use crate::update::UpdateSpec;
use crate::wire::{WireClient, WireOptions};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Document-oriented entry point over a [`WireClient`].
///
/// Cloning is cheap and keeps the same [`DatabaseId`], so documents bound
/// through a clone report the same database.
#[derive(Clone)]
pub struct Database {
    id: DatabaseId,
    config: DatabaseConfig,
    client: Arc<dyn WireClient>,
}

impl Database {
    pub fn new(client: Arc<dyn WireClient>, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: DatabaseId::generate(),
            config,
            client,
        })
    }

    pub fn id(&self) -> DatabaseId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn WireClient> {
        &self.client
    }

    /// Same database, with calls routed using `read_preference`.
    pub fn with_read_preference(&self, read_preference: ReadPreference) -> Self {
        let mut db = self.clone();
        db.config.read_preference = read_preference;
        db
    }

    fn wire_options(&self) -> WireOptions {
        WireOptions::from(&self.config)
    }

    /// Inserts the full document and marks it persisted.
    ///
    /// The identity is generated client-side first, so it stays assigned even
    /// when the server rejects the write.
    pub async fn insert(&self, document: &mut Document) -> Result<()> {
        let id = document.ensure_id().clone();
        let collection = document.doc_type().collection().to_string();
        let record = serialize::to_wire(document, Fields::All);

        self.client
            .insert_one(&collection, record, &self.wire_options())
            .await?;
        document.mark_persisted(self.id);
        event!(Level::DEBUG, collection = %collection, id = %id, "document inserted");
        Ok(())
    }

    /// Persists pending changes.
    ///
    /// Without an identity this is an insert. Otherwise only changed and
    /// unset fields are written, and the instance is refreshed from the
    /// stored record so fields written by others become visible.
    pub async fn save(&self, document: &mut Document) -> Result<()> {
        if document.id().is_none() {
            return self.insert(document).await;
        }

        let id = document.require_id()?.clone();
        let collection = document.doc_type().collection().to_string();
        let update = UpdateSpec::new()
            .set_all(serialize::to_wire(document, Fields::Changed))
            .unset(document.unset_fields().clone());

        if !update.is_empty() {
            let stored = self
                .client
                .update_one(&collection, &id, &update, &self.wire_options())
                .await?;
            serialize::refresh_from_wire(document, stored)?;
        }

        document.mark_persisted(self.id);
        event!(Level::DEBUG, collection = %collection, id = %id, "document saved");
        Ok(())
    }

    /// Writes the whole document, replacing the stored record so fields the
    /// instance does not hold are removed server-side.
    pub async fn save_full(&self, document: &mut Document) -> Result<()> {
        if document.id().is_none() {
            return self.insert(document).await;
        }

        let id = document.require_id()?.clone();
        let collection = document.doc_type().collection().to_string();
        let record = serialize::to_wire(document, Fields::All);

        self.client
            .replace_one(&collection, &id, record, &self.wire_options())
            .await?;
        document.mark_persisted(self.id);
        event!(Level::DEBUG, collection = %collection, id = %id, "document replaced");
        Ok(())
    }

    /// Applies `update` atomically to the stored record and mirrors the
    /// resulting values onto `document` without a reload.
    ///
    /// Every clause is checked against the document type first; an ill-typed
    /// or undeclared field fails without touching the wire.
    pub async fn update_one(&self, document: &mut Document, update: UpdateSpec) -> Result<()> {
        let id = document.require_id()?.clone();
        let collection = document.doc_type().collection().to_string();
        let update = update.checked_for(document.doc_type())?;
        let Some(query) = update.to_query() else {
            return Ok(());
        };

        let stored = self
            .client
            .update_one(&collection, &id, &update, &self.wire_options())
            .await?;
        let query = Value::Object(query);
        event!(
            Level::DEBUG,
            collection = %collection,
            id = %id,
            query = %query,
            "document updated"
        );

        let mut mirrored = Vec::new();
        for name in update.touched_fields() {
            let decoded = match stored.get(name) {
                Some(value) => serialize::decode_field(document.doc_type(), name, value.clone())?,
                None => None,
            };
            mirrored.push((name, decoded));
        }
        for (name, decoded) in mirrored {
            match decoded {
                Some(value) => document.apply_persisted(name, value),
                None => document.forget_persisted(name),
            }
        }
        for name in update.unset_fields() {
            document.forget_persisted(name);
        }
        Ok(())
    }

    /// Deletes the stored record. The instance keeps its values and identity
    /// but is no longer bound to this database.
    pub async fn remove(&self, document: &mut Document) -> Result<bool> {
        let id = document.require_id()?.clone();
        let collection = document.doc_type().collection().to_string();

        let removed = self
            .client
            .remove(&collection, &id, &self.wire_options())
            .await?;
        document.detach();
        if !removed {
            event!(Level::DEBUG, collection = %collection, id = %id, "nothing to remove");
        }
        Ok(removed)
    }

    /// Refetches the stored record into the same instance and returns it.
    pub async fn reload<'a>(&self, document: &'a mut Document) -> Result<&'a mut Document> {
        let record = self.fetch(document).await?;
        serialize::refresh_from_wire(document, record)?;
        document.mark_persisted(self.id);
        Ok(document)
    }

    /// Refetches the stored record as a new instance; `document` is untouched.
    pub async fn reload_new(&self, document: &Document) -> Result<Document> {
        let record = self.fetch(document).await?;
        let mut fresh = serialize::from_wire(document.doc_type().clone(), record)?;
        fresh.mark_persisted(self.id);
        Ok(fresh)
    }

    async fn fetch(&self, document: &Document) -> Result<Record> {
        let id = document.require_id()?;
        let collection = document.doc_type().collection();
        self.client
            .find_one(collection, id, &self.wire_options())
            .await?
            .ok_or_else(|| DbError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    pub async fn find_one(
        &self,
        doc_type: &Arc<DocumentType>,
        id: &DocumentId,
    ) -> Result<Option<Document>> {
        let record = self
            .client
            .find_one(doc_type.collection(), id, &self.wire_options())
            .await?;
        record
            .map(|record| -> Result<Document> {
                let mut document = serialize::from_wire(doc_type.clone(), record)?;
                document.mark_persisted(self.id);
                Ok(document)
            })
            .transpose()
    }

    pub async fn count(&self, doc_type: &DocumentType) -> Result<usize> {
        self.client
            .count(doc_type.collection(), &self.wire_options())
            .await
    }

    /// Declares the type's unique fields on the wire side.
    pub async fn ensure_indexes(&self, doc_type: &DocumentType) -> Result<()> {
        for field in doc_type.unique_fields() {
            self.client
                .ensure_unique_index(doc_type.collection(), &field.name, &self.wire_options())
                .await?;
        }
        Ok(())
    }

    /// Unordered coordinator that raises on write errors.
    pub fn bulk(&self, doc_type: &Arc<DocumentType>) -> Bulk {
        self.bulk_with(doc_type, BulkOptions::default())
    }

    pub fn bulk_with(&self, doc_type: &Arc<DocumentType>, options: BulkOptions) -> Bulk {
        Bulk::new(
            doc_type.clone(),
            options,
            self.client.clone(),
            self.wire_options(),
            self.id,
        )
    }

    /// Runs `block` against a fresh coordinator and executes whatever it
    /// queued, exactly once, when the block returns `Ok`.
    ///
    /// When the block returns `Err` (or panics) the queue is discarded and
    /// nothing reaches the wire; the block's error is returned as is. Batches
    /// the block executed itself are not rolled back.
    ///
    /// ```no_run
    /// # use docmap::{Database, Document, BulkOptions, DocumentType, DbError};
    /// # use std::sync::Arc;
    /// # async fn demo(db: &Database, doc_type: &Arc<DocumentType>) -> Result<(), DbError> {
    /// let mut doc = Document::new(doc_type.clone());
    /// doc.set("i", 1)?;
    /// let result = db
    ///     .bulk_scope::<_, DbError>(doc_type, BulkOptions::default(), |bulk| {
    ///         Box::pin(async move { bulk.insert(doc) })
    ///     })
    ///     .await?;
    /// assert_eq!(result.n_inserted, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bulk_scope<F, E>(
        &self,
        doc_type: &Arc<DocumentType>,
        options: BulkOptions,
        block: F,
    ) -> std::result::Result<BulkResult, E>
    where
        F: for<'b> FnOnce(&'b mut Bulk) -> BoxFuture<'b, std::result::Result<(), E>>,
        E: From<DbError>,
    {
        let mut bulk = self.bulk_with(doc_type, options);
        let span = info_span!("bulk.scope", collection = %doc_type.collection());

        async move {
            let outcome = block(&mut bulk).await;
            match outcome {
                Ok(()) => bulk.execute().await.map_err(E::from),
                Err(err) => {
                    let discarded = bulk.discard();
                    event!(
                        Level::DEBUG,
                        discarded = discarded.len(),
                        "bulk scope failed, queue discarded"
                    );
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

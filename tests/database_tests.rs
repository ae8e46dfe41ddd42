use docmap::{
    Database, DatabaseConfig, DbError, Document, DocumentId, DocumentType, FieldDef, FieldKind,
    MemoryWireClient, ReadPreference, Record, UpdateSpec, Value, WireClient, WireOptions,
    from_wire,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const COLLECTION: &str = "testdocs";

fn doc_type() -> Arc<DocumentType> {
    DocumentType::builder("TestDoc")
        .collection(COLLECTION)
        .field(FieldDef::new("b", FieldKind::Boolean))
        .field(FieldDef::new("i", FieldKind::Integer))
        .field(FieldDef::new("l", FieldKind::list(FieldKind::Integer)))
        .build()
}

async fn setup() -> (Arc<MemoryWireClient>, Database) {
    let client = Arc::new(MemoryWireClient::new());
    let db = Database::new(client.clone(), DatabaseConfig::new("test")).unwrap();
    (client, db)
}

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Stores `{_id: "a", i: 13}` behind the mapper's back and loads it.
async fn stored_doc(client: &MemoryWireClient) -> Document {
    let options = WireOptions::default();
    client
        .insert_one(
            COLLECTION,
            record(&[("_id", Value::from("a")), ("i", Value::Integer(13))]),
            &options,
        )
        .await
        .unwrap();
    let raw = client
        .find_one(COLLECTION, &DocumentId::from("a"), &options)
        .await
        .unwrap()
        .unwrap();
    from_wire(doc_type(), raw).unwrap()
}

async fn stored_record(client: &MemoryWireClient, id: &str) -> Record {
    client
        .find_one(COLLECTION, &DocumentId::from(id), &WireOptions::default())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_insert() {
    let (client, db) = setup().await;
    let mut doc = Document::new(doc_type());
    doc.set("i", 13).unwrap();

    db.insert(&mut doc).await.unwrap();

    assert_eq!(db.count(&doc_type()).await.unwrap(), 1);
    assert!(!doc.is_changed());
    assert_eq!(doc.database(), Some(db.id()));
    let stored = client.records(COLLECTION).await;
    assert_eq!(stored[0]["i"], Value::Integer(13));
    assert_eq!(stored[0]["_id"], Value::from(doc.id().unwrap().clone()));
}

#[tokio::test]
async fn test_insert_duplicate_identity() {
    let (_client, db) = setup().await;
    let mut first = Document::new(doc_type());
    first.assign_id(DocumentId::from("a")).unwrap();
    db.insert(&mut first).await.unwrap();

    let mut second = Document::new(doc_type());
    second.assign_id(DocumentId::from("a")).unwrap();
    second.set("i", 1).unwrap();
    let err = db.insert(&mut second).await.unwrap_err();

    assert!(matches!(err, DbError::Write { code: 11000, .. }));
    assert!(second.is_changed());
    assert!(second.database().is_none());
    assert_eq!(db.count(&doc_type()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_save_new() {
    let (client, db) = setup().await;
    let mut doc = Document::new(doc_type());
    doc.set("i", 13).unwrap();

    db.save(&mut doc).await.unwrap();

    assert_eq!(db.count(&doc_type()).await.unwrap(), 1);
    assert!(doc.id().is_some());
    assert!(doc.is_persisted());
    assert_eq!(client.records(COLLECTION).await[0]["i"], Value::Integer(13));
}

#[tokio::test]
async fn test_save() {
    let (client, db) = setup().await;
    let mut doc = stored_doc(&client).await;
    doc.set("i", 26).unwrap();

    // A concurrent writer touches a field this instance never changed.
    client
        .update_one(
            COLLECTION,
            &DocumentId::from("a"),
            &UpdateSpec::new().set("b", true),
            &WireOptions::default(),
        )
        .await
        .unwrap();

    db.save(&mut doc).await.unwrap();

    assert_eq!(doc.get("i"), Some(&Value::Integer(26)));
    assert_eq!(doc.get("b"), Some(&Value::Boolean(true)));
    assert!(!doc.is_changed());
    assert_eq!(doc.database(), Some(db.id()));

    let stored = stored_record(&client, "a").await;
    assert_eq!(stored["i"], Value::Integer(26));
    assert_eq!(stored["b"], Value::Boolean(true));
}

#[tokio::test]
async fn test_save_full() {
    let (client, db) = setup().await;
    let mut doc = stored_doc(&client).await;
    doc.set("i", 26).unwrap();

    client
        .update_one(
            COLLECTION,
            &DocumentId::from("a"),
            &UpdateSpec::new().set("b", true),
            &WireOptions::default(),
        )
        .await
        .unwrap();

    db.save_full(&mut doc).await.unwrap();

    assert_eq!(doc.get("i"), Some(&Value::Integer(26)));
    assert!(!doc.contains("b"));
    assert!(!doc.is_changed());

    let stored = stored_record(&client, "a").await;
    assert_eq!(stored["i"], Value::Integer(26));
    assert!(!stored.contains_key("b"));
}

#[tokio::test]
async fn test_save_unset_field() {
    let (client, db) = setup().await;
    let mut doc = stored_doc(&client).await;
    doc.set("b", false).unwrap();
    doc.unset("i");

    db.save(&mut doc).await.unwrap();

    let stored = stored_record(&client, "a").await;
    assert!(!stored.contains_key("i"));
    assert_eq!(stored["b"], Value::Boolean(false));
    assert!(!doc.contains("i"));
    assert!(doc.unset_fields().is_empty());
}

#[tokio::test]
async fn test_save_without_changes_is_a_no_op() {
    let (client, db) = setup().await;
    let mut doc = stored_doc(&client).await;

    db.save(&mut doc).await.unwrap();

    assert!(doc.is_persisted());
    assert_eq!(stored_record(&client, "a").await["i"], Value::Integer(13));
}

#[tokio::test]
async fn test_update_one_set_and_unset_sequence() {
    let (client, db) = setup().await;
    let mut doc = stored_doc(&client).await;

    db.update_one(&mut doc, UpdateSpec::new().set("b", true).unset(vec!["i"]))
        .await
        .unwrap();

    assert_eq!(doc.get("b"), Some(&Value::Boolean(true)));
    assert!(!doc.contains("i"));
    let stored = stored_record(&client, "a").await;
    assert_eq!(stored["b"], Value::Boolean(true));
    assert!(!stored.contains_key("i"));
}

#[tokio::test]
async fn test_update_one_set_and_unset_mapping() {
    let (client, db) = setup().await;
    let mut doc = stored_doc(&client).await;
    let mut unset = BTreeMap::new();
    unset.insert("i".to_string(), Value::Boolean(true));

    db.update_one(&mut doc, UpdateSpec::new().set("b", true).unset(unset))
        .await
        .unwrap();

    assert_eq!(doc.get("b"), Some(&Value::Boolean(true)));
    assert!(!doc.contains("i"));
    assert!(!stored_record(&client, "a").await.contains_key("i"));
}

#[tokio::test]
async fn test_update_one_inc() {
    let (client, db) = setup().await;
    let mut doc = Document::new(doc_type());
    doc.set("i", 12).unwrap();
    db.insert(&mut doc).await.unwrap();
    let id = doc.id().unwrap().to_string();

    db.update_one(&mut doc, UpdateSpec::new().inc("i", 1))
        .await
        .unwrap();

    assert_eq!(doc.get("i"), Some(&Value::Integer(13)));
    assert!(!doc.contains("b"));
    assert_eq!(stored_record(&client, &id).await["i"], Value::Integer(13));
}

#[tokio::test]
async fn test_update_one_push_and_pull() {
    let (client, db) = setup().await;
    let mut doc = Document::new(doc_type());
    doc.set("l", vec![1, 2, 3]).unwrap();
    db.insert(&mut doc).await.unwrap();
    let id = doc.id().unwrap().to_string();

    db.update_one(&mut doc, UpdateSpec::new().push("l", 4))
        .await
        .unwrap();
    assert_eq!(doc.get("l"), Some(&Value::from(vec![1, 2, 3, 4])));

    db.update_one(&mut doc, UpdateSpec::new().pull("l", 2))
        .await
        .unwrap();
    assert_eq!(doc.get("l"), Some(&Value::from(vec![1, 3, 4])));
    assert_eq!(stored_record(&client, &id).await["l"], Value::from(vec![1, 3, 4]));
}

#[tokio::test]
async fn test_update_one_keeps_unrelated_pending_changes() {
    let (client, db) = setup().await;
    let mut doc = stored_doc(&client).await;
    doc.set("b", true).unwrap();

    db.update_one(&mut doc, UpdateSpec::new().inc("i", 1))
        .await
        .unwrap();

    assert_eq!(doc.get("i"), Some(&Value::Integer(14)));
    assert!(doc.changed_fields().contains("b"));
    assert!(!doc.changed_fields().contains("i"));
    assert!(!stored_record(&client, "a").await.contains_key("b"));
}

#[tokio::test]
async fn test_update_one_type_mismatch_leaves_record() {
    let (client, db) = setup().await;
    let mut doc = stored_doc(&client).await;

    let err = db
        .update_one(&mut doc, UpdateSpec::new().set("b", true).push("i", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Write { .. }));
    let stored = stored_record(&client, "a").await;
    assert!(!stored.contains_key("b"));
    assert_eq!(stored["i"], Value::Integer(13));
}

#[tokio::test]
async fn test_update_one_rejects_ill_typed_values_before_writing() {
    let (client, db) = setup().await;
    let mut doc = stored_doc(&client).await;

    for update in [
        UpdateSpec::new().set("b", true).set("i", "twelve"),
        UpdateSpec::new().inc("i", "1"),
        UpdateSpec::new().push("l", "x"),
    ] {
        let err = db.update_one(&mut doc, update).await.unwrap_err();
        assert!(matches!(err, DbError::TypeMismatch(_)));
    }
    let err = db
        .update_one(&mut doc, UpdateSpec::new().set("undeclared", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::UnknownField { .. }));

    let stored = stored_record(&client, "a").await;
    assert_eq!(stored["i"], Value::Integer(13));
    assert!(!stored.contains_key("b"));
    assert_eq!(doc.get("i"), Some(&Value::Integer(13)));
    assert!(!doc.contains("b"));

    db.reload(&mut doc).await.unwrap();
    assert_eq!(doc.get("i"), Some(&Value::Integer(13)));
}

#[tokio::test]
async fn test_update_one_coerces_values_to_field_kind() {
    let (client, db) = setup().await;
    let mut doc = stored_doc(&client).await;

    db.update_one(&mut doc, UpdateSpec::new().inc("i", 2.0).push("l", 7.0))
        .await
        .unwrap();

    let stored = stored_record(&client, "a").await;
    assert!(matches!(stored["i"], Value::Integer(15)));
    assert_eq!(stored["l"], Value::from(vec![7]));
    assert!(matches!(doc.get("i"), Some(Value::Integer(15))));
}

#[tokio::test]
async fn test_update_one_pull_matches_floats_exactly() {
    let (client, db) = setup().await;
    let floats = DocumentType::builder("Samples")
        .collection("samples")
        .field(FieldDef::new("l", FieldKind::list(FieldKind::Float)))
        .build();
    let mut doc = Document::new(floats);
    doc.set("l", vec![1e-17, 2e-17, 0.5]).unwrap();
    db.insert(&mut doc).await.unwrap();
    let id = doc.id().unwrap().clone();

    db.update_one(&mut doc, UpdateSpec::new().pull("l", 1e-17))
        .await
        .unwrap();

    assert_eq!(doc.get("l"), Some(&Value::from(vec![2e-17, 0.5])));
    let stored = client
        .find_one("samples", &id, &WireOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["l"], Value::from(vec![2e-17, 0.5]));
}

#[tokio::test]
async fn test_unique_index_distinguishes_close_floats() {
    let (_client, db) = setup().await;
    let readings = DocumentType::builder("Reading")
        .field(FieldDef::new("v", FieldKind::Float).unique())
        .build();
    db.ensure_indexes(&readings).await.unwrap();

    for v in [1e-17, 2e-17] {
        let mut doc = Document::new(readings.clone());
        doc.set("v", v).unwrap();
        db.insert(&mut doc).await.unwrap();
    }
    assert_eq!(db.count(&readings).await.unwrap(), 2);
}

#[tokio::test]
async fn test_update_one_requires_identity() {
    let (_client, db) = setup().await;
    let mut doc = Document::new(doc_type());

    let err = db
        .update_one(&mut doc, UpdateSpec::new().set("b", true))
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::MissingIdentity));
    assert!(err.is_usage_error());
}

#[tokio::test]
async fn test_remove() {
    let (_client, db) = setup().await;
    let mut doc = Document::new(doc_type());
    doc.set("i", 5).unwrap();
    db.insert(&mut doc).await.unwrap();
    assert_eq!(db.count(&doc_type()).await.unwrap(), 1);

    assert!(db.remove(&mut doc).await.unwrap());

    assert_eq!(db.count(&doc_type()).await.unwrap(), 0);
    assert_eq!(doc.get("i"), Some(&Value::Integer(5)));
    assert!(doc.id().is_some());
    assert!(doc.database().is_none());
    assert!(!db.remove(&mut doc).await.unwrap());
}

#[tokio::test]
async fn test_reload_in_place() {
    let (client, db) = setup().await;
    let mut doc = Document::new(doc_type());
    doc.set("i", 1).unwrap();
    db.insert(&mut doc).await.unwrap();
    let id = doc.id().unwrap().clone();

    client
        .replace_one(
            COLLECTION,
            &id,
            record(&[("i", Value::Integer(2))]),
            &WireOptions::default(),
        )
        .await
        .unwrap();

    let doc_ptr: *const Document = &doc;
    let reloaded = db.reload(&mut doc).await.unwrap();
    assert!(std::ptr::eq(reloaded, doc_ptr));
    assert_eq!(doc.get("i"), Some(&Value::Integer(2)));
    assert!(!doc.is_changed());
}

#[tokio::test]
async fn test_reload_new_instance() {
    let (client, db) = setup().await;
    let mut doc = Document::new(doc_type());
    doc.set("i", 1).unwrap();
    db.insert(&mut doc).await.unwrap();
    let id = doc.id().unwrap().clone();

    client
        .replace_one(
            COLLECTION,
            &id,
            record(&[("i", Value::Integer(2))]),
            &WireOptions::default(),
        )
        .await
        .unwrap();

    let fresh = db.reload_new(&doc).await.unwrap();
    assert_eq!(fresh.get("i"), Some(&Value::Integer(2)));
    assert_eq!(fresh.id(), Some(&id));
    assert_eq!(fresh.database(), Some(db.id()));
    assert_eq!(doc.get("i"), Some(&Value::Integer(1)));
}

#[tokio::test]
async fn test_reload_missing_document() {
    let (_client, db) = setup().await;
    let mut doc = Document::new(doc_type());
    doc.assign_id(DocumentId::from("ghost")).unwrap();

    let err = db.reload(&mut doc).await.unwrap_err();
    assert!(matches!(err, DbError::DocumentNotFound { .. }));
}

#[tokio::test]
async fn test_find_one_binds_database() {
    let (client, db) = setup().await;
    stored_doc(&client).await;

    let found = db
        .find_one(&doc_type(), &DocumentId::from("a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get("i"), Some(&Value::Integer(13)));
    assert_eq!(found.database(), Some(db.id()));
    assert!(!found.is_changed());

    assert!(db
        .find_one(&doc_type(), &DocumentId::from("missing"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_read_preference_passthrough() {
    let client = Arc::new(MemoryWireClient::new());
    let config = DatabaseConfig::new("test").read_preference(ReadPreference::SecondaryOnly);
    let db = Database::new(client.clone(), config).unwrap();

    db.count(&doc_type()).await.unwrap();
    let options = client.last_options().await.unwrap();
    assert_eq!(options.read_preference, ReadPreference::SecondaryOnly);

    let primary = db.with_read_preference(ReadPreference::Primary);
    assert_eq!(primary.id(), db.id());
    primary.count(&doc_type()).await.unwrap();
    let options = client.last_options().await.unwrap();
    assert_eq!(options.read_preference, ReadPreference::Primary);
}

#[tokio::test]
async fn test_ensure_indexes() {
    let (_client, db) = setup().await;
    let unique = DocumentType::builder("Account")
        .field(FieldDef::new("email", FieldKind::Text).unique())
        .build();
    db.ensure_indexes(&unique).await.unwrap();

    let mut first = Document::new(unique.clone());
    first.set("email", "a@example.com").unwrap();
    db.insert(&mut first).await.unwrap();

    let mut second = Document::new(unique.clone());
    second.set("email", "a@example.com").unwrap();
    let err = db.insert(&mut second).await.unwrap_err();
    assert!(matches!(err, DbError::Write { code: 11000, .. }));
    assert_eq!(db.count(&unique).await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let client = Arc::new(MemoryWireClient::new());
    let err = Database::new(client, DatabaseConfig::new("")).unwrap_err();
    assert!(matches!(err, DbError::Config(_)));
}

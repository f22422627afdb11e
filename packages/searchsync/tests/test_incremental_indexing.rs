//! Integration tests for incremental indexing and cascading re-index
mod common;

use common::{befriend, person, Harness};
use searchsync::domain::{IndexingMode, Record, Value};
use searchsync::ErrorKind;

/// A, B, C indexed with B.bestFriend = A and C.bestFriend = A
async fn friends_of_alice() -> Harness {
    let h = Harness::new();
    h.put("Person", person("A", "Alice"));
    h.put("Person", befriend(person("B", "Bob"), "A"));
    h.put("Person", befriend(person("C", "Carol"), "A"));
    h.service.rebuild_index(&h.person).await.unwrap();
    h
}

#[tokio::test]
async fn test_add_writes_only_own_document() {
    let h = friends_of_alice().await;
    let index = h.person_index();

    let alice = h.put("Person", person("A", "Alicia"));
    let written = h
        .service
        .index(&h.person, &[alice], IndexingMode::Add)
        .await
        .unwrap();

    assert_eq!(written, 1);
    assert_eq!(h.backend.write_count(&index, "A"), 2);
    assert_eq!(h.backend.write_count(&index, "B"), 1);
    assert_eq!(h.backend.write_count(&index, "C"), 1);
    // B still embeds the old name
    let b = h.backend.document(&index, "B").unwrap();
    assert_eq!(b["bestFriend"]["name"], "Alice");
}

#[tokio::test]
async fn test_update_reindexes_referencing_documents() {
    let h = friends_of_alice().await;
    let index = h.person_index();
    assert_eq!(h.service.count(&h.person, None).await.unwrap(), 3);

    let alice = h.put("Person", person("A", "Alicia"));
    let written = h
        .service
        .index_one(&h.person, &alice, IndexingMode::Update)
        .await
        .unwrap();

    // A plus the two cascaded documents live in the same index
    assert_eq!(written, 3);
    for id in ["A", "B", "C"] {
        assert_eq!(h.backend.write_count(&index, id), 2, "document {}", id);
    }
    for id in ["B", "C"] {
        let doc = h.backend.document(&index, id).unwrap();
        assert_eq!(doc["bestFriend"]["name"], "Alicia", "document {}", id);
    }
    assert_eq!(h.service.count(&h.person, None).await.unwrap(), 3);
}

#[tokio::test]
async fn test_update_leaves_unrelated_documents_alone() {
    let h = friends_of_alice().await;
    let index = h.person_index();
    let dave = h.put("Person", befriend(person("D", "Dave"), "C"));
    h.service
        .index_one(&h.person, &dave, IndexingMode::Add)
        .await
        .unwrap();

    let alice = h.put("Person", person("A", "Alicia"));
    h.service
        .index_one(&h.person, &alice, IndexingMode::Update)
        .await
        .unwrap();

    assert_eq!(h.backend.write_count(&index, "D"), 1);
    assert_eq!(h.service.count(&h.person, None).await.unwrap(), 4);
}

#[tokio::test]
async fn test_cascade_is_single_hop() {
    let h = friends_of_alice().await;
    let index = h.person_index();
    // D -> C -> A
    let dave = h.put("Person", befriend(person("D", "Dave"), "C"));
    h.service
        .index_one(&h.person, &dave, IndexingMode::Add)
        .await
        .unwrap();

    let alice = h.put("Person", person("A", "Alicia"));
    h.service
        .index_one(&h.person, &alice, IndexingMode::Update)
        .await
        .unwrap();

    // C was rewritten, but D, which embeds C, was not
    assert_eq!(h.backend.write_count(&index, "C"), 2);
    assert_eq!(h.backend.write_count(&index, "D"), 1);
}

#[tokio::test]
async fn test_cascade_reaches_other_schemas() {
    let h = Harness::new();
    h.put("Person", person("A", "Alice"));
    h.put("Pet", Record::new(1i64).with("species", "cat").with("owner", Value::reference("A")));
    h.put("Pet", Record::new(2i64).with("species", "dog"));
    h.service.rebuild_index(&h.person).await.unwrap();
    h.service.rebuild_index(&h.pet).await.unwrap();

    let alice = h.put("Person", person("A", "Alicia"));
    let written = h
        .service
        .index_one(&h.person, &alice, IndexingMode::Update)
        .await
        .unwrap();

    // Only the Person document counts; the pet write is logged
    assert_eq!(written, 1);
    let pet_index = h.pet_index();
    assert_eq!(h.backend.write_count(&pet_index, "1"), 2);
    assert_eq!(h.backend.write_count(&pet_index, "2"), 1);
    let cat = h.backend.document(&pet_index, "1").unwrap();
    assert_eq!(cat["owner"]["name"], "Alicia");
}

#[tokio::test]
async fn test_cascade_through_multi_valued_references() {
    let h = Harness::new();
    h.put("Pet", Record::new(1i64).with("species", "cat"));
    h.put(
        "Person",
        person("A", "Alice").with("pets", Value::List(vec![Value::reference(1i64)])),
    );
    h.put("Person", person("B", "Bob"));
    h.service.rebuild_index(&h.pet).await.unwrap();
    h.service.rebuild_index(&h.person).await.unwrap();

    let cat = h.put("Pet", Record::new(1i64).with("species", "lynx"));
    h.service
        .index_one(&h.pet, &cat, IndexingMode::Update)
        .await
        .unwrap();

    let index = h.person_index();
    assert_eq!(h.backend.write_count(&index, "A"), 2);
    assert_eq!(h.backend.write_count(&index, "B"), 1);
    let a = h.backend.document(&index, "A").unwrap();
    assert_eq!(a["pets"][0]["species"], "lynx");
}

#[tokio::test]
async fn test_self_reference_written_once() {
    let h = Harness::new();
    h.put("Person", befriend(person("A", "Alice"), "A"));
    h.service.rebuild_index(&h.person).await.unwrap();

    let alice = h.put("Person", befriend(person("A", "Alicia"), "A"));
    let written = h
        .service
        .index_one(&h.person, &alice, IndexingMode::Update)
        .await
        .unwrap();

    assert_eq!(written, 1);
    assert_eq!(h.backend.write_count(&h.person_index(), "A"), 2);
}

#[tokio::test]
async fn test_update_cascade_skips_records_missing_from_store() {
    let h = friends_of_alice().await;
    h.store.remove("Person", &"C".into());

    let alice = h.put("Person", person("A", "Alicia"));
    let written = h
        .service
        .index_one(&h.person, &alice, IndexingMode::Update)
        .await
        .unwrap();

    assert_eq!(written, 2);
    assert_eq!(h.backend.write_count(&h.person_index(), "C"), 1);
}

#[tokio::test]
async fn test_update_without_index_for_referencing_schema() {
    let h = Harness::new();
    h.put("Person", person("A", "Alice"));
    h.service.rebuild_index(&h.person).await.unwrap();
    // No Pet index at all

    let alice = h.put("Person", person("A", "Alicia"));
    let written = h
        .service
        .index_one(&h.person, &alice, IndexingMode::Update)
        .await
        .unwrap();

    assert_eq!(written, 1);
}

#[tokio::test]
async fn test_reindexing_twice_keeps_one_document() {
    let h = friends_of_alice().await;
    let alice = h.put("Person", person("A", "Alice"));

    h.service.index_one(&h.person, &alice, IndexingMode::Add).await.unwrap();
    h.service.index_one(&h.person, &alice, IndexingMode::Add).await.unwrap();

    assert_eq!(h.service.count(&h.person, None).await.unwrap(), 3);
}

#[tokio::test]
async fn test_partial_bulk_failure_is_not_counted() {
    let h = friends_of_alice().await;
    h.backend.reject_document(&h.person_index(), "B");

    let records = vec![person("A", "Alicia"), person("B", "Bobby"), person("C", "Caz")];
    let written = h
        .service
        .index(&h.person, &records, IndexingMode::Add)
        .await
        .unwrap();

    assert_eq!(written, 2);
    let b = h.backend.document(&h.person_index(), "B").unwrap();
    assert_eq!(b["name"], "Bob");
}

#[tokio::test]
async fn test_transport_failure_surfaces() {
    let h = friends_of_alice().await;
    h.backend.fail_bulk_after(0);

    let err = h
        .service
        .index_one(&h.person, &person("A", "Alicia"), IndexingMode::Add)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::SearchBackend);
}

#[tokio::test]
async fn test_wrong_identity_type_is_rejected() {
    let h = Harness::new();
    h.service.create_index(&h.pet).await.unwrap();

    let err = h
        .service
        .index_one(&h.pet, &Record::new("not-a-number"), IndexingMode::Add)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Serialization);
}

#[tokio::test]
async fn test_delete_single_documents() {
    let h = friends_of_alice().await;

    assert!(h.service.delete(&h.person, &person("B", "Bob")).await.unwrap());
    assert!(!h.service.delete_by_id(&h.person, &"B".into()).await.unwrap());
    assert_eq!(h.service.count(&h.person, None).await.unwrap(), 2);

    // Missing index is swallowed
    assert!(!h.service.delete_by_id(&h.pet, &Value::Int(1)).await.unwrap());
}

#[tokio::test]
async fn test_delete_all() {
    let h = friends_of_alice().await;

    let removed = h
        .service
        .delete_all(&h.person, &[person("A", "Alice"), person("Z", "nobody")])
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let removed = h
        .service
        .delete_all_by_id(&h.person, &["B".into(), "C".into()])
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(h.service.count(&h.person, None).await.unwrap(), 0);

    let removed = h
        .service
        .delete_all_by_id(&h.pet, &[Value::Int(1)])
        .await
        .unwrap();
    assert_eq!(removed, 0);
}

#[tokio::test]
async fn test_index_without_created_index_fails() {
    let h = Harness::new();
    h.put("Person", person("A", "Alice"));

    let err = h
        .service
        .index_one(&h.person, &person("A", "Alice"), IndexingMode::Add)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::IndexNotFound);
    assert!(!h.service.has_index(&h.person).await.unwrap());
    assert_eq!(h.backend.write_count(&h.person_index(), "A"), 0);
}

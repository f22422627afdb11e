//! Shared fixtures for searchsync integration tests
//!
//! People and pets wired through in-memory adapters:
//!
//! ```text
//! Person.bestFriend ──xref──► Person
//! Person.pets       ──mref──► Pet
//! Pet.owner         ──xref──► Person
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use searchsync::domain::{
    Attribute, AttributeType, DocumentIdGenerator, Record, Schema, SchemaRegistry, Value,
};
use searchsync::infrastructure::{InMemoryPrimaryStore, InMemorySchemaRegistry, InMemorySearchBackend};
use searchsync::{SearchSyncService, SyncConfig};

pub struct Harness {
    pub registry: Arc<InMemorySchemaRegistry>,
    pub store: Arc<InMemoryPrimaryStore>,
    pub backend: Arc<InMemorySearchBackend>,
    pub service: SearchSyncService,
    pub person: Arc<Schema>,
    pub pet: Arc<Schema>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(SyncConfig::default(), InMemorySearchBackend::new())
    }

    pub fn with(config: SyncConfig, backend: InMemorySearchBackend) -> Self {
        init_tracing();

        let registry = Arc::new(InMemorySchemaRegistry::from_schemas([person_schema(), pet_schema()]));
        let store = Arc::new(InMemoryPrimaryStore::new(registry.clone()));
        let backend = Arc::new(backend);

        let service = SearchSyncService::builder()
            .transport(backend.clone())
            .store(store.clone())
            .registry(registry.clone())
            .config(config)
            .build()
            .expect("valid service configuration");

        let person = registry.schema("Person").expect("Person registered");
        let pet = registry.schema("Pet").expect("Pet registered");

        Self {
            registry,
            store,
            backend,
            service,
            person,
            pet,
        }
    }

    pub fn person_index(&self) -> String {
        DocumentIdGenerator.index_name("Person")
    }

    pub fn pet_index(&self) -> String {
        DocumentIdGenerator.index_name("Pet")
    }

    /// Upsert into the primary store, returning the stored record
    pub fn put(&self, schema_id: &str, record: Record) -> Record {
        self.store
            .upsert(schema_id, record.clone())
            .expect("schema registered");
        record
    }
}

pub fn person_schema() -> Schema {
    Schema::new("Person", Attribute::new("id", AttributeType::String))
        .with_attribute(Attribute::new("name", AttributeType::String))
        .with_attribute(Attribute::new("city", AttributeType::String))
        .with_attribute(Attribute::xref("bestFriend", "Person"))
        .with_attribute(Attribute::mref("pets", "Pet"))
}

pub fn pet_schema() -> Schema {
    Schema::new("Pet", Attribute::new("id", AttributeType::Long))
        .with_attribute(Attribute::new("species", AttributeType::Enum))
        .with_attribute(Attribute::xref("owner", "Person"))
}

pub fn person(id: &str, name: &str) -> Record {
    Record::new(id).with("name", name)
}

pub fn befriend(record: Record, friend: &str) -> Record {
    record.with("bestFriend", Value::reference(friend))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

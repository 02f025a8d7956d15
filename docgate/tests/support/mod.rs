#![allow(dead_code)]

use std::sync::Once;

use bson::{Document, doc};
use docgate::{memory::InMemoryStore, prelude::*};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Routes test logs through the test harness. Set `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn interface(collection: &str) -> SimpleInterface<InMemoryStore> {
    init_tracing();
    SimpleInterface::new(DataInterface::new(InMemoryStore::new(), collection))
}

pub fn pets() -> Vec<Document> {
    vec![
        doc! { "name": "Rex", "kind": "dog", "age": 3, "tags": ["loud"] },
        doc! { "name": "Tom", "kind": "cat", "age": 7, "tags": ["lazy", "loud"] },
        doc! { "name": "Ada", "kind": "dog", "age": 1, "tags": [] },
        doc! { "name": "Kit", "kind": "cat", "age": 5, "tags": ["lazy"] },
    ]
}

/// Creates every document and returns them as stored.
pub async fn seed<B: StoreBackend>(
    interface: &SimpleInterface<B>,
    documents: Vec<Document>,
) -> Vec<Document> {
    let mut created = Vec::with_capacity(documents.len());
    for document in documents {
        created.push(interface.create(document).await.unwrap());
    }
    created
}

pub fn names(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .map(|document| document.get_str("name").unwrap().to_string())
        .collect()
}

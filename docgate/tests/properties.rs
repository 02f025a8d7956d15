mod support;

use bson::{Bson, Document, doc};
use docgate::{memory::InMemoryStore, prelude::*};
use proptest::prelude::*;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread().build().unwrap()
}

fn untimed(collection: &str) -> SimpleInterface<InMemoryStore> {
    support::init_tracing();
    SimpleInterface::new(
        DataInterface::builder(InMemoryStore::new(), collection)
            .timestamps(false)
            .build(),
    )
}

fn store_error() -> impl Strategy<Value = DocumentStoreError> {
    prop_oneof![
        any::<String>().prop_map(DocumentStoreError::Backend),
        any::<String>().prop_map(DocumentStoreError::InvalidDocument),
        (any::<String>(), "[a-z]{1,8}")
            .prop_map(|(id, c)| DocumentStoreError::DocumentAlreadyExists(id, c)),
        (any::<String>(), "[a-z]{1,8}")
            .prop_map(|(id, c)| DocumentStoreError::DocumentNotFound(id, c)),
    ]
}

fn fields() -> impl Strategy<Value = Document> {
    prop::collection::btree_map("f_[a-z]{1,6}", any::<i32>(), 1..5)
        .prop_map(|fields| fields.into_iter().map(|(k, v)| (k, Bson::Int32(v))).collect())
}

proptest! {
    #[test]
    fn wrapping_is_idempotent(err in store_error()) {
        let once = wrap_error(err);
        let twice = wrap_error(once.clone());

        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.to_wire(), twice.to_wire());
    }

    #[test]
    fn find_pages_through_the_sorted_set(
        ages in prop::collection::vec(0i32..100, 0..30),
        skip in 0u64..10,
        limit in 0u64..10,
    ) {
        runtime().block_on(async {
            let pets = untimed("pets");
            for age in &ages {
                pets.create(doc! { "age": *age }).await.unwrap();
            }

            let query = Query::try_from(doc! {
                "sort": { "age": 1 },
                "skip": skip as i64,
                "limit": limit as i64,
            })
            .unwrap();
            let found: Vec<i32> = pets
                .find(&query)
                .await
                .unwrap()
                .iter()
                .map(|document| document.get_i32("age").unwrap())
                .collect();

            let mut expected = ages.clone();
            expected.sort();
            let expected: Vec<i32> = expected
                .into_iter()
                .skip(skip as usize)
                .take(if limit == 0 { usize::MAX } else { limit as usize })
                .collect();

            prop_assert_eq!(found, expected);
            Ok(())
        })?;
    }

    #[test]
    fn update_sets_fields_on_every_match_only(
        groups in prop::collection::vec(prop_oneof![Just("a"), Just("b")], 1..12),
        delta in fields(),
    ) {
        runtime().block_on(async {
            let items = untimed("items");
            let mut before = Vec::new();
            for (n, group) in groups.iter().enumerate() {
                before.push(items.create(doc! { "group": *group, "n": n as i32 }).await.unwrap());
            }

            let query = Query::filter(doc! { "group": "a" });
            let outcome = items.update(&query, delta.clone(), false).await.unwrap();
            let expected_matches = groups.iter().filter(|group| **group == "a").count() as u64;
            prop_assert_eq!(outcome.matched, expected_matches);

            for original in &before {
                let id = original.get("_id").unwrap();
                let after = items.find_by_id(id).await.unwrap().unwrap();

                let mut expected = original.clone();
                if original.get_str("group").unwrap() == "a" {
                    for (key, value) in &delta {
                        expected.insert(key.clone(), value.clone());
                    }
                }

                for (key, value) in &expected {
                    prop_assert_eq!(after.get(key), Some(value));
                }
                prop_assert_eq!(after.len(), expected.len());
            }
            Ok(())
        })?;
    }

    #[test]
    fn upsert_without_match_creates_delta_and_equalities(
        name in "[a-z]{1,8}",
        delta in fields(),
    ) {
        runtime().block_on(async {
            let items = untimed("items");

            let query = Query::filter(doc! { "name": name.clone() });
            let outcome = items.update(&query, delta.clone(), true).await.unwrap();
            prop_assert_eq!(outcome.matched, 0);
            prop_assert_eq!(items.count(&Query::default()).await.unwrap(), 1);

            let created = items
                .find_by_id(&outcome.upserted_id.unwrap())
                .await
                .unwrap()
                .unwrap();

            let mut expected = doc! { "name": name };
            for (key, value) in &delta {
                expected.insert(key.clone(), value.clone());
            }
            for (key, value) in &expected {
                prop_assert_eq!(created.get(key), Some(value));
            }
            Ok(())
        })?;
    }
}

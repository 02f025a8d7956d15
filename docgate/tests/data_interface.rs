mod support;

use bson::{Bson, doc};
use docgate::{interface::UPDATED_AT, memory::InMemoryStore, patch::parse_patches, prelude::*};

use support::{interface, names, pets, seed};

#[tokio::test]
async fn find_sorts_skips_and_limits() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;

    let query = Query::try_from(doc! { "sort": "-age", "skip": 1, "limit": 2 }).unwrap();
    let found = pets_interface.find(&query).await.unwrap();

    assert_eq!(names(&found), vec!["Kit", "Rex"]);
}

#[tokio::test]
async fn find_keeps_insertion_order_without_sort() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;

    let found = pets_interface.find(&Query::default()).await.unwrap();

    assert_eq!(names(&found), vec!["Rex", "Tom", "Ada", "Kit"]);
}

#[tokio::test]
async fn find_filters_and_projects() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;

    let query = Query::try_from(doc! {
        "query": { "kind": "cat", "age": { "$gte": 6 } },
        "project": { "name": 1 },
    })
    .unwrap();
    let found = pets_interface.find(&query).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_str("name").unwrap(), "Tom");
    assert!(found[0].get("age").is_none());
    assert_eq!(found[0].get("id"), found[0].get("_id"));
}

#[tokio::test]
async fn array_fields_match_their_elements() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;

    let lazy = Query::filter(doc! { "tags": "lazy" });
    let both = Query::filter(doc! { "tags": { "$all": ["lazy", "loud"] } });

    assert_eq!(pets_interface.count(&lazy).await.unwrap(), 2);
    assert_eq!(names(&pets_interface.find(&both).await.unwrap()), vec!["Tom"]);
}

#[tokio::test]
async fn unknown_operators_are_invalid_queries() {
    let pets_interface = interface("pets");

    let err = pets_interface
        .find(&Query::filter(doc! { "age": { "$near": 3 } }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "InvalidQuery");
    assert_eq!(err.http_code(), 400);
}

#[tokio::test]
async fn create_generates_ids_and_timestamps() {
    let pets_interface = interface("pets");

    let created = pets_interface.create(doc! { "name": "Rex" }).await.unwrap();

    assert!(matches!(created.get("_id"), Some(Bson::String(_))));
    assert_eq!(created.get("id"), created.get("_id"));
    assert!(matches!(created.get("createdAt"), Some(Bson::DateTime(_))));
    assert!(matches!(created.get(UPDATED_AT), Some(Bson::DateTime(_))));
}

#[tokio::test]
async fn duplicate_ids_conflict() {
    let pets_interface = interface("pets");
    pets_interface.create(doc! { "_id": "rex", "name": "Rex" }).await.unwrap();

    let err = pets_interface
        .create(doc! { "_id": "rex", "name": "Other" })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "Store");
    assert_eq!(err.http_code(), 409);
    assert!(err.inner_message().is_some());
}

#[tokio::test]
async fn timestamps_can_be_disabled() {
    let pets_interface = SimpleInterface::new(
        DataInterface::builder(InMemoryStore::new(), "pets")
            .timestamps(false)
            .build(),
    );

    let created = pets_interface.create(doc! { "name": "Rex" }).await.unwrap();

    assert!(created.get("createdAt").is_none());
    assert!(created.get(UPDATED_AT).is_none());
}

#[tokio::test]
async fn update_merges_fields_into_matches_only() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;

    let dogs = Query::filter(doc! { "kind": "dog" });
    let outcome = pets_interface
        .update(&dogs, doc! { "vaccinated": true, "_id": "ignored" }, false)
        .await
        .unwrap();

    assert_eq!(outcome.matched, 2);
    assert_eq!(outcome.affected(), 2);

    let all = pets_interface.find(&Query::default()).await.unwrap();
    for pet in &all {
        let is_dog = pet.get_str("kind").unwrap() == "dog";
        assert_eq!(pet.get_bool("vaccinated").ok(), is_dog.then_some(true));
        assert_ne!(pet.get_str("_id").unwrap(), "ignored");
    }
}

#[tokio::test]
async fn upsert_creates_from_equality_constraints() {
    let pets_interface = interface("pets");

    let query = Query::filter(doc! { "name": "Zed", "age": { "$gt": 2 } });
    let outcome = pets_interface
        .update(&query, doc! { "kind": "owl" }, true)
        .await
        .unwrap();

    assert_eq!(outcome.matched, 0);
    let id = outcome.upserted_id.unwrap();

    let created = pets_interface.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(created.get_str("name").unwrap(), "Zed");
    assert_eq!(created.get_str("kind").unwrap(), "owl");
    assert!(created.get("age").is_none());
    assert_eq!(pets_interface.count(&Query::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn update_without_upsert_touches_nothing() {
    let pets_interface = interface("pets");

    let outcome = pets_interface
        .update(&Query::filter(doc! { "name": "Zed" }), doc! { "kind": "owl" }, false)
        .await
        .unwrap();

    assert_eq!(outcome, UpdateOutcome::default());
    assert_eq!(pets_interface.count(&Query::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn patch_applies_json_patch_to_matches() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;

    let patches = parse_patches(&Bson::Array(vec![
        Bson::Document(doc! { "op": "replace", "path": "/age", "value": 10 }),
        Bson::Document(doc! { "op": "add", "path": "/tags/-", "value": "old" }),
    ]))
    .unwrap();

    let patched = pets_interface
        .patch(&Query::filter(doc! { "name": "Tom" }), &patches)
        .await
        .unwrap();
    assert_eq!(patched, 1);

    let tom = pets_interface
        .find_one(&Query::filter(doc! { "name": "Tom" }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tom.get_i32("age").unwrap(), 10);
    assert_eq!(
        tom.get_array("tags").unwrap(),
        &vec![Bson::from("lazy"), Bson::from("loud"), Bson::from("old")]
    );
}

#[tokio::test]
async fn patching_the_id_fails() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;

    let patches = parse_patches(&Bson::Array(vec![Bson::Document(
        doc! { "op": "replace", "path": "/_id", "value": "x" },
    )]))
    .unwrap();

    let err = pets_interface
        .patch(&Query::default(), &patches)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "Patch");
    assert_eq!(err.http_code(), 422);
}

#[tokio::test]
async fn patch_failure_keeps_earlier_documents_and_stops() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;
    pets_interface
        .create(doc! { "name": "Max", "kind": "cat", "age": 2 })
        .await
        .unwrap();

    let patches = parse_patches(&Bson::Array(vec![
        Bson::Document(doc! { "op": "test", "path": "/name", "value": "Tom" }),
        Bson::Document(doc! { "op": "replace", "path": "/age", "value": 99 }),
    ]))
    .unwrap();

    let err = pets_interface
        .patch(&Query::filter(doc! { "kind": "cat" }), &patches)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Patch");

    let cats = pets_interface
        .find(&Query::filter(doc! { "kind": "cat" }))
        .await
        .unwrap();
    let ages: Vec<(String, i32)> = cats
        .iter()
        .map(|cat| (cat.get_str("name").unwrap().to_string(), cat.get_i32("age").unwrap()))
        .collect();
    assert_eq!(
        ages,
        vec![("Tom".to_string(), 99), ("Kit".to_string(), 5), ("Max".to_string(), 2)]
    );
}

#[tokio::test]
async fn delete_reports_removed_documents() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;

    let deleted = pets_interface
        .delete(&Query::filter(doc! { "kind": "cat" }))
        .await
        .unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(
        names(&pets_interface.find(&Query::default()).await.unwrap()),
        vec!["Rex", "Ada"]
    );
}

#[tokio::test]
async fn populate_expands_configured_references() {
    let store = InMemoryStore::new();
    let users = SimpleInterface::new(DataInterface::new(store.clone(), "users"));
    let pets_interface = SimpleInterface::new(
        DataInterface::builder(store, "pets")
            .reference("owner", "users")
            .reference("vets", "users")
            .build(),
    );

    users.create(doc! { "_id": "ann", "name": "Ann" }).await.unwrap();
    users.create(doc! { "_id": "bob", "name": "Bob" }).await.unwrap();
    pets_interface
        .create(doc! {
            "name": "Rex",
            "owner": "ann",
            "vets": ["bob", "gone"],
            "friend": "bob",
        })
        .await
        .unwrap();

    let query = Query::try_from(doc! { "populate": "owner vets friend" }).unwrap();
    let rex = pets_interface.find_one(&query).await.unwrap().unwrap();

    let owner = rex.get_document("owner").unwrap();
    assert_eq!(owner.get_str("name").unwrap(), "Ann");
    assert_eq!(owner.get_str("id").unwrap(), "ann");
    let vets = rex.get_array("vets").unwrap();
    assert_eq!(vets.len(), 1);
    let vet = vets[0].as_document().unwrap();
    assert_eq!(vet.get_str("name").unwrap(), "Bob");
    assert_eq!(vet.get_str("id").unwrap(), "bob");
    assert_eq!(rex.get_str("friend").unwrap(), "bob");
}

#[tokio::test]
async fn execute_reports_failures_in_the_response() {
    let pets_interface = interface("pets");

    let response = pets_interface
        .execute(OperationRequest::new(
            OperationName::Find,
            doc! { "query": { "query": { "$where": "1" } } },
        ))
        .await;

    assert_eq!(response.method, Some(OperationName::Find));
    let err = response.body.error().unwrap();
    assert_eq!(err.kind(), "InvalidQuery");

    let wire = response.body.to_document().unwrap();
    assert_eq!(wire.get_document("error").unwrap().get_str("kind").unwrap(), "InvalidQuery");
}

#[tokio::test]
async fn execute_answers_each_operation() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;

    let created = pets_interface
        .execute(OperationRequest::create(doc! { "name": "Zed" }))
        .await;
    let ResponseBody::Id(id) = created.body else {
        panic!("expected an id, got {:?}", created.body);
    };

    let found = pets_interface.execute(OperationRequest::find_by_id(id.clone())).await;
    assert!(matches!(found.body, ResponseBody::Result(Some(_))));

    let counted = pets_interface
        .execute(OperationRequest::count(&Query::filter(doc! { "kind": "dog" })))
        .await;
    assert_eq!(counted.body, ResponseBody::Count(2));

    let updated = pets_interface
        .execute(OperationRequest::update(
            &Query::filter(doc! { "_id": id.clone() }),
            doc! { "age": 9 },
            false,
        ))
        .await;
    assert_eq!(updated.body, ResponseBody::Empty);

    let deleted = pets_interface
        .execute(OperationRequest::delete(&Query::filter(doc! { "_id": id.clone() })))
        .await;
    assert_eq!(deleted.body, ResponseBody::Empty);

    let missing = pets_interface.execute(OperationRequest::find_by_id(id)).await;
    assert_eq!(missing.body, ResponseBody::Result(None));
}

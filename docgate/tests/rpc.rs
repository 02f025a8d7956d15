mod support;

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use bson::{Bson, doc};
use docgate::{
    prelude::*,
    rest::{RestAdapter, codec::bson_to_json},
    rpc::{MethodTable, RpcAdapter},
};
use http::{Method, Request};
use serde_json::Value;

use support::{interface, pets, seed};

#[tokio::test]
async fn rpc_find_matches_rest_find() {
    let pets_interface = interface("pets");
    seed(&pets_interface, pets()).await;

    let rpc = RpcAdapter::new(Arc::new(pets_interface.clone()), "v1.");
    let mut table = MethodTable::new();
    rpc.register(&mut table);

    let query = doc! { "query": { "kind": "dog" }, "sort": { "age": -1 } };
    let via_rpc = table
        .call(&rpc.method_name(OperationName::Find), vec![Bson::Document(query)])
        .await
        .unwrap();

    let rest = RestAdapter::new(pets_interface);
    let request = Request::builder()
        .method(Method::GET)
        .uri("/?query%5Bkind%5D=dog&sort%5Bage%5D=-1")
        .body(Body::empty())
        .unwrap();
    let response = rest.execute(request).await;
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let via_rest: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(bson_to_json(&via_rpc), via_rest["results"]);
    assert_eq!(via_rest["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn method_names_follow_the_prefix() {
    let rpc = RpcAdapter::with_model_name(Arc::new(interface("pets")), "api.", "Pet");
    let mut table = MethodTable::new();
    rpc.register(&mut table);

    assert_eq!(rpc.prefix(), "api.Pet:");
    assert_eq!(
        table.method_names(),
        vec![
            "api.Pet:count",
            "api.Pet:create",
            "api.Pet:delete",
            "api.Pet:find",
            "api.Pet:findById",
            "api.Pet:findOne",
            "api.Pet:patch",
            "api.Pet:update",
        ]
    );
}

#[tokio::test]
async fn errors_come_back_wrapped() {
    let rpc = RpcAdapter::new(Arc::new(interface("pets")), "");
    let mut table = MethodTable::new();
    rpc.register(&mut table);

    table
        .call("pets:create", vec![Bson::Document(doc! { "_id": "rex" })])
        .await
        .unwrap();
    let err = table
        .call("pets:create", vec![Bson::Document(doc! { "_id": "rex" })])
        .await
        .unwrap_err();

    assert_eq!(err, wrap_error(err.clone()));
    assert_eq!(err.http_code(), 409);

    let patched = table
        .call(
            "pets:patch",
            vec![
                Bson::Document(doc! { "query": { "_id": "rex" } }),
                Bson::Array(vec![Bson::Document(doc! { "op": "add", "path": "/age", "value": 2 })]),
            ],
        )
        .await
        .unwrap();
    assert_eq!(patched, Bson::Int64(1));

    let rex = table
        .call("pets:findOne", vec![Bson::Document(doc! { "query": { "_id": "rex" } })])
        .await
        .unwrap();
    assert_eq!(rex.as_document().unwrap().get_i32("age").unwrap(), 2);
}

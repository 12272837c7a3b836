//! Dataset definition validation through the api surface.

mod substitutes;

use serde_json::json;

use api::{commands::ApiResponse, persistence::Repository, Api, ApiError};
use common::dataset::input::DatasetInput;
use expunge_connectors::{AccessLevel, ConnectionConfig, ConnectionType};

use substitutes::*;

const CONNECTION_KEY: &str = "my_postgres_db_1";

fn unwrap_validated(response: ApiResponse) -> (common::dataset::Dataset, common::graph::traversal::TraversalDetails) {
    match response {
        ApiResponse::DatasetValidated { dataset, traversal_details } => {
            (*dataset, traversal_details)
        }
        other => panic!("expected a validation response, got {other:?}"),
    }
}

#[tokio::test]
async fn a_complete_dataset_is_traversable() {
    let harness = harness(CONNECTION_KEY, AccessLevel::Write).await;
    let (dispatch, _api) = Api::create_dispatch(harness.context.clone());

    let response = dispatch
        .validate_dataset(CONNECTION_KEY, example_dataset_input())
        .await
        .unwrap();
    let (dataset, details) = unwrap_validated(response);

    assert_eq!(dataset.fides_key, "postgres_example_test_dataset");
    assert!(details.is_traversable);
    assert!(details.msg.is_none());
}

#[tokio::test]
async fn stripping_references_reports_the_unreachable_collections() {
    let harness = harness(CONNECTION_KEY, AccessLevel::Write).await;
    let (dispatch, _api) = Api::create_dispatch(harness.context.clone());

    let mut input = example_dataset_input();
    for collection in &mut input.collections {
        for field in &mut collection.fields {
            if let Some(meta) = &mut field.fidesops_meta {
                meta.references = None;
            }
        }
    }

    let response = dispatch.validate_dataset(CONNECTION_KEY, input).await.unwrap();
    let (_, details) = unwrap_validated(response);

    assert!(!details.is_traversable);
    let msg = details.msg.unwrap();
    assert!(msg.contains("Some nodes were not reachable"));
    assert!(msg.contains("postgres_example_test_dataset:address"));
}

#[tokio::test]
async fn references_into_an_absent_dataset_name_the_missing_triple() {
    let harness = harness(CONNECTION_KEY, AccessLevel::Write).await;
    // A store that only knows the mongo connection; the postgres dataset the
    // reference points at is absent
    let store = harness.store.clone();
    store
        .upsert_connection(ConnectionConfig::new(
            "my_mongo_db_1",
            ConnectionType::Mongodb,
            AccessLevel::Write,
        ))
        .await
        .unwrap();

    let mongo_input: DatasetInput = serde_json::from_value(json!({
        "fides_key": "mongo_test",
        "collections": [
            {
                "name": "customer_details",
                "fields": [
                    {
                        "name": "customer_id",
                        "data_categories": ["user.derived.identifiable.unique_id"],
                        "fidesops_meta": {
                            "data_type": "integer",
                            "references": [
                                {
                                    "dataset": "postgres_example_no_such_dataset",
                                    "field": "customer.id",
                                    "direction": "from"
                                }
                            ]
                        }
                    },
                    {"name": "gender", "data_categories": ["user.provided.identifiable.gender"]}
                ]
            }
        ]
    }))
    .unwrap();

    let (dispatch, _api) = Api::create_dispatch(harness.context.clone());
    let response = dispatch.validate_dataset("my_mongo_db_1", mongo_input).await.unwrap();
    let (_, details) = unwrap_validated(response);

    assert!(!details.is_traversable);
    assert_eq!(
        details.msg.as_deref(),
        Some("Referred to object postgres_example_no_such_dataset:customer:id does not exist")
    );
}

#[tokio::test]
async fn validation_requires_a_known_connection() {
    let harness = harness(CONNECTION_KEY, AccessLevel::Write).await;
    let (dispatch, _api) = Api::create_dispatch(harness.context.clone());

    let err = dispatch
        .validate_dataset("nonexistent_key", example_dataset_input())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Store(_)));
}

#[tokio::test]
async fn illegal_annotations_surface_their_messages() {
    let harness = harness(CONNECTION_KEY, AccessLevel::Write).await;
    let (dispatch, _api) = Api::create_dispatch(harness.context.clone());

    let mut input = example_dataset_input();
    input.collections[0].fields[0].fidesops_meta =
        Some(common::dataset::input::FieldMetaInput { length: Some(-1), ..Default::default() });
    let err = dispatch.validate_dataset(CONNECTION_KEY, input).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Dataset: Illegal length (-1). Only positive non-zero values are allowed."
    );
}

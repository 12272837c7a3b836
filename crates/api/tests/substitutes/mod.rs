//! In-memory substitutes for the external collaborators of the request
//! runner: a structural SQL backend, a scripted webhook endpoint, and a
//! recording uploader.
#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use serde_json::{json, Value};

use api::{
    persistence::{InMemoryStore, Repository},
    runner::{cache_identity, RunnerContext},
    upload::AccessResultUploader,
    webhook::{
        PolicyWebhook, WebhookClient, WebhookDirection, WebhookError, WebhookKind,
        WebhookResponse,
    },
    ApiError,
};
use common::{
    cache::InMemoryCache,
    dataset::input::DatasetInput,
    graph::traversal::Row,
    policy::{ActionType, MaskingStrategyConfig, Policy, Rule},
    request::{PrivacyRequest, RequestIdentity},
};
use expunge_connectors::{
    query::sql::{SqlParam, SqlStatement},
    sql::SqlClient,
    AccessLevel, ConnectionConfig, ConnectionType, ConnectorError, SqlConnector,
};

/// Tables held in memory, addressed structurally from the statements the
/// SQL dialects generate
pub struct InMemorySqlDatabase {
    tables: Mutex<BTreeMap<String, Vec<Row>>>,
}

impl InMemorySqlDatabase {
    pub fn new(tables: BTreeMap<String, Vec<Row>>) -> Arc<Self> {
        Arc::new(InMemorySqlDatabase { tables: Mutex::new(tables) })
    }

    pub fn table(&self, name: &str) -> Vec<Row> {
        self.tables.lock().unwrap().get(name).cloned().unwrap_or_default()
    }

    fn select_table(text: &str) -> String {
        let after_from = text.split(" FROM ").nth(1).expect("SELECT has a FROM clause");
        after_from
            .split(" WHERE ")
            .next()
            .expect("SELECT has a WHERE clause")
            .trim_matches('"')
            .to_owned()
    }

    fn update_table(text: &str) -> String {
        let after_update = text.split("UPDATE ").nth(1).expect("UPDATE names a table");
        after_update.split(" SET ").next().expect("UPDATE has a SET clause").trim_matches('"').to_owned()
    }

    fn set_columns(text: &str) -> Vec<String> {
        let set_clause = text
            .split(" SET ")
            .nth(1)
            .and_then(|rest| rest.split(" WHERE ").next())
            .expect("UPDATE has SET and WHERE clauses");
        set_clause
            .split(',')
            .filter_map(|assignment| assignment.split(" = ").next())
            .map(|column| column.trim().trim_matches('"').to_owned())
            .collect()
    }

    fn row_matches_any(row: &Row, params: &BTreeMap<String, SqlParam>) -> bool {
        params.iter().any(|(key, param)| match param {
            SqlParam::Single(value) => row.get(key) == Some(value),
            SqlParam::Tuple(values) => {
                row.get(key).map(|v| values.contains(v)).unwrap_or(false)
            }
        })
    }
}

#[async_trait::async_trait]
impl SqlClient for InMemorySqlDatabase {
    async fn ping(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn select(&self, statement: &SqlStatement) -> Result<Vec<Row>, ConnectorError> {
        let table = Self::select_table(&statement.text);
        Ok(self
            .table(&table)
            .into_iter()
            .filter(|row| Self::row_matches_any(row, &statement.params))
            .collect())
    }

    async fn execute(&self, statement: &SqlStatement) -> Result<usize, ConnectorError> {
        let table = Self::update_table(&statement.text);
        let set_columns = Self::set_columns(&statement.text);
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table).or_default();

        let mut updated = 0;
        for row in rows.iter_mut() {
            let matches = statement
                .params
                .iter()
                .filter(|(key, _)| !set_columns.contains(key))
                .all(|(key, param)| match param {
                    SqlParam::Single(value) => row.get(key) == Some(value),
                    SqlParam::Tuple(values) => {
                        row.get(key).map(|v| values.contains(v)).unwrap_or(false)
                    }
                });
            if !matches {
                continue;
            }
            for column in &set_columns {
                if let Some(SqlParam::Single(value)) = statement.params.get(column) {
                    row.insert(column.clone(), value.clone());
                }
            }
            updated += 1;
        }
        Ok(updated)
    }
}

/// What a scripted webhook endpoint should do when triggered
#[derive(Clone)]
pub enum WebhookScript {
    Proceed,
    ProceedWith(WebhookResponse),
    Halt,
    ClientError,
    ValidationError,
}

#[derive(Default)]
pub struct ScriptedWebhookClient {
    scripts: Mutex<BTreeMap<String, WebhookScript>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedWebhookClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, webhook_key: &str, script: WebhookScript) {
        self.scripts.lock().unwrap().insert(webhook_key.to_owned(), script);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl WebhookClient for ScriptedWebhookClient {
    async fn trigger(
        &self,
        webhook: &PolicyWebhook,
        _request: &PrivacyRequest,
        _identity: &RequestIdentity,
    ) -> Result<WebhookResponse, WebhookError> {
        self.calls.lock().unwrap().push(webhook.key.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&webhook.key)
            .cloned()
            .unwrap_or(WebhookScript::Proceed);
        match script {
            WebhookScript::Proceed => Ok(WebhookResponse::default()),
            WebhookScript::ProceedWith(response) => Ok(response),
            WebhookScript::Halt => {
                Ok(WebhookResponse { derived_identity: None, halt: true })
            }
            WebhookScript::ClientError => Err(WebhookError::ClientUnsuccessful { status: 500 }),
            WebhookScript::ValidationError => {
                Err(WebhookError::Validation("unknown field `escalate`".to_owned()))
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingUploader {
    pub uploads: Mutex<Vec<BTreeMap<String, Vec<Row>>>>,
}

impl RecordingUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl AccessResultUploader for RecordingUploader {
    async fn upload(
        &self,
        _request: &PrivacyRequest,
        results: BTreeMap<String, Vec<Row>>,
    ) -> Result<(), ApiError> {
        self.uploads.lock().unwrap().push(results);
        Ok(())
    }
}

/// The eleven-collection example dataset used throughout the integration
/// tests, annotated the way a deployment would annotate a postgres schema
pub fn example_dataset_input() -> DatasetInput {
    serde_json::from_value(json!({
        "fides_key": "postgres_example_test_dataset",
        "name": "Postgres Example Test Dataset",
        "description": "Example of a postgres dataset with an eleven-table schema",
        "collections": [
            {
                "name": "address",
                "fields": [
                    {"name": "id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "primary_key": true}},
                    {"name": "house", "data_categories": ["user.provided.identifiable.contact.street"], "fidesops_meta": {"data_type": "string"}},
                    {"name": "street", "data_categories": ["user.provided.identifiable.contact.street"], "fidesops_meta": {"data_type": "string"}},
                    {"name": "city", "data_categories": ["user.provided.identifiable.contact.city"], "fidesops_meta": {"data_type": "string"}},
                    {"name": "state", "data_categories": ["user.provided.identifiable.contact.state"], "fidesops_meta": {"data_type": "string"}},
                    {"name": "zip", "data_categories": ["user.provided.identifiable.contact.postal_code"], "fidesops_meta": {"data_type": "string"}}
                ]
            },
            {
                "name": "customer",
                "fields": [
                    {"name": "id", "data_categories": ["user.derived.identifiable.unique_id"], "fidesops_meta": {"data_type": "integer", "primary_key": true}},
                    {"name": "created", "data_categories": ["system.operations"]},
                    {"name": "email", "data_categories": ["user.provided.identifiable.contact.email"], "fidesops_meta": {"identity": "email", "data_type": "string"}},
                    {"name": "name", "data_categories": ["user.provided.identifiable.name"], "fidesops_meta": {"data_type": "string", "length": 40}},
                    {"name": "address_id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "address.id", "direction": "to"}]}}
                ]
            },
            {
                "name": "employee",
                "fields": [
                    {"name": "id", "data_categories": ["user.derived.identifiable.unique_id"], "fidesops_meta": {"data_type": "integer", "primary_key": true}},
                    {"name": "email", "data_categories": ["user.provided.identifiable.contact.email"], "fidesops_meta": {"identity": "email", "data_type": "string"}},
                    {"name": "name", "data_categories": ["user.provided.identifiable.name"], "fidesops_meta": {"data_type": "string"}},
                    {"name": "address_id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "address.id", "direction": "to"}]}}
                ]
            },
            {
                "name": "login",
                "fields": [
                    {"name": "id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "primary_key": true}},
                    {"name": "customer_id", "data_categories": ["user.derived.identifiable.unique_id"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "customer.id", "direction": "from"}]}},
                    {"name": "time", "data_categories": ["user.derived.nonidentifiable.sensor"]}
                ]
            },
            {
                "name": "orders",
                "fields": [
                    {"name": "id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "primary_key": true}},
                    {"name": "customer_id", "data_categories": ["user.derived.identifiable.unique_id"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "customer.id", "direction": "from"}]}},
                    {"name": "shipping_address_id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "address.id", "direction": "to"}]}},
                    {"name": "payment_card_id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "payment_card.id", "direction": "to"}]}}
                ]
            },
            {
                "name": "order_item",
                "fields": [
                    {"name": "order_id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "orders.id", "direction": "from"}]}},
                    {"name": "item_no", "data_categories": ["system.operations"]},
                    {"name": "product_id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "product.id", "direction": "to"}]}},
                    {"name": "quantity", "data_categories": ["system.operations"]}
                ]
            },
            {
                "name": "payment_card",
                "fields": [
                    {"name": "id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "primary_key": true}},
                    {"name": "name", "data_categories": ["user.provided.identifiable.financial"], "fidesops_meta": {"data_type": "string"}},
                    {"name": "ccn", "data_categories": ["user.provided.identifiable.financial.account_number"], "fidesops_meta": {"data_type": "string"}},
                    {"name": "code", "data_categories": ["user.provided.identifiable.financial"], "fidesops_meta": {"data_type": "integer"}},
                    {"name": "preferred", "data_categories": ["user.provided.nonidentifiable"], "fidesops_meta": {"data_type": "boolean"}},
                    {"name": "customer_id", "data_categories": ["user.derived.identifiable.unique_id"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "customer.id", "direction": "from"}]}},
                    {"name": "billing_address_id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "address.id", "direction": "to"}]}}
                ]
            },
            {
                "name": "product",
                "fields": [
                    {"name": "id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "primary_key": true}},
                    {"name": "name", "data_categories": ["system.operations"]},
                    {"name": "price", "data_categories": ["system.operations"]}
                ]
            },
            {
                "name": "report",
                "fields": [
                    {"name": "id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "primary_key": true}},
                    {"name": "email", "data_categories": ["user.provided.identifiable.contact.email"], "fidesops_meta": {"identity": "email", "data_type": "string"}},
                    {"name": "name", "data_categories": ["system.operations"]},
                    {"name": "month", "data_categories": ["system.operations"]},
                    {"name": "year", "data_categories": ["system.operations"]},
                    {"name": "total_visits", "data_categories": ["system.operations"]}
                ]
            },
            {
                "name": "service_request",
                "fields": [
                    {"name": "id", "data_categories": ["system.operations"], "fidesops_meta": {"data_type": "integer", "primary_key": true}},
                    {"name": "email", "data_categories": ["user.provided.identifiable.contact.email"], "fidesops_meta": {"identity": "email", "data_type": "string"}},
                    {"name": "alt_email", "data_categories": ["user.provided.identifiable.contact.email"], "fidesops_meta": {"data_type": "string"}},
                    {"name": "opened", "data_categories": ["system.operations"]},
                    {"name": "closed", "data_categories": ["system.operations"]},
                    {"name": "employee_id", "data_categories": ["user.derived.identifiable.unique_id"], "fidesops_meta": {"data_type": "integer", "references": [{"dataset": "postgres_example_test_dataset", "field": "employee.id", "direction": "to"}]}}
                ]
            },
            {
                "name": "visit",
                "fields": [
                    {"name": "email", "data_categories": ["user.provided.identifiable.contact.email"], "fidesops_meta": {"identity": "email", "data_type": "string"}},
                    {"name": "last_visit", "data_categories": ["system.operations"]}
                ]
            }
        ]
    }))
    .expect("example dataset parses")
}

fn row(entries: Vec<(&str, Value)>) -> Row {
    entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
}

/// Seed data covering three customers; every collection has at least one
/// record reachable from customer-1@example.com
pub fn example_tables() -> BTreeMap<String, Vec<Row>> {
    BTreeMap::from([
        (
            "customer".to_owned(),
            vec![
                row(vec![
                    ("id", json!(1)),
                    ("created", json!("2020-04-01T11:47:42")),
                    ("email", json!("customer-1@example.com")),
                    ("name", json!("John Customer")),
                    ("address_id", json!(1)),
                ]),
                row(vec![
                    ("id", json!(2)),
                    ("created", json!("2020-04-01T11:47:42")),
                    ("email", json!("customer-2@example.com")),
                    ("name", json!("Jill Customer")),
                    ("address_id", json!(2)),
                ]),
                row(vec![
                    ("id", json!(3)),
                    ("created", json!("2020-04-01T11:47:42")),
                    ("email", json!("jane@example.com")),
                    ("name", json!("Jane Customer")),
                    ("address_id", json!(1)),
                ]),
            ],
        ),
        (
            "address".to_owned(),
            vec![
                row(vec![
                    ("id", json!(1)),
                    ("house", json!("123")),
                    ("street", json!("Example Street")),
                    ("city", json!("Exampletown")),
                    ("state", json!("NY")),
                    ("zip", json!("12345")),
                ]),
                row(vec![
                    ("id", json!(2)),
                    ("house", json!("4")),
                    ("street", json!("Example Lane")),
                    ("city", json!("Exampletown")),
                    ("state", json!("NY")),
                    ("zip", json!("12321")),
                ]),
            ],
        ),
        (
            "employee".to_owned(),
            vec![row(vec![
                ("id", json!(1)),
                ("email", json!("employee-1@example.com")),
                ("name", json!("Jack Employee")),
                ("address_id", json!(2)),
            ])],
        ),
        (
            "login".to_owned(),
            vec![
                row(vec![
                    ("id", json!(1)),
                    ("customer_id", json!(1)),
                    ("time", json!("2021-01-01T11:47:42")),
                ]),
                row(vec![
                    ("id", json!(2)),
                    ("customer_id", json!(1)),
                    ("time", json!("2021-01-02T11:47:42")),
                ]),
                row(vec![
                    ("id", json!(3)),
                    ("customer_id", json!(2)),
                    ("time", json!("2021-01-03T11:47:42")),
                ]),
            ],
        ),
        (
            "orders".to_owned(),
            vec![row(vec![
                ("id", json!(1)),
                ("customer_id", json!(1)),
                ("shipping_address_id", json!(2)),
                ("payment_card_id", json!(1)),
            ])],
        ),
        (
            "order_item".to_owned(),
            vec![row(vec![
                ("order_id", json!(1)),
                ("item_no", json!(1)),
                ("product_id", json!(1)),
                ("quantity", json!(1)),
            ])],
        ),
        (
            "payment_card".to_owned(),
            vec![row(vec![
                ("id", json!(1)),
                ("name", json!("Example Card 1")),
                ("ccn", json!("123456789")),
                ("code", json!(321)),
                ("preferred", json!(true)),
                ("customer_id", json!(1)),
                ("billing_address_id", json!(1)),
            ])],
        ),
        (
            "product".to_owned(),
            vec![row(vec![
                ("id", json!(1)),
                ("name", json!("Example Product 1")),
                ("price", json!("10.00")),
            ])],
        ),
        (
            "report".to_owned(),
            vec![row(vec![
                ("id", json!(1)),
                ("email", json!("customer-1@example.com")),
                ("name", json!("Monthly Report")),
                ("month", json!(8)),
                ("year", json!(2021)),
                ("total_visits", json!(100)),
            ])],
        ),
        (
            "service_request".to_owned(),
            vec![row(vec![
                ("id", json!(1)),
                ("email", json!("customer-1@example.com")),
                ("alt_email", json!("customer-1-alt@example.com")),
                ("opened", json!("2021-01-01")),
                ("closed", Value::Null),
                ("employee_id", json!(1)),
            ])],
        ),
        (
            "visit".to_owned(),
            vec![
                row(vec![
                    ("email", json!("customer-1@example.com")),
                    ("last_visit", json!("2021-04-01T11:47:42")),
                ]),
                row(vec![
                    ("email", json!("customer-2@example.com")),
                    ("last_visit", json!("2021-04-02T11:47:42")),
                ]),
            ],
        ),
    ])
}

pub fn access_policy() -> Policy {
    Policy {
        key: "example_access_request_policy".to_owned(),
        rules: vec![Rule {
            key: "access_request_rule".to_owned(),
            action_type: ActionType::Access,
            target_data_categories: vec!["user".to_owned()],
            masking_strategy: None,
        }],
    }
}

pub fn erasure_policy(target: &str) -> Policy {
    Policy {
        key: "example_erasure_policy".to_owned(),
        rules: vec![Rule {
            key: "erasure_rule".to_owned(),
            action_type: ActionType::Erasure,
            target_data_categories: vec![target.to_owned()],
            masking_strategy: Some(MaskingStrategyConfig {
                strategy: "null_rewrite".to_owned(),
                configuration: json!({}),
            }),
        }],
    }
}

pub fn pre_execution_webhooks() -> Vec<PolicyWebhook> {
    vec![
        PolicyWebhook {
            key: "pre_execution_one_way_webhook".to_owned(),
            name: "pre_execution_one_way_webhook".to_owned(),
            connection_key: "callback_connection".to_owned(),
            direction: WebhookDirection::OneWay,
            order: 0,
        },
        PolicyWebhook {
            key: "pre_execution_two_way_webhook".to_owned(),
            name: "pre_execution_two_way_webhook".to_owned(),
            connection_key: "callback_connection".to_owned(),
            direction: WebhookDirection::TwoWay,
            order: 1,
        },
    ]
}

pub struct TestHarness {
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<InMemoryCache>,
    pub database: Arc<InMemorySqlDatabase>,
    pub webhooks: Arc<ScriptedWebhookClient>,
    pub uploader: Arc<RecordingUploader>,
    pub context: RunnerContext,
}

/// Wire the example dataset, seed data and substitutes into a runner
/// context backed entirely by memory
pub async fn harness(connection_key: &str, access: AccessLevel) -> TestHarness {
    expunge_telemetry::telemetry(expunge_telemetry::ConsoleLogging::Off);

    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let database = InMemorySqlDatabase::new(example_tables());
    let webhooks = ScriptedWebhookClient::new();
    let uploader = RecordingUploader::new();

    let connection = ConnectionConfig::new(connection_key, ConnectionType::Postgres, access);
    store.upsert_connection(connection.clone()).await.unwrap();
    store
        .upsert_dataset(example_dataset_input().into_dataset(connection_key).unwrap())
        .await
        .unwrap();
    store.upsert_policy(access_policy()).await.unwrap();
    store
        .upsert_policy(erasure_policy("user.provided.identifiable.name"))
        .await
        .unwrap();

    let connector = Arc::new(SqlConnector::new(
        connection,
        database.clone(),
        cache.clone(),
    ));
    let context = RunnerContext {
        store: store.clone(),
        cache: cache.clone(),
        connectors: BTreeMap::from([(
            connection_key.to_owned(),
            connector as Arc<dyn expunge_connectors::Connector>,
        )]),
        webhook_client: webhooks.clone(),
        uploader: uploader.clone(),
    };

    TestHarness { store, cache, database, webhooks, uploader, context }
}

/// Create a pending request with its identity cached, the way the request
/// endpoint would before submitting it to the runner
pub async fn create_request(harness: &TestHarness, policy_key: &str, email: &str) -> PrivacyRequest {
    let request = PrivacyRequest::new(policy_key, Utc::now());
    harness.store.save_privacy_request(&request).await.unwrap();
    cache_identity(
        harness.cache.as_ref(),
        &request.id,
        &RequestIdentity { email: Some(email.to_owned()), phone_number: None },
    )
    .await
    .unwrap();
    request
}

pub async fn set_pre_execution_webhooks(harness: &TestHarness, policy_key: &str) {
    harness
        .store
        .set_webhooks(policy_key, WebhookKind::PreExecution, pre_execution_webhooks())
        .await
        .unwrap();
}

//! Repository interface over the relational store. The store itself is an
//! external collaborator; an in-memory implementation backs devmode and the
//! test suites.

use std::collections::BTreeMap;

use thiserror::Error;
use tokio::sync::RwLock;

use common::{
    dataset::Dataset,
    policy::Policy,
    request::{ExecutionLog, PrivacyRequest},
};
use expunge_connectors::ConnectionConfig;

use crate::webhook::{PolicyWebhook, WebhookKind};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Could not locate record in store")]
    RecordNotFound,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    async fn policy(&self, key: &str) -> Result<Option<Policy>, StoreError>;

    async fn upsert_policy(&self, policy: Policy) -> Result<(), StoreError>;

    async fn datasets(&self) -> Result<Vec<Dataset>, StoreError>;

    async fn upsert_dataset(&self, dataset: Dataset) -> Result<(), StoreError>;

    async fn connection(&self, key: &str) -> Result<Option<ConnectionConfig>, StoreError>;

    async fn upsert_connection(&self, config: ConnectionConfig) -> Result<(), StoreError>;

    /// Webhooks of one kind for a policy, in stored `order`
    async fn webhooks(
        &self,
        policy_key: &str,
        kind: WebhookKind,
    ) -> Result<Vec<PolicyWebhook>, StoreError>;

    async fn set_webhooks(
        &self,
        policy_key: &str,
        kind: WebhookKind,
        webhooks: Vec<PolicyWebhook>,
    ) -> Result<(), StoreError>;

    async fn privacy_request(&self, id: &str) -> Result<Option<PrivacyRequest>, StoreError>;

    async fn save_privacy_request(&self, request: &PrivacyRequest) -> Result<(), StoreError>;

    /// Execution logs are append-only; ordering is by insertion, which the
    /// runner performs in timestamp order
    async fn append_execution_log(
        &self,
        request_id: &str,
        log: ExecutionLog,
    ) -> Result<(), StoreError>;

    async fn execution_logs(&self, request_id: &str) -> Result<Vec<ExecutionLog>, StoreError>;
}

#[derive(Default)]
struct StoreInner {
    policies: BTreeMap<String, Policy>,
    datasets: BTreeMap<String, Dataset>,
    connections: BTreeMap<String, ConnectionConfig>,
    webhooks: BTreeMap<(String, WebhookKind), Vec<PolicyWebhook>>,
    requests: BTreeMap<String, PrivacyRequest>,
    execution_logs: BTreeMap<String, Vec<ExecutionLog>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Repository for InMemoryStore {
    async fn policy(&self, key: &str) -> Result<Option<Policy>, StoreError> {
        Ok(self.inner.read().await.policies.get(key).cloned())
    }

    async fn upsert_policy(&self, policy: Policy) -> Result<(), StoreError> {
        self.inner.write().await.policies.insert(policy.key.clone(), policy);
        Ok(())
    }

    async fn datasets(&self) -> Result<Vec<Dataset>, StoreError> {
        Ok(self.inner.read().await.datasets.values().cloned().collect())
    }

    async fn upsert_dataset(&self, dataset: Dataset) -> Result<(), StoreError> {
        self.inner.write().await.datasets.insert(dataset.fides_key.clone(), dataset);
        Ok(())
    }

    async fn connection(&self, key: &str) -> Result<Option<ConnectionConfig>, StoreError> {
        Ok(self.inner.read().await.connections.get(key).cloned())
    }

    async fn upsert_connection(&self, config: ConnectionConfig) -> Result<(), StoreError> {
        self.inner.write().await.connections.insert(config.key.clone(), config);
        Ok(())
    }

    async fn webhooks(
        &self,
        policy_key: &str,
        kind: WebhookKind,
    ) -> Result<Vec<PolicyWebhook>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .webhooks
            .get(&(policy_key.to_owned(), kind))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_webhooks(
        &self,
        policy_key: &str,
        kind: WebhookKind,
        webhooks: Vec<PolicyWebhook>,
    ) -> Result<(), StoreError> {
        self.inner.write().await.webhooks.insert((policy_key.to_owned(), kind), webhooks);
        Ok(())
    }

    async fn privacy_request(&self, id: &str) -> Result<Option<PrivacyRequest>, StoreError> {
        Ok(self.inner.read().await.requests.get(id).cloned())
    }

    async fn save_privacy_request(&self, request: &PrivacyRequest) -> Result<(), StoreError> {
        self.inner.write().await.requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn append_execution_log(
        &self,
        request_id: &str,
        log: ExecutionLog,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .execution_logs
            .entry(request_id.to_owned())
            .or_default()
            .push(log);
        Ok(())
    }

    async fn execution_logs(&self, request_id: &str) -> Result<Vec<ExecutionLog>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .execution_logs
            .get(request_id)
            .cloned()
            .unwrap_or_default())
    }
}

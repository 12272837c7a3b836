//! The privacy request state machine: webhooks, graph traversal, masking
//! and upload, driven as one cooperatively scheduled task per request.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument, warn};

use common::{
    cache::{Cache, CacheError},
    dataset::CollectionAddress,
    graph::{
        traversal::{Row, TraversalNode, TraversalPlan},
        DatasetGraph,
    },
    policy::{ActionType, Policy},
    request::{
        access_result_key, identity_cache_key, ExecutionLog, ExecutionLogStatus,
        PrivacyRequest, PrivacyRequestStatus, RequestIdentity,
    },
};
use expunge_connectors::{Connector, ConnectorError, NodeInput};
use expunge_masking::{
    build_masking_secrets, cache_masking_secrets, get_strategy, MaskingSecretMeta,
};

use crate::{
    persistence::{Repository, StoreError},
    upload::AccessResultUploader,
    webhook::{WebhookClient, WebhookDirection, WebhookKind},
    ApiError,
};

/// Everything a runner needs, threaded explicitly rather than held in
/// process-wide state. Connectors are indexed by connection key, built at
/// startup with `expunge_connectors::connector_for`.
#[derive(Clone)]
pub struct RunnerContext {
    pub store: Arc<dyn Repository>,
    pub cache: Arc<dyn Cache>,
    pub connectors: BTreeMap<String, Arc<dyn Connector>>,
    pub webhook_client: Arc<dyn WebhookClient>,
    pub uploader: Arc<dyn AccessResultUploader>,
}

/// Write the supplied identity values into the cache under the request's
/// namespace. Called when the request is created, before submission.
pub async fn cache_identity(
    cache: &dyn Cache,
    request_id: &str,
    identity: &RequestIdentity,
) -> Result<(), CacheError> {
    for kind in identity.kinds() {
        if let Some(value) = identity.value(&kind) {
            cache
                .set(&identity_cache_key(request_id, &kind), Value::String(value.to_owned()))
                .await?;
        }
    }
    Ok(())
}

pub async fn cached_identity(
    cache: &dyn Cache,
    request_id: &str,
) -> Result<RequestIdentity, CacheError> {
    let mut identity = RequestIdentity::default();
    if let Some(Value::String(email)) =
        cache.get(&identity_cache_key(request_id, "email")).await?
    {
        identity.email = Some(email);
    }
    if let Some(Value::String(phone_number)) =
        cache.get(&identity_cache_key(request_id, "phone_number")).await?
    {
        identity.phone_number = Some(phone_number);
    }
    Ok(identity)
}

pub struct PrivacyRequestRunner {
    context: RunnerContext,
    request: PrivacyRequest,
}

impl PrivacyRequestRunner {
    pub fn new(context: RunnerContext, request: PrivacyRequest) -> Self {
        PrivacyRequestRunner { context, request }
    }

    /// Drive a pending request to a terminal or paused state
    #[instrument(skip(self), fields(request = %self.request.id))]
    pub async fn submit(
        mut self,
        allow_partial_traversal: bool,
    ) -> Result<PrivacyRequest, ApiError> {
        self.request.start_processing(Utc::now());
        self.context.store.save_privacy_request(&self.request).await?;
        self.run(None, allow_partial_traversal).await
    }

    /// Re-enter a paused request after the webhook that halted it.
    /// Collections retrieved before the pause are not re-queried; their rows
    /// are still in the result store under the request's keys.
    #[instrument(skip(self), fields(request = %self.request.id))]
    pub async fn resume(mut self, after_webhook_key: &str) -> Result<PrivacyRequest, ApiError> {
        if self.request.status != PrivacyRequestStatus::Paused {
            return Err(ApiError::InvalidRequestStatus {
                id: self.request.id,
                status: format!("{:?}", self.request.status),
                operation: "resumed",
            });
        }
        self.request.start_processing(Utc::now());
        self.context.store.save_privacy_request(&self.request).await?;
        self.run(Some(after_webhook_key), false).await
    }

    async fn run(
        mut self,
        after_pre_webhook: Option<&str>,
        allow_partial_traversal: bool,
    ) -> Result<PrivacyRequest, ApiError> {
        let policy = self
            .context
            .store
            .policy(&self.request.policy_key)
            .await?
            .ok_or(StoreError::RecordNotFound)?;
        let mut identity =
            cached_identity(self.context.cache.as_ref(), &self.request.id).await?;

        if !self
            .run_webhooks(WebhookKind::PreExecution, after_pre_webhook, &mut identity)
            .await?
        {
            return Ok(self.request);
        }

        let datasets = self.context.store.datasets().await?;
        let graph = match DatasetGraph::new(&datasets, &identity.kinds()) {
            Ok(graph) => graph,
            Err(e) => {
                warn!(error = %e, "Dataset graph construction failed");
                self.finish(PrivacyRequestStatus::Error).await?;
                return Ok(self.request);
            }
        };
        let plan = TraversalPlan::new(&graph);
        if let Err(report) = plan.require_complete() {
            if !allow_partial_traversal {
                warn!(error = %report, "Refusing to run a partial traversal");
                self.finish(PrivacyRequestStatus::Error).await?;
                return Ok(self.request);
            }
            info!(error = %report, "Proceeding over the reachable subset");
        }

        let (results, mut any_failed) = self.run_access(&plan, &policy, &identity).await?;

        if policy.generates_erasures() {
            match self.masking_secret_metas(&policy) {
                Ok(metas) => {
                    cache_masking_secrets(
                        self.context.cache.as_ref(),
                        &self.request.id,
                        &build_masking_secrets(&metas),
                    )
                    .await?;
                    any_failed |= self.run_erasure(&plan, &policy, &results).await?;
                }
                Err(e) => {
                    warn!(error = %e, "Masking strategy setup failed");
                    self.finish(PrivacyRequestStatus::Error).await?;
                    return Ok(self.request);
                }
            }
        }

        if !self.run_webhooks(WebhookKind::PostExecution, None, &mut identity).await? {
            return Ok(self.request);
        }

        let assembled: BTreeMap<String, Vec<Row>> = results
            .iter()
            .map(|(address, rows)| {
                (
                    access_result_key(&self.request.id, &address.dataset, &address.collection),
                    rows.clone(),
                )
            })
            .collect();
        if let Err(e) = self.context.uploader.upload(&self.request, assembled).await {
            warn!(error = %e, "Access result upload failed");
            any_failed = true;
        }

        self.finish(if any_failed {
            PrivacyRequestStatus::Error
        } else {
            PrivacyRequestStatus::Complete
        })
        .await?;
        Ok(self.request)
    }

    /// Invoke webhooks of one kind in stored order, strictly after `after`
    /// when resuming. Returns whether the runner should proceed.
    async fn run_webhooks(
        &mut self,
        kind: WebhookKind,
        after: Option<&str>,
        identity: &mut RequestIdentity,
    ) -> Result<bool, ApiError> {
        let webhooks = self.context.store.webhooks(&self.request.policy_key, kind).await?;
        let skip = after
            .and_then(|key| webhooks.iter().position(|w| w.key == key))
            .map(|position| position + 1)
            .unwrap_or(0);

        for webhook in webhooks.iter().skip(skip) {
            match self.context.webhook_client.trigger(webhook, &self.request, identity).await {
                Ok(response) => {
                    if webhook.direction == WebhookDirection::TwoWay {
                        if let Some(derived) = &response.derived_identity {
                            identity.merge(derived);
                            cache_identity(
                                self.context.cache.as_ref(),
                                &self.request.id,
                                identity,
                            )
                            .await?;
                        }
                        if response.halt {
                            info!(webhook = %webhook.key, "Halt received; pausing request");
                            self.request.status = PrivacyRequestStatus::Paused;
                            self.context.store.save_privacy_request(&self.request).await?;
                            return Ok(false);
                        }
                    }
                }
                Err(e) if e.is_client_failure() => {
                    warn!(webhook = %webhook.key, error = %e, "Webhook client failure");
                    self.request.status = PrivacyRequestStatus::Error;
                    self.context.store.save_privacy_request(&self.request).await?;
                    return Ok(false);
                }
                Err(e) => {
                    warn!(webhook = %webhook.key, error = %e, "Webhook response invalid");
                    self.finish(PrivacyRequestStatus::Error).await?;
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Retrieve every reachable node in plan order, threading identity and
    /// upstream outputs forward and storing rows under the request's keys
    async fn run_access(
        &self,
        plan: &TraversalPlan,
        policy: &Policy,
        identity: &RequestIdentity,
    ) -> Result<(BTreeMap<CollectionAddress, Vec<Row>>, bool), ApiError> {
        let mut results: BTreeMap<CollectionAddress, Vec<Row>> = BTreeMap::new();
        let mut any_failed = false;

        for node in &plan.nodes {
            let result_key = access_result_key(
                &self.request.id,
                &node.address.dataset,
                &node.address.collection,
            );
            // Rows stored by a previous attempt satisfy this node
            if let Some(stored) = self.context.cache.get(&result_key).await? {
                if let Ok(rows) = serde_json::from_value::<Vec<Row>>(stored) {
                    results.insert(node.address.clone(), rows);
                    continue;
                }
            }

            let live_edges: Vec<_> = node
                .incoming_edges
                .iter()
                .filter(|e| {
                    e.from.collection_address.is_root()
                        || results.contains_key(&e.from.collection_address)
                })
                .collect();
            if live_edges.is_empty() {
                let upstream = node
                    .input_addresses()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                self.log(
                    node,
                    ActionType::Access,
                    ExecutionLogStatus::Error,
                    Some(format!(
                        "Skipped: no input values available because upstream collection(s) \
                         {upstream} did not complete"
                    )),
                )
                .await?;
                continue;
            }

            let mut input = NodeInput::new();
            for edge in live_edges {
                let values = if edge.from.collection_address.is_root() {
                    identity
                        .value(edge.from.field_path.last_level())
                        .map(|v| vec![Value::String(v.to_owned())])
                        .unwrap_or_default()
                } else {
                    collect_edge_values(
                        &results[&edge.from.collection_address],
                        &edge.from.field_path.string_path(),
                    )
                };
                input.entry(edge.to.field_path.string_path()).or_default().extend(values);
            }

            self.log(node, ActionType::Access, ExecutionLogStatus::InProcessing, None).await?;
            let connector = match self.context.connectors.get(&node.connection_key) {
                Some(connector) => connector.clone(),
                None => {
                    self.log(
                        node,
                        ActionType::Access,
                        ExecutionLogStatus::Error,
                        Some(
                            ApiError::MissingConnector(node.connection_key.clone()).to_string(),
                        ),
                    )
                    .await?;
                    any_failed = true;
                    continue;
                }
            };
            match connector.retrieve(node, &input, policy).await {
                Ok(rows) => {
                    self.context
                        .cache
                        .set(
                            &result_key,
                            serde_json::to_value(&rows).map_err(CacheError::from)?,
                        )
                        .await?;
                    self.log(node, ActionType::Access, ExecutionLogStatus::Complete, None)
                        .await?;
                    results.insert(node.address.clone(), rows);
                }
                Err(e) => {
                    warn!(address = %node.address, error = %e, "Retrieval failed");
                    self.log(
                        node,
                        ActionType::Access,
                        ExecutionLogStatus::Error,
                        Some(e.to_string()),
                    )
                    .await?;
                    any_failed = true;
                }
            }
        }

        Ok((results, any_failed))
    }

    /// Revisit nodes with retrieved rows and write masked values back.
    /// Connections without write access refuse and are logged; the run
    /// continues over the remaining nodes.
    async fn run_erasure(
        &self,
        plan: &TraversalPlan,
        policy: &Policy,
        results: &BTreeMap<CollectionAddress, Vec<Row>>,
    ) -> Result<bool, ApiError> {
        let mut any_failed = false;
        for node in &plan.nodes {
            let rows = match results.get(&node.address) {
                Some(rows) if !rows.is_empty() => rows,
                _ => continue,
            };
            let connector = match self.context.connectors.get(&node.connection_key) {
                Some(connector) => connector.clone(),
                None => {
                    self.log(
                        node,
                        ActionType::Erasure,
                        ExecutionLogStatus::Error,
                        Some(
                            ApiError::MissingConnector(node.connection_key.clone()).to_string(),
                        ),
                    )
                    .await?;
                    any_failed = true;
                    continue;
                }
            };
            self.log(node, ActionType::Erasure, ExecutionLogStatus::InProcessing, None)
                .await?;
            match connector.mask(node, rows, policy, &self.request).await {
                Ok(updated) => {
                    info!(address = %node.address, updated, "Masked rows");
                    self.log(node, ActionType::Erasure, ExecutionLogStatus::Complete, None)
                        .await?;
                }
                Err(e @ ConnectorError::WriteAccessDenied(_)) => {
                    self.log(
                        node,
                        ActionType::Erasure,
                        ExecutionLogStatus::Error,
                        Some(e.to_string()),
                    )
                    .await?;
                }
                Err(e) => {
                    warn!(address = %node.address, error = %e, "Masking failed");
                    self.log(
                        node,
                        ActionType::Erasure,
                        ExecutionLogStatus::Error,
                        Some(e.to_string()),
                    )
                    .await?;
                    any_failed = true;
                }
            }
        }
        Ok(any_failed)
    }

    /// All secret kinds required by the policy's strategies, deduplicated
    fn masking_secret_metas(&self, policy: &Policy) -> Result<Vec<MaskingSecretMeta>, ApiError> {
        let mut metas: Vec<MaskingSecretMeta> = vec![];
        for rule in policy.erasure_rules() {
            if let Some(config) = &rule.masking_strategy {
                let strategy = get_strategy(
                    &config.strategy,
                    &config.configuration,
                    self.context.cache.clone(),
                )?;
                for meta in strategy.secret_meta() {
                    if !metas.contains(&meta) {
                        metas.push(meta);
                    }
                }
            }
        }
        Ok(metas)
    }

    async fn log(
        &self,
        node: &TraversalNode,
        action_type: ActionType,
        status: ExecutionLogStatus,
        message: Option<String>,
    ) -> Result<(), ApiError> {
        self.context
            .store
            .append_execution_log(
                &self.request.id,
                ExecutionLog {
                    dataset_key: node.address.dataset.clone(),
                    collection_name: node.address.collection.clone(),
                    action_type,
                    status,
                    message,
                    updated_at: Utc::now(),
                },
            )
            .await?;
        Ok(())
    }

    async fn finish(&mut self, status: PrivacyRequestStatus) -> Result<(), ApiError> {
        self.request.status = status;
        self.request.finished_processing_at = Some(Utc::now());
        self.context.store.save_privacy_request(&self.request).await?;
        Ok(())
    }
}

/// Values observed at the source end of an edge across all retrieved rows.
/// Array values flatten into their elements; nulls do not propagate.
fn collect_edge_values(rows: &[Row], source_path: &str) -> Vec<Value> {
    rows.iter()
        .filter_map(|row| row.get(source_path))
        .flat_map(|value| match value {
            Value::Array(items) => items.clone(),
            Value::Null => vec![],
            other => vec![other.clone()],
        })
        .collect()
}

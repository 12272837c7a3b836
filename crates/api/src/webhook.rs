//! Policy webhooks: ordered external callouts before and after graph
//! execution. A two-way webhook's response can halt the request or derive
//! additional identity values.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use common::request::{PrivacyRequest, RequestIdentity};

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WebhookKind {
    PreExecution,
    PostExecution,
}

impl core::fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WebhookKind::PreExecution => write!(f, "pre-execution"),
            WebhookKind::PostExecution => write!(f, "post-execution"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookDirection {
    /// Fire and await only the transport ack
    OneWay,
    /// Await a structured response and act on it
    TwoWay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyWebhook {
    pub key: String,
    pub name: String,
    pub connection_key: String,
    pub direction: WebhookDirection,
    pub order: u32,
}

/// The structured response of a two-way webhook. Unknown fields are
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookResponse {
    #[serde(default)]
    pub derived_identity: Option<RequestIdentity>,
    #[serde(default)]
    pub halt: bool,
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Webhook client call failed with status {status}")]
    ClientUnsuccessful { status: u16 },

    #[error("Webhook transport failed: {0}")]
    Transport(String),

    #[error("Webhook response failed validation: {0}")]
    Validation(String),

    #[error(
        "Cannot set order to {requested}: there are only {count} {kind} webhooks defined on this Policy."
    )]
    InvalidOrder { requested: u32, count: usize, kind: WebhookKind },

    #[error("No webhook endpoint is configured for connection {0}")]
    MissingEndpoint(String),
}

impl WebhookError {
    /// Client failures cover transport errors, timeouts and non-2xx
    /// responses; schema violations are a distinct, also-terminal kind
    pub fn is_client_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::ClientUnsuccessful { .. }
                | WebhookError::Transport(_)
                | WebhookError::MissingEndpoint(_)
        )
    }
}

/// Reassign order values to be dense and zero-based, keeping the stored
/// ordering. Applied on every create or update of a policy's webhook list.
pub fn assign_dense_order(webhooks: &mut [PolicyWebhook]) {
    webhooks.sort_by_key(|w| w.order);
    for (index, webhook) in webhooks.iter_mut().enumerate() {
        webhook.order = index as u32;
    }
}

/// Move one webhook to a new order, shifting its neighbours. Returns the
/// `(key, order)` pairs of every webhook whose order changed.
pub fn reorder_webhook(
    webhooks: &mut Vec<PolicyWebhook>,
    key: &str,
    new_order: u32,
    kind: WebhookKind,
) -> Result<Vec<(String, u32)>, WebhookError> {
    if new_order as usize >= webhooks.len() {
        return Err(WebhookError::InvalidOrder {
            requested: new_order,
            count: webhooks.len(),
            kind,
        });
    }
    let position = webhooks
        .iter()
        .position(|w| w.key == key)
        .ok_or_else(|| WebhookError::Transport(format!("unknown webhook {key}")))?;
    if webhooks[position].order == new_order {
        return Ok(vec![]);
    }

    let before: BTreeMap<String, u32> =
        webhooks.iter().map(|w| (w.key.clone(), w.order)).collect();
    let moved = webhooks.remove(position);
    webhooks.insert(new_order as usize, moved);
    for (index, webhook) in webhooks.iter_mut().enumerate() {
        webhook.order = index as u32;
    }

    Ok(webhooks
        .iter()
        .filter(|w| before[&w.key] != w.order)
        .map(|w| (w.key.clone(), w.order))
        .collect())
}

/// Transport seam for webhook callouts
#[async_trait::async_trait]
pub trait WebhookClient: Send + Sync {
    async fn trigger(
        &self,
        webhook: &PolicyWebhook,
        request: &PrivacyRequest,
        identity: &RequestIdentity,
    ) -> Result<WebhookResponse, WebhookError>;
}

#[derive(Serialize)]
struct WebhookRequestBody<'a> {
    privacy_request_id: &'a str,
    direction: WebhookDirection,
    identity: &'a RequestIdentity,
}

/// Webhook callouts over HTTPS with a bounded per-request timeout. Timeout
/// expiry surfaces as a transport failure.
pub struct HttpsWebhookClient {
    http: reqwest::Client,
    endpoints: BTreeMap<String, Url>,
}

pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

impl HttpsWebhookClient {
    pub fn new(endpoints: BTreeMap<String, Url>) -> Self {
        HttpsWebhookClient {
            http: reqwest::Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .expect("default TLS backend available"),
            endpoints,
        }
    }
}

#[async_trait::async_trait]
impl WebhookClient for HttpsWebhookClient {
    #[instrument(skip(self, identity), fields(webhook = %webhook.key))]
    async fn trigger(
        &self,
        webhook: &PolicyWebhook,
        request: &PrivacyRequest,
        identity: &RequestIdentity,
    ) -> Result<WebhookResponse, WebhookError> {
        let url = self
            .endpoints
            .get(&webhook.connection_key)
            .ok_or_else(|| WebhookError::MissingEndpoint(webhook.connection_key.clone()))?;

        let response = self
            .http
            .post(url.clone())
            .json(&WebhookRequestBody {
                privacy_request_id: &request.id,
                direction: webhook.direction,
                identity,
            })
            .send()
            .await
            .map_err(|e| WebhookError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WebhookError::ClientUnsuccessful {
                status: response.status().as_u16(),
            });
        }
        match webhook.direction {
            WebhookDirection::OneWay => Ok(WebhookResponse::default()),
            WebhookDirection::TwoWay => response
                .json::<WebhookResponse>()
                .await
                .map_err(|e| WebhookError::Validation(e.to_string())),
        }
    }
}
